/*!
 * Mock tool runner for testing
 *
 * Records every invocation and simulates the files the real tools write:
 * the compiler writes its output, a log taken from a queue and any
 * configured side files (aux, idx, bcf...); the other tools write their
 * output file. Tools can be made to fail or to take time.
 */

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use autolatex::build::{CancelToken, ToolInvocation, ToolKind, ToolOutput, ToolRunner};
use autolatex::errors::BuildError;

#[derive(Debug, Default)]
struct MockState {
    invocations: Vec<ToolInvocation>,
    logs: VecDeque<String>,
    default_log: String,
    side_files: Vec<(String, String)>,
    failures: HashMap<ToolKind, String>,
    delay: Option<Duration>,
}

/// Tool runner that never starts a process
#[derive(Debug, Default)]
pub struct MockToolRunner {
    state: Mutex<MockState>,
}

impl MockToolRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the log of the next compiler pass
    pub fn push_log(&self, log: &str) -> &Self {
        self.state.lock().logs.push_back(log.to_string());
        self
    }

    /// Log used once the queue is empty
    pub fn set_default_log(&self, log: &str) -> &Self {
        self.state.lock().default_log = log.to_string();
        self
    }

    /// File `<stem>.<ext>` written by every compiler pass
    pub fn with_latex_file(&self, ext: &str, content: &str) -> &Self {
        self.state.lock().side_files.push((ext.to_string(), content.to_string()));
        self
    }

    /// Make a tool fail, printing `output`
    pub fn fail(&self, kind: ToolKind, output: &str) -> &Self {
        self.state.lock().failures.insert(kind, output.to_string());
        self
    }

    /// Make every run take `delay`
    pub fn set_delay(&self, delay: Duration) -> &Self {
        self.state.lock().delay = Some(delay);
        self
    }

    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.state.lock().invocations.clone()
    }

    pub fn count(&self, kind: ToolKind) -> usize {
        self.state.lock().invocations.iter().filter(|i| i.kind == kind).count()
    }

    pub fn clear(&self) {
        self.state.lock().invocations.clear();
    }

    fn job_stem(invocation: &ToolInvocation) -> String {
        if let Some(job) = invocation.args.iter().find_map(|a| a.strip_prefix("-jobname=")) {
            return job.to_string();
        }
        invocation
            .args
            .last()
            .and_then(|input| Path::new(input).file_stem())
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ToolRunner for MockToolRunner {
    async fn run(&self, invocation: &ToolInvocation, cancel: &CancelToken) -> Result<ToolOutput, BuildError> {
        let (delay, failure, log, side_files) = {
            let mut state = self.state.lock();
            state.invocations.push(invocation.clone());
            let log = if invocation.kind == ToolKind::Latex {
                state.logs.pop_front().unwrap_or_else(|| state.default_log.clone())
            } else {
                String::new()
            };
            (
                state.delay,
                state.failures.get(&invocation.kind).cloned(),
                log,
                state.side_files.clone(),
            )
        };

        if let Some(output) = &invocation.output {
            fs::write(output, "partial").map_err(|e| BuildError::io(output, e))?;
        }

        if let Some(delay) = delay {
            let mut cancel = cancel.clone();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(BuildError::Cancelled),
            }
        }

        let dir = &invocation.working_dir;
        if invocation.kind == ToolKind::Latex {
            let stem = Self::job_stem(invocation);
            let log_path = dir.join(format!("{}.log", stem));
            fs::write(&log_path, &log).map_err(|e| BuildError::io(&log_path, e))?;
            for (ext, content) in side_files {
                let path = dir.join(format!("{}.{}", stem, ext));
                fs::write(&path, content).map_err(|e| BuildError::io(&path, e))?;
            }
        }

        if let Some(output) = failure {
            return Ok(ToolOutput {
                success: false,
                code: Some(1),
                stdout: output,
                stderr: String::new(),
            });
        }

        if let Some(output) = &invocation.output {
            fs::write(output, "done").map_err(|e| BuildError::io(output, e))?;
        }
        Ok(ToolOutput {
            success: true,
            code: Some(0),
            stdout: format!("{} finished", invocation.program),
            stderr: String::new(),
        })
    }
}
