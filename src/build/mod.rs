/*!
 * Incremental document build.
 *
 * - `graph`: file nodes and the dependency-ordered walk
 * - `stamps`: persisted content fingerprints of secondary-tool triggers
 * - `log_parser`: warning and error extraction from compiler logs
 * - `wrapper`: temporary document wrapper for located warnings
 * - `tools`: tool command lines, the runner seam and cancellation
 * - `maker`: the build itself
 */

pub mod graph;
pub mod log_parser;
pub mod maker;
pub mod stamps;
pub mod tools;
pub mod wrapper;

pub use self::graph::{FileKind, FileNode, NodeTable};
pub use self::log_parser::{LocatedError, LocatedWarning, LogAnalysis, StandardWarning};
pub use self::maker::{BuildReport, Maker};
pub use self::stamps::{BuildStamps, StampKind};
pub use self::tools::{
    cancellation, CancelHandle, CancelToken, ProcessRunner, ToolInvocation, ToolKind, ToolOutput, ToolRunner,
};
pub use self::wrapper::WrapperFile;
