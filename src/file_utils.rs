use anyhow::{Result, Context};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

// @module: File and directory utilities

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_file()
    }

    // @checks: Directory existence
    pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_dir()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        Ok(())
    }

    // @returns: Last modification time, None when the file is missing
    pub fn modified_time<P: AsRef<Path>>(path: P) -> Option<SystemTime> {
        fs::metadata(path.as_ref()).and_then(|m| m.modified()).ok()
    }

    // @returns: Newest modification time among the given paths that exist
    pub fn newest_modified_time<'a, I>(paths: I) -> Option<SystemTime>
    where
        I: IntoIterator<Item = &'a Path>,
    {
        paths.into_iter().filter_map(Self::modified_time).max()
    }

    // @returns: Path with its extension replaced (`ext` without the dot)
    pub fn with_extension<P: AsRef<Path>>(path: P, ext: &str) -> PathBuf {
        path.as_ref().with_extension(ext)
    }

    // @returns: File name without its last extension
    pub fn file_stem_string<P: AsRef<Path>>(path: P) -> String {
        path.as_ref()
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    // @returns: Canonical path, or the path itself when it cannot be resolved
    pub fn canonical<P: AsRef<Path>>(path: P) -> PathBuf {
        fs::canonicalize(path.as_ref()).unwrap_or_else(|_| path.as_ref().to_path_buf())
    }

    // @returns: Absolute path against the working directory, without resolving links
    pub fn absolute<P: AsRef<Path>>(path: P) -> PathBuf {
        std::path::absolute(path.as_ref()).unwrap_or_else(|_| path.as_ref().to_path_buf())
    }

    /// Find files whose name ends with one of the given suffixes (case-insensitive)
    pub fn find_files_with_suffixes<P: AsRef<Path>>(dir: P, suffixes: &[String]) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();
        let lowered: Vec<String> = suffixes.iter().map(|s| s.to_lowercase()).collect();

        for entry in WalkDir::new(dir.as_ref()).follow_links(true) {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if path.is_file() {
                let name = entry.file_name().to_string_lossy().to_lowercase();
                if lowered.iter().any(|suffix| name.ends_with(suffix.as_str()) && name.len() > suffix.len()) {
                    result.push(path.to_path_buf());
                }
            }
        }

        result.sort();
        Ok(result)
    }

    /// Files in the same directory whose name starts with `prefix` followed by something else
    pub fn find_siblings_with_prefix<P: AsRef<Path>>(dir: P, prefix: &str) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(dir.as_ref()) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                name.len() > prefix.len() && name.starts_with(prefix)
            })
            .map(|e| e.path())
            .collect()
    }

    /// Read a file to a string
    pub fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
        let bytes = fs::read(&path)
            .with_context(|| format!("Failed to read file: {:?}", path.as_ref()))?;
        // TeX sources are not always valid UTF-8 (latin1 documents)
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Write a string to a file
    pub fn write_to_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        // Ensure the parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                Self::ensure_dir(parent)?;
            }
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write to file: {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Remove a file if it exists; returns whether something was removed
    pub fn remove_if_exists<P: AsRef<Path>>(path: P) -> Result<bool> {
        let path = path.as_ref();
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to remove file: {:?}", path)),
        }
    }

    /// SHA256 of a file's content, None when the file is missing
    pub fn fingerprint_file<P: AsRef<Path>>(path: P) -> Result<Option<String>> {
        let path = path.as_ref();
        let mut file = match fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to open file for hashing: {:?}", path))
            }
        };

        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];

        loop {
            let bytes_read = file.read(&mut buffer)
                .with_context(|| format!("Failed to read file for hashing: {:?}", path))?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(Some(format!("{:x}", hasher.finalize())))
    }

    /// SHA256 over a sequence of lines
    pub fn fingerprint_lines<I, S>(lines: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut hasher = Sha256::new();
        for line in lines {
            hasher.update(line.as_ref().as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}
