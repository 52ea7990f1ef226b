//! Path validation utilities for tool security.
//!
//! Prevents directory traversal attacks and writes to system directories.

use crate::fae_llm::error::FaeLlmError;
use std::path::{Path, PathBuf};

/// System directories that tools must never write to.
///
/// Note: `/var` is excluded because macOS temp dirs live at `/var/folders/...`.
/// Specific `/var` subdirectories like `/var/log` could be added if needed.
const SYSTEM_DIRS: &[&str] = &[
    "/bin",
    "/sbin",
    "/usr/bin",
    "/usr/sbin",
    "/usr/lib",
    "/usr/local/bin",
    "/usr/local/sbin",
    "/etc",
    "/System",
    "/Library/System",
    "/proc",
    "/sys",
    "/dev",
    "/boot",
];

/// Check if a path contains traversal sequences that could escape a sandbox.
///
/// Returns `false` for paths containing `..` components.
pub fn is_path_safe(path: &str) -> bool {
    let p = Path::new(path);
    for component in p.components() {
        if let std::path::Component::ParentDir = component {
            return false;
        }
    }
    true
}

/// Check if a path is in a restricted system directory.
pub fn is_system_path(path: &Path) -> bool {
    let path_str = path.to_string_lossy();
    SYSTEM_DIRS
        .iter()
        .any(|dir| path_str.starts_with(dir) || path_str == *dir)
}

/// Validate a path is safe for reading.
///
/// Accepts both relative and absolute paths, but rejects paths with
/// `..` traversal components.
///
/// # Errors
///
/// Returns `FaeLlmError::ToolValidationError` if the path is invalid.
pub fn validate_read_path(path: &str) -> Result<PathBuf, FaeLlmError> {
    if path.is_empty() {
        return Err(FaeLlmError::ToolValidationError("path is empty".into()));
    }

    if !is_path_safe(path) {
        return Err(FaeLlmError::ToolValidationError(format!(
            "path contains directory traversal: {path}"
        )));
    }

    Ok(PathBuf::from(path))
}

/// Validate a path is safe for writing.
///
/// In addition to the read path checks, also rejects system directories.
///
/// # Errors
///
/// Returns `FaeLlmError::ToolValidationError` if the path is unsafe for writing.
pub fn validate_write_path(path: &str) -> Result<PathBuf, FaeLlmError> {
    let path_buf = validate_read_path(path)?;

    // For absolute paths, check system directories
    if path_buf.is_absolute() && is_system_path(&path_buf) {
        return Err(FaeLlmError::ToolValidationError(format!(
            "cannot write to system directory: {path}"
        )));
    }

    Ok(path_buf)
}
