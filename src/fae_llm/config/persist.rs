//! Atomic config file operations.
//!
//! Provides functions for reading, writing, and backing up TOML config files
//! with atomic write guarantees (temp file → fsync → rename).

use crate::fae_llm::error::FaeLlmError;
use std::io::Write;
use std::path::Path;

use super::types::FaeLlmConfig;

/// Read a config file from disk and deserialize it.
///
/// # Errors
/// Returns `FaeLlmError::ConfigError` if the file cannot be read or parsed.
pub fn read_config(path: &Path) -> Result<FaeLlmConfig, FaeLlmError> {
    let contents = read_config_text(path)?;
    toml::from_str(&contents).map_err(|e| {
        FaeLlmError::ConfigError(format!(
            "failed to parse config file '{}': {e}",
            path.display()
        ))
    })
}

/// Read raw TOML config text from disk.
///
/// # Errors
/// Returns `FaeLlmError::ConfigError` if the file cannot be read.
pub fn read_config_text(path: &Path) -> Result<String, FaeLlmError> {
    std::fs::read_to_string(path).map_err(|e| {
        FaeLlmError::ConfigError(format!(
            "failed to read config file '{}': {e}",
            path.display()
        ))
    })
}

/// Write a config file atomically (temp file → fsync → rename).
///
/// This ensures that a crash during write will not corrupt the config file.
///
/// # Errors
/// Returns `FaeLlmError::ConfigError` on serialization, write, or rename failure.
pub fn write_config_atomic(path: &Path, config: &FaeLlmConfig) -> Result<(), FaeLlmError> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| FaeLlmError::ConfigError(format!("failed to serialize config: {e}")))?;
    write_toml_text_atomic(path, &toml_str)
}

/// Write TOML text atomically (temp file → fsync → rename).
///
/// This preserves caller-provided formatting/comments and avoids partial writes.
pub fn write_toml_text_atomic(path: &Path, toml_text: &str) -> Result<(), FaeLlmError> {
    let tmp_path = path.with_extension("toml.tmp");

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            FaeLlmError::ConfigError(format!(
                "failed to create config directory '{}': {e}",
                parent.display()
            ))
        })?;
    }

    let mut file = std::fs::File::create(&tmp_path).map_err(|e| {
        FaeLlmError::ConfigError(format!(
            "failed to create temp file '{}': {e}",
            tmp_path.display()
        ))
    })?;

    file.write_all(toml_text.as_bytes())
        .map_err(|e| FaeLlmError::ConfigError(format!("failed to write temp file: {e}")))?;

    file.sync_all()
        .map_err(|e| FaeLlmError::ConfigError(format!("failed to sync temp file: {e}")))?;

    std::fs::rename(&tmp_path, path).map_err(|e| {
        FaeLlmError::ConfigError(format!(
            "failed to rename '{}' to '{}': {e}",
            tmp_path.display(),
            path.display()
        ))
    })
}

/// Backup a config file by copying it to `{path}.backup`.
///
/// Returns `Ok(())` if the source file doesn't exist (nothing to back up).
///
/// # Errors
/// Returns `FaeLlmError::ConfigError` if the copy fails.
pub fn backup_config(path: &Path) -> Result<(), FaeLlmError> {
    if !path.exists() {
        return Ok(());
    }

    let backup_path = path.with_extension("toml.backup");
    std::fs::copy(path, &backup_path).map_err(|e| {
        FaeLlmError::ConfigError(format!(
            "failed to backup config '{}' to '{}': {e}",
            path.display(),
            backup_path.display()
        ))
    })?;
    Ok(())
}
