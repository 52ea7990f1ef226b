//! Centralized application directory paths for Fae.
//!
//! Provides a single source of truth for all filesystem paths used by the app.
//! Uses the [`dirs`] crate for platform-appropriate directory resolution, which
//! is sandbox-transparent on macOS (returns container-relative paths under App
//! Sandbox automatically).
//!
//! # Directory Layout
//!
//! | Purpose | macOS (sandbox) | Linux |
//! |---------|----------------|-------|
//! | App data | `~/Library/Application Support/fae/` | `~/.local/share/fae/` |
//! | Config | `~/Library/Application Support/fae/` | `~/.config/fae/` |
//! | Cache | `~/Library/Caches/fae/` | `~/.cache/fae/` |
//!
//! # Environment Overrides
//!
//! All paths can be overridden for testing or custom deployments:
//! - `FAE_DATA_DIR` — overrides [`data_dir`]
//! - `FAE_CONFIG_DIR` — overrides [`config_dir`]
//! - `FAE_CACHE_DIR` — overrides [`cache_dir`]

use std::path::PathBuf;

/// Application data root directory.
///
/// Used for persistent user data: memory records, SOUL.md, skills,
/// external API profiles, voice samples, logs, and diagnostics.
///
/// Resolves to `dirs::data_dir()/fae/` by default. Override with
/// the `FAE_DATA_DIR` environment variable.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("FAE_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("fae"))
        .unwrap_or_else(|| PathBuf::from("/tmp/fae-data"))
}

/// Application config directory.
///
/// Used for `config.toml`, `scheduler.json`, and other configuration files.
///
/// Resolves to `dirs::config_dir()/fae/` by default. Override with
/// the `FAE_CONFIG_DIR` environment variable.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("FAE_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("fae"))
        .unwrap_or_else(|| PathBuf::from("/tmp/fae-config"))
}

/// Application cache directory.
///
/// Used for downloaded model files and other expendable cached data.
///
/// Resolves to `dirs::cache_dir()/fae/` by default. Override with
/// the `FAE_CACHE_DIR` environment variable.
#[must_use]
pub fn cache_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("FAE_CACHE_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::cache_dir()
        .map(|d| d.join("fae"))
        .unwrap_or_else(|| PathBuf::from("/tmp/fae-cache"))
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// User skills directory (`data_dir()/skills/`).
///
/// Override with `FAE_SKILLS_DIR` (checked by the skills module directly).
#[must_use]
pub fn skills_dir() -> PathBuf {
    data_dir().join("skills")
}

/// Memory data root directory.
///
/// Memory records, manifest, and indexes are stored here.
/// Currently the same as [`data_dir`].
#[must_use]
pub fn memory_dir() -> PathBuf {
    data_dir()
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Scheduler state file path (`config_dir()/scheduler.json`).
#[must_use]
pub fn scheduler_file() -> PathBuf {
    config_dir().join("scheduler.json")
}

/// Diagnostics output directory (`data_dir()/diagnostics/`).
#[must_use]
pub fn diagnostics_dir() -> PathBuf {
    data_dir().join("diagnostics")
}

/// HuggingFace Hub cache directory (`cache_dir()/huggingface/`).
///
/// Set the `HF_HOME` environment variable to this path early in startup
/// so that the `hf-hub` crate stores models in a sandbox-accessible location.
#[must_use]
pub fn hf_cache_dir() -> PathBuf {
    cache_dir().join("huggingface")
}

/// External API profiles directory (`data_dir()/external_apis/`).
#[must_use]
pub fn external_apis_dir() -> PathBuf {
    data_dir().join("external_apis")
}

/// Wakeword recordings directory (`data_dir()/wakeword/`).
#[must_use]
pub fn wakeword_dir() -> PathBuf {
    data_dir().join("wakeword")
}

/// Ensure the `HF_HOME` environment variable points to [`hf_cache_dir`].
///
/// The `hf-hub` crate reads `HF_HOME` to locate its download cache.
/// Call this **once** early in startup (before any model download) so that
/// models are stored in a sandbox-safe location on macOS.
///
/// If `HF_HOME` is already set, this function is a no-op.
pub fn ensure_hf_home() {
    if std::env::var_os("HF_HOME").is_none() {
        let dir = hf_cache_dir();
        // SAFETY: Called once at startup before any threads spawn.
        unsafe { std::env::set_var("HF_HOME", &dir) };
    }
}

/// Returns `true` if the app is running inside a macOS App Sandbox container.
///
/// macOS automatically sets the `APP_SANDBOX_CONTAINER_ID` environment variable
/// when an app runs under App Sandbox.
#[must_use]
pub fn is_sandboxed() -> bool {
    std::env::var_os("APP_SANDBOX_CONTAINER_ID").is_some()
}
