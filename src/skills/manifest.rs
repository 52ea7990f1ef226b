//! Python skill package manifest (`manifest.toml`).
//!
//! Each Python skill package directory must contain a `manifest.toml` file
//! that describes the skill. This file is used during installation to register
//! the skill in the lifecycle registry.
//!
//! # Example `manifest.toml`
//!
//! ```toml
//! id = "discord-bot"
//! name = "Discord Bot"
//! version = "1.0.0"
//! description = "Sends and receives messages from a Discord server."
//! entry_file = "skill.py"
//! min_uv_version = "0.4.0"
//! min_python = "3.11"
//!
//! [[credentials]]
//! name = "bot_token"
//! env_var = "DISCORD_BOT_TOKEN"
//! description = "Your Discord bot token (starts with 'Bot ...')"
//! required = true
//!
//! [[credentials]]
//! name = "guild_id"
//! env_var = "DISCORD_GUILD_ID"
//! description = "Your Discord server (guild) ID"
//! required = false
//! default = "0"
//! ```

use super::error::PythonSkillError;
use serde::Deserialize;
use std::path::Path;

/// A single credential required by a Python skill.
///
/// Skills declare their credential requirements in `manifest.toml` under
/// the `[[credentials]]` array. The credential mediation layer uses this
/// schema to collect values from the user (via Keychain) and inject them
/// as environment variables into the skill subprocess.
///
/// # Example
///
/// ```toml
/// [[credentials]]
/// name = "bot_token"
/// env_var = "DISCORD_BOT_TOKEN"
/// description = "Your Discord bot token"
/// required = true
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialSchema {
    /// Unique identifier for this credential within the skill.
    ///
    /// Must consist of lowercase ASCII letters, digits, and underscores only.
    /// May not be empty.
    pub name: String,

    /// Name of the environment variable injected into the skill subprocess.
    ///
    /// Must consist of uppercase ASCII letters, digits, and underscores only.
    /// May not be empty.
    pub env_var: String,

    /// Plain-English description of what this credential is.
    ///
    /// Shown to the user when prompting for the credential value.
    pub description: String,

    /// Whether this credential is required for the skill to function.
    ///
    /// If `true` and no value is available, credential collection fails.
    /// Defaults to `true`.
    #[serde(default = "default_required")]
    pub required: bool,

    /// Optional default value used when the credential is not required and
    /// not yet collected.
    ///
    /// Defaults to `None`.
    #[serde(default)]
    pub default: Option<String>,
}

fn default_required() -> bool {
    true
}

impl CredentialSchema {
    /// Validates that the schema fields are well-formed.
    ///
    /// # Errors
    ///
    /// - [`PythonSkillError::BootstrapFailed`] if `name` or `env_var` is empty.
    /// - [`PythonSkillError::BootstrapFailed`] if `name` or `env_var` contains
    ///   invalid characters.
    pub fn validate(&self) -> Result<(), PythonSkillError> {
        if self.name.trim().is_empty() {
            return Err(PythonSkillError::BootstrapFailed {
                reason: "credential `name` cannot be empty".to_owned(),
            });
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(PythonSkillError::BootstrapFailed {
                reason: format!(
                    "credential `name` `{}` is invalid (use lowercase letters, digits, or _)",
                    self.name
                ),
            });
        }
        if self.env_var.trim().is_empty() {
            return Err(PythonSkillError::BootstrapFailed {
                reason: "credential `env_var` cannot be empty".to_owned(),
            });
        }
        if !self
            .env_var
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(PythonSkillError::BootstrapFailed {
                reason: format!(
                    "credential `env_var` `{}` is invalid (use UPPERCASE letters, digits, or _)",
                    self.env_var
                ),
            });
        }
        Ok(())
    }
}

/// Parsed contents of a Python skill's `manifest.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct PythonSkillManifest {
    /// Unique skill identifier.
    ///
    /// Must consist of lowercase ASCII letters, digits, hyphens, and underscores.
    /// May not be empty.
    pub id: String,

    /// Human-readable skill name. May not be empty.
    pub name: String,

    /// Semantic version string (e.g. `"1.0.0"`).
    #[serde(default = "default_version")]
    pub version: String,

    /// Optional plain-English description of what the skill does.
    #[serde(default)]
    pub description: Option<String>,

    /// Filename of the Python entry point within the package directory.
    ///
    /// Defaults to `"skill.py"`.
    #[serde(default = "default_entry_file")]
    pub entry_file: String,

    /// Minimum `uv` version required (e.g. `"0.4.0"`). Optional.
    #[serde(default)]
    pub min_uv_version: Option<String>,

    /// Minimum Python version required (e.g. `"3.11"`). Optional.
    #[serde(default)]
    pub min_python: Option<String>,

    /// Credentials required by this skill.
    ///
    /// Each entry declares an API key, token, or password that the skill
    /// needs. The credential mediation layer collects these from the user
    /// and injects them as environment variables before spawning the process.
    ///
    /// Defaults to an empty list (no credentials required).
    #[serde(default)]
    pub credentials: Vec<CredentialSchema>,
}

fn default_version() -> String {
    "0.1.0".to_owned()
}

fn default_entry_file() -> String {
    "skill.py".to_owned()
}

impl PythonSkillManifest {
    /// Loads and parses `manifest.toml` from `dir`.
    ///
    /// # Errors
    ///
    /// - [`PythonSkillError::BootstrapFailed`] if the file cannot be read or parsed.
    /// - [`PythonSkillError::BootstrapFailed`] if validation fails.
    pub fn load_from_dir(dir: &Path) -> Result<Self, PythonSkillError> {
        let manifest_path = dir.join("manifest.toml");
        let raw = std::fs::read_to_string(&manifest_path).map_err(|e| {
            PythonSkillError::BootstrapFailed {
                reason: format!("cannot read {}: {e}", manifest_path.display()),
            }
        })?;

        let manifest: Self =
            toml::from_str(&raw).map_err(|e| PythonSkillError::BootstrapFailed {
                reason: format!("invalid manifest.toml: {e}"),
            })?;

        manifest.validate()?;
        Ok(manifest)
    }

    /// Validates that the manifest fields are well-formed.
    ///
    /// # Errors
    ///
    /// - [`PythonSkillError::BootstrapFailed`] if `id` or `name` is empty.
    /// - [`PythonSkillError::BootstrapFailed`] if `id` contains invalid characters.
    pub fn validate(&self) -> Result<(), PythonSkillError> {
        if self.id.trim().is_empty() {
            return Err(PythonSkillError::BootstrapFailed {
                reason: "manifest.toml: `id` cannot be empty".to_owned(),
            });
        }

        if !self
            .id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(PythonSkillError::BootstrapFailed {
                reason: format!(
                    "manifest.toml: `id` `{}` is invalid (use lowercase letters, digits, - or _)",
                    self.id
                ),
            });
        }

        if self.name.trim().is_empty() {
            return Err(PythonSkillError::BootstrapFailed {
                reason: "manifest.toml: `name` cannot be empty".to_owned(),
            });
        }

        for cred in &self.credentials {
            cred.validate()?;
        }

        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
