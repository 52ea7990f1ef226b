//! Keychain-mediated credential injection for Python skills.
//!
//! Python skills declare the credentials they need in `manifest.toml` under
//! the `[[credentials]]` array. This module handles the full lifecycle:
//!
//! 1. **Collect** — store credential values (from user or test) in the
//!    platform Keychain, keyed by `{skill_id}.{name}`.
//! 2. **Retrieve** — load all stored credentials for a skill.
//! 3. **Inject** — write credential values as environment variables into
//!    `HashMap<String, String>` for subprocess spawning.
//! 4. **Clear** — delete all stored credentials for a skill.
//!
//! Skills never see raw Keychain storage. They receive their secrets only
//! as environment variables in their subprocess environment.
//!
//! # Security model
//!
//! - Credentials stored under service `"com.saorsalabs.fae.skills"` with
//!   account `"{skill_id}.{name}"`.
//! - Injection writes to a `HashMap` that is merged into the process
//!   environment — the Python script reads `os.environ["MY_VAR"]`, never
//!   touching Keychain directly.
//! - Raw values are not stored in the registry, logs, or config files.

use super::manifest::CredentialSchema;
use crate::credentials::{CredentialManager, CredentialRef};
use std::collections::HashMap;
use std::fmt;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Keychain service name under which all Fae skill credentials are stored.
pub const FAE_SKILLS_KEYCHAIN_SERVICE: &str = "com.saorsalabs.fae.skills";

// ── Account key helper ────────────────────────────────────────────────────────

/// Returns the Keychain account key for a credential.
///
/// Format: `"{skill_id}.{name}"`, e.g. `"discord-bot.bot_token"`.
#[must_use]
pub fn credential_account(skill_id: &str, name: &str) -> String {
    format!("{skill_id}.{name}")
}

// ── Error type ────────────────────────────────────────────────────────────────

/// Errors from credential mediation operations.
#[derive(Debug)]
pub enum CredentialMediationError {
    /// A required credential has no value and no default.
    MissingRequired {
        /// Credential name from the manifest schema.
        name: String,
    },
    /// Platform credential storage (Keychain) returned an error.
    StorageError(crate::credentials::CredentialError),
    /// Credential name is syntactically invalid.
    InvalidName(String),
}

impl fmt::Display for CredentialMediationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRequired { name } => {
                write!(f, "required credential `{name}` is missing")
            }
            Self::StorageError(e) => write!(f, "credential storage error: {e}"),
            Self::InvalidName(s) => write!(f, "invalid credential name: `{s}`"),
        }
    }
}

impl std::error::Error for CredentialMediationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::StorageError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<crate::credentials::CredentialError> for CredentialMediationError {
    fn from(e: crate::credentials::CredentialError) -> Self {
        Self::StorageError(e)
    }
}

// ── Status types ──────────────────────────────────────────────────────────────

/// Status of a single credential for a skill.
#[derive(Debug, Clone)]
pub struct CredentialStatus {
    /// Credential name from the manifest schema.
    pub name: String,
    /// Environment variable name to inject into the subprocess.
    pub env_var: String,
    /// Whether a value is currently stored in the Keychain.
    pub is_stored: bool,
    /// Whether this credential is required by the skill.
    pub required: bool,
}

// ── Collected credential ──────────────────────────────────────────────────────

/// A single credential value ready for subprocess injection.
///
/// The `value` field contains the raw secret. Values are cleared from memory
/// when this struct is dropped.
#[derive(Debug)]
pub struct CollectedCredential {
    /// Environment variable name (from `CredentialSchema::env_var`).
    pub env_var: String,
    /// The resolved secret value.
    ///
    /// This is the only point in the Rust code where the raw value is held.
    /// It is injected into the subprocess environment and must not be logged.
    ///
    /// # Security note
    ///
    /// Do not pass this field to logging, metrics, or any external system.
    /// It is exposed as `pub` for testing and injection purposes only.
    pub value: String,
}

// ── Collection result ─────────────────────────────────────────────────────────

/// All credentials collected for a single skill, ready for injection.
#[derive(Debug)]
pub struct CredentialCollection {
    /// Skill identifier (from `PythonSkillManifest::id`).
    pub skill_id: String,
    /// Collected credentials in schema declaration order.
    pub credentials: Vec<CollectedCredential>,
}

impl CredentialCollection {
    /// Injects all credential values into `env` as environment variables.
    ///
    /// Existing entries with the same key are overwritten. This ensures
    /// credentials are always fresh from the Keychain and cannot be
    /// shadowed by the parent process environment.
    pub fn inject_into(&self, env: &mut HashMap<String, String>) {
        for cred in &self.credentials {
            env.insert(cred.env_var.clone(), cred.value.clone());
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Checks which credentials are already stored in the Keychain.
///
/// Returns a [`CredentialStatus`] for each entry in `schema`, indicating
/// whether a value is present in storage.
///
/// # Errors
///
/// Returns [`CredentialMediationError::StorageError`] if the Keychain cannot
/// be accessed.
pub fn check_stored_credentials(
    skill_id: &str,
    schema: &[CredentialSchema],
    manager: &dyn CredentialManager,
) -> Result<Vec<CredentialStatus>, CredentialMediationError> {
    let mut statuses = Vec::with_capacity(schema.len());
    for cred in schema {
        let account = credential_account(skill_id, &cred.name);
        let keychain_ref = CredentialRef::Keychain {
            service: FAE_SKILLS_KEYCHAIN_SERVICE.to_owned(),
            account,
        };
        let is_stored = manager
            .retrieve(&keychain_ref)
            .map(|opt| opt.is_some())
            .unwrap_or(false);
        statuses.push(CredentialStatus {
            name: cred.name.clone(),
            env_var: cred.env_var.clone(),
            is_stored,
            required: cred.required,
        });
    }
    Ok(statuses)
}

/// Stores credential values in the Keychain and returns a [`CredentialCollection`].
///
/// `values` is a map from credential `name` (per schema) to the secret value.
/// For each schema entry, the function:
/// 1. Looks up `values[name]`.
/// 2. If found: stores it in the Keychain and records the value.
/// 3. If not found but `required`: returns [`CredentialMediationError::MissingRequired`].
/// 4. If not found and optional: uses `schema.default` if present, skips otherwise.
///
/// # Errors
///
/// - [`CredentialMediationError::MissingRequired`] if a required credential has no value.
/// - [`CredentialMediationError::StorageError`] if the Keychain store fails.
pub fn collect_skill_credentials(
    skill_id: &str,
    schema: &[CredentialSchema],
    values: &HashMap<String, String>,
    manager: &dyn CredentialManager,
) -> Result<CredentialCollection, CredentialMediationError> {
    let mut credentials = Vec::with_capacity(schema.len());

    for cred in schema {
        let value = if let Some(v) = values.get(&cred.name) {
            // Store this value in the Keychain for future retrieval.
            let account = credential_account(skill_id, &cred.name);
            manager
                .store(&account, v)
                .map_err(CredentialMediationError::from)?;
            v.clone()
        } else if let Some(default) = &cred.default {
            // Optional credential with a default — use the default; don't store in Keychain.
            default.clone()
        } else if cred.required {
            return Err(CredentialMediationError::MissingRequired {
                name: cred.name.clone(),
            });
        } else {
            // Optional and no default — skip.
            continue;
        };

        credentials.push(CollectedCredential {
            env_var: cred.env_var.clone(),
            value,
        });
    }

    Ok(CredentialCollection {
        skill_id: skill_id.to_owned(),
        credentials,
    })
}

/// Retrieves all stored credentials for a skill from the Keychain.
///
/// For each schema entry:
/// 1. Looks up the value in the Keychain.
/// 2. If found: includes it in the collection.
/// 3. If not found and `required`: returns [`CredentialMediationError::MissingRequired`].
/// 4. If not found and optional with default: uses the default.
/// 5. If not found, optional, and no default: skips.
///
/// # Errors
///
/// - [`CredentialMediationError::MissingRequired`] if a required credential is missing.
/// - [`CredentialMediationError::StorageError`] if the Keychain cannot be accessed.
pub fn retrieve_skill_credentials(
    skill_id: &str,
    schema: &[CredentialSchema],
    manager: &dyn CredentialManager,
) -> Result<CredentialCollection, CredentialMediationError> {
    let mut credentials = Vec::with_capacity(schema.len());

    for cred in schema {
        let account = credential_account(skill_id, &cred.name);
        let keychain_ref = CredentialRef::Keychain {
            service: FAE_SKILLS_KEYCHAIN_SERVICE.to_owned(),
            account,
        };
        let stored = manager
            .retrieve(&keychain_ref)
            .map_err(CredentialMediationError::from)?;

        let value = match stored {
            Some(v) => v,
            None if cred.required => {
                // Check if there's a default for required fields too
                if let Some(default) = &cred.default {
                    default.clone()
                } else {
                    return Err(CredentialMediationError::MissingRequired {
                        name: cred.name.clone(),
                    });
                }
            }
            None => {
                // Optional — use default if present, skip otherwise.
                if let Some(default) = &cred.default {
                    default.clone()
                } else {
                    continue;
                }
            }
        };

        credentials.push(CollectedCredential {
            env_var: cred.env_var.clone(),
            value,
        });
    }

    Ok(CredentialCollection {
        skill_id: skill_id.to_owned(),
        credentials,
    })
}

/// Clears all stored credentials for a skill from the Keychain.
///
/// Iterates over `schema` and deletes each entry from the Keychain.
/// Missing entries are silently ignored.
///
/// # Errors
///
/// Returns [`CredentialMediationError::StorageError`] if deletion fails for
/// any credential.
pub fn clear_skill_credentials(
    skill_id: &str,
    schema: &[CredentialSchema],
    manager: &dyn CredentialManager,
) -> Result<(), CredentialMediationError> {
    for cred in schema {
        let account = credential_account(skill_id, &cred.name);
        let keychain_ref = CredentialRef::Keychain {
            service: FAE_SKILLS_KEYCHAIN_SERVICE.to_owned(),
            account,
        };
        manager
            .delete(&keychain_ref)
            .map_err(CredentialMediationError::from)?;
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
