//! Credential loading and batch resolution.
//!
//! Provides utilities to resolve [`CredentialRef`] values into actual secrets
//! using a [`CredentialManager`] backend, and to batch-resolve all credential
//! fields from a [`SpeechConfig`].

use crate::config::SpeechConfig;
use crate::credentials::CredentialManager;
use crate::credentials::types::{CredentialError, CredentialRef};
use std::fmt;

/// Resolved credential values ready for runtime use.
///
/// All secret fields are resolved to their plaintext `String` values.
/// This struct intentionally implements a custom [`Debug`] that redacts
/// all values to prevent accidental secret leakage in logs.
pub struct LoadedCredentials {
    /// Resolved LLM API key.
    pub llm_api_key: String,
    /// Resolved Discord bot token.
    pub discord_bot_token: String,
    /// Resolved WhatsApp access token.
    pub whatsapp_access_token: String,
    /// Resolved WhatsApp verification token.
    pub whatsapp_verify_token: String,
    /// Resolved gateway bearer token (`None` if not configured).
    pub gateway_bearer_token: Option<String>,
}

impl fmt::Debug for LoadedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedCredentials")
            .field("llm_api_key", &redact(&self.llm_api_key))
            .field("discord_bot_token", &redact(&self.discord_bot_token))
            .field(
                "whatsapp_access_token",
                &redact(&self.whatsapp_access_token),
            )
            .field(
                "whatsapp_verify_token",
                &redact(&self.whatsapp_verify_token),
            )
            .field(
                "gateway_bearer_token",
                &self.gateway_bearer_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

fn redact(s: &str) -> &str {
    if s.is_empty() { "" } else { "[REDACTED]" }
}

/// Resolve a single [`CredentialRef`] to its plaintext value.
///
/// # Variants
///
/// - `Plaintext(s)` → returns the stored string
/// - `Keychain { .. }` → delegates to `manager.retrieve()`
/// - `None` → returns an empty string
///
/// # Errors
///
/// Returns [`CredentialError`] if a keychain lookup fails.
pub fn resolve_credential(
    cred_ref: &CredentialRef,
    manager: &dyn CredentialManager,
) -> Result<String, CredentialError> {
    match cred_ref {
        CredentialRef::Plaintext(s) => Ok(s.clone()),
        CredentialRef::None => Ok(String::new()),
        CredentialRef::Keychain { .. } => {
            let opt = manager.retrieve(cred_ref)?;
            Ok(opt.unwrap_or_default())
        }
    }
}

/// Batch-resolve all credential fields from a [`SpeechConfig`].
///
/// Iterates over every credential-bearing config field, resolving each
/// through the supplied [`CredentialManager`].
///
/// # Errors
///
/// Returns [`CredentialError`] if any individual credential resolution fails.
pub fn load_all_credentials(
    config: &SpeechConfig,
    manager: &dyn CredentialManager,
) -> Result<LoadedCredentials, CredentialError> {
    let llm_api_key = resolve_credential(&config.llm.api_key, manager)?;
    let discord_bot_token = match &config.channels.discord {
        Some(dc) => resolve_credential(&dc.bot_token, manager)?,
        None => String::new(),
    };
    let whatsapp_access_token = match &config.channels.whatsapp {
        Some(wa) => resolve_credential(&wa.access_token, manager)?,
        None => String::new(),
    };
    let whatsapp_verify_token = match &config.channels.whatsapp {
        Some(wa) => resolve_credential(&wa.verify_token, manager)?,
        None => String::new(),
    };

    let gateway_bearer_token = match &config.channels.gateway.bearer_token {
        Some(cred_ref) => {
            let resolved = resolve_credential(cred_ref, manager)?;
            if resolved.is_empty() {
                None
            } else {
                Some(resolved)
            }
        }
        None => None,
    };

    Ok(LoadedCredentials {
        llm_api_key,
        discord_bot_token,
        whatsapp_access_token,
        whatsapp_verify_token,
        gateway_bearer_token,
    })
}
