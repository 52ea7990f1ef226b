//! Plaintext credential detection and migration to secure storage.
//!
//! Scans a [`SpeechConfig`] for credentials stored as [`CredentialRef::Plaintext`]
//! and migrates them to the platform keychain via a [`CredentialManager`].

use crate::config::SpeechConfig;
use crate::credentials::CredentialManager;
use crate::credentials::types::{CredentialError, CredentialRef};
use std::fmt;

/// A plaintext credential discovered during detection.
///
/// The [`Debug`] implementation redacts the secret value.
pub struct PlaintextCredential {
    /// Credential account identifier (e.g. `"llm.api_key"`).
    pub account: String,
    /// The plaintext secret value.
    pub value: String,
}

impl fmt::Debug for PlaintextCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaintextCredential")
            .field("account", &self.account)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Scan a config for credentials stored as plaintext.
///
/// Checks the following fields:
/// - `channels.discord.bot_token` (if discord configured)
/// - `channels.whatsapp.access_token` (if whatsapp configured)
/// - `channels.whatsapp.verify_token` (if whatsapp configured)
/// - `channels.gateway.bearer_token`
#[must_use]
pub fn detect_plaintext_credentials(config: &SpeechConfig) -> Vec<PlaintextCredential> {
    let mut found = Vec::new();

    if let Some(dc) = &config.channels.discord
        && let CredentialRef::Plaintext(v) = &dc.bot_token
    {
        found.push(PlaintextCredential {
            account: "discord.bot_token".to_owned(),
            value: v.clone(),
        });
    }

    if let Some(wa) = &config.channels.whatsapp
        && let CredentialRef::Plaintext(v) = &wa.access_token
    {
        found.push(PlaintextCredential {
            account: "whatsapp.access_token".to_owned(),
            value: v.clone(),
        });
    }

    if let Some(wa) = &config.channels.whatsapp
        && let CredentialRef::Plaintext(v) = &wa.verify_token
    {
        found.push(PlaintextCredential {
            account: "whatsapp.verify_token".to_owned(),
            value: v.clone(),
        });
    }

    if let Some(CredentialRef::Plaintext(v)) = &config.channels.gateway.bearer_token {
        found.push(PlaintextCredential {
            account: "gateway.bearer_token".to_owned(),
            value: v.clone(),
        });
    }

    found
}

/// Migrate a single credential field from plaintext to keychain.
///
/// Returns `true` if the field was migrated, `false` if it was not plaintext.
///
/// # Errors
///
/// Returns [`CredentialError`] if the keychain store operation fails.
fn migrate_single(
    field: &mut CredentialRef,
    account: &str,
    manager: &dyn CredentialManager,
) -> Result<bool, CredentialError> {
    if let CredentialRef::Plaintext(value) = field {
        let new_ref = manager.store(account, value)?;
        *field = new_ref;
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Migrate all plaintext credentials in the config to keychain storage.
///
/// For each plaintext credential:
/// 1. Stores the value in the keychain via `manager.store()`
/// 2. Replaces the config field with the returned `CredentialRef::Keychain`
///
/// Returns the number of credentials that were migrated.
///
/// # Errors
///
/// Returns [`CredentialError`] if any keychain store operation fails.
/// Already-migrated fields are not rolled back on partial failure.
pub fn migrate_to_keychain(
    config: &mut SpeechConfig,
    manager: &dyn CredentialManager,
) -> Result<usize, CredentialError> {
    let mut count = 0usize;

    if let Some(dc) = &mut config.channels.discord
        && migrate_single(&mut dc.bot_token, "discord.bot_token", manager)?
    {
        count += 1;
    }

    if let Some(wa) = &mut config.channels.whatsapp {
        if migrate_single(&mut wa.access_token, "whatsapp.access_token", manager)? {
            count += 1;
        }
        if migrate_single(&mut wa.verify_token, "whatsapp.verify_token", manager)? {
            count += 1;
        }
    }

    if let Some(ref mut cred_ref) = config.channels.gateway.bearer_token
        && migrate_single(cred_ref, "gateway.bearer_token", manager)?
    {
        count += 1;
    }

    Ok(count)
}
