//! Voice command detection for runtime model switching.
//!
//! Detects model-switch phrases in user transcriptions before they reach the LLM,
//! enabling hands-free model switching mid-conversation. Users can say things like
//! "Fae, switch to Claude" or "use the local model" and the command will be
//! intercepted and routed to the model switching logic.
//!
//! # Supported Commands
//!
//! | Phrase Pattern | Command |
//! |----------------|---------|
//! | "switch to {model}" | `SwitchModel` |
//! | "use {model}" | `SwitchModel` |
//! | "list models" | `ListModels` |
//! | "what model are you using" | `CurrentModel` |

/// A voice command detected from user speech.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceCommand {
    /// Switch to a different model.
    SwitchModel {
        /// The target model to switch to.
        target: ModelTarget,
    },
    /// List all available models.
    ListModels,
    /// Query which model is currently active.
    CurrentModel,
    /// Request help with model switching commands.
    Help,
}

/// Target specification for a model switch command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelTarget {
    /// Switch to a specific model by name (e.g., "gpt-4o").
    ByName(String),
    /// Switch to a model from a specific provider (e.g., "anthropic").
    ByProvider(String),
    /// Switch to the local on-device model.
    Local,
    /// Switch to the best available model (highest tier).
    Best,
}

/// Attempt to parse a transcription as a voice command.
///
/// Returns `Some(VoiceCommand)` if the text matches a known command pattern,
/// or `None` if it looks like normal conversation.
///
/// The parser is case-insensitive, strips an optional "fae" prefix, and
/// recognises common synonyms (e.g. "change to" = "switch to").
///
/// # Examples
///
/// ```
/// use fae::voice_command::{parse_voice_command, VoiceCommand, ModelTarget};
///
/// let cmd = parse_voice_command("switch to claude");
/// assert_eq!(cmd, Some(VoiceCommand::SwitchModel {
///     target: ModelTarget::ByProvider("anthropic".into()),
/// }));
///
/// assert_eq!(parse_voice_command("hello how are you"), None);
/// ```
pub fn parse_voice_command(text: &str) -> Option<VoiceCommand> {
    let text = text.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }

    // Strip optional "fae" / "fae," / "hey fae" prefix.
    let stripped = strip_wake_prefix(&text);

    // --- Help ---
    if matches_any(
        stripped,
        &[
            "help",
            "help me",
            "what can i say",
            "what can you do",
            "model commands",
            "model help",
        ],
    ) {
        return Some(VoiceCommand::Help);
    }

    // --- List models ---
    if matches_any(
        stripped,
        &[
            "list models",
            "show models",
            "available models",
            "what models",
        ],
    ) {
        return Some(VoiceCommand::ListModels);
    }

    // --- Current model ---
    if matches_any(
        stripped,
        &[
            "what model",
            "which model",
            "current model",
            "what model are you using",
            "which model are you using",
        ],
    ) {
        return Some(VoiceCommand::CurrentModel);
    }

    // --- Switch model ---
    if let Some(target_str) = extract_switch_target(stripped) {
        let target = parse_model_target(target_str);
        return Some(VoiceCommand::SwitchModel { target });
    }

    None
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Strip optional wake-word prefix ("fae", "hey fae", "fae,").
fn strip_wake_prefix(text: &str) -> &str {
    for prefix in &["hey fae ", "fae, ", "fae "] {
        if let Some(rest) = text.strip_prefix(prefix) {
            return rest.trim();
        }
    }
    text
}

/// Return `true` if `text` starts with any of the given `patterns`.
fn matches_any(text: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| text.starts_with(p))
}

/// Try to extract the model target string from a switch-style command.
///
/// Recognises: "switch to …", "change to …", "use …".
fn extract_switch_target(text: &str) -> Option<&str> {
    for prefix in &["switch to ", "change to ", "swap to "] {
        if let Some(rest) = text.strip_prefix(prefix) {
            let rest = rest.trim_start_matches("the ");
            return Some(rest.trim());
        }
    }
    // "use …" — but not "use the best" vs "use case" ambiguity
    if let Some(rest) = text.strip_prefix("use ") {
        let rest = rest.trim_start_matches("the ");
        // Require the remainder to look model-ish (contains "model", a known
        // provider, or "local"/"best"/"offline").
        if looks_like_model_ref(rest) {
            return Some(rest.trim());
        }
    }
    None
}

/// Heuristic: does `text` look like it refers to a model?
fn looks_like_model_ref(text: &str) -> bool {
    let keywords = [
        "model",
        "local",
        "best",
        "flagship",
        "offline",
        "claude",
        "anthropic",
        "gpt",
        "openai",
        "gemini",
        "google",
        "llama",
        "qwen",
        "mistral",
        "deepseek",
    ];
    keywords.iter().any(|k| text.contains(k))
}

/// Map the raw target text to a [`ModelTarget`] variant.
fn parse_model_target(text: &str) -> ModelTarget {
    let text = text
        .trim()
        .trim_end_matches(" model")
        .trim_end_matches(" please");

    match text {
        // Local
        "local" | "offline" | "on-device" | "on device" | "fae-qwen3" | "qwen" => {
            ModelTarget::Local
        }
        // Best
        "best" | "flagship" | "top" | "most capable" => ModelTarget::Best,
        // Known providers
        "claude" | "anthropic" => ModelTarget::ByProvider("anthropic".into()),
        "gpt" | "openai" | "chatgpt" => ModelTarget::ByProvider("openai".into()),
        "gemini" | "google" => ModelTarget::ByProvider("google".into()),
        "llama" | "meta" => ModelTarget::ByProvider("meta".into()),
        "mistral" => ModelTarget::ByProvider("mistral".into()),
        "deepseek" => ModelTarget::ByProvider("deepseek".into()),
        // Anything else — treat as model name
        other => ModelTarget::ByName(other.to_owned()),
    }
}

/// The provider key used for the local on-device model.
const LOCAL_PROVIDER: &str = "fae-local";

/// Resolve a [`ModelTarget`] to a candidate index.
///
/// Given a parsed voice-command target and the list of available model
/// candidates (already sorted by tier/priority), return the index of the
/// best matching candidate, or `None` if no candidate matches.
///
/// # Examples
///
/// ```
/// use fae::voice_command::{resolve_model_target, ModelTarget};
/// use fae::model_selection::ProviderModelRef;
///
/// let candidates = vec![
///     ProviderModelRef::new("anthropic".into(), "claude-opus-4".into(), 0),
///     ProviderModelRef::new("fae-local".into(), "fae-qwen3".into(), 0),
/// ];
/// assert_eq!(resolve_model_target(&ModelTarget::Local, &candidates), Some(1));
/// assert_eq!(resolve_model_target(&ModelTarget::Best, &candidates), Some(0));
/// ```
pub fn resolve_model_target(
    target: &ModelTarget,
    candidates: &[crate::model_selection::ProviderModelRef],
) -> Option<usize> {
    if candidates.is_empty() {
        return None;
    }

    match target {
        ModelTarget::Best => Some(0), // candidates are pre-sorted by tier
        ModelTarget::Local => candidates.iter().position(|c| c.provider == LOCAL_PROVIDER),
        ModelTarget::ByProvider(provider) => candidates
            .iter()
            .position(|c| c.provider.eq_ignore_ascii_case(provider)),
        ModelTarget::ByName(name) => candidates
            .iter()
            .position(|c| c.model.to_lowercase().contains(&name.to_lowercase())),
    }
}

// ---------------------------------------------------------------------------
// TTS acknowledgment helpers
// ---------------------------------------------------------------------------

/// Acknowledgment for a successful model switch.
pub fn switch_acknowledgment(model_name: &str) -> String {
    format!("Switching to {model_name}.")
}

/// Acknowledgment when the requested model is already active.
pub fn already_using_acknowledgment(model_name: &str) -> String {
    format!("I'm already using {model_name}.")
}

/// Response when the requested model cannot be found.
pub fn model_not_found_response(target: &str) -> String {
    format!("I couldn't find a model matching {target}.")
}

/// Response listing all available models and the current one.
pub fn list_models_response(models: &[String], current_idx: usize) -> String {
    if models.is_empty() {
        return "I don't have any models configured.".to_owned();
    }
    let list = models.join(", ");
    let current = models
        .get(current_idx)
        .map_or("unknown", |s| s.as_str());
    format!("I have access to {list}. Currently using {current}.")
}

/// Response stating which model is currently active.
pub fn current_model_response(model_name: &str) -> String {
    format!("I'm currently using {model_name}.")
}

/// Help response listing available model switching commands.
pub fn help_response() -> String {
    "You can say: switch to Claude, use the local model, list models, or what model are you using.".to_owned()
}
