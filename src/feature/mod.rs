//! Feature capability contract (C12) and registry (C6).
//!
//! Mirrors the teacher's capability-gated skill trait and collection: a
//! small trait implementors satisfy, held behind `Box<dyn Feature>` in an
//! ordered [`FeatureRegistry`] that additionally supports name lookup.

use crate::error::Result;

/// Polymorphic handler for one conversational capability. Business logic
/// (grocery list, media library, and so on) is out of scope here; this
/// trait only specifies the shape every feature must satisfy.
pub trait Feature: Send {
    /// Stable human-readable label, also the registry lookup key.
    fn name(&self) -> &str;

    /// One-line description shown in listings.
    fn short_description(&self) -> &str;

    /// Longer prose used to help the misheard-command classifier
    /// distinguish this feature from others. Empty disables recovery
    /// consideration for this feature.
    fn description(&self) -> &str;

    /// Fast, side-effect-free predicate over the transcribed text, used
    /// by regex-era matching.
    fn matches(&self, text: &str) -> bool;

    /// Regex-era execution path. Returns the spoken response.
    ///
    /// # Errors
    ///
    /// Returns an error if the feature cannot produce a response.
    fn handle(&mut self, text: &str) -> Result<String>;

    /// Declares structured actions callable via tool-dispatch:
    /// `action name → { param_name → type_tag }`. An empty map means
    /// this feature is not eligible for structured parsing.
    fn action_schema(&self) -> serde_json::Value {
        serde_json::json!({})
    }

    /// Structured dispatch path.
    ///
    /// # Errors
    ///
    /// Returns an error if the action is unknown or execution fails.
    fn execute(&mut self, action: &str, parameters: &serde_json::Value) -> Result<String>;

    /// Current multi-turn state to inject into the next LLM intent
    /// parse, or `None` if this feature has no active flow.
    fn get_llm_context(&self) -> Option<String> {
        None
    }

    /// Whether this feature is mid-flow and the next utterance should be
    /// processed without requiring the wake word.
    fn expects_follow_up(&self) -> bool {
        false
    }

    /// Release resources.
    fn close(&mut self) {}
}

/// An ordered list of features plus a tolerant name index. Iteration
/// order is the priority order used by regex-era matching.
pub struct FeatureRegistry {
    features: Vec<Box<dyn Feature>>,
}

impl FeatureRegistry {
    /// Build a registry from an ordered feature list.
    pub fn new(features: Vec<Box<dyn Feature>>) -> Self {
        Self { features }
    }

    /// All registered features, in priority order.
    pub fn all(&self) -> &[Box<dyn Feature>] {
        &self.features
    }

    /// All registered features, mutably, in priority order.
    pub fn all_mut(&mut self) -> &mut [Box<dyn Feature>] {
        &mut self.features
    }

    /// Look up a feature by name. Accepts the raw name, its lowercase,
    /// and whitespace↔underscore variants; falls back to a substring
    /// match on miss.
    pub fn get(&self, name: &str) -> Option<&dyn Feature> {
        let normalized = normalize(name);
        self.features
            .iter()
            .find(|f| normalize(f.name()) == normalized)
            .map(AsRef::as_ref)
            .or_else(|| {
                self.features
                    .iter()
                    .find(|f| normalize(f.name()).contains(&normalized))
                    .map(AsRef::as_ref)
            })
    }

    /// Look up a feature by name, mutably. See [`FeatureRegistry::get`]
    /// for matching rules.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn Feature + 'static)> {
        let normalized = normalize(name);
        if let Some(pos) = self
            .features
            .iter()
            .position(|f| normalize(f.name()) == normalized)
        {
            return Some(self.features[pos].as_mut());
        }
        self.features
            .iter()
            .position(|f| normalize(f.name()).contains(&normalized))
            .map(|pos| self.features[pos].as_mut())
    }

    /// First feature, in priority order, whose `matches` returns true.
    pub fn find_match(&self, text: &str) -> Option<&str> {
        self.features
            .iter()
            .find(|f| f.matches(text))
            .map(|f| f.name())
    }

    /// Number of registered features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Concatenate `get_llm_context()` output from every feature that
    /// currently has active multi-turn state.
    pub fn active_context(&self) -> Option<String> {
        let parts: Vec<String> = self.features.iter().filter_map(|f| f.get_llm_context()).collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }

    /// Feature schemas for every feature with a non-empty `action_schema`,
    /// used to build the `parse_intent` tool input.
    pub fn action_schemas(&self) -> Vec<serde_json::Value> {
        self.features
            .iter()
            .filter_map(|f| {
                let schema = f.action_schema();
                let is_empty = schema.as_object().map(|o| o.is_empty()).unwrap_or(true);
                if is_empty {
                    None
                } else {
                    Some(serde_json::json!({ "feature": f.name(), "actions": schema }))
                }
            })
            .collect()
    }

    /// Non-empty descriptions, used to gate the recovery stage.
    pub fn descriptions(&self) -> Vec<String> {
        self.features
            .iter()
            .map(|f| f.description().to_owned())
            .filter(|d| !d.is_empty())
            .collect()
    }

    /// Close every feature, logging (not propagating) per-feature
    /// failures.
    pub fn close(&mut self) {
        for feature in &mut self.features {
            feature.close();
        }
    }
}

fn normalize(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubFeature {
        name: &'static str,
        description: &'static str,
        follow_up: bool,
    }

    impl Feature for StubFeature {
        fn name(&self) -> &str {
            self.name
        }

        fn short_description(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            self.description
        }

        fn matches(&self, text: &str) -> bool {
            text.contains(self.name)
        }

        fn handle(&mut self, text: &str) -> Result<String> {
            Ok(format!("handled: {text}"))
        }

        fn execute(&mut self, action: &str, _parameters: &serde_json::Value) -> Result<String> {
            Ok(format!("executed: {action}"))
        }

        fn expects_follow_up(&self) -> bool {
            self.follow_up
        }
    }

    fn registry() -> FeatureRegistry {
        FeatureRegistry::new(vec![
            Box::new(StubFeature {
                name: "grocery_list",
                description: "manages a grocery list",
                follow_up: false,
            }),
            Box::new(StubFeature {
                name: "media_library",
                description: "",
                follow_up: true,
            }),
        ])
    }

    #[test]
    fn lookup_by_exact_name() {
        let reg = registry();
        assert_eq!(reg.get("grocery_list").unwrap().name(), "grocery_list");
    }

    #[test]
    fn lookup_is_case_insensitive_and_whitespace_tolerant() {
        let reg = registry();
        assert_eq!(reg.get("Grocery List").unwrap().name(), "grocery_list");
    }

    #[test]
    fn lookup_falls_back_to_substring_match() {
        let reg = registry();
        assert_eq!(reg.get("grocery").unwrap().name(), "grocery_list");
    }

    #[test]
    fn lookup_miss_returns_none() {
        let reg = registry();
        assert!(reg.get("reminders").is_none());
    }

    #[test]
    fn find_match_returns_first_matching_feature_in_priority_order() {
        let reg = registry();
        assert_eq!(reg.find_match("add to grocery_list please"), Some("grocery_list"));
    }

    #[test]
    fn descriptions_excludes_empty() {
        let reg = registry();
        assert_eq!(reg.descriptions(), vec!["manages a grocery list".to_owned()]);
    }

    #[test]
    fn len_and_is_empty() {
        let reg = registry();
        assert_eq!(reg.len(), 2);
        assert!(!reg.is_empty());
        assert!(FeatureRegistry::new(vec![]).is_empty());
    }
}
