//! Intent Router (C7): structured parse → regex → recovery →
//! conversational fallback, with follow-up tracking and route metadata
//! publishing. Grounded in the prior implementation's try-features-then-
//! LLM-fallback router, extended with the structured/recovery stages and
//! `close()`'s per-component failure swallowing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::config::IntentConfig;
use crate::feature::FeatureRegistry;
use crate::llm::{IntentType, LastCallInfo, Llm, ParsedIntent, NO_CORRECTION};

/// Which stage ultimately produced the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingPath {
    /// Structured `parse_intent` tool call.
    LlmParse,
    /// Regex-era `Feature::matches`/`handle`.
    Regex,
    /// Misheard-command recovery followed by a regex match.
    Recovery,
    /// Conversational `respond` fallback.
    LlmFallback,
}

/// Route metadata published after each `route` call, for telemetry.
#[derive(Debug, Clone)]
pub struct RouteInfo {
    /// Which stage produced the response.
    pub path: RoutingPath,
    /// Feature that handled the action, if any.
    pub matched_feature: Option<String>,
    /// Structured action name, if routed via `LlmParse`.
    pub feature_action: Option<String>,
}

/// Routes one transcribed utterance through the LLM-first/regex-fallback
/// pipeline, tracking follow-up state across exchanges.
pub struct IntentRouter {
    config: IntentConfig,
    last_route_info: Option<RouteInfo>,
    last_llm_calls: Vec<LastCallInfo>,
    expects_follow_up: bool,
}

impl IntentRouter {
    /// Build a router from configuration.
    pub fn new(config: IntentConfig) -> Self {
        Self {
            config,
            last_route_info: None,
            last_llm_calls: Vec::new(),
            expects_follow_up: false,
        }
    }

    /// Route `text` through the registered features and LLM, recording
    /// the exchange into LLM history on every successful path.
    pub fn route(&mut self, text: &str, features: &mut FeatureRegistry, llm: &mut dyn Llm) -> String {
        self.last_llm_calls.clear();

        if let Some(response) = self.try_structured_parse(text, features, llm) {
            return response;
        }

        if let Some(response) = self.try_regex(text, features) {
            self.record_path(RoutingPath::Regex, self.last_route_info.as_ref().and_then(|r| r.matched_feature.clone()), None);
            llm.record_exchange(text, &response);
            return response;
        }

        if self.config.recovery_enabled && !features.descriptions().is_empty() {
            if let Some(response) = self.try_recovery(text, features, llm) {
                return response;
            }
        }

        let response = llm.respond(text);
        self.last_llm_calls.push(llm.last_call_info());
        self.record_path(RoutingPath::LlmFallback, None, None);
        self.expects_follow_up = false;
        response
    }

    fn try_structured_parse(
        &mut self,
        text: &str,
        features: &mut FeatureRegistry,
        llm: &mut dyn Llm,
    ) -> Option<String> {
        let schemas = features.action_schemas();
        if schemas.is_empty() {
            return None;
        }
        let context = features.active_context();
        let parsed = llm.parse_intent(text, &schemas, context.as_deref());
        self.last_llm_calls.push(llm.last_call_info());
        let parsed = parsed?;

        match parsed.kind {
            IntentType::Action => self.dispatch_action(text, &parsed, features, llm),
            IntentType::Conversation => {
                llm.record_exchange(text, &parsed.speech);
                self.record_path(RoutingPath::LlmParse, None, None);
                self.expects_follow_up = parsed.expects_follow_up;
                Some(parsed.speech)
            }
            IntentType::Clarification => {
                llm.record_exchange(text, &parsed.speech);
                self.record_path(RoutingPath::LlmParse, None, None);
                self.expects_follow_up = true;
                Some(parsed.speech)
            }
        }
    }

    fn dispatch_action(
        &mut self,
        text: &str,
        parsed: &ParsedIntent,
        features: &mut FeatureRegistry,
        llm: &mut dyn Llm,
    ) -> Option<String> {
        let feature_name = parsed.feature.as_deref()?;
        let action = parsed.action.as_deref().unwrap_or_default();
        let parameters = parsed.parameters.clone().unwrap_or_else(|| Value::Object(Default::default()));

        let feature = features.get_mut(feature_name)?;
        match feature.execute(action, &parameters) {
            Ok(result) => {
                llm.record_exchange(text, &result);
                self.record_path(RoutingPath::LlmParse, Some(feature_name.to_owned()), Some(action.to_owned()));
                self.expects_follow_up = feature.expects_follow_up() || parsed.expects_follow_up;
                Some(result)
            }
            Err(e) => {
                warn!("feature '{feature_name}' failed to execute action '{action}': {e}");
                llm.record_exchange(text, &parsed.speech);
                self.record_path(RoutingPath::LlmParse, Some(feature_name.to_owned()), Some(action.to_owned()));
                self.expects_follow_up = feature.expects_follow_up() || parsed.expects_follow_up;
                Some(parsed.speech.clone())
            }
        }
    }

    fn try_regex(&mut self, text: &str, features: &mut FeatureRegistry) -> Option<String> {
        let name = features.find_match(text)?.to_owned();
        let feature = features.get_mut(&name)?;
        match feature.handle(text) {
            Ok(result) => {
                self.expects_follow_up = feature.expects_follow_up();
                self.last_route_info = Some(RouteInfo {
                    path: RoutingPath::Regex,
                    matched_feature: Some(name),
                    feature_action: None,
                });
                Some(result)
            }
            Err(e) => {
                warn!("feature '{name}' failed to handle text: {e}");
                None
            }
        }
    }

    fn try_recovery(&mut self, text: &str, features: &mut FeatureRegistry, llm: &mut dyn Llm) -> Option<String> {
        let descriptions = features.descriptions();
        let corrected = llm.classify_intent(text, &descriptions)?;
        self.last_llm_calls.push(llm.last_call_info());
        if corrected == NO_CORRECTION {
            return None;
        }

        let name = features.find_match(&corrected)?.to_owned();
        let feature = features.get_mut(&name)?;
        let result = feature.handle(&corrected).ok()?;
        self.expects_follow_up = feature.expects_follow_up();
        llm.record_exchange(text, &result);
        self.record_path(RoutingPath::Recovery, Some(name), None);
        Some(result)
    }

    fn record_path(&mut self, path: RoutingPath, matched_feature: Option<String>, feature_action: Option<String>) {
        self.last_route_info = Some(RouteInfo {
            path,
            matched_feature,
            feature_action,
        });
    }

    /// Route metadata from the most recent `route` call.
    pub fn last_route_info(&self) -> Option<&RouteInfo> {
        self.last_route_info.as_ref()
    }

    /// LLM calls harvested during the most recent `route` call.
    pub fn last_llm_calls(&self) -> &[LastCallInfo] {
        &self.last_llm_calls
    }

    /// The router's effective follow-up signal: the last-matched
    /// feature's own `expects_follow_up` wins over the last LLM-signalled
    /// value, since only the feature knows whether its internal flow is
    /// genuinely active.
    pub fn expects_follow_up(&self) -> bool {
        self.expects_follow_up
    }

    /// Close every feature and the LLM, logging (not propagating)
    /// per-component failures.
    pub fn close(&mut self, features: &mut FeatureRegistry, llm: &mut dyn Llm) {
        features.close();
        llm.clear_history();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::error::Result;
    use crate::feature::Feature;
    use crate::llm::ScriptedLlm;

    struct GroceryFeature {
        description: &'static str,
    }

    impl Feature for GroceryFeature {
        fn name(&self) -> &str {
            "grocery_list"
        }
        fn short_description(&self) -> &str {
            "grocery list"
        }
        fn description(&self) -> &str {
            self.description
        }
        fn matches(&self, text: &str) -> bool {
            text.contains("grocery")
        }
        fn handle(&mut self, _text: &str) -> Result<String> {
            Ok("The grocery list is empty.".to_owned())
        }
        fn action_schema(&self) -> Value {
            serde_json::json!({ "add": { "item": "string" } })
        }
        fn execute(&mut self, action: &str, parameters: &Value) -> Result<String> {
            assert_eq!(action, "add");
            let item = parameters["item"].as_str().unwrap_or_default();
            Ok(format!("Added {item} to the grocery list. You now have 1 item."))
        }
    }

    fn llm_config() -> LlmConfig {
        LlmConfig {
            max_history: 20,
            history_ttl_s: 1800,
            intent_max_tokens: 256,
        }
    }

    #[test]
    fn structured_parse_dispatches_to_feature_action() {
        let mut registry = FeatureRegistry::new(vec![Box::new(GroceryFeature { description: "manages groceries" })]);
        let mut llm = ScriptedLlm::new("fixture", &llm_config());
        llm.script_parse(
            "add milk to the grocery list",
            ParsedIntent {
                kind: IntentType::Action,
                feature: Some("grocery_list".to_owned()),
                action: Some("add".to_owned()),
                parameters: Some(serde_json::json!({ "item": "milk" })),
                speech: "Adding milk.".to_owned(),
                expects_follow_up: false,
            },
        );
        let mut router = IntentRouter::new(IntentConfig { recovery_enabled: true });

        let response = router.route("add milk to the grocery list", &mut registry, &mut llm);
        assert_eq!(response, "Added milk to the grocery list. You now have 1 item.");
        assert_eq!(router.last_route_info().unwrap().path, RoutingPath::LlmParse);
        assert_eq!(router.last_route_info().unwrap().matched_feature.as_deref(), Some("grocery_list"));
    }

    #[test]
    fn falls_through_to_regex_when_parse_intent_returns_none() {
        let mut registry = FeatureRegistry::new(vec![Box::new(GroceryFeature { description: "manages groceries" })]);
        let mut llm = ScriptedLlm::new("fixture", &llm_config());
        let mut router = IntentRouter::new(IntentConfig { recovery_enabled: true });

        let response = router.route("what's on the grocery list", &mut registry, &mut llm);
        assert_eq!(response, "The grocery list is empty.");
        assert_eq!(router.last_route_info().unwrap().path, RoutingPath::Regex);
    }

    #[test]
    fn recovery_corrects_misheard_text_then_matches_regex() {
        let mut registry = FeatureRegistry::new(vec![Box::new(GroceryFeature { description: "manages groceries" })]);
        let mut llm = ScriptedLlm::new("fixture", &llm_config());
        llm.script_classify("what is on the gross free list", "what is on the grocery list");
        let mut router = IntentRouter::new(IntentConfig { recovery_enabled: true });

        let response = router.route("what is on the gross free list", &mut registry, &mut llm);
        assert_eq!(response, "The grocery list is empty.");
        assert_eq!(router.last_route_info().unwrap().path, RoutingPath::Recovery);
    }

    #[test]
    fn conversational_fallback_when_nothing_matches() {
        let mut registry = FeatureRegistry::new(vec![Box::new(GroceryFeature { description: "manages groceries" })]);
        let mut llm = ScriptedLlm::new("fixture", &llm_config());
        llm.script_respond("what time is it", "I don't have a clock handy.");
        let mut router = IntentRouter::new(IntentConfig { recovery_enabled: true });

        let response = router.route("what time is it", &mut registry, &mut llm);
        assert_eq!(response, "I don't have a clock handy.");
        assert_eq!(router.last_route_info().unwrap().path, RoutingPath::LlmFallback);
        assert!(!router.expects_follow_up());
    }

    #[test]
    fn recovery_disabled_skips_straight_to_fallback() {
        let mut registry = FeatureRegistry::new(vec![Box::new(GroceryFeature { description: "manages groceries" })]);
        let mut llm = ScriptedLlm::new("fixture", &llm_config());
        llm.script_classify("gross free list", "grocery list");
        llm.script_respond("gross free list", "apology");
        let mut router = IntentRouter::new(IntentConfig { recovery_enabled: false });

        let response = router.route("gross free list", &mut registry, &mut llm);
        assert_eq!(response, "apology");
        assert_eq!(router.last_route_info().unwrap().path, RoutingPath::LlmFallback);
    }

    #[test]
    fn structured_parse_with_no_eligible_feature_schemas_falls_through() {
        struct NoSchemaFeature;
        impl Feature for NoSchemaFeature {
            fn name(&self) -> &str {
                "noop"
            }
            fn short_description(&self) -> &str {
                "noop"
            }
            fn description(&self) -> &str {
                ""
            }
            fn matches(&self, _text: &str) -> bool {
                false
            }
            fn handle(&mut self, _text: &str) -> Result<String> {
                Ok(String::new())
            }
            fn execute(&mut self, _action: &str, _parameters: &Value) -> Result<String> {
                Ok(String::new())
            }
        }

        let mut registry = FeatureRegistry::new(vec![Box::new(NoSchemaFeature)]);
        let mut llm = ScriptedLlm::new("fixture", &llm_config());
        llm.script_respond("hello", "hi");
        let mut router = IntentRouter::new(IntentConfig { recovery_enabled: true });

        let response = router.route("hello", &mut registry, &mut llm);
        assert_eq!(response, "hi");
        assert_eq!(router.last_route_info().unwrap().path, RoutingPath::LlmFallback);
    }
}
