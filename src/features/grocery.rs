//! Grocery list feature fixture (C12). In-memory only, no persistence —
//! a reference implementation of the Feature contract, not a specified
//! part of the core.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::feature::Feature;

static ANY_GROCERY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b(grocery|shopping)\s+list\b").expect("valid regex"));
static ADD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\badd\s+(.+?)\s+to\s+(?:the\s+)?(?:grocery|shopping)\s+list\b").expect("valid regex")
});
static REMOVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:remove|delete|take off)\s+(.+?)\s+(?:from|off)\s+(?:the\s+)?(?:grocery|shopping)\s+list\b")
        .expect("valid regex")
});
static CLEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:clear|empty|reset)\s+(?:the\s+)?(?:grocery|shopping)\s+list\b").expect("valid regex"));
static LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:what(?:'s| is) on|show|read|list)\s+(?:the\s+)?(?:grocery|shopping)\s+list\b").expect("valid regex")
});

/// In-memory grocery list, reset on process restart.
pub struct GroceryFeature {
    items: Vec<String>,
}

impl GroceryFeature {
    /// Start with an empty list.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    fn add(&mut self, item: &str) -> String {
        if self.items.iter().any(|i| i.eq_ignore_ascii_case(item)) {
            return format!("{item} is already on the grocery list.");
        }
        self.items.push(item.to_owned());
        let count = self.items.len();
        let unit = if count == 1 { "item" } else { "items" };
        format!("Added {item} to the grocery list. You now have {count} {unit}.")
    }

    fn remove(&mut self, item: &str) -> String {
        let Some(pos) = self.items.iter().position(|i| i.eq_ignore_ascii_case(item)) else {
            return format!("{item} is not on the grocery list.");
        };
        let removed = self.items.remove(pos);
        let count = self.items.len();
        let unit = if count == 1 { "item" } else { "items" };
        format!("Removed {removed} from the grocery list. You now have {count} {unit}.")
    }

    fn list(&self) -> String {
        match self.items.as_slice() {
            [] => "The grocery list is empty.".to_owned(),
            [only] => format!("You have one item on the grocery list: {only}."),
            items => {
                let (last, rest) = items.split_last().expect("non-empty");
                format!("You have {} items on the grocery list: {}, and {last}.", items.len(), rest.join(", "))
            }
        }
    }

    fn clear(&mut self) -> String {
        self.items.clear();
        "The grocery list has been cleared.".to_owned()
    }
}

impl Default for GroceryFeature {
    fn default() -> Self {
        Self::new()
    }
}

impl Feature for GroceryFeature {
    fn name(&self) -> &str {
        "grocery_list"
    }

    fn short_description(&self) -> &str {
        "Grocery/shopping list"
    }

    fn description(&self) -> &str {
        "Grocery/shopping list: triggered by \"grocery list\" or \"shopping list\". Commands: \
         \"add X to grocery list\", \"remove X from grocery list\", \"what's on the grocery list\", \
         \"clear the grocery list\"."
    }

    fn matches(&self, text: &str) -> bool {
        ANY_GROCERY.is_match(text)
    }

    fn handle(&mut self, text: &str) -> Result<String> {
        if let Some(caps) = ADD.captures(text) {
            return Ok(self.add(caps[1].trim()));
        }
        if let Some(caps) = REMOVE.captures(text) {
            return Ok(self.remove(caps[1].trim()));
        }
        if CLEAR.is_match(text) {
            return Ok(self.clear());
        }
        if LIST.is_match(text) {
            return Ok(self.list());
        }
        Ok(self.list())
    }

    fn action_schema(&self) -> Value {
        json!({
            "add": {"item": "string"},
            "remove": {"item": "string"},
            "list": {},
            "clear": {},
        })
    }

    fn execute(&mut self, action: &str, parameters: &Value) -> Result<String> {
        match action {
            "add" => {
                let item = parameters
                    .get("item")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::Feature("grocery add requires an item parameter".into()))?;
                Ok(self.add(item))
            }
            "remove" => {
                let item = parameters
                    .get("item")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::Feature("grocery remove requires an item parameter".into()))?;
                Ok(self.remove(item))
            }
            "list" => Ok(self.list()),
            "clear" => Ok(self.clear()),
            other => Err(Error::Feature(format!("unknown grocery action: {other}"))),
        }
    }
}
