//! Tool argument validation against JSON schemas.
//!
//! Validates that tool call arguments from the LLM conform to the
//! tool's declared JSON schema. Checks required fields, type constraints,
//! and basic structural correctness.
//!
//! # Examples
//!
//! ```
//! use fae::fae_llm::agent::validation::validate_tool_args;
//!
//! let schema = serde_json::json!({
//!     "type": "object",
//!     "properties": {
//!         "path": { "type": "string" }
//!     },
//!     "required": ["path"]
//! });
//!
//! let result = validate_tool_args("read", r#"{"path": "main.rs"}"#, &schema);
//! assert!(result.is_ok());
//! ```

use crate::fae_llm::error::FaeLlmError;

/// Validate tool arguments JSON against a JSON schema.
///
/// Parses `args_json` as JSON, then validates against `schema`:
/// - All fields listed in `"required"` must be present
/// - Field types must match those declared in `"properties"`
/// - Extra fields not in the schema are allowed (open schema)
///
/// # Arguments
///
/// * `tool_name` — Name of the tool (for error messages)
/// * `args_json` — Raw JSON string from the LLM
/// * `schema` — JSON Schema for the tool's parameters
///
/// # Errors
///
/// Returns [`FaeLlmError::ToolError`] if:
/// - `args_json` is not valid JSON
/// - A required field is missing
/// - A field has the wrong type
pub fn validate_tool_args(
    tool_name: &str,
    args_json: &str,
    schema: &serde_json::Value,
) -> Result<serde_json::Value, FaeLlmError> {
    // Parse JSON
    let value: serde_json::Value = serde_json::from_str(args_json).map_err(|e| {
        FaeLlmError::ToolError(format!("tool '{tool_name}': invalid JSON arguments: {e}"))
    })?;

    // Schema must describe an object
    let schema_type = schema.get("type").and_then(|t| t.as_str()).unwrap_or("");
    if schema_type != "object" {
        // Non-object schemas — just return the parsed value
        return Ok(value);
    }

    // Arguments must be an object
    let obj = value.as_object().ok_or_else(|| {
        FaeLlmError::ToolError(format!(
            "tool '{tool_name}': expected object arguments, got {}",
            json_type_name(&value)
        ))
    })?;

    // Check required fields
    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for req_field in required {
            if let Some(field_name) = req_field.as_str()
                && !obj.contains_key(field_name)
            {
                return Err(FaeLlmError::ToolError(format!(
                    "tool '{tool_name}': missing required field '{field_name}'"
                )));
            }
        }
    }

    // Validate field types against properties schema
    if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
        for (key, val) in obj {
            if let Some(prop_schema) = properties.get(key) {
                validate_field_type(tool_name, key, val, prop_schema)?;
            }
            // Extra fields not in schema are allowed (open schema)
        }
    }

    Ok(value)
}

/// Validate that a single field's value matches its schema type.
fn validate_field_type(
    tool_name: &str,
    field_name: &str,
    value: &serde_json::Value,
    prop_schema: &serde_json::Value,
) -> Result<(), FaeLlmError> {
    let expected_type = match prop_schema.get("type").and_then(|t| t.as_str()) {
        Some(t) => t,
        None => return Ok(()), // No type constraint — anything goes
    };

    let matches = match expected_type {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true, // Unknown type — don't reject
    };

    if !matches {
        return Err(FaeLlmError::ToolError(format!(
            "tool '{tool_name}': field '{field_name}' expected {expected_type}, got {}",
            json_type_name(value)
        )));
    }

    Ok(())
}

/// Get a human-readable name for a JSON value's type.
fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "integer"
            } else {
                "number"
            }
        }
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
