//! Argument checks run before a matched tool is called.
//!
//! Only the structural subset of JSON Schema that tool definitions actually
//! use is enforced: `type` (single or list), `required`, `properties`,
//! `items` and `enum`. Unknown keywords are ignored.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("arguments are not valid JSON: {0}")]
    Malformed(String),

    #[error("{path}: {message}")]
    Schema { path: String, message: String },
}

/// Parse a call's raw arguments and check them against the tool's schema.
///
/// Blank arguments count as `{}`; some backends send nothing at all for
/// zero-parameter functions.
pub fn parse_arguments(arguments_json: &str, schema: &Value) -> Result<Value, ArgumentError> {
    let args = if arguments_json.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(arguments_json)
            .map_err(|e| ArgumentError::Malformed(e.to_string()))?
    };
    check(&args, schema, "$")?;
    Ok(args)
}

fn check(value: &Value, schema: &Value, path: &str) -> Result<(), ArgumentError> {
    let fail = |message: String| ArgumentError::Schema {
        path: path.to_string(),
        message,
    };

    if let Some(expected) = schema.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(single) => vec![single.as_str()],
            Value::Array(many) => many.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| value_matches_type(value, t)) {
            return Err(fail(format!(
                "expected {}, got {}",
                allowed.join(" or "),
                json_type_name(value)
            )));
        }
    }

    if let Some(options) = schema.get("enum").and_then(Value::as_array) {
        if !options.contains(value) {
            return Err(fail(format!("{value} is not one of the allowed values")));
        }
    }

    if let Some(fields) = value.as_object() {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            if let Some(missing) = required
                .iter()
                .filter_map(Value::as_str)
                .find(|name| !fields.contains_key(*name))
            {
                return Err(fail(format!("missing required field '{missing}'")));
            }
        }
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (key, field) in fields {
                if let Some(field_schema) = properties.get(key) {
                    check(field, field_schema, &format!("{path}.{key}"))?;
                }
            }
        }
    }

    if let (Some(items), Some(item_schema)) = (value.as_array(), schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            check(item, item_schema, &format!("{path}[{i}]"))?;
        }
    }

    Ok(())
}

fn value_matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn weather_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "city": { "type": "string" },
                "days": { "type": "integer" },
                "units": { "type": "string", "enum": ["metric", "imperial"] },
                "hours": { "type": "array", "items": { "type": "integer" } }
            },
            "required": ["city"]
        })
    }

    #[test]
    fn accepts_well_formed_arguments() {
        let args = parse_arguments(r#"{"city":"Oslo","days":3}"#, &weather_schema()).unwrap();
        assert_eq!(args["city"], json!("Oslo"));
    }

    #[test]
    fn rejects_invalid_json() {
        let err = parse_arguments(r#"{"city":"#, &weather_schema()).unwrap_err();
        assert!(matches!(err, ArgumentError::Malformed(_)));
    }

    #[test]
    fn blank_arguments_are_an_empty_object() {
        assert_eq!(parse_arguments("  ", &json!({ "type": "object" })).unwrap(), json!({}));
    }

    #[test]
    fn reports_missing_required_field() {
        let err = parse_arguments("{}", &weather_schema()).unwrap_err();
        assert_eq!(err.to_string(), "$: missing required field 'city'");
    }

    #[test]
    fn reports_path_of_nested_type_mismatch() {
        let err = parse_arguments(r#"{"city":"Oslo","hours":[1,"two"]}"#, &weather_schema())
            .unwrap_err();
        assert_eq!(err.to_string(), "$.hours[1]: expected integer, got string");
    }

    #[test]
    fn enforces_enum() {
        let err = parse_arguments(r#"{"city":"Oslo","units":"kelvin"}"#, &weather_schema())
            .unwrap_err();
        assert!(err.to_string().starts_with("$.units:"));
    }

    #[test]
    fn type_lists_accept_any_member() {
        let schema = json!({ "type": "object", "properties": { "v": { "type": ["string", "null"] } } });
        assert!(parse_arguments(r#"{"v":null}"#, &schema).is_ok());
        assert!(parse_arguments(r#"{"v":1}"#, &schema).is_err());
    }

    #[test]
    fn empty_schema_accepts_anything() {
        assert!(parse_arguments(r#"[1,2,3]"#, &json!({})).is_ok());
    }
}
