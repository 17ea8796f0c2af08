//! Structural validation of tool arguments against their declared JSON
//! schema.
//!
//! Covers the subset the tool catalog actually uses: object shape,
//! `required` members, primitive property types, `enum` values, and typed
//! array items. Anything a schema does not declare passes through — the
//! typed deserialization inside each handler remains the second line.

use serde_json::Value;

/// Validate `args` against `schema`. Returns the first violation found.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), String> {
    validate_value(schema, args, "$")
}

fn validate_value(schema: &Value, value: &Value, path: &str) -> Result<(), String> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        check_type(expected, value, path)?;
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(format!("{path}: value is not one of the allowed options"));
        }
    }

    if value.is_object() {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if value.get(name).map_or(true, Value::is_null) {
                    return Err(format!("{path}: missing required property '{name}'"));
                }
            }
        }
        if let Some(props) = schema.get("properties").and_then(Value::as_object) {
            for (name, prop_schema) in props {
                if let Some(prop_value) = value.get(name) {
                    if prop_value.is_null() {
                        continue;
                    }
                    validate_value(prop_schema, prop_value, &format!("{path}.{name}"))?;
                }
            }
        }
    }

    if let (Some(items_schema), Some(items)) = (schema.get("items"), value.as_array()) {
        for (i, item) in items.iter().enumerate() {
            validate_value(items_schema, item, &format!("{path}[{i}]"))?;
        }
    }

    Ok(())
}

fn check_type(expected: &str, value: &Value, path: &str) -> Result<(), String> {
    let ok = match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "null" => value.is_null(),
        other => {
            tracing::warn!(declared = other, "unknown schema type, skipping check");
            true
        }
    };
    if ok {
        Ok(())
    } else {
        Err(format!("{path}: expected {expected}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bed_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "bed": { "type": "string" },
                "patient": { "type": "string" },
                "status": { "type": "string", "enum": ["available", "maintenance"] },
                "quantity": { "type": "integer" },
                "tags": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["bed"]
        })
    }

    #[test]
    fn accepts_valid_arguments() {
        let args = json!({"bed": "101A", "quantity": 3, "tags": ["icu"]});
        assert!(validate_args(&bed_schema(), &args).is_ok());
    }

    #[test]
    fn rejects_missing_required() {
        let args = json!({"patient": "P001"});
        let err = validate_args(&bed_schema(), &args).unwrap_err();
        assert!(err.contains("bed"), "{err}");
    }

    #[test]
    fn null_counts_as_missing_for_required() {
        let args = json!({"bed": null});
        assert!(validate_args(&bed_schema(), &args).is_err());
    }

    #[test]
    fn rejects_wrong_primitive_type() {
        let args = json!({"bed": "101A", "quantity": "three"});
        let err = validate_args(&bed_schema(), &args).unwrap_err();
        assert!(err.contains("quantity"), "{err}");
    }

    #[test]
    fn rejects_value_outside_enum() {
        let args = json!({"bed": "101A", "status": "occupied"});
        assert!(validate_args(&bed_schema(), &args).is_err());
    }

    #[test]
    fn rejects_non_object_payload_for_object_schema() {
        assert!(validate_args(&bed_schema(), &json!("101A")).is_err());
    }

    #[test]
    fn checks_array_items() {
        let args = json!({"bed": "101A", "tags": ["icu", 7]});
        let err = validate_args(&bed_schema(), &args).unwrap_err();
        assert!(err.contains("tags[1]"), "{err}");
    }

    #[test]
    fn undeclared_properties_pass() {
        let args = json!({"bed": "101A", "unknown_extra": {"x": 1}});
        assert!(validate_args(&bed_schema(), &args).is_ok());
    }
}
