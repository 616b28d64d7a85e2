use once_cell::sync::Lazy;
use serde_json::Value;

use crate::domain::analysis::AiAnalysis;

pub const ANALYSIS_SCHEMA_TEXT: &str = include_str!("../../schemas/analysis-result.schema.json");

static ANALYSIS_SCHEMA: Lazy<Option<Value>> = Lazy::new(|| serde_json::from_str(ANALYSIS_SCHEMA_TEXT).ok());

/// Schema as compact JSON, for embedding into prompts.
pub fn schema_for_prompt() -> String {
    match ANALYSIS_SCHEMA.as_ref() {
        Some(schema) => schema.to_string(),
        None => ANALYSIS_SCHEMA_TEXT.to_string(),
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => false,
    }
}

fn location(path: &str) -> &str {
    if path.is_empty() { "/" } else { path }
}

/// Checks `value` against the subset of JSON Schema used by the analysis
/// contract: type, enum, minimum, maximum, required, properties,
/// additionalProperties and items.
fn validate_node(schema: &Value, value: &Value, path: &str, errors: &mut Vec<String>) {
    if let Some(expected) = schema.get("type") {
        let matches = match expected {
            Value::String(single) => type_matches(single, value),
            Value::Array(options) => options
                .iter()
                .filter_map(Value::as_str)
                .any(|option| type_matches(option, value)),
            _ => true,
        };
        if !matches {
            errors.push(format!("{}: expected type {expected}, got {value}", location(path)));
            return;
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            errors.push(format!("{}: {value} is not one of {}", location(path), Value::Array(allowed.clone())));
        }
    }

    if let Some(number) = value.as_f64() {
        if let Some(minimum) = schema.get("minimum").and_then(Value::as_f64) {
            if number < minimum {
                errors.push(format!("{}: {number} is below minimum {minimum}", location(path)));
            }
        }
        if let Some(maximum) = schema.get("maximum").and_then(Value::as_f64) {
            if number > maximum {
                errors.push(format!("{}: {number} is above maximum {maximum}", location(path)));
            }
        }
    }

    if let Value::Object(fields) = value {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if !fields.contains_key(name) {
                    errors.push(format!("{}: missing required property '{name}'", location(path)));
                }
            }
        }
        let properties = schema.get("properties").and_then(Value::as_object);
        let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));
        for (name, field) in fields {
            match properties.and_then(|properties| properties.get(name)) {
                Some(field_schema) => validate_node(field_schema, field, &format!("{path}/{name}"), errors),
                None if closed => {
                    errors.push(format!("{}: unexpected property '{name}'", location(path)));
                }
                None => {}
            }
        }
    }

    if let (Value::Array(items), Some(item_schema)) = (value, schema.get("items")) {
        for (index, item) in items.iter().enumerate() {
            validate_node(item_schema, item, &format!("{path}/{index}"), errors);
        }
    }
}

/// Validates a parsed model response and converts it to the typed analysis.
pub fn validate_analysis(value: &Value) -> Result<AiAnalysis, Vec<String>> {
    let schema = ANALYSIS_SCHEMA
        .as_ref()
        .ok_or_else(|| vec!["analysis schema unavailable".to_string()])?;
    let mut errors = Vec::new();
    validate_node(schema, value, "", &mut errors);
    if !errors.is_empty() {
        return Err(errors);
    }
    serde_json::from_value(value.clone()).map_err(|err| vec![err.to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_payload() -> Value {
        json!({
            "prediction": {
                "summary": "Receipts rise about 20% over the quarter",
                "values": [{"key": "2026-01-01", "value": 120.0, "horizon": "2026-01-01"}]
            },
            "interpretation": "The increase is driven by the new rate.",
            "risks": [{"factor": "collection", "description": "Lower compliance", "probability": 0.3, "impact": "medium"}],
            "opportunities": [{"description": "Digital payment", "impact": 0.4}],
            "recommendations": [{"priority": 1, "action": "Communicate the change", "justification": "Reduce pushback"}],
            "confidence": 0.72,
            "metadata": {"time": "2026-01-01T00:00:00Z", "weather": "rainy", "economy": null, "demography": {"population": 1}}
        })
    }

    #[test]
    fn schema_file_parses() {
        assert!(ANALYSIS_SCHEMA.is_some());
        assert!(schema_for_prompt().contains("\"recommendations\""));
    }

    #[test]
    fn valid_payload_converts_to_analysis() {
        let analysis = validate_analysis(&valid_payload()).unwrap();
        assert_eq!(analysis.recommendations[0].priority, 1);
        assert_eq!(analysis.metadata.weather.as_deref(), Some("rainy"));
        assert_eq!(analysis.prediction.unwrap().values.len(), 1);
    }

    #[test]
    fn null_prediction_is_allowed() {
        let mut payload = valid_payload();
        payload["prediction"] = Value::Null;
        assert!(validate_analysis(&payload).is_ok());
    }

    #[test]
    fn violations_are_reported_with_paths() {
        let test_cases = vec![
            ("/confidence", json!(1.5)),
            ("/risks", json!([{"description": "x", "probability": 0.2, "impact": "severe"}])),
            ("/opportunities", json!([{"description": "x"}])),
            ("/recommendations", json!([{"priority": 0, "action": "x"}])),
            ("/metadata", json!({"weather": {"temp": 20}})),
        ];

        for (field, replacement) in test_cases {
            let mut payload = valid_payload();
            payload[&field[1..]] = replacement;
            let errors = validate_analysis(&payload).unwrap_err();
            assert!(
                errors.iter().any(|error| error.starts_with(field)),
                "{field}: {errors:?}"
            );
        }
    }

    #[test]
    fn missing_and_unexpected_keys_fail() {
        let mut payload = valid_payload();
        payload.as_object_mut().unwrap().remove("interpretation");
        payload["repercussions"] = json!("extra");

        let errors = validate_analysis(&payload).unwrap_err();

        assert!(errors.iter().any(|error| error.contains("missing required property 'interpretation'")));
        assert!(errors.iter().any(|error| error.contains("unexpected property 'repercussions'")));
    }

    #[test]
    fn fractional_priority_is_not_an_integer() {
        let mut payload = valid_payload();
        payload["recommendations"] = json!([{"priority": 1.5, "action": "x"}]);
        assert!(validate_analysis(&payload).is_err());
    }
}
