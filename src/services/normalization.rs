use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value, json};

use crate::services::llm_parser::extract_json;

pub const PLACEHOLDER_INTERPRETATION: &str = "placeholder interpretation";
pub const DEFAULT_CONFIDENCE: f64 = 0.5;
pub const DEFAULT_RISK_PROBABILITY: f64 = 0.5;

static ISO_DATETIME_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}").expect("ISO datetime pattern"));

fn ensure(object: &mut Map<String, Value>, key: &str, default: Value) -> bool {
    if object.contains_key(key) {
        return false;
    }
    object.insert(key.to_string(), default);
    true
}

fn is_iso_datetime(text: &str) -> bool {
    ISO_DATETIME_PREFIX.is_match(text)
}

fn normalize_metadata(metadata: &mut Map<String, Value>) -> bool {
    let mut mutated = false;
    let bad_time = matches!(metadata.get("time"), Some(Value::String(time)) if !is_iso_datetime(time));
    if bad_time {
        metadata.insert("time".to_string(), Value::Null);
        mutated = true;
    }
    let bad_weather = metadata
        .get("weather")
        .is_some_and(|weather| !weather.is_null() && !weather.is_string());
    if bad_weather {
        metadata.insert("weather".to_string(), Value::Null);
        mutated = true;
    }
    mutated
}

fn scalar_to_number(value: &Value) -> Value {
    let number = match value {
        Value::Number(_) => return value.clone(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        _ => None,
    };
    number
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn normalize_prediction_values(prediction: &mut Map<String, Value>, months: &[String]) -> bool {
    let Some(Value::Array(values)) = prediction.get_mut("values") else {
        return false;
    };
    match values.first() {
        Some(first) if !first.is_object() => {}
        _ => return false,
    }
    let coerced: Vec<Value> = values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let month = months.get(index);
            json!({
                "key": month.cloned().unwrap_or_else(|| format!("value_{index}")),
                "value": scalar_to_number(value),
                "horizon": month.cloned(),
            })
        })
        .collect();
    *values = coerced;
    true
}

/// Rebuilds each risk from the keys the contract allows.
fn normalize_risks(risks: &mut [Value]) -> bool {
    let mut mutated = false;
    for risk in risks.iter_mut() {
        let Value::Object(fields) = risk else {
            continue;
        };
        let description = match fields.get("description") {
            Some(Value::String(description)) => description.clone(),
            _ => fields
                .get("factor")
                .and_then(Value::as_str)
                .unwrap_or("Unknown risk")
                .to_string(),
        };
        let probability = match fields.get("probability") {
            Some(probability @ Value::Number(_)) => probability.clone(),
            _ => json!(DEFAULT_RISK_PROBABILITY),
        };

        let mut rebuilt = Map::new();
        rebuilt.insert("description".to_string(), Value::String(description));
        rebuilt.insert("probability".to_string(), probability);
        for key in ["factor", "impact"] {
            if let Some(value) = fields.get(key).filter(|value| !value.is_null()) {
                rebuilt.insert(key.to_string(), value.clone());
            }
        }

        if *fields != rebuilt {
            *fields = rebuilt;
            mutated = true;
        }
    }
    mutated
}

/// Repairs an almost-conforming analysis object in place. Returns whether
/// anything changed.
pub fn normalize_value(data: &mut Value, months: &[String]) -> bool {
    let Value::Object(object) = data else {
        return false;
    };
    let mut mutated = false;
    mutated |= ensure(object, "interpretation", json!(PLACEHOLDER_INTERPRETATION));
    mutated |= ensure(object, "risks", json!([]));
    mutated |= ensure(object, "opportunities", json!([]));
    mutated |= ensure(object, "recommendations", json!([]));
    mutated |= ensure(object, "confidence", json!(DEFAULT_CONFIDENCE));
    mutated |= ensure(
        object,
        "metadata",
        json!({"time": null, "weather": null, "economy": null, "demography": null}),
    );

    if let Some(Value::Object(metadata)) = object.get_mut("metadata") {
        mutated |= normalize_metadata(metadata);
    }
    if let Some(Value::Object(prediction)) = object.get_mut("prediction") {
        mutated |= normalize_prediction_values(prediction, months);
    }
    if let Some(Value::Array(risks)) = object.get_mut("risks") {
        mutated |= normalize_risks(risks);
    }
    mutated
}

/// Parses `text` and normalizes it. `None` when the text holds no JSON
/// object or when nothing needed normalizing.
pub fn normalize_shape(text: &str, months: &[String]) -> Option<Value> {
    let mut data = extract_json(text)?;
    normalize_value(&mut data, months).then_some(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::analysis_schema::validate_analysis;

    fn months() -> Vec<String> {
        vec!["2026-01-01".to_string(), "2026-02-01".to_string()]
    }

    #[test]
    fn fills_exactly_the_missing_keys() {
        let text = r#"{"prediction": null, "risks": [], "recommendations": []}"#;

        let normalized = normalize_shape(text, &months()).unwrap();

        let object = normalized.as_object().unwrap();
        assert_eq!(object.len(), 7);
        assert_eq!(normalized["interpretation"], PLACEHOLDER_INTERPRETATION);
        assert_eq!(normalized["opportunities"], json!([]));
        assert_eq!(normalized["confidence"], 0.5);
        assert_eq!(
            normalized["metadata"],
            json!({"time": null, "weather": null, "economy": null, "demography": null})
        );
        assert_eq!(normalized["risks"], json!([]));
        assert_eq!(normalized["prediction"], Value::Null);
        assert!(validate_analysis(&normalized).is_ok());
    }

    #[test]
    fn nothing_to_normalize_returns_none() {
        let text = r#"{"interpretation": "ok", "risks": [], "opportunities": [], "recommendations": [], "confidence": 0.9, "metadata": {}}"#;
        assert_eq!(normalize_shape(text, &months()), None);
    }

    #[test]
    fn unparseable_text_returns_none() {
        assert_eq!(normalize_shape("the model refused", &months()), None);
    }

    #[test]
    fn scalar_prediction_values_use_month_labels() {
        let mut data = json!({"prediction": {"summary": "s", "values": [110, "120.5", 130]}});

        assert!(normalize_value(&mut data, &months()));

        assert_eq!(
            data["prediction"]["values"],
            json!([
                {"key": "2026-01-01", "value": 110, "horizon": "2026-01-01"},
                {"key": "2026-02-01", "value": 120.5, "horizon": "2026-02-01"},
                {"key": "value_2", "value": 130, "horizon": null}
            ])
        );
    }

    #[test]
    fn metadata_time_and_weather_are_sanitized() {
        let mut data = json!({
            "metadata": {"time": "next spring", "weather": {"temp": 21}, "economy": null, "demography": null}
        });

        normalize_value(&mut data, &[]);

        assert_eq!(data["metadata"]["time"], Value::Null);
        assert_eq!(data["metadata"]["weather"], Value::Null);

        let mut iso = json!({"metadata": {"time": "2026-01-01T08:30:00Z", "weather": "dry"}});
        normalize_value(&mut iso, &[]);
        assert_eq!(iso["metadata"]["time"], "2026-01-01T08:30:00Z");
        assert_eq!(iso["metadata"]["weather"], "dry");
    }

    #[test]
    fn risks_gain_description_and_probability() {
        let mut data = json!({"risks": [{"factor": "drought", "impact": "high"}, {"probability": 0.2}]});

        normalize_value(&mut data, &[]);

        assert_eq!(
            data["risks"],
            json!([
                {"factor": "drought", "impact": "high", "description": "drought", "probability": 0.5},
                {"description": "Unknown risk", "probability": 0.2}
            ])
        );
    }

    #[test]
    fn risks_drop_properties_outside_the_contract() {
        let text = r#"{"interpretation": "ok", "risks": [{"factor": "drought", "severity": "high"}],
            "opportunities": [], "recommendations": [], "confidence": 0.6, "metadata": {}}"#;

        let normalized = normalize_shape(text, &months()).unwrap();

        assert_eq!(
            normalized["risks"],
            json!([{"description": "drought", "factor": "drought", "probability": 0.5}])
        );
        assert!(validate_analysis(&normalized).is_ok());
    }

    #[test]
    fn conforming_risks_are_left_alone() {
        let mut risks = vec![json!({"description": "d", "probability": 0.3, "impact": "low"})];

        assert!(!normalize_risks(&mut risks));
    }

    #[test]
    fn iso_pattern_matches_datetimes_only() {
        assert!(is_iso_datetime("2026-01-01T08:30:00"));
        assert!(!is_iso_datetime("2026-01-01"));
    }
}
