use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::calendar::Season;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceInfo {
    pub lat: f64,
    pub lon: f64,
    pub display_name: String,
    #[serde(default)]
    pub address: Option<Value>,
}

impl PlaceInfo {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            lat: self.lat,
            lon: self.lon,
        }
    }

    /// ISO country code from the geocoder address block, upper-cased.
    pub fn country_code(&self) -> Option<String> {
        self.address
            .as_ref()
            .and_then(|address| address.get("country_code"))
            .and_then(Value::as_str)
            .map(|code| code.to_ascii_uppercase())
    }

    pub fn city(&self) -> Option<String> {
        let address = self.address.as_ref()?;
        ["city", "town", "village", "municipality"]
            .iter()
            .find_map(|key| address.get(*key).and_then(Value::as_str))
            .map(str::to_string)
    }
}

/// Reduced weather signal kept for prompts and responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactWeather {
    pub location: Option<String>,
    pub temp: Option<f64>,
    pub description: Option<String>,
    pub humidity: Option<f64>,
    pub coords: Option<Coordinates>,
}

impl CompactWeather {
    pub fn from_provider_payload(payload: &Value) -> Self {
        let coords = payload.get("coord").and_then(|coord| {
            Some(Coordinates {
                lat: coord.get("lat")?.as_f64()?,
                lon: coord.get("lon")?.as_f64()?,
            })
        });
        Self {
            location: payload.get("name").and_then(Value::as_str).map(str::to_string),
            temp: payload.pointer("/main/temp").and_then(Value::as_f64),
            description: payload
                .pointer("/weather/0/description")
                .and_then(Value::as_str)
                .map(str::to_string),
            humidity: payload.pointer("/main/humidity").and_then(Value::as_f64),
            coords,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub date: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReducedIndicator {
    pub country: String,
    pub indicator: String,
    pub recent: Vec<IndicatorPoint>,
}

impl ReducedIndicator {
    /// Keeps the first `points` rows of a World Bank `[meta, rows]` payload.
    /// Rows come newest first from the provider.
    pub fn from_world_bank(country: &str, indicator: &str, payload: &Value, points: usize) -> Option<Self> {
        let rows = payload.get(1)?.as_array()?;
        let recent = rows
            .iter()
            .take(points)
            .map(|row| IndicatorPoint {
                date: match row.get("date") {
                    Some(Value::String(date)) => date.clone(),
                    Some(Value::Number(number)) => number.to_string(),
                    _ => String::new(),
                },
                value: row.get("value").and_then(Value::as_f64),
            })
            .collect();
        Some(Self {
            country: country.to_string(),
            indicator: indicator.to_string(),
            recent,
        })
    }

    /// Value for `year`, else the first non-null value.
    pub fn value_for_year(&self, year: i32) -> Option<f64> {
        let year = year.to_string();
        self.recent
            .iter()
            .find(|point| point.date == year && point.value.is_some())
            .or_else(|| self.recent.iter().find(|point| point.value.is_some()))
            .and_then(|point| point.value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EconomicContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<ReducedIndicator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gdp: Option<ReducedIndicator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imf_gdp: Option<Value>,
}

impl EconomicContext {
    pub fn is_empty(&self) -> bool {
        self.population.is_none() && self.gdp.is_none() && self.imf_gdp.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EssentialDemographics {
    pub country: String,
    pub capital: Option<String>,
    pub languages: Vec<String>,
    pub gini: Option<f64>,
    pub region: Option<String>,
    pub population: Option<u64>,
}

impl EssentialDemographics {
    /// Reduces a REST Countries payload (object or array of objects).
    pub fn from_provider_payload(query: &str, payload: &Value) -> Option<Self> {
        let entry = match payload {
            Value::Array(entries) => entries.first()?,
            Value::Object(_) => payload,
            _ => return None,
        };
        let languages = entry
            .get("languages")
            .and_then(Value::as_object)
            .map(|languages| {
                languages
                    .values()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let gini = entry
            .get("gini")
            .and_then(Value::as_object)
            .and_then(|gini| gini.values().next())
            .and_then(Value::as_f64);
        Some(Self {
            country: entry
                .pointer("/name/common")
                .and_then(Value::as_str)
                .unwrap_or(query)
                .to_string(),
            capital: entry
                .pointer("/capital/0")
                .and_then(Value::as_str)
                .map(str::to_string),
            languages,
            gini,
            region: entry.get("region").and_then(Value::as_str).map(str::to_string),
            population: entry.get("population").and_then(Value::as_u64),
        })
    }
}

/// Best-effort context for one simulation. `errors` lists the sub-fetches
/// that failed; the other fields stay populated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<PlaceInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<CompactWeather>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economic: Option<EconomicContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demographics: Option<EssentialDemographics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<Season>,
    #[serde(rename = "_errors", default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compact_weather_picks_expected_fields() {
        let payload = json!({
            "coord": {"lon": 47.5079, "lat": -18.8792},
            "weather": [{"id": 500, "main": "Rain", "description": "light rain"}],
            "main": {"temp": 21.4, "humidity": 83, "pressure": 1019},
            "name": "Antananarivo"
        });

        let weather = CompactWeather::from_provider_payload(&payload);

        assert_eq!(weather.location.as_deref(), Some("Antananarivo"));
        assert_eq!(weather.temp, Some(21.4));
        assert_eq!(weather.description.as_deref(), Some("light rain"));
        assert_eq!(weather.humidity, Some(83.0));
        assert_eq!(weather.coords, Some(Coordinates { lat: -18.8792, lon: 47.5079 }));
    }

    #[test]
    fn world_bank_rows_are_truncated_to_recent_points() {
        let payload = json!([
            {"page": 1, "pages": 1, "total": 4},
            [
                {"date": "2024", "value": 31_000_000.0},
                {"date": "2023", "value": 30_300_000.0},
                {"date": "2022", "value": null},
                {"date": "2021", "value": 28_900_000.0}
            ]
        ]);

        let reduced = ReducedIndicator::from_world_bank("MG", "SP.POP.TOTL", &payload, 3).unwrap();

        assert_eq!(reduced.recent.len(), 3);
        assert_eq!(reduced.recent[0].date, "2024");
        assert_eq!(reduced.recent[2].value, None);
        assert_eq!(reduced.value_for_year(2023), Some(30_300_000.0));
        assert_eq!(reduced.value_for_year(1999), Some(31_000_000.0));
    }

    #[test]
    fn world_bank_error_payload_does_not_reduce() {
        let payload = json!([{"message": [{"id": "120", "value": "Invalid value"}]}]);
        assert!(ReducedIndicator::from_world_bank("XX", "SP.POP.TOTL", &payload, 3).is_none());
    }

    #[test]
    fn demographics_reduce_rest_countries_entry() {
        let payload = json!([{
            "name": {"common": "Madagascar", "official": "Republic of Madagascar"},
            "capital": ["Antananarivo"],
            "region": "Africa",
            "languages": {"fra": "French", "mlg": "Malagasy"},
            "gini": {"2012": 42.6},
            "population": 27691019
        }]);

        let demo = EssentialDemographics::from_provider_payload("MG", &payload).unwrap();

        assert_eq!(demo.country, "Madagascar");
        assert_eq!(demo.capital.as_deref(), Some("Antananarivo"));
        assert_eq!(demo.languages, vec!["French".to_string(), "Malagasy".to_string()]);
        assert_eq!(demo.gini, Some(42.6));
        assert_eq!(demo.region.as_deref(), Some("Africa"));
        assert_eq!(demo.population, Some(27691019));
    }

    #[test]
    fn bundle_serializes_errors_under_underscore_key() {
        let bundle = ContextBundle {
            season: Some(Season::Winter),
            errors: vec!["weather: OPENWEATHER_API_KEY not configured".to_string()],
            ..ContextBundle::default()
        };

        let value = serde_json::to_value(&bundle).unwrap();

        assert_eq!(value["season"], "winter");
        assert_eq!(value["_errors"][0], "weather: OPENWEATHER_API_KEY not configured");
        assert!(value.get("weather").is_none());
    }
}
