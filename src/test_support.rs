use std::collections::VecDeque;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;

use crate::domain::analysis::{NumericProjection, RiskLevel};
use crate::domain::revenue::RevenueBaseline;
use crate::domain::simulation::{Frequency, Simulation, SimulationParameters};
use crate::services::geocoding::{GeocodeHit, GeocodingProvider};
use crate::services::http_fetch::ProviderError;
use crate::services::llm_provider::{GenerativeModel, LlmError};

pub fn on_date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn geocode_hit(lat: &str, lon: &str, bbox: &[&str]) -> GeocodeHit {
    GeocodeHit {
        lat: lat.to_string(),
        lon: lon.to_string(),
        display_name: Some(format!("{lat}, {lon}")),
        boundingbox: bbox.iter().map(|value| value.to_string()).collect(),
        address: Some(serde_json::json!({"country_code": "mg"})),
    }
}

// Replays scripted answers, then returns no results.
pub struct ScriptedGeocoder {
    script: Mutex<VecDeque<Result<Vec<GeocodeHit>, ProviderError>>>,
    call_times: Mutex<Vec<Instant>>,
}

impl ScriptedGeocoder {
    pub fn new(script: Vec<Result<Vec<GeocodeHit>, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            call_times: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.call_times.lock().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().clone()
    }
}

#[async_trait]
impl GeocodingProvider for ScriptedGeocoder {
    async fn search(&self, _query: &str, _country_filter: &str, _limit: u32) -> Result<Vec<GeocodeHit>, ProviderError> {
        self.call_times.lock().push(Instant::now());
        self.script.lock().pop_front().unwrap_or(Ok(vec![]))
    }
}

// Replays scripted replies, then reports empty output.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    fn provider(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().push(prompt.to_string());
        self.script.lock().pop_front().unwrap_or(Err(LlmError::EmptyResponse))
    }
}

pub fn sample_simulation() -> Simulation {
    let revenue = RevenueBaseline {
        id: "rev-1".to_string(),
        name: "Taxe de marché".to_string(),
        amount: 1_000_000.0,
        municipality_id: None,
    };
    let parameters =
        SimulationParameters::new("rev-1", 1_200_000.0, Frequency::Monthly, 3, on_date(2026, 1, 1), "MGA");
    Simulation::start(parameters, &revenue, Utc.with_ymd_and_hms(2026, 1, 2, 9, 0, 0).unwrap())
}

pub fn sample_projection() -> NumericProjection {
    NumericProjection {
        months: vec![
            "2026-01-01".to_string(),
            "2026-02-01".to_string(),
            "2026-03-01".to_string(),
        ],
        baseline_series: vec![100.0, 200.0, 300.0],
        simulated_series: vec![200_100.0, 200_200.0, 200_300.0],
        baseline_total: 600.0,
        simulated_total: 600_600.0,
        delta_total: 600_000.0,
        percent_change: Some(100_000.0),
        risk_level: RiskLevel::Positive,
    }
}
