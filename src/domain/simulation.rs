use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::calendar::Season;
use crate::domain::context::Coordinates;
use crate::domain::revenue::RevenueBaseline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Monthly,
    Annual,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Monthly => f.write_str("monthly"),
            Frequency::Annual => f.write_str("annual"),
        }
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(Frequency::Monthly),
            "annual" | "yearly" => Ok(Frequency::Annual),
            other => Err(format!("unknown frequency: {other}")),
        }
    }
}

/// Caller-supplied context that replaces fetched signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economic: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demographic: Option<Value>,
}

impl ContextOverrides {
    pub fn is_empty(&self) -> bool {
        self.weather.is_none() && self.economic.is_none() && self.demographic.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameters {
    pub revenue_id: String,
    pub new_amount: f64,
    pub frequency: Frequency,
    pub duration_months: u32,
    pub start_date: NaiveDate,
    pub currency: String,
    #[serde(default)]
    pub season: Option<Season>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub location: Option<Coordinates>,
    #[serde(default)]
    pub municipality_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(skip)]
    pub overrides: ContextOverrides,
}

impl SimulationParameters {
    pub fn new(
        revenue_id: &str,
        new_amount: f64,
        frequency: Frequency,
        duration_months: u32,
        start_date: NaiveDate,
        currency: &str,
    ) -> Self {
        Self {
            revenue_id: revenue_id.to_string(),
            new_amount,
            frequency,
            duration_months,
            start_date,
            currency: currency.to_string(),
            season: None,
            city: None,
            country: None,
            location: None,
            municipality_id: None,
            note: None,
            overrides: ContextOverrides::default(),
        }
    }

    pub fn wants_context(&self) -> bool {
        self.city.is_some() || self.location.is_some() || self.country.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationStatus {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SimulationStatus::Running => "running",
            SimulationStatus::Completed => "completed",
            SimulationStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Simulation {
    pub id: String,
    pub parameters: SimulationParameters,
    pub original_amount: f64,
    pub recipe_type: String,
    #[serde(default)]
    pub weather_context: Option<Value>,
    #[serde(default)]
    pub economic_context: Option<Value>,
    #[serde(default)]
    pub demographic_context: Option<Value>,
    #[serde(default)]
    pub context_errors: Vec<String>,
    pub status: SimulationStatus,
    #[serde(default)]
    pub municipality_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Simulation {
    /// New run in `running` state with context snapshots taken from the overrides.
    pub fn start(parameters: SimulationParameters, revenue: &RevenueBaseline, now: DateTime<Utc>) -> Self {
        let municipality_id = parameters
            .municipality_id
            .clone()
            .or_else(|| revenue.municipality_id.clone());
        Self {
            id: Uuid::new_v4().to_string(),
            weather_context: parameters.overrides.weather.clone(),
            economic_context: parameters.overrides.economic.clone(),
            demographic_context: parameters.overrides.demographic.clone(),
            parameters,
            original_amount: revenue.amount,
            recipe_type: revenue.name.clone(),
            context_errors: Vec::new(),
            status: SimulationStatus::Running,
            municipality_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = SimulationStatus::Completed;
        self.updated_at = now;
    }
}
