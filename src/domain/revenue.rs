use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Reference amount for a revenue stream. Read-only input to a simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueBaseline {
    pub id: String,
    pub name: String,
    pub amount: f64,
    #[serde(default)]
    pub municipality_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionPeriod {
    #[default]
    Monthly,
    Annual,
}

/// A forecast value for one calendar month (`predicted_date` is a first-of-month date).
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionPoint {
    pub predicted_date: NaiveDate,
    pub predicted_amount: f64,
    pub period: PredictionPeriod,
}
