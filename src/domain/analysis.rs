use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const FALLBACK_INTERPRETATION: &str =
    "Fallback minimal structured response due to repeated LLM validation failures";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Negative,
    Positive,
    Neutral,
}

impl RiskLevel {
    pub fn from_delta(delta: f64) -> Self {
        if delta < 0.0 {
            RiskLevel::Negative
        } else if delta > 0.0 {
            RiskLevel::Positive
        } else {
            RiskLevel::Neutral
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Negative => "negative",
            RiskLevel::Positive => "positive",
            RiskLevel::Neutral => "neutral",
        };
        f.write_str(label)
    }
}

/// Month-indexed baseline/simulated series and their aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericProjection {
    pub months: Vec<String>,
    pub baseline_series: Vec<f64>,
    pub simulated_series: Vec<f64>,
    pub baseline_total: f64,
    pub simulated_total: f64,
    pub delta_total: f64,
    pub percent_change: Option<f64>,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionValue {
    pub key: String,
    pub value: f64,
    pub horizon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiPrediction {
    pub summary: String,
    pub values: Vec<PredictionValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiRisk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factor: Option<String>,
    pub description: String,
    pub probability: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<Impact>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiOpportunity {
    pub description: String,
    pub impact: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiRecommendation {
    pub priority: u32,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economy: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demography: Option<Value>,
}

/// Structured narrative analysis accepted from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiAnalysis {
    #[serde(default)]
    pub prediction: Option<AiPrediction>,
    pub interpretation: String,
    pub risks: Vec<AiRisk>,
    pub opportunities: Vec<AiOpportunity>,
    pub recommendations: Vec<AiRecommendation>,
    pub confidence: f64,
    #[serde(default)]
    pub metadata: AiMetadata,
}

impl AiAnalysis {
    pub fn fallback() -> Self {
        Self {
            prediction: None,
            interpretation: FALLBACK_INTERPRETATION.to_string(),
            risks: Vec::new(),
            opportunities: Vec::new(),
            recommendations: Vec::new(),
            confidence: 0.0,
            metadata: AiMetadata::default(),
        }
    }
}

/// How the pipeline arrived at the stored analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Accepted,
    Normalized,
    Retried,
    Fallback,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Disposition::Accepted => "accepted",
            Disposition::Normalized => "normalized",
            Disposition::Retried => "retried",
            Disposition::Fallback => "fallback",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: String,
    pub simulation_id: String,
    pub result: NumericProjection,
    pub summary: String,
    #[serde(default)]
    pub ai_analysis: Option<AiAnalysis>,
    #[serde(default)]
    pub ai_raw: Option<String>,
    #[serde(default)]
    pub ai_provider: Option<String>,
    #[serde(default)]
    pub ai_model: Option<String>,
    #[serde(default)]
    pub ai_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ai_disposition: Option<Disposition>,
    #[serde(default)]
    pub ai_error: Option<String>,
    #[serde(default)]
    pub municipality_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn numeric_only(
        simulation_id: &str,
        result: NumericProjection,
        municipality_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let summary = summarize(&result);
        Self {
            id: Uuid::new_v4().to_string(),
            simulation_id: simulation_id.to_string(),
            result,
            summary,
            ai_analysis: None,
            ai_raw: None,
            ai_provider: None,
            ai_model: None,
            ai_at: None,
            ai_disposition: None,
            ai_error: None,
            municipality_id,
            created_at: now,
            updated_at: now,
        }
    }
}

pub fn summarize(result: &NumericProjection) -> String {
    let percent = match result.percent_change {
        Some(percent) => format!("{percent:.2}%"),
        None => "N/A".to_string(),
    };
    format!(
        "{} impact: {:.2} ({})",
        result.risk_level, result.delta_total, percent
    )
}
