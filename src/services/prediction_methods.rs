use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::domain::calendar::Season;
use crate::services::config::ModelServiceConfig;
use crate::services::http_fetch::{HttpFetcher, ProviderError, send_json};

const DEFAULT_BASELINE: f64 = 1_000_000.0;
const DEFAULT_POPULATION: f64 = 1_000_000.0;
const DEFAULT_GDP: f64 = 10_000_000_000.0;
const MAX_SEASONAL_ADJUSTMENT: f64 = 20.0;

/// One estimator's projected change for the month after the history, in percent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MethodResult {
    pub used: bool,
    pub change_percent: f64,
    pub details: String,
}

impl MethodResult {
    fn unused(details: impl Into<String>) -> Self {
        Self {
            used: false,
            change_percent: 0.0,
            details: details.into(),
        }
    }

    fn used(change_percent: f64, details: impl Into<String>) -> Self {
        Self {
            used: true,
            change_percent,
            details: details.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictiveMethods {
    pub baseline: f64,
    pub linear: MethodResult,
    pub seasonal: MethodResult,
    pub learned: MethodResult,
    pub average: Option<f64>,
}

impl PredictiveMethods {
    pub fn used_estimates(&self) -> Vec<f64> {
        [&self.linear, &self.seasonal, &self.learned]
            .into_iter()
            .filter(|method| method.used)
            .map(|method| method.change_percent)
            .collect()
    }

    pub fn spread(&self) -> Option<f64> {
        convergence_spread(&self.used_estimates())
    }
}

/// `(max - min) / |average| * 100` over at least two estimates.
pub fn convergence_spread(estimates: &[f64]) -> Option<f64> {
    if estimates.len() < 2 {
        return None;
    }
    let max = estimates.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = estimates.iter().copied().fold(f64::INFINITY, f64::min);
    if max == min {
        return Some(0.0);
    }
    let average = estimates.iter().sum::<f64>() / estimates.len() as f64;
    if average == 0.0 {
        return Some(f64::INFINITY);
    }
    Some((max - min) / average.abs() * 100.0)
}

pub fn convergence_advisory(spread: f64) -> String {
    if spread <= 5.0 {
        format!(
            "The quantitative methods converge (spread {spread:.1}%). Report a high confidence, above 0.8."
        )
    } else if spread > 10.0 {
        format!(
            "The quantitative methods diverge (spread {spread:.1}%). Report a lower confidence, below 0.7, and explain the disagreement."
        )
    } else {
        format!("The quantitative methods partially agree (spread {spread:.1}%). Report a moderate confidence.")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    pub r2: f64,
}

pub fn linear_regression(x: &[f64], y: &[f64]) -> Option<Regression> {
    let n = x.len();
    if n == 0 || n != y.len() {
        return None;
    }
    let count = n as f64;
    let sum_x: f64 = x.iter().sum();
    let sum_y: f64 = y.iter().sum();
    let sum_xy: f64 = x.iter().zip(y).map(|(xi, yi)| xi * yi).sum();
    let sum_x2: f64 = x.iter().map(|xi| xi * xi).sum();

    let denominator = count * sum_x2 - sum_x * sum_x;
    if denominator.abs() < 1e-10 {
        return Some(Regression {
            slope: 0.0,
            intercept: sum_y / count,
            r2: 0.0,
        });
    }
    let slope = (count * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / count;

    let mean_y = sum_y / count;
    let ss_total: f64 = y.iter().map(|yi| (yi - mean_y).powi(2)).sum();
    let ss_residual: f64 = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| (yi - (slope * xi + intercept)).powi(2))
        .sum();
    let r2 = if ss_total > 0.0 { 1.0 - ss_residual / ss_total } else { 0.0 };

    Some(Regression { slope, intercept, r2 })
}

fn linear_method(history: &[f64], baseline: f64) -> MethodResult {
    if history.len() < 3 {
        return MethodResult::unused("insufficient history (< 3 points)");
    }
    if baseline == 0.0 {
        return MethodResult::unused("last observed value is zero");
    }
    let x: Vec<f64> = (0..history.len()).map(|index| index as f64).collect();
    let Some(regression) = linear_regression(&x, history) else {
        return MethodResult::unused("regression failed");
    };
    let predicted = regression.slope * history.len() as f64 + regression.intercept;
    let trend = if regression.slope > 0.0 { "increasing" } else { "decreasing" };
    MethodResult::used(
        (predicted - baseline) / baseline * 100.0,
        format!("time regression (R²={:.3}, trend={trend})", regression.r2),
    )
}

/// Multiplier applied to receipts of a category during a season.
pub fn seasonal_factor(category: &str, season: Season) -> f64 {
    let category = category.to_lowercase();
    // (spring, summer, autumn, winter)
    let row = if category.contains("foncier") || category.contains("property") {
        [0.85, 1.05, 1.10, 0.95]
    } else if category.contains("professionnelle") || category.contains("business") {
        [0.98, 1.08, 1.05, 0.95]
    } else if category.contains("local") {
        [0.90, 1.10, 1.12, 0.93]
    } else {
        [0.95, 1.12, 1.08, 0.92]
    };
    match season {
        Season::Spring => row[0],
        Season::Summer => row[1],
        Season::Autumn => row[2],
        Season::Winter => row[3],
    }
}

fn seasonal_method(history: &[f64], category: &str, season: Season) -> MethodResult {
    if history.len() < 4 {
        return MethodResult::unused("insufficient history for a 4-month moving average");
    }
    let recent = &history[history.len() - 4..];
    let moving_average = recent.iter().sum::<f64>() / recent.len() as f64;
    let adjustment = ((seasonal_factor(category, season) - 1.0) * 100.0)
        .clamp(-MAX_SEASONAL_ADJUSTMENT, MAX_SEASONAL_ADJUSTMENT);
    MethodResult::used(
        adjustment,
        format!("4-month moving average {moving_average:.2} with {season} factor"),
    )
}

fn season_weight(season: Season) -> f64 {
    match season {
        Season::Spring => 1.05,
        Season::Summer => 1.15,
        Season::Autumn => 1.00,
        Season::Winter => 0.90,
    }
}

/// Remote learned model returning a percent change for a feature vector.
#[async_trait]
pub trait ModelEstimator: Send + Sync {
    async fn predict(&self, features: &[f64]) -> Result<Option<f64>, ProviderError>;
}

pub struct RemoteModelEstimator {
    fetcher: HttpFetcher,
    url: String,
}

impl RemoteModelEstimator {
    /// `None` when no service URL is configured.
    pub fn from_config(config: &ModelServiceConfig) -> Result<Option<Self>, ProviderError> {
        let Some(url) = config.url.as_deref() else {
            return Ok(None);
        };
        let fetcher = HttpFetcher::new(Duration::from_secs(config.timeout_secs), "revsim/0.1")?;
        Ok(Some(Self {
            fetcher,
            url: format!("{}/predict", url.trim_end_matches('/')),
        }))
    }
}

#[async_trait]
impl ModelEstimator for RemoteModelEstimator {
    async fn predict(&self, features: &[f64]) -> Result<Option<f64>, ProviderError> {
        let body = json!({
            "features": [features],
            "modelConfig": {"layers": [8, 4], "epochs": 50, "learningRate": 0.01}
        });
        let response = send_json(self.fetcher.client().post(&self.url).json(&body)).await?;
        Ok(response.pointer("/predictions/0").and_then(Value::as_f64))
    }
}

/// Inputs to the estimators, read from the simulation and its context.
pub struct MethodInputs<'a> {
    pub history: &'a [f64],
    pub category: &'a str,
    pub season: Season,
    pub population: Option<f64>,
    pub gdp: Option<f64>,
}

pub async fn apply_prediction_methods(
    inputs: &MethodInputs<'_>,
    estimator: Option<&dyn ModelEstimator>,
) -> PredictiveMethods {
    let baseline = inputs.history.last().copied().unwrap_or(DEFAULT_BASELINE);
    let linear = linear_method(inputs.history, baseline);
    let seasonal = seasonal_method(inputs.history, inputs.category, inputs.season);

    let learned = match estimator {
        None => MethodResult::unused("no model service configured"),
        Some(estimator) => {
            let features = [
                0.0,
                season_weight(inputs.season),
                inputs.population.unwrap_or(DEFAULT_POPULATION) / 2_000_000.0,
                inputs.gdp.unwrap_or(DEFAULT_GDP) / 20_000_000_000.0,
            ];
            match estimator.predict(&features).await {
                Ok(Some(change)) => MethodResult::used(change, "learned model service"),
                Ok(None) => MethodResult::unused("model service returned no prediction"),
                Err(err) => {
                    warn!(error = %err, "model service unavailable");
                    MethodResult::unused(format!("model service error: {err}"))
                }
            }
        }
    };

    let mut methods = PredictiveMethods {
        baseline,
        linear,
        seasonal,
        learned,
        average: None,
    };
    let estimates = methods.used_estimates();
    if !estimates.is_empty() {
        methods.average = Some(estimates.iter().sum::<f64>() / estimates.len() as f64);
    }
    debug!(average = ?methods.average, "prediction methods applied");
    methods
}
