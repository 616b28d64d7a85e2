use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::domain::analysis::{AnalysisResult, Disposition, NumericProjection, RiskLevel};
use crate::domain::calendar::{Season, last_month, month_key, month_sequence, preceding_months};
use crate::domain::context::{ContextBundle, ReducedIndicator};
use crate::domain::revenue::{PredictionPeriod, PredictionPoint};
use crate::domain::simulation::{Frequency, Simulation, SimulationParameters};
use crate::services::ai_pipeline::{AnalysisPipeline, build_prompt};
use crate::services::context::ContextService;
use crate::services::data_source::{PredictionStore, RevenueStore, SimulationStore, StoreError};
use crate::services::prediction_methods::{
    MethodInputs, ModelEstimator, PredictiveMethods, apply_prediction_methods,
};
use crate::services::simulation_types::EnrichmentContext;

const HISTORY_MONTHS: u32 = 12;

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid simulation parameters: {0}")]
    InvalidParameters(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A persisted simulation together with its analysis.
#[derive(Debug, Clone)]
pub struct SimulationRun {
    pub simulation: Simulation,
    pub analysis: AnalysisResult,
}

pub fn build_months(start_date: NaiveDate, duration_months: u32) -> Result<Vec<NaiveDate>, SimulationError> {
    month_sequence(start_date, duration_months).ok_or_else(|| out_of_range(start_date, duration_months))
}

fn out_of_range(start_date: NaiveDate, duration_months: u32) -> SimulationError {
    SimulationError::InvalidParameters(format!(
        "duration_months {duration_months} from {start_date} runs past the supported date range"
    ))
}

/// Predicted amount for each month; months without a prediction count as 0.
/// When a month has several predictions the last one wins.
pub fn baseline_series(months: &[NaiveDate], predictions: &[PredictionPoint]) -> Vec<f64> {
    let by_month: HashMap<String, f64> = predictions
        .iter()
        .map(|point| (month_key(point.predicted_date), point.predicted_amount))
        .collect();
    months
        .iter()
        .map(|month| by_month.get(&month_key(*month)).copied().unwrap_or(0.0))
        .collect()
}

/// Adds `delta` to every month, or for `Annual` to every twelfth month
/// counted from the start of the series.
pub fn apply_delta(baseline: &[f64], delta: f64, frequency: Frequency) -> Vec<f64> {
    baseline
        .iter()
        .enumerate()
        .map(|(index, amount)| match frequency {
            Frequency::Monthly => amount + delta,
            Frequency::Annual if index % 12 == 0 => amount + delta,
            Frequency::Annual => *amount,
        })
        .collect()
}

pub fn project(months: &[NaiveDate], baseline: Vec<f64>, simulated: Vec<f64>) -> NumericProjection {
    let baseline_total: f64 = baseline.iter().sum();
    let simulated_total: f64 = simulated.iter().sum();
    let delta_total = simulated_total - baseline_total;
    let percent_change = (baseline_total != 0.0).then(|| delta_total / baseline_total * 100.0);
    NumericProjection {
        months: months.iter().map(|month| month_key(*month)).collect(),
        baseline_series: baseline,
        simulated_series: simulated,
        baseline_total,
        simulated_total,
        delta_total,
        percent_change,
        risk_level: RiskLevel::from_delta(delta_total),
    }
}

fn validate(parameters: &SimulationParameters) -> Result<(), SimulationError> {
    if parameters.duration_months < 1 {
        return Err(SimulationError::InvalidParameters(
            "duration_months must be at least 1".to_string(),
        ));
    }
    if last_month(parameters.start_date, parameters.duration_months).is_none() {
        return Err(out_of_range(parameters.start_date, parameters.duration_months));
    }
    if !parameters.new_amount.is_finite() || parameters.new_amount < 0.0 {
        return Err(SimulationError::InvalidParameters(format!(
            "new_amount must be a non-negative number, got {}",
            parameters.new_amount
        )));
    }
    if parameters.revenue_id.trim().is_empty() {
        return Err(SimulationError::InvalidParameters("revenue_id is empty".to_string()));
    }
    Ok(())
}

fn latest_indicator(economic: Option<&Value>, key: &str) -> Option<f64> {
    let indicator: ReducedIndicator = serde_json::from_value(economic?.get(key)?.clone()).ok()?;
    indicator.recent.iter().find_map(|point| point.value)
}

/// Copies fetched signals into snapshots the caller did not override.
fn merge_bundle(simulation: &mut Simulation, bundle: ContextBundle) {
    if simulation.weather_context.is_none() {
        simulation.weather_context = bundle.weather.and_then(|weather| serde_json::to_value(weather).ok());
    }
    if simulation.economic_context.is_none() {
        simulation.economic_context = bundle.economic.and_then(|economic| serde_json::to_value(economic).ok());
    }
    if simulation.demographic_context.is_none() {
        simulation.demographic_context = bundle
            .demographics
            .and_then(|demographics| serde_json::to_value(demographics).ok());
    }
    simulation.context_errors = bundle.errors;
}

/// Runs simulations against the revenue and prediction stores and keeps the
/// results in a simulation store. Context and model enrichment are optional.
pub struct SimulationService {
    revenues: Arc<dyn RevenueStore>,
    predictions: Arc<dyn PredictionStore>,
    simulations: Arc<dyn SimulationStore>,
    context: Option<Arc<ContextService>>,
    pipeline: Option<Arc<AnalysisPipeline>>,
    estimator: Option<Arc<dyn ModelEstimator>>,
    enrichment_unavailable: Option<String>,
}

impl SimulationService {
    pub fn new(
        revenues: Arc<dyn RevenueStore>,
        predictions: Arc<dyn PredictionStore>,
        simulations: Arc<dyn SimulationStore>,
    ) -> Self {
        Self {
            revenues,
            predictions,
            simulations,
            context: None,
            pipeline: None,
            estimator: None,
            enrichment_unavailable: None,
        }
    }

    pub fn with_context(mut self, context: Arc<ContextService>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_pipeline(mut self, pipeline: Arc<AnalysisPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn ModelEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    /// Records `reason` as the enrichment error of every run, for when the
    /// model could not be set up.
    pub fn with_enrichment_unavailable(mut self, reason: impl Into<String>) -> Self {
        self.enrichment_unavailable = Some(reason.into());
        self
    }

    pub async fn run_simulation(&self, parameters: SimulationParameters) -> Result<SimulationRun, SimulationError> {
        validate(&parameters)?;
        let revenue = self
            .revenues
            .find_revenue(&parameters.revenue_id)
            .await?
            .ok_or_else(|| SimulationError::NotFound(format!("revenue {}", parameters.revenue_id)))?;

        let months = build_months(parameters.start_date, parameters.duration_months)?;
        let predictions = self
            .predictions
            .find_by_period_and_months(PredictionPeriod::Monthly, &months)
            .await?;
        let baseline = baseline_series(&months, &predictions);
        let delta = parameters.new_amount - revenue.amount;
        let simulated = apply_delta(&baseline, delta, parameters.frequency);
        let projection = project(&months, baseline, simulated);
        debug!(
            revenue = %revenue.id,
            months = months.len(),
            delta_total = projection.delta_total,
            "projection computed"
        );

        let now = Utc::now();
        let overridden_all = parameters.overrides.weather.is_some()
            && parameters.overrides.economic.is_some()
            && parameters.overrides.demographic.is_some();
        let bundle = match &self.context {
            Some(context) if parameters.wants_context() && !overridden_all => {
                Some(context.fetch_context_for_simulation(&parameters).await)
            }
            _ => None,
        };
        let mut simulation = Simulation::start(parameters, &revenue, now);
        if let Some(bundle) = bundle {
            merge_bundle(&mut simulation, bundle);
        }

        let mut analysis = AnalysisResult::numeric_only(
            &simulation.id,
            projection,
            simulation.municipality_id.clone(),
            now,
        );
        self.simulations.insert_run(&simulation, &analysis).await?;
        info!(simulation = %simulation.id, summary = %analysis.summary, "simulation stored");

        self.enrich(&simulation, &mut analysis, &months).await;
        let analysis_saved = self.simulations.save_analysis(&analysis).await;
        if let Err(err) = &analysis_saved {
            error!(simulation = %simulation.id, error = %err, "enriched analysis not stored, keeping numeric analysis");
        }

        // The stored run must not stay `running` even when the analysis write failed.
        simulation.complete(Utc::now());
        if let Err(err) = self.simulations.save_simulation(&simulation).await {
            error!(simulation = %simulation.id, error = %err, "simulation left in running state");
            return Err(err.into());
        }
        analysis_saved?;
        Ok(SimulationRun { simulation, analysis })
    }

    /// Best-effort model analysis. Failures end up in `analysis.ai_error`.
    async fn enrich(&self, simulation: &Simulation, analysis: &mut AnalysisResult, months: &[NaiveDate]) {
        let Some(pipeline) = &self.pipeline else {
            if let Some(reason) = &self.enrichment_unavailable {
                warn!(simulation = %simulation.id, reason, "analysis enrichment unavailable");
                analysis.ai_error = Some(reason.clone());
            }
            return;
        };

        let context = EnrichmentContext::build(simulation, &analysis.result, months);
        let methods = self.predictive_methods(simulation).await;
        let prompt = build_prompt(simulation, &analysis.result, &context, methods.as_ref());

        let now = Utc::now();
        match pipeline.run(&prompt, &analysis.result.months).await {
            Ok(outcome) => {
                if outcome.disposition == Disposition::Fallback {
                    analysis.ai_error = Some(format!(
                        "model output failed schema validation after {} attempts",
                        outcome.attempts
                    ));
                }
                analysis.ai_analysis = Some(outcome.analysis);
                analysis.ai_raw = outcome.raw_text;
                analysis.ai_disposition = Some(outcome.disposition);
                analysis.ai_provider = Some(pipeline.provider().to_string());
                analysis.ai_model = Some(pipeline.model_name().to_string());
                analysis.ai_at = Some(now);
            }
            Err(err) => {
                warn!(simulation = %simulation.id, status = ?err.status(), error = %err, "analysis enrichment failed");
                analysis.ai_error = Some(err.to_string());
                analysis.ai_provider = Some(pipeline.provider().to_string());
                analysis.ai_model = Some(pipeline.model_name().to_string());
            }
        }
        analysis.updated_at = now;
    }

    async fn predictive_methods(&self, simulation: &Simulation) -> Option<PredictiveMethods> {
        let parameters = &simulation.parameters;
        let history_months = preceding_months(parameters.start_date, HISTORY_MONTHS);
        let points = match self
            .predictions
            .find_by_period_and_months(PredictionPeriod::Monthly, &history_months)
            .await
        {
            Ok(points) => points,
            Err(err) => {
                warn!(error = %err, "prediction history unavailable");
                return None;
            }
        };
        let mut by_month: HashMap<NaiveDate, f64> = HashMap::new();
        for point in points {
            by_month.insert(point.predicted_date, point.predicted_amount);
        }
        let history: Vec<f64> = history_months
            .iter()
            .filter_map(|month| by_month.get(month).copied())
            .collect();

        let inputs = MethodInputs {
            history: &history,
            category: &simulation.recipe_type,
            season: parameters
                .season
                .unwrap_or_else(|| Season::for_date(parameters.start_date)),
            population: latest_indicator(simulation.economic_context.as_ref(), "population"),
            gdp: latest_indicator(simulation.economic_context.as_ref(), "gdp"),
        };
        Some(apply_prediction_methods(&inputs, self.estimator.as_deref()).await)
    }

    pub async fn list_simulations(&self, municipality_id: Option<&str>) -> Result<Vec<Simulation>, SimulationError> {
        Ok(self.simulations.list_simulations(municipality_id).await?)
    }

    pub async fn get_simulation(&self, id: &str) -> Result<Option<Simulation>, SimulationError> {
        Ok(self.simulations.find_simulation(id).await?)
    }

    /// The simulation with its analysis; `NotFound` when either is missing.
    pub async fn get_run(&self, id: &str) -> Result<SimulationRun, SimulationError> {
        let simulation = self
            .simulations
            .find_simulation(id)
            .await?
            .ok_or_else(|| SimulationError::NotFound(format!("simulation {id}")))?;
        let analysis = self
            .simulations
            .find_analysis_for(id)
            .await?
            .ok_or_else(|| SimulationError::NotFound(format!("analysis for simulation {id}")))?;
        Ok(SimulationRun { simulation, analysis })
    }
}
