use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;

use crate::domain::analysis::AnalysisResult;
use crate::domain::revenue::{PredictionPeriod, PredictionPoint, RevenueBaseline};
use crate::domain::simulation::Simulation;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store i/o error: {0}")]
    Io(String),
    #[error("store parse error: {0}")]
    Parse(String),
    #[error("conflicting record: {0}")]
    Conflict(String),
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait RevenueStore: Send + Sync {
    async fn find_revenue(&self, id: &str) -> Result<Option<RevenueBaseline>, StoreError>;
}

#[async_trait]
pub trait PredictionStore: Send + Sync {
    /// Predictions for `period` whose month is one of `months` (first-of-month dates).
    async fn find_by_period_and_months(
        &self,
        period: PredictionPeriod,
        months: &[NaiveDate],
    ) -> Result<Vec<PredictionPoint>, StoreError>;
}

/// Persistence for simulation runs and their analyses.
#[async_trait]
pub trait SimulationStore: Send + Sync {
    /// Stores a new simulation and its analysis together.
    async fn insert_run(&self, simulation: &Simulation, analysis: &AnalysisResult) -> Result<(), StoreError>;
    async fn save_simulation(&self, simulation: &Simulation) -> Result<(), StoreError>;
    async fn save_analysis(&self, analysis: &AnalysisResult) -> Result<(), StoreError>;
    async fn find_simulation(&self, id: &str) -> Result<Option<Simulation>, StoreError>;
    async fn find_analysis_for(&self, simulation_id: &str) -> Result<Option<AnalysisResult>, StoreError>;
    /// Newest first, optionally restricted to one municipality.
    async fn list_simulations(&self, municipality_id: Option<&str>) -> Result<Vec<Simulation>, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    Weather,
    Economic,
    Demographic,
}

/// Durable store of raw provider payloads, one namespace per context kind.
#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn load(&self, kind: ContextKind, key: &str) -> Result<Option<Value>, StoreError>;
    async fn save(&self, kind: ContextKind, key: &str, payload: &Value) -> Result<(), StoreError>;
}
