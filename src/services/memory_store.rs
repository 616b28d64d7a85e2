use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::analysis::AnalysisResult;
use crate::domain::revenue::{PredictionPeriod, PredictionPoint, RevenueBaseline};
use crate::domain::simulation::Simulation;
use crate::services::data_source::{
    ContextKind, ContextStore, PredictionStore, RevenueStore, SimulationStore, StoreError,
};

/// Revenues and predictions held in memory, typically loaded from a dataset file.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataset {
    revenues: HashMap<String, RevenueBaseline>,
    predictions: Vec<PredictionPoint>,
}

impl InMemoryDataset {
    pub fn new(revenues: Vec<RevenueBaseline>, predictions: Vec<PredictionPoint>) -> Self {
        Self {
            revenues: revenues
                .into_iter()
                .map(|revenue| (revenue.id.clone(), revenue))
                .collect(),
            predictions,
        }
    }
}

#[async_trait]
impl RevenueStore for InMemoryDataset {
    async fn find_revenue(&self, id: &str) -> Result<Option<RevenueBaseline>, StoreError> {
        Ok(self.revenues.get(id).cloned())
    }
}

#[async_trait]
impl PredictionStore for InMemoryDataset {
    async fn find_by_period_and_months(
        &self,
        period: PredictionPeriod,
        months: &[NaiveDate],
    ) -> Result<Vec<PredictionPoint>, StoreError> {
        Ok(self
            .predictions
            .iter()
            .filter(|point| point.period == period && months.contains(&point.predicted_date))
            .cloned()
            .collect())
    }
}

/// Simulations and analyses in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationArchive {
    #[serde(default)]
    pub simulations: Vec<Simulation>,
    #[serde(default)]
    pub analyses: Vec<AnalysisResult>,
}

impl SimulationArchive {
    pub fn insert_run(&mut self, simulation: &Simulation, analysis: &AnalysisResult) -> Result<(), StoreError> {
        if analysis.simulation_id != simulation.id {
            return Err(StoreError::Conflict(format!(
                "analysis {} does not belong to simulation {}",
                analysis.id, simulation.id
            )));
        }
        if self.simulations.iter().any(|existing| existing.id == simulation.id) {
            return Err(StoreError::Conflict(format!(
                "simulation {} already exists",
                simulation.id
            )));
        }
        self.simulations.push(simulation.clone());
        self.analyses.push(analysis.clone());
        Ok(())
    }

    pub fn save_simulation(&mut self, simulation: &Simulation) {
        match self.simulations.iter_mut().find(|existing| existing.id == simulation.id) {
            Some(existing) => *existing = simulation.clone(),
            None => self.simulations.push(simulation.clone()),
        }
    }

    pub fn save_analysis(&mut self, analysis: &AnalysisResult) {
        match self.analyses.iter_mut().find(|existing| existing.id == analysis.id) {
            Some(existing) => *existing = analysis.clone(),
            None => self.analyses.push(analysis.clone()),
        }
    }

    pub fn find_simulation(&self, id: &str) -> Option<Simulation> {
        self.simulations.iter().find(|simulation| simulation.id == id).cloned()
    }

    pub fn find_analysis_for(&self, simulation_id: &str) -> Option<AnalysisResult> {
        self.analyses
            .iter()
            .find(|analysis| analysis.simulation_id == simulation_id)
            .cloned()
    }

    pub fn list_simulations(&self, municipality_id: Option<&str>) -> Vec<Simulation> {
        let mut simulations: Vec<Simulation> = self
            .simulations
            .iter()
            .filter(|simulation| match municipality_id {
                Some(wanted) => simulation.municipality_id.as_deref() == Some(wanted),
                None => true,
            })
            .cloned()
            .collect();
        simulations.sort_by_key(|simulation| simulation.created_at);
        simulations.reverse();
        simulations
    }
}

#[derive(Default)]
pub struct InMemorySimulationStore {
    archive: Mutex<SimulationArchive>,
}

impl InMemorySimulationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SimulationStore for InMemorySimulationStore {
    async fn insert_run(&self, simulation: &Simulation, analysis: &AnalysisResult) -> Result<(), StoreError> {
        self.archive.lock().insert_run(simulation, analysis)
    }

    async fn save_simulation(&self, simulation: &Simulation) -> Result<(), StoreError> {
        self.archive.lock().save_simulation(simulation);
        Ok(())
    }

    async fn save_analysis(&self, analysis: &AnalysisResult) -> Result<(), StoreError> {
        self.archive.lock().save_analysis(analysis);
        Ok(())
    }

    async fn find_simulation(&self, id: &str) -> Result<Option<Simulation>, StoreError> {
        Ok(self.archive.lock().find_simulation(id))
    }

    async fn find_analysis_for(&self, simulation_id: &str) -> Result<Option<AnalysisResult>, StoreError> {
        Ok(self.archive.lock().find_analysis_for(simulation_id))
    }

    async fn list_simulations(&self, municipality_id: Option<&str>) -> Result<Vec<Simulation>, StoreError> {
        Ok(self.archive.lock().list_simulations(municipality_id))
    }
}

#[derive(Default)]
pub struct InMemoryContextStore {
    entries: Mutex<HashMap<(ContextKind, String), Value>>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn load(&self, kind: ContextKind, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.lock().get(&(kind, key.to_string())).cloned())
    }

    async fn save(&self, kind: ContextKind, key: &str, payload: &Value) -> Result<(), StoreError> {
        self.entries
            .lock()
            .insert((kind, key.to_string()), payload.clone());
        Ok(())
    }
}
