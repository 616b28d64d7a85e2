use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::domain::analysis::AnalysisResult;
use crate::domain::simulation::Simulation;
use crate::services::data_source::{SimulationStore, StoreError};
use crate::services::memory_store::SimulationArchive;

/// Simulation store persisted to a YAML file after every write.
pub struct YamlSimulationStore {
    path: PathBuf,
    archive: Mutex<SimulationArchive>,
}

impl YamlSimulationStore {
    /// Opens the archive at `path`; a missing file starts an empty archive.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let archive = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|err| StoreError::Io(format!("failed to read {}: {err}", path.display())))?;
            if contents.trim().is_empty() {
                SimulationArchive::default()
            } else {
                serde_yaml::from_str(&contents).map_err(|err| StoreError::Parse(err.to_string()))?
            }
        } else {
            SimulationArchive::default()
        };
        Ok(Self {
            path,
            archive: Mutex::new(archive),
        })
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let yaml = {
            let archive = self.archive.lock();
            serde_yaml::to_string(&*archive).map_err(|err| StoreError::Parse(err.to_string()))?
        };
        debug!(path = %self.path.display(), "persisting simulation archive");
        tokio::fs::write(&self.path, yaml)
            .await
            .map_err(|err| StoreError::Io(format!("failed to write {}: {err}", self.path.display())))
    }
}

#[async_trait]
impl SimulationStore for YamlSimulationStore {
    async fn insert_run(&self, simulation: &Simulation, analysis: &AnalysisResult) -> Result<(), StoreError> {
        self.archive.lock().insert_run(simulation, analysis)?;
        self.persist().await
    }

    async fn save_simulation(&self, simulation: &Simulation) -> Result<(), StoreError> {
        self.archive.lock().save_simulation(simulation);
        self.persist().await
    }

    async fn save_analysis(&self, analysis: &AnalysisResult) -> Result<(), StoreError> {
        self.archive.lock().save_analysis(analysis);
        self.persist().await
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
