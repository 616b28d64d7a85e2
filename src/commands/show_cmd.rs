use std::process::ExitCode;

use revsim::services::config::AppConfig;
use revsim::services::response_projection::{SimulationResponse, project_response};
use revsim::services::simulation::SimulationError;

use crate::commands::base_commands::Commands;
use crate::commands::runtime::open_store;

async fn load_response(store: &str, id: &str, target_year: i32) -> Result<SimulationResponse, SimulationError> {
    let store = open_store(Some(store))?;
    let simulation = store
        .find_simulation(id)
        .await?
        .ok_or_else(|| SimulationError::NotFound(format!("simulation {id}")))?;
    let analysis = store
        .find_analysis_for(id)
        .await?
        .ok_or_else(|| SimulationError::NotFound(format!("analysis for simulation {id}")))?;
    Ok(project_response(&simulation, &analysis, target_year))
}

pub async fn show_command(cmd: Commands, config: &AppConfig) -> ExitCode {
    let Commands::Show { store, id, output } = cmd else {
        return ExitCode::FAILURE;
    };
    let response = match load_response(&store, &id, config.economic.target_year).await {
        Ok(response) => response,
        Err(e) => {
            eprintln!("Failed to load simulation: {e}");
            return ExitCode::FAILURE;
        }
    };
    let json = match serde_json::to_string_pretty(&response) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Failed to serialize simulation: {e}");
            return ExitCode::FAILURE;
        }
    };

    match output {
        Some(output) => match tokio::fs::write(&output, json).await {
            Ok(()) => {
                println!("Simulation {id} written to {output}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to write simulation: {e}");
                ExitCode::FAILURE
            }
        },
        None => {
            println!("{json}");
            ExitCode::SUCCESS
        }
    }
}
