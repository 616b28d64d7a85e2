use std::process::ExitCode;

use revsim::domain::simulation::Simulation;
use revsim::services::simulation::SimulationError;

use crate::commands::base_commands::Commands;
use crate::commands::report_format::format_simulation_row;
use crate::commands::runtime::open_store;

pub async fn list_command(cmd: Commands) -> ExitCode {
    let Commands::List { store, municipality } = cmd else {
        return ExitCode::FAILURE;
    };
    let simulations = match list(&store, municipality.as_deref()).await {
        Ok(simulations) => simulations,
        Err(e) => {
            eprintln!("Failed to list simulations: {e}");
            return ExitCode::FAILURE;
        }
    };

    if simulations.is_empty() {
        println!("No simulations found");
        return ExitCode::SUCCESS;
    }
    println!("Id | Created | Status | Revenue | Frequency | Municipality");
    for simulation in &simulations {
        println!("{}", format_simulation_row(simulation));
    }
    ExitCode::SUCCESS
}

async fn list(store: &str, municipality: Option<&str>) -> Result<Vec<Simulation>, SimulationError> {
    let store = open_store(Some(store))?;
    Ok(store.list_simulations(municipality).await?)
}
