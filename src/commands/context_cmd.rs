use std::process::ExitCode;

use revsim::domain::simulation::{Frequency, SimulationParameters};
use revsim::services::config::AppConfig;

use crate::commands::base_commands::Commands;
use crate::commands::runtime::{apply_location, context_service};

pub async fn context_command(cmd: Commands, config: &AppConfig) -> ExitCode {
    let Commands::Context { location, date } = cmd else {
        return ExitCode::FAILURE;
    };
    let service = match context_service(config) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Failed to set up context service: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut parameters =
        SimulationParameters::new("", 0.0, Frequency::Monthly, 1, date, &config.context.default_currency);
    apply_location(&mut parameters, &location);
    if !parameters.wants_context() {
        eprintln!("Failed to fetch context: pass --city, --country or --lat/--lon");
        return ExitCode::FAILURE;
    }

    let bundle = service.fetch_context_for_simulation(&parameters).await;
    match serde_json::to_string_pretty(&bundle) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to serialize context: {e}");
            ExitCode::FAILURE
        }
    }
}
