use std::process::ExitCode;

use revsim::services::config::AppConfig;
use serde::Serialize;

use crate::commands::base_commands::Commands;
use crate::commands::runtime::place_resolver;

fn print_json<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to serialize place: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Handles both `place` and `bbox`. Geocoding errors are printed as JSON on
/// stderr so callers can read the kind and retry flag.
pub async fn place_command(cmd: Commands, config: &AppConfig) -> ExitCode {
    let resolver = match place_resolver(config) {
        Ok(resolver) => resolver,
        Err(e) => {
            eprintln!("Failed to set up geocoding: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cmd {
        Commands::Place { name } => resolver.resolve_place(&name).await.map(|place| print_json(&place)),
        Commands::Bbox { name } => resolver
            .resolve_bounding_box(&name)
            .await
            .map(|bbox| print_json(&bbox)),
        _ => return ExitCode::FAILURE,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            let details = serde_json::to_string(&e).unwrap_or_else(|_| e.to_string());
            eprintln!("Failed to resolve place: {details}");
            ExitCode::FAILURE
        }
    }
}
