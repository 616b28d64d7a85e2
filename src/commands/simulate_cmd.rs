use std::process::ExitCode;

use revsim::domain::simulation::{ContextOverrides, SimulationParameters};
use revsim::services::config::AppConfig;
use revsim::services::response_projection::project_response;
use revsim::services::series_plot::write_series_png;
use serde_json::Value;

use crate::commands::base_commands::Commands;
use crate::commands::report_format::format_simulation_report;
use crate::commands::runtime::{ServiceOptions, apply_location, simulation_service};

fn parse_override(name: &str, raw: Option<String>) -> Result<Option<Value>, String> {
    match raw {
        None => Ok(None),
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| format!("--{name} is not valid JSON: {e}")),
    }
}

fn parse_overrides(
    weather: Option<String>,
    economic: Option<String>,
    demographic: Option<String>,
) -> Result<ContextOverrides, String> {
    Ok(ContextOverrides {
        weather: parse_override("weather", weather)?,
        economic: parse_override("economic", economic)?,
        demographic: parse_override("demographic", demographic)?,
    })
}

pub async fn simulate_command(cmd: Commands, config: &AppConfig) -> ExitCode {
    let Commands::Simulate {
        dataset,
        revenue_id,
        new_amount,
        frequency,
        duration_months,
        start_date,
        currency,
        season,
        location,
        municipality,
        note,
        weather,
        economic,
        demographic,
        store,
        output,
        chart,
        no_ai,
        no_context,
    } = cmd
    else {
        return ExitCode::FAILURE;
    };

    let overrides = match parse_overrides(weather, economic, demographic) {
        Ok(overrides) => overrides,
        Err(e) => {
            eprintln!("Failed to read context overrides: {e}");
            return ExitCode::FAILURE;
        }
    };
    let currency = currency.unwrap_or_else(|| config.context.default_currency.clone());
    let mut parameters = SimulationParameters::new(
        &revenue_id,
        new_amount,
        frequency,
        duration_months,
        start_date,
        &currency,
    );
    parameters.season = season;
    parameters.municipality_id = municipality;
    parameters.note = note;
    parameters.overrides = overrides;
    apply_location(&mut parameters, &location);

    let options = ServiceOptions {
        dataset: &dataset,
        store: store.as_deref(),
        with_context: !no_context,
        with_ai: !no_ai,
    };
    let service = match simulation_service(config, &options) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Failed to set up simulation: {e}");
            return ExitCode::FAILURE;
        }
    };

    let run = match service.run_simulation(parameters).await {
        Ok(run) => run,
        Err(e) => {
            eprintln!("Failed to run simulation: {e}");
            return ExitCode::FAILURE;
        }
    };

    let response = project_response(&run.simulation, &run.analysis, config.economic.target_year);
    let json = match serde_json::to_string_pretty(&response) {
        Ok(contents) => contents,
        Err(e) => {
            eprintln!("Failed to serialize simulation response: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = tokio::fs::write(&output, json).await {
        eprintln!("Failed to write simulation output: {e}");
        return ExitCode::FAILURE;
    }

    let chart_path = chart.unwrap_or_else(|| format!("{output}.png"));
    if let Err(e) = write_series_png(&chart_path, &run.analysis.result).await {
        eprintln!("Failed to write simulation chart: {e}");
        return ExitCode::FAILURE;
    }

    println!("{}", format_simulation_report(&response));
    println!("Simulation {} written to {output}", run.simulation.id);
    println!("Simulation chart written to {chart_path}");
    ExitCode::SUCCESS
}
