mod commands;

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use revsim::services::config::AppConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::commands::base_commands::{CliArgs, Commands};
use crate::commands::context_cmd::context_command;
use crate::commands::list_cmd::list_command;
use crate::commands::place_cmd::place_command;
use crate::commands::show_cmd::show_command;
use crate::commands::simulate_cmd::simulate_command;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_tracing();

    if let Commands::Completions { shell } = args.command {
        let mut command = CliArgs::command();
        let name = command.get_name().to_string();
        generate(shell, &mut command, name, &mut std::io::stdout());
        return ExitCode::SUCCESS;
    }

    let config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    match args.command {
        cmd @ Commands::Simulate { .. } => simulate_command(cmd, &config).await,
        cmd @ Commands::List { .. } => list_command(cmd).await,
        cmd @ Commands::Show { .. } => show_command(cmd, &config).await,
        cmd @ Commands::Context { .. } => context_command(cmd, &config).await,
        cmd @ (Commands::Place { .. } | Commands::Bbox { .. }) => place_command(cmd, &config).await,
        Commands::Completions { .. } => ExitCode::SUCCESS,
    }
}
