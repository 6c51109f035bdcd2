use std::process::ExitCode;

use clap::Parser;
use fieldfiles_backend::{cli, config::AppConfig, logging, AppState};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::CliOpts::parse();
    logging::init(cli.debug);

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!("Failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    let appstate = match AppState::new(&cli, config).await {
        Ok(state) => state,
        Err(err) => {
            error!("Failed to initialize application state: {err}");
            return ExitCode::FAILURE;
        }
    };

    match cli::run(&appstate, cli.command.clone()).await {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(output) => {
                println!("{output}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                error!("Failed to render output: {err}");
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
