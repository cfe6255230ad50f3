use std::process::ExitCode;

use tracing::{error, warn};

use pallet_planner::api::{self, ApiState};
use pallet_planner::carriers::Planner;
use pallet_planner::catalog::InMemoryCatalog;
use pallet_planner::config::AppConfig;
use pallet_planner::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();
    logging::init();

    if let Err(err) = dotenv {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            warn!("Could not load .env: {}", err);
        }
    }

    let app_config = AppConfig::from_env();

    println!("🚀 Pallet planner starting...");
    let catalog = match InMemoryCatalog::load(app_config.master_data.path()) {
        Ok(catalog) => catalog,
        Err(err) => {
            error!(error = %err, "could not load master data");
            return ExitCode::FAILURE;
        }
    };

    let settings = &app_config.planner;
    let planner = match Planner::new(settings.planner_config(), settings.carrier_workers()) {
        Ok(planner) => planner,
        Err(err) => {
            error!(error = %err, "could not start the planner");
            return ExitCode::FAILURE;
        }
    };

    let state = ApiState::new(catalog, planner, settings.allow_mixed_heights());
    api::start_api_server(app_config.api, state).await;
    ExitCode::SUCCESS
}
