use anyhow::{Context, Result};
use serde_json::json;
use std::io::{self, BufRead, Write};
use trip_planner_lib::search::{CatalogSearch, FixtureCatalog};
use trip_planner_lib::{init_tracing, to_client_error, Command, CommandDispatcher, PlannerConfig, PlannerCore};

fn main() -> Result<()> {
    let config = PlannerConfig::load().context("failed to load planner config")?;
    init_tracing(&config.log_dir(), &config.log_filter)
        .map_err(anyhow::Error::msg)
        .context("failed to initialise logging")?;

    let catalog: Box<dyn CatalogSearch> = match &config.catalog_fixture {
        Some(path) => Box::new(FixtureCatalog::from_path(path).context("failed to load catalog fixture")?),
        None => Box::new(FixtureCatalog::default()),
    };
    let core = PlannerCore::new(config, catalog).context("failed to open planner database")?;
    tracing::info!(path = %core.database().path().to_string_lossy(), "trip planner started");
    let mut dispatcher = CommandDispatcher::new(core);

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read command")?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Command>(&line) {
            Ok(command) => match dispatcher.execute(command) {
                Ok(value) => json!({ "ok": value }),
                Err(error) => json!({ "error": to_client_error(error) }),
            },
            Err(error) => json!({ "error": format!("INVALID_INPUT: {}", error) }),
        };
        writeln!(stdout, "{}", response).context("failed to write response")?;
        stdout.flush().context("failed to flush response")?;
    }

    tracing::info!("trip planner stopped");
    Ok(())
}
