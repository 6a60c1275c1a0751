use muffin_arbitrage::{bootstrap, config};
use muffin_arbitrage::chain::snapshot::SnapshotSource;
use muffin_arbitrage::engine::service::{run_once, DryRunSubmitter};

#[tokio::main]
async fn main() {
    env_logger::init();

    // Load configuration
    let config = config::Config::from_env()
        .expect("Failed to load configuration");

    // Build application state
    let app_state = bootstrap::AppState::new(&config)
        .expect("Failed to initialize application state");

    let Some(path) = app_state.snapshot_path.as_deref() else {
        log::warn!("SNAPSHOT_PATH not set, nothing to evaluate");
        return;
    };

    let source = SnapshotSource::new(path, app_state.simulation);
    match run_once(&source, &DryRunSubmitter, &app_state.service).await {
        Ok(summary) => log::info!(
            "{} pairs, {} opportunities, submitted: {}",
            summary.pairs,
            summary.opportunities.len(),
            summary.submitted.is_some()
        ),
        Err(e) => {
            log::error!("evaluation pass failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
