use smithypool::config::RunnerConfig;
use smithypool::runner::{JobRunner, init_logging};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> smithypool::Result<()> {
    let config_path = match std::env::args_os().nth(1) {
        Some(path) => PathBuf::from(path),
        None => RunnerConfig::path_from_env()?,
    };

    // Logging settings come from the file, so it is read before defaults are
    // applied and reported.
    let config = RunnerConfig::read_json_file(&config_path)?;
    init_logging(&config.logging);
    let config = config.finalize()?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
                shutdown.cancel();
            }
        }
    });

    let summary = JobRunner::new(config).run_until(shutdown).await?;
    tracing::info!(
        "{} jobs submitted, {} rejected, {} results written",
        summary.submitted,
        summary.rejected,
        summary.results_written
    );

    Ok(())
}
