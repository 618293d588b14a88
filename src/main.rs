use versync::{config, launcher, logging};
use versync_updater_lib::UpdateSession;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    tracing::info!("versync {} starting", env!("CARGO_PKG_VERSION"));

    let loaded = config::load_updater_config()?;
    match &loaded.source {
        Some(path) => tracing::info!("[Config] Loaded {}", path.display()),
        None => tracing::warn!("[Config] No config file found, using defaults"),
    }

    let session = UpdateSession::from_config(&loaded.config)?;
    let report = launcher::run(&session).await?;

    tracing::debug!("[Launcher] Session transcript:\n{}", session.diagnostics());

    if let Some(outcome) = &report.outcome {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    }

    if report.failed() {
        if let Some(err) = report.outcome.as_ref().and_then(|o| o.error()) {
            anyhow::bail!("update failed ({}): {}", err.kind(), err);
        }
    }
    Ok(())
}
