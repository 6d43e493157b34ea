use std::error::Error;
use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use forwardport::config::Config;
use forwardport::gateway::{CliVcs, OctocrabForge};
use forwardport::queue::Scheduler;
use forwardport::server::{self, AppState};
use forwardport::store::{snapshot, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forwardport=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("forwardport.json"));
    let config = Config::load(&config_path)?;

    let mut store = Store::new();
    if let Some(path) = &config.state_file
        && let Some(snap) = snapshot::load(path)?
    {
        tracing::info!(path = %path.display(), jobs = snap.port_jobs.len()
            + snap.update_jobs.len() + snap.retire_jobs.len(),
            "recovered queue snapshot");
        snap.restore_into(&mut store);
    }

    let vcs = CliVcs::new(config.git_base_dir.clone(), config.fp_remote.clone());
    let forge = OctocrabForge::from_token(config.forge_token.clone())?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let app = server::router(AppState::new(
        events_tx,
        config.webhook_secret.as_bytes().to_vec(),
    ));
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "listening");

    let server_cancel = cancel.clone();
    let server_task = tokio::spawn(async move {
        let shutdown = async move { server_cancel.cancelled().await };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!(error = %e, "server exited with error");
        }
    });

    let scheduler = Scheduler::new(store, vcs, forge, config);
    let engine_cancel = cancel.clone();
    let engine_task = tokio::spawn(scheduler.run(events_rx, engine_cancel));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    cancel.cancel();

    engine_task.await?;
    server_task.await?;
    Ok(())
}
