// Renderer-side runner: receives light batches over TCP and keeps an
// in-memory scene in step with them, one reconciliation pass per batch.

use lumen_sync::config::SessionConfig;
use lumen_sync::core_modules::scene::{LightKind, LightState, SceneGraph};
use lumen_sync::core_modules::tracker::LightTracker;
use lumen_sync::transport::LightServer;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const RENDER_TICK: Duration = Duration::from_millis(16);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = SessionConfig::from_env()?;

    let mut scene = SceneGraph::new();
    scene.insert_directional(LightState::default());
    let main_light = scene.directional();
    let mut tracker = LightTracker::new(scene, main_light, config.reconcile.clone())?;

    let server = LightServer::bind(config.transport.clone()).await?;
    info!(addr = %server.local_addr()?, "renderer listening");

    let (batch_tx, mut batch_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_task = tokio::spawn(server.run(batch_tx, shutdown_rx));

    let mut tick = tokio::time::interval(RENDER_TICK);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                for report in tracker.drain(&mut batch_rx) {
                    if report.is_quiet() {
                        debug!(pass = report.pass, "no light changed");
                        continue;
                    }
                    info!(
                        pass = report.pass,
                        created = report.created(),
                        updated = report.updated(),
                        destroyed = report.destroyed(),
                        points = tracker.scene().count(LightKind::Point),
                        "scene lights reconciled"
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    let summary = server_task.await??;
    info!(
        connections = summary.connections,
        passes = tracker.passes(),
        "renderer stopped"
    );
    Ok(())
}
