use anyhow::{bail, Context, Result};
use rollcall_core::{DiskCaptureSink, Engine, EngineConfig, IdentityStore, Replay};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = config::Config::from_env();

    let engine_config = match &config.engine_config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    // Frames and their detections come from a recorded session.
    let Some(recording) = &config.recording else {
        bail!("no frame source configured; set ROLLCALL_RECORDING");
    };
    let replay = Replay::open(recording)?;

    let store = IdentityStore::new(&config.faces_dir, &config.names_file);
    let sink = DiskCaptureSink::new(&config.unknown_dir, &config.recognized_dir);
    let engine = Engine::new(
        store,
        Box::new(replay.provider),
        Box::new(sink),
        Box::new(replay.clock),
        engine_config,
    )
    .context("failed to initialise recognition engine")?;

    tracing::info!(
        gallery = engine.gallery().len(),
        names = engine.names().len(),
        frames = replay.source.len(),
        "engine ready"
    );

    let handle = engine::spawn_engine(
        engine,
        Box::new(replay.source),
        Duration::from_millis(config.frame_interval_ms),
    )
    .context("failed to spawn engine thread")?;

    let service = dbus_interface::AttendanceService { engine: handle };
    let _conn = zbus::connection::Builder::session()?
        .name("org.rollcall.Attendance1")?
        .serve_at("/org/rollcall/Attendance1", service)?
        .build()
        .await
        .context("failed to register on the session bus")?;

    tracing::info!("rollcalld ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
