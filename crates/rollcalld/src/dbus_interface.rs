use crate::engine::{EngineHandle, WorkerError};
use serde::Serialize;
use std::collections::HashMap;
use zbus::interface;

/// D-Bus interface for the rollcall attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
pub struct AttendanceService {
    pub engine: EngineHandle,
}

fn to_fdo(e: WorkerError) -> zbus::fdo::Error {
    match e {
        WorkerError::Engine(inner) => zbus::fdo::Error::InvalidArgs(inner.to_string()),
        other => zbus::fdo::Error::Failed(other.to_string()),
    }
}

fn to_json<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Attendance ledger as a JSON array, in first-seen order.
    async fn attendance(&self) -> zbus::fdo::Result<String> {
        let records = self.engine.attendance().await.map_err(to_fdo)?;
        to_json(&records)
    }

    /// Unknown-face records as a JSON array.
    async fn unknown_faces(&self) -> zbus::fdo::Result<String> {
        let records = self.engine.unknown_faces().await.map_err(to_fdo)?;
        to_json(&records)
    }

    /// Liveness metrics of the last evaluated face, or `null`.
    async fn liveness(&self) -> zbus::fdo::Result<String> {
        let report = self.engine.liveness().await.map_err(to_fdo)?;
        to_json(&report)
    }

    async fn config(&self) -> zbus::fdo::Result<String> {
        let config = self.engine.config().await.map_err(to_fdo)?;
        to_json(&config)
    }

    /// Apply `key -> value` settings all at once. Returns the resulting
    /// config; on any bad entry nothing changes and an error is returned.
    async fn apply_config(&self, settings: HashMap<String, String>) -> zbus::fdo::Result<String> {
        tracing::info!(keys = ?settings.keys().collect::<Vec<_>>(), "apply_config requested");
        let config = self
            .engine
            .apply_config(settings.into_iter().collect())
            .await
            .map_err(to_fdo)?;
        to_json(&config)
    }

    /// Reload gallery and names from disk. Returns the new gallery size.
    async fn reload(&self) -> zbus::fdo::Result<u32> {
        tracing::info!("reload requested");
        let entries = self.engine.reload().await.map_err(to_fdo)?;
        Ok(u32::try_from(entries).unwrap_or(u32::MAX))
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self.engine.status().await.map_err(to_fdo)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "engine": status,
        })
        .to_string())
    }
}
