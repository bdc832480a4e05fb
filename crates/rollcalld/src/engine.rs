use rollcall_core::{
    AttendanceRecord, Engine, EngineConfig, EngineError, FrameSource, Grab,
    LivenessReport, UnknownFaceRecord,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TryRecvError;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Point-in-time view of the engine for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub frames_processed: u64,
    pub frames_missed: u64,
    pub source_ended: bool,
    pub gallery_entries: usize,
    pub registered_names: usize,
    pub attendance_records: usize,
    pub unknown_faces: usize,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Attendance {
        reply: oneshot::Sender<Vec<AttendanceRecord>>,
    },
    UnknownFaces {
        reply: oneshot::Sender<Vec<UnknownFaceRecord>>,
    },
    Liveness {
        reply: oneshot::Sender<Option<LivenessReport>>,
    },
    Config {
        reply: oneshot::Sender<EngineConfig>,
    },
    ApplyConfig {
        settings: Vec<(String, String)>,
        reply: oneshot::Sender<Result<EngineConfig, WorkerError>>,
    },
    Reload {
        reply: oneshot::Sender<Result<usize, WorkerError>>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, WorkerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| WorkerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| WorkerError::ChannelClosed)
    }

    /// Snapshot of the attendance ledger.
    pub async fn attendance(&self) -> Result<Vec<AttendanceRecord>, WorkerError> {
        self.request(|reply| EngineRequest::Attendance { reply }).await
    }

    pub async fn unknown_faces(&self) -> Result<Vec<UnknownFaceRecord>, WorkerError> {
        self.request(|reply| EngineRequest::UnknownFaces { reply }).await
    }

    /// Liveness metrics of the most recently evaluated face.
    pub async fn liveness(&self) -> Result<Option<LivenessReport>, WorkerError> {
        self.request(|reply| EngineRequest::Liveness { reply }).await
    }

    pub async fn config(&self) -> Result<EngineConfig, WorkerError> {
        self.request(|reply| EngineRequest::Config { reply }).await
    }

    /// Apply settings atomically; returns the config now in force.
    pub async fn apply_config(
        &self,
        settings: Vec<(String, String)>,
    ) -> Result<EngineConfig, WorkerError> {
        self.request(|reply| EngineRequest::ApplyConfig { settings, reply })
            .await?
    }

    /// Reload the identity store between two frames; returns the gallery size.
    pub async fn reload(&self) -> Result<usize, WorkerError> {
        self.request(|reply| EngineRequest::Reload { reply }).await?
    }

    pub async fn status(&self) -> Result<EngineStatus, WorkerError> {
        self.request(|reply| EngineRequest::Status { reply }).await
    }
}

struct Worker {
    engine: Engine,
    source: Box<dyn FrameSource>,
    frame_interval: Duration,
    frames_processed: u64,
    frames_missed: u64,
    source_ended: bool,
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread alternates between draining pending requests and running one
/// frame through the engine, so requests never overlap a frame pass. Once
/// the source ends it keeps serving requests until every handle is dropped.
pub fn spawn_engine(
    engine: Engine,
    source: Box<dyn FrameSource>,
    frame_interval: Duration,
) -> std::io::Result<EngineHandle> {
    let (tx, rx) = mpsc::channel::<EngineRequest>(16);

    let mut worker = Worker {
        engine,
        source,
        frame_interval,
        frames_processed: 0,
        frames_missed: 0,
        source_ended: false,
    };

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || worker.run(rx))?;

    Ok(EngineHandle { tx })
}

impl Worker {
    fn run(&mut self, mut rx: mpsc::Receiver<EngineRequest>) {
        tracing::info!("engine thread started");
        loop {
            if self.source_ended {
                match rx.blocking_recv() {
                    Some(req) => self.handle(req),
                    None => break,
                }
                continue;
            }

            if self.drain(&mut rx).is_err() {
                break;
            }

            self.step();
            std::thread::sleep(self.frame_interval);
        }
        tracing::info!(frames = self.frames_processed, "engine thread exiting");
    }

    /// Handle every queued request without blocking. Errors once every
    /// handle is gone.
    fn drain(&mut self, rx: &mut mpsc::Receiver<EngineRequest>) -> Result<(), TryRecvError> {
        loop {
            match rx.try_recv() {
                Ok(req) => self.handle(req),
                Err(TryRecvError::Empty) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    fn step(&mut self) {
        match self.source.grab() {
            Grab::Frame(frame) => {
                let report = self.engine.process_frame(&frame);
                self.frames_processed += 1;
                for face in &report.faces {
                    tracing::trace!(seq = report.sequence, caption = %face.caption(), "face");
                }
            }
            Grab::Missed => self.frames_missed += 1,
            Grab::Ended => {
                tracing::info!(
                    frames = self.frames_processed,
                    missed = self.frames_missed,
                    "frame source ended; serving requests only"
                );
                self.source_ended = true;
            }
        }
    }

    fn handle(&mut self, req: EngineRequest) {
        match req {
            EngineRequest::Attendance { reply } => {
                let _ = reply.send(self.engine.attendance().to_vec());
            }
            EngineRequest::UnknownFaces { reply } => {
                let _ = reply.send(self.engine.unknown_faces().to_vec());
            }
            EngineRequest::Liveness { reply } => {
                let _ = reply.send(self.engine.last_liveness().copied());
            }
            EngineRequest::Config { reply } => {
                let _ = reply.send(self.engine.config().clone());
            }
            EngineRequest::ApplyConfig { settings, reply } => {
                let result = self
                    .engine
                    .apply_settings(settings.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                    .map(|()| self.engine.config().clone())
                    .map_err(WorkerError::from);
                let _ = reply.send(result);
            }
            EngineRequest::Reload { reply } => {
                let result = self.engine.reload().map_err(|e| {
                    tracing::warn!(error = %e, "reload failed; keeping current gallery");
                    WorkerError::from(e)
                });
                let _ = reply.send(result);
            }
            EngineRequest::Status { reply } => {
                let _ = reply.send(EngineStatus {
                    frames_processed: self.frames_processed,
                    frames_missed: self.frames_missed,
                    source_ended: self.source_ended,
                    gallery_entries: self.engine.gallery().len(),
                    registered_names: self.engine.names().len(),
                    attendance_records: self.engine.attendance().len(),
                    unknown_faces: self.engine.unknown_faces().len(),
                });
            }
        }
    }
}
