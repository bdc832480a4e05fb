use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Directory of reference face images.
    pub faces_dir: PathBuf,
    /// JSON list of `{id, name}` records.
    pub names_file: PathBuf,
    /// Where unknown-face crops are written.
    pub unknown_dir: PathBuf,
    /// Root of the per-person recognized-face crop directories.
    pub recognized_dir: PathBuf,
    /// Optional TOML file with engine tuning knobs.
    pub engine_config: Option<PathBuf>,
    /// Recorded session driving the frame loop.
    pub recording: Option<PathBuf>,
    /// Pause between two frames, in milliseconds.
    pub frame_interval_ms: u64,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        Self {
            faces_dir: env_path("ROLLCALL_FACES_DIR").unwrap_or_else(|| data_dir.join("faces")),
            names_file: env_path("ROLLCALL_NAMES_FILE")
                .unwrap_or_else(|| data_dir.join("people.json")),
            unknown_dir: env_path("ROLLCALL_UNKNOWN_DIR")
                .unwrap_or_else(|| data_dir.join("unknown_faces")),
            recognized_dir: env_path("ROLLCALL_RECOGNIZED_DIR")
                .unwrap_or_else(|| data_dir.join("recognized_faces")),
            engine_config: env_path("ROLLCALL_ENGINE_CONFIG"),
            recording: env_path("ROLLCALL_RECORDING"),
            frame_interval_ms: env_u64("ROLLCALL_FRAME_INTERVAL_MS", 100),
        }
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
