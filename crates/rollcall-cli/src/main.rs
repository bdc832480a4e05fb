use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::annotate::Annotator;
use rollcall_core::replay::{self, Replay};
use rollcall_core::{
    AttendanceRecord, DiskCaptureSink, Engine, EngineConfig, IdentityStore,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    async fn attendance(&self) -> zbus::Result<String>;
    async fn unknown_faces(&self) -> zbus::Result<String>;
    async fn liveness(&self) -> zbus::Result<String>;
    async fn config(&self) -> zbus::Result<String>;
    async fn apply_config(&self, settings: HashMap<String, String>) -> zbus::Result<String>;
    async fn reload(&self) -> zbus::Result<u32>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct StoreArgs {
    /// Directory of reference face images
    #[arg(long, default_value = "faces")]
    faces: PathBuf,
    /// JSON list of {id, name} records
    #[arg(long, default_value = "people.json")]
    names: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a recorded session through a local engine
    Replay {
        /// Recording JSON file
        recording: PathBuf,
        #[command(flatten)]
        store: StoreArgs,
        /// Engine config (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory for unknown-face crops
        #[arg(long, default_value = "unknown_faces")]
        unknown_dir: PathBuf,
        /// Root directory for recognized-face crops
        #[arg(long, default_value = "recognized_faces")]
        recognized_dir: PathBuf,
        /// Write annotated frames here
        #[arg(long)]
        annotate_dir: Option<PathBuf>,
        /// TrueType font for annotation captions (default: first system font found)
        #[arg(long, requires = "annotate_dir")]
        font: Option<PathBuf>,
        /// Print per-face captions as frames are processed
        #[arg(short, long)]
        verbose: bool,
    },
    /// List the gallery a recording's descriptors would produce
    Gallery {
        /// Recording JSON file
        recording: PathBuf,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Show the daemon's attendance ledger
    Attendance {
        /// Include unknown faces
        #[arg(long)]
        unknown: bool,
    },
    /// Show the daemon's engine config, or change it with key=value pairs
    Config {
        /// Settings to apply, e.g. texture_threshold=400
        settings: Vec<String>,
    },
    /// Ask the daemon to reload the gallery from disk
    Reload,
    /// Show liveness metrics of the last face the daemon evaluated
    Liveness,
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            recording,
            store,
            config,
            unknown_dir,
            recognized_dir,
            annotate_dir,
            font,
            verbose,
        } => {
            let config = match config {
                Some(path) => EngineConfig::load(&path)?,
                None => EngineConfig::default(),
            };
            let Replay {
                provider,
                mut source,
                clock,
            } = Replay::open(&recording)?;
            let mut engine = Engine::new(
                IdentityStore::new(store.faces, store.names),
                Box::new(provider),
                Box::new(DiskCaptureSink::new(unknown_dir, recognized_dir)),
                Box::new(clock),
                config,
            )
            .context("failed to initialise recognition engine")?;

            let annotator = match &annotate_dir {
                Some(dir) => {
                    std::fs::create_dir_all(dir)
                        .with_context(|| format!("cannot create {}", dir.display()))?;
                    Some(annotator(font.as_deref())?)
                }
                None => None,
            };

            let frames = replay::run(&mut engine, &mut source, |frame, report| {
                if verbose {
                    for face in &report.faces {
                        println!("[{:>5}] {}", report.sequence, face.caption());
                    }
                }
                if let (Some(dir), Some(annotator)) = (&annotate_dir, &annotator) {
                    if !report.faces.is_empty() {
                        save_annotated(annotator, dir, frame, report);
                    }
                }
            });

            println!("Processed {frames} frames");
            print_attendance(engine.attendance());
            println!("Unknown faces: {}", engine.unknown_faces().len());
        }
        Commands::Gallery { recording, store } => {
            let mut replay = Replay::open(&recording)?;
            let (gallery, names) = IdentityStore::new(store.faces, store.names)
                .load(&mut replay.provider)
                .context("failed to load identity store")?;

            if gallery.is_empty() {
                println!("Gallery is empty.");
                return Ok(());
            }
            println!("{:<24} {:<24} DIM", "LABEL", "NAME");
            for entry in gallery.entries() {
                println!(
                    "{:<24} {:<24} {}",
                    entry.label,
                    names.display_name(&entry.label),
                    entry.descriptor.len()
                );
            }
        }
        Commands::Attendance { unknown } => {
            let proxy = connect().await?;
            let records: Vec<AttendanceRecord> = serde_json::from_str(&proxy.attendance().await?)
                .context("daemon returned malformed attendance")?;
            print_attendance(&records);

            if unknown {
                let raw = proxy.unknown_faces().await?;
                let records: serde_json::Value = serde_json::from_str(&raw)?;
                println!("{}", serde_json::to_string_pretty(&records)?);
            }
        }
        Commands::Config { settings } => {
            let proxy = connect().await?;
            let raw = if settings.is_empty() {
                proxy.config().await?
            } else {
                proxy.apply_config(parse_settings(&settings)?).await?
            };
            let config = EngineConfig::from_json(&raw)?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Reload => {
            let proxy = connect().await?;
            let entries = proxy.reload().await?;
            println!("Gallery reloaded: {entries} entries");
        }
        Commands::Liveness => {
            let proxy = connect().await?;
            let raw = proxy.liveness().await?;
            let value: serde_json::Value = serde_json::from_str(&raw)?;
            if value.is_null() {
                println!("No face evaluated yet.");
            } else {
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
        }
        Commands::Status => match connect().await {
            Ok(proxy) => {
                let raw = proxy.status().await?;
                let value: serde_json::Value = serde_json::from_str(&raw)?;
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
            Err(e) => {
                println!("rollcalld: not connected ({e})");
            }
        },
    }

    Ok(())
}

async fn connect() -> Result<AttendanceProxy<'static>> {
    let conn = zbus::Connection::session()
        .await
        .context("cannot connect to the session bus")?;
    let proxy = AttendanceProxy::new(&conn)
        .await
        .context("cannot reach rollcalld")?;
    Ok(proxy)
}

/// Split `key=value` arguments.
fn parse_settings(args: &[String]) -> Result<HashMap<String, String>> {
    args.iter()
        .map(|arg| {
            let (key, value) = arg
                .split_once('=')
                .with_context(|| format!("expected key=value, got {arg:?}"))?;
            Ok((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn print_attendance(records: &[AttendanceRecord]) {
    if records.is_empty() {
        println!("No attendance recorded.");
        return;
    }
    println!(
        "{:<24} {:<20} {:<20} {:>8} {:>6}",
        "NAME", "FIRST SEEN", "MOST RECENT", "BEST", "EVENTS"
    );
    for r in records {
        println!(
            "{:<24} {:<20} {:<20} {:>8.4} {:>6}",
            r.name,
            r.first_seen.format("%Y-%m-%d %H:%M:%S").to_string(),
            r.most_recent.format("%Y-%m-%d %H:%M:%S").to_string(),
            r.best_distance,
            r.events
        );
    }
}

fn annotator(font: Option<&Path>) -> Result<Annotator> {
    if let Some(path) = font {
        return Annotator::from_font_file(path).context("failed to load annotation font");
    }
    Ok(Annotator::from_system_fonts().unwrap_or_else(|| {
        tracing::warn!("no system font found, annotations will have no captions");
        Annotator::boxes_only()
    }))
}

fn save_annotated(
    annotator: &Annotator,
    dir: &Path,
    frame: &rollcall_core::Frame,
    report: &rollcall_core::FrameReport,
) {
    let path = dir.join(format!("{:06}.jpg", report.sequence));
    if let Err(e) = annotator.annotate(frame, report).save(&path) {
        tracing::warn!(path = %path.display(), error = %e, "cannot write annotated frame");
    }
}
