//! Engine tuning knobs.
//!
//! Applied as a unit: a settings update either parses completely into a new
//! [`EngineConfig`] or is rejected and the previous one stays in force.
//! Values are not range-checked; odd values just change behavior.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown setting: {0}")]
    UnknownSetting(String),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed config {path}: {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Crops saved per unknown face.
    pub max_unknown_captures: u32,
    /// Cooldown shared by all unknown faces between two captures.
    pub unknown_capture_interval_seconds: f64,
    /// Fraction of the box size added on every side of the crop.
    pub crop_expand_ratio: f64,
    /// Laplacian variance above which a crop is suspicious.
    pub texture_threshold: f64,
    /// Mean brightness above which a crop is suspicious.
    pub reflection_threshold: f64,
    /// Distance below which a known face counts for attendance.
    pub match_distance_threshold: f32,
    /// Minimum box height in pixels for a face to count as near.
    pub near_face_height_threshold: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_unknown_captures: 3,
            unknown_capture_interval_seconds: 2.0,
            crop_expand_ratio: 0.25,
            texture_threshold: 450.0,
            reflection_threshold: 180.0,
            match_distance_threshold: 0.55,
            near_face_height_threshold: 250.0,
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

impl EngineConfig {
    /// Load from a TOML file; missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = toml::from_str(&raw).map_err(|source| ConfigError::Toml {
            path: path.display().to_string(),
            source,
        })?;
        tracing::info!(path = %path.display(), "engine config loaded");
        Ok(config)
    }

    /// Parse a JSON object; missing keys take their defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Copy of `self` with the given `key = value` settings applied.
    ///
    /// Any unknown key or unparsable value rejects the whole batch.
    pub fn with_overrides<'a, I>(&self, settings: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut next = self.clone();
        for (key, value) in settings {
            match key {
                "max_unknown_captures" => next.max_unknown_captures = parse(key, value)?,
                "unknown_capture_interval_seconds" => {
                    next.unknown_capture_interval_seconds = parse(key, value)?
                }
                "crop_expand_ratio" => next.crop_expand_ratio = parse(key, value)?,
                "texture_threshold" => next.texture_threshold = parse(key, value)?,
                "reflection_threshold" => next.reflection_threshold = parse(key, value)?,
                "match_distance_threshold" => next.match_distance_threshold = parse(key, value)?,
                "near_face_height_threshold" => {
                    next.near_face_height_threshold = parse(key, value)?
                }
                other => return Err(ConfigError::UnknownSetting(other.to_string())),
            }
        }
        Ok(next)
    }

    /// Interval as a duration. Saturates at the representable bounds; NaN is
    /// treated as zero.
    pub fn unknown_capture_interval(&self) -> Duration {
        let millis = self.unknown_capture_interval_seconds * 1000.0;
        if millis.is_nan() {
            return Duration::zero();
        }
        Duration::try_milliseconds(millis as i64).unwrap_or(if millis < 0.0 {
            Duration::MIN
        } else {
            Duration::MAX
        })
    }
}
