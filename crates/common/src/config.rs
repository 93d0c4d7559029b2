//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::clock::FrameConfig;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Recognizer executable settings.
    #[serde(default)]
    pub executable: ExecutableConfig,

    /// Default frame axis for new timelines.
    #[serde(default)]
    pub frame: FrameConfig,

    /// Cue optimization defaults.
    #[serde(default)]
    pub optimize: OptimizeDefaults,

    /// Strip placement defaults.
    #[serde(default)]
    pub placement: PlacementDefaults,

    /// Background job settings.
    #[serde(default)]
    pub job: JobConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Phoneme recognizer engine passed to the executable with `-r`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recognizer {
    /// Speech recognition based, English only.
    #[default]
    PocketSphinx,
    /// Language independent phonetic recognition.
    Phonetic,
}

impl Recognizer {
    /// Name understood by the executable.
    pub fn cli_name(&self) -> &'static str {
        match self {
            Recognizer::PocketSphinx => "pocketSphinx",
            Recognizer::Phonetic => "phonetic",
        }
    }
}

/// How placed strips blend into their neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Strips never overlap and never auto-blend.
    None,
    /// Overlap neighbours by `blend_ratio`; only silence auto-blends.
    #[default]
    ByRatio,
    /// Overlap like `ByRatio` and auto-blend every strip.
    AlwaysAuto,
}

/// Recognizer executable settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutableConfig {
    /// Path to the recognizer executable.
    pub path: PathBuf,

    /// Recognizer engine.
    pub recognizer: Recognizer,

    /// Extended mouth shapes to enable (e.g. "GHX"), empty for none.
    pub extended_shapes: String,

    /// Optional dialog text file improving recognition.
    pub dialog_file: Option<PathBuf>,
}

/// Cue optimization defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeDefaults {
    /// Longest allowed non-silence cue (seconds).
    pub max_cue_duration: f64,

    /// Blend-in window (seconds); cues this close to the limit are left alone.
    pub blend_in_time: f64,

    /// Fill trimmed time with a silence cue.
    pub append_x: bool,
}

/// Strip placement defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementDefaults {
    /// Split point inside each cue, in `[0, 1]`.
    pub blend_ratio: f64,

    /// Blending policy.
    pub blend_mode: BlendMode,

    /// Lower playback-speed clamp.
    pub scale_min: f64,

    /// Upper playback-speed clamp.
    pub scale_max: f64,
}

/// Background job settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Upper bound when joining reader threads.
    pub join_timeout_secs: u64,

    /// Host tick used by the CLI to poll a running capture.
    pub poll_interval_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "lipsync=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for ExecutableConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("rhubarb"),
            recognizer: Recognizer::default(),
            extended_shapes: "GHX".to_string(),
            dialog_file: None,
        }
    }
}

impl Default for OptimizeDefaults {
    fn default() -> Self {
        Self {
            max_cue_duration: 0.2,
            blend_in_time: 0.05,
            append_x: true,
        }
    }
}

impl Default for PlacementDefaults {
    fn default() -> Self {
        Self {
            blend_ratio: 0.5,
            blend_mode: BlendMode::default(),
            scale_min: 0.8,
            scale_max: 2.0,
        }
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            join_timeout_secs: 5,
            poll_interval_ms: 100,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &std::path::Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("lipsync").join("config.json")
}
