//! Configuration management for the ProctorShield agent

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::monitor::Thresholds;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Detection service configuration
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Capture device and sampling configuration
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Alert thresholds
    #[serde(default)]
    pub thresholds: Thresholds,

    /// Session/report service configuration
    #[serde(default)]
    pub report: ReportConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Base URL of the face/eye detection service
    #[serde(default = "default_detection_url")]
    pub base_url: String,

    /// Per-request timeout (ms)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Interval between sampled frames (ms)
    #[serde(default = "default_sample_interval")]
    pub sample_interval_ms: u64,

    /// Webcam index used by the native camera backend
    #[serde(default)]
    pub camera_index: u32,

    /// Serve this image instead of a live camera (headless runs)
    #[serde(default)]
    pub still_image: Option<PathBuf>,

    /// JPEG quality used when encoding frames (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Whether to start a session automatically on launch
    #[serde(default)]
    pub autostart: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Endpoint that receives each alert event (best-effort)
    pub alert_endpoint: Option<String>,

    /// Endpoint that receives the end-of-session summary (best-effort)
    pub session_endpoint: Option<String>,
}

// Default value functions
fn default_detection_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_request_timeout() -> u64 {
    5000
}

fn default_sample_interval() -> u64 {
    1000
}

fn default_jpeg_quality() -> u8 {
    80
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            base_url: default_detection_url(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval(),
            camera_index: 0,
            still_image: None,
            jpeg_quality: default_jpeg_quality(),
            autostart: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            capture: CaptureConfig::default(),
            thresholds: Thresholds::default(),
            report: ReportConfig::default(),
            config_path: None,
        }
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, writing defaults if it is missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let contents = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            let mut config = Self::parse(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

            config.config_path = Some(config_path.to_path_buf());
            Ok(config)
        } else {
            let config = Config {
                config_path: Some(config_path.to_path_buf()),
                ..Config::default()
            };
            config.save()?;
            Ok(config)
        }
    }

    /// Parse a TOML document, filling omitted fields with defaults
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = self.config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_config_path(),
        }
    }

    /// Get default config path
    fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("dev", "proctor-shield", "agent")
            .context("Failed to determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    fn validate(&self) -> Result<()> {
        if self.capture.sample_interval_ms == 0 {
            anyhow::bail!("capture.sample_interval_ms must be greater than zero");
        }
        if !(1..=100).contains(&self.capture.jpeg_quality) {
            anyhow::bail!("capture.jpeg_quality must be between 1 and 100");
        }
        if self.thresholds.history_capacity == 0 || self.thresholds.activity_log_capacity == 0 {
            anyhow::bail!("history and activity log capacities must be greater than zero");
        }
        self.validate_thresholds()
    }

    fn validate_thresholds(&self) -> Result<()> {
        let t = &self.thresholds;

        for (name, value) in [
            ("movement_threshold_px", t.movement_threshold_px),
            ("large_movement_factor", t.large_movement_factor),
        ] {
            if !value.is_finite() || value <= 0.0 {
                anyhow::bail!("thresholds.{} must be a positive number, got {}", name, value);
            }
        }

        for (name, value) in [
            ("away_frame_limit", t.away_frame_limit as usize),
            ("movement_burst_limit", t.movement_burst_limit as usize),
            ("pattern_window", t.pattern_window),
            ("rapid_direction_count", t.rapid_direction_count),
            ("off_center_count", t.off_center_count),
        ] {
            if value == 0 {
                anyhow::bail!("thresholds.{} must be at least 1", name);
            }
        }

        if t.pattern_window > t.history_capacity {
            anyhow::bail!(
                "thresholds.pattern_window ({}) cannot exceed history_capacity ({})",
                t.pattern_window,
                t.history_capacity
            );
        }

        // a pattern needing more movements than the window holds can never fire
        for (name, value) in [
            ("rapid_direction_count", t.rapid_direction_count),
            ("off_center_count", t.off_center_count),
        ] {
            if value > t.pattern_window {
                anyhow::bail!(
                    "thresholds.{} ({}) cannot exceed pattern_window ({})",
                    name,
                    value,
                    t.pattern_window
                );
            }
        }

        Ok(())
    }
}
