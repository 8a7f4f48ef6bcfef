use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const MIN_SAMPLING_RATE_HZ: f64 = 0.5;
pub const MAX_SAMPLING_RATE_HZ: f64 = 30.0;

/// Trades detection recall for per-frame cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    Balanced,
    High,
}

impl QualityTier {
    /// Minimum face-detector score accepted at this tier.
    pub fn detector_confidence(self) -> f64 {
        match self {
            QualityTier::Low => 0.75,
            QualityTier::Balanced => 0.6,
            QualityTier::High => 0.5,
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityTier::Low => write!(f, "low"),
            QualityTier::Balanced => write!(f, "balanced"),
            QualityTier::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(QualityTier::Low),
            "balanced" | "medium" => Ok(QualityTier::Balanced),
            "high" => Ok(QualityTier::High),
            other => Err(format!("unknown quality tier: {other}")),
        }
    }
}

/// Which score the per-frame threat level is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Classifier probability only.
    ModelOnly,
    /// Classifier probability fused with pulse and temporal-consistency signals.
    Fused,
}

impl std::str::FromStr for ScoringMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "model" | "model_only" => Ok(ScoringMode::ModelOnly),
            "fused" => Ok(ScoringMode::Fused),
            other => Err(format!("unknown scoring mode: {other}")),
        }
    }
}

/// User preferences. Owned by the settings collaborator; read-only to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub sampling_rate_hz: f64,
    pub quality_tier: QualityTier,
    pub danger_notifications_enabled: bool,
    pub warning_notifications_enabled: bool,
    #[serde(default = "default_scoring_mode")]
    pub scoring_mode: ScoringMode,
}

fn default_scoring_mode() -> ScoringMode {
    ScoringMode::ModelOnly
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sampling_rate_hz: 2.0,
            quality_tier: QualityTier::Balanced,
            danger_notifications_enabled: true,
            warning_notifications_enabled: false,
            scoring_mode: default_scoring_mode(),
        }
    }
}

impl Settings {
    /// Sampling rate clamped to the supported range; non-finite values fall
    /// back to the default.
    pub fn effective_sampling_rate(&self) -> f64 {
        if self.sampling_rate_hz.is_finite() {
            self.sampling_rate_hz
                .clamp(MIN_SAMPLING_RATE_HZ, MAX_SAMPLING_RATE_HZ)
        } else {
            Settings::default().sampling_rate_hz
        }
    }

    /// `1000 / samplingRateHz` milliseconds.
    pub fn sampling_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.effective_sampling_rate())
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("DeepGuard").join("settings.json"))
    }

    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Reads settings from `path`, falling back to defaults on any error.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                log::warn!("Ignoring unreadable settings at {}: {e}", path.display());
                Settings::default()
            }),
            Err(_) => Settings::default(),
        }
    }

    pub fn save(&self) {
        if let Some(path) = Self::config_path() {
            if let Err(e) = self.save_to(&path) {
                log::warn!("Failed to save settings: {e}");
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }
}
