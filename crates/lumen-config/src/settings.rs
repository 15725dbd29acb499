//! Engine settings file.
//!
//! Every field is optional; missing fields take their defaults.
//!
//! # TOML Format
//!
//! ```toml
//! log_filter = "info"
//! fallback_color = [0.0, 0.0, 0.0, 1.0]
//!
//! [resolution]
//! width = 640
//! height = 360
//!
//! [signals]
//! seed = 0
//! default_deadzone = 0.0
//! default_smoothing = 0.0
//!
//! [signals.axes."gamepad.axis0"]
//! deadzone = 0.08
//! smoothing = 0.5
//! center = 0.5
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use lumen_platform::AxisConditioning;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Output resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionSettings {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Default for ResolutionSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
        }
    }
}

/// Signal sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalSettings {
    /// Seed for `random.value`.
    pub seed: u64,
    /// Deadzone for axis-like sources without an explicit entry.
    pub default_deadzone: f32,
    /// Smoothing for axis-like sources without an explicit entry.
    pub default_smoothing: f32,
    /// Per-key conditioning.
    pub axes: BTreeMap<String, AxisConditioning>,
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            default_deadzone: 0.0,
            default_smoothing: 0.0,
            axes: BTreeMap::new(),
        }
    }
}

impl SignalSettings {
    /// Conditioning applied to axis-like sources without an entry.
    pub fn default_axis(&self) -> AxisConditioning {
        AxisConditioning::new(self.default_deadzone, self.default_smoothing)
    }
}

/// Top-level engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Default `tracing` filter; `RUST_LOG` overrides it.
    pub log_filter: String,
    /// RGBA color of the fallback target.
    pub fallback_color: [f32; 4],
    /// Output resolution.
    pub resolution: ResolutionSettings,
    /// Signal sampling.
    pub signals: SignalSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            log_filter: "info".to_owned(),
            fallback_color: [0.0, 0.0, 0.0, 1.0],
            resolution: ResolutionSettings::default(),
            signals: SignalSettings::default(),
        }
    }
}

impl EngineSettings {
    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let settings = Self::from_toml(&content)?;
        tracing::debug!("config_load: settings from {}", path.display());
        Ok(settings)
    }

    /// Loads the settings file at the default location, or defaults if it
    /// doesn't exist.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let path = crate::paths::settings_path();
        if path.is_file() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse settings from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(toml_str)?;
        Ok(settings.sanitized())
    }

    /// Convert settings to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save settings to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            crate::paths::ensure_dir(parent)?;
        }
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Replaces values the engine can't use with defaults.
    pub fn sanitized(mut self) -> Self {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            tracing::warn!(
                "config_settings: resolution {}x{} replaced by default",
                self.resolution.width,
                self.resolution.height
            );
            self.resolution = ResolutionSettings::default();
        }
        self.fallback_color = self
            .fallback_color
            .map(|c| if c.is_finite() { c.clamp(0.0, 1.0) } else { 0.0 });
        for conditioning in self.signals.axes.values_mut() {
            *conditioning = conditioning.sanitized();
        }
        self
    }
}
