use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::compositor::{Resample, TextAnchor};
pub use crate::image_processing::LoaderConfig;
use crate::{DEFAULT_SEPIA_INTENSITY, GOOGLE_SETTLE_DELAY, MAX_OUTPUT_DIMENSION, MAX_OUTPUT_PIXELS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Queue operations behind the one in flight instead of overlapping them.
    pub serialize_operations: bool,
    /// Pause between a successful Google sign-in and the state change.
    pub google_settle_delay_ms: u64,
}

impl SessionConfig {
    pub fn google_settle_delay(&self) -> Duration {
        Duration::from_millis(self.google_settle_delay_ms)
    }

    /// No settle delay; used by headless hosts and tests.
    pub fn immediate() -> Self {
        Self {
            google_settle_delay_ms: 0,
            ..Self::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            serialize_operations: true,
            google_settle_delay_ms: GOOGLE_SETTLE_DELAY.as_millis() as u64,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub text_anchor: TextAnchor,
    pub resample: Resample,
    pub max_output_dimension: u32,
    pub max_output_pixels: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            text_anchor: TextAnchor::default(),
            resample: Resample::default(),
            max_output_dimension: MAX_OUTPUT_DIMENSION,
            max_output_pixels: MAX_OUTPUT_PIXELS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub sepia_intensity: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            sepia_intensity: DEFAULT_SEPIA_INTENSITY,
        }
    }
}

/// Everything the host can tune, grouped per component.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub session: SessionConfig,
    pub render: RenderConfig,
    pub filters: FilterConfig,
    pub loader: LoaderConfig,
}

impl EditorConfig {
    /// Parses and validates a JSON document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| ConfigError::Invalid {
            field,
            reason: reason.to_string(),
        };

        if !self.filters.sepia_intensity.is_finite() {
            return Err(invalid("filters.sepia_intensity", "must be finite"));
        }
        if self.render.max_output_dimension == 0 {
            return Err(invalid("render.max_output_dimension", "must be positive"));
        }
        if self.render.max_output_pixels == 0 {
            return Err(invalid("render.max_output_pixels", "must be positive"));
        }
        if self.loader.max_concurrent_ops == 0 {
            return Err(invalid("loader.max_concurrent_ops", "must be at least 1"));
        }
        if self.loader.max_dimension == 0 || self.loader.max_edit_dimension == 0 {
            return Err(invalid("loader.max_dimension", "dimensions must be positive"));
        }
        if self.loader.max_input_bytes == 0 {
            return Err(invalid("loader.max_input_bytes", "must be positive"));
        }
        Ok(())
    }
}
