use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::coordinator::CoordinatorSettings;
use crate::error::{HeadsetError, HeadsetResult};
use crate::types::{ImageFormat, ReferenceSpaceKind, ViewConfiguration};

/// Default length of a haptic pulse.
pub const DEFAULT_HAPTIC_DURATION_NS: i64 = 25_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HapticPulse {
    pub amplitude: f32,
    pub duration_ns: i64,
    /// Zero lets the runtime pick its optimal frequency.
    pub frequency_hz: f32,
}

impl Default for HapticPulse {
    fn default() -> Self {
        Self {
            amplitude: 0.5,
            duration_ns: DEFAULT_HAPTIC_DURATION_NS,
            frequency_hz: 0.0,
        }
    }
}

/// Host configuration, loadable from a JSON file. Missing fields take their
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadsetConfig {
    pub application_name: String,
    pub view_configuration: ViewConfiguration,
    pub reference_space: ReferenceSpaceKind,
    pub multisample_count: u32,
    pub color_format: ImageFormat,
    /// Stop after this many rendered frames; `None` runs until the runtime
    /// asks to exit.
    pub frame_limit: Option<u64>,
    pub haptic_pulse: HapticPulse,
}

impl Default for HeadsetConfig {
    fn default() -> Self {
        Self {
            application_name: String::from("headset"),
            view_configuration: ViewConfiguration::PrimaryStereo,
            reference_space: ReferenceSpaceKind::Stage,
            multisample_count: 4,
            color_format: ImageFormat::Rgba8Srgb,
            frame_limit: None,
            haptic_pulse: HapticPulse::default(),
        }
    }
}

impl HeadsetConfig {
    pub fn load(path: impl AsRef<Path>) -> HeadsetResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| HeadsetError::config(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> HeadsetResult<Self> {
        let config: Self = serde_json::from_str(text).map_err(HeadsetError::config)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> HeadsetResult<()> {
        // The color buffer is resolved into the swapchain image, so it must
        // be multisampled.
        if !self.multisample_count.is_power_of_two() || !(2..=64).contains(&self.multisample_count)
        {
            return Err(HeadsetError::config(format!(
                "multisample_count must be a power of two from 2 to 64, got {}",
                self.multisample_count
            )));
        }
        if self.color_format.is_depth() {
            return Err(HeadsetError::config(format!(
                "color_format {:?} is a depth format",
                self.color_format
            )));
        }
        if self.application_name.is_empty() {
            return Err(HeadsetError::config("application_name is empty"));
        }
        Ok(())
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            view_configuration: self.view_configuration,
            reference_space: self.reference_space,
            color_format: self.color_format,
            multisample_count: self.multisample_count,
            ..CoordinatorSettings::default()
        }
    }
}
