//! Configuration for the track-prep tools
//!
//! - Generic YAML config loading/saving
//! - Default config paths
//! - [`PrepConfig`], the settings file with one section per stage
//!
//! # Usage
//!
//! ```ignore
//! use msu_core::config::{default_config_path, save_config, PrepConfig, CONFIG_FILE_NAME};
//!
//! let path = default_config_path(CONFIG_FILE_NAME);
//! let config = PrepConfig::load(&path);
//! save_config(&config, &path)?;
//! ```

mod io;
mod paths;

pub use io::{load_config, read_config, save_config};
pub use paths::{default_config_dir, default_config_path};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::export::ExportOptions;
use crate::import::ImportOptions;
use crate::timeline::{
    ProjectTimeline, DEFAULT_PAD_AMOUNT_MS, DEFAULT_SILENCE_THRESHOLD_DB, PAD_AMOUNT_RANGE_MS,
};

/// File name of the settings file inside the config dir
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Auto trim/pad settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimConfig {
    /// Lead-in kept (or padded) before the first audible sample
    /// Default: 200 ms, valid range 10..=5000
    pub pad_amount_ms: u32,

    /// Level below which leading samples count as silence
    /// Default: -60 dB
    pub silence_threshold_db: f64,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            pad_amount_ms: DEFAULT_PAD_AMOUNT_MS,
            silence_threshold_db: DEFAULT_SILENCE_THRESHOLD_DB,
        }
    }
}

impl TrimConfig {
    /// Run auto trim/pad on `timeline` with these settings
    pub fn apply_auto_trim_pad(&self, timeline: &mut ProjectTimeline) {
        timeline.set_pad_amount_ms(self.pad_amount_ms as i64);
        timeline.apply_auto_trim_pad(self.silence_threshold_db);
    }
}

/// Audio output device settings
///
/// Every field is optional; unset means "use the system default".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output device name
    pub device: Option<String>,
    /// Requested buffer size in frames
    pub buffer_frames: Option<u32>,
    /// Requested sample rate in Hz
    pub sample_rate: Option<u32>,
}

/// Track-prep settings file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepConfig {
    pub import: ImportOptions,
    pub trim: TrimConfig,
    pub export: ExportOptions,
    pub output: OutputConfig,
}

impl PrepConfig {
    /// Load the settings file at `path` and clamp it into range
    ///
    /// Falls back to defaults when the file is missing or invalid.
    pub fn load(path: &Path) -> Self {
        let mut config: PrepConfig = load_config(path);
        config.validate();
        config
    }

    /// Clamp out-of-range values into their valid ranges
    pub fn validate(&mut self) {
        let (min, max) = PAD_AMOUNT_RANGE_MS;
        let clamped = self.trim.pad_amount_ms.clamp(min, max);
        if clamped != self.trim.pad_amount_ms {
            log::warn!(
                "config: pad_amount_ms {} out of range, using {}",
                self.trim.pad_amount_ms,
                clamped
            );
            self.trim.pad_amount_ms = clamped;
        }

        if !self.import.normalize_peak_db.is_finite() || self.import.normalize_peak_db > 0.0 {
            log::warn!(
                "config: normalize_peak_db {} invalid, using -1.0",
                self.import.normalize_peak_db
            );
            self.import.normalize_peak_db = -1.0;
        }

        if self.output.buffer_frames == Some(0) {
            self.output.buffer_frames = None;
        }
        if self.output.sample_rate == Some(0) {
            self.output.sample_rate = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::ResampleQuality;
    use crate::types::SampleBuffer;

    #[test]
    fn test_defaults() {
        let config = PrepConfig::default();
        assert!(config.import.remove_dc_offset);
        assert!(!config.import.normalize_on_import);
        assert_eq!(config.import.resample_quality, ResampleQuality::Balanced);
        assert_eq!(config.trim.pad_amount_ms, 200);
        assert!(config.export.create_backup);
        assert_eq!(config.output, OutputConfig::default());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "trim:\n  pad_amount_ms: 50\nimport:\n  resample_quality: Accurate\n";
        let config: PrepConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.trim.pad_amount_ms, 50);
        assert_eq!(config.trim.silence_threshold_db, -60.0);
        assert_eq!(config.import.resample_quality, ResampleQuality::Accurate);
        assert!(config.import.remove_dc_offset);
        assert!(config.export.apply_loop_data);
    }

    #[test]
    fn test_validate_clamps() {
        let mut config = PrepConfig::default();
        config.trim.pad_amount_ms = 1;
        config.import.normalize_peak_db = 3.0;
        config.output.buffer_frames = Some(0);
        config.validate();
        assert_eq!(config.trim.pad_amount_ms, 10);
        assert_eq!(config.import.normalize_peak_db, -1.0);
        assert_eq!(config.output.buffer_frames, None);

        config.trim.pad_amount_ms = 60_000;
        config.validate();
        assert_eq!(config.trim.pad_amount_ms, 5000);
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let mut config = PrepConfig::default();
        config.output.device = Some("Speakers".to_string());
        config.export.create_backup = false;
        save_config(&config, &path).unwrap();

        let loaded: PrepConfig = load_config(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_validates_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "trim:\n  pad_amount_ms: 1\noutput:\n  sample_rate: 0\n").unwrap();

        let config = PrepConfig::load(&path);
        assert_eq!(config.trim.pad_amount_ms, 10);
        assert_eq!(config.output.sample_rate, None);
        assert!(config.export.create_backup);

        let missing = PrepConfig::load(&dir.path().join("missing.yaml"));
        assert_eq!(missing, PrepConfig::default());
    }

    #[test]
    fn test_trim_config_applies_pad_amount() {
        let mut data = vec![0.0f32; 44100];
        data[22050] = 0.5;
        let mut timeline = ProjectTimeline::new();
        timeline.set_audio_buffer(SampleBuffer::from_channels(vec![data.clone(), data]), 44100.0);

        let trim = TrimConfig {
            pad_amount_ms: 100,
            ..TrimConfig::default()
        };
        trim.apply_auto_trim_pad(&mut timeline);
        assert_eq!(timeline.pad_amount_ms(), 100);
        assert_eq!(timeline.trim_start(), 22050 - 4410);
        assert_eq!(timeline.padding_samples(), 0);
    }
}
