//! MSU-1 export
//!
//! Export is two steps. [`build_export`] renders the project into the exact
//! frames that will be written: converted to 44.1kHz stereo, trimmed, padded,
//! cut at the loop end and gain-adjusted. [`export_msu1`] writes that plan to
//! disk, optionally moving the previous file into a `Backup` folder first.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio_file::{msu1, AudioFileError};
use crate::engine::resample::RATE_TOLERANCE_HZ;
use crate::import::{self, ImportError, ResampleQuality};
use crate::timeline::ProjectTimeline;
use crate::types::{SampleBuffer, MSU1_CHANNELS, MSU1_SAMPLE_RATE};

/// Name of the folder previous exports are moved into
pub const BACKUP_DIR_NAME: &str = "Backup";

/// Gains smaller than this (in dB) are not applied
const GAIN_EPSILON_DB: f32 = 0.01;

/// Errors from exporting
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Project has no audio to export")]
    NoAudio,

    #[error("Invalid sample rate: {0:.1} Hz (must be 44100.0 Hz)")]
    InvalidSampleRate(f64),

    #[error("Invalid channel count: {0} (must be 2)")]
    InvalidChannelCount(usize),

    #[error("Backup failed: {message}")]
    Backup {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error(transparent)]
    File(#[from] AudioFileError),

    #[error(transparent)]
    Convert(#[from] ImportError),
}

pub type Result<T> = std::result::Result<T, ExportError>;

/// Export settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Move an existing target into `Backup/` before overwriting it
    pub create_backup: bool,
    /// Apply trim, padding and loop markers
    pub apply_loop_data: bool,
    /// Apply the project's normalization gain
    pub apply_gain: bool,
    pub resample_quality: ResampleQuality,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            create_backup: true,
            apply_loop_data: true,
            apply_gain: true,
            resample_quality: ResampleQuality::Balanced,
        }
    }
}

/// Frames and loop point ready to be written
#[derive(Debug, Clone)]
pub struct ExportPlan {
    pub buffer: SampleBuffer,
    /// Rate of `buffer`; must be 44.1kHz to be written
    pub sample_rate: f64,
    /// Loop start in output frames, None when the track does not loop
    pub loop_start: Option<u64>,
}

impl ExportPlan {
    /// Loop point as stored in the header (0 = no loop)
    pub fn header_loop_point(&self) -> u32 {
        self.loop_start
            .map_or(0, |s| u32::try_from(s).unwrap_or(u32::MAX))
    }
}

fn scale(sample: usize, ratio: f64) -> i64 {
    (sample as f64 * ratio) as i64
}

/// Render the project into an export plan
pub fn build_export(timeline: &ProjectTimeline, options: &ExportOptions) -> Result<ExportPlan> {
    if !timeline.has_audio() {
        return Err(ExportError::NoAudio);
    }

    let source_rate = timeline.sample_rate();
    let mut buffer =
        import::convert_to_msu1_format(timeline.audio(), source_rate, options.resample_quality)?;

    let mut loop_start: Option<i64> = None;
    if options.apply_loop_data {
        let ratio = if source_rate > 0.0 {
            MSU1_SAMPLE_RATE as f64 / source_rate
        } else {
            1.0
        };

        let trim = scale(timeline.trim_start(), ratio);
        let padding = scale(timeline.padding_samples(), ratio);
        let mut start = timeline.loop_start().map(|s| scale(s, ratio));
        let mut end = timeline.loop_end().map(|e| scale(e, ratio));

        if trim > 0 && (trim as usize) < buffer.len() {
            buffer = buffer.slice(trim as usize, buffer.len());
            start = start.map(|s| s - trim);
            end = end.map(|e| e - trim);
        }

        if padding > 0 {
            buffer.prepend_silence(padding as usize);
            start = start.map(|s| s + padding);
            end = end.map(|e| e + padding);
        }

        if let Some(end) = end.filter(|&e| e > 0 && (e as usize) < buffer.len()) {
            buffer.truncate(end as usize);
        }

        loop_start = start;
    }

    if options.apply_gain {
        let gain_db = timeline.normalization_gain_db();
        if gain_db.is_finite() && gain_db.abs() > GAIN_EPSILON_DB {
            buffer.apply_gain_db(gain_db as f64);
        }
    }

    let loop_start = loop_start.filter(|&s| s > 0).map(|s| s as u64);
    log::debug!(
        "build_export: {} frames, loop {:?}",
        buffer.len(),
        loop_start
    );
    Ok(ExportPlan {
        buffer,
        sample_rate: MSU1_SAMPLE_RATE as f64,
        loop_start,
    })
}

fn validate_plan(plan: &ExportPlan) -> Result<()> {
    validate_sample_rate(plan.sample_rate)?;
    if plan.buffer.num_channels() != MSU1_CHANNELS {
        return Err(ExportError::InvalidChannelCount(plan.buffer.num_channels()));
    }
    if plan.buffer.is_empty() {
        return Err(ExportError::NoAudio);
    }
    Ok(())
}

/// Check a buffer's rate before handing it to the writer
pub fn validate_sample_rate(sample_rate: f64) -> Result<()> {
    if (sample_rate - MSU1_SAMPLE_RATE as f64).abs() > RATE_TOLERANCE_HZ {
        return Err(ExportError::InvalidSampleRate(sample_rate));
    }
    Ok(())
}

/// Where a backup of `path` would go
pub fn backup_path(path: &Path) -> Option<PathBuf> {
    let parent = path.parent()?;
    let name = path.file_name()?;
    Some(parent.join(BACKUP_DIR_NAME).join(name))
}

/// Move `path` into its sibling `Backup` folder, replacing an older backup
///
/// Returns the backup location, or None if there was nothing to move.
pub fn move_to_backup(path: &Path) -> Result<Option<PathBuf>> {
    if !path.is_file() {
        return Ok(None);
    }

    let destination = backup_path(path).ok_or_else(|| ExportError::Backup {
        message: format!("Invalid output directory for {}", path.display()),
        source: None,
    })?;

    if let Some(dir) = destination.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ExportError::Backup {
            message: format!("Could not create Backup folder: {}", dir.display()),
            source: Some(e),
        })?;
    }

    if destination.is_file() {
        std::fs::remove_file(&destination).map_err(|e| ExportError::Backup {
            message: format!("Could not replace existing backup: {}", destination.display()),
            source: Some(e),
        })?;
    }

    std::fs::rename(path, &destination).map_err(|e| ExportError::Backup {
        message: "Failed to move previous export into Backup folder".to_string(),
        source: Some(e),
    })?;

    log::info!("move_to_backup: {:?} -> {:?}", path, destination);
    Ok(Some(destination))
}

/// Write an export plan as an MSU-1 `.pcm` file
pub fn export_msu1(path: &Path, plan: &ExportPlan, create_backup: bool) -> Result<()> {
    validate_plan(plan)?;

    if create_backup {
        move_to_backup(path)?;
    }

    msu1::write_pcm(path, &plan.buffer, plan.header_loop_point())?;
    log::info!(
        "export_msu1: {:?}, {} frames, loop {}",
        path,
        plan.buffer.len(),
        plan.header_loop_point()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_timeline(len: usize, rate: f64) -> ProjectTimeline {
        let data: Vec<f32> = (0..len).map(|i| i as f32 / len as f32).collect();
        let mut timeline = ProjectTimeline::new();
        timeline.set_audio_buffer(SampleBuffer::from_channels(vec![data.clone(), data]), rate);
        timeline
    }

    #[test]
    fn test_plain_export_keeps_everything() {
        let timeline = ramp_timeline(1000, 44100.0);
        let plan = build_export(&timeline, &ExportOptions::default()).unwrap();
        assert_eq!(plan.buffer.len(), 1000);
        assert_eq!(plan.loop_start, None);
        assert_eq!(plan.header_loop_point(), 0);
    }

    #[test]
    fn test_trim_pad_and_loop_end() {
        let mut timeline = ramp_timeline(1000, 44100.0);
        timeline.set_trim_start(100);
        timeline.set_padding_samples(20);
        timeline.set_loop_start(300);
        timeline.set_loop_end(800);

        let plan = build_export(&timeline, &ExportOptions::default()).unwrap();
        // 900 frames after trim, +20 padding, cut at 800 - 100 + 20
        assert_eq!(plan.buffer.len(), 720);
        assert_eq!(plan.loop_start, Some(220));
        assert_eq!(plan.buffer.channel(0)[19], 0.0);
        assert!((plan.buffer.channel(0)[20] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_loop_data_can_be_skipped() {
        let mut timeline = ramp_timeline(1000, 44100.0);
        timeline.set_trim_start(100);
        timeline.set_loop_start(300);
        let options = ExportOptions {
            apply_loop_data: false,
            ..ExportOptions::default()
        };
        let plan = build_export(&timeline, &options).unwrap();
        assert_eq!(plan.buffer.len(), 1000);
        assert_eq!(plan.loop_start, None);
    }

    #[test]
    fn test_loop_points_scale_with_rate() {
        let mut timeline = ramp_timeline(2205, 22050.0);
        timeline.set_loop_start(1000);
        let plan = build_export(&timeline, &ExportOptions::default()).unwrap();
        assert_eq!(plan.buffer.len(), 4410);
        assert_eq!(plan.loop_start, Some(2000));
    }

    #[test]
    fn test_loop_point_stays_on_its_content_after_resampling() {
        let mut data = vec![0.0f32; 19200];
        data[9600] = 1.0;
        let mut timeline = ProjectTimeline::new();
        timeline.set_audio_buffer(SampleBuffer::from_channels(vec![data.clone(), data]), 48000.0);
        timeline.set_loop_start(9600);

        let plan = build_export(&timeline, &ExportOptions::default()).unwrap();
        assert_eq!(plan.loop_start, Some(8820));
        let peak = plan
            .buffer
            .channel(0)
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map(|(i, _)| i)
            .unwrap();
        assert!(peak.abs_diff(8820) <= 1, "click landed at {}", peak);
    }

    #[test]
    fn test_gain_applied_above_threshold() {
        let mut timeline = ramp_timeline(100, 44100.0);
        timeline.set_normalization_gain_db(-6.0);
        let plan = build_export(&timeline, &ExportOptions::default()).unwrap();
        let expected = 0.5 * crate::types::db_to_gain(-6.0) as f32;
        assert!((plan.buffer.channel(0)[50] - expected).abs() < 1e-6);

        timeline.set_normalization_gain_db(0.005);
        let plan = build_export(&timeline, &ExportOptions::default()).unwrap();
        assert_eq!(plan.buffer.channel(0)[50], 0.5);

        timeline.set_normalization_gain_db(-6.0);
        let options = ExportOptions {
            apply_gain: false,
            ..ExportOptions::default()
        };
        let plan = build_export(&timeline, &options).unwrap();
        assert_eq!(plan.buffer.channel(0)[50], 0.5);
    }

    #[test]
    fn test_empty_project_is_rejected() {
        let timeline = ProjectTimeline::new();
        assert!(matches!(
            build_export(&timeline, &ExportOptions::default()),
            Err(ExportError::NoAudio)
        ));
    }

    #[test]
    fn test_validate_sample_rate() {
        assert!(validate_sample_rate(44100.05).is_ok());
        let err = validate_sample_rate(48000.0).unwrap_err();
        assert!(err.to_string().contains("48000.0"));
    }

    #[test]
    fn test_export_writes_pcm_and_backs_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game-1.pcm");
        let first = ExportPlan {
            buffer: SampleBuffer::silence(2, 10),
            sample_rate: 44100.0,
            loop_start: None,
        };
        export_msu1(&path, &first, true).unwrap();
        assert!(!dir.path().join(BACKUP_DIR_NAME).exists());

        let second = ExportPlan {
            buffer: SampleBuffer::silence(2, 20),
            sample_rate: 44100.0,
            loop_start: Some(5),
        };
        export_msu1(&path, &second, true).unwrap();

        let backup = dir.path().join(BACKUP_DIR_NAME).join("game-1.pcm");
        assert_eq!(msu1::pcm_frame_count(&backup).unwrap(), 10);
        let written = msu1::read_pcm(&path).unwrap();
        assert_eq!(written.buffer.len(), 20);
        assert_eq!(written.loop_point, 5);

        // a third export replaces the older backup
        export_msu1(&path, &first, true).unwrap();
        assert_eq!(msu1::pcm_frame_count(&backup).unwrap(), 20);
    }

    #[test]
    fn test_export_without_backup_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.pcm");
        let plan = ExportPlan {
            buffer: SampleBuffer::silence(2, 4),
            sample_rate: 44100.0,
            loop_start: None,
        };
        export_msu1(&path, &plan, false).unwrap();
        export_msu1(&path, &plan, false).unwrap();
        assert!(!dir.path().join(BACKUP_DIR_NAME).exists());
    }

    #[test]
    fn test_export_rejects_wrong_rate() {
        let dir = tempfile::tempdir().unwrap();
        let plan = ExportPlan {
            buffer: SampleBuffer::silence(2, 4),
            sample_rate: 48000.0,
            loop_start: None,
        };
        let path = dir.path().join("x.pcm");
        assert!(matches!(
            export_msu1(&path, &plan, false),
            Err(ExportError::InvalidSampleRate(_))
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_export_rejects_mono_plan() {
        let dir = tempfile::tempdir().unwrap();
        let plan = ExportPlan {
            buffer: SampleBuffer::silence(1, 4),
            sample_rate: 44100.0,
            loop_start: None,
        };
        assert!(matches!(
            export_msu1(&dir.path().join("x.pcm"), &plan, false),
            Err(ExportError::InvalidChannelCount(1))
        ));
    }
}
