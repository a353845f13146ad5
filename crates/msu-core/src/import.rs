//! Import pipeline
//!
//! Turns any supported audio file into the canonical MSU-1 working layout:
//! 44.1kHz stereo float. Sample rate conversion here is offline, so it uses
//! rubato's windowed-sinc resampler instead of the engines' linear
//! interpolation.

use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio_file::{self, AudioDecoder, AudioFileError};
use crate::engine::resample::RATE_TOLERANCE_HZ;
use crate::types::{db_to_gain, SampleBuffer, MSU1_CHANNELS, MSU1_SAMPLE_RATE};

/// Frames per resampler chunk
const RESAMPLE_CHUNK: usize = 1024;

/// Errors from importing audio
#[derive(Error, Debug)]
pub enum ImportError {
    #[error(transparent)]
    File(#[from] AudioFileError),

    #[error("Failed to set up resampler: {0}")]
    ResamplerSetup(#[from] rubato::ResamplerConstructionError),

    #[error("Resampling failed: {0}")]
    Resample(#[from] rubato::ResampleError),

    #[error("Audio has no channels or no samples")]
    Empty,

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f64),
}

pub type Result<T> = std::result::Result<T, ImportError>;

/// Sinc resampler quality preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResampleQuality {
    Fast,
    #[default]
    Balanced,
    Accurate,
}

impl ResampleQuality {
    fn parameters(self) -> SincInterpolationParameters {
        match self {
            ResampleQuality::Fast => SincInterpolationParameters {
                sinc_len: 64,
                f_cutoff: 0.9,
                oversampling_factor: 128,
                interpolation: SincInterpolationType::Linear,
                window: WindowFunction::Blackman,
            },
            ResampleQuality::Balanced => SincInterpolationParameters {
                sinc_len: 128,
                f_cutoff: 0.95,
                oversampling_factor: 256,
                interpolation: SincInterpolationType::Cubic,
                window: WindowFunction::BlackmanHarris,
            },
            ResampleQuality::Accurate => SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                oversampling_factor: 512,
                interpolation: SincInterpolationType::Cubic,
                window: WindowFunction::BlackmanHarris2,
            },
        }
    }
}

/// Import settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Subtract each channel's mean after conversion
    pub remove_dc_offset: bool,
    /// Scale to `normalize_peak_db` after conversion
    pub normalize_on_import: bool,
    pub normalize_peak_db: f64,
    pub resample_quality: ResampleQuality,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            remove_dc_offset: true,
            normalize_on_import: false,
            normalize_peak_db: -1.0,
            resample_quality: ResampleQuality::Balanced,
        }
    }
}

/// Result of an import
#[derive(Debug, Clone)]
pub struct ImportedAudio {
    /// 44.1kHz stereo
    pub buffer: SampleBuffer,
    /// Rate of the file before conversion
    pub source_sample_rate: f64,
    /// Loop start carried over from an MSU-1 source
    pub loop_point: Option<u32>,
}

/// Load `path` and convert it to 44.1kHz stereo
pub fn import_file(
    path: &Path,
    decoder: &dyn AudioDecoder,
    options: &ImportOptions,
) -> Result<ImportedAudio> {
    log::info!("import_file: {:?}", path);

    let loaded = audio_file::load_audio_file(path, decoder)?;
    let mut buffer = convert_to_msu1_format(
        &loaded.buffer,
        loaded.sample_rate,
        options.resample_quality,
    )?;

    if options.remove_dc_offset {
        remove_dc_offset(&mut buffer);
    }
    if options.normalize_on_import {
        normalize_to_peak(&mut buffer, options.normalize_peak_db);
    }

    log::info!(
        "import_file: {} samples @ {}Hz -> {} samples @ {}Hz",
        loaded.buffer.len(),
        loaded.sample_rate,
        buffer.len(),
        MSU1_SAMPLE_RATE
    );

    Ok(ImportedAudio {
        buffer,
        source_sample_rate: loaded.sample_rate,
        loop_point: loaded.loop_point,
    })
}

/// Resample to 44.1kHz and fit to two channels
///
/// Mono is duplicated to both sides; extra channels beyond the first two are
/// dropped.
pub fn convert_to_msu1_format(
    buffer: &SampleBuffer,
    sample_rate: f64,
    quality: ResampleQuality,
) -> Result<SampleBuffer> {
    if buffer.is_empty() {
        return Err(ImportError::Empty);
    }
    let target = MSU1_SAMPLE_RATE as f64;
    let resampled = if (sample_rate - target).abs() > RATE_TOLERANCE_HZ {
        resample_offline(buffer, sample_rate, target, quality)?
    } else {
        buffer.clone()
    };
    Ok(to_stereo(resampled))
}

fn to_stereo(buffer: SampleBuffer) -> SampleBuffer {
    match buffer.num_channels() {
        MSU1_CHANNELS => buffer,
        1 => {
            let mono = buffer.channel(0).to_vec();
            SampleBuffer::from_channels(vec![mono.clone(), mono])
        }
        _ => {
            let mut channels = buffer.into_channels();
            channels.truncate(MSU1_CHANNELS);
            SampleBuffer::from_channels(channels)
        }
    }
}

/// Offline sinc resampling of a whole buffer
///
/// The output has `ceil(len * to / from)` frames and is aligned with the input.
/// `SincFixedIn` centers its kernel on the output time, so the frames it holds
/// back only show up as a tail to flush, not as a shift of the content.
/// `output_delay()` is that streaming latency and is not trimmed here.
pub fn resample_offline(
    buffer: &SampleBuffer,
    from_rate: f64,
    to_rate: f64,
    quality: ResampleQuality,
) -> Result<SampleBuffer> {
    if from_rate <= 0.0 {
        return Err(ImportError::InvalidSampleRate(from_rate));
    }
    if to_rate <= 0.0 {
        return Err(ImportError::InvalidSampleRate(to_rate));
    }
    if buffer.is_empty() {
        return Err(ImportError::Empty);
    }

    let ratio = to_rate / from_rate;
    let num_channels = buffer.num_channels();
    let len = buffer.len();
    let expected = (len as f64 * ratio).ceil() as usize;

    let mut resampler = SincFixedIn::<f32>::new(
        ratio,
        1.0,
        quality.parameters(),
        RESAMPLE_CHUNK,
        num_channels,
    )?;

    let input: Vec<&[f32]> = buffer.channels().collect();
    let mut output: Vec<Vec<f32>> =
        vec![Vec::with_capacity(expected + resampler.output_frames_max()); num_channels];

    let append = |output: &mut Vec<Vec<f32>>, chunk: Vec<Vec<f32>>| {
        for (out, data) in output.iter_mut().zip(chunk) {
            out.extend_from_slice(&data);
        }
    };

    let mut pos = 0;
    while pos + RESAMPLE_CHUNK <= len {
        let frames: Vec<&[f32]> = input.iter().map(|c| &c[pos..pos + RESAMPLE_CHUNK]).collect();
        let chunk = resampler.process(&frames, None)?;
        append(&mut output, chunk);
        pos += RESAMPLE_CHUNK;
    }
    if pos < len {
        let frames: Vec<&[f32]> = input.iter().map(|c| &c[pos..]).collect();
        let chunk = resampler.process_partial(Some(frames.as_slice()), None)?;
        append(&mut output, chunk);
    }
    // Flush what is still inside the filter
    while output[0].len() < expected {
        let chunk = resampler.process_partial(None::<&[Vec<f32>]>, None)?;
        if chunk.first().map_or(true, |c| c.is_empty()) {
            break;
        }
        append(&mut output, chunk);
    }

    for channel in &mut output {
        channel.resize(expected, 0.0);
    }

    Ok(SampleBuffer::from_channels(output))
}

/// Subtract each channel's mean
pub fn remove_dc_offset(buffer: &mut SampleBuffer) {
    let len = buffer.len();
    if len == 0 {
        return;
    }
    for ch in 0..buffer.num_channels() {
        let data = buffer.channel_mut(ch);
        let mean = (data.iter().map(|&s| s as f64).sum::<f64>() / len as f64) as f32;
        for s in data.iter_mut() {
            *s -= mean;
        }
    }
}

/// Scale so the absolute peak lands on `target_db`
///
/// Silent buffers are left alone.
pub fn normalize_to_peak(buffer: &mut SampleBuffer, target_db: f64) {
    let peak = buffer.peak();
    if peak > 0.0 {
        let gain = db_to_gain(target_db) as f32 / peak;
        buffer.apply_gain(gain);
    }
}
