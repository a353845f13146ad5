//! CPAL output host
//!
//! Opens one stereo (or wider) float output stream and drives an
//! [`OutputMixer`] from the device callback. The engines do their own locking,
//! so the stream closure owns the mixer outright.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::device::{default_output_device, find_device_by_name};
use super::error::{AudioError, AudioResult};
use super::mixer::{OutputMixer, MAX_BUFFER_SIZE};
use crate::config::OutputConfig;
use crate::engine::AudioCallback;
use crate::types::MSU1_SAMPLE_RATE;

/// Buffer size when the config does not request one (frames)
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Smallest buffer size we will request (frames)
const MIN_BUFFER_SIZE: u32 = 64;

/// Keeps the output stream alive
///
/// Dropping the handle stops the stream and then tells every callback the
/// device has stopped.
pub struct OutputHandle {
    stream: Option<Stream>,
    callbacks: Vec<Arc<dyn AudioCallback>>,
    device_name: String,
    sample_rate: u32,
    buffer_size: u32,
    channels: u16,
}

impl OutputHandle {
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Buffer size in frames as requested from the device
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// One-way output latency in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }
}

impl Drop for OutputHandle {
    fn drop(&mut self) {
        drop(self.stream.take());
        for callback in &self.callbacks {
            callback.device_stopped();
        }
        log::info!("Audio stream stopped ({})", self.device_name);
    }
}

/// Requested buffer size clamped to what the mixer can render
pub(crate) fn resolve_buffer_size(requested: Option<u32>) -> u32 {
    requested
        .map(|frames| frames.clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE as u32))
        .unwrap_or(DEFAULT_BUFFER_SIZE)
}

/// Open the configured output and start driving `callbacks`
///
/// Each callback gets `device_about_to_start` with the negotiated rate before
/// the stream starts.
pub fn start_output(
    callbacks: Vec<Arc<dyn AudioCallback>>,
    config: &OutputConfig,
) -> AudioResult<OutputHandle> {
    let device = match &config.device {
        Some(name) => find_device_by_name(name)?,
        None => default_output_device()?,
    };

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let supported = get_output_config(&device, config)?;
    let sample_rate = supported.sample_rate().0;
    let buffer_size = resolve_buffer_size(config.buffer_frames);

    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };

    log::info!(
        "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        sample_rate,
        buffer_size,
        (buffer_size as f32 / sample_rate as f32) * 1000.0
    );

    let mixer = OutputMixer::new(callbacks.clone(), stream_config.channels as usize);
    mixer.device_about_to_start(sample_rate as f64);

    let stream = match build_output_stream(&device, &stream_config, mixer) {
        Ok(stream) => stream,
        Err(e) => {
            for callback in &callbacks {
                callback.device_stopped();
            }
            return Err(e);
        }
    };
    if let Err(e) = stream.play() {
        drop(stream);
        for callback in &callbacks {
            callback.device_stopped();
        }
        return Err(AudioError::StreamPlayError(e.to_string()));
    }

    log::info!("Audio stream started");

    Ok(OutputHandle {
        stream: Some(stream),
        callbacks,
        device_name,
        sample_rate,
        buffer_size,
        channels: stream_config.channels,
    })
}

/// Pick a float config with at least two channels, preferring 44.1kHz
fn get_output_config(
    device: &cpal::Device,
    config: &OutputConfig,
) -> AudioResult<cpal::SupportedStreamConfig> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    if supported_configs.is_empty() {
        return Err(AudioError::ConfigError(
            "No supported output configurations".to_string(),
        ));
    }

    let target_sample_rate = config.sample_rate.unwrap_or(MSU1_SAMPLE_RATE);
    let in_range = |c: &&cpal::SupportedStreamConfigRange| {
        target_sample_rate >= c.min_sample_rate().0 && target_sample_rate <= c.max_sample_rate().0
    };

    let float_configs: Vec<_> = supported_configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .collect();

    let best_config = float_configs
        .iter()
        .copied()
        .filter(|c| c.channels() >= 2)
        .find(in_range)
        .or_else(|| float_configs.iter().copied().find(|c| c.channels() >= 2))
        .or_else(|| float_configs.first().copied())
        .ok_or_else(|| {
            AudioError::UnsupportedFormat(format!(
                "device offers no f32 output ({:?})",
                supported_configs.first().map(|c| c.sample_format())
            ))
        })?;

    let sample_rate = if in_range(&best_config) {
        cpal::SampleRate(target_sample_rate)
    } else {
        let fallback = best_config.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz (playback will be resampled)",
            target_sample_rate,
            fallback.0
        );
        fallback
    };

    Ok(best_config.clone().with_sample_rate(sample_rate))
}

fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut mixer: OutputMixer,
) -> AudioResult<Stream> {
    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                mixer.process_interleaved(data);
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_buffer_size() {
        assert_eq!(resolve_buffer_size(None), DEFAULT_BUFFER_SIZE);
        assert_eq!(resolve_buffer_size(Some(256)), 256);
        assert_eq!(resolve_buffer_size(Some(1)), MIN_BUFFER_SIZE);
        assert_eq!(resolve_buffer_size(Some(1 << 20)), MAX_BUFFER_SIZE as u32);
    }
}
