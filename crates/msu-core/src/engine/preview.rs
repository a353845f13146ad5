//! Single-file audition player
//!
//! Used by the file browser to audition a file without touching the project.
//! Files are loaded whole before playback starts:
//!
//! - `.pcm` files are read raw as interleaved stereo i16 at 44.1kHz (the MSU-1
//!   header is skipped when present)
//! - everything else goes through an [`AudioDecoder`]
//!
//! Playback walks the loaded buffer with linear interpolation at
//! `file rate / device rate` and stops at the end. Loop points found in the
//! file are reported but never applied here.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use super::resample::{interpolate, ResamplingPolicy};
use super::{AudioCallback, OutputBlock};
use crate::audio_file::{self, msu1, AudioDecoder, AudioFileError, SymphoniaDecoder};
use crate::types::{SampleBuffer, MSU1_SAMPLE_RATE};

/// Why a preview could not be loaded
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("File does not exist: {0}")]
    NotFound(PathBuf),

    #[error("File contains no audio: {0}")]
    Empty(PathBuf),

    #[error(transparent)]
    File(#[from] AudioFileError),
}

/// Which loader produced the current source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewKind {
    /// Decoded through the generic decoder
    Decoded,
    /// Raw MSU-1 PCM
    RawPcm,
}

/// A fully loaded preview source
#[derive(Debug, Clone)]
struct PreviewSource {
    buffer: Arc<SampleBuffer>,
    sample_rate: f64,
    loop_point: Option<u32>,
    kind: PreviewKind,
}

#[derive(Debug, Default)]
struct PreviewState {
    source: Option<PreviewSource>,
    playing: bool,
    position: f64,
    device_sample_rate: f64,
}

/// Audition player for standalone files
pub struct PreviewEngine {
    decoder: Box<dyn AudioDecoder>,
    state: Mutex<PreviewState>,
}

impl Default for PreviewEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PreviewEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewEngine")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl PreviewEngine {
    pub fn new() -> Self {
        Self::with_decoder(Box::new(SymphoniaDecoder))
    }

    /// Use a custom decoder for non-PCM files
    pub fn with_decoder(decoder: Box<dyn AudioDecoder>) -> Self {
        Self {
            decoder,
            state: Mutex::new(PreviewState::default()),
        }
    }

    fn load(&self, path: &Path) -> Result<PreviewSource, LoadError> {
        if !path.is_file() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }

        let source = if audio_file::is_msu1_pcm(path) {
            let raw = msu1::load_raw_preview(path)?;
            PreviewSource {
                buffer: Arc::new(raw.buffer),
                sample_rate: MSU1_SAMPLE_RATE as f64,
                loop_point: raw.loop_point,
                kind: PreviewKind::RawPcm,
            }
        } else {
            let decoded = self.decoder.decode(path)?;
            PreviewSource {
                buffer: Arc::new(decoded.buffer),
                sample_rate: decoded.sample_rate as f64,
                loop_point: None,
                kind: PreviewKind::Decoded,
            }
        };

        if source.buffer.is_empty() || source.sample_rate <= 0.0 {
            return Err(LoadError::Empty(path.to_path_buf()));
        }
        Ok(source)
    }

    /// Stop whatever is playing, load `path` and start playing it
    ///
    /// On failure the engine is left stopped and empty.
    pub fn load_and_play(&self, path: &Path) -> Result<(), LoadError> {
        self.stop();

        let source = match self.load(path) {
            Ok(source) => source,
            Err(e) => {
                log::warn!("Preview: failed to load {:?}: {}", path, e);
                return Err(e);
            }
        };

        log::info!(
            "Preview: {:?} ({:?}), {} samples @ {}Hz",
            path,
            source.kind,
            source.buffer.len(),
            source.sample_rate
        );

        let previous = {
            let mut state = self.state.lock();
            let previous = state.source.replace(source);
            state.position = 0.0;
            state.playing = true;
            previous
        };
        drop(previous);
        Ok(())
    }

    /// Stop playback and unload the current source
    pub fn stop(&self) {
        let previous = {
            let mut state = self.state.lock();
            state.playing = false;
            state.position = 0.0;
            state.source.take()
        };
        drop(previous);
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    /// Playback position in seconds
    pub fn position(&self) -> f64 {
        let state = self.state.lock();
        match &state.source {
            Some(source) => state.position / source.sample_rate,
            None => 0.0,
        }
    }

    /// Length of the loaded file in seconds
    pub fn total_length(&self) -> f64 {
        self.state
            .lock()
            .source
            .as_ref()
            .map_or(0.0, |s| s.buffer.duration_seconds(s.sample_rate))
    }

    /// Loop point stored with the loaded file, if any
    pub fn loop_point(&self) -> Option<u32> {
        self.state.lock().source.as_ref().and_then(|s| s.loop_point)
    }

    pub fn kind(&self) -> Option<PreviewKind> {
        self.state.lock().source.as_ref().map(|s| s.kind)
    }
}

impl AudioCallback for PreviewEngine {
    fn device_about_to_start(&self, sample_rate: f64) {
        self.state.lock().device_sample_rate = sample_rate.max(0.0);
        log::info!("Preview engine: device starting at {}Hz", sample_rate);
    }

    fn device_stopped(&self) {
        self.state.lock().device_sample_rate = 0.0;
    }

    fn render(&self, block: &mut OutputBlock<'_>) {
        if block.is_null() {
            return;
        }
        block.clear();

        let mut guard = self.state.lock();
        let state = &mut *guard;

        if !state.playing {
            return;
        }
        let Some(source) = &state.source else {
            state.playing = false;
            return;
        };
        let buffer = &source.buffer;
        if buffer.is_empty() {
            state.playing = false;
            return;
        }

        // Unknown device rate plays at the file's own rate
        let playback_rate = if state.device_sample_rate > 0.0 {
            state.device_sample_rate
        } else {
            source.sample_rate
        };
        let ratio = ResamplingPolicy::for_rates(source.sample_rate, playback_rate).ratio;

        let len = buffer.len();
        // Mono sources feed every output channel
        let source_channels = buffer.num_channels();
        let mut pos = state.position;

        for i in 0..block.frames() {
            if pos >= len as f64 {
                state.playing = false;
                block.clear_from(i);
                break;
            }
            let index = pos as usize;
            let fraction = pos - index as f64;
            for ch in 0..block.channels() {
                block.channel_mut(ch)[i] =
                    interpolate(buffer.channel(ch % source_channels), index, fraction);
            }
            pos += ratio;
        }

        state.position = pos;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_file::{DecodedAudio, Result as FileResult};

    /// Decoder returning a fixed ramp regardless of the file's content
    struct RampDecoder {
        len: usize,
        sample_rate: u32,
    }

    impl AudioDecoder for RampDecoder {
        fn decode(&self, _path: &Path) -> FileResult<DecodedAudio> {
            let data: Vec<f32> = (0..self.len).map(|i| i as f32 / 1024.0).collect();
            Ok(DecodedAudio {
                buffer: SampleBuffer::from_channels(vec![data.clone(), data]),
                sample_rate: self.sample_rate,
            })
        }
    }

    struct MonoDecoder;

    impl AudioDecoder for MonoDecoder {
        fn decode(&self, _path: &Path) -> FileResult<DecodedAudio> {
            Ok(DecodedAudio {
                buffer: SampleBuffer::from_channels(vec![vec![0.5; 64]]),
                sample_rate: 44100,
            })
        }
    }

    fn render(engine: &PreviewEngine, frames: usize) -> Vec<f32> {
        let mut data = vec![1.0; frames * 2];
        let mut block = OutputBlock::new(&mut data, 2);
        engine.render(&mut block);
        data
    }

    fn write_pcm(dir: &Path, name: &str, frames: usize, loop_point: u32) -> PathBuf {
        let path = dir.join(name);
        let left: Vec<f32> = (0..frames).map(|i| i as f32 / 32768.0).collect();
        let buffer = SampleBuffer::from_channels(vec![left.clone(), left]);
        msu1::write_pcm(&path, &buffer, loop_point).unwrap();
        path
    }

    #[test]
    fn test_raw_pcm_plays_to_end_without_looping() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pcm(dir.path(), "track-1.pcm", 100, 20);

        let engine = PreviewEngine::new();
        engine.device_about_to_start(44100.0);
        engine.load_and_play(&path).unwrap();
        assert!(engine.is_playing());
        assert_eq!(engine.kind(), Some(PreviewKind::RawPcm));
        assert_eq!(engine.loop_point(), Some(20));
        assert!((engine.total_length() - 100.0 / 44100.0).abs() < 1e-12);

        let out = render(&engine, 150);
        // quantized to i16 on the way out
        assert!((out[99] - 99.0 / 32768.0).abs() < 1.5 / 32768.0);
        assert!(out[100..150].iter().all(|&s| s == 0.0));
        assert!(!engine.is_playing());
    }

    #[test]
    fn test_sidecar_loop_is_informational() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pcm(dir.path(), "t.pcm", 64, 0);
        std::fs::write(msu1::loop_sidecar_path(&path), 12u32.to_le_bytes()).unwrap();

        let engine = PreviewEngine::new();
        engine.device_about_to_start(44100.0);
        engine.load_and_play(&path).unwrap();
        assert_eq!(engine.loop_point(), Some(12));
        render(&engine, 128);
        assert!(!engine.is_playing());
    }

    #[test]
    fn test_decoded_path_resamples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.flac");
        std::fs::write(&path, b"stub").unwrap();

        let engine = PreviewEngine::with_decoder(Box::new(RampDecoder {
            len: 1000,
            sample_rate: 96000,
        }));
        engine.device_about_to_start(48000.0);
        engine.load_and_play(&path).unwrap();
        assert_eq!(engine.kind(), Some(PreviewKind::Decoded));
        assert_eq!(engine.loop_point(), None);

        let out = render(&engine, 4);
        assert_eq!(&out[..4], &[0.0, 2.0 / 1024.0, 4.0 / 1024.0, 6.0 / 1024.0]);
        assert!((engine.position() - 8.0 / 96000.0).abs() < 1e-12);
    }

    #[test]
    fn test_mono_file_plays_on_both_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice.wav");
        std::fs::write(&path, b"stub").unwrap();

        let engine = PreviewEngine::with_decoder(Box::new(MonoDecoder));
        engine.device_about_to_start(44100.0);
        engine.load_and_play(&path).unwrap();

        let out = render(&engine, 4);
        assert_eq!(&out[..4], &[0.5; 4]);
        assert_eq!(&out[4..], &[0.5; 4]);
    }

    #[test]
    fn test_unknown_device_rate_plays_at_native_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.ogg");
        std::fs::write(&path, b"stub").unwrap();

        let engine = PreviewEngine::with_decoder(Box::new(RampDecoder {
            len: 10,
            sample_rate: 32000,
        }));
        engine.load_and_play(&path).unwrap();
        let out = render(&engine, 3);
        assert_eq!(&out[..3], &[0.0, 1.0 / 1024.0, 2.0 / 1024.0]);
    }

    #[test]
    fn test_failed_load_leaves_engine_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_pcm(dir.path(), "good.pcm", 32, 0);
        let engine = PreviewEngine::new();
        engine.load_and_play(&good).unwrap();

        let err = engine.load_and_play(&dir.path().join("missing.pcm")).unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
        assert!(!engine.is_playing());
        assert_eq!(engine.total_length(), 0.0);
        assert!(render(&engine, 16).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_empty_pcm_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pcm");
        std::fs::write(&path, b"MSU1\0\0\0\0").unwrap();
        let engine = PreviewEngine::new();
        assert!(engine.load_and_play(&path).is_err());
        assert!(!engine.is_playing());
    }

    #[test]
    fn test_stop_unloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pcm(dir.path(), "a.pcm", 500, 0);
        let engine = PreviewEngine::new();
        engine.load_and_play(&path).unwrap();
        render(&engine, 100);
        engine.stop();
        engine.stop();
        assert!(!engine.is_playing());
        assert_eq!(engine.position(), 0.0);
        assert_eq!(engine.kind(), None);
    }
}
