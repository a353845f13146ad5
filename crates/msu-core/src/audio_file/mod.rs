//! Audio file reading and writing
//!
//! Decoding goes through the [`AudioDecoder`] trait so loaders can be tested
//! or swapped; [`SymphoniaDecoder`] handles every format symphonia knows.
//! MSU-1 `.pcm` streams have their own codec in [`msu1`]. WAV export is
//! written with hound.

pub mod msu1;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::{SampleBuffer, MSU1_SAMPLE_RATE};

/// Errors from reading or writing audio files
#[derive(Error, Debug)]
pub enum AudioFileError {
    #[error("File does not exist: {0}")]
    NotFound(PathBuf),

    #[error("Failed to access audio file: {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Invalid MSU-1 PCM file: {0}")]
    InvalidHeader(String),

    #[error("File contains no audio data: {0}")]
    Empty(PathBuf),

    #[error("File is too large to load into memory ({0} bytes)")]
    TooLarge(u64),

    #[error("Cannot save empty audio buffer")]
    EmptyBuffer,

    #[error("Wrong channel count: expected {expected}, found {found}")]
    WrongChannelCount { expected: usize, found: usize },

    #[error("Unsupported bit depth: {0}")]
    UnsupportedBitDepth(u16),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

pub type Result<T> = std::result::Result<T, AudioFileError>;

/// Decoded audio plus its native sample rate
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub buffer: SampleBuffer,
    pub sample_rate: u32,
}

/// Decodes a whole file into memory
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<DecodedAudio>;
}

/// Decoder backed by symphonia's default codec and format registry
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedAudio> {
        use std::fs::File;
        use symphonia::core::audio::SampleBuffer as InterleavedBuffer;
        use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
        use symphonia::core::formats::FormatOptions;
        use symphonia::core::io::MediaSourceStream;
        use symphonia::core::meta::MetadataOptions;
        use symphonia::core::probe::Hint;

        let file = File::open(path).map_err(|source| AudioFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| AudioFileError::UnsupportedFormat(e.to_string()))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioFileError::UnsupportedFormat("No audio track found".to_string()))?;

        let track_id = track.id;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| AudioFileError::UnsupportedFormat("Unknown sample rate".to_string()))?;

        let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| AudioFileError::UnsupportedFormat(e.to_string()))?;

        let mut samples: Vec<f32> = Vec::new();
        let mut sample_buf: Option<InterleavedBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    log::warn!("Error reading packet: {}", e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(symphonia::core::errors::Error::DecodeError(e)) => {
                    log::warn!("Error decoding packet: {}", e);
                    continue;
                }
                Err(e) => return Err(AudioFileError::Decode(e.to_string())),
            };

            if sample_buf.is_none() {
                let spec = *decoded.spec();
                channels = spec.channels.count();
                sample_buf = Some(InterleavedBuffer::new(decoded.capacity() as u64, spec));
            }

            if let Some(ref mut buf) = sample_buf {
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
        }

        let buffer = SampleBuffer::from_interleaved(&samples, channels);
        log::debug!(
            "decode: {:?}, {} channels x {} samples @ {}Hz",
            path,
            buffer.num_channels(),
            buffer.len(),
            sample_rate
        );

        Ok(DecodedAudio {
            buffer,
            sample_rate,
        })
    }
}

/// Audio loaded for import, with the MSU-1 loop point when there is one
#[derive(Debug, Clone)]
pub struct LoadedAudio {
    pub buffer: SampleBuffer,
    pub sample_rate: f64,
    /// Loop start from an MSU-1 header (None for other formats or a zero loop)
    pub loop_point: Option<u32>,
}

/// True if `path` has a `.pcm` extension (case-insensitive)
pub fn is_msu1_pcm(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pcm"))
}

/// Load any supported file, routing `.pcm` through the MSU-1 codec
pub fn load_audio_file(path: &Path, decoder: &dyn AudioDecoder) -> Result<LoadedAudio> {
    if !path.is_file() {
        return Err(AudioFileError::NotFound(path.to_path_buf()));
    }

    if is_msu1_pcm(path) {
        let track = msu1::read_pcm(path)?;
        return Ok(LoadedAudio {
            buffer: track.buffer,
            sample_rate: MSU1_SAMPLE_RATE as f64,
            loop_point: (track.loop_point > 0).then_some(track.loop_point),
        });
    }

    let decoded = decoder.decode(path)?;
    if decoded.buffer.is_empty() {
        return Err(AudioFileError::Empty(path.to_path_buf()));
    }
    Ok(LoadedAudio {
        buffer: decoded.buffer,
        sample_rate: decoded.sample_rate as f64,
        loop_point: None,
    })
}

/// Write a buffer as a WAV file
///
/// `bit_depth` is 16 or 24 (integer PCM) or 32 (float). Integer output is
/// clamped to full scale.
pub fn write_wav(path: &Path, buffer: &SampleBuffer, sample_rate: u32, bit_depth: u16) -> Result<()> {
    use hound::{SampleFormat, WavSpec, WavWriter};

    if buffer.is_empty() {
        return Err(AudioFileError::EmptyBuffer);
    }

    let sample_format = match bit_depth {
        16 | 24 => SampleFormat::Int,
        32 => SampleFormat::Float,
        other => return Err(AudioFileError::UnsupportedBitDepth(other)),
    };

    let spec = WavSpec {
        channels: buffer.num_channels() as u16,
        sample_rate,
        bits_per_sample: bit_depth,
        sample_format,
    };

    let mut writer = WavWriter::create(path, spec)?;
    let interleaved = buffer.to_interleaved();
    match bit_depth {
        16 => {
            for s in interleaved {
                writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
            }
        }
        24 => {
            const MAX_24: f32 = 8_388_607.0;
            for s in interleaved {
                writer.write_sample((s.clamp(-1.0, 1.0) * MAX_24) as i32)?;
            }
        }
        _ => {
            for s in interleaved {
                writer.write_sample(s)?;
            }
        }
    }
    writer.finalize()?;

    log::info!(
        "write_wav: {:?}, {} channels x {} samples @ {}Hz, {}-bit",
        path,
        buffer.num_channels(),
        buffer.len(),
        sample_rate,
        bit_depth
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize, channels: usize) -> SampleBuffer {
        let data: Vec<f32> = (0..len)
            .map(|i| (i as f32 * 0.05).sin() * 0.5)
            .collect();
        SampleBuffer::from_channels(vec![data; channels])
    }

    #[test]
    fn test_wav_roundtrip_through_symphonia() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let buffer = sine(2000, 1);
        write_wav(&path, &buffer, 22050, 16).unwrap();

        let decoded = SymphoniaDecoder.decode(&path).unwrap();
        assert_eq!(decoded.sample_rate, 22050);
        assert_eq!(decoded.buffer.num_channels(), 1);
        assert_eq!(decoded.buffer.len(), 2000);
        for (a, b) in decoded.buffer.channel(0).iter().zip(buffer.channel(0)) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_float_wav_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone32.wav");
        let buffer = sine(500, 2);
        write_wav(&path, &buffer, 48000, 32).unwrap();

        let loaded = load_audio_file(&path, &SymphoniaDecoder).unwrap();
        assert_eq!(loaded.sample_rate, 48000.0);
        assert_eq!(loaded.buffer.num_channels(), 2);
        assert_eq!(loaded.loop_point, None);
        assert!((loaded.buffer.channel(1)[100] - buffer.channel(1)[100]).abs() < 1e-6);
    }

    #[test]
    fn test_write_wav_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.wav");
        assert!(matches!(
            write_wav(&path, &sine(10, 2), 44100, 12),
            Err(AudioFileError::UnsupportedBitDepth(12))
        ));
        assert!(matches!(
            write_wav(&path, &SampleBuffer::new(), 44100, 16),
            Err(AudioFileError::EmptyBuffer)
        ));
    }

    #[test]
    fn test_load_routes_pcm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track-2.PCM");
        msu1::write_pcm(&path, &sine(100, 2), 50).unwrap();

        let loaded = load_audio_file(&path, &SymphoniaDecoder).unwrap();
        assert_eq!(loaded.sample_rate, 44100.0);
        assert_eq!(loaded.loop_point, Some(50));
        assert_eq!(loaded.buffer.len(), 100);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_audio_file(Path::new("/nonexistent/file.wav"), &SymphoniaDecoder).unwrap_err();
        assert!(matches!(err, AudioFileError::NotFound(_)));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_decode_garbage_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.wav");
        std::fs::write(&path, b"definitely not audio").unwrap();
        assert!(SymphoniaDecoder.decode(&path).is_err());
    }
}
