//! MSU-1 PCM codec
//!
//! Layout (bit-exact):
//!
//! ```text
//! bytes 0..4   "MSU1"
//! bytes 4..8   loop start, u32 little-endian (0 if none)
//! bytes 8..    interleaved stereo i16 little-endian samples
//! ```
//!
//! The stream is implicitly 44.1kHz, 2 channels, 16-bit; none of that is
//! stored in-band.

use std::path::{Path, PathBuf};

use super::{AudioFileError, Result};
use crate::types::{SampleBuffer, MSU1_CHANNELS};

/// File magic
pub const MSU1_MAGIC: &[u8; 4] = b"MSU1";

/// Magic plus loop point
pub const MSU1_HEADER_LEN: usize = 8;

/// Bytes per stereo frame
const FRAME_BYTES: usize = 2 * MSU1_CHANNELS;

/// Largest frame count we are willing to load into memory
const MAX_FRAMES: u64 = i32::MAX as u64;

/// A decoded MSU-1 stream
#[derive(Debug, Clone)]
pub struct Msu1Track {
    /// Always two channels at 44.1kHz
    pub buffer: SampleBuffer,
    /// Loop start from the header, 0 when the track does not loop
    pub loop_point: u32,
}

/// Raw PCM loaded for audition
#[derive(Debug, Clone)]
pub struct RawPreview {
    pub buffer: SampleBuffer,
    /// Sidecar override if present, otherwise the header value if there is a header
    pub loop_point: Option<u32>,
}

#[inline]
fn sample_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

#[inline]
fn i16_to_sample(value: i16) -> f32 {
    value as f32 / 32768.0
}

/// De-interleave stereo i16 LE bytes; a trailing partial frame is ignored
fn decode_frames(bytes: &[u8]) -> SampleBuffer {
    let frames = bytes.len() / FRAME_BYTES;
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for frame in bytes.chunks_exact(FRAME_BYTES) {
        left.push(i16_to_sample(i16::from_le_bytes([frame[0], frame[1]])));
        right.push(i16_to_sample(i16::from_le_bytes([frame[2], frame[3]])));
    }
    SampleBuffer::from_channels(vec![left, right])
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| AudioFileError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Encode a stereo buffer as an MSU-1 stream
///
/// Samples are clamped to [-1, 1] before conversion.
pub fn encode(buffer: &SampleBuffer, loop_start: u32) -> Result<Vec<u8>> {
    if buffer.num_channels() != MSU1_CHANNELS {
        return Err(AudioFileError::WrongChannelCount {
            expected: MSU1_CHANNELS,
            found: buffer.num_channels(),
        });
    }
    if buffer.is_empty() {
        return Err(AudioFileError::EmptyBuffer);
    }

    let mut bytes = Vec::with_capacity(MSU1_HEADER_LEN + buffer.len() * FRAME_BYTES);
    bytes.extend_from_slice(MSU1_MAGIC);
    bytes.extend_from_slice(&loop_start.to_le_bytes());

    let (left, right) = (buffer.channel(0), buffer.channel(1));
    for (&l, &r) in left.iter().zip(right) {
        bytes.extend_from_slice(&sample_to_i16(l).to_le_bytes());
        bytes.extend_from_slice(&sample_to_i16(r).to_le_bytes());
    }
    Ok(bytes)
}

/// Decode an MSU-1 stream
pub fn decode(bytes: &[u8]) -> Result<Msu1Track> {
    if bytes.len() < 4 {
        return Err(AudioFileError::InvalidHeader("could not read file header".into()));
    }
    if &bytes[..4] != MSU1_MAGIC {
        return Err(AudioFileError::InvalidHeader("missing MSU1 magic".into()));
    }
    if bytes.len() < MSU1_HEADER_LEN {
        return Err(AudioFileError::InvalidHeader("could not read loop point".into()));
    }

    let loop_point = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let frames = ((bytes.len() - MSU1_HEADER_LEN) / FRAME_BYTES) as u64;
    if frames == 0 {
        return Err(AudioFileError::InvalidHeader("no audio data".into()));
    }
    if frames > MAX_FRAMES {
        return Err(AudioFileError::TooLarge(bytes.len() as u64));
    }

    Ok(Msu1Track {
        buffer: decode_frames(&bytes[MSU1_HEADER_LEN..]),
        loop_point,
    })
}

/// Read an MSU-1 `.pcm` file
pub fn read_pcm(path: &Path) -> Result<Msu1Track> {
    let bytes = read_file(path)?;
    let track = decode(&bytes)?;
    log::debug!(
        "read_pcm: {:?}, {} frames, loop {}",
        path,
        track.buffer.len(),
        track.loop_point
    );
    Ok(track)
}

/// Write an MSU-1 `.pcm` file, replacing any existing file
pub fn write_pcm(path: &Path, buffer: &SampleBuffer, loop_start: u32) -> Result<()> {
    let bytes = encode(buffer, loop_start)?;
    std::fs::write(path, bytes).map_err(|source| AudioFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!(
        "write_pcm: {:?}, {} frames, loop {}",
        path,
        buffer.len(),
        loop_start
    );
    Ok(())
}

/// Frame count derived from the file size
pub fn pcm_frame_count(path: &Path) -> Result<u64> {
    let size = std::fs::metadata(path)
        .map_err(|source| AudioFileError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    if size < MSU1_HEADER_LEN as u64 {
        return Err(AudioFileError::InvalidHeader("file too small".into()));
    }
    Ok((size - MSU1_HEADER_LEN as u64) / FRAME_BYTES as u64)
}

/// `track.pcm` -> `track.pcm.loop`
pub fn loop_sidecar_path(pcm_path: &Path) -> PathBuf {
    let mut name = pcm_path.as_os_str().to_os_string();
    name.push(".loop");
    PathBuf::from(name)
}

/// Loop point override from the sibling `.pcm.loop` file, if any
pub fn read_loop_sidecar(pcm_path: &Path) -> Option<u32> {
    let bytes = std::fs::read(loop_sidecar_path(pcm_path)).ok()?;
    let raw: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}

/// Load a `.pcm` file whole for audition
///
/// Files with the MSU-1 header have it skipped; anything else is taken as bare
/// interleaved stereo i16. A `.pcm.loop` sidecar overrides the loop point.
pub fn load_raw_preview(path: &Path) -> Result<RawPreview> {
    let bytes = read_file(path)?;

    let (header_loop, body) = if bytes.len() >= MSU1_HEADER_LEN && &bytes[..4] == MSU1_MAGIC {
        let loop_point = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        (Some(loop_point), &bytes[MSU1_HEADER_LEN..])
    } else {
        (None, &bytes[..])
    };

    let frames = (body.len() / FRAME_BYTES) as u64;
    if frames == 0 {
        return Err(AudioFileError::Empty(path.to_path_buf()));
    }
    if frames > MAX_FRAMES {
        return Err(AudioFileError::TooLarge(bytes.len() as u64));
    }

    Ok(RawPreview {
        buffer: decode_frames(body),
        loop_point: read_loop_sidecar(path).or(header_loop),
    })
}
