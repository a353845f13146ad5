//! Common types for MSU-1 track preparation
//!
//! This module contains the fundamental audio types shared by the timeline,
//! the playback engines, and the import/export layers.

/// Audio sample type (32-bit float for processing, stored as 16-bit in MSU-1 files)
pub type Sample = f32;

/// MSU-1 PCM streams are always 44.1kHz
pub const MSU1_SAMPLE_RATE: u32 = 44100;

/// MSU-1 PCM streams are always stereo
pub const MSU1_CHANNELS: usize = 2;

/// MSU-1 PCM streams are always signed 16-bit
pub const MSU1_BIT_DEPTH: u16 = 16;

/// Sample rate a fresh project starts with
pub const DEFAULT_SAMPLE_RATE: f64 = MSU1_SAMPLE_RATE as f64;

/// Gains at or below this level are treated as silence
pub const SILENCE_FLOOR_DB: f64 = -100.0;

/// Convert decibels to a linear gain factor
///
/// Anything at or below [`SILENCE_FLOOR_DB`] maps to exactly zero.
#[inline]
pub fn db_to_gain(db: f64) -> f64 {
    if db <= SILENCE_FLOOR_DB {
        0.0
    } else {
        10f64.powf(db / 20.0)
    }
}

/// Convert a linear gain factor to decibels
#[inline]
pub fn gain_to_db(gain: f64) -> f64 {
    if gain <= 0.0 {
        SILENCE_FLOOR_DB
    } else {
        (20.0 * gain.log10()).max(SILENCE_FLOOR_DB)
    }
}

/// Transport state shared by the playback engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// A channel-major block of audio samples
///
/// Each channel is stored in its own contiguous vector and all channels share
/// the same length. The sample rate is tracked by whoever owns the buffer, not
/// by the buffer itself.
///
/// Once handed to a player (usually wrapped in an `Arc`) a buffer is treated
/// as an immutable snapshot; new audio replaces it wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleBuffer {
    channels: Vec<Vec<Sample>>,
    len: usize,
}

impl SampleBuffer {
    /// Create an empty buffer with no channels
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a silent buffer of the given shape
    pub fn silence(num_channels: usize, len: usize) -> Self {
        Self {
            channels: vec![vec![0.0; len]; num_channels],
            len: if num_channels == 0 { 0 } else { len },
        }
    }

    /// Build a buffer from per-channel sample vectors
    ///
    /// # Panics
    /// Panics if the channels differ in length.
    pub fn from_channels(channels: Vec<Vec<Sample>>) -> Self {
        let len = channels.first().map_or(0, |c| c.len());
        assert!(
            channels.iter().all(|c| c.len() == len),
            "all channels must have equal length"
        );
        Self { channels, len }
    }

    /// Build a buffer by de-interleaving frame-ordered samples
    ///
    /// A trailing partial frame is dropped.
    pub fn from_interleaved(samples: &[Sample], num_channels: usize) -> Self {
        if num_channels == 0 {
            return Self::new();
        }
        let len = samples.len() / num_channels;
        let mut channels = vec![Vec::with_capacity(len); num_channels];
        for frame in samples.chunks_exact(num_channels) {
            for (ch, &s) in frame.iter().enumerate() {
                channels[ch].push(s);
            }
        }
        Self { channels, len }
    }

    /// Number of channels
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if there is no audio to play
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0 || self.channels.is_empty()
    }

    /// Samples of one channel
    #[inline]
    pub fn channel(&self, ch: usize) -> &[Sample] {
        &self.channels[ch]
    }

    /// Mutable samples of one channel
    #[inline]
    pub fn channel_mut(&mut self, ch: usize) -> &mut [Sample] {
        &mut self.channels[ch]
    }

    /// Iterate over all channels
    pub fn channels(&self) -> impl Iterator<Item = &[Sample]> {
        self.channels.iter().map(|c| c.as_slice())
    }

    /// Consume the buffer, returning the per-channel vectors
    pub fn into_channels(self) -> Vec<Vec<Sample>> {
        self.channels
    }

    /// Duration in seconds at the given sample rate (0 for a non-positive rate)
    pub fn duration_seconds(&self, sample_rate: f64) -> f64 {
        if sample_rate > 0.0 {
            self.len as f64 / sample_rate
        } else {
            0.0
        }
    }

    /// Absolute peak across all channels
    pub fn peak(&self) -> Sample {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0, |peak: Sample, s| peak.max(s.abs()))
    }

    /// Multiply every sample by a linear gain
    pub fn apply_gain(&mut self, gain: Sample) {
        for ch in &mut self.channels {
            for s in ch.iter_mut() {
                *s *= gain;
            }
        }
    }

    /// Apply a gain in decibels
    pub fn apply_gain_db(&mut self, db: f64) {
        self.apply_gain(db_to_gain(db) as Sample);
    }

    /// Interleave into frame-ordered samples
    pub fn to_interleaved(&self) -> Vec<Sample> {
        let n = self.num_channels();
        let mut out = Vec::with_capacity(self.len * n);
        for i in 0..self.len {
            for ch in &self.channels {
                out.push(ch[i]);
            }
        }
        out
    }

    /// Copy of the frames in `start..end` (clamped to the buffer)
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.len);
        let start = start.min(end);
        Self {
            channels: self.channels.iter().map(|c| c[start..end].to_vec()).collect(),
            len: end - start,
        }
    }

    /// Drop every frame at or after `len`
    pub fn truncate(&mut self, len: usize) {
        if len < self.len {
            for ch in &mut self.channels {
                ch.truncate(len);
            }
            self.len = len;
        }
    }

    /// Insert `frames` samples of silence at the start of every channel
    pub fn prepend_silence(&mut self, frames: usize) {
        if frames == 0 || self.channels.is_empty() {
            return;
        }
        for ch in &mut self.channels {
            ch.splice(0..0, std::iter::repeat(0.0).take(frames));
        }
        self.len += frames;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_to_gain() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-12);
        assert!((db_to_gain(-6.0) - 0.501187).abs() < 1e-5);
        assert_eq!(db_to_gain(-100.0), 0.0);
        assert_eq!(db_to_gain(-150.0), 0.0);
    }

    #[test]
    fn test_gain_to_db_inverse() {
        let db = gain_to_db(db_to_gain(-12.0));
        assert!((db + 12.0).abs() < 1e-9);
        assert_eq!(gain_to_db(0.0), SILENCE_FLOOR_DB);
    }

    #[test]
    fn test_from_interleaved() {
        let buf = SampleBuffer::from_interleaved(&[0.1, -0.1, 0.2, -0.2, 0.3], 2);
        assert_eq!(buf.num_channels(), 2);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.channel(0), &[0.1, 0.2]);
        assert_eq!(buf.channel(1), &[-0.1, -0.2]);
        assert_eq!(buf.to_interleaved(), vec![0.1, -0.1, 0.2, -0.2]);
    }

    #[test]
    #[should_panic]
    fn test_from_channels_rejects_ragged() {
        SampleBuffer::from_channels(vec![vec![0.0; 3], vec![0.0; 2]]);
    }

    #[test]
    fn test_silence_without_channels_is_empty() {
        let buf = SampleBuffer::silence(0, 100);
        assert!(buf.is_empty());
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn test_peak_and_gain() {
        let mut buf = SampleBuffer::from_channels(vec![vec![0.25, -0.5], vec![0.1, 0.0]]);
        assert_eq!(buf.peak(), 0.5);
        buf.apply_gain(2.0);
        assert_eq!(buf.peak(), 1.0);
        buf.apply_gain_db(-200.0);
        assert_eq!(buf.peak(), 0.0);
    }

    #[test]
    fn test_slice_truncate_prepend() {
        let mut buf = SampleBuffer::from_channels(vec![vec![1.0, 2.0, 3.0, 4.0]]);
        assert_eq!(buf.slice(1, 10).channel(0), &[2.0, 3.0, 4.0]);
        assert!(buf.slice(5, 2).is_empty());

        buf.truncate(3);
        buf.prepend_silence(2);
        assert_eq!(buf.channel(0), &[0.0, 0.0, 1.0, 2.0, 3.0]);
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_duration() {
        let buf = SampleBuffer::silence(2, 22050);
        assert!((buf.duration_seconds(44100.0) - 0.5).abs() < 1e-12);
        assert_eq!(buf.duration_seconds(0.0), 0.0);
    }
}
