//! Project timeline: audio, trim, padding and loop window
//!
//! The timeline owns the project's audio and the parameters that shape how it
//! is played and exported. Players walk a *virtual* timeline that starts at 0
//! at the beginning of the padding region; the functions in this module map
//! that onto *physical* indices into the stored buffer.
//!
//! ```text
//!   virtual:  0 ........ padding ........................ virtual_length
//!             |  silence  |  buffer[effective_start ..]   |
//! ```
//!
//! Every mutation bumps [`ProjectTimeline::generation`] and notifies the
//! registered [`TimelineListener`]s.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use crate::types::{db_to_gain, SampleBuffer, DEFAULT_SAMPLE_RATE};

/// Default pad amount used by auto trim/pad
pub const DEFAULT_PAD_AMOUNT_MS: u32 = 200;

/// Allowed pad amount range in milliseconds
pub const PAD_AMOUNT_RANGE_MS: (u32, u32) = (10, 5000);

/// Default loudness target for normalization
pub const DEFAULT_TARGET_RMS_DB: f32 = -12.0;

/// Default threshold for "first audible sample" detection
pub const DEFAULT_SILENCE_THRESHOLD_DB: f64 = -60.0;

// ═══════════════════════════════════════════════════════════════════════════
// Virtual / physical mapping
// ═══════════════════════════════════════════════════════════════════════════

/// Physical index that anchors virtual sample 0 of the audible content
///
/// With padding the anchor moves back by the padding amount (not below 0).
#[inline]
pub fn effective_playback_start(trim_start: usize, padding: usize) -> usize {
    if padding > 0 {
        trim_start.saturating_sub(padding)
    } else {
        trim_start
    }
}

/// Number of samples on the virtual timeline
///
/// Physical samples from the effective start to the end of the buffer, plus the
/// prepended padding.
#[inline]
pub fn virtual_length(trim_start: usize, padding: usize, buffer_len: usize) -> usize {
    buffer_len.saturating_sub(effective_playback_start(trim_start, padding)) + padding
}

/// Map a virtual sample to a physical buffer index
///
/// Returns `None` inside the padding region and past the end of the buffer.
#[inline]
pub fn map_virtual_to_physical(
    virtual_sample: usize,
    trim_start: usize,
    padding: usize,
    buffer_len: usize,
) -> Option<usize> {
    if virtual_sample < padding {
        return None;
    }
    let physical = effective_playback_start(trim_start, padding) + (virtual_sample - padding);
    (physical < buffer_len).then_some(physical)
}

/// First frame whose level on any channel exceeds `threshold_db`
///
/// Returns 0 if the buffer never crosses the threshold.
pub fn detect_first_audio_sample(buffer: &SampleBuffer, threshold_db: f64) -> usize {
    let threshold = db_to_gain(threshold_db) as f32;
    (0..buffer.len())
        .find(|&i| buffer.channels().any(|ch| ch[i].abs() > threshold))
        .unwrap_or(0)
}

// ═══════════════════════════════════════════════════════════════════════════
// Snapshot
// ═══════════════════════════════════════════════════════════════════════════

/// Immutable view of the timeline handed to the playback engine
///
/// Cloning is cheap: the audio is shared and the rest is plain data.
#[derive(Debug, Clone)]
pub struct TimelineSnapshot {
    pub audio: Arc<SampleBuffer>,
    pub sample_rate: f64,
    pub trim_start: usize,
    pub padding: usize,
    pub loop_start: Option<usize>,
    pub loop_end: Option<usize>,
}

impl Default for TimelineSnapshot {
    fn default() -> Self {
        Self {
            audio: Arc::new(SampleBuffer::new()),
            sample_rate: DEFAULT_SAMPLE_RATE,
            trim_start: 0,
            padding: 0,
            loop_start: None,
            loop_end: None,
        }
    }
}

impl TimelineSnapshot {
    /// Snapshot of a bare buffer with no trim, padding or loop
    pub fn from_buffer(audio: Arc<SampleBuffer>, sample_rate: f64) -> Self {
        Self {
            audio,
            sample_rate,
            ..Self::default()
        }
    }

    #[inline]
    pub fn has_audio(&self) -> bool {
        !self.audio.is_empty()
    }

    #[inline]
    pub fn effective_start(&self) -> usize {
        effective_playback_start(self.trim_start, self.padding)
    }

    #[inline]
    pub fn virtual_length(&self) -> usize {
        if self.has_audio() {
            virtual_length(self.trim_start, self.padding, self.audio.len())
        } else {
            0
        }
    }

    /// Both loop points set and in order
    #[inline]
    pub fn has_loop_points(&self) -> bool {
        matches!((self.loop_start, self.loop_end), (Some(s), Some(e)) if e > s)
    }

    /// Loop window translated onto the virtual timeline
    ///
    /// Both ends are shifted by the effective start and clamped into the
    /// virtual length. Returns `None` if the translated window is empty.
    pub fn virtual_loop_window(&self) -> Option<(usize, usize)> {
        let (start, end) = match (self.loop_start, self.loop_end) {
            (Some(s), Some(e)) if e > s => (s, e),
            _ => return None,
        };
        let anchor = self.effective_start();
        let length = self.virtual_length();
        let start = start.saturating_sub(anchor).min(length);
        let end = end.saturating_sub(anchor).min(length);
        (end > start).then_some((start, end))
    }

    #[inline]
    pub fn map_virtual_to_physical(&self, virtual_sample: usize) -> Option<usize> {
        map_virtual_to_physical(virtual_sample, self.trim_start, self.padding, self.audio.len())
    }

    /// Length of the virtual timeline in seconds
    pub fn length_seconds(&self) -> f64 {
        if self.sample_rate > 0.0 {
            self.virtual_length() as f64 / self.sample_rate
        } else {
            0.0
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Timeline
// ═══════════════════════════════════════════════════════════════════════════

/// Receives a callback after every timeline mutation
///
/// Called on the thread that mutated the timeline. Implementations should do
/// their own locking; the timeline holds no lock while notifying.
pub trait TimelineListener: Send + Sync {
    fn timeline_changed(&self, timeline: &ProjectTimeline);
}

/// The project's audio plus its trim, padding and loop parameters
///
/// All setters clamp out-of-range input instead of rejecting it; dragging a
/// marker past the end of the waveform is a normal UI interaction.
pub struct ProjectTimeline {
    audio: Arc<SampleBuffer>,
    sample_rate: f64,
    trim_start: usize,
    padding: usize,
    loop_start: Option<usize>,
    loop_end: Option<usize>,
    pad_amount_ms: u32,
    target_rms_db: f32,
    normalization_gain_db: f32,
    source_file: Option<PathBuf>,
    target_export_file: Option<PathBuf>,
    modified: bool,
    generation: u64,
    listeners: Vec<Weak<dyn TimelineListener>>,
}

impl Default for ProjectTimeline {
    fn default() -> Self {
        Self {
            audio: Arc::new(SampleBuffer::new()),
            sample_rate: DEFAULT_SAMPLE_RATE,
            trim_start: 0,
            padding: 0,
            loop_start: None,
            loop_end: None,
            pad_amount_ms: DEFAULT_PAD_AMOUNT_MS,
            target_rms_db: DEFAULT_TARGET_RMS_DB,
            normalization_gain_db: 0.0,
            source_file: None,
            target_export_file: None,
            modified: false,
            generation: 0,
            listeners: Vec::new(),
        }
    }
}

impl std::fmt::Debug for ProjectTimeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectTimeline")
            .field("samples", &self.audio.len())
            .field("channels", &self.audio.num_channels())
            .field("sample_rate", &self.sample_rate)
            .field("trim_start", &self.trim_start)
            .field("padding", &self.padding)
            .field("loop_start", &self.loop_start)
            .field("loop_end", &self.loop_end)
            .field("generation", &self.generation)
            .finish()
    }
}

impl ProjectTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    ///
    /// Only a weak reference is kept; dropping the listener unsubscribes it.
    pub fn subscribe<L: TimelineListener + 'static>(&mut self, listener: &Arc<L>) {
        let weak: Weak<dyn TimelineListener> = Arc::downgrade(listener) as Weak<dyn TimelineListener>;
        self.listeners.push(weak);
    }

    /// Monotonic counter bumped on every mutation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn notify(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.listeners.retain(|l| l.strong_count() > 0);
        for listener in self.listeners.iter().filter_map(Weak::upgrade) {
            listener.timeline_changed(self);
        }
    }

    // ─── Audio ──────────────────────────────────────────────────────────────

    /// Replace the project audio wholesale
    pub fn set_audio_buffer(&mut self, buffer: SampleBuffer, sample_rate: f64) {
        self.set_shared_audio(Arc::new(buffer), sample_rate);
    }

    /// Replace the project audio with an already shared buffer
    pub fn set_shared_audio(&mut self, buffer: Arc<SampleBuffer>, sample_rate: f64) {
        log::debug!(
            "timeline: new audio, {} channels x {} samples @ {}Hz",
            buffer.num_channels(),
            buffer.len(),
            sample_rate
        );
        self.audio = buffer;
        self.sample_rate = sample_rate;
        self.modified = true;
        self.notify();
    }

    pub fn audio(&self) -> &Arc<SampleBuffer> {
        &self.audio
    }

    pub fn has_audio(&self) -> bool {
        !self.audio.is_empty()
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Length of the stored audio in seconds
    pub fn length_seconds(&self) -> f64 {
        if self.sample_rate <= 0.0 {
            return 0.0;
        }
        self.audio.len() as f64 / self.sample_rate
    }

    // ─── Loop points ────────────────────────────────────────────────────────

    /// Set the loop start, clamped into `[0, len - 1]`
    ///
    /// Pushes the loop end past the new start if they would cross.
    pub fn set_loop_start(&mut self, sample: i64) {
        let len = self.audio.len();
        let max = len.saturating_sub(1) as i64;
        let start = sample.clamp(0, max) as usize;
        self.loop_start = Some(start);
        if let Some(end) = self.loop_end {
            if end <= start {
                self.loop_end = Some((start + 1).min(len));
            }
        }
        self.modified = true;
        self.notify();
    }

    /// Set the loop end, clamped into `[0, len]`
    ///
    /// Pulls the loop start before the new end if they would cross.
    pub fn set_loop_end(&mut self, sample: i64) {
        let len = self.audio.len() as i64;
        let end = sample.clamp(0, len) as usize;
        self.loop_end = Some(end);
        if let Some(start) = self.loop_start {
            if start >= end {
                self.loop_start = Some(end.saturating_sub(1));
            }
        }
        self.modified = true;
        self.notify();
    }

    /// Unset both loop points
    pub fn clear_loop_points(&mut self) {
        self.loop_start = None;
        self.loop_end = None;
        self.modified = true;
        self.notify();
    }

    pub fn loop_start(&self) -> Option<usize> {
        self.loop_start
    }

    pub fn loop_end(&self) -> Option<usize> {
        self.loop_end
    }

    pub fn has_loop_points(&self) -> bool {
        matches!((self.loop_start, self.loop_end), (Some(s), Some(e)) if e > s)
    }

    // ─── Trim / padding ─────────────────────────────────────────────────────

    /// Set the trim start, clamped into `[0, len]`
    pub fn set_trim_start(&mut self, sample: i64) {
        self.trim_start = sample.clamp(0, self.audio.len() as i64) as usize;
        self.modified = true;
        self.notify();
    }

    pub fn trim_start(&self) -> usize {
        self.trim_start
    }

    /// Set the virtual silence prepended before the content (negative clamps to 0)
    pub fn set_padding_samples(&mut self, samples: i64) {
        self.padding = samples.max(0) as usize;
        self.notify();
    }

    pub fn padding_samples(&self) -> usize {
        self.padding
    }

    pub fn has_padding(&self) -> bool {
        self.padding > 0
    }

    /// Set the pad amount used by auto trim/pad, clamped into 10..=5000 ms
    ///
    /// Does not touch the applied padding. Only notifies if the value changed.
    pub fn set_pad_amount_ms(&mut self, ms: i64) {
        let (lo, hi) = PAD_AMOUNT_RANGE_MS;
        let clamped = ms.clamp(lo as i64, hi as i64) as u32;
        if clamped == self.pad_amount_ms {
            return;
        }
        self.pad_amount_ms = clamped;
        self.notify();
    }

    pub fn pad_amount_ms(&self) -> u32 {
        self.pad_amount_ms
    }

    /// Physical anchor of virtual sample 0
    pub fn effective_playback_start(&self) -> usize {
        effective_playback_start(self.trim_start, self.padding)
    }

    /// Trim to the first audible sample and pad up to the configured pad amount
    ///
    /// If the file already has enough lead-in silence it is trimmed down to
    /// exactly the pad amount; otherwise the missing part becomes padding.
    pub fn apply_auto_trim_pad(&mut self, threshold_db: f64) {
        if !self.has_audio() {
            return;
        }
        let first = detect_first_audio_sample(&self.audio, threshold_db);
        let pad = ((self.pad_amount_ms as f64 / 1000.0) * self.sample_rate).max(0.0) as usize;

        let (trim, padding) = if pad == 0 {
            (first, 0)
        } else if first >= pad {
            (first - pad, 0)
        } else {
            (0, pad - first)
        };
        log::debug!(
            "timeline: auto trim/pad, first audio at {}, trim {} pad {}",
            first,
            trim,
            padding
        );
        self.set_trim_start(trim as i64);
        self.set_padding_samples(padding as i64);
    }

    /// Trim to the first audible sample with no padding
    pub fn apply_trim_no_pad(&mut self, threshold_db: f64) {
        if !self.has_audio() {
            return;
        }
        let first = detect_first_audio_sample(&self.audio, threshold_db);
        self.set_trim_start(first as i64);
        self.set_padding_samples(0);
    }

    pub fn reset_trim_and_padding(&mut self) {
        self.set_trim_start(0);
        self.set_padding_samples(0);
    }

    // ─── Loudness ───────────────────────────────────────────────────────────

    pub fn set_target_rms_db(&mut self, db: f32) {
        self.target_rms_db = db;
        self.notify();
    }

    pub fn target_rms_db(&self) -> f32 {
        self.target_rms_db
    }

    /// Gain applied on export
    pub fn set_normalization_gain_db(&mut self, db: f32) {
        self.normalization_gain_db = db;
        self.notify();
    }

    pub fn normalization_gain_db(&self) -> f32 {
        self.normalization_gain_db
    }

    // ─── Files ──────────────────────────────────────────────────────────────

    pub fn set_source_file(&mut self, path: Option<PathBuf>) {
        self.source_file = path;
        self.notify();
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    pub fn set_target_export_file(&mut self, path: Option<PathBuf>) {
        self.target_export_file = path;
        self.notify();
    }

    pub fn target_export_file(&self) -> Option<&Path> {
        self.target_export_file.as_deref()
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
        self.notify();
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────────

    /// Restore every field to its default; listeners stay registered
    pub fn reset(&mut self) {
        let listeners = std::mem::take(&mut self.listeners);
        let generation = self.generation;
        *self = Self {
            listeners,
            generation,
            ..Self::default()
        };
        self.notify();
    }

    /// Immutable copy of everything the playback engine needs
    pub fn snapshot(&self) -> TimelineSnapshot {
        TimelineSnapshot {
            audio: Arc::clone(&self.audio),
            sample_rate: self.sample_rate,
            trim_start: self.trim_start,
            padding: self.padding,
            loop_start: self.loop_start,
            loop_end: self.loop_end,
        }
    }
}
