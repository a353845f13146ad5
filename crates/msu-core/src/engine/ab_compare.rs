//! Instant before/after comparison player
//!
//! Holds two in-memory buffers (typically the audio before and after a
//! normalization pass) and plays one of them. Switching target while playing
//! keeps the cursor, so both versions can be compared at the same point.

use std::sync::Arc;

use parking_lot::Mutex;

use super::resample::{interpolate, ResamplingPolicy};
use super::{AudioCallback, OutputBlock};
use crate::types::{SampleBuffer, DEFAULT_SAMPLE_RATE};

/// Which buffer is audible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompareTarget {
    #[default]
    Before,
    After,
}

#[derive(Debug)]
struct CompareState {
    before: Option<Arc<SampleBuffer>>,
    after: Option<Arc<SampleBuffer>>,
    target: CompareTarget,
    source_sample_rate: f64,
    device_sample_rate: f64,
    increment: f64,
    position: f64,
    playing: bool,
}

impl Default for CompareState {
    fn default() -> Self {
        Self {
            before: None,
            after: None,
            target: CompareTarget::Before,
            source_sample_rate: DEFAULT_SAMPLE_RATE,
            device_sample_rate: DEFAULT_SAMPLE_RATE,
            increment: 1.0,
            position: 0.0,
            playing: false,
        }
    }
}

impl CompareState {
    fn buffer_for(&self, target: CompareTarget) -> Option<&Arc<SampleBuffer>> {
        match target {
            CompareTarget::Before => self.before.as_ref(),
            CompareTarget::After => self.after.as_ref(),
        }
        .filter(|b| !b.is_empty())
    }

    fn update_increment(&mut self) {
        self.increment =
            ResamplingPolicy::for_rates(self.source_sample_rate, self.device_sample_rate).ratio;
    }
}

/// Two-buffer A/B player
///
/// The engine keeps shared handles to the buffers it was given; the caller can
/// drop its own handles at any time without affecting a running render.
#[derive(Debug, Default)]
pub struct ABCompareEngine {
    state: Mutex<CompareState>,
}

impl ABCompareEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install new buffers, stopping playback
    ///
    /// A non-positive `sample_rate` falls back to 44.1kHz.
    pub fn set_source_buffers(
        &self,
        before: Option<Arc<SampleBuffer>>,
        after: Option<Arc<SampleBuffer>>,
        sample_rate: f64,
    ) {
        let previous = {
            let mut state = self.state.lock();
            let previous = (
                std::mem::replace(&mut state.before, before),
                std::mem::replace(&mut state.after, after),
            );
            state.source_sample_rate = if sample_rate > 0.0 {
                sample_rate
            } else {
                DEFAULT_SAMPLE_RATE
            };
            state.position = 0.0;
            state.playing = false;
            state.update_increment();
            previous
        };
        drop(previous);
    }

    /// Play `target`
    ///
    /// While already playing and `restart` is false this only switches the
    /// audible buffer, keeping the cursor (clamped to the new buffer). Does
    /// nothing if `target` has no content.
    pub fn play(&self, target: CompareTarget, restart: bool) {
        let mut state = self.state.lock();
        let Some(len) = state.buffer_for(target).map(|b| b.len()) else {
            return;
        };

        state.target = target;
        if state.playing && !restart {
            state.position = state.position.clamp(0.0, len as f64);
            return;
        }
        state.position = 0.0;
        state.playing = true;
    }

    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.playing = false;
        state.position = 0.0;
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    pub fn active_target(&self) -> CompareTarget {
        self.state.lock().target
    }

    pub fn has_content(&self, target: CompareTarget) -> bool {
        self.state.lock().buffer_for(target).is_some()
    }

    /// `(current, total)` seconds of the active buffer, or None when idle
    pub fn playback_progress(&self) -> Option<(f64, f64)> {
        let state = self.state.lock();
        if !state.playing || state.source_sample_rate <= 0.0 {
            return None;
        }
        let buffer = state.buffer_for(state.target)?;
        let total = buffer.len() as f64 / state.source_sample_rate;
        let current = state.position / state.source_sample_rate;
        (total > 0.0).then_some((current, total))
    }
}

impl AudioCallback for ABCompareEngine {
    fn device_about_to_start(&self, sample_rate: f64) {
        let mut state = self.state.lock();
        state.device_sample_rate = if sample_rate > 0.0 {
            sample_rate
        } else {
            DEFAULT_SAMPLE_RATE
        };
        state.update_increment();
    }

    fn device_stopped(&self) {
        let mut state = self.state.lock();
        state.device_sample_rate = DEFAULT_SAMPLE_RATE;
        state.update_increment();
    }

    fn render(&self, block: &mut OutputBlock<'_>) {
        if block.is_null() {
            return;
        }
        block.clear();

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let active = match state.target {
            CompareTarget::Before => &state.before,
            CompareTarget::After => &state.after,
        };
        let Some(buffer) = active.as_deref().filter(|b| state.playing && !b.is_empty()) else {
            state.playing = false;
            return;
        };

        let len = buffer.len();
        let source_channels = buffer.num_channels();
        let increment = state.increment;
        let mut position = state.position;

        for i in 0..block.frames() {
            let index = position as usize;
            if index >= len {
                state.playing = false;
                block.clear_from(i);
                break;
            }
            let fraction = position - index as f64;
            for ch in 0..block.channels() {
                block.channel_mut(ch)[i] =
                    interpolate(buffer.channel(ch % source_channels), index, fraction);
            }
            position += increment;
        }

        state.position = if state.playing { position } else { 0.0 };
    }
}
