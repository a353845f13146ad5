//! Project playback engine
//!
//! Plays the installed [`TimelineSnapshot`] on the virtual timeline: padding
//! silence first, then the buffer from the effective start, wrapping inside the
//! loop window when looping is enabled. When the project and device rates
//! differ the engine steps through the source on a fractional cursor with
//! linear interpolation; otherwise it bulk-copies contiguous runs.
//!
//! # Threading
//!
//! ```text
//! ┌──────────────────┐  play/pause/stop/seek   ┌──────────────────────┐
//! │    UI Thread     │────────────────────────►│                      │
//! └──────────────────┘                         │  Mutex<PlaybackState>│
//! ┌──────────────────┐  timeline_changed()     │   (short sections)   │
//! │ ProjectTimeline  │────────────────────────►│                      │
//! └──────────────────┘  snapshot swap          └──────────▲───────────┘
//!                                                         │ render()
//!                                              ┌──────────┴───────────┐
//!                                              │  Audio Thread        │
//!                                              └──────────────────────┘
//! ```
//!
//! Snapshots are built before the lock is taken and the replaced snapshot is
//! dropped after it is released, so the audio thread never waits on a buffer
//! copy or a deallocation.

use std::sync::Arc;

use parking_lot::Mutex;

use super::resample::{interpolate, ResamplingPolicy};
use super::{AudioCallback, OutputBlock};
use crate::timeline::{ProjectTimeline, TimelineListener, TimelineSnapshot};
use crate::types::TransportState;

/// Everything guarded by the engine lock
#[derive(Debug, Default)]
struct PlaybackState {
    /// Installed project view (None until attached)
    timeline: Option<TimelineSnapshot>,
    transport: TransportState,
    looping: bool,
    /// Integer cursor on the virtual timeline
    current_virtual_sample: usize,
    /// Sub-sample cursor used while resampling
    fractional_position: f64,
    /// 0 while no device is running
    device_sample_rate: f64,
    resampling: ResamplingPolicy,
    /// Cursor in seconds, refreshed after every render for UI polling
    current_position: f64,
}

impl PlaybackState {
    fn stop(&mut self) {
        self.transport = TransportState::Stopped;
        self.current_position = 0.0;
        self.current_virtual_sample = 0;
        self.fractional_position = 0.0;
    }

    fn update_resampling(&mut self) {
        self.resampling = match &self.timeline {
            Some(timeline) if timeline.has_audio() => {
                ResamplingPolicy::for_rates(timeline.sample_rate, self.device_sample_rate)
            }
            _ => ResamplingPolicy::PASS_THROUGH,
        };
    }

    /// Bring the cursor back in line with a changed timeline
    ///
    /// The cursor is a virtual sample, so it is checked against the virtual
    /// length (padding included), not the physical buffer.
    fn revalidate(&mut self) {
        let len = self
            .timeline
            .as_ref()
            .filter(|timeline| timeline.has_audio())
            .map(TimelineSnapshot::virtual_length);
        let Some(len) = len else {
            self.stop();
            return;
        };
        if self.current_virtual_sample >= len {
            self.current_virtual_sample = 0;
        }
        self.fractional_position = self.current_virtual_sample as f64;
    }
}

/// The main project transport
///
/// Shared between the UI and the audio host as an `Arc`; every method takes
/// `&self` and serializes on one internal lock.
#[derive(Debug, Default)]
pub struct PlaybackEngine {
    state: Mutex<PlaybackState>,
}

impl PlaybackEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `timeline` and install its current state
    pub fn attach_to(self: &Arc<Self>, timeline: &mut ProjectTimeline) {
        timeline.subscribe(self);
        self.set_timeline(timeline);
    }

    /// Install a project, stopping playback
    pub fn set_timeline(&self, timeline: &ProjectTimeline) {
        let snapshot = timeline.snapshot();
        let previous = {
            let mut state = self.state.lock();
            let previous = state.timeline.replace(snapshot);
            state.stop();
            state.update_resampling();
            previous
        };
        drop(previous);
    }

    /// Remove the installed project
    pub fn detach(&self) {
        let previous = {
            let mut state = self.state.lock();
            let previous = state.timeline.take();
            state.stop();
            state.update_resampling();
            previous
        };
        drop(previous);
    }

    // ─── Transport ──────────────────────────────────────────────────────────

    pub fn play(&self) {
        self.state.lock().transport = TransportState::Playing;
    }

    /// Stop producing audio, keeping the cursor
    pub fn pause(&self) {
        let mut state = self.state.lock();
        if state.transport == TransportState::Playing {
            state.transport = TransportState::Paused;
        }
    }

    /// Stop and rewind to the start of the virtual timeline
    pub fn stop(&self) {
        self.state.lock().stop();
    }

    /// Seek to `seconds` on the virtual timeline, clamped to its length
    ///
    /// Ignored while no project is installed.
    pub fn set_position(&self, seconds: f64) {
        let mut state = self.state.lock();
        let Some(timeline) = &state.timeline else {
            return;
        };
        let rate = timeline.sample_rate;
        let seconds = seconds.clamp(0.0, timeline.length_seconds());
        let sample = if rate > 0.0 {
            (seconds * rate).round() as usize
        } else {
            0
        };
        state.current_position = seconds;
        state.current_virtual_sample = sample;
        state.fractional_position = sample as f64;
    }

    pub fn set_looping(&self, looping: bool) {
        self.state.lock().looping = looping;
    }

    // ─── Queries ────────────────────────────────────────────────────────────

    pub fn is_looping(&self) -> bool {
        self.state.lock().looping
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().transport == TransportState::Playing
    }

    pub fn transport_state(&self) -> TransportState {
        self.state.lock().transport
    }

    /// Cursor position in seconds
    pub fn position(&self) -> f64 {
        self.state.lock().current_position
    }

    /// Length of the installed virtual timeline in seconds
    pub fn length_seconds(&self) -> f64 {
        self.state
            .lock()
            .timeline
            .as_ref()
            .map_or(0.0, TimelineSnapshot::length_seconds)
    }

    pub fn current_virtual_sample(&self) -> usize {
        self.state.lock().current_virtual_sample
    }

    pub fn fractional_position(&self) -> f64 {
        self.state.lock().fractional_position
    }

    pub fn device_sample_rate(&self) -> f64 {
        self.state.lock().device_sample_rate
    }

    pub fn resampling(&self) -> ResamplingPolicy {
        self.state.lock().resampling
    }
}

impl TimelineListener for PlaybackEngine {
    fn timeline_changed(&self, timeline: &ProjectTimeline) {
        let snapshot = timeline.snapshot();
        let previous = {
            let mut state = self.state.lock();
            let previous = state.timeline.replace(snapshot);
            state.revalidate();
            state.update_resampling();
            previous
        };
        drop(previous);
    }
}

impl AudioCallback for PlaybackEngine {
    fn device_about_to_start(&self, sample_rate: f64) {
        let mut state = self.state.lock();
        state.device_sample_rate = sample_rate.max(0.0);
        state.fractional_position = state.current_virtual_sample as f64;
        state.update_resampling();
        log::info!("Playback engine: device starting at {}Hz", sample_rate);
    }

    fn device_stopped(&self) {
        let mut state = self.state.lock();
        state.device_sample_rate = 0.0;
        state.resampling = ResamplingPolicy::PASS_THROUGH;
        log::info!("Playback engine: device stopped");
    }

    fn render(&self, block: &mut OutputBlock<'_>) {
        if block.is_null() {
            return;
        }
        block.clear();

        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.transport != TransportState::Playing {
            return;
        }
        let Some(timeline) = &state.timeline else {
            return;
        };
        let audio = &timeline.audio;
        let source_rate = timeline.sample_rate;
        if audio.is_empty() || source_rate <= 0.0 || state.device_sample_rate <= 0.0 {
            return;
        }

        state.resampling = ResamplingPolicy::for_rates(source_rate, state.device_sample_rate);

        let padding = timeline.padding;
        let anchor = timeline.effective_start();
        let length = timeline.virtual_length();
        let window = if state.looping {
            timeline.virtual_loop_window()
        } else {
            None
        };
        let looping = window.is_some();
        let (loop_start, boundary) = window.unwrap_or((0, length));

        let frames = block.frames();
        let channels = block.channels().min(audio.num_channels());

        if state.resampling.active {
            let ratio = state.resampling.ratio;
            let last = audio.len() - 1;
            let mut pos = state.fractional_position.max(0.0);

            for i in 0..frames {
                let mut index = pos as usize;
                if index >= boundary {
                    if looping {
                        pos = loop_start as f64;
                        index = loop_start;
                    } else {
                        state.transport = TransportState::Stopped;
                        block.clear_from(i);
                        state.fractional_position = pos;
                        state.current_virtual_sample = index.min(length);
                        state.current_position = state.current_virtual_sample as f64 / source_rate;
                        return;
                    }
                }

                if index >= padding {
                    let buffer_pos = (anchor + index - padding).min(last);
                    let fraction = pos - index as f64;
                    for ch in 0..channels {
                        block.channel_mut(ch)[i] = interpolate(audio.channel(ch), buffer_pos, fraction);
                    }
                }

                pos += ratio;
            }

            state.fractional_position = pos;
            state.current_virtual_sample = (pos as usize).min(length);
            state.current_position = pos / source_rate;
        } else {
            let mut cursor = state.current_virtual_sample;
            let mut written = 0;

            while written < frames {
                if cursor >= boundary {
                    if looping {
                        cursor = loop_start;
                    } else {
                        state.transport = TransportState::Stopped;
                        block.clear_from(written);
                        break;
                    }
                }

                let run = (frames - written).min(boundary - cursor);

                if cursor < padding {
                    let n = run.min(padding - cursor);
                    for ch in 0..channels {
                        block.channel_mut(ch)[written..written + n].fill(0.0);
                    }
                    cursor += n;
                    written += n;
                } else {
                    let buffer_pos = anchor + cursor - padding;
                    let n = run.min(audio.len() - buffer_pos);
                    for ch in 0..channels {
                        block.channel_mut(ch)[written..written + n]
                            .copy_from_slice(&audio.channel(ch)[buffer_pos..buffer_pos + n]);
                    }
                    cursor += n;
                    written += n;
                }
            }

            state.current_virtual_sample = cursor;
            state.fractional_position = cursor as f64;
            state.current_position = cursor as f64 / source_rate;
        }
    }
}
