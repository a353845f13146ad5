//! Output block passed to the render callback

use crate::types::Sample;

/// Planar view of one output period
///
/// Channel `ch` occupies `data[ch * frames .. (ch + 1) * frames]`. The block
/// borrows memory owned by the host, so rendering never allocates.
pub struct OutputBlock<'a> {
    data: &'a mut [Sample],
    channels: usize,
    frames: usize,
}

impl<'a> OutputBlock<'a> {
    /// Wrap planar storage
    ///
    /// `frames` is derived from the slice length; any tail that does not fill a
    /// whole channel is left untouched.
    pub fn new(data: &'a mut [Sample], channels: usize) -> Self {
        let frames = if channels == 0 { 0 } else { data.len() / channels };
        Self {
            data,
            channels,
            frames,
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// True if there is nowhere to write
    #[inline]
    pub fn is_null(&self) -> bool {
        self.channels == 0 || self.frames == 0
    }

    #[inline]
    pub fn channel(&self, ch: usize) -> &[Sample] {
        &self.data[ch * self.frames..(ch + 1) * self.frames]
    }

    #[inline]
    pub fn channel_mut(&mut self, ch: usize) -> &mut [Sample] {
        &mut self.data[ch * self.frames..(ch + 1) * self.frames]
    }

    /// Silence the whole block
    pub fn clear(&mut self) {
        let used = self.channels * self.frames;
        self.data[..used].fill(0.0);
    }

    /// Silence every channel from `frame` to the end
    pub fn clear_from(&mut self, frame: usize) {
        if frame >= self.frames {
            return;
        }
        for ch in 0..self.channels {
            self.channel_mut(ch)[frame..].fill(0.0);
        }
    }
}
