//! Sums any number of engines into one interleaved device buffer

use std::sync::Arc;

use crate::engine::{AudioCallback, OutputBlock};
use crate::types::Sample;

/// Maximum frames rendered per engine call; longer device periods are split
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Drives a set of [`AudioCallback`]s for one output stream
///
/// Owns a planar scratch block sized once for `channels * MAX_BUFFER_SIZE`
/// frames, so processing never allocates.
pub struct OutputMixer {
    callbacks: Vec<Arc<dyn AudioCallback>>,
    channels: usize,
    scratch: Vec<Sample>,
}

impl OutputMixer {
    pub fn new(callbacks: Vec<Arc<dyn AudioCallback>>, channels: usize) -> Self {
        Self {
            callbacks,
            channels,
            scratch: vec![0.0; channels * MAX_BUFFER_SIZE],
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn callbacks(&self) -> &[Arc<dyn AudioCallback>] {
        &self.callbacks
    }

    pub fn device_about_to_start(&self, sample_rate: f64) {
        for callback in &self.callbacks {
            callback.device_about_to_start(sample_rate);
        }
    }

    pub fn device_stopped(&self) {
        for callback in &self.callbacks {
            callback.device_stopped();
        }
    }

    /// Render every callback and sum into `data` (frame-interleaved)
    ///
    /// A trailing partial frame is zeroed.
    pub fn process_interleaved(&mut self, data: &mut [Sample]) {
        data.fill(0.0);
        let channels = self.channels;
        if channels == 0 {
            return;
        }

        let total_frames = data.len() / channels;
        let mut offset = 0;
        while offset < total_frames {
            let frames = (total_frames - offset).min(MAX_BUFFER_SIZE);
            let out = &mut data[offset * channels..(offset + frames) * channels];

            for callback in &self.callbacks {
                let mut block = OutputBlock::new(&mut self.scratch[..frames * channels], channels);
                callback.render(&mut block);
                for ch in 0..channels {
                    for (frame, &sample) in block.channel(ch).iter().enumerate() {
                        out[frame * channels + ch] += sample;
                    }
                }
            }

            offset += frames;
        }
    }
}
