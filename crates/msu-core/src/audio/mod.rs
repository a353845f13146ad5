//! Audio output host
//!
//! [`OutputMixer`] sums any set of engines into an interleaved device buffer
//! and needs no device. With the `device-output` feature, [`start_output`]
//! opens a cpal stream that drives a mixer from the audio thread.
//!
//! # Example
//!
//! ```ignore
//! use msu_core::audio::start_output;
//! use msu_core::config::OutputConfig;
//!
//! let playback = Arc::new(PlaybackEngine::new());
//! let preview = Arc::new(PreviewEngine::new());
//! let handle = start_output(vec![playback.clone(), preview.clone()], &OutputConfig::default())?;
//! // audio runs until `handle` is dropped
//! ```

mod error;
mod mixer;

#[cfg(feature = "device-output")]
mod cpal_backend;
#[cfg(feature = "device-output")]
mod device;

pub use error::{AudioError, AudioResult};
pub use mixer::{OutputMixer, MAX_BUFFER_SIZE};

#[cfg(feature = "device-output")]
pub use cpal_backend::{start_output, OutputHandle, DEFAULT_BUFFER_SIZE};
#[cfg(feature = "device-output")]
pub use device::{default_output_device, find_device_by_name, output_device_names};
