//! Real-time playback engines
//!
//! This module contains the players driven by the audio callback:
//! - PlaybackEngine: project transport with trim, padding and loop window
//! - PreviewEngine: standalone file audition
//! - ABCompareEngine: instant before/after comparison
//!
//! All three implement [`AudioCallback`] and share the linear-interpolation
//! resampling arithmetic in [`resample`].

mod ab_compare;
mod block;
mod callback;
mod playback;
mod preview;
pub mod resample;

pub use ab_compare::*;
pub use block::*;
pub use callback::*;
pub use playback::*;
pub use preview::*;
pub use resample::ResamplingPolicy;
