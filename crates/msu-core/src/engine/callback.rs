//! Device-facing callback interface shared by all engines

use super::OutputBlock;

/// Something the audio host can drive
///
/// The host calls `device_about_to_start` before the first `render`, then
/// `render` once per period from the real-time thread, then `device_stopped`.
/// Implementations must not allocate, block on I/O, or panic inside `render`;
/// any condition they cannot handle resolves to silence.
pub trait AudioCallback: Send + Sync {
    /// The device is about to start at `sample_rate`
    fn device_about_to_start(&self, sample_rate: f64);

    /// The device has stopped; no sample rate is known until the next start
    fn device_stopped(&self);

    /// Fill `block` with the next period of audio
    fn render(&self, block: &mut OutputBlock<'_>);
}
