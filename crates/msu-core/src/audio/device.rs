//! Output device lookup
//!
//! Searches every available cpal host (JACK, ALSA, PulseAudio, WASAPI, ...)
//! so a device name from the config resolves regardless of which host owns it.

use cpal::traits::{DeviceTrait, HostTrait};

use super::error::{AudioError, AudioResult};

/// Find an output device by name on any host
pub fn find_device_by_name(name: &str) -> AudioResult<cpal::Device> {
    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };
        let Ok(mut devices) = host.output_devices() else {
            continue;
        };
        if let Some(device) = devices.find(|d: &cpal::Device| d.name().ok().as_deref() == Some(name)) {
            log::debug!("Found device {:?} on host {:?}", name, host_id);
            return Ok(device);
        }
    }

    Err(AudioError::DeviceNotFound(name.to_string()))
}

/// Get the default output device of the default host
pub fn default_output_device() -> AudioResult<cpal::Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| AudioError::NoDefaultDevice("No default output device".to_string()))
}

/// Names of every output device on every host
pub fn output_device_names() -> Vec<String> {
    let mut names = Vec::new();
    for host_id in cpal::available_hosts() {
        let Ok(host) = cpal::host_from_id(host_id) else {
            continue;
        };
        let Ok(devices) = host.output_devices() else {
            continue;
        };
        names.extend(devices.filter_map(|d: cpal::Device| d.name().ok()));
    }
    names.sort();
    names.dedup();
    names
}
