//! Base output latency of a device.
//!
//! The total is the device latency, one IO buffer and the HAL's safety
//! offset, all in frames on the output scope. A property that cannot be read
//! contributes nothing.

use crate::hw::{AudioHardware, DeviceId, LatencyProperty};

pub fn frames_to_us(frames: u64, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    frames * 1_000_000 / sample_rate as u64
}

/// Sum of the latency properties of `device`, in frames.
pub fn query_latency_frames<H: AudioHardware + ?Sized>(hw: &H, device: DeviceId) -> u64 {
    let mut frames: u64 = 0;
    for property in LatencyProperty::ALL {
        match hw.latency_property(device, property) {
            Ok(value) => {
                frames += value as u64;
                tracing::debug!("latency {}: {value}", property.fourcc());
            }
            Err(e) => tracing::warn!("cannot get device latency {}: {e}", property.fourcc()),
        }
    }
    frames
}

/// Base latency of `device` at `sample_rate`, in microseconds.
pub fn query_base_latency_us<H: AudioHardware + ?Sized>(
    hw: &H,
    device: DeviceId,
    sample_rate: u32,
) -> u64 {
    let frames = query_latency_frames(hw, device);
    let us = frames_to_us(frames, sample_rate);
    tracing::debug!("base latency: {us} microseconds");
    us
}

#[cfg(test)]
mod tests {
    use super::frames_to_us;

    #[test]
    fn converts_frames_at_rate() {
        assert_eq!(frames_to_us(48_000, 48_000), 1_000_000);
        assert_eq!(frames_to_us(512, 48_000), 10_666);
        assert_eq!(frames_to_us(1024, 0), 0);
    }
}
