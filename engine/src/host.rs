//! Interfaces the driver consumes from, and exposes to, the player hosting it.

use crate::error::Result;
use crate::format::{PhysicalFormat, SampleFormat};
use crate::hw::{DeviceId, DeviceInfo};
use std::sync::Arc;
use std::time::Instant;

/// Negotiated output parameters shared with the host.
///
/// The host fills in what it would like; `AudioDriver::init` overwrites the
/// fields with what the hardware actually runs at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputParams {
    /// Device name or UID; `None` selects the default output device.
    pub device: Option<String>,
    pub format: SampleFormat,
    pub sample_rate: u32,
    pub channels: u32,
}

impl OutputParams {
    pub fn new(format: SampleFormat, sample_rate: u32, channels: u32) -> Self {
        Self {
            device: None,
            format,
            sample_rate,
            channels,
        }
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Bytes per interleaved frame.
    pub fn frame_stride(&self) -> usize {
        (self.format.bytes_per_sample() * self.channels) as usize
    }
}

/// Source of decoded audio, pulled from the device clock thread.
pub trait AudioSource: Send + Sync {
    /// Fill `out` with exactly `frames` frames. Data that cannot be delivered
    /// by `deadline_us` should be rendered as silence.
    fn pull(&self, out: &mut [u8], frames: usize, deadline_us: i64);
}

/// Receives the one-shot request to tear the driver down and bring it back up.
pub trait ReloadSink: Send + Sync {
    fn request_reload(&self);
}

/// Reconciles the host's channel layout with the device.
pub trait ChannelMapper: Send + Sync {
    fn init_channel_map(
        &self,
        device: DeviceId,
        hardware: &PhysicalFormat,
        params: &mut OutputParams,
    ) -> std::result::Result<(), String>;
}

/// Adopts whatever channel count the hardware stream runs with.
#[derive(Debug, Default, Clone, Copy)]
pub struct HardwareLayout;

impl ChannelMapper for HardwareLayout {
    fn init_channel_map(
        &self,
        _device: DeviceId,
        hardware: &PhysicalFormat,
        params: &mut OutputParams,
    ) -> std::result::Result<(), String> {
        if hardware.channels_per_frame == 0 {
            return Err("hardware stream reports no channels".to_string());
        }
        params.channels = hardware.channels_per_frame;
        Ok(())
    }
}

pub trait Clock: Send + Sync {
    /// Monotonic presentation time in microseconds.
    fn now_us(&self) -> i64;

    /// Current host time in nanoseconds, on the same timeline the device
    /// clock stamps its callbacks with.
    fn host_time_ns(&self) -> u64;
}

/// `Instant`-based clock for backends without their own host time.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_us(&self) -> i64 {
        self.origin.elapsed().as_micros() as i64
    }

    fn host_time_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// Everything the driver borrows from its host.
#[derive(Clone)]
pub struct Host {
    pub source: Arc<dyn AudioSource>,
    pub reload: Arc<dyn ReloadSink>,
    pub channel_map: Arc<dyn ChannelMapper>,
    pub clock: Arc<dyn Clock>,
}

/// Entry points a driver registry dispatches to.
///
/// The real-time `render` entry point is not part of this trait: it is
/// registered with the device clock during `init` and invoked from there.
pub trait AudioDriver: Send {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Acquire and configure the device. On failure every step that
    /// succeeded has been undone before this returns.
    fn init(&mut self, params: &mut OutputParams) -> Result<()>;

    /// Release everything `init` acquired. Never fails; problems are logged.
    fn uninit(&mut self);

    fn pause(&mut self);

    fn resume(&mut self);

    fn list_devices(&self) -> Result<Vec<DeviceInfo>>;
}
