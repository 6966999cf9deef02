//! Synchronous physical format changes.
//!
//! The HAL applies a physical format change asynchronously; callers here block
//! until the stream reports the requested layout or the timeout passes.

use crate::error::{Error, Result};
use crate::format::PhysicalFormat;
use crate::hw::options::DriverOptions;
use crate::hw::{AudioHardware, StreamId};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchTiming {
    pub timeout: Duration,
    pub poll: Duration,
}

impl SwitchTiming {
    pub fn from_options(options: &DriverOptions) -> Self {
        Self {
            timeout: options.format_switch_timeout(),
            poll: options.format_switch_poll(),
        }
    }
}

impl Default for SwitchTiming {
    fn default() -> Self {
        Self::from_options(&DriverOptions::default())
    }
}

/// Ask the stream to change its physical format without waiting.
pub fn request_format<H: AudioHardware + ?Sized>(
    hw: &H,
    stream: StreamId,
    target: &PhysicalFormat,
) -> Result<()> {
    tracing::debug!("setting {stream} physical format to {target}");
    hw.set_physical_format(stream, target)
}

/// Block until `stream` reports `target` as its physical format.
pub fn await_format<H: AudioHardware + ?Sized>(
    hw: &H,
    stream: StreamId,
    target: &PhysicalFormat,
    timing: SwitchTiming,
) -> Result<()> {
    let deadline = Instant::now() + timing.timeout;
    loop {
        match hw.physical_format(stream) {
            Ok(current) if current.same_layout(target) => {
                tracing::debug!("{stream} switched to {current}");
                return Ok(());
            }
            Ok(current) => tracing::debug!("{stream} still at {current}"),
            Err(e) => tracing::debug!("could not read {stream} physical format: {e}"),
        }
        if Instant::now() >= deadline {
            return Err(Error::FormatSwitchTimeout(*target));
        }
        thread::sleep(timing.poll);
    }
}

/// Switch `stream` to `target` and wait for the hardware to confirm it.
pub fn apply_format<H: AudioHardware + ?Sized>(
    hw: &H,
    stream: StreamId,
    target: &PhysicalFormat,
    timing: SwitchTiming,
) -> Result<()> {
    if let Ok(current) = hw.physical_format(stream) {
        if current.same_layout(target) {
            tracing::debug!("{stream} already at {target}");
            return Ok(());
        }
    }
    request_format(hw, stream, target)?;
    await_format(hw, stream, target, timing)
}

/// Put the format captured before the switch back on the stream.
pub fn restore_format<H: AudioHardware + ?Sized>(
    hw: &H,
    stream: StreamId,
    original: &PhysicalFormat,
    timing: SwitchTiming,
) -> Result<()> {
    apply_format(hw, stream, original, timing)
}
