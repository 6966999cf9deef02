#![cfg(target_os = "macos")]

use crate::host::Clock;
use coreaudio_sys::{AudioConvertHostTimeToNanos, AudioGetCurrentHostTime};

/// Returns the current host time in nanoseconds relative to an arbitrary epoch.
fn host_time_nanos() -> u64 {
    unsafe { AudioConvertHostTimeToNanos(AudioGetCurrentHostTime()) }
}

/// Clock on the HAL's host-time timeline, the one IO proc timestamps use.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostClock;

impl Clock for HostClock {
    fn now_us(&self) -> i64 {
        (host_time_nanos() / 1_000) as i64
    }

    fn host_time_ns(&self) -> u64 {
        host_time_nanos()
    }
}
