//! The pull callback the device clock invokes once per buffer period.
//!
//! Everything here is fixed before the callback is registered and stays
//! untouched until it is unregistered, so rendering takes no locks and does
//! not allocate.

use crate::error::OsStatus;
use crate::exclusive::latency::frames_to_us;
use crate::host::{AudioSource, Clock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    Ok,
    /// The device asked for a byte count that is not a whole number of frames.
    Unaligned,
}

impl RenderStatus {
    /// Status handed back to the device clock.
    pub fn os_status(self) -> OsStatus {
        match self {
            RenderStatus::Ok => OsStatus::NO_ERROR,
            RenderStatus::Unaligned => OsStatus::UNSPECIFIED,
        }
    }
}

/// Session values the callback needs, precomputed during acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderParams {
    /// Bytes per interleaved frame.
    pub stride: usize,
    pub sample_rate: u32,
    pub hw_latency_us: u64,
    /// Index of the selected stream's buffer in the device buffer list.
    pub stream_index: usize,
}

pub struct RenderServicer {
    params: RenderParams,
    source: Arc<dyn AudioSource>,
    clock: Arc<dyn Clock>,
    unaligned: AtomicU64,
}

impl RenderServicer {
    pub fn new(params: RenderParams, source: Arc<dyn AudioSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            params,
            source,
            clock,
            unaligned: AtomicU64::new(0),
        }
    }

    pub fn params(&self) -> &RenderParams {
        &self.params
    }

    pub fn stream_index(&self) -> usize {
        self.params.stream_index
    }

    /// Callbacks rejected for unaligned sizes so far.
    pub fn unaligned_count(&self) -> u64 {
        self.unaligned.load(Ordering::Relaxed)
    }

    /// Time until the buffer handed to this callback reaches the hardware.
    pub fn callback_latency_us(&self, output_host_time_ns: u64) -> i64 {
        let now_ns = self.clock.host_time_ns();
        (output_host_time_ns.saturating_sub(now_ns) / 1_000) as i64
    }

    pub fn deadline_us(&self, now_us: i64, callback_latency_us: i64, frames: usize) -> i64 {
        now_us
            + self.params.hw_latency_us as i64
            + callback_latency_us
            + frames_to_us(frames as u64, self.params.sample_rate) as i64
    }

    /// Fill `out` for one device period.
    ///
    /// `output_host_time_ns` is the host time at which `out` will be played.
    pub fn render(&self, output_host_time_ns: u64, out: &mut [u8]) -> RenderStatus {
        let requested = out.len();
        let stride = self.params.stride;
        if stride == 0 || requested % stride != 0 {
            // Report the first one; repeats only bump the counter.
            if self.unaligned.fetch_add(1, Ordering::Relaxed) == 0 {
                tracing::error!("unsupported unaligned read of {requested} bytes");
            }
            return RenderStatus::Unaligned;
        }

        let frames = requested / stride;
        let deadline = self.deadline_us(
            self.clock.now_us(),
            self.callback_latency_us(output_host_time_ns),
            frames,
        );
        self.source.pull(out, frames, deadline);
        RenderStatus::Ok
    }
}
