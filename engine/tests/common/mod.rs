#![allow(dead_code)]

use hogout_engine::host::HardwareLayout;
use hogout_engine::hw::options::DriverOptions;
use hogout_engine::hw::sim::SimHardware;
use hogout_engine::{AudioSource, ChannelMapper, Clock, ExclusiveDriver, Host, ReloadSink};
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One `pull` as the source saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pull {
    pub bytes: usize,
    pub frames: usize,
    pub deadline_us: i64,
}

#[derive(Default)]
pub struct RecordingSource {
    pulls: Mutex<Vec<Pull>>,
}

impl RecordingSource {
    pub fn pulls(&self) -> Vec<Pull> {
        self.pulls.lock().unwrap().clone()
    }
}

impl AudioSource for RecordingSource {
    fn pull(&self, out: &mut [u8], frames: usize, deadline_us: i64) {
        out.fill(0x5A);
        self.pulls.lock().unwrap().push(Pull {
            bytes: out.len(),
            frames,
            deadline_us,
        });
    }
}

#[derive(Default)]
pub struct CountingReload {
    count: AtomicUsize,
}

impl CountingReload {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl ReloadSink for CountingReload {
    fn request_reload(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Clock the test moves by hand.
#[derive(Default)]
pub struct ManualClock {
    now_us: AtomicI64,
    host_ns: AtomicU64,
}

impl ManualClock {
    pub fn set(&self, now_us: i64, host_ns: u64) {
        self.now_us.store(now_us, Ordering::SeqCst);
        self.host_ns.store(host_ns, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> i64 {
        self.now_us.load(Ordering::SeqCst)
    }

    fn host_time_ns(&self) -> u64 {
        self.host_ns.load(Ordering::SeqCst)
    }
}

pub struct Harness {
    pub hw: Arc<SimHardware>,
    pub source: Arc<RecordingSource>,
    pub reload: Arc<CountingReload>,
    pub clock: Arc<ManualClock>,
    pub driver: ExclusiveDriver<SimHardware>,
}

/// Short switch timing so timeouts do not slow the suite down.
pub fn fast_options() -> DriverOptions {
    DriverOptions {
        format_switch_timeout_ms: 40,
        format_switch_poll_ms: 5,
        ..DriverOptions::default()
    }
}

pub fn harness_with(hw: SimHardware, options: DriverOptions) -> Harness {
    harness_mapped(hw, options, Arc::new(HardwareLayout))
}

pub fn harness_mapped(
    hw: SimHardware,
    options: DriverOptions,
    channel_map: Arc<dyn ChannelMapper>,
) -> Harness {
    let hw = Arc::new(hw);
    let source = Arc::new(RecordingSource::default());
    let reload = Arc::new(CountingReload::default());
    let clock = Arc::new(ManualClock::default());
    let host = Host {
        source: source.clone(),
        reload: reload.clone(),
        channel_map,
        clock: clock.clone(),
    };
    let driver = ExclusiveDriver::new(hw.clone(), host, options);
    Harness {
        hw,
        source,
        reload,
        clock,
        driver,
    }
}

pub fn harness() -> Harness {
    harness_with(SimHardware::with_default_device(), fast_options())
}
