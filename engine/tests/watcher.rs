mod common;

use common::{CountingReload, harness};
use hogout_engine::exclusive::watcher::{ReconfigWatcher, WatcherState};
use hogout_engine::hw::sim::{Fault, SimHardware};
use hogout_engine::hw::{DeviceId, NotificationSource, StreamId};
use hogout_engine::{AudioDriver, OutputParams, PhysicalFormat, SampleFormat};
use std::sync::Arc;
use std::thread;

const DEVICE: DeviceId = DeviceId(1);
const OUTPUT: StreamId = StreamId(11);

fn stereo_48k() -> OutputParams {
    OutputParams::new(SampleFormat::S16, 48_000, 2)
}

fn changed_format() -> PhysicalFormat {
    PhysicalFormat::for_request(SampleFormat::S16, 44_100, 2)
}

#[test]
fn listens_on_the_device_and_the_device_list() {
    let mut h = harness();
    h.driver.init(&mut stereo_48k()).unwrap();
    assert_eq!(h.hw.notify(NotificationSource::DeviceHasChanged(DEVICE)), 1);
    assert_eq!(h.hw.notify(NotificationSource::DeviceList), 1);
    assert_eq!(h.hw.notify(NotificationSource::DeviceHasChanged(DeviceId(2))), 0);
}

#[test]
fn unchanged_format_does_not_reload() {
    let mut h = harness();
    h.driver.init(&mut stereo_48k()).unwrap();

    h.hw.notify(NotificationSource::DeviceHasChanged(DEVICE));
    h.hw.notify(NotificationSource::DeviceList);

    assert_eq!(h.reload.count(), 0);
    assert_eq!(h.driver.watcher_state(), Some(WatcherState::Armed));
}

#[test]
fn burst_of_notifications_reloads_once() {
    let mut h = harness();
    h.driver.init(&mut stereo_48k()).unwrap();
    h.hw.set_live_format(OUTPUT, Some(changed_format()));

    for _ in 0..5 {
        h.hw.notify(NotificationSource::DeviceHasChanged(DEVICE));
        h.hw.notify(NotificationSource::DeviceList);
    }

    assert_eq!(h.reload.count(), 1);
    assert_eq!(h.driver.watcher_state(), Some(WatcherState::ReloadPending));
}

#[test]
fn unreadable_format_counts_as_a_change() {
    let mut h = harness();
    h.driver.init(&mut stereo_48k()).unwrap();
    h.hw.inject(Fault::ReadVirtualFormat);

    h.hw.notify(NotificationSource::DeviceList);
    assert_eq!(h.reload.count(), 1);
}

#[test]
fn concurrent_notifications_reload_once() {
    let mut h = harness();
    h.driver.init(&mut stereo_48k()).unwrap();
    h.hw.set_live_format(OUTPUT, Some(changed_format()));

    thread::scope(|s| {
        for _ in 0..8 {
            let hw = &h.hw;
            s.spawn(move || {
                for _ in 0..16 {
                    hw.notify(NotificationSource::DeviceHasChanged(DEVICE));
                }
            });
        }
    });

    assert_eq!(h.reload.count(), 1);
}

#[test]
fn no_notifications_after_uninit() {
    let mut h = harness();
    h.driver.init(&mut stereo_48k()).unwrap();
    h.driver.uninit();
    h.hw.set_live_format(OUTPUT, Some(changed_format()));

    assert_eq!(h.hw.notify(NotificationSource::DeviceList), 0);
    assert_eq!(h.reload.count(), 0);
    assert_eq!(h.driver.watcher_state(), None);
}

#[test]
fn a_new_session_rearms_the_trigger() {
    let mut h = harness();
    h.driver.init(&mut stereo_48k()).unwrap();
    h.hw.inject(Fault::ReadVirtualFormat);
    h.hw.notify(NotificationSource::DeviceList);
    h.hw.clear_fault(Fault::ReadVirtualFormat);

    h.driver.uninit();
    h.driver.init(&mut stereo_48k()).unwrap();
    assert_eq!(h.driver.watcher_state(), Some(WatcherState::Armed));

    h.hw.inject(Fault::ReadVirtualFormat);
    h.hw.notify(NotificationSource::DeviceList);
    assert_eq!(h.reload.count(), 2);
}

#[test]
fn check_reports_only_the_winning_call() {
    let hw = Arc::new(SimHardware::with_default_device());
    let reload = Arc::new(CountingReload::default());
    let configured = PhysicalFormat::for_request(SampleFormat::S24, 48_000, 2);
    let watcher = ReconfigWatcher::new(hw.clone(), OUTPUT, configured, reload.clone());

    // The stream still runs 44.1kHz/16-bit, so it differs from `configured`.
    assert!(watcher.check());
    assert!(!watcher.check());
    assert_eq!(reload.count(), 1);
    assert_eq!(watcher.state(), WatcherState::ReloadPending);
    assert_eq!(watcher.configured_format(), &configured);
}
