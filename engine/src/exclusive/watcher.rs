//! Detects hardware reconfiguration underneath a running session.
//!
//! Notifications arrive on the HAL's own thread. The watcher only compares the
//! live stream format against the one the session configured and, on the first
//! mismatch, asks the host to reload. It never touches playback state itself.

use crate::format::PhysicalFormat;
use crate::host::ReloadSink;
use crate::hw::{AudioHardware, DeviceId, NotificationSource, PropertyListener, StreamId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Armed,
    ReloadPending,
}

pub struct ReconfigWatcher<H: AudioHardware> {
    hw: Arc<H>,
    stream: StreamId,
    configured: PhysicalFormat,
    reload: Arc<dyn ReloadSink>,
    reload_requested: AtomicBool,
}

impl<H: AudioHardware> ReconfigWatcher<H> {
    pub fn new(
        hw: Arc<H>,
        stream: StreamId,
        configured: PhysicalFormat,
        reload: Arc<dyn ReloadSink>,
    ) -> Self {
        Self {
            hw,
            stream,
            configured,
            reload,
            reload_requested: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> WatcherState {
        if self.reload_requested.load(Ordering::Acquire) {
            WatcherState::ReloadPending
        } else {
            WatcherState::Armed
        }
    }

    pub fn configured_format(&self) -> &PhysicalFormat {
        &self.configured
    }

    /// Compare the live format with the configured one. Returns `true` only
    /// for the single call that requested the reload.
    pub fn check(&self) -> bool {
        let matches = match self.hw.virtual_format(self.stream) {
            Ok(live) => live.same_layout(&self.configured),
            Err(e) => {
                tracing::warn!("could not get stream format: {e}");
                false
            }
        };
        if matches {
            return false;
        }

        if self
            .reload_requested
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.reload.request_reload();
            tracing::info!("stream format changed, reloading");
            true
        } else {
            false
        }
    }
}

impl<H: AudioHardware> PropertyListener for ReconfigWatcher<H> {
    fn property_changed(&self, source: NotificationSource) {
        tracing::debug!("property notification from {source:?}");
        self.check();
    }
}

/// The two notification sources a session listens on.
pub fn sources(device: DeviceId) -> [NotificationSource; 2] {
    [
        NotificationSource::DeviceHasChanged(device),
        NotificationSource::DeviceList,
    ]
}

/// Live listener registrations; every entry is removed exactly once.
pub struct Subscription {
    listener: Arc<dyn PropertyListener>,
    active: Vec<NotificationSource>,
}

/// Subscribe `watcher` to every source for `device`. If any subscription
/// fails, the ones already made are removed before the error is returned.
pub fn arm<H: AudioHardware>(
    hw: &H,
    device: DeviceId,
    watcher: Arc<ReconfigWatcher<H>>,
) -> crate::error::Result<Subscription> {
    let listener: Arc<dyn PropertyListener> = watcher;
    let mut subscription = Subscription {
        listener,
        active: Vec::with_capacity(2),
    };
    for source in sources(device) {
        if let Err(e) = hw.add_listener(source, Arc::clone(&subscription.listener)) {
            if let Err(undo) = disarm(hw, &mut subscription) {
                tracing::warn!("can't remove format change listener: {undo}");
            }
            return Err(e);
        }
        subscription.active.push(source);
    }
    Ok(subscription)
}

/// Remove every registration in `subscription`. All removals are attempted;
/// the first failure is reported.
pub fn disarm<H: AudioHardware + ?Sized>(
    hw: &H,
    subscription: &mut Subscription,
) -> crate::error::Result<()> {
    let mut first_err = None;
    for source in subscription.active.drain(..).rev() {
        if let Err(e) = hw.remove_listener(source, &subscription.listener) {
            tracing::debug!("removing listener for {source:?} failed: {e}");
            first_err.get_or_insert(e);
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
