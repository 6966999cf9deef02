//! Exclusive-mode output driver.
//!
//! `ExclusiveDriver` takes hog mode on a device, switches one of its output
//! streams to the physical format closest to the host's request and registers
//! a render callback that pulls decoded audio on the device's schedule.
//! Every acquisition step that changes device state is recorded in the
//! session so a failure at any later step can undo exactly what was done.

pub mod latency;
pub mod lock;
pub mod mixing;
pub mod negotiate;
pub mod render;
pub mod stream;
pub mod switch;
pub mod watcher;

use crate::error::{Error, Result};
use crate::format::PhysicalFormat;
use crate::host::{AudioDriver, Host, OutputParams};
use crate::hw::options::DriverOptions;
use crate::hw::{AudioHardware, DeviceId, DeviceInfo, IoProcId, StreamId};

use self::lock::HogToken;
use self::mixing::MixingState;
use self::render::{RenderParams, RenderServicer};
use self::switch::SwitchTiming;
use self::watcher::{ReconfigWatcher, Subscription, WatcherState};

use std::fmt;
use std::sync::Arc;

/// Acquisition progress of the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Idle,
    Selecting,
    Locking,
    StreamSelecting,
    Negotiating,
    Switching,
    ChannelMapping,
    LatencyComputing,
    WatcherArming,
    CallbackRegistering,
    Running,
    Stopped,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Idle => "idle",
            Stage::Selecting => "device selection",
            Stage::Locking => "device locking",
            Stage::StreamSelecting => "stream selection",
            Stage::Negotiating => "format negotiation",
            Stage::Switching => "format switch",
            Stage::ChannelMapping => "channel mapping",
            Stage::LatencyComputing => "latency computation",
            Stage::WatcherArming => "format change listener installation",
            Stage::CallbackRegistering => "render callback registration",
            Stage::Running => "running",
            Stage::Stopped => "stopped",
            Stage::Failed => "failed",
        };
        f.write_str(s)
    }
}

struct Session<H: AudioHardware> {
    device: DeviceId,
    stream: Option<(StreamId, usize)>,
    /// Physical format found on the stream before the switch.
    original: Option<PhysicalFormat>,
    /// A switch away from `original` was requested.
    switched: bool,
    /// Virtual format read back after the switch.
    configured: Option<PhysicalFormat>,
    hog: HogToken,
    mixing: MixingState,
    hw_latency_us: u64,
    watcher: Option<Arc<ReconfigWatcher<H>>>,
    subscription: Option<Subscription>,
    io_proc: Option<IoProcId>,
    servicer: Option<Arc<RenderServicer>>,
    paused: bool,
}

impl<H: AudioHardware> Session<H> {
    fn new(device: DeviceId) -> Self {
        Self {
            device,
            stream: None,
            original: None,
            switched: false,
            configured: None,
            hog: HogToken::unheld(),
            mixing: MixingState::untouched(),
            hw_latency_us: 0,
            watcher: None,
            subscription: None,
            io_proc: None,
            servicer: None,
            paused: true,
        }
    }

    /// Stop everything that can call back into the session: listeners first,
    /// then the render callback.
    fn cancel_callbacks(&mut self, hw: &H) {
        if let Some(mut subscription) = self.subscription.take() {
            if let Err(e) = watcher::disarm(hw, &mut subscription) {
                tracing::warn!("can't remove device listener, this may cause a crash: {e}");
            }
        }
        self.watcher = None;

        if let Some(proc_id) = self.io_proc.take() {
            if let Err(e) = hw.stop_io_proc(self.device, proc_id) {
                tracing::warn!("failed to stop audio device: {e}");
            }
            if let Err(e) = hw.destroy_io_proc(self.device, proc_id) {
                tracing::warn!("failed to remove device render callback: {e}");
            }
        }
        self.servicer = None;
        self.paused = true;
    }

    /// Undo the device-level changes, newest first.
    fn restore_device(&mut self, hw: &H, timing: SwitchTiming) {
        if std::mem::take(&mut self.switched) {
            if let (Some((stream, _)), Some(original)) = (self.stream, self.original) {
                if let Err(e) = switch::restore_format(hw, stream, &original, timing) {
                    tracing::warn!("can't revert to original device format: {e}");
                }
            }
        }

        if let Err(e) = mixing::restore_mixing(hw, self.device, &mut self.mixing) {
            tracing::warn!("can't re-enable mixing: {e}");
        }

        if let Err(e) = lock::release_exclusive(hw, self.device, &mut self.hog) {
            tracing::warn!("can't release hog mode: {e}");
        }
    }
}

pub struct ExclusiveDriver<H: AudioHardware> {
    hw: Arc<H>,
    host: Host,
    options: DriverOptions,
    stage: Stage,
    session: Option<Session<H>>,
}

impl<H: AudioHardware> ExclusiveDriver<H> {
    pub const NAME: &'static str = "coreaudio_exclusive";
    pub const DESCRIPTION: &'static str = "CoreAudio Exclusive Mode";

    pub fn new(hw: Arc<H>, host: Host, options: DriverOptions) -> Self {
        Self {
            hw,
            host,
            options,
            stage: Stage::Idle,
            session: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_paused(&self) -> bool {
        self.session.as_ref().is_none_or(|s| s.paused)
    }

    pub fn device(&self) -> Option<DeviceId> {
        self.session.as_ref().map(|s| s.device)
    }

    pub fn stream(&self) -> Option<(StreamId, usize)> {
        self.session.as_ref().and_then(|s| s.stream)
    }

    /// Stream format the session configured and watches for changes.
    pub fn configured_format(&self) -> Option<PhysicalFormat> {
        self.session.as_ref().and_then(|s| s.configured)
    }

    pub fn original_format(&self) -> Option<PhysicalFormat> {
        self.session.as_ref().and_then(|s| s.original)
    }

    pub fn hw_latency_us(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.hw_latency_us)
    }

    pub fn holds_hog_mode(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.hog.is_held())
    }

    pub fn mixing_state(&self) -> Option<MixingState> {
        self.session.as_ref().map(|s| s.mixing)
    }

    pub fn watcher_state(&self) -> Option<WatcherState> {
        self.session
            .as_ref()
            .and_then(|s| s.watcher.as_ref())
            .map(|w| w.state())
    }

    pub fn render_servicer(&self) -> Option<Arc<RenderServicer>> {
        self.session.as_ref().and_then(|s| s.servicer.clone())
    }

    fn enter(&mut self, stage: Stage) {
        tracing::trace!("entering {stage}");
        self.stage = stage;
    }

    fn select_device(&mut self, params: &mut OutputParams) -> Result<DeviceId> {
        self.enter(Stage::Selecting);
        params.format = params.format.to_packed();

        let name = params
            .device
            .as_deref()
            .or(self.options.device.as_deref())
            .filter(|n| !n.is_empty());
        let device = self.hw.resolve_device(name)?;
        tracing::debug!("selected {device}");

        match self.hw.device_is_alive(device) {
            Ok(true) => {}
            Ok(false) => tracing::warn!("device is not alive"),
            Err(e) => tracing::warn!("could not check whether device is alive: {e}"),
        }
        Ok(device)
    }

    fn acquire(&mut self, session: &mut Session<H>, params: &mut OutputParams) -> Result<()> {
        let hw = Arc::clone(&self.hw);
        let device = session.device;

        self.enter(Stage::Locking);
        if self.options.exclusive {
            match lock::acquire_exclusive(&*hw, device) {
                Ok(token) => session.hog = token,
                Err(e) => tracing::warn!("failed to set hogmode: {e}"),
            }
        }
        if self.options.disable_mixing {
            match mixing::disable_mixing(&*hw, device) {
                Ok(state) => session.mixing = state,
                Err(e) => tracing::warn!("failed to disable mixing: {e}"),
            }
        }

        self.enter(Stage::StreamSelecting);
        let (stream, stream_index) = stream::select_stream(&*hw, device, params.format.family())?;
        session.stream = Some((stream, stream_index));

        self.enter(Stage::Negotiating);
        let desired = PhysicalFormat::for_request(params.format, params.sample_rate, params.channels);
        tracing::debug!("our format: {desired}");
        let candidates = hw.available_physical_formats(stream)?;
        let target = negotiate::select_best_format(&desired, &candidates)?;
        tracing::debug!("best hardware format: {target}");

        self.enter(Stage::Switching);
        let original = hw.physical_format(stream)?;
        session.original = Some(original);
        if original.same_layout(&target) {
            tracing::debug!("{stream} already runs {target}");
        } else {
            let timing = SwitchTiming::from_options(&self.options);
            switch::request_format(&*hw, stream, &target)?;
            session.switched = true;
            switch::await_format(&*hw, stream, &target, timing)?;
        }

        self.enter(Stage::ChannelMapping);
        let configured = hw.virtual_format(stream)?;
        tracing::debug!("virtual format: {configured}");
        self.host
            .channel_map
            .init_channel_map(device, &configured, params)
            .map_err(Error::ChannelMap)?;
        match configured.sample_format() {
            // Keep the host's S/PDIF flavour, the mapping back is lossy.
            Some(format) if format.is_spdif() && params.format.is_spdif() => {}
            Some(format) => params.format = format,
            None => return Err(Error::UnsupportedHardwareFormat(configured)),
        }
        params.sample_rate = configured.sample_rate.round() as u32;
        if params.channels != configured.channels_per_frame {
            return Err(Error::ChannelCountChanged {
                requested: params.channels,
                hardware: configured.channels_per_frame,
            });
        }
        session.configured = Some(configured);

        self.enter(Stage::LatencyComputing);
        session.hw_latency_us = latency::query_base_latency_us(&*hw, device, params.sample_rate);

        self.enter(Stage::WatcherArming);
        let watcher = Arc::new(ReconfigWatcher::new(
            Arc::clone(&hw),
            stream,
            configured,
            Arc::clone(&self.host.reload),
        ));
        session.subscription = Some(watcher::arm(&*hw, device, Arc::clone(&watcher))?);
        session.watcher = Some(watcher);

        self.enter(Stage::CallbackRegistering);
        // The device buffers are laid out by the stream, not by the host format.
        let stride = match configured.bytes_per_frame {
            0 => params.frame_stride(),
            bytes => bytes as usize,
        };
        let servicer = Arc::new(RenderServicer::new(
            RenderParams {
                stride,
                sample_rate: params.sample_rate,
                hw_latency_us: session.hw_latency_us,
                stream_index,
            },
            Arc::clone(&self.host.source),
            Arc::clone(&self.host.clock),
        ));
        session.io_proc = Some(hw.create_io_proc(device, Arc::clone(&servicer))?);
        session.servicer = Some(servicer);
        Ok(())
    }
}

impl<H: AudioHardware> AudioDriver for ExclusiveDriver<H> {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        Self::DESCRIPTION
    }

    fn init(&mut self, params: &mut OutputParams) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::AlreadyInitialized);
        }

        // Work on a copy so the host only sees the result of a full success.
        let mut negotiated = params.clone();
        let device = match self.select_device(&mut negotiated) {
            Ok(device) => device,
            Err(e) => {
                let stage = self.stage;
                tracing::error!("failed to select device: {e}");
                self.stage = Stage::Failed;
                return Err(Error::Acquire {
                    stage,
                    source: Box::new(e),
                });
            }
        };

        let mut session = Session::new(device);
        match self.acquire(&mut session, &mut negotiated) {
            Ok(()) => {
                tracing::info!(
                    "{} running at {}Hz {}ch {:?}, base latency {}us",
                    device,
                    negotiated.sample_rate,
                    negotiated.channels,
                    negotiated.format,
                    session.hw_latency_us
                );
                *params = negotiated;
                self.session = Some(session);
                self.stage = Stage::Running;
                Ok(())
            }
            Err(e) => {
                let stage = self.stage;
                tracing::error!("{stage} failed: {e}");
                session.cancel_callbacks(&self.hw);
                session.restore_device(&self.hw, SwitchTiming::from_options(&self.options));
                self.stage = Stage::Failed;
                Err(Error::Acquire {
                    stage,
                    source: Box::new(e),
                })
            }
        }
    }

    fn uninit(&mut self) {
        let Some(mut session) = self.session.take() else {
            tracing::debug!("uninit without an active session");
            return;
        };
        session.cancel_callbacks(&self.hw);
        self.stage = Stage::Stopped;
        session.restore_device(&self.hw, SwitchTiming::from_options(&self.options));
        self.stage = Stage::Idle;
        tracing::info!("{} released", session.device);
    }

    fn pause(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(proc_id) = session.io_proc else {
            return;
        };
        match self.hw.stop_io_proc(session.device, proc_id) {
            Ok(()) => session.paused = true,
            Err(e) => tracing::warn!("can't stop audio device: {e}"),
        }
    }

    fn resume(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(proc_id) = session.io_proc else {
            return;
        };
        match self.hw.start_io_proc(session.device, proc_id) {
            Ok(()) => session.paused = false,
            Err(e) => tracing::warn!("can't start audio device: {e}"),
        }
    }

    fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        self.hw.list_devices()
    }
}

impl<H: AudioHardware> Drop for ExclusiveDriver<H> {
    fn drop(&mut self) {
        if self.session.is_some() {
            self.uninit();
        }
    }
}
