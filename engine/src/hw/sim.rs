//! In-memory audio hardware.
//!
//! Devices, streams and their properties live behind a mutex. Any operation
//! can be made to fail with [`Fault`], notifications are delivered with
//! [`SimHardware::notify`] and the device clock is driven by hand with
//! [`SimHardware::run_cycle`]. Listeners and render callbacks are always
//! invoked with the state lock released, the same way the real HAL calls back
//! from its own threads.

use crate::error::{Error, OsStatus, Result};
use crate::exclusive::render::{RenderServicer, RenderStatus};
use crate::format::{FORMAT_60958_AC3, PhysicalFormat, SampleFormat};
use crate::hw::{
    AudioHardware, DeviceId, DeviceInfo, IoProcId, LatencyProperty, NotificationSource,
    PropertyListener, StreamDirection, StreamId,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A HAL operation that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    ResolveDevice,
    DeviceIsAlive,
    ReadHogMode,
    SetHogMode,
    ReadMixing,
    SetMixing,
    ListStreams,
    StreamDirection,
    AvailableFormats,
    ReadPhysicalFormat,
    SetPhysicalFormat,
    ReadVirtualFormat,
    Latency(LatencyProperty),
    AddListener(NotificationSource),
    RemoveListener(NotificationSource),
    CreateIoProc,
    DestroyIoProc,
    StartIoProc,
    StopIoProc,
}

/// State-changing calls, in the order the HAL saw them.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    HogTaken(DeviceId, i32),
    HogReleased(DeviceId),
    MixingSet(DeviceId, bool),
    PhysicalFormatSet(StreamId, PhysicalFormat),
    ListenerAdded(NotificationSource),
    ListenerRemoved(NotificationSource),
    IoProcCreated(IoProcId),
    IoProcStarted(IoProcId),
    IoProcStopped(IoProcId),
    IoProcDestroyed(IoProcId),
}

#[derive(Debug, Clone)]
pub struct SimStream {
    pub id: StreamId,
    pub direction: StreamDirection,
    pub available: Vec<PhysicalFormat>,
    pub physical: PhysicalFormat,
    /// Forces the virtual format, as if the hardware changed underneath us.
    pub live_override: Option<PhysicalFormat>,
    pending: Option<PhysicalFormat>,
    pending_reads: u32,
}

impl SimStream {
    pub fn new(id: u32, direction: StreamDirection, available: Vec<PhysicalFormat>) -> Self {
        let physical = available.first().copied().unwrap_or_default();
        Self {
            id: StreamId(id),
            direction,
            available,
            physical,
            live_override: None,
            pending: None,
            pending_reads: 0,
        }
    }

    pub fn output(id: u32, available: Vec<PhysicalFormat>) -> Self {
        Self::new(id, StreamDirection::Output, available)
    }

    pub fn input(id: u32, available: Vec<PhysicalFormat>) -> Self {
        Self::new(id, StreamDirection::Input, available)
    }

    pub fn with_physical(mut self, physical: PhysicalFormat) -> Self {
        self.physical = physical;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SimDevice {
    pub id: DeviceId,
    pub name: String,
    pub uid: String,
    pub alive: bool,
    pub hog_owner: Option<i32>,
    /// `None` when the device has no settable mixing property.
    pub mixing: Option<bool>,
    pub latency: HashMap<LatencyProperty, u32>,
    pub streams: Vec<SimStream>,
}

impl SimDevice {
    pub fn new(id: u32, name: &str) -> Self {
        Self {
            id: DeviceId(id),
            name: name.to_string(),
            uid: format!("sim-{id}"),
            alive: true,
            hog_owner: None,
            mixing: Some(true),
            latency: HashMap::new(),
            streams: Vec::new(),
        }
    }

    pub fn with_stream(mut self, stream: SimStream) -> Self {
        self.streams.push(stream);
        self
    }

    pub fn with_mixing(mut self, mixing: Option<bool>) -> Self {
        self.mixing = mixing;
        self
    }

    pub fn with_latency(mut self, property: LatencyProperty, frames: u32) -> Self {
        self.latency.insert(property, frames);
        self
    }
}

/// Device state relevant to exclusive access, for before/after comparisons.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub hog_owner: Option<i32>,
    pub mixing: Option<bool>,
    pub physical_formats: Vec<PhysicalFormat>,
    pub listeners: usize,
    pub io_procs: usize,
}

struct SimIoProc {
    id: IoProcId,
    device: DeviceId,
    servicer: Arc<RenderServicer>,
    running: bool,
}

#[derive(Default)]
struct SimState {
    devices: Vec<SimDevice>,
    faults: HashSet<Fault>,
    confirm_switches: bool,
    switch_latency_reads: u32,
    listeners: Vec<(NotificationSource, Arc<dyn PropertyListener>)>,
    io_procs: Vec<SimIoProc>,
    next_io_proc: usize,
    events: Vec<SimEvent>,
}

impl SimState {
    fn check(&self, fault: Fault, operation: &'static str) -> Result<()> {
        if self.faults.contains(&fault) {
            Err(Error::hardware(operation, OsStatus::UNSPECIFIED))
        } else {
            Ok(())
        }
    }

    fn device(&self, id: DeviceId) -> Result<&SimDevice> {
        self.devices
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| Error::hardware("device lookup", OsStatus::BAD_DEVICE))
    }

    fn device_mut(&mut self, id: DeviceId) -> Result<&mut SimDevice> {
        self.devices
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| Error::hardware("device lookup", OsStatus::BAD_DEVICE))
    }

    fn stream(&self, id: StreamId) -> Result<&SimStream> {
        self.devices
            .iter()
            .flat_map(|d| d.streams.iter())
            .find(|s| s.id == id)
            .ok_or_else(|| Error::hardware("stream lookup", OsStatus::BAD_STREAM))
    }

    fn stream_mut(&mut self, id: StreamId) -> Result<&mut SimStream> {
        self.devices
            .iter_mut()
            .flat_map(|d| d.streams.iter_mut())
            .find(|s| s.id == id)
            .ok_or_else(|| Error::hardware("stream lookup", OsStatus::BAD_STREAM))
    }
}

pub struct SimHardware {
    state: Mutex<SimState>,
}

impl Default for SimHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHardware {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                confirm_switches: true,
                ..SimState::default()
            }),
        }
    }

    /// One stereo device with an input stream and an output stream that runs
    /// 44.1kHz/16-bit and can also do 48k, 96k and AC-3 passthrough.
    pub fn with_default_device() -> Self {
        let hw = Self::new();
        hw.add_device(default_device());
        hw
    }

    pub fn add_device(&self, device: SimDevice) {
        self.state().devices.push(device);
    }

    pub fn inject(&self, fault: Fault) {
        self.state().faults.insert(fault);
    }

    pub fn clear_fault(&self, fault: Fault) {
        self.state().faults.remove(&fault);
    }

    /// When `false`, physical format requests are accepted but never land.
    pub fn set_confirm_switches(&self, confirm: bool) {
        self.state().confirm_switches = confirm;
    }

    /// Number of physical format reads before a requested format lands.
    pub fn set_switch_latency_reads(&self, reads: u32) {
        self.state().switch_latency_reads = reads;
    }

    pub fn set_foreign_hog_owner(&self, device: DeviceId, pid: Option<i32>) {
        if let Ok(d) = self.state().device_mut(device) {
            d.hog_owner = pid;
        }
    }

    pub fn set_live_format(&self, stream: StreamId, format: Option<PhysicalFormat>) {
        if let Ok(s) = self.state().stream_mut(stream) {
            s.live_override = format;
        }
    }

    pub fn hog_owner(&self, device: DeviceId) -> Option<i32> {
        self.state().device(device).ok().and_then(|d| d.hog_owner)
    }

    pub fn mixing(&self, device: DeviceId) -> Option<bool> {
        self.state().device(device).ok().and_then(|d| d.mixing)
    }

    /// Physical format without advancing any pending switch.
    pub fn current_physical_format(&self, stream: StreamId) -> Option<PhysicalFormat> {
        self.state().stream(stream).ok().map(|s| s.physical)
    }

    pub fn listener_count(&self) -> usize {
        self.state().listeners.len()
    }

    pub fn io_proc_count(&self) -> usize {
        self.state().io_procs.len()
    }

    pub fn running_io_procs(&self) -> usize {
        self.state().io_procs.iter().filter(|p| p.running).count()
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.state().events.clone()
    }

    pub fn clear_events(&self) {
        self.state().events.clear();
    }

    pub fn snapshot(&self, device: DeviceId) -> Option<DeviceSnapshot> {
        let state = self.state();
        let d = state.device(device).ok()?;
        Some(DeviceSnapshot {
            hog_owner: d.hog_owner,
            mixing: d.mixing,
            physical_formats: d.streams.iter().map(|s| s.physical).collect(),
            listeners: state.listeners.len(),
            io_procs: state.io_procs.len(),
        })
    }

    /// Deliver a notification to everything listening on `source`.
    /// Returns how many listeners were called.
    pub fn notify(&self, source: NotificationSource) -> usize {
        let targets: Vec<Arc<dyn PropertyListener>> = self
            .state()
            .listeners
            .iter()
            .filter(|(s, _)| *s == source)
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in &targets {
            listener.property_changed(source);
        }
        targets.len()
    }

    /// Run one device period of `bytes` on every started render callback.
    pub fn run_cycle(&self, bytes: usize, output_host_time_ns: u64) -> Vec<RenderStatus> {
        let servicers: Vec<Arc<RenderServicer>> = self
            .state()
            .io_procs
            .iter()
            .filter(|p| p.running)
            .map(|p| Arc::clone(&p.servicer))
            .collect();
        let mut buf = vec![0u8; bytes];
        servicers
            .iter()
            .map(|servicer| servicer.render(output_host_time_ns, &mut buf))
            .collect()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn default_device() -> SimDevice {
    let pcm = |rate, format, channels| PhysicalFormat::for_request(format, rate, channels);
    let mut ac3 = pcm(48_000, SampleFormat::S16, 2);
    ac3.format_id = FORMAT_60958_AC3;
    SimDevice::new(1, "Sim Output")
        .with_stream(SimStream::input(10, vec![pcm(44_100, SampleFormat::S16, 2)]))
        .with_stream(SimStream::output(
            11,
            vec![
                pcm(44_100, SampleFormat::S16, 2),
                pcm(48_000, SampleFormat::S16, 2),
                pcm(48_000, SampleFormat::S24, 2),
                pcm(96_000, SampleFormat::S24, 2),
                ac3,
            ],
        ))
        .with_latency(LatencyProperty::DeviceLatency, 32)
        .with_latency(LatencyProperty::BufferFrameSize, 512)
        .with_latency(LatencyProperty::SafetyOffset, 24)
}

impl AudioHardware for SimHardware {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        let state = self.state();
        Ok(state
            .devices
            .iter()
            .map(|d| DeviceInfo {
                id: d.id,
                name: d.name.clone(),
                uid: d.uid.clone(),
                output_channels: d
                    .streams
                    .iter()
                    .filter(|s| s.direction == StreamDirection::Output)
                    .map(|s| s.physical.channels_per_frame)
                    .sum(),
            })
            .collect())
    }

    fn resolve_device(&self, name: Option<&str>) -> Result<DeviceId> {
        let state = self.state();
        state.check(Fault::ResolveDevice, "select device")?;
        match name {
            None => state
                .devices
                .first()
                .map(|d| d.id)
                .ok_or_else(|| Error::DeviceNotFound("default output device".to_string())),
            Some(name) => state
                .devices
                .iter()
                .find(|d| d.name == name || d.uid == name)
                .map(|d| d.id)
                .ok_or_else(|| Error::DeviceNotFound(name.to_string())),
        }
    }

    fn device_is_alive(&self, device: DeviceId) -> Result<bool> {
        let state = self.state();
        state.check(Fault::DeviceIsAlive, "get device alive")?;
        Ok(state.device(device)?.alive)
    }

    fn hog_mode_owner(&self, device: DeviceId) -> Result<Option<i32>> {
        let state = self.state();
        state.check(Fault::ReadHogMode, "get hog mode")?;
        Ok(state.device(device)?.hog_owner)
    }

    fn set_hog_mode(&self, device: DeviceId, owner: Option<i32>) -> Result<()> {
        let mut state = self.state();
        state.check(Fault::SetHogMode, "set hog mode")?;
        let d = state.device_mut(device)?;
        match (d.hog_owner, owner) {
            (Some(current), Some(pid)) if current != pid => {
                return Err(Error::hardware("set hog mode", OsStatus::PERMISSIONS));
            }
            _ => d.hog_owner = owner,
        }
        let event = match owner {
            Some(pid) => SimEvent::HogTaken(device, pid),
            None => SimEvent::HogReleased(device),
        };
        state.events.push(event);
        Ok(())
    }

    fn mixing_settable(&self, device: DeviceId) -> Result<bool> {
        let state = self.state();
        state.check(Fault::ReadMixing, "check mixing")?;
        Ok(state.device(device)?.mixing.is_some())
    }

    fn mixing_enabled(&self, device: DeviceId) -> Result<bool> {
        let state = self.state();
        state.check(Fault::ReadMixing, "get mixing")?;
        state
            .device(device)?
            .mixing
            .ok_or_else(|| Error::hardware("get mixing", OsStatus::UNKNOWN_PROPERTY))
    }

    fn set_mixing_enabled(&self, device: DeviceId, enabled: bool) -> Result<()> {
        let mut state = self.state();
        state.check(Fault::SetMixing, "set mixing")?;
        let d = state.device_mut(device)?;
        if d.mixing.is_none() {
            return Err(Error::hardware("set mixing", OsStatus::UNKNOWN_PROPERTY));
        }
        d.mixing = Some(enabled);
        state.events.push(SimEvent::MixingSet(device, enabled));
        Ok(())
    }

    fn streams(&self, device: DeviceId) -> Result<Vec<StreamId>> {
        let state = self.state();
        state.check(Fault::ListStreams, "get streams")?;
        Ok(state.device(device)?.streams.iter().map(|s| s.id).collect())
    }

    fn stream_direction(&self, stream: StreamId) -> Result<StreamDirection> {
        let state = self.state();
        state.check(Fault::StreamDirection, "get stream direction")?;
        Ok(state.stream(stream)?.direction)
    }

    fn available_physical_formats(&self, stream: StreamId) -> Result<Vec<PhysicalFormat>> {
        let state = self.state();
        state.check(Fault::AvailableFormats, "get available physical formats")?;
        Ok(state.stream(stream)?.available.clone())
    }

    fn physical_format(&self, stream: StreamId) -> Result<PhysicalFormat> {
        let mut state = self.state();
        state.check(Fault::ReadPhysicalFormat, "get physical format")?;
        let confirm = state.confirm_switches;
        let s = state.stream_mut(stream)?;
        if let Some(pending) = s.pending {
            if confirm && s.pending_reads == 0 {
                s.physical = pending;
                s.pending = None;
            } else {
                s.pending_reads = s.pending_reads.saturating_sub(1);
            }
        }
        Ok(s.physical)
    }

    fn set_physical_format(&self, stream: StreamId, format: &PhysicalFormat) -> Result<()> {
        let mut state = self.state();
        state.check(Fault::SetPhysicalFormat, "set physical format")?;
        let reads = state.switch_latency_reads;
        let s = state.stream_mut(stream)?;
        s.pending = Some(*format);
        s.pending_reads = reads;
        state
            .events
            .push(SimEvent::PhysicalFormatSet(stream, *format));
        Ok(())
    }

    fn virtual_format(&self, stream: StreamId) -> Result<PhysicalFormat> {
        let state = self.state();
        state.check(Fault::ReadVirtualFormat, "get virtual format")?;
        let s = state.stream(stream)?;
        Ok(s.live_override.unwrap_or(s.physical))
    }

    fn latency_property(&self, device: DeviceId, property: LatencyProperty) -> Result<u32> {
        let state = self.state();
        state.check(Fault::Latency(property), "get latency")?;
        state
            .device(device)?
            .latency
            .get(&property)
            .copied()
            .ok_or_else(|| Error::hardware("get latency", OsStatus::UNKNOWN_PROPERTY))
    }

    fn add_listener(
        &self,
        source: NotificationSource,
        listener: Arc<dyn PropertyListener>,
    ) -> Result<()> {
        let mut state = self.state();
        state.check(Fault::AddListener(source), "add property listener")?;
        state.listeners.push((source, listener));
        state.events.push(SimEvent::ListenerAdded(source));
        Ok(())
    }

    fn remove_listener(
        &self,
        source: NotificationSource,
        listener: &Arc<dyn PropertyListener>,
    ) -> Result<()> {
        let mut state = self.state();
        state.check(Fault::RemoveListener(source), "remove property listener")?;
        let pos = state
            .listeners
            .iter()
            .position(|(s, l)| *s == source && Arc::ptr_eq(l, listener))
            .ok_or(Error::hardware(
                "remove property listener",
                OsStatus::ILLEGAL_OPERATION,
            ))?;
        state.listeners.remove(pos);
        state.events.push(SimEvent::ListenerRemoved(source));
        Ok(())
    }

    fn create_io_proc(&self, device: DeviceId, servicer: Arc<RenderServicer>) -> Result<IoProcId> {
        let mut state = self.state();
        state.check(Fault::CreateIoProc, "create IO proc")?;
        state.device(device)?;
        let id = IoProcId(state.next_io_proc);
        state.next_io_proc += 1;
        state.io_procs.push(SimIoProc {
            id,
            device,
            servicer,
            running: false,
        });
        state.events.push(SimEvent::IoProcCreated(id));
        Ok(id)
    }

    fn destroy_io_proc(&self, device: DeviceId, proc_id: IoProcId) -> Result<()> {
        let mut state = self.state();
        state.check(Fault::DestroyIoProc, "destroy IO proc")?;
        let before = state.io_procs.len();
        state
            .io_procs
            .retain(|p| !(p.id == proc_id && p.device == device));
        if state.io_procs.len() == before {
            return Err(Error::hardware("destroy IO proc", OsStatus::ILLEGAL_OPERATION));
        }
        state.events.push(SimEvent::IoProcDestroyed(proc_id));
        Ok(())
    }

    fn start_io_proc(&self, device: DeviceId, proc_id: IoProcId) -> Result<()> {
        let mut state = self.state();
        state.check(Fault::StartIoProc, "start device")?;
        let io_proc = state
            .io_procs
            .iter_mut()
            .find(|p| p.id == proc_id && p.device == device)
            .ok_or(Error::hardware("start device", OsStatus::ILLEGAL_OPERATION))?;
        io_proc.running = true;
        state.events.push(SimEvent::IoProcStarted(proc_id));
        Ok(())
    }

    fn stop_io_proc(&self, device: DeviceId, proc_id: IoProcId) -> Result<()> {
        let mut state = self.state();
        state.check(Fault::StopIoProc, "stop device")?;
        let io_proc = state
            .io_procs
            .iter_mut()
            .find(|p| p.id == proc_id && p.device == device)
            .ok_or(Error::hardware("stop device", OsStatus::ILLEGAL_OPERATION))?;
        io_proc.running = false;
        state.events.push(SimEvent::IoProcStopped(proc_id));
        Ok(())
    }
}
