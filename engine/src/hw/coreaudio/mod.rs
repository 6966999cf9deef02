#![cfg(target_os = "macos")]

//! CoreAudio HAL backend.

pub mod clock;
pub mod device;
pub mod ioproc;
pub mod listener;
mod props;

use self::ioproc::IoProcRegistry;
use self::listener::ListenerRegistry;
use crate::error::Result;
use crate::exclusive::render::RenderServicer;
use crate::format::PhysicalFormat;
use crate::hw::{
    AudioHardware, DeviceId, DeviceInfo, IoProcId, LatencyProperty, NotificationSource,
    PropertyListener, StreamDirection, StreamId,
};
use coreaudio_sys::{
    AudioStreamBasicDescription, AudioStreamID, AudioStreamRangedDescription, UInt32,
    kAudioDevicePropertyBufferFrameSize, kAudioDevicePropertyDeviceIsAlive,
    kAudioDevicePropertyHogMode, kAudioDevicePropertyLatency, kAudioDevicePropertySafetyOffset,
    kAudioDevicePropertyStreams, kAudioDevicePropertySupportsMixing,
    kAudioStreamPropertyAvailablePhysicalFormats, kAudioStreamPropertyDirection,
    kAudioStreamPropertyPhysicalFormat, kAudioStreamPropertyVirtualFormat,
};
use std::sync::Arc;

/// `kAudioDevicePropertyHogMode` value meaning nobody holds the device.
const NO_HOG_OWNER: i32 = -1;

/// The system's audio HAL.
#[derive(Default)]
pub struct CoreAudioHardware {
    listeners: ListenerRegistry,
    io_procs: IoProcRegistry,
}

impl CoreAudioHardware {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioHardware for CoreAudioHardware {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        device::list_devices()
    }

    fn resolve_device(&self, name: Option<&str>) -> Result<DeviceId> {
        device::select_device(name)
    }

    fn device_is_alive(&self, device: DeviceId) -> Result<bool> {
        let alive: UInt32 = props::get(
            device.0,
            &props::global(kAudioDevicePropertyDeviceIsAlive),
            "check whether device is alive",
        )?;
        Ok(alive != 0)
    }

    fn hog_mode_owner(&self, device: DeviceId) -> Result<Option<i32>> {
        let pid: i32 = props::get(
            device.0,
            &props::global(kAudioDevicePropertyHogMode),
            "read hog mode",
        )?;
        Ok((pid != NO_HOG_OWNER).then_some(pid))
    }

    fn set_hog_mode(&self, device: DeviceId, owner: Option<i32>) -> Result<()> {
        let pid: i32 = owner.unwrap_or(NO_HOG_OWNER);
        props::set(
            device.0,
            &props::global(kAudioDevicePropertyHogMode),
            &pid,
            "set hog mode",
        )
    }

    fn mixing_settable(&self, device: DeviceId) -> Result<bool> {
        let address = props::global(kAudioDevicePropertySupportsMixing);
        if !props::has(device.0, &address) {
            return Ok(false);
        }
        props::is_settable(device.0, &address, "check whether mixing is settable")
    }

    fn mixing_enabled(&self, device: DeviceId) -> Result<bool> {
        let mixing: UInt32 = props::get(
            device.0,
            &props::global(kAudioDevicePropertySupportsMixing),
            "read mixing state",
        )?;
        Ok(mixing != 0)
    }

    fn set_mixing_enabled(&self, device: DeviceId, enabled: bool) -> Result<()> {
        let value: UInt32 = enabled.into();
        props::set(
            device.0,
            &props::global(kAudioDevicePropertySupportsMixing),
            &value,
            "set mixing state",
        )
    }

    fn streams(&self, device: DeviceId) -> Result<Vec<StreamId>> {
        let ids: Vec<AudioStreamID> = props::get_array(
            device.0,
            &props::output(kAudioDevicePropertyStreams),
            "list device streams",
        )?;
        Ok(ids.into_iter().map(StreamId).collect())
    }

    fn stream_direction(&self, stream: StreamId) -> Result<StreamDirection> {
        let direction: UInt32 = props::get(
            stream.0,
            &props::global(kAudioStreamPropertyDirection),
            "read stream direction",
        )?;
        Ok(if direction == 0 {
            StreamDirection::Output
        } else {
            StreamDirection::Input
        })
    }

    fn available_physical_formats(&self, stream: StreamId) -> Result<Vec<PhysicalFormat>> {
        let ranges: Vec<AudioStreamRangedDescription> = props::get_array(
            stream.0,
            &props::global(kAudioStreamPropertyAvailablePhysicalFormats),
            "list physical formats",
        )?;
        Ok(ranges.iter().map(|r| props::from_asbd(&r.mFormat)).collect())
    }

    fn physical_format(&self, stream: StreamId) -> Result<PhysicalFormat> {
        let asbd: AudioStreamBasicDescription = props::get(
            stream.0,
            &props::global(kAudioStreamPropertyPhysicalFormat),
            "read physical format",
        )?;
        Ok(props::from_asbd(&asbd))
    }

    fn set_physical_format(&self, stream: StreamId, format: &PhysicalFormat) -> Result<()> {
        let asbd = props::to_asbd(format);
        props::set(
            stream.0,
            &props::global(kAudioStreamPropertyPhysicalFormat),
            &asbd,
            "set physical format",
        )
    }

    fn virtual_format(&self, stream: StreamId) -> Result<PhysicalFormat> {
        let asbd: AudioStreamBasicDescription = props::get(
            stream.0,
            &props::global(kAudioStreamPropertyVirtualFormat),
            "read virtual format",
        )?;
        Ok(props::from_asbd(&asbd))
    }

    fn latency_property(&self, device: DeviceId, property: LatencyProperty) -> Result<u32> {
        let (selector, operation) = match property {
            LatencyProperty::DeviceLatency => (kAudioDevicePropertyLatency, "read device latency"),
            LatencyProperty::BufferFrameSize => {
                (kAudioDevicePropertyBufferFrameSize, "read buffer frame size")
            }
            LatencyProperty::SafetyOffset => {
                (kAudioDevicePropertySafetyOffset, "read safety offset")
            }
        };
        props::get::<UInt32>(device.0, &props::output(selector), operation)
    }

    fn add_listener(
        &self,
        source: NotificationSource,
        listener: Arc<dyn PropertyListener>,
    ) -> Result<()> {
        self.listeners.add(source, listener)
    }

    fn remove_listener(
        &self,
        source: NotificationSource,
        listener: &Arc<dyn PropertyListener>,
    ) -> Result<()> {
        self.listeners.remove(source, listener)
    }

    fn create_io_proc(&self, device: DeviceId, servicer: Arc<RenderServicer>) -> Result<IoProcId> {
        self.io_procs.create(device, servicer)
    }

    fn destroy_io_proc(&self, device: DeviceId, proc_id: IoProcId) -> Result<()> {
        self.io_procs.destroy(device, proc_id)
    }

    fn start_io_proc(&self, device: DeviceId, proc_id: IoProcId) -> Result<()> {
        self.io_procs.start(device, proc_id)
    }

    fn stop_io_proc(&self, device: DeviceId, proc_id: IoProcId) -> Result<()> {
        self.io_procs.stop(device, proc_id)
    }
}
