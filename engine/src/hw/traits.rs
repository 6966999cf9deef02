use crate::error::Result;
use crate::exclusive::render::RenderServicer;
use crate::format::PhysicalFormat;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct StreamId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IoProcId(pub usize);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device {}", self.0)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream {}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub id: DeviceId,

    pub name: String,

    pub uid: String,

    pub output_channels: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    Output,
    Input,
}

/// Device properties that add up to the base output latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LatencyProperty {
    DeviceLatency,
    BufferFrameSize,
    SafetyOffset,
}

impl LatencyProperty {
    pub const ALL: [LatencyProperty; 3] = [
        LatencyProperty::DeviceLatency,
        LatencyProperty::BufferFrameSize,
        LatencyProperty::SafetyOffset,
    ];

    pub fn fourcc(self) -> &'static str {
        match self {
            LatencyProperty::DeviceLatency => "ltnc",
            LatencyProperty::BufferFrameSize => "fsiz",
            LatencyProperty::SafetyOffset => "saft",
        }
    }
}

/// Where reconfiguration notifications come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationSource {
    /// The device reports that something about it changed.
    DeviceHasChanged(DeviceId),
    /// A device was added to or removed from the system.
    DeviceList,
}

pub trait PropertyListener: Send + Sync {
    fn property_changed(&self, source: NotificationSource);
}

/// The slice of the audio HAL the exclusive driver drives.
///
/// Implementations must be callable from the control thread and from the
/// HAL's notification context at the same time.
pub trait AudioHardware: Send + Sync + 'static {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Resolve a device by name or UID; `None` or an empty name selects the
    /// default output device.
    fn resolve_device(&self, name: Option<&str>) -> Result<DeviceId>;

    fn device_is_alive(&self, device: DeviceId) -> Result<bool>;

    /// Process currently hogging the device, if any.
    fn hog_mode_owner(&self, device: DeviceId) -> Result<Option<i32>>;

    /// Take hog mode for `owner`, or release it with `None`.
    fn set_hog_mode(&self, device: DeviceId, owner: Option<i32>) -> Result<()>;

    /// Whether mixing exists on the device and can be changed.
    fn mixing_settable(&self, device: DeviceId) -> Result<bool>;

    fn mixing_enabled(&self, device: DeviceId) -> Result<bool>;

    fn set_mixing_enabled(&self, device: DeviceId, enabled: bool) -> Result<()>;

    fn streams(&self, device: DeviceId) -> Result<Vec<StreamId>>;

    fn stream_direction(&self, stream: StreamId) -> Result<StreamDirection>;

    fn available_physical_formats(&self, stream: StreamId) -> Result<Vec<PhysicalFormat>>;

    fn physical_format(&self, stream: StreamId) -> Result<PhysicalFormat>;

    /// Request a physical format change. The change may land asynchronously.
    fn set_physical_format(&self, stream: StreamId, format: &PhysicalFormat) -> Result<()>;

    fn virtual_format(&self, stream: StreamId) -> Result<PhysicalFormat>;

    fn latency_property(&self, device: DeviceId, property: LatencyProperty) -> Result<u32>;

    fn add_listener(
        &self,
        source: NotificationSource,
        listener: Arc<dyn PropertyListener>,
    ) -> Result<()>;

    fn remove_listener(
        &self,
        source: NotificationSource,
        listener: &Arc<dyn PropertyListener>,
    ) -> Result<()>;

    /// Register the render callback. It is not invoked until started.
    fn create_io_proc(&self, device: DeviceId, servicer: Arc<RenderServicer>) -> Result<IoProcId>;

    fn destroy_io_proc(&self, device: DeviceId, proc_id: IoProcId) -> Result<()>;

    fn start_io_proc(&self, device: DeviceId, proc_id: IoProcId) -> Result<()>;

    fn stop_io_proc(&self, device: DeviceId, proc_id: IoProcId) -> Result<()>;
}
