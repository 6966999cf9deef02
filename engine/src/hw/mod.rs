pub mod config;
#[cfg(target_os = "macos")]
pub mod coreaudio;
pub mod options;
pub mod sim;
pub mod traits;

pub use self::traits::{
    AudioHardware, DeviceId, DeviceInfo, IoProcId, LatencyProperty, NotificationSource,
    PropertyListener, StreamDirection, StreamId,
};
