//! Exclusive ("hog mode") audio output.
//!
//! The [`exclusive::ExclusiveDriver`] acquires a device through an
//! [`hw::AudioHardware`] backend, negotiates a physical stream format and
//! feeds the device from a host-supplied [`host::AudioSource`] on the
//! device's own clock.

pub mod error;
pub mod exclusive;
pub mod format;
pub mod host;
pub mod hw;

pub use error::{Error, OsStatus, Result};
pub use exclusive::{ExclusiveDriver, Stage};
pub use format::{FormatFamily, PhysicalFormat, SampleFormat};
pub use host::{AudioDriver, AudioSource, ChannelMapper, Clock, Host, OutputParams, ReloadSink};

/// The backend for the platform this was built for.
#[cfg(target_os = "macos")]
pub type PlatformHardware = hw::coreaudio::CoreAudioHardware;

/// Clock matching [`PlatformHardware`]'s callback timestamps.
#[cfg(target_os = "macos")]
pub type PlatformClock = hw::coreaudio::clock::HostClock;
