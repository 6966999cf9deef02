use crate::exclusive::Stage;
use crate::format::PhysicalFormat;
use std::fmt;

/// Raw status code returned by the audio HAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OsStatus(pub i32);

impl OsStatus {
    pub const NO_ERROR: OsStatus = OsStatus(0);
    pub const NOT_RUNNING: OsStatus = OsStatus(fourcc(b"stop"));
    pub const UNSPECIFIED: OsStatus = OsStatus(fourcc(b"what"));
    pub const UNKNOWN_PROPERTY: OsStatus = OsStatus(fourcc(b"who?"));
    pub const BAD_PROPERTY_SIZE: OsStatus = OsStatus(fourcc(b"!siz"));
    pub const ILLEGAL_OPERATION: OsStatus = OsStatus(fourcc(b"nope"));
    pub const BAD_OBJECT: OsStatus = OsStatus(fourcc(b"!obj"));
    pub const BAD_DEVICE: OsStatus = OsStatus(fourcc(b"!dev"));
    pub const BAD_STREAM: OsStatus = OsStatus(fourcc(b"!str"));
    pub const UNSUPPORTED_OPERATION: OsStatus = OsStatus(fourcc(b"unop"));
    pub const PERMISSIONS: OsStatus = OsStatus(fourcc(b"!hog"));

    pub fn is_ok(self) -> bool {
        self.0 == 0
    }

    fn symbol(self) -> Option<&'static str> {
        Some(match self {
            Self::NO_ERROR => "kAudioHardwareNoError",
            Self::NOT_RUNNING => "kAudioHardwareNotRunningError",
            Self::UNSPECIFIED => "kAudioHardwareUnspecifiedError",
            Self::UNKNOWN_PROPERTY => "kAudioHardwareUnknownPropertyError",
            Self::BAD_PROPERTY_SIZE => "kAudioHardwareBadPropertySizeError",
            Self::ILLEGAL_OPERATION => "kAudioHardwareIllegalOperationError",
            Self::BAD_OBJECT => "kAudioHardwareBadObjectError",
            Self::BAD_DEVICE => "kAudioHardwareBadDeviceError",
            Self::BAD_STREAM => "kAudioHardwareBadStreamError",
            Self::UNSUPPORTED_OPERATION => "kAudioHardwareUnsupportedOperationError",
            Self::PERMISSIONS => "kAudioDevicePermissionsError",
            _ => return None,
        })
    }
}

/// Format a status code for humans.
///
/// Known HAL codes get their symbolic name, printable four-character codes are
/// shown quoted, anything else falls back to decimal and hex.
impl fmt::Display for OsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.symbol() {
            return write!(f, "{name} ({})", self.0);
        }
        match fourcc_repr(self.0 as u32) {
            Some(code) => write!(f, "'{code}' ({})", self.0),
            None => write!(f, "OSStatus {} ({:#X})", self.0, self.0),
        }
    }
}

pub(crate) const fn fourcc(code: &[u8; 4]) -> i32 {
    i32::from_be_bytes(*code)
}

/// Render a selector or status as its four-character code when printable.
pub fn fourcc_repr(code: u32) -> Option<String> {
    let bytes = code.to_be_bytes();
    if bytes.iter().all(|b| (0x20..0x7f).contains(b)) {
        Some(bytes.iter().map(|&b| b as char).collect())
    } else {
        None
    }
}

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("CoreAudio {operation} failed: {status}")]
    Hardware {
        operation: &'static str,
        status: OsStatus,
    },

    #[error("audio device not found: {0}")]
    DeviceNotFound(String),

    #[error("device is exclusively held by process {0}")]
    AlreadyHeld(i32),

    #[error("no usable output substream found")]
    NoUsableStream,

    #[error("no physical format found for {0}")]
    NoMatchingFormat(PhysicalFormat),

    #[error("timed out waiting for the stream to switch to {0}")]
    FormatSwitchTimeout(PhysicalFormat),

    #[error("channel map initialization failed: {0}")]
    ChannelMap(String),

    #[error("number of channels changed ({requested} -> {hardware}) and layout is unknown")]
    ChannelCountChanged { requested: u32, hardware: u32 },

    #[error("hardware format not supported: {0}")]
    UnsupportedHardwareFormat(PhysicalFormat),

    #[error("driver is already initialized")]
    AlreadyInitialized,

    #[error("{stage} failed: {source}")]
    Acquire {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn hardware(operation: &'static str, status: OsStatus) -> Self {
        Error::Hardware { operation, status }
    }

    /// Stage an acquisition failure happened in, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Acquire { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
