//! Sample formats on both sides of the driver.
//!
//! `SampleFormat` is what the application hands us, `PhysicalFormat` mirrors
//! CoreAudio's `AudioStreamBasicDescription` and is what the hardware offers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::fourcc;

pub const FORMAT_LINEAR_PCM: u32 = fourcc(b"lpcm") as u32;
pub const FORMAT_AC3: u32 = fourcc(b"ac-3") as u32;
pub const FORMAT_60958_AC3: u32 = fourcc(b"cac3") as u32;
pub const FORMAT_IAC3: u32 = fourcc(b"IAC3") as u32;
pub const FORMAT_IAC3_LOWER: u32 = fourcc(b"iac3") as u32;

pub const FLAG_IS_FLOAT: u32 = 1 << 0;
pub const FLAG_IS_BIG_ENDIAN: u32 = 1 << 1;
pub const FLAG_IS_SIGNED_INTEGER: u32 = 1 << 2;
pub const FLAG_IS_PACKED: u32 = 1 << 3;
pub const FLAG_IS_ALIGNED_HIGH: u32 = 1 << 4;
pub const FLAG_IS_NON_INTERLEAVED: u32 = 1 << 5;

#[cfg(target_endian = "big")]
const FLAG_NATIVE_ENDIAN: u32 = FLAG_IS_BIG_ENDIAN;
#[cfg(target_endian = "little")]
const FLAG_NATIVE_ENDIAN: u32 = 0;

/// Upper bound on channels per frame we are willing to drive.
pub const MAX_CHANNELS: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatFamily {
    Pcm,
    Compressed,
}

impl FormatFamily {
    pub fn of_format_id(format_id: u32) -> Option<Self> {
        match format_id {
            FORMAT_LINEAR_PCM => Some(FormatFamily::Pcm),
            FORMAT_AC3 | FORMAT_60958_AC3 | FORMAT_IAC3 | FORMAT_IAC3_LOWER => {
                Some(FormatFamily::Compressed)
            }
            _ => None,
        }
    }
}

/// Application-facing sample format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    U8,
    S16,
    S24,
    S32,
    F32,
    F64,
    S16P,
    S32P,
    F32P,
    F64P,
    /// IEC 61937 framed AC-3, carried as 16-bit stereo pseudo-frames.
    Spdif,
}

impl SampleFormat {
    pub fn is_planar(self) -> bool {
        matches!(
            self,
            SampleFormat::S16P | SampleFormat::S32P | SampleFormat::F32P | SampleFormat::F64P
        )
    }

    pub fn is_spdif(self) -> bool {
        self == SampleFormat::Spdif
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            SampleFormat::F32 | SampleFormat::F64 | SampleFormat::F32P | SampleFormat::F64P
        )
    }

    pub fn family(self) -> FormatFamily {
        if self.is_spdif() {
            FormatFamily::Compressed
        } else {
            FormatFamily::Pcm
        }
    }

    pub fn to_packed(self) -> Self {
        match self {
            SampleFormat::S16P => SampleFormat::S16,
            SampleFormat::S32P => SampleFormat::S32,
            SampleFormat::F32P => SampleFormat::F32,
            SampleFormat::F64P => SampleFormat::F64,
            other => other,
        }
    }

    pub fn bytes_per_sample(self) -> u32 {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16 | SampleFormat::S16P | SampleFormat::Spdif => 2,
            SampleFormat::S24 => 3,
            SampleFormat::S32 | SampleFormat::S32P | SampleFormat::F32 | SampleFormat::F32P => 4,
            SampleFormat::F64 | SampleFormat::F64P => 8,
        }
    }
}

/// Mirror of `AudioStreamBasicDescription`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicalFormat {
    pub sample_rate: f64,
    pub format_id: u32,
    pub format_flags: u32,
    pub bytes_per_packet: u32,
    pub frames_per_packet: u32,
    pub bytes_per_frame: u32,
    pub channels_per_frame: u32,
    pub bits_per_channel: u32,
}

impl PhysicalFormat {
    /// Build the packed, native-endian descriptor an application format asks for.
    pub fn for_request(format: SampleFormat, sample_rate: u32, channels: u32) -> Self {
        let format = format.to_packed();
        let mut flags = FLAG_IS_PACKED | FLAG_NATIVE_ENDIAN;
        if format.is_float() {
            flags |= FLAG_IS_FLOAT;
        } else if format != SampleFormat::U8 {
            flags |= FLAG_IS_SIGNED_INTEGER;
        }
        let format_id = if format.is_spdif() {
            FORMAT_60958_AC3
        } else {
            FORMAT_LINEAR_PCM
        };
        let bits = format.bytes_per_sample() * 8;
        let bytes_per_frame = channels * (bits / 8);
        PhysicalFormat {
            sample_rate: sample_rate as f64,
            format_id,
            format_flags: flags,
            bytes_per_packet: bytes_per_frame,
            frames_per_packet: 1,
            bytes_per_frame,
            channels_per_frame: channels,
            bits_per_channel: bits,
        }
    }

    pub fn family(&self) -> Option<FormatFamily> {
        FormatFamily::of_format_id(self.format_id)
    }

    /// Whether the descriptor can be described and driven at all.
    pub fn is_valid(&self) -> bool {
        let Some(family) = self.family() else {
            return false;
        };
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return false;
        }
        if self.channels_per_frame == 0 || self.channels_per_frame > MAX_CHANNELS {
            return false;
        }
        match family {
            FormatFamily::Compressed => true,
            FormatFamily::Pcm => self.sample_format().is_some(),
        }
    }

    /// Map the descriptor back to an application sample format.
    ///
    /// Non-interleaved, foreign-endian and padded layouts (24 bits in a
    /// 4-byte container, say) have no packed counterpart and return `None`.
    pub fn sample_format(&self) -> Option<SampleFormat> {
        match self.family()? {
            FormatFamily::Compressed => Some(SampleFormat::Spdif),
            FormatFamily::Pcm => {
                if self.format_flags & FLAG_IS_NON_INTERLEAVED != 0 {
                    return None;
                }
                if self.format_flags & FLAG_IS_PACKED == 0 && self.bits_per_channel > 8 {
                    return None;
                }
                if self.format_flags & FLAG_IS_BIG_ENDIAN != FLAG_NATIVE_ENDIAN
                    && self.bits_per_channel > 8
                {
                    return None;
                }
                if self.format_flags & FLAG_IS_FLOAT != 0 {
                    let format = match self.bits_per_channel {
                        32 => SampleFormat::F32,
                        64 => SampleFormat::F64,
                        _ => return None,
                    };
                    return Some(format).filter(|f| self.bytes_per_frame == self.frame_bytes(*f));
                }
                let signed = self.format_flags & FLAG_IS_SIGNED_INTEGER != 0;
                let format = match (self.bits_per_channel, signed) {
                    (8, false) => SampleFormat::U8,
                    (16, true) => SampleFormat::S16,
                    (24, true) => SampleFormat::S24,
                    (32, true) => SampleFormat::S32,
                    _ => return None,
                };
                Some(format).filter(|f| self.bytes_per_frame == self.frame_bytes(*f))
            }
        }
    }

    fn frame_bytes(&self, format: SampleFormat) -> u32 {
        format.bytes_per_sample() * self.channels_per_frame
    }

    /// Structural equality as the HAL reports it; unlike `==` this treats
    /// the sample rates as equal when they round to the same integer rate.
    pub fn same_layout(&self, other: &PhysicalFormat) -> bool {
        self.sample_rate.round() == other.sample_rate.round()
            && self.format_id == other.format_id
            && self.format_flags == other.format_flags
            && self.bytes_per_packet == other.bytes_per_packet
            && self.frames_per_packet == other.frames_per_packet
            && self.bytes_per_frame == other.bytes_per_frame
            && self.channels_per_frame == other.channels_per_frame
            && self.bits_per_channel == other.bits_per_channel
    }
}

impl fmt::Display for PhysicalFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = crate::error::fourcc_repr(self.format_id)
            .unwrap_or_else(|| format!("{:#010x}", self.format_id));
        write!(
            f,
            "{:.0}Hz '{}' {}ch {}bit flags={:#x} [{}bpp {}fpp {}bpf]",
            self.sample_rate,
            id,
            self.channels_per_frame,
            self.bits_per_channel,
            self.format_flags,
            self.bytes_per_packet,
            self.frames_per_packet,
            self.bytes_per_frame,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_descriptor_is_packed_and_signed() {
        let fmt = PhysicalFormat::for_request(SampleFormat::S16, 48_000, 2);
        assert_eq!(fmt.format_id, FORMAT_LINEAR_PCM);
        assert_eq!(fmt.bits_per_channel, 16);
        assert_eq!(fmt.bytes_per_frame, 4);
        assert_ne!(fmt.format_flags & FLAG_IS_PACKED, 0);
        assert_ne!(fmt.format_flags & FLAG_IS_SIGNED_INTEGER, 0);
        assert_eq!(fmt.sample_format(), Some(SampleFormat::S16));
    }

    #[test]
    fn planar_request_becomes_packed() {
        let fmt = PhysicalFormat::for_request(SampleFormat::F32P, 44_100, 6);
        assert_eq!(fmt.sample_format(), Some(SampleFormat::F32));
        assert_eq!(fmt.bytes_per_frame, 24);
    }

    #[test]
    fn spdif_request_is_compressed() {
        let fmt = PhysicalFormat::for_request(SampleFormat::Spdif, 48_000, 2);
        assert_eq!(fmt.family(), Some(FormatFamily::Compressed));
        assert_eq!(fmt.sample_format(), Some(SampleFormat::Spdif));
    }

    #[test]
    fn non_interleaved_has_no_sample_format() {
        let mut fmt = PhysicalFormat::for_request(SampleFormat::F32, 48_000, 2);
        fmt.format_flags |= FLAG_IS_NON_INTERLEAVED;
        assert_eq!(fmt.sample_format(), None);
    }

    #[test]
    fn padded_24_bit_has_no_sample_format() {
        let mut fmt = PhysicalFormat::for_request(SampleFormat::S24, 48_000, 2);
        fmt.format_flags = (fmt.format_flags & !FLAG_IS_PACKED) | FLAG_IS_ALIGNED_HIGH;
        fmt.bytes_per_frame = 8;
        fmt.bytes_per_packet = 8;
        assert_eq!(fmt.sample_format(), None);
        assert!(!fmt.is_valid());

        // Packed flag alone is not enough when the frame size disagrees.
        fmt.format_flags |= FLAG_IS_PACKED;
        assert_eq!(fmt.sample_format(), None);
    }

    #[test]
    fn validity_rejects_unknown_ids_and_empty_frames() {
        let mut fmt = PhysicalFormat::for_request(SampleFormat::S16, 48_000, 2);
        assert!(fmt.is_valid());
        fmt.channels_per_frame = 0;
        assert!(!fmt.is_valid());
        let unknown = PhysicalFormat {
            format_id: fourcc(b"zzzz") as u32,
            ..PhysicalFormat::for_request(SampleFormat::S16, 48_000, 2)
        };
        assert!(!unknown.is_valid());
        assert!(!PhysicalFormat::default().is_valid());
    }
}
