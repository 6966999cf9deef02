use crate::error::{Error, Result};
use crate::format::FormatFamily;
use crate::hw::{AudioHardware, DeviceId, StreamDirection, StreamId};

/// Pick the sub-stream the session will drive.
///
/// Devices can expose several sub-streams and it is not obvious what devices
/// with more than one output stream expect, so the first output stream that
/// can carry `family` is used and the rest are ignored.
pub fn select_stream<H: AudioHardware + ?Sized>(
    hw: &H,
    device: DeviceId,
    family: FormatFamily,
) -> Result<(StreamId, usize)> {
    let streams = hw.streams(device)?;
    for (idx, &stream) in streams.iter().enumerate() {
        match hw.stream_direction(stream) {
            Ok(StreamDirection::Output) => {}
            Ok(StreamDirection::Input) => {
                tracing::debug!("substream {idx} is not an output stream");
                continue;
            }
            Err(e) => tracing::warn!("could not get direction of substream {idx}: {e}"),
        }

        if family == FormatFamily::Pcm || supports_compressed(hw, stream) {
            tracing::debug!("using substream {idx}/{}", streams.len());
            return Ok((stream, idx));
        }
    }

    tracing::error!("no usable substream found on {device}");
    Err(Error::NoUsableStream)
}

/// Whether the stream offers any compressed passthrough format.
pub fn supports_compressed<H: AudioHardware + ?Sized>(hw: &H, stream: StreamId) -> bool {
    match hw.available_physical_formats(stream) {
        Ok(formats) => formats
            .iter()
            .any(|f| f.family() == Some(FormatFamily::Compressed)),
        Err(e) => {
            tracing::warn!("could not get formats of {stream}: {e}");
            false
        }
    }
}
