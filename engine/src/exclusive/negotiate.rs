//! Pick the hardware physical format closest to what the host asked for.

use crate::error::{Error, Result};
use crate::format::PhysicalFormat;
use std::cmp::Ordering;

/// Return the best candidate for `desired`.
///
/// The first valid candidate is taken as-is; later candidates only replace it
/// when [`is_better`] ranks them strictly higher, so ties go to the earlier
/// entry and the result is always a member of `candidates`.
pub fn select_best_format(
    desired: &PhysicalFormat,
    candidates: &[PhysicalFormat],
) -> Result<PhysicalFormat> {
    let mut best: Option<&PhysicalFormat> = None;
    for candidate in candidates {
        tracing::debug!("- {candidate}");
        if !candidate.is_valid() {
            continue;
        }
        best = match best {
            None => Some(candidate),
            Some(current) if is_better(desired, current, candidate) => Some(candidate),
            keep => keep,
        };
    }

    match best {
        Some(format) if format.family() == desired.family() => Ok(*format),
        _ => Err(Error::NoMatchingFormat(*desired)),
    }
}

/// Whether `candidate` fits `desired` strictly better than `current`.
///
/// Ranking, most significant first: same format family, closest sample rate,
/// more bits per channel, same channel count.
pub fn is_better(
    desired: &PhysicalFormat,
    current: &PhysicalFormat,
    candidate: &PhysicalFormat,
) -> bool {
    if !candidate.is_valid() {
        return false;
    }
    if !current.is_valid() {
        return true;
    }

    let family = desired.family();
    let candidate_family = candidate.family() == family;
    let current_family = current.family() == family;
    if candidate_family != current_family {
        return candidate_family;
    }

    let candidate_distance = (candidate.sample_rate - desired.sample_rate).abs();
    let current_distance = (current.sample_rate - desired.sample_rate).abs();
    match candidate_distance.partial_cmp(&current_distance) {
        Some(Ordering::Less) => return true,
        Some(Ordering::Greater) => return false,
        _ => {}
    }

    if candidate.bits_per_channel != current.bits_per_channel {
        return candidate.bits_per_channel > current.bits_per_channel;
    }

    let candidate_channels = candidate.channels_per_frame == desired.channels_per_frame;
    let current_channels = current.channels_per_frame == desired.channels_per_frame;
    candidate_channels && !current_channels
}
