//! Hog mode: exclusive ownership of a device by one process.

use crate::error::{Error, Result};
use crate::hw::{AudioHardware, DeviceId};

/// Proof of hog-mode ownership. Releasing it is idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HogToken {
    owner: Option<i32>,
}

impl HogToken {
    /// A token that owns nothing; releasing it is a no-op.
    pub const fn unheld() -> Self {
        Self { owner: None }
    }

    pub fn is_held(&self) -> bool {
        self.owner.is_some()
    }
}

pub fn current_pid() -> i32 {
    std::process::id() as i32
}

/// Take hog mode on `device` for this process.
///
/// Fails with [`Error::AlreadyHeld`] when another process owns the device and
/// with a hardware error when the HAL refuses the request.
pub fn acquire_exclusive<H: AudioHardware + ?Sized>(hw: &H, device: DeviceId) -> Result<HogToken> {
    let pid = current_pid();
    match hw.hog_mode_owner(device) {
        Ok(Some(owner)) if owner != pid => return Err(Error::AlreadyHeld(owner)),
        Ok(Some(_)) => {
            tracing::debug!("{device} is already hogged by this process");
        }
        Ok(None) => {}
        Err(e) => tracing::debug!("could not read hog mode owner: {e}"),
    }

    hw.set_hog_mode(device, Some(pid))?;
    tracing::debug!("hog mode taken on {device} by pid {pid}");
    Ok(HogToken { owner: Some(pid) })
}

/// Give hog mode back. Only a token held by this process touches the device,
/// and the token is cleared before the HAL is called so a second release is
/// always a no-op.
pub fn release_exclusive<H: AudioHardware + ?Sized>(
    hw: &H,
    device: DeviceId,
    token: &mut HogToken,
) -> Result<()> {
    let Some(owner) = token.owner.take() else {
        tracing::debug!("hog mode on {device} not held, nothing to release");
        return Ok(());
    };
    if owner != current_pid() {
        tracing::debug!("hog mode on {device} belongs to pid {owner}, not releasing");
        return Ok(());
    }
    hw.set_hog_mode(device, None)?;
    tracing::debug!("hog mode released on {device}");
    Ok(())
}
