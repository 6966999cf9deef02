use crate::error::Result;
use crate::hw::{AudioHardware, DeviceId};

/// What the device's software mixing looked like before we touched it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MixingState {
    previous: Option<bool>,
    changed: bool,
}

impl MixingState {
    pub const fn untouched() -> Self {
        Self {
            previous: None,
            changed: false,
        }
    }

    /// Mixing state observed before suppression, `None` if unsupported.
    pub fn previous(&self) -> Option<bool> {
        self.previous
    }

    pub fn changed(&self) -> bool {
        self.changed
    }
}

/// Turn software mixing off, recording the state it had.
pub fn disable_mixing<H: AudioHardware + ?Sized>(hw: &H, device: DeviceId) -> Result<MixingState> {
    if !hw.mixing_settable(device)? {
        tracing::debug!("{device} does not support changing mixing");
        return Ok(MixingState::untouched());
    }

    let enabled = hw.mixing_enabled(device)?;
    if enabled {
        hw.set_mixing_enabled(device, false)?;
        tracing::debug!("disabled mixing on {device}");
    }
    Ok(MixingState {
        previous: Some(enabled),
        changed: enabled,
    })
}

/// Put mixing back the way [`disable_mixing`] found it. Calling this again
/// with the same state does nothing.
pub fn restore_mixing<H: AudioHardware + ?Sized>(
    hw: &H,
    device: DeviceId,
    state: &mut MixingState,
) -> Result<()> {
    if !std::mem::take(&mut state.changed) {
        return Ok(());
    }
    let Some(previous) = state.previous else {
        return Ok(());
    };
    hw.set_mixing_enabled(device, previous)?;
    tracing::debug!("restored mixing on {device} to {previous}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::sim::SimHardware;

    const DEVICE: DeviceId = DeviceId(1);

    #[test]
    fn restores_exactly_what_was_found() {
        let hw = SimHardware::with_default_device();
        let mut state = disable_mixing(&hw, DEVICE).unwrap();
        assert_eq!(state.previous(), Some(true));
        assert!(state.changed());
        assert_eq!(hw.mixing(DEVICE), Some(false));

        restore_mixing(&hw, DEVICE, &mut state).unwrap();
        assert_eq!(hw.mixing(DEVICE), Some(true));

        hw.clear_events();
        restore_mixing(&hw, DEVICE, &mut state).unwrap();
        assert!(hw.events().is_empty());
    }
}
