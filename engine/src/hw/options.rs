use crate::error::{Error, Result};
use crate::hw::config::{
    DEVICE_ENV, DISABLE_MIXING_ENV, EXCLUSIVE_ENV, SWITCH_TIMEOUT_ENV, env_flag, env_value,
};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DriverOptions {
    /// Device name or UID; the default output device when unset.
    pub device: Option<String>,
    /// Take hog mode on the device.
    pub exclusive: bool,
    pub disable_mixing: bool,
    pub format_switch_timeout_ms: u64,
    pub format_switch_poll_ms: u64,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            device: None,
            exclusive: true,
            disable_mixing: true,
            format_switch_timeout_ms: 2000,
            format_switch_poll_ms: 50,
        }
    }
}

impl DriverOptions {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let options: DriverOptions =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Apply `HOGOUT_*` environment overrides on top of these options.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(device) = env_value(DEVICE_ENV) {
            self.device = Some(device);
        }
        if env_value(EXCLUSIVE_ENV).is_some() {
            self.exclusive = env_flag(EXCLUSIVE_ENV);
        }
        if env_value(DISABLE_MIXING_ENV).is_some() {
            self.disable_mixing = env_flag(DISABLE_MIXING_ENV);
        }
        if let Some(ms) = env_value(SWITCH_TIMEOUT_ENV) {
            self.format_switch_timeout_ms = ms
                .parse()
                .map_err(|_| Error::Config(format!("{SWITCH_TIMEOUT_ENV}={ms} is not a number")))?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.format_switch_poll_ms == 0 {
            return Err(Error::Config(
                "format_switch_poll_ms must be greater than zero".to_string(),
            ));
        }
        if self.format_switch_timeout_ms < self.format_switch_poll_ms {
            return Err(Error::Config(
                "format_switch_timeout_ms must be at least one poll interval".to_string(),
            ));
        }
        Ok(())
    }

    pub fn format_switch_timeout(&self) -> Duration {
        Duration::from_millis(self.format_switch_timeout_ms)
    }

    pub fn format_switch_poll(&self) -> Duration {
        Duration::from_millis(self.format_switch_poll_ms)
    }
}
