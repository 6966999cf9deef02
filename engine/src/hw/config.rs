pub const DEVICE_ENV: &str = "HOGOUT_DEVICE";
pub const EXCLUSIVE_ENV: &str = "HOGOUT_EXCLUSIVE";
pub const DISABLE_MIXING_ENV: &str = "HOGOUT_DISABLE_MIXING";
pub const SWITCH_TIMEOUT_ENV: &str = "HOGOUT_SWITCH_TIMEOUT_MS";

pub fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn env_flag(key: &str) -> bool {
    env_value(key).map(|v| parse_flag(&v)).unwrap_or(false)
}

pub fn parse_flag(value: &str) -> bool {
    let s = value.trim().to_ascii_lowercase();
    s == "1" || s == "true" || s == "yes" || s == "on"
}
