//! Process-wide settings, read once at start-up.
//!
//! Every knob has an `FFBTOOLS_*` environment variable. Problems never abort: an unusable value
//! leaves the affected feature disabled or at its default.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use crate::filter::DeviceNumber;

/// Throttle period used when none, or a nonsensical one, is configured.
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(3);

/// Device quirk corrections, each switched on independently.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Policies {
    /// Retry a failing effect update as a fresh upload.
    pub update_fix: bool,
    /// Nudge directions of exactly 0 or 0x8000 by a quarter turn.
    pub direction_fix: bool,
    /// Claim every effect type is supported and hide remove/upload failures.
    pub features_hack: bool,
    /// Turn every effect around.
    pub force_inversion: bool,
    /// Swallow gain changes instead of forwarding them.
    pub ignore_set_gain: bool,
    /// Rescale periodic offset and phase from DirectInput ranges.
    pub offset_fix: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    /// The device whose calls are instrumented. `None` makes interception a no-op.
    pub device: Option<DeviceNumber>,
    /// Free-form device description recorded in the trace header.
    pub device_name: Option<String>,
    /// Where trace lines are appended. `None` disables tracing.
    pub log_file: Option<PathBuf>,
    pub policies: Policies,
    /// Flush period for deferred uploads. `None` forwards uploads immediately.
    pub throttle: Option<Duration>,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars_os())
    }

    /// Builds the configuration from `FFBTOOLS_*` key/value pairs; other keys are ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        let mut major = None;
        let mut minor = None;
        let mut logger = false;
        let mut log_file = None;
        let mut config = Config::default();

        for (key, value) in vars {
            let (key, value) = (key.into(), value.into());
            let (Some(key), Some(value)) = (key.to_str(), value.to_str()) else {
                continue;
            };
            let switch = value == "1";
            match key {
                "FFBTOOLS_DEV_MAJOR" => major = leading_integer(value),
                "FFBTOOLS_DEV_MINOR" => minor = leading_integer(value),
                "FFBTOOLS_LOGGER" => logger = switch,
                "FFBTOOLS_LOG_FILE" => log_file = Some(PathBuf::from(value)),
                "FFBTOOLS_DEVICE_NAME" => config.device_name = Some(value.to_owned()),
                "FFBTOOLS_UPDATE_FIX" => config.policies.update_fix = switch,
                "FFBTOOLS_DIRECTION_FIX" => config.policies.direction_fix = switch,
                "FFBTOOLS_FEATURES_HACK" => config.policies.features_hack = switch,
                "FFBTOOLS_FORCE_INVERSION" => config.policies.force_inversion = switch,
                "FFBTOOLS_IGNORE_SET_GAIN" => config.policies.ignore_set_gain = switch,
                "FFBTOOLS_OFFSET_FIX" => config.policies.offset_fix = switch,
                "FFBTOOLS_THROTTLING" => config.throttle = throttle_interval(value),
                _ => {}
            }
        }

        config.device = match (major, minor) {
            (Some(major), Some(minor)) if major > 0 || minor > 0 => {
                match (u64::try_from(major), u64::try_from(minor)) {
                    (Ok(major), Ok(minor)) => Some(DeviceNumber::new(major, minor)),
                    _ => None,
                }
            }
            _ => None,
        };

        if logger {
            if log_file.is_none() {
                log::warn!("FFBTOOLS_LOGGER is set without FFBTOOLS_LOG_FILE, tracing disabled");
            }
            config.log_file = log_file;
        }

        config
    }

    /// One-line summary of the settings, written at the top of a new trace.
    pub fn describe(&self) -> String {
        let flag = |on: bool| u8::from(on);
        let p = &self.policies;
        format!(
            "DEVICE_NAME={}, UPDATE_FIX={}, DIRECTION_FIX={}, FEATURES_HACK={}, \
             FORCE_INVERSION={}, IGNORE_SET_GAIN={}, OFFSET_FIX={}, THROTTLING={}",
            self.device_name.as_deref().unwrap_or("(null)"),
            flag(p.update_fix),
            flag(p.direction_fix),
            flag(p.features_hack),
            flag(p.force_inversion),
            flag(p.ignore_set_gain),
            flag(p.offset_fix),
            self.throttle.map_or(0, |interval| interval.as_millis()),
        )
    }
}

/// `FFBTOOLS_THROTTLING`: unset or `0` disables, anything else enables with the value read as a
/// millisecond count.
fn throttle_interval(value: &str) -> Option<Duration> {
    if value == "0" {
        return None;
    }
    let interval = match leading_integer(value) {
        Some(millis) if millis >= 1 => Duration::from_millis(millis as u64),
        _ => DEFAULT_THROTTLE_INTERVAL,
    };
    Some(interval)
}

/// Reads a leading integer the way `strtol` with base 0 does: optional sign, then hex after
/// `0x`, octal after `0`, decimal otherwise. Trailing garbage is ignored.
pub(crate) fn leading_integer(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let (negative, text) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (radix, digits) = if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        (16, hex)
    } else if text.len() > 1 && text.starts_with('0') {
        (8, &text[1..])
    } else {
        (10, text)
    };

    let end = digits
        .find(|c: char| !c.is_digit(radix))
        .unwrap_or(digits.len());
    if end == 0 {
        // a lone "0" or "0x" prefix with nothing after it
        return text.starts_with('0').then_some(0);
    }
    let magnitude = i64::from_str_radix(&digits[..end], radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}
