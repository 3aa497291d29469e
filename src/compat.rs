//! Compatibility layer for non-Linux builds.
//!
//! The force feedback structs and `input_event` come straight from libc on Linux-like targets.

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(any(
        target_os = "linux",
        target_os = "l4re",
        target_os = "android",
        target_os = "emscripten"
    ))] {
        pub use libc::{
            ff_condition_effect, ff_constant_effect, ff_envelope, ff_periodic_effect, ff_ramp_effect,
            ff_replay, ff_rumble_effect, ff_trigger, input_event, FF_CNT,
        };
    } else {
        mod non_linux;
        pub use non_linux::{
            ff_condition_effect, ff_constant_effect, ff_envelope, ff_periodic_effect, ff_ramp_effect,
            ff_replay, ff_rumble_effect, ff_trigger, input_event, FF_CNT,
        };
    }
}
