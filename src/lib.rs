//! Force feedback call interception, tracing and replay for Linux event devices.
//!
//! Force feedback on Linux travels over a handful of calls on an evdev node: `EVIOCSFF` uploads
//! or updates an effect, `EVIOCRMFF` erases it, `EVIOCGBIT(EV_FF)` and `EVIOCGEFFECTS` report
//! capabilities, and `write`s of `EV_FF` events play, stop and tune effects. This crate sits on
//! that path:
//!
//! - An [`Interceptor`] routes those calls for one configured device. It can work around driver
//!   quirks (see [`Policies`]), coalesce bursts of effect updates, and record every operation to
//!   a trace file.
//! - A [`Replayer`] reads such a trace back and drives a live device with it, mapping the effect
//!   ids the recording session saw to the ones the live driver hands out.
//!
//! Everything is configured through `FFBTOOLS_*` environment variables, see [`Config`]:
//!
//! ```no_run
//! use ffbtools::Interceptor;
//!
//! // FFBTOOLS_DEV_MAJOR=13 FFBTOOLS_DEV_MINOR=69 FFBTOOLS_LOGGER=1 FFBTOOLS_LOG_FILE=/tmp/ffb.log
//! let interceptor = Interceptor::from_env();
//! # let fd = 3;
//! # let mut effect = ffbtools::sys::ff_effect::zeroed();
//! interceptor.upload_effect(fd, &mut effect)?;
//! # Ok::<(), nix::Error>(())
//! ```
//!
//! Replaying a recorded trace:
//!
//! ```no_run
//! # fn main() -> Result<(), ffbtools::Error> {
//! use std::os::unix::io::AsRawFd;
//! use ffbtools::{Device, KernelDriver, Replayer};
//!
//! let device = Device::open("/dev/input/event5")?;
//! let summary = Replayer::new(KernelDriver, device.as_raw_fd()).play_file("/tmp/ffb.log")?;
//! println!("{} operations sent", summary.forwarded);
//! # Ok(())
//! # }
//! ```

#![cfg(any(unix, target_os = "android"))]
#![allow(non_camel_case_types)]

// has to be first for its macro
#[macro_use]
mod attribute_set;

mod compat;
mod config;
mod constants;
mod driver;
mod error;
mod ff;
mod filter;
mod intercept;
mod normalize;
pub mod record;
mod replay;
pub mod sys;
mod throttle;
mod trace;

use std::fmt;

pub use attribute_set::{AttributeSet, AttributeSetRef, AttributeSetRefIter};
pub use config::{Config, Policies, DEFAULT_THROTTLE_INTERVAL};
pub use constants::*;
pub use driver::{Device, Driver, KernelDriver};
pub use error::{Error, ParseError};
pub use ff::*;
pub use filter::{DescriptorFilter, DeviceNumber};
pub use intercept::Interceptor;
pub use normalize::{Fix, Normalizer, UploadVerdict};
pub use replay::{Clock, IdentifierMap, MonotonicClock, ReplaySummary, Replayer, MAX_REPLAY_ID};
pub use throttle::{Deferral, Throttle, MAX_EFFECT_ID};
pub use trace::TraceLogger;

/// Helpers for building raw `input_event` buffers.
pub mod event {
    pub use crate::compat::input_event;
    pub use crate::driver::{cast_to_bytes, ff_event, first_event};
}

/// An error that can occur when parsing a code name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumParseError(());

impl fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown code name")
    }
}

impl std::error::Error for EnumParseError {}
