//! The interposition layer.
//!
//! An [`Interceptor`] sits between an application and the force feedback driver. Calls on the
//! configured device are corrected, traced and possibly deferred; everything else goes straight
//! to the driver. A thin shim that overrides `ioctl` and `write` only has to route calls through
//! [`Interceptor::ioctl`] and [`Interceptor::write`].

use std::os::unix::io::RawFd;
use std::sync::Arc;

use nix::sys::ioctl::ioctl_num_type;

use crate::config::Config;
use crate::constants::{EventType, FFEffectCode, FF_MAX_EFFECTS};
use crate::driver::{first_event, Driver, KernelDriver};
use crate::ff::FFEffectDescriptor;
use crate::filter::DescriptorFilter;
use crate::normalize::{Normalizer, UploadVerdict};
use crate::record::{Request, Response};
use crate::sys;
use crate::throttle::{Deferral, Throttle, MAX_EFFECT_ID};
use crate::trace::TraceLogger;
use crate::AttributeSetRef;

/// Shown after a `>` line, explaining the operation to someone reading the trace.
const UPLOAD_NOTE: &str = "# Upload effect to device.";
const REMOVE_NOTE: &str = "# Remove effect from memory.";
const QUERY_NOTE: &str = "# Query force feedback features.";
const SLOTS_NOTE: &str = "# Get maximum number of simultaneous effects in memory.";

pub struct Interceptor<D: Driver + 'static = KernelDriver> {
    filter: DescriptorFilter,
    normalizer: Normalizer,
    driver: Arc<D>,
    throttle: Option<Throttle<D>>,
    trace: TraceLogger,
}

impl Interceptor<KernelDriver> {
    /// Reads the configuration from the environment and talks to the kernel.
    pub fn from_env() -> Self {
        Self::new(&Config::from_env(), KernelDriver)
    }
}

impl<D: Driver + 'static> Interceptor<D> {
    pub fn new(config: &Config, driver: D) -> Self {
        let trace = TraceLogger::from_config(config);
        Self::with_trace(config, driver, trace)
    }

    /// Like [`Interceptor::new`], but traces to `trace` instead of the configured file.
    pub fn with_trace(config: &Config, driver: D, trace: TraceLogger) -> Self {
        let driver = Arc::new(driver);
        let throttle = config.throttle.and_then(|interval| {
            Throttle::new(Arc::clone(&driver), interval)
                .map_err(|e| log::warn!("cannot start throttle timer, throttling disabled: {}", e))
                .ok()
        });

        let filter = DescriptorFilter::new(config.device);
        match filter.target() {
            Some(device) => log::debug!(
                "instrumenting device {}, throttle {:?}",
                device,
                throttle.as_ref().map(Throttle::interval)
            ),
            None => log::debug!("no device configured, calls pass through"),
        }

        Self {
            filter,
            normalizer: Normalizer::new(config.policies),
            driver,
            throttle,
            trace,
        }
    }

    pub fn is_target(&self, fd: RawFd) -> bool {
        self.filter.is_target(fd)
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn throttle(&self) -> Option<&Throttle<D>> {
        self.throttle.as_ref()
    }

    /// Routes a raw `ioctl`.
    ///
    /// Returns `None` for requests this layer doesn't handle, which the caller must forward
    /// itself. For handled requests the result is what `ioctl` should return, or the errno to
    /// report.
    ///
    /// # Safety
    ///
    /// `arg` must be what the kernel expects for `request`: a valid `ff_effect` for uploads, an
    /// effect id for removes, a buffer of the encoded size for capability queries and an `int`
    /// for the slot count.
    pub unsafe fn ioctl(
        &self,
        fd: RawFd,
        request: ioctl_num_type,
        arg: *mut libc::c_void,
    ) -> Option<nix::Result<libc::c_int>> {
        let result = match sys::Request::decode(request)? {
            sys::Request::UploadEffect => self
                .upload_effect(fd, &mut *arg.cast::<sys::ff_effect>())
                .map(|()| 0),
            sys::Request::RemoveEffect => self.remove_effect(fd, arg as usize as i32).map(|()| 0),
            sys::Request::QueryFeatures { len } => {
                self.query_features(fd, std::slice::from_raw_parts_mut(arg.cast::<u8>(), len))
            }
            sys::Request::QuerySlots => self.query_slots(fd).map(|count| {
                *arg.cast::<libc::c_int>() = count;
                0
            }),
        };
        Some(result)
    }

    /// Uploads a new effect or updates an existing one.
    pub fn upload_effect(&self, fd: RawFd, effect: &mut sys::ff_effect) -> nix::Result<()> {
        if !self.is_target(fd) {
            return self.driver.upload_effect(fd, effect);
        }

        let requested_id = effect.id;
        match FFEffectDescriptor::try_from(&*effect) {
            Ok(mut descriptor) => {
                let original = descriptor;
                let fixes = self.normalizer.normalize(&mut descriptor);
                match fixes.split_last() {
                    None => self
                        .trace
                        .emit(format_args!("> {} {}", upload(&descriptor), UPLOAD_NOTE)),
                    Some(((last_fix, last), earlier)) => {
                        self.trace.emit(format_args!("#> {}", upload(&original)));
                        for (fix, snapshot) in earlier {
                            self.trace
                                .emit(format_args!("#> {} # {}", upload(snapshot), fix.tag()));
                        }
                        self.trace
                            .emit(format_args!("> {} # {}", upload(last), last_fix.tag()));
                        descriptor.apply_to(effect);
                    }
                }
            }
            Err(e) => {
                self.trace.emit(format_args!(
                    "# UPLOAD id:{} type:{:#x} dir:{} not decoded: {}",
                    effect.id, effect.type_, effect.direction, e
                ));
                for (fix, direction) in self.normalizer.normalize_direction(&mut effect.direction) {
                    self.trace.emit(format_args!(
                        "# UPLOAD id:{} type:{:#x} dir:{} # {}",
                        effect.id,
                        effect.type_,
                        direction,
                        fix.tag()
                    ));
                }
            }
        }

        if let Some(throttle) = &self.throttle {
            match throttle.defer(fd, effect) {
                Deferral::Deferred => {
                    self.trace.emit(format_args!("< 0 id:{} # throttled", effect.id));
                    return Ok(());
                }
                Deferral::OutOfRange => {
                    log::warn!("effect id {} has no throttle slot, forwarding", effect.id);
                    self.trace.emit(format_args!(
                        "# cannot throttle id:{} > {}",
                        effect.id, MAX_EFFECT_ID
                    ));
                }
                Deferral::Unassigned => {}
            }
        }

        let result = self.driver.upload_effect(fd, effect);
        match self.normalizer.upload_verdict(requested_id, &result) {
            UploadVerdict::Keep => {
                self.trace
                    .emit(format_args!("< {} id:{}", status(&result), effect.id));
                result
            }
            UploadVerdict::RetryWithFreshId => {
                self.trace
                    .emit(format_args!("#< {} id:{}", status(&result), effect.id));
                effect.id = -1;
                let result = self.driver.upload_effect(fd, effect);
                self.trace.emit(format_args!(
                    "< {} id:{} # update fix",
                    status(&result),
                    effect.id
                ));
                result
            }
            UploadVerdict::Spoof { id } => {
                self.trace
                    .emit(format_args!("#< {} id:{}", status(&result), effect.id));
                effect.id = id;
                self.trace
                    .emit(format_args!("< 0 id:{} # features hack", effect.id));
                Ok(())
            }
        }
    }

    /// Erases an effect from device memory.
    pub fn remove_effect(&self, fd: RawFd, id: i32) -> nix::Result<()> {
        if !self.is_target(fd) {
            return self.driver.remove_effect(fd, id);
        }

        self.trace
            .emit(format_args!("> {} {}", Request::Remove(id), REMOVE_NOTE));
        if let (Some(throttle), Ok(slot)) = (&self.throttle, usize::try_from(id)) {
            throttle.discard(slot);
        }

        let result = self.driver.remove_effect(fd, id);
        if result.is_err() && self.normalizer.hides_failures() {
            self.trace.emit(format_args!("#< {}", status(&result)));
            self.trace.emit("< 0 # features hack");
            return Ok(());
        }
        self.trace.emit(format_args!("< {}", status(&result)));
        result
    }

    /// Reads the capability bitmap into `buf`, returning the number of bytes filled.
    pub fn query_features(&self, fd: RawFd, buf: &mut [u8]) -> nix::Result<i32> {
        if !self.is_target(fd) {
            return self.driver.query_features(fd, buf);
        }

        self.trace
            .emit(format_args!("> {} {}", Request::Query, QUERY_NOTE));
        let result = self.driver.query_features(fd, buf);
        let answer = features_response(&result, buf);

        if self.normalizer.spoofs_features() {
            self.trace.emit(format_args!("#< {}", answer));
            AttributeSetRef::<FFEffectCode>::from_raw_mut(buf).fill();
            let len = i32::try_from(buf.len()).unwrap_or(i32::MAX);
            let spoofed = Ok(len);
            self.trace.emit(format_args!(
                "< {} # features hack",
                features_response(&spoofed, buf)
            ));
            return spoofed;
        }
        self.trace.emit(format_args!("< {}", answer));
        result
    }

    /// Returns how many effects the device can hold at once.
    pub fn query_slots(&self, fd: RawFd) -> nix::Result<i32> {
        if !self.is_target(fd) {
            return self.driver.query_slots(fd);
        }

        self.trace
            .emit(format_args!("> {} {}", Request::Slots, SLOTS_NOTE));
        let result = self.driver.query_slots(fd);
        let mut answer = Response::with_status(status(&result));
        answer.effects = result.as_ref().ok().copied();
        self.trace.emit(format_args!("< {}", answer));
        result
    }

    /// Routes a raw `write`.
    ///
    /// Only buffers starting with a force feedback event are looked at, and only that first
    /// event is interpreted.
    pub fn write(&self, fd: RawFd, bytes: &[u8]) -> nix::Result<usize> {
        if !self.is_target(fd) {
            return self.driver.write(fd, bytes);
        }
        let Some(event) = first_event(bytes) else {
            return self.driver.write(fd, bytes);
        };
        if event.type_ != EventType::FORCEFEEDBACK.0 {
            return self.driver.write(fd, bytes);
        }

        let code = FFEffectCode(event.code);
        let request = match code {
            FFEffectCode::FF_GAIN => {
                if self.normalizer.suppresses_gain() {
                    self.trace
                        .emit(format_args!("#> {} (ignored)", Request::Gain(event.value)));
                    self.trace.emit(format_args!("< {}", bytes.len()));
                    return Ok(bytes.len());
                }
                Request::Gain(event.value)
            }
            FFEffectCode::FF_AUTOCENTER => Request::Autocenter(event.value),
            _ if event.value != 0 => Request::Play {
                id: event.code,
                count: event.value,
            },
            _ => Request::Stop(event.code),
        };
        self.trace.emit(format_args!("> {}", request));

        if let (Request::Play { id, .. }, Some(throttle)) = (&request, &self.throttle) {
            throttle.flush(usize::from(*id));
        }

        let result = self.driver.write(fd, bytes);
        let failed_play = result.is_err() && event.code < FF_MAX_EFFECTS;
        if failed_play && self.normalizer.hides_failures() {
            self.trace.emit(format_args!("#< {}", write_status(&result)));
            self.trace
                .emit(format_args!("< {} # features hack", bytes.len()));
            return Ok(bytes.len());
        }
        self.trace.emit(format_args!("< {}", write_status(&result)));
        result
    }
}

/// The `UPLOAD ...` part of a trace line.
fn upload(descriptor: &FFEffectDescriptor) -> Request {
    Request::Upload(*descriptor)
}

/// `0` on success, the negated errno otherwise.
fn status<T>(result: &nix::Result<T>) -> i64 {
    match result {
        Ok(_) => 0,
        Err(errno) => -i64::from(*errno as i32),
    }
}

/// Bytes written, or the negated errno.
fn write_status(result: &nix::Result<usize>) -> i64 {
    match result {
        Ok(written) => *written as i64,
        Err(errno) => -i64::from(*errno as i32),
    }
}

/// The answer to a capability query: byte count and the named codes set in the filled part.
fn features_response(result: &nix::Result<i32>, buf: &[u8]) -> Response {
    match result {
        Ok(filled) => {
            let filled = usize::try_from(*filled).unwrap_or(0).min(buf.len());
            let features = AttributeSetRef::<FFEffectCode>::from_raw(&buf[..filled])
                .iter()
                .filter(|code| code.name().is_some())
                .collect();
            Response {
                features: Some(features),
                ..Response::with_status(filled as i64)
            }
        }
        Err(_) => Response::with_status(status(result)),
    }
}
