use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use std::{io, mem};

use nix::errno::Errno;

use crate::compat::input_event;
use crate::constants::{EventType, FFEffectCode};
use crate::{sys, AttributeSet};

/// The device operations that interception and replay forward to.
///
/// [`KernelDriver`] issues the real syscalls; tests substitute recording stubs. Every method
/// mirrors the raw call it stands for, including the errno on failure.
pub trait Driver: Send + Sync {
    /// `EVIOCSFF`. On success the driver-assigned id has been written back into `effect.id`.
    fn upload_effect(&self, fd: RawFd, effect: &mut sys::ff_effect) -> nix::Result<()>;

    /// `EVIOCRMFF`.
    fn remove_effect(&self, fd: RawFd, id: i32) -> nix::Result<()>;

    /// `EVIOCGBIT(EV_FF, buf.len())`, returning the number of bytes filled.
    fn query_features(&self, fd: RawFd, buf: &mut [u8]) -> nix::Result<i32>;

    /// `EVIOCGEFFECTS`.
    fn query_slots(&self, fd: RawFd) -> nix::Result<i32>;

    /// Plain `write(2)`.
    fn write(&self, fd: RawFd, bytes: &[u8]) -> nix::Result<usize>;

    /// Writes a single force feedback `input_event`.
    fn write_event(&self, fd: RawFd, code: u16, value: i32) -> nix::Result<usize> {
        let events = [ff_event(code, value)];
        let bytes = unsafe { cast_to_bytes(&events) };
        self.write(fd, bytes)
    }

    /// Sets the force feedback gain, i.e. how strong effects are relative to their own level.
    fn set_gain(&self, fd: RawFd, gain: i32) -> nix::Result<usize> {
        self.write_event(fd, FFEffectCode::FF_GAIN.0, gain)
    }

    /// Sets the strength of the device's built-in centering spring.
    fn set_autocenter(&self, fd: RawFd, value: i32) -> nix::Result<usize> {
        self.write_event(fd, FFEffectCode::FF_AUTOCENTER.0, value)
    }

    /// Starts an uploaded effect `count` times; a count of zero stops it.
    fn play_effect(&self, fd: RawFd, id: u16, count: i32) -> nix::Result<usize> {
        self.write_event(fd, id, count)
    }
}

impl<D: Driver + ?Sized> Driver for &D {
    fn upload_effect(&self, fd: RawFd, effect: &mut sys::ff_effect) -> nix::Result<()> {
        (**self).upload_effect(fd, effect)
    }

    fn remove_effect(&self, fd: RawFd, id: i32) -> nix::Result<()> {
        (**self).remove_effect(fd, id)
    }

    fn query_features(&self, fd: RawFd, buf: &mut [u8]) -> nix::Result<i32> {
        (**self).query_features(fd, buf)
    }

    fn query_slots(&self, fd: RawFd) -> nix::Result<i32> {
        (**self).query_slots(fd)
    }

    fn write(&self, fd: RawFd, bytes: &[u8]) -> nix::Result<usize> {
        (**self).write(fd, bytes)
    }
}

/// Talks to the kernel directly.
#[derive(Clone, Copy, Debug, Default)]
pub struct KernelDriver;

impl Driver for KernelDriver {
    fn upload_effect(&self, fd: RawFd, effect: &mut sys::ff_effect) -> nix::Result<()> {
        // the kernel writes the allocated id back through the pointer
        unsafe { sys::eviocsff(fd, effect as *mut sys::ff_effect as *const sys::ff_effect)? };
        Ok(())
    }

    fn remove_effect(&self, fd: RawFd, id: i32) -> nix::Result<()> {
        unsafe { sys::eviocrmff(fd, id as _)? };
        Ok(())
    }

    fn query_features(&self, fd: RawFd, buf: &mut [u8]) -> nix::Result<i32> {
        unsafe { sys::eviocgbit_ff(fd, buf) }
    }

    fn query_slots(&self, fd: RawFd) -> nix::Result<i32> {
        let mut count: libc::c_int = 0;
        unsafe { sys::eviocgeffects(fd, &mut count)? };
        Ok(count)
    }

    fn write(&self, fd: RawFd, bytes: &[u8]) -> nix::Result<usize> {
        let res = unsafe { libc::write(fd, bytes.as_ptr().cast(), bytes.len()) };
        Errno::result(res).map(|written| written as usize)
    }
}

/// A force feedback device node opened for replay.
#[derive(Debug)]
pub struct Device {
    file: File,
}

impl Device {
    /// Opens the device node at `path` read/write and non-blocking.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Device> {
        let mut options = OpenOptions::new();

        // Effect uploads and play/stop writes both need write access.
        let file = options
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)?;

        Ok(Device { file })
    }

    /// The force feedback capabilities the driver reports.
    pub fn supported_ff(&self) -> io::Result<AttributeSet<FFEffectCode>> {
        let mut ff = AttributeSet::<FFEffectCode>::new();
        KernelDriver.query_features(self.as_raw_fd(), ff.as_mut_raw_slice())?;
        Ok(ff)
    }

    /// How many effects the device can hold at once.
    pub fn effect_slots(&self) -> io::Result<i32> {
        Ok(KernelDriver.query_slots(self.as_raw_fd())?)
    }
}

impl AsRawFd for Device {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

/// A zero-timestamped force feedback `input_event`.
pub fn ff_event(code: u16, value: i32) -> input_event {
    input_event {
        time: libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        },
        type_: EventType::FORCEFEEDBACK.0,
        code,
        value,
    }
}

/// Reads the first `input_event` of a write buffer, if the buffer holds a whole one.
pub fn first_event(bytes: &[u8]) -> Option<input_event> {
    if bytes.len() < mem::size_of::<input_event>() {
        return None;
    }
    // SAFETY: length checked above; input_event is plain data valid for any bit pattern
    Some(unsafe { std::ptr::read_unaligned(bytes.as_ptr().cast::<input_event>()) })
}

/// Views any value as its raw bytes, for handing `input_event`s to `write`.
///
/// # Safety
///
/// `T` must not contain padding bytes.
pub unsafe fn cast_to_bytes<T: ?Sized>(mem: &T) -> &[u8] {
    std::slice::from_raw_parts(mem as *const T as *const u8, mem::size_of_val(mem))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn event_bytes_round_trip() {
        let events = [ff_event(7, 3)];
        let bytes = unsafe { cast_to_bytes(&events) };
        assert_eq!(mem::size_of::<input_event>(), bytes.len());

        let event = first_event(bytes).unwrap();
        assert_eq!(EventType::FORCEFEEDBACK.0, event.type_);
        assert_eq!(7, event.code);
        assert_eq!(3, event.value);

        assert!(first_event(&bytes[1..]).is_none());
    }

    #[test]
    fn open_missing_device() {
        let err = Device::open("/nonexistent/event99").unwrap_err();
        assert_eq!(io::ErrorKind::NotFound, err.kind());
    }

    #[test]
    fn kernel_write_reports_bytes() {
        let file = tempfile::tempfile().unwrap();
        let written = KernelDriver.play_effect(file.as_raw_fd(), 2, 1).unwrap();
        assert_eq!(mem::size_of::<input_event>(), written);
        assert_eq!(Err(Errno::EBADF), KernelDriver.write(-1, &[0u8; 4]));
    }

    #[test]
    fn ioctls_on_plain_files_fail() {
        let file = tempfile::tempfile().unwrap();
        let mut effect = sys::ff_effect::zeroed();
        assert!(KernelDriver
            .upload_effect(file.as_raw_fd(), &mut effect)
            .is_err());
        assert!(KernelDriver.query_slots(file.as_raw_fd()).is_err());
    }
}
