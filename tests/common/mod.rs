#![allow(dead_code)]

use std::cell::Cell;
use std::io::{self, Write};
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ffbtools::event::first_event;
use ffbtools::sys::ff_effect;
use ffbtools::{Clock, Driver, FFEffectDescriptor};
use nix::errno::Errno;

/// A device call as the stub saw it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Upload {
        id: i16,
        type_: u16,
        effect: Option<FFEffectDescriptor>,
    },
    Remove(i32),
    QueryFeatures(usize),
    QuerySlots,
    Write { code: u16, value: i32 },
}

/// Records every call and answers like a small driver.
///
/// Fresh uploads get ids counting up from `next_id`. Errnos queued in the `fail_*` lists are
/// returned by the next matching calls, one each.
#[derive(Default)]
pub struct StubDriver {
    pub calls: Mutex<Vec<Call>>,
    pub next_id: Mutex<i16>,
    pub features: Vec<u8>,
    pub slots: i32,
    pub fail_upload: Mutex<Vec<Errno>>,
    pub fail_remove: Mutex<Vec<Errno>>,
    pub fail_write: Mutex<Vec<Errno>>,
}

impl StubDriver {
    pub fn allocating_from(first_id: i16) -> Self {
        Self {
            next_id: Mutex::new(first_id),
            slots: 16,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<(u16, i32)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Write { code, value } => Some((code, value)),
                _ => None,
            })
            .collect()
    }

    pub fn uploads(&self) -> Vec<(i16, FFEffectDescriptor)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Upload { id, effect, .. } => effect.map(|effect| (id, effect)),
                _ => None,
            })
            .collect()
    }

    fn failure(list: &Mutex<Vec<Errno>>) -> Option<Errno> {
        let mut list = list.lock().unwrap();
        if list.is_empty() {
            None
        } else {
            Some(list.remove(0))
        }
    }
}

impl Driver for StubDriver {
    fn upload_effect(&self, _fd: RawFd, effect: &mut ff_effect) -> nix::Result<()> {
        self.calls.lock().unwrap().push(Call::Upload {
            id: effect.id,
            type_: effect.type_,
            effect: FFEffectDescriptor::try_from(&*effect).ok(),
        });
        if let Some(errno) = Self::failure(&self.fail_upload) {
            return Err(errno);
        }
        if effect.id == -1 {
            let mut next = self.next_id.lock().unwrap();
            effect.id = *next;
            *next += 1;
        }
        Ok(())
    }

    fn remove_effect(&self, _fd: RawFd, id: i32) -> nix::Result<()> {
        self.calls.lock().unwrap().push(Call::Remove(id));
        match Self::failure(&self.fail_remove) {
            Some(errno) => Err(errno),
            None => Ok(()),
        }
    }

    fn query_features(&self, _fd: RawFd, buf: &mut [u8]) -> nix::Result<i32> {
        self.calls.lock().unwrap().push(Call::QueryFeatures(buf.len()));
        let len = buf.len().min(self.features.len());
        buf[..len].copy_from_slice(&self.features[..len]);
        Ok(len as i32)
    }

    fn query_slots(&self, _fd: RawFd) -> nix::Result<i32> {
        self.calls.lock().unwrap().push(Call::QuerySlots);
        Ok(self.slots)
    }

    fn write(&self, _fd: RawFd, bytes: &[u8]) -> nix::Result<usize> {
        let event = first_event(bytes).expect("stub only takes whole events");
        self.calls.lock().unwrap().push(Call::Write {
            code: event.code,
            value: event.value,
        });
        match Self::failure(&self.fail_write) {
            Some(errno) => Err(errno),
            None => Ok(bytes.len()),
        }
    }
}

/// A clock that only moves when slept on.
#[derive(Default)]
pub struct ManualClock {
    now: Cell<Duration>,
    pub sleeps: Cell<usize>,
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
        self.sleeps.set(self.sleeps.get() + 1);
    }
}

impl ManualClock {
    pub fn elapsed(&self) -> Duration {
        self.now.get()
    }
}

/// An in-memory trace sink that can be read back while the logger still holds it.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuffer {
    /// Every line with its timestamp stripped.
    pub fn bodies(&self) -> Vec<String> {
        let text = String::from_utf8(self.0.lock().unwrap().clone()).unwrap();
        text.lines().map(|line| line[13..].to_owned()).collect()
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}
