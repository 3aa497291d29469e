//! Coalescing of rapid effect updates.
//!
//! Games often re-upload the same effect hundreds of times a second with slightly different
//! parameters. When throttling is on, updates of an already-allocated effect are parked in a
//! per-id slot and only the newest one is sent, either on the next timer tick or right before the
//! effect is played.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, RecvTimeoutError, Sender};

use crate::driver::Driver;
use crate::sys;

/// Highest effect id that has a throttle slot.
pub const MAX_EFFECT_ID: usize = 63;

/// Outcome of handing an update to the throttle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Deferral {
    /// Stored; it will reach the device later.
    Deferred,
    /// A fresh upload (id -1 or negative); forward it now.
    Unassigned,
    /// The id has no slot; forward it now.
    OutOfRange,
}

#[derive(Clone, Copy)]
struct Slot {
    effect: sys::ff_effect,
    fd: RawFd,
    pending: bool,
}

// SAFETY: the only pointer in an ff_effect is a periodic effect's custom sample buffer. It is
// never dereferenced here, only handed back to the driver exactly as the caller supplied it.
unsafe impl Send for Slot {}

impl Slot {
    fn empty() -> Self {
        Slot {
            effect: sys::ff_effect::zeroed(),
            fd: -1,
            pending: false,
        }
    }
}

struct Shared<D> {
    driver: Arc<D>,
    slots: Mutex<[Slot; MAX_EFFECT_ID + 1]>,
}

impl<D: Driver> Shared<D> {
    fn slots(&self) -> MutexGuard<'_, [Slot; MAX_EFFECT_ID + 1]> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, slot: &Slot) -> bool {
        let mut effect = slot.effect;
        match self.driver.upload_effect(slot.fd, &mut effect) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("deferred update of effect {} failed: {}", effect.id, e);
                false
            }
        }
    }

    fn flush(&self, id: usize) -> bool {
        let slot = {
            let mut slots = self.slots();
            let Some(slot) = slots.get_mut(id) else {
                return false;
            };
            if !slot.pending {
                return false;
            }
            slot.pending = false;
            *slot
        };
        self.send(&slot)
    }

    fn flush_all(&self) -> usize {
        let snapshot = {
            let mut slots = self.slots();
            let snapshot = *slots;
            for slot in slots.iter_mut() {
                slot.pending = false;
            }
            snapshot
        };
        snapshot
            .iter()
            .filter(|slot| slot.pending)
            .filter(|slot| self.send(slot))
            .count()
    }
}

/// Per-id coalescing of effect updates with a background flush timer.
///
/// Device calls are always made outside the slot lock. Dropping the throttle stops the timer
/// and sends whatever is still pending.
pub struct Throttle<D: Driver + 'static> {
    shared: Arc<Shared<D>>,
    interval: Duration,
    stop: Option<Sender<()>>,
    timer: Option<JoinHandle<()>>,
}

impl<D: Driver + 'static> Throttle<D> {
    /// Starts the flush timer, ticking every `interval`.
    pub fn new(driver: Arc<D>, interval: Duration) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            driver,
            slots: Mutex::new([Slot::empty(); MAX_EFFECT_ID + 1]),
        });
        let (stop, stopped) = bounded::<()>(1);

        let timer = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("ffb-throttle".into())
                .spawn(move || loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            shared.flush_all();
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                })?
        };

        Ok(Self {
            shared,
            interval,
            stop: Some(stop),
            timer: Some(timer),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Parks an update of an allocated effect, replacing any update still waiting for that id.
    pub fn defer(&self, fd: RawFd, effect: &sys::ff_effect) -> Deferral {
        let Ok(id) = usize::try_from(effect.id) else {
            return Deferral::Unassigned;
        };
        let mut slots = self.shared.slots();
        match slots.get_mut(id) {
            Some(slot) => {
                *slot = Slot {
                    effect: *effect,
                    fd,
                    pending: true,
                };
                Deferral::Deferred
            }
            None => Deferral::OutOfRange,
        }
    }

    /// Sends the pending update for `id` now. Returns whether one was sent successfully.
    pub fn flush(&self, id: usize) -> bool {
        self.shared.flush(id)
    }

    /// Sends every pending update. Returns how many were sent successfully.
    pub fn flush_all(&self) -> usize {
        self.shared.flush_all()
    }

    /// Forgets the pending update for `id`, if any.
    pub fn discard(&self, id: usize) {
        if let Some(slot) = self.shared.slots().get_mut(id) {
            slot.pending = false;
        }
    }

    pub fn is_pending(&self, id: usize) -> bool {
        self.shared.slots().get(id).map_or(false, |slot| slot.pending)
    }
}

impl<D: Driver + 'static> Drop for Throttle<D> {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(timer) = self.timer.take() {
            if timer.join().is_err() {
                log::warn!("throttle timer panicked");
            }
        }
        self.shared.flush_all();
    }
}
