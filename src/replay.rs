//! Replaying a recorded trace against a live device.
//!
//! Effect ids in a trace are the ones the recording session got from its driver; a live device
//! hands out its own. The [`Replayer`] keeps a table from recorded to live ids, filled from the
//! `<` result that follows each upload, and rewrites every later reference through it.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::os::unix::io::RawFd;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::driver::Driver;
use crate::error::Error;
use crate::record::{Entry, Record, Request, Response};
use crate::sys;

/// Highest recorded effect id the replayer can map.
pub const MAX_REPLAY_ID: usize = 255;

/// Time source used to pace a replay.
pub trait Clock {
    /// Time elapsed since some fixed point.
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Wall-clock pacing with [`std::thread::sleep`].
#[derive(Debug)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Recorded effect id to live effect id.
#[derive(Clone, Debug)]
pub struct IdentifierMap {
    ids: [Option<i16>; MAX_REPLAY_ID + 1],
}

impl Default for IdentifierMap {
    fn default() -> Self {
        Self {
            ids: [None; MAX_REPLAY_ID + 1],
        }
    }
}

impl IdentifierMap {
    pub fn get(&self, recorded: i32) -> Option<i16> {
        let index = usize::try_from(recorded).ok()?;
        self.ids.get(index).copied().flatten()
    }

    /// Records that `recorded` is known as `live` on the device. Returns `false`, changing
    /// nothing, when `recorded` is out of range.
    pub fn insert(&mut self, recorded: i32, live: i16) -> bool {
        let slot = usize::try_from(recorded)
            .ok()
            .and_then(|index| self.ids.get_mut(index));
        match slot {
            Some(slot) => {
                *slot = Some(live);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, recorded: i32) -> Option<i16> {
        let index = usize::try_from(recorded).ok()?;
        self.ids.get_mut(index)?.take()
    }

    /// Mapped pairs in recorded id order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, i16)> + '_ {
        self.ids
            .iter()
            .enumerate()
            .filter_map(|(recorded, live)| live.map(|live| (recorded, live)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// Counts of what a replay did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Non-blank lines read.
    pub lines: usize,
    /// Operations sent to the device, successful or not.
    pub forwarded: usize,
    /// Operations dropped because they referred to an id that was never mapped.
    pub skipped: usize,
    pub comments: usize,
}

/// Drives a device from a recorded trace.
pub struct Replayer<D: Driver, C: Clock = MonotonicClock> {
    driver: D,
    fd: RawFd,
    clock: C,
    /// Clock reading and trace timestamp of the first line.
    anchor: Option<(Duration, u64)>,
    ids: IdentifierMap,
    /// Live id of the upload whose result line comes next.
    awaiting: Option<i16>,
    summary: ReplaySummary,
}

impl<D: Driver> Replayer<D> {
    pub fn new(driver: D, fd: RawFd) -> Self {
        Self::with_clock(driver, fd, MonotonicClock::default())
    }
}

impl<D: Driver, C: Clock> Replayer<D, C> {
    pub fn with_clock(driver: D, fd: RawFd, clock: C) -> Self {
        Self {
            driver,
            fd,
            clock,
            anchor: None,
            ids: IdentifierMap::default(),
            awaiting: None,
            summary: ReplaySummary::default(),
        }
    }

    pub fn identifiers(&self) -> &IdentifierMap {
        &self.ids
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn summary(&self) -> ReplaySummary {
        self.summary
    }

    /// Replays the trace file at `path`.
    pub fn play_file(&mut self, path: impl AsRef<Path>) -> Result<ReplaySummary, Error> {
        let file = File::open(path)?;
        self.play(BufReader::new(file))
    }

    /// Replays every line of `reader`, keeping the recorded timing.
    ///
    /// A line that can't be parsed stops the replay with [`Error::Parse`]. Device failures are
    /// logged and the replay goes on.
    pub fn play(&mut self, reader: impl BufRead) -> Result<ReplaySummary, Error> {
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: Record = line
                .parse()
                .map_err(|kind| Error::Parse {
                    line: index + 1,
                    kind,
                })?;
            self.summary.lines += 1;
            self.wait_for(record.timestamp);
            log::trace!("{}", line);
            self.step(&record.entry);
        }
        Ok(self.summary)
    }

    /// Sleeps until `timestamp` is due, relative to the first line replayed.
    fn wait_for(&mut self, timestamp: u64) {
        let now = self.clock.now();
        let (start, first) = *self.anchor.get_or_insert((now, timestamp));
        let due = start + Duration::from_micros(timestamp.saturating_sub(first));
        if let Some(delay) = due.checked_sub(now) {
            if !delay.is_zero() {
                self.clock.sleep(delay);
            }
        }
    }

    /// Applies one entry without any pacing.
    pub fn step(&mut self, entry: &Entry) {
        match entry {
            Entry::Comment(text) => {
                self.summary.comments += 1;
                log::info!("#{}", text);
            }
            Entry::Response(response) => self.take_result(response),
            Entry::Request(request) => {
                self.awaiting = None;
                self.forward(request);
            }
        }
    }

    fn take_result(&mut self, response: &Response) {
        let Some(live) = self.awaiting.take() else {
            return;
        };
        if !response.is_success() {
            return;
        }
        match response.id {
            Some(recorded) => {
                if !self.ids.insert(i32::from(recorded), live) {
                    log::warn!("recorded effect id {} out of range, not mapped", recorded);
                }
            }
            None => log::warn!("upload result without an effect id"),
        }
    }

    fn forward(&mut self, request: &Request) {
        let fd = self.fd;
        match *request {
            Request::Query | Request::Slots => {}
            Request::Gain(value) => {
                self.summary.forwarded += 1;
                report("GAIN", self.driver.set_gain(fd, value));
            }
            Request::Autocenter(value) => {
                self.summary.forwarded += 1;
                report("AUTOCENTER", self.driver.set_autocenter(fd, value));
            }
            Request::Upload(descriptor) => {
                let live_id = if descriptor.id == -1 {
                    -1
                } else {
                    match self.live_id(i32::from(descriptor.id), "UPLOAD") {
                        Some(live) => live,
                        None => return,
                    }
                };
                let mut effect: sys::ff_effect = descriptor.into();
                effect.id = live_id;

                self.summary.forwarded += 1;
                match self.driver.upload_effect(fd, &mut effect) {
                    Ok(()) => self.awaiting = Some(effect.id),
                    Err(e) => log::warn!("UPLOAD failed: {}", e),
                }
            }
            Request::Play { id, count } => {
                if let Some(live) = self.live_id(i32::from(id), "PLAY") {
                    self.summary.forwarded += 1;
                    report("PLAY", self.driver.play_effect(fd, live as u16, count));
                }
            }
            Request::Stop(id) => {
                if let Some(live) = self.live_id(i32::from(id), "STOP") {
                    self.summary.forwarded += 1;
                    report("STOP", self.driver.play_effect(fd, live as u16, 0));
                }
            }
            Request::Remove(id) => {
                if let Some(live) = self.live_id(id, "REMOVE") {
                    self.summary.forwarded += 1;
                    report("REMOVE", self.driver.remove_effect(fd, i32::from(live)));
                    self.ids.remove(id);
                }
            }
        }
    }

    fn live_id(&mut self, recorded: i32, operation: &str) -> Option<i16> {
        let live = self.ids.get(recorded);
        if live.is_none() {
            self.summary.skipped += 1;
            log::info!("{} of unmapped effect {} skipped", operation, recorded);
        }
        live
    }
}

fn report<T>(operation: &str, result: nix::Result<T>) {
    if let Err(e) = result {
        log::warn!("{} failed: {}", operation, e);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn identifier_map_bounds() {
        let mut ids = IdentifierMap::default();
        assert!(ids.is_empty());
        assert!(ids.insert(0, 5));
        assert!(ids.insert(255, 9));
        assert!(!ids.insert(256, 1));
        assert!(!ids.insert(-1, 1));

        assert_eq!(Some(5), ids.get(0));
        assert_eq!(None, ids.get(256));
        assert_eq!(None, ids.get(-3));
        assert_eq!(vec![(0, 5), (255, 9)], ids.iter().collect::<Vec<_>>());

        assert_eq!(Some(5), ids.remove(0));
        assert_eq!(None, ids.remove(0));
        assert_eq!(None, ids.get(0));
    }

    #[test]
    fn remapping_overwrites() {
        let mut ids = IdentifierMap::default();
        ids.insert(3, 1);
        ids.insert(3, 2);
        assert_eq!(Some(2), ids.get(3));
    }
}
