use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Instant;

use crate::Config;

/// Appends timestamped lines to the session trace.
///
/// Timestamps count microseconds from the first line this logger writes. Each line is built
/// completely before the sink lock is taken and is flushed right away, so concurrent callers
/// interleave whole lines only. Nothing here ever reports an error to the caller; a trace that
/// can't be written is simply incomplete.
pub struct TraceLogger {
    sink: Option<Mutex<Box<dyn Write + Send>>>,
    epoch: OnceLock<Instant>,
}

impl TraceLogger {
    /// A logger that drops every line.
    pub fn disabled() -> Self {
        Self {
            sink: None,
            epoch: OnceLock::new(),
        }
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Some(Mutex::new(Box::new(writer))),
            epoch: OnceLock::new(),
        }
    }

    /// Sets up tracing as configured. A new, empty trace file starts with a header line
    /// describing the configuration.
    ///
    /// If the file can't be opened, one diagnostic goes to stderr and tracing stays off.
    pub fn from_config(config: &Config) -> Self {
        let Some(path) = &config.log_file else {
            return Self::disabled();
        };
        match open_append(path) {
            Ok((file, fresh)) => {
                let logger = Self::from_writer(file);
                if fresh {
                    logger.emit(format_args!("# {}", config.describe()));
                }
                logger
            }
            Err(e) => {
                eprintln!("ffbtools: cannot open trace file {}: {}", path.display(), e);
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Writes `body` as one line, prefixed with the twelve digit relative timestamp.
    pub fn emit(&self, body: impl Display) {
        let Some(sink) = &self.sink else {
            return;
        };
        let body = body.to_string();

        let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
        let epoch = *self.epoch.get_or_init(Instant::now);
        let line = format!("{:012} {}\n", epoch.elapsed().as_micros(), body);
        if let Err(e) = sink.write_all(line.as_bytes()).and_then(|_| sink.flush()) {
            log::debug!("dropped trace line: {}", e);
        }
    }
}

impl Default for TraceLogger {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Opens `path` for appending, reporting whether it was empty.
fn open_append(path: &Path) -> io::Result<(File, bool)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let fresh = file.metadata()?.len() == 0;
    Ok((file, fresh))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Buffer {
        fn lines(&self) -> Vec<String> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(str::to_owned)
                .collect()
        }
    }

    #[test]
    fn lines_are_timestamped_from_first() {
        let buffer = Buffer::default();
        let logger = TraceLogger::from_writer(buffer.clone());
        logger.emit("> QUERY");
        std::thread::sleep(std::time::Duration::from_millis(2));
        logger.emit(format_args!("< {}", 0));

        let lines = buffer.lines();
        assert_eq!(2, lines.len());
        assert_eq!("> QUERY", &lines[0][13..]);
        assert_eq!("< 0", &lines[1][13..]);

        let stamps: Vec<u64> = lines.iter().map(|l| l[..12].parse().unwrap()).collect();
        assert!(stamps[0] < 1000);
        assert!(stamps[1] >= stamps[0] + 2000);
    }

    #[test]
    fn disabled_logger_is_silent() {
        let logger = TraceLogger::disabled();
        assert!(!logger.is_enabled());
        logger.emit("> QUERY");
    }

    #[test]
    fn header_only_on_fresh_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.log");
        let config = Config {
            log_file: Some(path.clone()),
            ..Config::default()
        };

        TraceLogger::from_config(&config).emit("> SLOTS");
        TraceLogger::from_config(&config).emit("> QUERY");

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(3, lines.len());
        assert!(lines[0][13..].starts_with("# DEVICE_NAME="));
        assert!(lines[1].ends_with("> SLOTS"));
        assert!(lines[2].ends_with("> QUERY"));
    }

    #[test]
    fn unopenable_destination_disables() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            log_file: Some(dir.path().join("missing").join("trace.log")),
            ..Config::default()
        };
        assert!(!TraceLogger::from_config(&config).is_enabled());
    }
}
