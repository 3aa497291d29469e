//! Replays a recorded force feedback trace on a device.
//!
//! # Usage
//!
//! ```bash
//! # Play back a trace recorded with FFBTOOLS_LOGGER=1
//! ffbplay -d /dev/input/event5 /tmp/ffb.log
//!
//! # Same, echoing every trace line as it is replayed
//! ffbplay -d /dev/input/event5 -t /tmp/ffb.log
//! ```

use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

use clap::Parser;
use ffbtools::{Device, Driver, KernelDriver, Replayer};

/// Gain written before replay so effects play at their recorded strength.
const FULL_GAIN: i32 = 0xffff;

#[derive(Parser)]
#[command(name = "ffbplay")]
#[command(about = "Replay a force feedback trace on an event device")]
#[command(version)]
struct Cli {
    /// Event device to play on, e.g. /dev/input/event5.
    #[arg(short, long)]
    device: PathBuf,

    /// Echo every trace line as it is replayed.
    #[arg(short, long)]
    trace: bool,

    /// Leave the device gain alone instead of setting it to maximum first.
    #[arg(long)]
    keep_gain: bool,

    /// Trace file to replay.
    file: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.trace { "trace" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();

    if let Err(e) = run(&cli) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), ffbtools::Error> {
    let device = Device::open(&cli.device)?;
    let fd = device.as_raw_fd();

    match device.supported_ff() {
        Ok(features) => log::info!("{} supports {:?}", cli.device.display(), features),
        Err(e) => log::warn!("cannot query force feedback features: {}", e),
    }
    match device.effect_slots() {
        Ok(slots) => log::info!("room for {} effects", slots),
        Err(e) => log::warn!("cannot query effect memory: {}", e),
    }

    if !cli.keep_gain {
        KernelDriver.set_gain(fd, FULL_GAIN)?;
    }

    log::info!("playing {}", cli.file.display());
    let summary = Replayer::new(KernelDriver, fd).play_file(&cli.file)?;
    log::info!(
        "done: {} lines, {} operations sent, {} skipped",
        summary.lines,
        summary.forwarded,
        summary.skipped
    );
    Ok(())
}
