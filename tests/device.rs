#![cfg(feature = "device-test")]

//! Runs against a real force feedback device named by `FFBTOOLS_TEST_DEVICE`.

use std::io::Cursor;
use std::os::unix::io::AsRawFd;

use ffbtools::{Device, Driver, FFEffectCode, KernelDriver, Replayer};

fn test_device() -> Device {
    let path = std::env::var("FFBTOOLS_TEST_DEVICE")
        .expect("FFBTOOLS_TEST_DEVICE must name a force feedback event device");
    Device::open(path).unwrap()
}

#[test]
pub fn test_capabilities() -> Result<(), Box<dyn std::error::Error>> {
    let device = test_device();
    let features = device.supported_ff()?;
    assert!(features.iter().any(|code| code != FFEffectCode::FF_GAIN));
    assert!(device.effect_slots()? > 0);
    Ok(())
}

#[test]
pub fn test_replay_rumble() -> Result<(), Box<dyn std::error::Error>> {
    let device = test_device();
    let fd = device.as_raw_fd();
    KernelDriver.set_gain(fd, 0xffff)?;

    let trace = "\
000000000000 > UPLOAD id:-1 dir:0 length:200 delay:0 type:RUMBLE strong:16384 weak:8192
000000000100 < 0 id:0
000000000200 > PLAY 0 1
000000300000 > STOP 0
000000300100 > REMOVE 0
";
    let mut replayer = Replayer::new(KernelDriver, fd);
    let summary = replayer.play(Cursor::new(trace))?;
    assert_eq!(4, summary.forwarded);
    assert_eq!(0, summary.skipped);
    assert!(replayer.identifiers().is_empty());
    Ok(())
}
