use std::fmt;
use std::os::unix::io::RawFd;

use nix::sys::stat::fstat;

/// Major/minor pair identifying a character device node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceNumber {
    pub major: u64,
    pub minor: u64,
}

impl DeviceNumber {
    pub const fn new(major: u64, minor: u64) -> Self {
        Self { major, minor }
    }

    pub fn from_rdev(rdev: libc::dev_t) -> Self {
        Self {
            major: nix::sys::stat::major(rdev),
            minor: nix::sys::stat::minor(rdev),
        }
    }

    /// The device number behind an open descriptor.
    pub fn of_descriptor(fd: RawFd) -> nix::Result<Self> {
        let stat = fstat(fd)?;
        Ok(Self::from_rdev(stat.st_rdev))
    }
}

impl fmt::Display for DeviceNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// Decides which descriptors belong to the instrumented device.
#[derive(Clone, Copy, Debug, Default)]
pub struct DescriptorFilter {
    target: Option<DeviceNumber>,
}

impl DescriptorFilter {
    pub fn new(target: Option<DeviceNumber>) -> Self {
        Self { target }
    }

    pub fn target(&self) -> Option<DeviceNumber> {
        self.target
    }

    /// Whether calls on `fd` should be instrumented.
    ///
    /// With no target configured nothing matches. A descriptor whose identity can't be queried
    /// never matches either; such calls pass through untouched.
    pub fn is_target(&self, fd: RawFd) -> bool {
        let Some(target) = self.target else {
            return false;
        };
        match DeviceNumber::of_descriptor(fd) {
            Ok(number) => number == target,
            Err(e) => {
                log::trace!("cannot stat descriptor {}: {}", fd, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs::File;
    use std::os::unix::io::AsRawFd;

    fn dev_null() -> File {
        File::open("/dev/null").unwrap()
    }

    #[test]
    fn matches_exact_device() {
        let null = dev_null();
        let number = DeviceNumber::of_descriptor(null.as_raw_fd()).unwrap();
        // /dev/null is the "mem" driver's third minor on every Linux system
        assert_eq!(DeviceNumber::new(1, 3), number);

        let filter = DescriptorFilter::new(Some(number));
        assert_eq!(Some(number), filter.target());
        assert!(filter.is_target(null.as_raw_fd()));

        let other = DescriptorFilter::new(Some(DeviceNumber::new(1, 5)));
        assert!(!other.is_target(null.as_raw_fd()));
    }

    #[test]
    fn unconfigured_matches_nothing() {
        let null = dev_null();
        assert!(!DescriptorFilter::default().is_target(null.as_raw_fd()));
    }

    #[test]
    fn regular_files_and_bad_descriptors_pass() {
        let file = tempfile::tempfile().unwrap();
        let filter = DescriptorFilter::new(Some(DeviceNumber::new(1, 3)));
        assert!(!filter.is_target(file.as_raw_fd()));
        assert!(!filter.is_target(-1));
    }

    #[test]
    fn bad_descriptor_reports_errno() {
        assert_eq!(
            Err(nix::errno::Errno::EBADF),
            DeviceNumber::of_descriptor(-1)
        );
    }
}
