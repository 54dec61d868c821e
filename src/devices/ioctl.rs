//! evdev ioctl request numbers and the key-repeat controls

use libc::{c_int, c_uint};
use std::io;
use std::mem::size_of;
use std::os::unix::io::RawFd;

use super::ff::FfEffect;

const IOC_WRITE: u64 = 1;
const IOC_READ: u64 = 2;

const fn ioc(dir: u64, kind: u8, nr: u8, size: usize) -> u64 {
    (dir << 30) | ((size as u64) << 16) | ((kind as u64) << 8) | nr as u64
}

// [REP_DELAY, REP_PERIOD]
pub const EVIOCGREP: u64 = ioc(IOC_READ, b'E', 0x03, size_of::<[c_uint; 2]>());
pub const EVIOCSREP: u64 = ioc(IOC_WRITE, b'E', 0x03, size_of::<[c_uint; 2]>());
/// Upload a force-feedback effect; the kernel fills in the id
pub const EVIOCSFF: u64 = ioc(IOC_WRITE, b'E', 0x80, size_of::<FfEffect>());
pub const EVIOCRMFF: u64 = ioc(IOC_WRITE, b'E', 0x81, size_of::<c_int>());

const REP_DELAY: usize = 0;

fn check(rc: c_int) -> io::Result<()> {
    if rc == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

pub fn get_repeat(fd: RawFd) -> io::Result<[c_uint; 2]> {
    let mut settings: [c_uint; 2] = [0; 2];
    // SAFETY: EVIOCGREP writes exactly two unsigned ints into the buffer.
    check(unsafe { libc::ioctl(fd, EVIOCGREP as _, settings.as_mut_ptr()) })?;
    Ok(settings)
}

pub fn set_repeat(fd: RawFd, settings: &[c_uint; 2]) -> io::Result<()> {
    // SAFETY: EVIOCSREP reads exactly two unsigned ints from the buffer.
    check(unsafe { libc::ioctl(fd, EVIOCSREP as _, settings.as_ptr()) })
}

/// Zeroes REP_DELAY, which stops the kernel from generating repeat records
pub fn disable_repeat(fd: RawFd) -> io::Result<()> {
    let mut settings = get_repeat(fd)?;
    settings[REP_DELAY] = 0;
    set_repeat(fd, &settings)
}

pub fn upload_effect(fd: RawFd, effect: &mut FfEffect) -> io::Result<()> {
    // SAFETY: `effect` is a live, correctly laid out `struct ff_effect`; the
    // kernel only writes back the `id` field.
    check(unsafe { libc::ioctl(fd, EVIOCSFF as _, effect as *mut FfEffect) })
}

pub fn erase_effect(fd: RawFd, id: i16) -> io::Result<()> {
    // SAFETY: EVIOCRMFF takes the effect id by value, no memory is shared.
    check(unsafe { libc::ioctl(fd, EVIOCRMFF as _, c_int::from(id)) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_numbers_match_kernel_headers() {
        // Values from <linux/input.h> on the generic ioctl layout
        assert_eq!(EVIOCGREP, 0x8008_4503);
        assert_eq!(EVIOCSREP, 0x4008_4503);
        assert_eq!(EVIOCRMFF, 0x4004_4581);
    }

    #[test]
    fn repeat_ioctl_on_non_evdev_fd_fails_cleanly() {
        let file = tempfile::tempfile().unwrap();
        use std::os::unix::io::AsRawFd;
        assert!(disable_repeat(file.as_raw_fd()).is_err());
    }
}
