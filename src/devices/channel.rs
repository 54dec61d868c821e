//! One non-blocking character-device channel
//!
//! A channel remembers its path for the whole lifetime of the device handle
//! and holds the open file only while the device is attached.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result of one non-blocking record read
#[derive(Debug)]
pub enum ChannelRead<const N: usize> {
    Empty,
    Record([u8; N]),
    // byte count other than the record size
    Short(usize),
    Failed(io::Error),
    Closed,
}

#[derive(Debug)]
pub struct DeviceChannel {
    path: PathBuf,
    file: Option<File>,
}

impl DeviceChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Opens read/write and non-blocking. Does nothing when already open;
    /// a failed open leaves the channel closed.
    pub fn open(&mut self) -> bool {
        if self.file.is_some() {
            return true;
        }

        match OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.path)
        {
            Ok(file) => {
                info!("Opened input device {}", self.path.display());
                self.file = Some(file);
                true
            }
            Err(e) => {
                debug!("Could not open {}: {}", self.path.display(), e);
                false
            }
        }
    }

    pub fn close(&mut self) {
        if self.file.take().is_some() {
            debug!("Closed input device {}", self.path.display());
        }
    }

    pub fn raw_fd(&self) -> Option<RawFd> {
        self.file.as_ref().map(|f| f.as_raw_fd())
    }

    pub fn read_record<const N: usize>(&mut self) -> ChannelRead<N> {
        let Some(file) = self.file.as_mut() else {
            return ChannelRead::Closed;
        };

        let mut buf = [0u8; N];
        match file.read(&mut buf) {
            Ok(n) if n == N => ChannelRead::Record(buf),
            Ok(n) => ChannelRead::Short(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => ChannelRead::Empty,
            Err(e) => ChannelRead::Failed(e),
        }
    }

    /// Writes one complete record, used for force-feedback commands
    pub fn write_record(&mut self, record: &[u8]) -> io::Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "channel is closed"))?;
        let written = file.write(record)?;
        if written != record.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {} of {} bytes", written, record.len()),
            ));
        }
        Ok(())
    }
}
