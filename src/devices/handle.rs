//! Device handle - one logical keyboard, joystick or combined controller
//!
//! A combined controller (PS3-style) exposes two nodes for one physical pad:
//! the joystick node carries the input records, the evdev node carries the
//! force-feedback effect table. Both must be open for the pad to count as
//! found.
//!
//! # Lifecycle
//!
//! ```text
//! Unassigned ──open_*──► Keyboard / Joystick / Combined (paths recorded)
//!                              │  ▲
//!                 close / loss │  │ retry_connection
//!                              ▼  │
//!                        same variant, channels closed
//! ```
//!
//! Every operation is non-blocking. Failures are reported as values
//! ([`SampleStatus`], [`DeviceError`]) to the immediate caller, who decides
//! whether to log, retry or stop.

use std::fmt;
use std::io;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::channel::{ChannelRead, DeviceChannel};
use super::event::{InputEvent, JoystickRecord, KeyRecord, JOYSTICK_RECORD_LEN, KEY_RECORD_LEN};
use super::ff::{self, EffectHandle};
use super::ioctl;

pub const INPUT_DIR: &str = "/dev/input";
pub const BY_ID_DIR: &str = "/dev/input/by-id";
pub const PS3_PREFIX: &str = "PLAYSTATION_R_3_Controller__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Keyboard,
    Joystick,
    CombinedController,
}

impl DeviceKind {
    /// Numeric device codes: 1 keyboard, 2 joystick, 3 combined controller
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(DeviceKind::Keyboard),
            2 => Some(DeviceKind::Joystick),
            3 => Some(DeviceKind::CombinedController),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            DeviceKind::Keyboard => 1,
            DeviceKind::Joystick => 2,
            DeviceKind::CombinedController => 3,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceKind::Keyboard => "keyboard",
            DeviceKind::Joystick => "joystick",
            DeviceKind::CombinedController => "combined controller",
        };
        f.write_str(name)
    }
}

/// The two node paths of a combined controller, derived from its pairing
/// identity (Bluetooth MAC for a paired PS3 pad)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedPaths {
    pub identity: String,
    pub event: PathBuf,
    pub joystick: PathBuf,
}

impl CombinedPaths {
    pub fn from_identity(by_id_dir: impl AsRef<Path>, prefix: &str, identity: &str) -> Self {
        let dir = by_id_dir.as_ref();
        Self {
            identity: identity.to_string(),
            event: dir.join(format!("{prefix}{identity}_event")),
            joystick: dir.join(format!("{prefix}{identity}_js")),
        }
    }

    /// Layout created by the udev rule for paired PS3 controllers
    pub fn ps3(mac: &str) -> Self {
        Self::from_identity(BY_ID_DIR, PS3_PREFIX, mac)
    }
}

/// Why a sample was treated as device loss
#[derive(Debug)]
pub enum Fault {
    NotFound,
    Read(io::Error),
    ShortRead { expected: usize, got: usize },
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::NotFound => write!(f, "device not open"),
            Fault::Read(e) => write!(f, "read failed: {e}"),
            Fault::ShortRead { expected, got } => {
                write!(f, "read {got} bytes, expected {expected}")
            }
        }
    }
}

#[derive(Debug)]
pub enum SampleStatus {
    NoData,
    // device gone or stream out of frame
    FatalError(Fault),
    GoodRead(InputEvent),
}

impl SampleStatus {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SampleStatus::FatalError(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Operation requires a {required} but device is {actual}")]
    WrongKind {
        required: DeviceKind,
        actual: String,
    },

    #[error("Device is not open")]
    NotFound,

    #[error("Effect handle is not valid")]
    InvalidEffect,

    #[error("Device I/O failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Default)]
pub enum DeviceHandle {
    #[default]
    Unassigned,
    Keyboard {
        events: DeviceChannel,
    },
    Joystick {
        joystick: DeviceChannel,
    },
    CombinedController {
        identity: String,
        events: DeviceChannel,
        joystick: DeviceChannel,
    },
}

impl DeviceHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(&self) -> Option<DeviceKind> {
        match self {
            DeviceHandle::Unassigned => None,
            DeviceHandle::Keyboard { .. } => Some(DeviceKind::Keyboard),
            DeviceHandle::Joystick { .. } => Some(DeviceKind::Joystick),
            DeviceHandle::CombinedController { .. } => Some(DeviceKind::CombinedController),
        }
    }

    /// Kind of the device if it is found, `None` otherwise
    pub fn type_open(&self) -> Option<DeviceKind> {
        self.kind().filter(|_| self.is_found())
    }

    fn events(&self) -> Option<&DeviceChannel> {
        match self {
            DeviceHandle::Keyboard { events } | DeviceHandle::CombinedController { events, .. } => {
                Some(events)
            }
            _ => None,
        }
    }

    fn joystick(&self) -> Option<&DeviceChannel> {
        match self {
            DeviceHandle::Joystick { joystick }
            | DeviceHandle::CombinedController { joystick, .. } => Some(joystick),
            _ => None,
        }
    }

    pub fn event_channel_open(&self) -> bool {
        self.events().is_some_and(DeviceChannel::is_open)
    }

    pub fn joystick_channel_open(&self) -> bool {
        self.joystick().is_some_and(DeviceChannel::is_open)
    }

    pub fn is_found(&self) -> bool {
        match self {
            DeviceHandle::Unassigned => false,
            DeviceHandle::Keyboard { events } => events.is_open(),
            DeviceHandle::Joystick { joystick } => joystick.is_open(),
            DeviceHandle::CombinedController {
                events, joystick, ..
            } => events.is_open() && joystick.is_open(),
        }
    }

    /// Paths this handle reopens on retry
    pub fn paths(&self) -> Vec<&Path> {
        [self.events(), self.joystick()]
            .into_iter()
            .flatten()
            .map(DeviceChannel::path)
            .collect()
    }

    pub fn raw_fds(&self) -> Vec<RawFd> {
        [self.events(), self.joystick()]
            .into_iter()
            .flatten()
            .filter_map(DeviceChannel::raw_fd)
            .collect()
    }

    pub fn open_path(&mut self, path: impl Into<PathBuf>, kind: DeviceKind) {
        if self.is_found() {
            return;
        }

        let path = path.into();
        match kind {
            DeviceKind::Keyboard => {
                let mut events = DeviceChannel::new(path);
                events.open();
                *self = DeviceHandle::Keyboard { events };
            }
            DeviceKind::Joystick => {
                let mut joystick = DeviceChannel::new(path);
                joystick.open();
                *self = DeviceHandle::Joystick { joystick };
            }
            DeviceKind::CombinedController => {
                debug!(
                    "Ignoring open of {} as combined controller: needs a pairing identity",
                    path.display()
                );
            }
        }
    }

    /// Like [`open_path`](Self::open_path) with a numeric kind code; unknown
    /// codes are ignored
    pub fn open_path_code(&mut self, path: impl Into<PathBuf>, code: u8) {
        match DeviceKind::from_code(code) {
            Some(kind) => self.open_path(path, kind),
            None => debug!("Ignoring open with unknown device kind {}", code),
        }
    }

    pub fn open_keyboard(&mut self, number: u32) {
        self.open_path(Path::new(INPUT_DIR).join(format!("event{number}")), DeviceKind::Keyboard);
    }

    pub fn open_joystick(&mut self, number: u32) {
        self.open_path(Path::new(INPUT_DIR).join(format!("js{number}")), DeviceKind::Joystick);
    }

    /// Opens both nodes of a combined controller. Channels that are already
    /// open for the same identity are kept.
    pub fn open_combined(&mut self, paths: CombinedPaths) {
        let same_identity = matches!(
            self,
            DeviceHandle::CombinedController { identity, .. } if *identity == paths.identity
        );
        if !same_identity {
            if self.is_found() {
                return;
            }
            *self = DeviceHandle::CombinedController {
                identity: paths.identity,
                events: DeviceChannel::new(paths.event),
                joystick: DeviceChannel::new(paths.joystick),
            };
        }

        if let DeviceHandle::CombinedController {
            events, joystick, ..
        } = self
        {
            events.open();
            joystick.open();
        }
    }

    /// Reopens closed channels from the recorded paths; no-op once found
    pub fn retry_connection(&mut self) {
        if self.is_found() {
            return;
        }
        match self {
            DeviceHandle::Unassigned => debug!("Retry on unassigned device ignored"),
            DeviceHandle::Keyboard { events } => {
                events.open();
            }
            DeviceHandle::Joystick { joystick } => {
                joystick.open();
            }
            DeviceHandle::CombinedController {
                events, joystick, ..
            } => {
                events.open();
                joystick.open();
            }
        }
    }

    /// Closes every channel, keeping the paths for a later retry
    pub fn close(&mut self) {
        match self {
            DeviceHandle::Unassigned => {}
            DeviceHandle::Keyboard { events } => events.close(),
            DeviceHandle::Joystick { joystick } => joystick.close(),
            DeviceHandle::CombinedController {
                events, joystick, ..
            } => {
                events.close();
                joystick.close();
            }
        }
    }

    /// Keyboard only: zeroes the auto-repeat delay. Other kinds are left alone.
    pub fn disable_auto_repeat(&self) -> Result<(), DeviceError> {
        let DeviceHandle::Keyboard { events } = self else {
            return Ok(());
        };
        let fd = events.raw_fd().ok_or(DeviceError::NotFound)?;
        ioctl::disable_repeat(fd)?;
        info!("Disabled key auto-repeat on {}", events.path().display());
        Ok(())
    }

    /// Reads at most one record without blocking
    ///
    /// Keyboards are read from their evdev node, joysticks and combined
    /// controllers from their joystick node. A fatal outcome closes the
    /// channel so that [`retry_connection`](Self::retry_connection) can
    /// reopen it.
    pub fn sample(&mut self) -> SampleStatus {
        if !self.is_found() {
            return SampleStatus::FatalError(Fault::NotFound);
        }

        match self {
            DeviceHandle::Keyboard { events } => {
                let read = events.read_record::<KEY_RECORD_LEN>();
                Self::finish(events, read, |bytes| {
                    InputEvent::Keyboard(KeyRecord::decode(bytes))
                })
            }
            DeviceHandle::Joystick { joystick }
            | DeviceHandle::CombinedController { joystick, .. } => {
                let read = joystick.read_record::<JOYSTICK_RECORD_LEN>();
                Self::finish(joystick, read, |bytes| {
                    InputEvent::Joystick(JoystickRecord::decode(bytes))
                })
            }
            DeviceHandle::Unassigned => SampleStatus::FatalError(Fault::NotFound),
        }
    }

    fn finish<const N: usize>(
        channel: &mut DeviceChannel,
        read: ChannelRead<N>,
        decode: impl FnOnce(&[u8; N]) -> InputEvent,
    ) -> SampleStatus {
        let fault = match read {
            ChannelRead::Empty => return SampleStatus::NoData,
            ChannelRead::Record(bytes) => return SampleStatus::GoodRead(decode(&bytes)),
            ChannelRead::Closed => Fault::NotFound,
            ChannelRead::Short(got) => Fault::ShortRead { expected: N, got },
            ChannelRead::Failed(e) => Fault::Read(e),
        };
        warn!("Lost {}: {}", channel.path().display(), fault);
        channel.close();
        SampleStatus::FatalError(fault)
    }

    fn effect_channel(&mut self) -> Result<&mut DeviceChannel, DeviceError> {
        match self {
            DeviceHandle::CombinedController { events, .. } => {
                if events.is_open() {
                    Ok(events)
                } else {
                    Err(DeviceError::NotFound)
                }
            }
            other => Err(DeviceError::WrongKind {
                required: DeviceKind::CombinedController,
                actual: other
                    .kind()
                    .map_or_else(|| "unassigned".to_string(), |k| k.to_string()),
            }),
        }
    }

    /// Uploads a rumble effect (intensities in percent, duration in ms)
    ///
    /// Failure is reported through an invalid handle, never raised.
    pub fn setup_effect(
        &mut self,
        strong_percent: u8,
        weak_percent: u8,
        duration_ms: u32,
    ) -> EffectHandle {
        let channel = match self.effect_channel() {
            Ok(channel) => channel,
            Err(e) => {
                warn!("Upload effect skipped: {}", e);
                return EffectHandle::invalid();
            }
        };
        let Some(fd) = channel.raw_fd() else {
            return EffectHandle::invalid();
        };

        match ff::upload_rumble(fd, strong_percent, weak_percent, duration_ms) {
            Ok(handle) => {
                info!("Upload success, id: {}", handle.id());
                handle
            }
            Err(e) => {
                warn!("Upload effect failed: {}", e);
                EffectHandle::invalid()
            }
        }
    }

    fn write_playback(&mut self, effect: &EffectHandle, play: bool) -> Result<(), DeviceError> {
        if !effect.is_valid() {
            return Err(DeviceError::InvalidEffect);
        }
        let channel = self.effect_channel()?;
        channel.write_record(&ff::playback_record(effect.id(), play))?;
        Ok(())
    }

    /// Starts playback; returns as soon as the command is written
    pub fn play_effect(&mut self, effect: &EffectHandle) -> Result<(), DeviceError> {
        self.write_playback(effect, true)
            .inspect_err(|e| warn!("Play effect {} failed: {}", effect.id(), e))
    }

    pub fn stop_effect(&mut self, effect: &EffectHandle) -> Result<(), DeviceError> {
        self.write_playback(effect, false)
            .inspect_err(|e| warn!("Stop effect {} failed: {}", effect.id(), e))
    }

    /// Frees the effect slot (stopping it if playing) and invalidates the
    /// handle, also when the device rejects the removal
    pub fn remove_effect(&mut self, effect: &mut EffectHandle) -> Result<(), DeviceError> {
        if !effect.is_valid() {
            return Err(DeviceError::InvalidEffect);
        }
        let id = effect.id();
        effect.invalidate();

        let fd = self.effect_channel()?.raw_fd().ok_or(DeviceError::NotFound)?;
        ff::erase(fd, id)?;
        debug!("Removed effect {}", id);
        Ok(())
    }
}
