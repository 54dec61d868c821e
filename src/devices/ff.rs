//! Force-feedback (rumble) effects on the evdev channel of a controller
//!
//! Effects live in the device's own effect table. Uploading returns an id;
//! play and stop are `EV_FF` records written to the same node; removing frees
//! the slot and stops the effect if it is still playing.

use libc::c_uint;
use std::io;
use std::os::unix::io::RawFd;
use tracing::{debug, warn};

use super::event::{KeyRecord, EV_FF, KEY_RECORD_LEN};
use super::ioctl;

pub const FF_RUMBLE: u16 = 0x50;

// full scale of the two PS3 motors
pub const STRONG_MAX: u32 = 0x8000;
pub const WEAK_MAX: u32 = 0xC000;

/// Longest replay the kernel accepts, in milliseconds
pub const MAX_DURATION_MS: u32 = 0x7FFF;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfTrigger {
    pub button: u16,
    pub interval: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfReplay {
    pub length: u16,
    pub delay: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfEnvelope {
    pub attack_length: u16,
    pub attack_level: u16,
    pub fade_length: u16,
    pub fade_level: u16,
}

// largest member of the kernel's effect union, sets size and alignment
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfPeriodicEffect {
    pub waveform: u16,
    pub period: u16,
    pub magnitude: i16,
    pub offset: i16,
    pub phase: u16,
    pub envelope: FfEnvelope,
    pub custom_len: c_uint,
    pub custom_data: *mut i16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfRumbleEffect {
    pub strong_magnitude: u16,
    pub weak_magnitude: u16,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union FfEffectData {
    pub rumble: FfRumbleEffect,
    pub periodic: FfPeriodicEffect,
}

/// `struct ff_effect`
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FfEffect {
    pub effect_type: u16,
    pub id: i16,
    pub direction: u16,
    pub trigger: FfTrigger,
    pub replay: FfReplay,
    pub u: FfEffectData,
}

impl FfEffect {
    pub fn rumble(strong_magnitude: u16, weak_magnitude: u16, length_ms: u16) -> Self {
        // SAFETY: every field is an integer or a raw pointer, all-zero is valid.
        let mut effect: FfEffect = unsafe { std::mem::zeroed() };
        effect.effect_type = FF_RUMBLE;
        effect.id = EffectHandle::INVALID_ID;
        effect.replay = FfReplay {
            length: length_ms,
            delay: 0,
        };
        effect.u.rumble = FfRumbleEffect {
            strong_magnitude,
            weak_magnitude,
        };
        effect
    }
}

/// Scales a 0-100 % intensity onto a motor's full-scale magnitude
pub fn magnitude(percent: u8, full_scale: u32) -> u16 {
    let scaled = (f64::from(percent.min(100)) / 100.0 * f64::from(full_scale)).round();
    scaled.min(f64::from(u16::MAX)) as u16
}

/// Id of an effect uploaded to one device
///
/// Not `Clone`: the caller owns exactly one handle per uploaded effect, and
/// removing the effect invalidates it.
#[derive(Debug, PartialEq, Eq)]
pub struct EffectHandle {
    id: i16,
}

impl EffectHandle {
    pub const INVALID_ID: i16 = -1;

    pub fn invalid() -> Self {
        Self {
            id: Self::INVALID_ID,
        }
    }

    /// Wraps an id obtained elsewhere, e.g. one uploaded before a restart
    pub fn from_raw(id: i16) -> Self {
        Self { id }
    }

    pub fn id(&self) -> i16 {
        self.id
    }

    pub fn is_valid(&self) -> bool {
        self.id >= 0
    }

    pub(crate) fn invalidate(&mut self) {
        self.id = Self::INVALID_ID;
    }
}

/// Uploads a rumble effect, returning the id the kernel assigned
pub fn upload_rumble(
    fd: RawFd,
    strong_percent: u8,
    weak_percent: u8,
    duration_ms: u32,
) -> io::Result<EffectHandle> {
    let length = duration_ms.min(MAX_DURATION_MS) as u16;
    let mut effect = FfEffect::rumble(
        magnitude(strong_percent, STRONG_MAX),
        magnitude(weak_percent, WEAK_MAX),
        length,
    );
    ioctl::upload_effect(fd, &mut effect)?;
    debug!("Uploaded rumble effect, id: {}", effect.id);
    Ok(EffectHandle::from_raw(effect.id))
}

/// The `EV_FF` record that starts (`play = true`) or stops an effect
pub fn playback_record(id: i16, play: bool) -> [u8; KEY_RECORD_LEN] {
    KeyRecord::new(EV_FF, id as u16, i32::from(play)).encode()
}

pub fn erase(fd: RawFd, id: i16) -> io::Result<()> {
    ioctl::erase_effect(fd, id).inspect_err(|e| warn!("Remove effect {} failed: {}", id, e))
}
