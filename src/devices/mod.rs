//! Keyboards, joysticks and combined game controllers under `/dev/input`
//!
//! ```text
//! DeviceSamplingLoop ──tick──► DeviceHandle::sample ──► DeviceChannel (O_NONBLOCK)
//!        │                          │
//!        └─ on_event(InputEvent)    └─ ff / ioctl (rumble, key repeat)
//! ```

pub mod channel;
pub mod event;
pub mod ff;
pub mod handle;
pub mod ioctl;
pub mod poll_loop;
pub mod ps3;

pub use event::{InputEvent, JoystickRecord, KeyRecord};
pub use ff::EffectHandle;
pub use handle::{CombinedPaths, DeviceError, DeviceHandle, DeviceKind, Fault, SampleStatus};
pub use poll_loop::{
    DeviceEvent, DeviceSamplingLoop, LoopError, LoopSettings, LostDevice, NamedDevice, Tick,
};
