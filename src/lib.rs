//! Input acquisition for an LED-matrix display
//!
//! Two independent input paths:
//!
//! - [`rotary`]: a sampling thread blocked on the GPIO lines of a quadrature
//!   encoder board, handing gestures to a consumer through a one-slot mailbox
//! - [`devices`]: non-blocking polling of keyboards, joysticks and combined
//!   game controllers under `/dev/input`, including rumble effects

pub mod apps;
pub mod config;
pub mod devices;
pub mod rotary;
