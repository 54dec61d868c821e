//! Front-ends that exercise the two input paths

pub mod rotary_counter;

pub use rotary_counter::{CounterExit, RotaryCounter};
