//! Rotary encoder input path
//!
//! A dedicated thread blocks on the GPIO lines of the encoder board and hands
//! completed gestures to a consumer that is busy with its own timers:
//!
//! ```text
//! GPIO lines ──► BitSource ──► EncoderSampler ──► EventMailbox ──► consumer take()
//!                               │  decoder           │
//!                               │  edge detectors    └──► WakeSignal (no payload)
//! ```
//!
//! 1. [`decoder`] - table-driven quadrature state machine
//! 2. [`edge`] - press detection for the shaft switch and power switch
//! 3. [`mailbox`] - latest-wins single slot plus the consumer wake signal
//! 4. [`source`] - bit-vector source trait and the rppal backend
//! 5. [`sampler`] - the sampling thread and its lifecycle

pub mod decoder;
pub mod edge;
pub mod mailbox;
pub mod sampler;
pub mod source;

pub use decoder::{Direction, EncoderState, QuadratureDecoder};
pub use edge::EdgeDetector;
pub use mailbox::{EventMailbox, PendingEvent, SampleEvents, WakeSignal};
pub use sampler::{EncoderLines, RotaryError, SamplerSettings, SamplingThread};
pub use source::{BitSource, GpioBitSource, SourceError, Wait};
