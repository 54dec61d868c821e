//! Bit-vector input source for the encoder board
//!
//! The sampler only needs two operations from the hardware: reserve a set of
//! input lines, and block until any of them changes, returning a snapshot of
//! all reserved levels as one bit vector (bit n = BCM line n).

use rppal::gpio::{Gpio, InputPin, Trigger};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const CANCEL_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("GPIO access failed: {0}")]
    Gpio(#[from] rppal::gpio::Error),

    #[error("Input source unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of one blocking wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Snapshot(u32),
    Cancelled,
}

pub trait BitSource: Send {
    /// Reserves every line whose bit is set in `mask` as an input.
    /// Returns the mask actually reserved.
    fn request_inputs(&mut self, mask: u32) -> Result<u32, SourceError>;

    /// Blocks until any reserved line changes level.
    ///
    /// `None` waits indefinitely, `Some(Duration::ZERO)` reads the current
    /// levels immediately. A timeout also yields the current snapshot.
    fn await_change(
        &mut self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Wait, SourceError>;
}

/// Raspberry Pi GPIO lines through rppal, edge interrupts on both edges
pub struct GpioBitSource {
    gpio: Gpio,
    pins: Vec<InputPin>,
}

impl GpioBitSource {
    pub fn new() -> Result<Self, SourceError> {
        let gpio = Gpio::new()?;
        info!("Opened GPIO peripheral");
        Ok(Self {
            gpio,
            pins: Vec::new(),
        })
    }

    // rppal reads one line per call, so the snapshot is not taken in a single
    // register read. Quadrature phases change one at a time: a read that
    // straddles a change sees either the old or the new pin pair, and the
    // change raises its own interrupt so the next snapshot carries it. The
    // decoder treats a repeated pair as "stay".
    fn snapshot(&self) -> u32 {
        self.pins
            .iter()
            .filter(|pin| pin.is_high())
            .fold(0u32, |bits, pin| bits | (1u32 << pin.pin()))
    }
}

impl BitSource for GpioBitSource {
    fn request_inputs(&mut self, mask: u32) -> Result<u32, SourceError> {
        let mut reserved = 0u32;
        for line in (0..32u8).filter(|line| mask & (1u32 << line) != 0) {
            if self.pins.iter().any(|pin| pin.pin() == line) {
                reserved |= 1u32 << line;
                continue;
            }

            let mut pin = self.gpio.get(line)?.into_input_pullup();
            pin.set_interrupt(Trigger::Both, None)?;
            debug!("Reserved GPIO line {} as pulled-up input", line);
            self.pins.push(pin);
            reserved |= 1u32 << line;
        }
        info!("Reserved input lines {:#010x}", reserved);
        Ok(reserved)
    }

    fn await_change(
        &mut self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Wait, SourceError> {
        if self.pins.is_empty() {
            return Err(SourceError::Unavailable(
                "no input lines reserved".to_string(),
            ));
        }
        if timeout == Some(Duration::ZERO) {
            return Ok(Wait::Snapshot(self.snapshot()));
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        let pins: Vec<&InputPin> = self.pins.iter().collect();

        loop {
            if cancel.is_cancelled() {
                return Ok(Wait::Cancelled);
            }

            let slice = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(Wait::Snapshot(self.snapshot()));
                    }
                    remaining.min(CANCEL_POLL)
                }
                None => CANCEL_POLL,
            };

            if let Some((pin, event)) = self.gpio.poll_interrupts(&pins, false, Some(slice))? {
                debug!("Line {} changed: {:?}", pin.pin(), event.trigger);
                return Ok(Wait::Snapshot(self.snapshot()));
            }
        }
    }
}
