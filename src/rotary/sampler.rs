//! Sampling thread for the encoder board
//!
//! Owns the bit-vector source exclusively. The lifecycle is a statum typestate:
//!
//! ```text
//! Reserving ──(request_inputs)──► Sampling ──(cancel at the wait point)──► done
//! ```
//!
//! Reservation happens on the caller's thread, so a missing or busy GPIO
//! peripheral fails [`SamplingThread::spawn`] immediately instead of leaving a
//! half-started input path behind.

use chrono::Local;
use statum::{machine, state};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::decoder::{pin_pair, QuadratureDecoder};
use super::edge::EdgeDetector;
use super::mailbox::{EventMailbox, PendingEvent, SampleEvents};
use super::source::{BitSource, SourceError, Wait};

/// BCM line numbers of the encoder board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderLines {
    // phase A and B
    pub clk: u8,
    pub dt: u8,
    pub switch: u8,
    pub power: Option<u8>,
}

impl EncoderLines {
    pub fn mask(&self) -> u32 {
        let mut mask = bit(self.clk) | bit(self.dt) | bit(self.switch);
        if let Some(power) = self.power {
            mask |= bit(power);
        }
        mask
    }
}

fn bit(line: u8) -> u32 {
    1u32.checked_shl(u32::from(line)).unwrap_or(0)
}

fn level(bits: u32, line: u8) -> bool {
    bits & bit(line) != 0
}

#[derive(Debug, Clone)]
pub struct SamplerSettings {
    pub lines: EncoderLines,
    pub settle: Duration,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            lines: EncoderLines {
                clk: 25,
                dt: 9,
                switch: 10,
                power: Some(3),
            },
            settle: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RotaryError {
    #[error("Input source error: {0}")]
    Source(#[from] SourceError),

    #[error("Input lines {missing:#010x} could not be reserved")]
    LinesNotReserved { missing: u32 },

    #[error("Failed to start sampling thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    #[error("Sampling thread panicked")]
    ThreadPanicked,
}

#[state]
#[derive(Debug, Clone)]
pub enum SamplerState {
    Reserving,
    Sampling,
}

#[machine]
pub struct EncoderSampler<S: SamplerState> {
    source: Box<dyn BitSource>,
    settings: SamplerSettings,
    decoder: QuadratureDecoder,
    switch: EdgeDetector,
    power: Option<EdgeDetector>,
    mailbox: Arc<EventMailbox>,
}

impl<S: SamplerState> EncoderSampler<S> {
    pub fn settings(&self) -> &SamplerSettings {
        &self.settings
    }
}

impl EncoderSampler<Reserving> {
    pub fn create(
        settings: SamplerSettings,
        source: Box<dyn BitSource>,
        mailbox: Arc<EventMailbox>,
    ) -> Self {
        debug!("Creating encoder sampler for {:?}", settings.lines);
        let power = settings.lines.power.map(|_| EdgeDetector::active_low());
        Self::new(
            source,
            settings,
            QuadratureDecoder::new(),
            EdgeDetector::active_low(),
            power,
            mailbox,
        )
    }

    /// Reserves all monitored lines and transitions to Sampling
    pub fn reserve(mut self) -> Result<EncoderSampler<Sampling>, RotaryError> {
        let wanted = self.settings.lines.mask();
        let reserved = self.source.request_inputs(wanted)?;
        let missing = wanted & !reserved;
        if missing != 0 {
            error!("Input lines {:#010x} were not reserved", missing);
            return Err(RotaryError::LinesNotReserved { missing });
        }

        info!("Encoder lines reserved, transitioning to Sampling state");
        Ok(self.transition())
    }
}

impl EncoderSampler<Sampling> {
    /// Runs decoder and edge detectors on one snapshot and publishes the result
    pub fn process(&mut self, bits: u32) -> Option<PendingEvent> {
        let lines = self.settings.lines;
        let pins = pin_pair(level(bits, lines.clk), level(bits, lines.dt));

        let events = SampleEvents {
            rotation: self.decoder.step(pins),
            switch_pressed: self.switch.update(level(bits, lines.switch)),
            power_pressed: match (self.power.as_mut(), lines.power) {
                (Some(detector), Some(line)) => detector.update(level(bits, line)),
                _ => false,
            },
        };

        trace!(
            "bits={:#010x} pins={:02b} state={:?}",
            bits,
            pins,
            self.decoder.state()
        );
        self.mailbox.publish(events)
    }

    /// Blocks on the source until cancelled. Source failures end the loop.
    pub fn run(&mut self, cancel: &CancellationToken) -> Result<(), RotaryError> {
        if !self.settings.settle.is_zero() {
            std::thread::sleep(self.settings.settle);
        }
        info!("Starting encoder sampling loop");

        let mut changes = 0u64;
        let mut published = 0u64;
        let mut last_log_time = Local::now();
        let log_interval = chrono::Duration::seconds(60);

        loop {
            let bits = match self.source.await_change(None, cancel)? {
                Wait::Snapshot(bits) => bits,
                Wait::Cancelled => {
                    info!("Encoder sampling cancelled");
                    return Ok(());
                }
            };
            changes += 1;

            if let Some(event) = self.process(bits) {
                debug!("Published {:?}", event);
                published += 1;
            }

            let now = Local::now();
            if now - last_log_time > log_interval {
                info!(
                    "Encoder sampler stats: {} line changes, {} events in last {} seconds",
                    changes,
                    published,
                    log_interval.num_seconds()
                );
                changes = 0;
                published = 0;
                last_log_time = now;
            }
        }
    }
}

/// Handle to the running sampler thread
///
/// Dropping the handle cancels the thread and joins it.
pub struct SamplingThread {
    cancel: CancellationToken,
    handle: Option<JoinHandle<Result<(), RotaryError>>>,
}

impl SamplingThread {
    pub fn spawn(
        settings: SamplerSettings,
        source: Box<dyn BitSource>,
        mailbox: Arc<EventMailbox>,
    ) -> Result<Self, RotaryError> {
        info!("Spawning encoder sampling thread");
        let mut sampler = EncoderSampler::create(settings, source, mailbox).reserve()?;

        let cancel = CancellationToken::new();
        let thread_cancel = cancel.clone();
        let handle = std::thread::Builder::new()
            .name("encoder-sampler".to_string())
            .spawn(move || {
                let result = sampler.run(&thread_cancel);
                if let Err(e) = &result {
                    error!("Encoder sampling thread terminated with error: {}", e);
                }
                result
            })
            .map_err(RotaryError::ThreadSpawn)?;

        info!("Encoder sampling thread started");
        Ok(Self {
            cancel,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels the thread and waits for it to leave its blocking wait
    pub fn shutdown(mut self) -> Result<(), RotaryError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), RotaryError> {
        self.cancel.cancel();
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| RotaryError::ThreadPanicked)?,
            None => Ok(()),
        }
    }
}

impl Drop for SamplingThread {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Encoder sampling thread ended with error: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_covers_all_configured_lines() {
        let lines = EncoderLines {
            clk: 25,
            dt: 9,
            switch: 10,
            power: Some(3),
        };
        assert_eq!(lines.mask(), (1 << 25) | (1 << 9) | (1 << 10) | (1 << 3));

        let without_power = EncoderLines { power: None, ..lines };
        assert_eq!(without_power.mask() & (1 << 3), 0);
    }

    #[test]
    fn out_of_range_line_maps_to_no_bit() {
        assert_eq!(bit(40), 0);
        assert!(!level(u32::MAX, 40));
    }
}
