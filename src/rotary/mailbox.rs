//! Single-slot event mailbox between the sampling thread and its consumer
//!
//! The slot holds at most one unread [`PendingEvent`]; a newer event always
//! replaces an unread older one. Rapid distinct events between two reads are
//! therefore lossy, only the latest survives.
//!
//! After storing, the producer raises a [`WakeSignal`]. The signal carries no
//! data: it only cuts short whatever the consumer is currently waiting on
//! (typically its own refresh timer) so it calls [`EventMailbox::take`]
//! promptly. Raising it while the consumer is already running is harmless.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::trace;

use super::decoder::Direction;

/// Event kinds the encoder board can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PendingEvent {
    #[default]
    None,
    RotateCw,
    RotateCcw,
    SwitchPress,
    PowerSwitchPress,
}

impl PendingEvent {
    pub fn is_none(&self) -> bool {
        matches!(self, PendingEvent::None)
    }
}

impl From<Direction> for PendingEvent {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Clockwise => PendingEvent::RotateCw,
            Direction::CounterClockwise => PendingEvent::RotateCcw,
        }
    }
}

/// Everything one bit-vector sample produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleEvents {
    pub rotation: Option<Direction>,
    pub switch_pressed: bool,
    pub power_pressed: bool,
}

impl SampleEvents {
    /// Resolves simultaneous conditions to the one stored event.
    ///
    /// Conditions are checked in the order rotation, switch, power switch and a
    /// later match overwrites an earlier one, so the power switch wins over the
    /// main switch, which wins over rotation.
    pub fn resolve(&self) -> Option<PendingEvent> {
        let mut event = None;
        if let Some(direction) = self.rotation {
            event = Some(PendingEvent::from(direction));
        }
        if self.switch_pressed {
            event = Some(PendingEvent::SwitchPress);
        }
        if self.power_pressed {
            event = Some(PendingEvent::PowerSwitchPress);
        }
        event
    }
}

/// Best-effort, data-free wake-up aimed at one consumer
///
/// Cloning shares the same target. At most one wake-up is buffered when the
/// consumer is not currently waiting, so repeated raises collapse into one.
#[derive(Debug, Clone, Default)]
pub struct WakeSignal {
    notify: Arc<Notify>,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.notify.notify_one();
    }

    /// Resolves at the next raise, or immediately if one is already buffered
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// Mutex-guarded latest-wins slot plus the consumer's wake signal
#[derive(Debug)]
pub struct EventMailbox {
    slot: Mutex<PendingEvent>,
    wake: WakeSignal,
}

impl EventMailbox {
    pub fn new(wake: WakeSignal) -> Self {
        Self {
            slot: Mutex::new(PendingEvent::None),
            wake,
        }
    }

    pub fn wake_signal(&self) -> &WakeSignal {
        &self.wake
    }

    fn lock(&self) -> MutexGuard<'_, PendingEvent> {
        // The slot is plain data, a panicked holder cannot leave it torn.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores the resolved event of one sample and wakes the consumer.
    /// Returns the stored event, or `None` when the sample produced nothing.
    pub fn publish(&self, events: SampleEvents) -> Option<PendingEvent> {
        let stored = {
            let mut slot = self.lock();
            let resolved = events.resolve();
            if let Some(event) = resolved {
                if !slot.is_none() {
                    trace!("Overwriting unread {:?} with {:?}", *slot, event);
                }
                *slot = event;
            }
            resolved
        };

        if stored.is_some() {
            self.wake.raise();
        }
        stored
    }

    /// Stores a single event directly and wakes the consumer
    pub fn post(&self, event: PendingEvent) {
        if event.is_none() {
            return;
        }
        *self.lock() = event;
        self.wake.raise();
    }

    /// Returns the stored event and clears the slot in one step
    pub fn take(&self) -> PendingEvent {
        std::mem::take(&mut *self.lock())
    }

    pub fn peek(&self) -> PendingEvent {
        *self.lock()
    }
}
