//! Counter driven by the encoder board
//!
//! Consumes the mailbox on its own refresh timer and is woken early by the
//! sampler's wake signal.

use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::rotary::{EventMailbox, PendingEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterExit {
    Cancelled,
    PowerDown,
}

pub struct RotaryCounter {
    mailbox: Arc<EventMailbox>,
    refresh: Duration,
    power_command: Option<Vec<String>>,
    count: i64,
}

impl RotaryCounter {
    pub fn new(
        mailbox: Arc<EventMailbox>,
        refresh: Duration,
        power_command: Option<Vec<String>>,
    ) -> Self {
        Self {
            mailbox,
            refresh: refresh.max(Duration::from_millis(1)),
            power_command,
            count: 0,
        }
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    /// Applies one event; returns `true` on power-switch press
    pub fn apply(&mut self, event: PendingEvent) -> bool {
        let before = self.count;
        match event {
            PendingEvent::None => return false,
            PendingEvent::RotateCw => self.count += 1,
            PendingEvent::RotateCcw => self.count -= 1,
            PendingEvent::SwitchPress => self.count = 0,
            PendingEvent::PowerSwitchPress => {
                info!("Power switch pressed, power down");
                return true;
            }
        }
        if self.count != before {
            info!("Count: {}", self.count);
        }
        false
    }

    pub async fn run(&mut self, cancel: CancellationToken) -> CounterExit {
        let wake = self.mailbox.wake_signal().clone();
        let mut refresh = tokio::time::interval(self.refresh);
        info!("Counter running, refresh every {:?}", self.refresh);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Counter cancelled at {}", self.count);
                    return CounterExit::Cancelled;
                }
                _ = wake.wait() => debug!("Woken by sampler"),
                _ = refresh.tick() => {}
            }

            if self.apply(self.mailbox.take()) {
                self.power_down().await;
                return CounterExit::PowerDown;
            }
        }
    }

    async fn power_down(&self) {
        let Some((program, args)) = self.power_command.as_ref().and_then(|c| c.split_first())
        else {
            return;
        };

        info!("Running power command {}", program);
        match Command::new(program).args(args).status().await {
            Ok(status) if status.success() => debug!("Power command finished"),
            Ok(status) => warn!("Power command exited with {}", status),
            Err(e) => warn!("Failed to run power command {}: {}", program, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotary::WakeSignal;

    fn counter() -> RotaryCounter {
        let mailbox = Arc::new(EventMailbox::new(WakeSignal::new()));
        RotaryCounter::new(mailbox, Duration::from_secs(60), None)
    }

    #[test]
    fn rotation_counts_and_switch_resets() {
        let mut c = counter();
        assert!(!c.apply(PendingEvent::RotateCw));
        assert!(!c.apply(PendingEvent::RotateCw));
        assert!(!c.apply(PendingEvent::RotateCcw));
        assert_eq!(c.count(), 1);
        assert!(!c.apply(PendingEvent::SwitchPress));
        assert_eq!(c.count(), 0);
        assert!(!c.apply(PendingEvent::None));
        assert!(c.apply(PendingEvent::PowerSwitchPress));
    }

    #[tokio::test]
    async fn wake_delivers_before_refresh_timer() {
        let mut c = counter();
        c.mailbox.post(PendingEvent::PowerSwitchPress);

        let exit = tokio::time::timeout(Duration::from_secs(5), c.run(CancellationToken::new()))
            .await
            .unwrap();
        assert_eq!(exit, CounterExit::PowerDown);
    }

    #[tokio::test]
    async fn cancellation_ends_run() {
        let mut c = counter();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(c.run(cancel).await, CounterExit::Cancelled);
    }
}
