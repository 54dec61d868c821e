//! Cooperative sampling loop over a fixed set of devices
//!
//! Single-threaded: every [`DeviceHandle::sample`] is non-blocking, so one
//! caller polls all devices at a bounded rate without locking. Sleeping is
//! only allowed in the startup connect-wait and between ticks.

use chrono::Local;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::event::InputEvent;
use super::handle::{DeviceHandle, DeviceKind, Fault, SampleStatus};

// records drained from one device per tick
const MAX_RECORDS_PER_TICK: usize = 64;

const CANCEL_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub max_connect_tries: u32,
    pub retry_interval: Duration,
    // pause between ticks
    pub poll_interval: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_connect_tries: 5,
            retry_interval: Duration::from_millis(2000),
            poll_interval: Duration::from_micros(1000),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error("Devices not found after connect-wait: {}", missing.join(", "))]
    ConnectTimeout { missing: Vec<String> },

    #[error("Lost device {name}: {reason}")]
    DeviceLost { name: String, reason: String },

    #[error("Interrupted")]
    Interrupted,
}

#[derive(Debug)]
pub struct NamedDevice {
    pub name: String,
    pub handle: DeviceHandle,
}

/// One record together with the index of the device that produced it
#[derive(Debug)]
pub struct DeviceEvent {
    pub device: usize,
    pub event: InputEvent,
}

/// The first device that failed during a tick
#[derive(Debug)]
pub struct LostDevice {
    pub name: String,
    pub fault: Fault,
}

/// Everything one pass over the devices produced
#[derive(Debug, Default)]
pub struct Tick {
    pub events: Vec<DeviceEvent>,
    pub lost: Option<LostDevice>,
}

#[derive(Debug, Default)]
pub struct DeviceSamplingLoop {
    devices: Vec<NamedDevice>,
    settings: LoopSettings,
}

impl DeviceSamplingLoop {
    pub fn new(settings: LoopSettings) -> Self {
        Self {
            devices: Vec::new(),
            settings,
        }
    }

    pub fn add(&mut self, name: impl Into<String>, handle: DeviceHandle) -> usize {
        let name = name.into();
        debug!("Adding device {} ({:?})", name, handle.kind());
        self.devices.push(NamedDevice { name, handle });
        self.devices.len() - 1
    }

    pub fn devices(&self) -> &[NamedDevice] {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut [NamedDevice] {
        &mut self.devices
    }

    pub fn device_mut(&mut self, name: &str) -> Option<&mut NamedDevice> {
        self.devices.iter_mut().find(|d| d.name == name)
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn missing(&self) -> Vec<String> {
        self.devices
            .iter()
            .filter(|d| !d.handle.is_found())
            .map(|d| d.name.clone())
            .collect()
    }

    pub fn all_found(&self) -> bool {
        self.devices.iter().all(|d| d.handle.is_found())
    }

    pub fn retry_all(&mut self) {
        for device in &mut self.devices {
            device.handle.retry_connection();
        }
    }

    /// Startup connect-wait
    ///
    /// Retries every missing device up to `max_connect_tries` rounds, sleeping
    /// `retry_interval` before each round. Once everything is found,
    /// keyboards get their auto-repeat disabled.
    pub fn wait_for_devices(&mut self, cancel: &CancellationToken) -> Result<(), LoopError> {
        let mut tries = 0;
        while !self.all_found() {
            if tries >= self.settings.max_connect_tries {
                let missing = self.missing();
                warn!("Giving up on devices: {}", missing.join(", "));
                return Err(LoopError::ConnectTimeout { missing });
            }
            tries += 1;

            info!(
                "Waiting for devices ({}/{}): {}",
                tries,
                self.settings.max_connect_tries,
                self.missing().join(", ")
            );
            if !sleep_unless_cancelled(self.settings.retry_interval, cancel) {
                return Err(LoopError::Interrupted);
            }
            self.retry_all();
        }

        info!("All {} devices found", self.devices.len());
        for device in &self.devices {
            if device.handle.kind() == Some(DeviceKind::Keyboard) {
                if let Err(e) = device.handle.disable_auto_repeat() {
                    warn!("Could not disable auto-repeat on {}: {}", device.name, e);
                }
            }
        }
        Ok(())
    }

    /// Samples every device once, draining pending records
    ///
    /// A fatal read stops sampling that device only. Records already taken
    /// from the kernel, from it or from any other device, stay in the tick.
    pub fn tick(&mut self) -> Tick {
        let mut tick = Tick::default();
        for (index, device) in self.devices.iter_mut().enumerate() {
            for _ in 0..MAX_RECORDS_PER_TICK {
                match device.handle.sample() {
                    SampleStatus::NoData => break,
                    SampleStatus::GoodRead(event) => {
                        trace!("{}: {}", device.name, event);
                        tick.events.push(DeviceEvent {
                            device: index,
                            event,
                        });
                    }
                    SampleStatus::FatalError(fault) => {
                        if tick.lost.is_none() {
                            tick.lost = Some(LostDevice {
                                name: device.name.clone(),
                                fault,
                            });
                        }
                        break;
                    }
                }
            }
        }
        tick
    }

    /// Steady-state loop; returns `Ok` on cancellation and the loss error
    /// when any required device disappears
    pub fn run<F>(&mut self, cancel: &CancellationToken, mut on_event: F) -> Result<(), LoopError>
    where
        F: FnMut(&mut NamedDevice, &InputEvent),
    {
        info!("Starting device sampling loop");
        let mut ticks = 0u64;
        let mut records = 0u64;
        let mut last_log_time = Local::now();
        let log_interval = chrono::Duration::seconds(60);

        while !cancel.is_cancelled() {
            let started = Instant::now();
            let Tick { events, lost } = self.tick();
            ticks += 1;
            records += events.len() as u64;

            for DeviceEvent { device, event } in events {
                if let Some(target) = self.devices.get_mut(device) {
                    on_event(target, &event);
                }
            }

            if let Some(LostDevice { name, fault }) = lost {
                return Err(LoopError::DeviceLost {
                    name,
                    reason: fault.to_string(),
                });
            }

            let now = Local::now();
            if now - last_log_time > log_interval {
                info!(
                    "Device loop stats: {} ticks, {} records in last {} seconds",
                    ticks,
                    records,
                    log_interval.num_seconds()
                );
                ticks = 0;
                records = 0;
                last_log_time = now;
            }

            let elapsed = started.elapsed();
            if elapsed < self.settings.poll_interval {
                std::thread::sleep(self.settings.poll_interval - elapsed);
            }
        }

        info!("Device sampling loop cancelled");
        Ok(())
    }

    pub fn close_all(&mut self) {
        for device in &mut self.devices {
            device.handle.close();
        }
    }
}

// false if cancelled first
fn sleep_unless_cancelled(duration: Duration, cancel: &CancellationToken) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(CANCEL_POLL.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_settings(tries: u32) -> LoopSettings {
        LoopSettings {
            max_connect_tries: tries,
            retry_interval: Duration::from_millis(1),
            poll_interval: Duration::from_millis(1),
        }
    }

    #[test]
    fn empty_loop_is_trivially_connected() {
        let mut lp = DeviceSamplingLoop::new(quick_settings(0));
        assert!(lp.wait_for_devices(&CancellationToken::new()).is_ok());
        let tick = lp.tick();
        assert!(tick.events.is_empty() && tick.lost.is_none());
    }

    #[test]
    fn connect_wait_times_out_naming_missing_devices() {
        let mut lp = DeviceSamplingLoop::new(quick_settings(2));
        let mut pad = DeviceHandle::new();
        pad.open_path("/nonexistent/js7", DeviceKind::Joystick);
        lp.add("pad", pad);

        match lp.wait_for_devices(&CancellationToken::new()) {
            Err(LoopError::ConnectTimeout { missing }) => assert_eq!(missing, vec!["pad"]),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn connect_wait_honors_cancellation() {
        let mut lp = DeviceSamplingLoop::new(LoopSettings {
            retry_interval: Duration::from_secs(30),
            ..quick_settings(3)
        });
        let mut pad = DeviceHandle::new();
        pad.open_path("/nonexistent/js7", DeviceKind::Joystick);
        lp.add("pad", pad);

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            lp.wait_for_devices(&cancel),
            Err(LoopError::Interrupted)
        ));
    }

    #[test]
    fn tick_reports_missing_device_as_lost() {
        let mut lp = DeviceSamplingLoop::default();
        let mut kb = DeviceHandle::new();
        kb.open_path("/nonexistent/event7", DeviceKind::Keyboard);
        lp.add("kb", kb);

        match lp.tick().lost {
            Some(LostDevice {
                name,
                fault: Fault::NotFound,
            }) => assert_eq!(name, "kb"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
