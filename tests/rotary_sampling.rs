use matrix_input::rotary::{
    BitSource, EncoderLines, EventMailbox, PendingEvent, RotaryError, SamplerSettings,
    SamplingThread, SourceError, Wait, WakeSignal,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const CLK: u32 = 1 << 0;
const DT: u32 = 1 << 1;
const SW: u32 = 1 << 2;
const POWER: u32 = 1 << 3;
const IDLE: u32 = CLK | DT | SW | POWER;

/// Feeds queued snapshots to the sampler, one per wait
#[derive(Clone, Default)]
struct ScriptedSource {
    queue: Arc<Mutex<VecDeque<u32>>>,
    refuse: u32,
}

impl ScriptedSource {
    fn push(&self, snapshots: &[u32]) {
        self.queue.lock().unwrap().extend(snapshots);
    }
}

impl BitSource for ScriptedSource {
    fn request_inputs(&mut self, mask: u32) -> Result<u32, SourceError> {
        Ok(mask & !self.refuse)
    }

    fn await_change(
        &mut self,
        _timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Wait, SourceError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(Wait::Cancelled);
            }
            if let Some(bits) = self.queue.lock().unwrap().pop_front() {
                return Ok(Wait::Snapshot(bits));
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

fn settings() -> SamplerSettings {
    SamplerSettings {
        lines: EncoderLines {
            clk: 0,
            dt: 1,
            switch: 2,
            power: Some(3),
        },
        settle: Duration::ZERO,
    }
}

fn start(source: &ScriptedSource) -> (SamplingThread, Arc<EventMailbox>) {
    let mailbox = Arc::new(EventMailbox::new(WakeSignal::new()));
    let thread = SamplingThread::spawn(settings(), Box::new(source.clone()), mailbox.clone())
        .expect("sampler starts");
    (thread, mailbox)
}

/// Waits until the source has consumed everything queued
fn drain(source: &ScriptedSource) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !source.queue.lock().unwrap().is_empty() {
        assert!(Instant::now() < deadline, "sampler did not consume script");
        std::thread::sleep(Duration::from_millis(1));
    }
    // the last snapshot is popped before it is processed
    std::thread::sleep(Duration::from_millis(20));
}

#[test]
fn clockwise_detent_publishes_one_rotation() {
    let source = ScriptedSource::default();
    let (thread, mailbox) = start(&source);

    source.push(&[IDLE & !CLK, IDLE & !CLK & !DT, IDLE & !DT, IDLE]);
    drain(&source);

    assert_eq!(mailbox.take(), PendingEvent::RotateCw);
    assert_eq!(mailbox.take(), PendingEvent::None);
    thread.shutdown().unwrap();
}

#[test]
fn counter_clockwise_detent_publishes_one_rotation() {
    let source = ScriptedSource::default();
    let (thread, mailbox) = start(&source);

    source.push(&[IDLE & !DT, IDLE & !CLK & !DT, IDLE & !CLK, IDLE]);
    drain(&source);

    assert_eq!(mailbox.take(), PendingEvent::RotateCcw);
    thread.shutdown().unwrap();
}

#[test]
fn stale_snapshots_inside_detent_still_publish_once() {
    let source = ScriptedSource::default();
    let (thread, mailbox) = start(&source);

    // each level is seen twice: once by a read that raced the change
    source.push(&[
        IDLE,
        IDLE & !CLK,
        IDLE & !CLK,
        IDLE & !CLK & !DT,
        IDLE & !CLK & !DT,
        IDLE & !DT,
        IDLE & !DT,
        IDLE,
    ]);
    drain(&source);

    assert_eq!(mailbox.take(), PendingEvent::RotateCw);
    assert_eq!(mailbox.take(), PendingEvent::None);
    thread.shutdown().unwrap();
}

#[test]
fn aborted_cycle_publishes_nothing() {
    let source = ScriptedSource::default();
    let (thread, mailbox) = start(&source);

    // start clockwise, bounce back to neutral
    source.push(&[IDLE & !CLK, IDLE]);
    drain(&source);

    assert_eq!(mailbox.peek(), PendingEvent::None);
    thread.shutdown().unwrap();
}

#[test]
fn switch_bounce_yields_single_press() {
    let source = ScriptedSource::default();
    let (thread, mailbox) = start(&source);

    source.push(&[IDLE, IDLE & !SW, IDLE & !SW, IDLE]);
    drain(&source);

    assert_eq!(mailbox.take(), PendingEvent::SwitchPress);
    assert_eq!(mailbox.take(), PendingEvent::None);
    thread.shutdown().unwrap();
}

#[test]
fn newest_unread_event_wins() {
    let source = ScriptedSource::default();
    let (thread, mailbox) = start(&source);

    source.push(&[IDLE & !CLK, IDLE & !CLK & !DT, IDLE & !DT, IDLE]);
    source.push(&[IDLE & !POWER, IDLE]);
    drain(&source);

    assert_eq!(mailbox.take(), PendingEvent::PowerSwitchPress);
    thread.shutdown().unwrap();
}

#[test]
fn unreserved_lines_fail_spawn() {
    let source = ScriptedSource {
        refuse: POWER,
        ..ScriptedSource::default()
    };
    let mailbox = Arc::new(EventMailbox::new(WakeSignal::new()));

    match SamplingThread::spawn(settings(), Box::new(source), mailbox) {
        Err(RotaryError::LinesNotReserved { missing }) => assert_eq!(missing, POWER),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("spawn succeeded without all lines"),
    }
}

#[test]
fn shutdown_interrupts_indefinite_wait() {
    let source = ScriptedSource::default();
    let (thread, _mailbox) = start(&source);
    assert!(thread.is_running());

    let started = Instant::now();
    thread.shutdown().unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn consumer_is_woken_by_publish() {
    let source = ScriptedSource::default();
    let (thread, mailbox) = start(&source);
    let wake = mailbox.wake_signal().clone();

    source.push(&[IDLE & !SW]);
    tokio::time::timeout(Duration::from_secs(5), wake.wait())
        .await
        .expect("wake raised");
    assert_eq!(mailbox.take(), PendingEvent::SwitchPress);

    tokio::task::spawn_blocking(move || thread.shutdown())
        .await
        .unwrap()
        .unwrap();
}
