//! Quadrature decoder for a mechanical rotary encoder
//!
//! A Mealy machine over the two phase pins (CLK = A, DT = B). Every pin change
//! is fed through a fixed 8×4 transition table; a completed detent emits a
//! direction exactly once. Contact bounce never completes a legal cycle, so an
//! inconsistent pin pair drops the machine back to [`EncoderState::Start`] and
//! the partial progress is discarded. No timers are involved.
//!
//! ```text
//!   pins (A,B):  11 ──► 01 ──► 00 ──► 10 ──► 11   clockwise
//!   pins (A,B):  11 ──► 10 ──► 00 ──► 01 ──► 11   counter-clockwise
//! ```

/// Rotation direction reported for one completed detent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Clockwise,
    CounterClockwise,
}

/// The eight legal rows of the transition table
///
/// The discriminant is the row index. `Illegal` is unreachable through the
/// table itself but kept so every row maps back to `Start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EncoderState {
    CwNext = 0,
    CwBegin = 1,
    CwFinal = 2,
    Start = 3,
    CcwNext = 4,
    CcwFinal = 5,
    CcwBegin = 6,
    Illegal = 7,
}

impl EncoderState {
    const fn row(self) -> usize {
        self as usize
    }
}

/// Next state, plus the direction when the move completes a detent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: EncoderState,
    pub emit: Option<Direction>,
}

const fn go(next: EncoderState) -> Transition {
    Transition { next, emit: None }
}

const fn detent(direction: Direction) -> Transition {
    Transition {
        next: EncoderState::Start,
        emit: Some(direction),
    }
}

use Direction::{Clockwise as CW, CounterClockwise as CCW};
use EncoderState::*;

// Columns are the pin pair (A << 1) | B.
const TRANSITIONS: [[Transition; 4]; 8] = [
    /* CwNext   */ [go(CwNext), go(CwBegin), go(CwFinal), go(Start)],
    /* CwBegin  */ [go(CwNext), go(CwBegin), go(CwBegin), go(Start)],
    /* CwFinal  */ [go(CwNext), go(CwFinal), go(CwFinal), detent(CW)],
    /* Start    */ [go(Start), go(CwBegin), go(CcwBegin), go(Start)],
    /* CcwNext  */ [go(CcwNext), go(CcwFinal), go(CcwBegin), go(Start)],
    /* CcwFinal */ [go(CcwNext), go(CcwFinal), go(CcwFinal), detent(CCW)],
    /* CcwBegin */ [go(CcwNext), go(CcwBegin), go(CcwBegin), go(Start)],
    /* Illegal  */ [go(Start), go(Start), go(Start), go(Start)],
];

/// Packs the two phase levels into the 2-bit table column
pub const fn pin_pair(a: bool, b: bool) -> u8 {
    ((a as u8) << 1) | (b as u8)
}

/// Pure table lookup; only the low two bits of `pins` are used
pub const fn transition(state: EncoderState, pins: u8) -> Transition {
    TRANSITIONS[state.row()][(pins & 0b11) as usize]
}

/// Stateful decoder, fed once per detected pin change
#[derive(Debug, Clone)]
pub struct QuadratureDecoder {
    state: EncoderState,
}

impl Default for QuadratureDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl QuadratureDecoder {
    pub fn new() -> Self {
        Self {
            state: EncoderState::Start,
        }
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    /// Advances the machine by one pin sample. Returns the direction when this
    /// sample completes a detent.
    pub fn step(&mut self, pins: u8) -> Option<Direction> {
        let Transition { next, emit } = transition(self.state, pins);
        self.state = next;
        emit
    }

    pub fn reset(&mut self) {
        self.state = EncoderState::Start;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CW_CYCLE: [u8; 4] = [0b01, 0b00, 0b10, 0b11];
    const CCW_CYCLE: [u8; 4] = [0b10, 0b00, 0b01, 0b11];

    fn feed(decoder: &mut QuadratureDecoder, pins: &[u8]) -> Vec<Direction> {
        pins.iter().filter_map(|p| decoder.step(*p)).collect()
    }

    #[test]
    fn clockwise_detent_emits_once() {
        let mut decoder = QuadratureDecoder::new();
        assert_eq!(decoder.step(0b01), None);
        assert_eq!(decoder.state(), EncoderState::CwBegin);
        assert_eq!(decoder.step(0b00), None);
        assert_eq!(decoder.state(), EncoderState::CwNext);
        assert_eq!(decoder.step(0b10), None);
        assert_eq!(decoder.state(), EncoderState::CwFinal);
        assert_eq!(decoder.step(0b11), Some(Direction::Clockwise));
        assert_eq!(decoder.state(), EncoderState::Start);
    }

    #[test]
    fn counter_clockwise_detent_emits_once() {
        let mut decoder = QuadratureDecoder::new();
        assert_eq!(
            feed(&mut decoder, &CCW_CYCLE),
            vec![Direction::CounterClockwise]
        );
        assert_eq!(decoder.state(), EncoderState::Start);
    }

    #[test]
    fn repeated_detents_emit_one_event_each() {
        let mut decoder = QuadratureDecoder::new();
        let mut pins = Vec::new();
        for _ in 0..3 {
            pins.extend_from_slice(&CW_CYCLE);
        }
        pins.extend_from_slice(&CCW_CYCLE);
        assert_eq!(
            feed(&mut decoder, &pins),
            vec![
                Direction::Clockwise,
                Direction::Clockwise,
                Direction::Clockwise,
                Direction::CounterClockwise
            ]
        );
    }

    #[test]
    fn glitch_after_begin_returns_to_start_silently() {
        let mut decoder = QuadratureDecoder::new();
        assert_eq!(decoder.step(0b01), None);
        assert_eq!(decoder.step(0b11), None);
        assert_eq!(decoder.state(), EncoderState::Start);
    }

    #[test]
    fn bounce_inside_cycle_still_yields_single_event() {
        let mut decoder = QuadratureDecoder::new();
        // begin, bounce back to begin, then finish
        let pins = [0b01, 0b00, 0b01, 0b00, 0b10, 0b00, 0b10, 0b11];
        assert_eq!(feed(&mut decoder, &pins), vec![Direction::Clockwise]);
    }

    #[test]
    fn idle_level_keeps_start() {
        let mut decoder = QuadratureDecoder::new();
        assert!(feed(&mut decoder, &[0b11, 0b11, 0b00]).is_empty());
        assert_eq!(decoder.state(), EncoderState::Start);
    }

    #[test]
    fn illegal_row_always_snaps_to_start() {
        for pins in 0..4 {
            assert_eq!(
                transition(EncoderState::Illegal, pins),
                go(EncoderState::Start)
            );
        }
    }

    #[test]
    fn only_final_rows_carry_direction_tags() {
        let tagged: Vec<_> = TRANSITIONS
            .iter()
            .flatten()
            .filter_map(|t| t.emit)
            .collect();
        assert_eq!(tagged, vec![Direction::Clockwise, Direction::CounterClockwise]);
    }

    #[test]
    fn pin_pair_packs_a_high() {
        assert_eq!(pin_pair(true, false), 0b10);
        assert_eq!(pin_pair(false, true), 0b01);
        assert_eq!(transition(EncoderState::Start, 0b111), transition(EncoderState::Start, 0b11));
    }
}
