//! Raw input records and their classification
//!
//! Two record layouts come out of `/dev/input`:
//!
//! - evdev nodes (`eventN`) stream `struct input_event`:
//!   `{ timeval, type: u16, code: u16, value: i32 }`
//! - joystick nodes (`jsN`) stream `struct js_event`:
//!   `{ time: u32 (ms), value: i16, type: u8, number: u8 }`
//!
//! [`InputEvent`] tags a decoded record with the channel it came from. The
//! predicates on it are stateless and cheap, meant to be chained in the
//! consumer's dispatch.

use std::fmt;
use std::mem::size_of;

pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_REL: u16 = 0x02;
pub const EV_ABS: u16 = 0x03;
// play/stop commands
pub const EV_FF: u16 = 0x15;

/// evdev key value for an auto-repeated key
pub const KEY_REPEAT_VALUE: i32 = 2;

pub const JS_EVENT_BUTTON: u8 = 0x01;
pub const JS_EVENT_AXIS: u8 = 0x02;
/// Set on the synthetic events replayed right after the device is opened
pub const JS_EVENT_INIT: u8 = 0x80;

/// Size of one evdev record on this platform (the timeval is two C longs)
pub const KEY_RECORD_LEN: usize = size_of::<libc::input_event>();
const TIME_FIELD_LEN: usize = (KEY_RECORD_LEN - 8) / 2;

pub const JOYSTICK_RECORD_LEN: usize = 8;

fn read_long(bytes: &[u8]) -> i64 {
    match bytes.len() {
        8 => bytes.try_into().map(i64::from_ne_bytes).unwrap_or_default(),
        4 => bytes
            .try_into()
            .map(|b| i64::from(i32::from_ne_bytes(b)))
            .unwrap_or_default(),
        _ => 0,
    }
}

fn write_long(out: &mut [u8], value: i64) {
    match out.len() {
        8 => out.copy_from_slice(&value.to_ne_bytes()),
        4 => out.copy_from_slice(&(value as i32).to_ne_bytes()),
        _ => {}
    }
}

/// One evdev `input_event`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyRecord {
    pub seconds: i64,
    pub micros: i64,
    pub event_type: u16,
    pub code: u16,
    pub value: i32,
}

impl KeyRecord {
    pub fn new(event_type: u16, code: u16, value: i32) -> Self {
        Self {
            event_type,
            code,
            value,
            ..Default::default()
        }
    }

    pub fn decode(bytes: &[u8; KEY_RECORD_LEN]) -> Self {
        let (time, tail) = bytes.split_at(2 * TIME_FIELD_LEN);
        let (seconds, micros) = time.split_at(TIME_FIELD_LEN);
        Self {
            seconds: read_long(seconds),
            micros: read_long(micros),
            event_type: u16::from_ne_bytes([tail[0], tail[1]]),
            code: u16::from_ne_bytes([tail[2], tail[3]]),
            value: i32::from_ne_bytes([tail[4], tail[5], tail[6], tail[7]]),
        }
    }

    pub fn encode(&self) -> [u8; KEY_RECORD_LEN] {
        let mut out = [0u8; KEY_RECORD_LEN];
        let (time, tail) = out.split_at_mut(2 * TIME_FIELD_LEN);
        let (seconds, micros) = time.split_at_mut(TIME_FIELD_LEN);
        write_long(seconds, self.seconds);
        write_long(micros, self.micros);
        tail[0..2].copy_from_slice(&self.event_type.to_ne_bytes());
        tail[2..4].copy_from_slice(&self.code.to_ne_bytes());
        tail[4..8].copy_from_slice(&self.value.to_ne_bytes());
        out
    }
}

/// One joystick-API `js_event`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JoystickRecord {
    pub time_ms: u32,
    pub value: i16,
    pub event_type: u8,
    pub number: u8,
}

impl JoystickRecord {
    pub fn new(event_type: u8, number: u8, value: i16) -> Self {
        Self {
            time_ms: 0,
            value,
            event_type,
            number,
        }
    }

    pub fn decode(bytes: &[u8; JOYSTICK_RECORD_LEN]) -> Self {
        Self {
            time_ms: u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            value: i16::from_ne_bytes([bytes[4], bytes[5]]),
            event_type: bytes[6],
            number: bytes[7],
        }
    }

    pub fn encode(&self) -> [u8; JOYSTICK_RECORD_LEN] {
        let mut out = [0u8; JOYSTICK_RECORD_LEN];
        out[0..4].copy_from_slice(&self.time_ms.to_ne_bytes());
        out[4..6].copy_from_slice(&self.value.to_ne_bytes());
        out[6] = self.event_type;
        out[7] = self.number;
        out
    }
}

/// A sampled record tagged by the channel that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Keyboard(KeyRecord),
    Joystick(JoystickRecord),
}

impl InputEvent {
    pub fn is_keyboard_event(&self) -> bool {
        matches!(self, InputEvent::Keyboard(_))
    }

    pub fn is_joystick_event(&self) -> bool {
        matches!(self, InputEvent::Joystick(_))
    }

    // Joystick filters

    pub fn is_button(&self) -> bool {
        matches!(self, InputEvent::Joystick(js) if js.event_type & JS_EVENT_BUTTON != 0)
    }

    pub fn is_button_down(&self) -> bool {
        matches!(self, InputEvent::Joystick(js) if js.event_type & JS_EVENT_BUTTON != 0 && js.value == 1)
    }

    pub fn is_button_down_on(&self, number: u8) -> bool {
        self.is_button_down() && self.number() == Some(number)
    }

    pub fn is_button_up(&self) -> bool {
        matches!(self, InputEvent::Joystick(js) if js.event_type & JS_EVENT_BUTTON != 0 && js.value == 0)
    }

    pub fn is_button_up_on(&self, number: u8) -> bool {
        self.is_button_up() && self.number() == Some(number)
    }

    /// Synthetic state replayed by the joystick driver when the node is opened
    pub fn is_init_state(&self) -> bool {
        matches!(self, InputEvent::Joystick(js) if js.event_type & JS_EVENT_INIT != 0)
    }

    // Keyboard filters

    pub fn is_key(&self) -> bool {
        matches!(self, InputEvent::Keyboard(key) if key.event_type == EV_KEY)
    }

    pub fn is_key_down(&self) -> bool {
        self.is_key() && self.value() == 1
    }

    pub fn is_key_up(&self) -> bool {
        self.is_key() && self.value() == 0
    }

    pub fn is_auto_repeat(&self) -> bool {
        matches!(self, InputEvent::Keyboard(key) if key.value == KEY_REPEAT_VALUE)
    }

    /// Analog motion on either channel
    pub fn is_axis(&self) -> bool {
        match self {
            InputEvent::Keyboard(key) => key.event_type == EV_ABS || key.event_type == EV_REL,
            InputEvent::Joystick(js) => js.event_type & JS_EVENT_AXIS != 0,
        }
    }

    /// Button or axis number of a joystick record
    pub fn number(&self) -> Option<u8> {
        match self {
            InputEvent::Joystick(js) => Some(js.number),
            InputEvent::Keyboard(_) => None,
        }
    }

    /// Key code of a keyboard record
    pub fn code(&self) -> Option<u16> {
        match self {
            InputEvent::Keyboard(key) => Some(key.code),
            InputEvent::Joystick(_) => None,
        }
    }

    pub fn value(&self) -> i32 {
        match self {
            InputEvent::Keyboard(key) => key.value,
            InputEvent::Joystick(js) => i32::from(js.value),
        }
    }
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputEvent::Keyboard(key) => write!(
                f,
                "Keyboard: type={:<8} code={:<8} value={:<8}",
                key.event_type, key.code, key.value
            ),
            InputEvent::Joystick(js) => write!(
                f,
                "Joystick: value={:<8} type={:<8} number={:<8}",
                js.value, js.event_type, js.number
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(event_type: u16, value: i32) -> InputEvent {
        InputEvent::Keyboard(KeyRecord::new(event_type, 30, value))
    }

    fn js(event_type: u8, number: u8, value: i16) -> InputEvent {
        InputEvent::Joystick(JoystickRecord::new(event_type, number, value))
    }

    #[test]
    fn channel_tags_are_exclusive() {
        let k = key(EV_KEY, 1);
        let j = js(JS_EVENT_BUTTON, 0, 1);
        assert!(k.is_keyboard_event() && !k.is_joystick_event());
        assert!(j.is_joystick_event() && !j.is_keyboard_event());
    }

    #[test]
    fn auto_repeat_only_for_sentinel_value() {
        assert!(key(EV_KEY, 2).is_auto_repeat());
        assert!(!key(EV_KEY, 1).is_auto_repeat());
        assert!(!key(EV_KEY, 0).is_auto_repeat());
        assert!(!js(JS_EVENT_BUTTON, 0, 2).is_auto_repeat());
    }

    #[test]
    fn key_down_and_up() {
        assert!(key(EV_KEY, 1).is_key_down());
        assert!(key(EV_KEY, 0).is_key_up());
        assert!(!key(EV_KEY, 2).is_key_down());
        assert!(!key(EV_KEY, 2).is_key_up());
        assert!(!key(EV_SYN, 0).is_key());
    }

    #[test]
    fn button_filters_by_number() {
        let down = js(JS_EVENT_BUTTON, 14, 1);
        assert!(down.is_button_down());
        assert!(down.is_button_down_on(14));
        assert!(!down.is_button_down_on(15));
        assert!(!down.is_button_up());

        let up = js(JS_EVENT_BUTTON, 3, 0);
        assert!(up.is_button_up_on(3));
        assert!(!key(EV_KEY, 1).is_button());
    }

    #[test]
    fn axis_on_both_channels() {
        assert!(js(JS_EVENT_AXIS, 0, -32768).is_axis());
        assert!(key(EV_ABS, 100).is_axis());
        assert!(key(EV_REL, -1).is_axis());
        assert!(!key(EV_KEY, 1).is_axis());
        assert!(!js(JS_EVENT_BUTTON, 0, 1).is_axis());
    }

    #[test]
    fn init_state_is_joystick_only() {
        let init = js(JS_EVENT_INIT | JS_EVENT_BUTTON, 2, 0);
        assert!(init.is_init_state());
        assert!(init.is_button());
        assert!(!js(JS_EVENT_BUTTON, 2, 0).is_init_state());
        assert!(!key(0x80, 0).is_init_state());
    }

    #[test]
    fn key_record_layout_matches_kernel_struct() {
        let record = KeyRecord {
            seconds: 12,
            micros: 345,
            event_type: EV_KEY,
            code: 57,
            value: 1,
        };
        let bytes = record.encode();
        let tail = &bytes[KEY_RECORD_LEN - 8..];
        assert_eq!(u16::from_ne_bytes([tail[0], tail[1]]), EV_KEY);
        assert_eq!(i32::from_ne_bytes([tail[4], tail[5], tail[6], tail[7]]), 1);
        assert_eq!(KeyRecord::decode(&bytes), record);
    }

    #[test]
    fn joystick_record_layout() {
        let mut bytes = [0u8; JOYSTICK_RECORD_LEN];
        bytes[4..6].copy_from_slice(&(-5i16).to_ne_bytes());
        bytes[6] = JS_EVENT_AXIS;
        bytes[7] = 3;
        let record = JoystickRecord::decode(&bytes);
        assert_eq!(record.value, -5);
        assert_eq!(record.number, 3);
        assert_eq!(record.encode(), bytes);
    }

    #[test]
    fn display_names_the_channel() {
        assert!(key(EV_KEY, 1).to_string().starts_with("Keyboard: type=1"));
        assert!(js(JS_EVENT_AXIS, 1, 7)
            .to_string()
            .starts_with("Joystick: value=7"));
    }
}
