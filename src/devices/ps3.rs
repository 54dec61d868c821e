//! Button and axis numbering of a Sixaxis / DualShock 3 on the joystick API

pub const BTN_SELECT: u8 = 0;
// stick clicks
pub const BTN_L3: u8 = 1;
pub const BTN_R3: u8 = 2;
pub const BTN_START: u8 = 3;
pub const BTN_UP: u8 = 4;
pub const BTN_RIGHT: u8 = 5;
pub const BTN_DOWN: u8 = 6;
pub const BTN_LEFT: u8 = 7;
// triggers, then bumpers
pub const BTN_L2: u8 = 8;
pub const BTN_R2: u8 = 9;
pub const BTN_L1: u8 = 10;
pub const BTN_R1: u8 = 11;
pub const BTN_TRIANGLE: u8 = 12;
pub const BTN_CIRCLE: u8 = 13;
pub const BTN_X: u8 = 14;
pub const BTN_SQUARE: u8 = 15;
pub const BTN_PS: u8 = 16;

pub const LEFT_STICK_X: u8 = 0;
pub const LEFT_STICK_Y: u8 = 1;
pub const RIGHT_STICK_X: u8 = 2;
pub const RIGHT_STICK_Y: u8 = 3;

pub const AXIS_MIN: i16 = i16::MIN;
pub const AXIS_MAX: i16 = i16::MAX;

/// Human-readable button name for log output
pub fn button_name(number: u8) -> Option<&'static str> {
    const NAMES: [&str; 17] = [
        "Select", "L3", "R3", "Start", "Up", "Right", "Down", "Left", "L2", "R2", "L1", "R1",
        "Triangle", "Circle", "X", "Square", "PS",
    ];
    NAMES.get(usize::from(number)).copied()
}
