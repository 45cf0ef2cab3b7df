//! Fixed US-QWERTY key table.
//!
//! Characters and named keys found here are typed straight through their evdev
//! keycode instead of going through keycode allocation. Shifted characters are
//! produced by bracketing the key with Shift.

use anyhow::{anyhow, Result};

use crate::keysym::{LogicalKey, NamedKey};
use crate::modifiers::Modifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStroke {
    pub keycode: u32,
    pub shift: bool,
}

// Linux evdev keycodes (see linux/input-event-codes.h)
pub const KEY_ESC: u32 = 1;

pub const KEY_1: u32 = 2;
pub const KEY_2: u32 = 3;
pub const KEY_3: u32 = 4;
pub const KEY_4: u32 = 5;
pub const KEY_5: u32 = 6;
pub const KEY_6: u32 = 7;
pub const KEY_7: u32 = 8;
pub const KEY_8: u32 = 9;
pub const KEY_9: u32 = 10;
pub const KEY_0: u32 = 11;

pub const KEY_MINUS: u32 = 12;
pub const KEY_EQUAL: u32 = 13;
pub const KEY_BACKSPACE: u32 = 14;
pub const KEY_TAB: u32 = 15;

pub const KEY_Q: u32 = 16;
pub const KEY_W: u32 = 17;
pub const KEY_E: u32 = 18;
pub const KEY_R: u32 = 19;
pub const KEY_T: u32 = 20;
pub const KEY_Y: u32 = 21;
pub const KEY_U: u32 = 22;
pub const KEY_I: u32 = 23;
pub const KEY_O: u32 = 24;
pub const KEY_P: u32 = 25;

pub const KEY_LEFTBRACE: u32 = 26;
pub const KEY_RIGHTBRACE: u32 = 27;
pub const KEY_ENTER: u32 = 28;

pub const KEY_LEFTCTRL: u32 = 29;

pub const KEY_A: u32 = 30;
pub const KEY_S: u32 = 31;
pub const KEY_D: u32 = 32;
pub const KEY_F: u32 = 33;
pub const KEY_G: u32 = 34;
pub const KEY_H: u32 = 35;
pub const KEY_J: u32 = 36;
pub const KEY_K: u32 = 37;
pub const KEY_L: u32 = 38;

pub const KEY_SEMICOLON: u32 = 39;
pub const KEY_APOSTROPHE: u32 = 40;
pub const KEY_GRAVE: u32 = 41;

pub const KEY_LEFTSHIFT: u32 = 42;

pub const KEY_BACKSLASH: u32 = 43;

pub const KEY_Z: u32 = 44;
pub const KEY_X: u32 = 45;
pub const KEY_C: u32 = 46;
pub const KEY_V: u32 = 47;
pub const KEY_B: u32 = 48;
pub const KEY_N: u32 = 49;
pub const KEY_M: u32 = 50;

pub const KEY_COMMA: u32 = 51;
pub const KEY_DOT: u32 = 52;
pub const KEY_SLASH: u32 = 53;

pub const KEY_RIGHTSHIFT: u32 = 54;

pub const KEY_LEFTALT: u32 = 56;
pub const KEY_SPACE: u32 = 57;
pub const KEY_CAPSLOCK: u32 = 58;

pub const KEY_F1: u32 = 59;
pub const KEY_F11: u32 = 87;
pub const KEY_F12: u32 = 88;

pub const KEY_RIGHTCTRL: u32 = 97;
pub const KEY_RIGHTALT: u32 = 100;

pub const KEY_HOME: u32 = 102;
pub const KEY_UP: u32 = 103;
pub const KEY_PAGEUP: u32 = 104;
pub const KEY_LEFT: u32 = 105;
pub const KEY_RIGHT: u32 = 106;
pub const KEY_END: u32 = 107;
pub const KEY_DOWN: u32 = 108;
pub const KEY_PAGEDOWN: u32 = 109;
pub const KEY_INSERT: u32 = 110;
pub const KEY_DELETE: u32 = 111;

pub const KEY_LEFTMETA: u32 = 125;
pub const KEY_RIGHTMETA: u32 = 126;

const LETTERS: [u32; 26] = [
    KEY_A, KEY_B, KEY_C, KEY_D, KEY_E, KEY_F, KEY_G, KEY_H, KEY_I, KEY_J, KEY_K, KEY_L, KEY_M,
    KEY_N, KEY_O, KEY_P, KEY_Q, KEY_R, KEY_S, KEY_T, KEY_U, KEY_V, KEY_W, KEY_X, KEY_Y, KEY_Z,
];

// Digits 1..9 then 0, in keycode order; the shifted row lines up index for index.
const DIGITS: &str = "1234567890";
const SHIFTED_DIGITS: &str = "!@#$%^&*()";

/// Characters the heuristic treats as needing Shift besides uppercase letters.
pub const SHIFTED_PUNCTUATION: &str = "~!@#$%^&*()_+{}|:\"<>?";

/// Whether typing `c` through the fixed table needs Shift held.
pub fn needs_shift(c: char) -> bool {
    c.is_uppercase() || SHIFTED_PUNCTUATION.contains(c)
}

pub fn char_to_keystroke(c: char) -> Option<KeyStroke> {
    let unshifted = |keycode| Some(KeyStroke { keycode, shift: false });
    let shifted = |keycode| Some(KeyStroke { keycode, shift: true });

    match c {
        'a'..='z' => unshifted(LETTERS[(c as u8 - b'a') as usize]),
        'A'..='Z' => shifted(LETTERS[(c as u8 - b'A') as usize]),
        '1'..='9' | '0' => DIGITS.find(c).and_then(|i| unshifted(KEY_1 + i as u32)),
        '!' | '@' | '#' | '$' | '%' | '^' | '&' | '*' | '(' | ')' => {
            SHIFTED_DIGITS.find(c).and_then(|i| shifted(KEY_1 + i as u32))
        }
        '-' => unshifted(KEY_MINUS),
        '_' => shifted(KEY_MINUS),
        '=' => unshifted(KEY_EQUAL),
        '+' => shifted(KEY_EQUAL),
        '[' => unshifted(KEY_LEFTBRACE),
        '{' => shifted(KEY_LEFTBRACE),
        ']' => unshifted(KEY_RIGHTBRACE),
        '}' => shifted(KEY_RIGHTBRACE),
        '\\' => unshifted(KEY_BACKSLASH),
        '|' => shifted(KEY_BACKSLASH),
        ';' => unshifted(KEY_SEMICOLON),
        ':' => shifted(KEY_SEMICOLON),
        '\'' => unshifted(KEY_APOSTROPHE),
        '"' => shifted(KEY_APOSTROPHE),
        '`' => unshifted(KEY_GRAVE),
        '~' => shifted(KEY_GRAVE),
        ',' => unshifted(KEY_COMMA),
        '<' => shifted(KEY_COMMA),
        '.' => unshifted(KEY_DOT),
        '>' => shifted(KEY_DOT),
        '/' => unshifted(KEY_SLASH),
        '?' => shifted(KEY_SLASH),
        ' ' => unshifted(KEY_SPACE),
        '\n' | '\r' => unshifted(KEY_ENTER),
        '\t' => unshifted(KEY_TAB),
        _ => None,
    }
}

/// evdev keycode of a named key, for the subset with a fixed US position.
pub fn named_keycode(key: NamedKey) -> Option<u32> {
    let keycode = match key {
        NamedKey::Backspace => KEY_BACKSPACE,
        NamedKey::Tab => KEY_TAB,
        NamedKey::Enter => KEY_ENTER,
        NamedKey::Escape => KEY_ESC,
        NamedKey::Space => KEY_SPACE,
        NamedKey::Delete => KEY_DELETE,
        NamedKey::Insert => KEY_INSERT,
        NamedKey::Home => KEY_HOME,
        NamedKey::End => KEY_END,
        NamedKey::PageUp => KEY_PAGEUP,
        NamedKey::PageDown => KEY_PAGEDOWN,
        NamedKey::Left => KEY_LEFT,
        NamedKey::Up => KEY_UP,
        NamedKey::Right => KEY_RIGHT,
        NamedKey::Down => KEY_DOWN,
        NamedKey::CapsLock => KEY_CAPSLOCK,
        NamedKey::F(n @ 1..=10) => KEY_F1 + u32::from(n) - 1,
        NamedKey::F(11) => KEY_F11,
        NamedKey::F(12) => KEY_F12,
        NamedKey::Modifier(m) => match m {
            Modifier::Shift | Modifier::ShiftLeft => KEY_LEFTSHIFT,
            Modifier::ShiftRight => KEY_RIGHTSHIFT,
            Modifier::Ctrl | Modifier::CtrlLeft => KEY_LEFTCTRL,
            Modifier::CtrlRight => KEY_RIGHTCTRL,
            Modifier::Alt | Modifier::AltLeft => KEY_LEFTALT,
            Modifier::AltRight => KEY_RIGHTALT,
            Modifier::Meta | Modifier::MetaLeft => KEY_LEFTMETA,
            Modifier::MetaRight => KEY_RIGHTMETA,
            // Level3 placement varies between layouts.
            Modifier::AltGr => return None,
        },
        _ => return None,
    };
    Some(keycode)
}

/// Fixed-table stroke for a logical key, if it has one.
///
/// The shift flag comes from [`needs_shift`] rather than from the table so that
/// the bracketing decision matches the character-class rule exactly.
pub fn static_keystroke(key: &LogicalKey) -> Option<KeyStroke> {
    match *key {
        LogicalKey::Char(c) => char_to_keystroke(c).map(|stroke| KeyStroke {
            keycode: stroke.keycode,
            shift: needs_shift(c),
        }),
        LogicalKey::Named(named) => named_keycode(named).map(|keycode| KeyStroke {
            keycode,
            shift: false,
        }),
        LogicalKey::Keysym(_) => None,
    }
}

pub fn evdev_to_x11_keycode(evdev_keycode: u32) -> Result<u8> {
    // On most Linux Xorg setups, X11 keycodes are evdev + 8.
    let x11 = evdev_keycode
        .checked_add(8)
        .ok_or_else(|| anyhow!("evdev keycode overflow"))?;
    u8::try_from(x11).map_err(|_| anyhow!("evdev keycode {evdev_keycode} out of range for X11"))
}
