//! Logical key parsing and resolution to X11 keysyms.
//!
//! A caller names a key either by a single character (`"a"`, `"é"`, `"\n"`) or by
//! a key name (`"ctrl"`, `"pgup"`, `"f5"`). Names are matched case-insensitively,
//! with `-` and spaces treated like `_`.

use std::fmt;
use std::str::FromStr;

use crate::error::{KeyboardError, Result};
use crate::modifiers::Modifier;

pub type Keysym = u32;

pub const NO_SYMBOL: Keysym = 0;

/// Marker bit for keysyms that encode a Unicode code point directly.
pub const UNICODE_KEYSYM_FLAG: Keysym = 0x0100_0000;

// Subset of X11/keysymdef.h used by the named-key table.
pub const XK_SPACE: Keysym = 0x0020;
pub const XK_BACKSPACE: Keysym = 0xff08;
pub const XK_TAB: Keysym = 0xff09;
pub const XK_RETURN: Keysym = 0xff0d;
pub const XK_PAUSE: Keysym = 0xff13;
pub const XK_SCROLL_LOCK: Keysym = 0xff14;
pub const XK_ESCAPE: Keysym = 0xff1b;
pub const XK_HOME: Keysym = 0xff50;
pub const XK_LEFT: Keysym = 0xff51;
pub const XK_UP: Keysym = 0xff52;
pub const XK_RIGHT: Keysym = 0xff53;
pub const XK_DOWN: Keysym = 0xff54;
pub const XK_PAGE_UP: Keysym = 0xff55;
pub const XK_PAGE_DOWN: Keysym = 0xff56;
pub const XK_END: Keysym = 0xff57;
pub const XK_PRINT: Keysym = 0xff61;
pub const XK_INSERT: Keysym = 0xff63;
pub const XK_MENU: Keysym = 0xff67;
pub const XK_NUM_LOCK: Keysym = 0xff7f;
pub const XK_KP_ENTER: Keysym = 0xff8d;
pub const XK_KP_MULTIPLY: Keysym = 0xffaa;
pub const XK_KP_ADD: Keysym = 0xffab;
pub const XK_KP_SEPARATOR: Keysym = 0xffac;
pub const XK_KP_SUBTRACT: Keysym = 0xffad;
pub const XK_KP_DECIMAL: Keysym = 0xffae;
pub const XK_KP_DIVIDE: Keysym = 0xffaf;
pub const XK_KP_0: Keysym = 0xffb0;
pub const XK_F1: Keysym = 0xffbe;
pub const XK_SHIFT_L: Keysym = 0xffe1;
pub const XK_SHIFT_R: Keysym = 0xffe2;
pub const XK_CONTROL_L: Keysym = 0xffe3;
pub const XK_CONTROL_R: Keysym = 0xffe4;
pub const XK_CAPS_LOCK: Keysym = 0xffe5;
pub const XK_ALT_L: Keysym = 0xffe9;
pub const XK_ALT_R: Keysym = 0xffea;
pub const XK_SUPER_L: Keysym = 0xffeb;
pub const XK_SUPER_R: Keysym = 0xffec;
pub const XK_DELETE: Keysym = 0xffff;
pub const XK_ISO_LEVEL3_SHIFT: Keysym = 0xfe03;
pub const XK_MODE_SWITCH: Keysym = 0xff7e;

/// Keys addressed by name rather than by the character they produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NamedKey {
    Backspace,
    Tab,
    Enter,
    Escape,
    Space,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    Left,
    Up,
    Right,
    Down,
    CapsLock,
    NumLock,
    ScrollLock,
    Pause,
    PrintScreen,
    Menu,
    /// F1..=F24
    F(u8),
    /// Keypad digit 0..=9
    Numpad(u8),
    KpMultiply,
    KpAdd,
    KpSeparator,
    KpSubtract,
    KpDecimal,
    KpDivide,
    KpEnter,
    Modifier(Modifier),
}

const NAMES: &[(&str, NamedKey)] = &[
    ("backspace", NamedKey::Backspace),
    ("tab", NamedKey::Tab),
    ("enter", NamedKey::Enter),
    ("return", NamedKey::Enter),
    ("esc", NamedKey::Escape),
    ("escape", NamedKey::Escape),
    ("space", NamedKey::Space),
    ("delete", NamedKey::Delete),
    ("del", NamedKey::Delete),
    ("insert", NamedKey::Insert),
    ("ins", NamedKey::Insert),
    ("home", NamedKey::Home),
    ("end", NamedKey::End),
    ("pgup", NamedKey::PageUp),
    ("pageup", NamedKey::PageUp),
    ("page_up", NamedKey::PageUp),
    ("pgdn", NamedKey::PageDown),
    ("pagedown", NamedKey::PageDown),
    ("page_down", NamedKey::PageDown),
    ("left", NamedKey::Left),
    ("up", NamedKey::Up),
    ("right", NamedKey::Right),
    ("down", NamedKey::Down),
    ("capslock", NamedKey::CapsLock),
    ("caps_lock", NamedKey::CapsLock),
    ("numlock", NamedKey::NumLock),
    ("num_lock", NamedKey::NumLock),
    ("scrolllock", NamedKey::ScrollLock),
    ("scroll_lock", NamedKey::ScrollLock),
    ("pause", NamedKey::Pause),
    ("ps", NamedKey::PrintScreen),
    ("print", NamedKey::PrintScreen),
    ("printscreen", NamedKey::PrintScreen),
    ("print_screen", NamedKey::PrintScreen),
    ("menu", NamedKey::Menu),
    ("apps", NamedKey::Menu),
    ("multiply", NamedKey::KpMultiply),
    ("add", NamedKey::KpAdd),
    ("separator", NamedKey::KpSeparator),
    ("subtract", NamedKey::KpSubtract),
    ("decimal", NamedKey::KpDecimal),
    ("divide", NamedKey::KpDivide),
    ("kp_enter", NamedKey::KpEnter),
    ("alt", NamedKey::Modifier(Modifier::Alt)),
    ("alt_l", NamedKey::Modifier(Modifier::AltLeft)),
    ("altleft", NamedKey::Modifier(Modifier::AltLeft)),
    ("alt_left", NamedKey::Modifier(Modifier::AltLeft)),
    ("alt_r", NamedKey::Modifier(Modifier::AltRight)),
    ("altright", NamedKey::Modifier(Modifier::AltRight)),
    ("alt_right", NamedKey::Modifier(Modifier::AltRight)),
    ("alt_gr", NamedKey::Modifier(Modifier::AltGr)),
    ("altgr", NamedKey::Modifier(Modifier::AltGr)),
    ("ctrl", NamedKey::Modifier(Modifier::Ctrl)),
    ("control", NamedKey::Modifier(Modifier::Ctrl)),
    ("ctrl_l", NamedKey::Modifier(Modifier::CtrlLeft)),
    ("ctrlleft", NamedKey::Modifier(Modifier::CtrlLeft)),
    ("ctrl_left", NamedKey::Modifier(Modifier::CtrlLeft)),
    ("ctrl_r", NamedKey::Modifier(Modifier::CtrlRight)),
    ("ctrlright", NamedKey::Modifier(Modifier::CtrlRight)),
    ("ctrl_right", NamedKey::Modifier(Modifier::CtrlRight)),
    ("shift", NamedKey::Modifier(Modifier::Shift)),
    ("shift_l", NamedKey::Modifier(Modifier::ShiftLeft)),
    ("shiftleft", NamedKey::Modifier(Modifier::ShiftLeft)),
    ("shift_left", NamedKey::Modifier(Modifier::ShiftLeft)),
    ("shift_r", NamedKey::Modifier(Modifier::ShiftRight)),
    ("shiftright", NamedKey::Modifier(Modifier::ShiftRight)),
    ("shift_right", NamedKey::Modifier(Modifier::ShiftRight)),
    ("cmd", NamedKey::Modifier(Modifier::Meta)),
    ("win", NamedKey::Modifier(Modifier::Meta)),
    ("winleft", NamedKey::Modifier(Modifier::Meta)),
    ("meta", NamedKey::Modifier(Modifier::Meta)),
    ("super", NamedKey::Modifier(Modifier::Meta)),
    ("cmd_l", NamedKey::Modifier(Modifier::MetaLeft)),
    ("meta_l", NamedKey::Modifier(Modifier::MetaLeft)),
    ("meta_left", NamedKey::Modifier(Modifier::MetaLeft)),
    ("cmd_r", NamedKey::Modifier(Modifier::MetaRight)),
    ("meta_r", NamedKey::Modifier(Modifier::MetaRight)),
    ("meta_right", NamedKey::Modifier(Modifier::MetaRight)),
    ("winright", NamedKey::Modifier(Modifier::MetaRight)),
];

fn normalize_name(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

impl NamedKey {
    pub fn from_name(raw: &str) -> Option<NamedKey> {
        let name = normalize_name(raw);

        if let Some((_, key)) = NAMES.iter().find(|(alias, _)| *alias == name) {
            return Some(*key);
        }

        if let Some(n) = name.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
            return (1..=24).contains(&n).then_some(NamedKey::F(n));
        }

        let digit = name
            .strip_prefix("num")
            .or_else(|| name.strip_prefix("kp_"))
            .and_then(|n| n.parse::<u8>().ok());
        if let Some(n) = digit {
            return (n <= 9).then_some(NamedKey::Numpad(n));
        }

        None
    }

    /// Name printed by `Display` and the `keys` listing.
    pub fn canonical_name(self) -> String {
        match self {
            NamedKey::F(n) => format!("f{n}"),
            NamedKey::Numpad(n) => format!("num{n}"),
            other => NAMES
                .iter()
                .find(|(_, key)| *key == other)
                .map(|(name, _)| (*name).to_string())
                .unwrap_or_else(|| format!("{other:?}").to_lowercase()),
        }
    }

    /// Every accepted spelling of this key, canonical name first.
    pub fn aliases(self) -> Vec<&'static str> {
        NAMES
            .iter()
            .filter(|(_, key)| *key == self)
            .map(|(name, _)| *name)
            .collect()
    }

    /// All keys with a fixed name, function and keypad keys included.
    pub fn all() -> Vec<NamedKey> {
        let mut keys: Vec<NamedKey> = Vec::new();
        for (_, key) in NAMES {
            if !keys.contains(key) {
                keys.push(*key);
            }
        }
        keys.extend((1..=24).map(NamedKey::F));
        keys.extend((0..=9).map(NamedKey::Numpad));
        keys
    }

    pub fn modifier(self) -> Option<Modifier> {
        match self {
            NamedKey::Modifier(m) => Some(m),
            _ => None,
        }
    }

    pub fn x11_keysym(self) -> Keysym {
        match self {
            NamedKey::Backspace => XK_BACKSPACE,
            NamedKey::Tab => XK_TAB,
            NamedKey::Enter => XK_RETURN,
            NamedKey::Escape => XK_ESCAPE,
            NamedKey::Space => XK_SPACE,
            NamedKey::Delete => XK_DELETE,
            NamedKey::Insert => XK_INSERT,
            NamedKey::Home => XK_HOME,
            NamedKey::End => XK_END,
            NamedKey::PageUp => XK_PAGE_UP,
            NamedKey::PageDown => XK_PAGE_DOWN,
            NamedKey::Left => XK_LEFT,
            NamedKey::Up => XK_UP,
            NamedKey::Right => XK_RIGHT,
            NamedKey::Down => XK_DOWN,
            NamedKey::CapsLock => XK_CAPS_LOCK,
            NamedKey::NumLock => XK_NUM_LOCK,
            NamedKey::ScrollLock => XK_SCROLL_LOCK,
            NamedKey::Pause => XK_PAUSE,
            NamedKey::PrintScreen => XK_PRINT,
            NamedKey::Menu => XK_MENU,
            NamedKey::F(n) => XK_F1 + Keysym::from(n.saturating_sub(1)),
            NamedKey::Numpad(n) => XK_KP_0 + Keysym::from(n),
            NamedKey::KpMultiply => XK_KP_MULTIPLY,
            NamedKey::KpAdd => XK_KP_ADD,
            NamedKey::KpSeparator => XK_KP_SEPARATOR,
            NamedKey::KpSubtract => XK_KP_SUBTRACT,
            NamedKey::KpDecimal => XK_KP_DECIMAL,
            NamedKey::KpDivide => XK_KP_DIVIDE,
            NamedKey::KpEnter => XK_KP_ENTER,
            NamedKey::Modifier(m) => m.x11_keysym(),
        }
    }

    pub fn windows_vk(self) -> u16 {
        match self {
            NamedKey::Backspace => 0x08,
            NamedKey::Tab => 0x09,
            NamedKey::Enter | NamedKey::KpEnter => 0x0D,
            NamedKey::Escape => 0x1B,
            NamedKey::Space => 0x20,
            NamedKey::Delete => 0x2E,
            NamedKey::Insert => 0x2D,
            NamedKey::Home => 0x24,
            NamedKey::End => 0x23,
            NamedKey::PageUp => 0x21,
            NamedKey::PageDown => 0x22,
            NamedKey::Left => 0x25,
            NamedKey::Up => 0x26,
            NamedKey::Right => 0x27,
            NamedKey::Down => 0x28,
            NamedKey::CapsLock => 0x14,
            NamedKey::NumLock => 0x90,
            NamedKey::ScrollLock => 0x91,
            NamedKey::Pause => 0x13,
            NamedKey::PrintScreen => 0x2C,
            NamedKey::Menu => 0x5D,
            NamedKey::F(n) => 0x6F + u16::from(n),
            NamedKey::Numpad(n) => 0x60 + u16::from(n),
            NamedKey::KpMultiply => 0x6A,
            NamedKey::KpAdd => 0x6B,
            NamedKey::KpSeparator => 0x6C,
            NamedKey::KpSubtract => 0x6D,
            NamedKey::KpDecimal => 0x6E,
            NamedKey::KpDivide => 0x6F,
            NamedKey::Modifier(m) => m.windows_vk(),
        }
    }
}

/// A key as named by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalKey {
    Char(char),
    Named(NamedKey),
    /// Any other X11 keysym, looked up by its keysymdef name (e.g. `XF86AudioPlay`).
    Keysym(Keysym),
}

impl LogicalKey {
    pub fn parse(raw: &str) -> Result<LogicalKey> {
        let mut chars = raw.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Ok(LogicalKey::Char(c));
        }

        if let Some(named) = NamedKey::from_name(raw) {
            return Ok(LogicalKey::Named(named));
        }

        if let Some(keysym) = keysym_from_name(raw) {
            return Ok(LogicalKey::Keysym(keysym));
        }

        Err(KeyboardError::InvalidKeyLength(raw.to_string()))
    }

    pub fn parse_all<S: AsRef<str>>(raw: &[S]) -> Result<Vec<LogicalKey>> {
        raw.iter().map(|k| LogicalKey::parse(k.as_ref())).collect()
    }
}

impl FromStr for LogicalKey {
    type Err = KeyboardError;

    fn from_str(s: &str) -> Result<Self> {
        LogicalKey::parse(s)
    }
}

impl fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalKey::Char(c) => write!(f, "{}", c.escape_debug()),
            LogicalKey::Named(named) => f.write_str(&named.canonical_name()),
            LogicalKey::Keysym(keysym) => f.write_str(&keysym_name(*keysym)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    Modifier(Modifier),
    Ordinary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedKey {
    pub key: LogicalKey,
    pub keysym: Keysym,
    pub class: KeyClass,
}

impl ResolvedKey {
    pub fn modifier(&self) -> Option<Modifier> {
        match self.class {
            KeyClass::Modifier(m) => Some(m),
            KeyClass::Ordinary => None,
        }
    }
}

/// Resolve a logical key to its X11 keysym and classification.
pub fn resolve(key: &LogicalKey) -> Result<ResolvedKey> {
    let (keysym, class) = match *key {
        LogicalKey::Named(named) => (
            named.x11_keysym(),
            named
                .modifier()
                .map_or(KeyClass::Ordinary, KeyClass::Modifier),
        ),
        LogicalKey::Char('\n' | '\r') => (XK_RETURN, KeyClass::Ordinary),
        LogicalKey::Char('\t') => (XK_TAB, KeyClass::Ordinary),
        LogicalKey::Char(c) if c.is_control() => return Err(KeyboardError::UnsupportedKey(c)),
        LogicalKey::Char(c) => (char_to_keysym(c), KeyClass::Ordinary),
        LogicalKey::Keysym(keysym) => (keysym, classify_keysym(keysym)),
    };

    Ok(ResolvedKey {
        key: *key,
        keysym,
        class,
    })
}

fn classify_keysym(keysym: Keysym) -> KeyClass {
    Modifier::ALL
        .iter()
        .find(|m| m.x11_keysym() == keysym)
        .map_or(KeyClass::Ordinary, |m| KeyClass::Modifier(*m))
}

/// Latin-1 code points are their own keysym; everything else uses the Unicode keysym range.
pub fn char_to_keysym(c: char) -> Keysym {
    let cp = c as u32;
    if cp < 0x100 {
        cp
    } else {
        cp | UNICODE_KEYSYM_FLAG
    }
}

/// Inverse of [`char_to_keysym`], plus the two whitespace keys that produce text.
pub fn keysym_to_char(keysym: Keysym) -> Option<char> {
    match keysym {
        XK_RETURN | XK_KP_ENTER => Some('\n'),
        XK_TAB => Some('\t'),
        k if (0x20..0x7f).contains(&k) || (0xa0..0x100).contains(&k) => char::from_u32(k),
        k if k & 0xff00_0000 == UNICODE_KEYSYM_FLAG => char::from_u32(k & 0x00ff_ffff),
        _ => None,
    }
}

/// Exact keysymdef name lookup. Names of character keysyms (`ae`, `mu`) are
/// refused so that plain words never parse as keys.
#[cfg(unix)]
fn keysym_from_name(name: &str) -> Option<Keysym> {
    use xkbcommon::xkb;

    let keysym = xkb::keysym_from_name(name, xkb::KEYSYM_NO_FLAGS).raw();
    if keysym == NO_SYMBOL || keysym_to_char(keysym).is_some() {
        return None;
    }
    Some(keysym)
}

#[cfg(not(unix))]
fn keysym_from_name(_name: &str) -> Option<Keysym> {
    None
}

/// Human readable keysym name for logs.
#[cfg(unix)]
pub fn keysym_name(keysym: Keysym) -> String {
    let name = xkbcommon::xkb::keysym_get_name(xkbcommon::xkb::Keysym::new(keysym));
    if name.is_empty() {
        format!("{keysym:#x}")
    } else {
        name
    }
}

#[cfg(not(unix))]
pub fn keysym_name(keysym: Keysym) -> String {
    format!("{keysym:#x}")
}
