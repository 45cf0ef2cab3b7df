use std::collections::BTreeSet;

use crate::keysym::{self, Keysym};

/// Canonical modifier keys. Every alias the resolver accepts collapses onto one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Modifier {
    Alt,
    AltLeft,
    AltRight,
    AltGr,
    Ctrl,
    CtrlLeft,
    CtrlRight,
    Shift,
    ShiftLeft,
    ShiftRight,
    Meta,
    MetaLeft,
    MetaRight,
}

/// Which shift-state bit a modifier contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierFamily {
    Alt,
    AltGr,
    Ctrl,
    Shift,
    Meta,
}

impl Modifier {
    pub const ALL: [Modifier; 13] = [
        Modifier::Alt,
        Modifier::AltLeft,
        Modifier::AltRight,
        Modifier::AltGr,
        Modifier::Ctrl,
        Modifier::CtrlLeft,
        Modifier::CtrlRight,
        Modifier::Shift,
        Modifier::ShiftLeft,
        Modifier::ShiftRight,
        Modifier::Meta,
        Modifier::MetaLeft,
        Modifier::MetaRight,
    ];

    pub fn family(self) -> ModifierFamily {
        match self {
            Modifier::Alt | Modifier::AltLeft | Modifier::AltRight => ModifierFamily::Alt,
            Modifier::AltGr => ModifierFamily::AltGr,
            Modifier::Ctrl | Modifier::CtrlLeft | Modifier::CtrlRight => ModifierFamily::Ctrl,
            Modifier::Shift | Modifier::ShiftLeft | Modifier::ShiftRight => ModifierFamily::Shift,
            Modifier::Meta | Modifier::MetaLeft | Modifier::MetaRight => ModifierFamily::Meta,
        }
    }

    pub fn x11_keysym(self) -> Keysym {
        match self {
            Modifier::Alt | Modifier::AltLeft => keysym::XK_ALT_L,
            Modifier::AltRight => keysym::XK_ALT_R,
            Modifier::AltGr => keysym::XK_ISO_LEVEL3_SHIFT,
            Modifier::Ctrl | Modifier::CtrlLeft => keysym::XK_CONTROL_L,
            Modifier::CtrlRight => keysym::XK_CONTROL_R,
            Modifier::Shift | Modifier::ShiftLeft => keysym::XK_SHIFT_L,
            Modifier::ShiftRight => keysym::XK_SHIFT_R,
            Modifier::Meta | Modifier::MetaLeft => keysym::XK_SUPER_L,
            Modifier::MetaRight => keysym::XK_SUPER_R,
        }
    }

    pub fn windows_vk(self) -> u16 {
        match self {
            Modifier::Alt => 0x12,
            Modifier::AltLeft => 0xA4,
            Modifier::AltRight | Modifier::AltGr => 0xA5,
            Modifier::Ctrl => 0x11,
            Modifier::CtrlLeft => 0xA2,
            Modifier::CtrlRight => 0xA3,
            Modifier::Shift => 0x10,
            Modifier::ShiftLeft => 0xA0,
            Modifier::ShiftRight => 0xA1,
            Modifier::Meta | Modifier::MetaLeft => 0x5B,
            Modifier::MetaRight => 0x5C,
        }
    }
}

/// Platform shift-state bits. The X11 defaults are overridden by whatever the
/// server's modifier mapping says about Alt and AltGr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModifierMasks {
    pub shift: u16,
    pub control: u16,
    pub alt: u16,
    pub alt_gr: u16,
}

pub const X11_SHIFT_MASK: u16 = 0x0001;
pub const X11_CONTROL_MASK: u16 = 0x0004;
pub const X11_MOD1_MASK: u16 = 0x0008;
pub const X11_MOD5_MASK: u16 = 0x0080;

impl Default for ModifierMasks {
    fn default() -> Self {
        Self {
            shift: X11_SHIFT_MASK,
            control: X11_CONTROL_MASK,
            alt: X11_MOD1_MASK,
            alt_gr: X11_MOD5_MASK,
        }
    }
}

/// Modifier keys currently held by a session.
#[derive(Debug, Default, Clone)]
pub struct ModifierTracker {
    held: BTreeSet<Modifier>,
}

impl ModifierTracker {
    pub fn on_key_event(&mut self, modifier: Modifier, pressed: bool) {
        if pressed {
            self.held.insert(modifier);
        } else {
            // Releasing something that is not held is tolerated.
            self.held.remove(&modifier);
        }
    }

    /// Drop every held variant typed through `keysym`. `ctrl` and `ctrl_l`
    /// share a key, so the last release of that key ends both.
    pub fn release_keysym(&mut self, keysym: Keysym) {
        self.held.retain(|m| m.x11_keysym() != keysym);
    }

    pub fn is_held(&self, modifier: Modifier) -> bool {
        self.held.contains(&modifier)
    }

    pub fn held(&self) -> impl Iterator<Item = Modifier> + '_ {
        self.held.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    pub fn clear(&mut self) {
        self.held.clear();
    }

    fn family_held(&self, family: ModifierFamily) -> bool {
        self.held.iter().any(|m| m.family() == family)
    }

    pub fn current_mask(&self, masks: &ModifierMasks) -> u16 {
        let mut mask = 0;
        if self.family_held(ModifierFamily::Alt) {
            mask |= masks.alt;
        }
        if self.family_held(ModifierFamily::AltGr) {
            mask |= masks.alt_gr;
        }
        if self.family_held(ModifierFamily::Ctrl) {
            mask |= masks.control;
        }
        if self.family_held(ModifierFamily::Shift) {
            mask |= masks.shift;
        }
        mask
    }
}
