//! In-memory stand-in for an X server keyboard.
//!
//! [`SimDisplay`] holds a keycode table, records every key event it receives
//! and decodes them back into text. It backs the unit tests and the
//! `--backend sim` dry run.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};

use crate::keyboard::{char_to_keystroke, evdev_to_x11_keycode, named_keycode};
use crate::keysym::{
    keysym_name, keysym_to_char, Keysym, NamedKey, NO_SYMBOL, XK_ALT_L, XK_ALT_R, XK_CONTROL_L,
    XK_CONTROL_R, XK_SHIFT_L, XK_SHIFT_R, XK_SUPER_L, XK_SUPER_R,
};
use crate::model::KeyState;
use crate::modifiers::ModifierMasks;
use crate::session::allocator::RESERVED_KEYCODES;
use crate::session::display::{KeyboardMapping, X11Display};

const MIN_KEYCODE: u8 = 8;
const MAX_KEYCODE: u8 = 255;
const KEYSYMS_PER_KEYCODE: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimDelivery {
    Xtest,
    Focus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimEvent {
    pub delivery: SimDelivery,
    pub keycode: u8,
    pub state: KeyState,
    /// State mask carried by focus events; zero for XTEST.
    pub modifiers: u16,
    /// What the server would have produced for this event when it arrived.
    pub keysym: Keysym,
}

impl SimEvent {
    /// `+a`, `-Shift_L`, ...
    pub fn label(&self) -> String {
        let sign = match self.state {
            KeyState::Pressed => '+',
            KeyState::Released => '-',
        };
        format!("{sign}{}", keysym_label(self.keysym))
    }
}

pub fn keysym_label(keysym: Keysym) -> String {
    match keysym_to_char(keysym) {
        Some(c) if !c.is_whitespace() => c.to_string(),
        _ => keysym_name(keysym),
    }
}

#[derive(Debug)]
struct SimServer {
    keysyms: Vec<Keysym>,
    xtest: bool,
    connected: bool,
    masks: ModifierMasks,
    held: BTreeSet<u8>,
    events: Vec<SimEvent>,
    syncs: usize,
    mapping_writes: usize,
    fail_mapping_writes: bool,
    fail_key_events: bool,
}

impl SimServer {
    fn width(&self) -> usize {
        usize::from(KEYSYMS_PER_KEYCODE)
    }

    fn row(&self, keycode: u8) -> &[Keysym] {
        let offset = usize::from(keycode.saturating_sub(MIN_KEYCODE)) * self.width();
        &self.keysyms[offset..offset + self.width()]
    }

    fn row_mut(&mut self, keycode: u8) -> &mut [Keysym] {
        let width = self.width();
        let offset = usize::from(keycode.saturating_sub(MIN_KEYCODE)) * width;
        &mut self.keysyms[offset..offset + width]
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(anyhow!("simulated display connection is closed"))
        }
    }

    fn held_keysym(&self, wanted: &[Keysym]) -> bool {
        self.held
            .iter()
            .any(|&keycode| wanted.contains(&self.row(keycode)[0]))
    }

    fn produced_keysym(&self, keycode: u8, shifted: bool) -> Keysym {
        let row = self.row(keycode);
        match (shifted, row[1]) {
            (true, sym) if sym != NO_SYMBOL => sym,
            _ => row[0],
        }
    }

    fn record(
        &mut self,
        delivery: SimDelivery,
        keycode: u8,
        state: KeyState,
        modifiers: u16,
    ) -> Result<()> {
        self.ensure_connected()?;
        if self.fail_key_events {
            return Err(anyhow!("simulated key event failure"));
        }
        if keycode < MIN_KEYCODE {
            return Err(anyhow!("keycode {keycode} below minimum {MIN_KEYCODE}"));
        }

        let shifted = match delivery {
            SimDelivery::Xtest => self.held_keysym(&[XK_SHIFT_L, XK_SHIFT_R]),
            SimDelivery::Focus => modifiers & self.masks.shift != 0,
        };
        let keysym = self.produced_keysym(keycode, shifted);

        if delivery == SimDelivery::Xtest {
            match state {
                KeyState::Pressed => self.held.insert(keycode),
                KeyState::Released => self.held.remove(&keycode),
            };
        }

        self.events.push(SimEvent {
            delivery,
            keycode,
            state,
            modifiers,
            keysym,
        });
        Ok(())
    }
}

/// Cloneable handle to one simulated server. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct SimDisplay {
    server: Arc<Mutex<SimServer>>,
}

impl SimDisplay {
    /// Empty table, XTEST available.
    pub fn empty() -> Self {
        let rows = usize::from(MAX_KEYCODE - MIN_KEYCODE) + 1;
        let server = SimServer {
            keysyms: vec![NO_SYMBOL; rows * usize::from(KEYSYMS_PER_KEYCODE)],
            xtest: true,
            connected: true,
            masks: ModifierMasks::default(),
            held: BTreeSet::new(),
            events: Vec::new(),
            syncs: 0,
            mapping_writes: 0,
            fail_mapping_writes: false,
            fail_key_events: false,
        };
        Self {
            server: Arc::new(Mutex::new(server)),
        }
    }

    /// A server with the standard US layout loaded at evdev + 8.
    pub fn us_qwerty() -> Self {
        let display = Self::empty();
        {
            let mut server = display.lock();

            for b in 0x20u8..0x7f {
                let c = char::from(b);
                let Some(stroke) = char_to_keystroke(c) else {
                    continue;
                };
                let Ok(keycode) = evdev_to_x11_keycode(stroke.keycode) else {
                    continue;
                };
                let column = usize::from(stroke.shift);
                server.row_mut(keycode)[column] = Keysym::from(b);
            }

            for named in NamedKey::all() {
                let Some(keycode) = named_keycode(named).and_then(|k| evdev_to_x11_keycode(k).ok())
                else {
                    continue;
                };
                let row = server.row_mut(keycode);
                if row[0] == NO_SYMBOL {
                    row[0] = named.x11_keysym();
                }
            }
        }
        display
    }

    pub fn without_xtest(self) -> Self {
        self.lock().xtest = false;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimServer> {
        self.server
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.lock().events.clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.lock().events.iter().map(SimEvent::label).collect()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    pub fn syncs(&self) -> usize {
        self.lock().syncs
    }

    pub fn mapping_writes(&self) -> usize {
        self.lock().mapping_writes
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn row(&self, keycode: u8) -> Vec<Keysym> {
        self.lock().row(keycode).to_vec()
    }

    pub fn table_snapshot(&self) -> Vec<Keysym> {
        self.lock().keysyms.clone()
    }

    /// Keycodes still held through XTEST.
    pub fn held_keycodes(&self) -> Vec<u8> {
        self.lock().held.iter().copied().collect()
    }

    /// Occupy every empty row above the reserved range.
    pub fn fill_void_rows(&self, keysym: Keysym) {
        let mut server = self.lock();
        let first = MIN_KEYCODE as usize + RESERVED_KEYCODES;
        for keycode in first..=usize::from(MAX_KEYCODE) {
            let Ok(keycode) = u8::try_from(keycode) else {
                continue;
            };
            let row = server.row_mut(keycode);
            if row.iter().all(|&sym| sym == NO_SYMBOL) {
                row[0] = keysym;
            }
        }
    }

    pub fn set_fail_mapping_writes(&self, fail: bool) {
        self.lock().fail_mapping_writes = fail;
    }

    pub fn set_fail_key_events(&self, fail: bool) {
        self.lock().fail_key_events = fail;
    }

    /// Text a focused editor would have received.
    ///
    /// Presses made while Control, Alt or Super is held are shortcuts and
    /// produce nothing.
    pub fn typed_text(&self) -> String {
        let server = self.lock();
        let mut held: BTreeSet<Keysym> = BTreeSet::new();
        let mut out = String::new();
        let chord_mask = server.masks.control | server.masks.alt;

        for event in &server.events {
            let is_modifier = matches!(
                event.keysym,
                XK_SHIFT_L
                    | XK_SHIFT_R
                    | XK_CONTROL_L
                    | XK_CONTROL_R
                    | XK_ALT_L
                    | XK_ALT_R
                    | XK_SUPER_L
                    | XK_SUPER_R
            );

            if is_modifier {
                match event.state {
                    KeyState::Pressed => held.insert(event.keysym),
                    KeyState::Released => held.remove(&event.keysym),
                };
                continue;
            }
            if event.state == KeyState::Released {
                continue;
            }

            let chording = held.iter().any(|sym| {
                matches!(
                    *sym,
                    XK_CONTROL_L | XK_CONTROL_R | XK_ALT_L | XK_ALT_R | XK_SUPER_L | XK_SUPER_R
                )
            }) || (event.delivery == SimDelivery::Focus && event.modifiers & chord_mask != 0);
            if chording {
                continue;
            }

            if let Some(c) = keysym_to_char(event.keysym) {
                out.push(c);
            }
        }

        out
    }
}

impl X11Display for SimDisplay {
    fn keyboard_mapping(&mut self) -> Result<KeyboardMapping> {
        let server = self.lock();
        server.ensure_connected()?;
        Ok(KeyboardMapping {
            min_keycode: MIN_KEYCODE,
            keysyms_per_keycode: KEYSYMS_PER_KEYCODE,
            keysyms: server.keysyms.clone(),
        })
    }

    fn change_keyboard_mapping(&mut self, keycode: u8, keysyms: &[Keysym]) -> Result<()> {
        let mut server = self.lock();
        server.ensure_connected()?;
        if server.fail_mapping_writes {
            return Err(anyhow!("simulated ChangeKeyboardMapping failure"));
        }
        if keycode < MIN_KEYCODE {
            return Err(anyhow!("keycode {keycode} below minimum {MIN_KEYCODE}"));
        }

        let row = server.row_mut(keycode);
        for (i, slot) in row.iter_mut().enumerate() {
            *slot = keysyms.get(i).copied().unwrap_or(NO_SYMBOL);
        }
        server.mapping_writes += 1;
        Ok(())
    }

    fn modifier_masks(&mut self) -> Result<ModifierMasks> {
        let server = self.lock();
        server.ensure_connected()?;
        Ok(server.masks)
    }

    fn has_xtest(&self) -> bool {
        self.lock().xtest
    }

    fn fake_key(&mut self, keycode: u8, state: KeyState) -> Result<()> {
        let mut server = self.lock();
        if !server.xtest {
            return Err(anyhow!("XTEST is not available on the simulated display"));
        }
        server.record(SimDelivery::Xtest, keycode, state, 0)
    }

    fn send_focus_key(&mut self, keycode: u8, state: KeyState, modifiers: u16) -> Result<()> {
        self.lock()
            .record(SimDelivery::Focus, keycode, state, modifiers)
    }

    fn sync(&mut self) -> Result<()> {
        let mut server = self.lock();
        server.ensure_connected()?;
        server.syncs += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.lock().connected = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keysym::XK_RETURN;

    #[test]
    fn us_table_has_letters_in_both_columns() {
        let display = SimDisplay::us_qwerty();
        assert_eq!(&display.row(38)[..2], &['a' as Keysym, 'A' as Keysym]);
        assert_eq!(&display.row(10)[..2], &['1' as Keysym, '!' as Keysym]);
        assert_eq!(display.row(36)[0], XK_RETURN);
        assert_eq!(display.row(50)[0], XK_SHIFT_L);
        assert!(display.row(200).iter().all(|&sym| sym == NO_SYMBOL));
    }

    #[test]
    fn typed_text_follows_shift_state() {
        let mut display = SimDisplay::us_qwerty();
        for (keycode, state) in [
            (50, KeyState::Pressed),
            (38, KeyState::Pressed),
            (38, KeyState::Released),
            (50, KeyState::Released),
            (56, KeyState::Pressed),
            (56, KeyState::Released),
        ] {
            display.fake_key(keycode, state).unwrap();
        }
        assert_eq!(display.typed_text(), "Ab");
        assert_eq!(display.labels(), vec!["+Shift_L", "+A", "-A", "-Shift_L", "+b", "-b"]);
    }

    #[test]
    fn ctrl_chords_type_nothing() {
        let mut display = SimDisplay::us_qwerty();
        for (keycode, state) in [
            (37, KeyState::Pressed),
            (54, KeyState::Pressed),
            (54, KeyState::Released),
            (37, KeyState::Released),
        ] {
            display.fake_key(keycode, state).unwrap();
        }
        assert_eq!(display.typed_text(), "");
    }

    #[test]
    fn closed_display_rejects_requests() {
        let mut display = SimDisplay::us_qwerty();
        display.close().unwrap();
        assert!(!display.is_connected());
        assert!(display.keyboard_mapping().is_err());
        assert!(display.fake_key(38, KeyState::Pressed).is_err());
    }

    #[test]
    fn missing_xtest_rejects_fake_input() {
        let mut display = SimDisplay::us_qwerty().without_xtest();
        assert!(!display.has_xtest());
        assert!(display.fake_key(38, KeyState::Pressed).is_err());
        display.send_focus_key(38, KeyState::Pressed, 0x1).unwrap();
        assert_eq!(display.typed_text(), "A");
    }
}
