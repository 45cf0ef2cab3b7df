//! Keysym → keycode slot allocation against the live X keyboard mapping.
//!
//! Keysyms the layout already carries are used where they are. Anything else
//! gets written into a spare keycode for the lifetime of the session: first a
//! keycode whose row is completely empty, otherwise one this session registered
//! earlier and is not holding down. Keycodes in the first
//! [`RESERVED_KEYCODES`] rows are never written.

use std::collections::BTreeMap;

use anyhow::Result;
use tracing::{debug, warn};

use crate::error::KeyboardError;
use crate::keysym::{keysym_name, Keysym, NO_SYMBOL};
use crate::model::KeySlot;
use crate::session::display::{KeyboardMapping, X11Display};
use crate::session::pressed::PressedKeys;

/// Rows (counted from `min_keycode`) left to the native layout.
pub const RESERVED_KEYCODES: usize = 128;

/// Columns searched when scanning the live mapping for a literal match.
const LIVE_SCAN_COLUMNS: usize = 2;

#[derive(Debug)]
pub struct KeycodeAllocator {
    /// Layout as it was when the session opened.
    native: KeyboardMapping,
    /// Slots this session wrote itself. At most one keysym per slot.
    registered: BTreeMap<Keysym, KeySlot>,
}

impl KeycodeAllocator {
    pub fn new(native: KeyboardMapping) -> Self {
        Self {
            native,
            registered: BTreeMap::new(),
        }
    }

    pub fn registered(&self) -> &BTreeMap<Keysym, KeySlot> {
        &self.registered
    }

    /// Find or make a slot for `keysym`.
    ///
    /// `Ok(None)` means the keysym is nowhere in the mapping and registration
    /// was not allowed.
    pub fn slot_for(
        &mut self,
        display: &mut impl X11Display,
        keysym: Keysym,
        allow_register: bool,
        pressed: &PressedKeys,
    ) -> Result<Option<KeySlot>, KeyboardError> {
        if let Some(slot) = self.native.find(keysym, self.native.width()) {
            return Ok(Some(slot));
        }

        if let Some(slot) = self.registered.get(&keysym) {
            return Ok(Some(*slot));
        }

        let live = display.keyboard_mapping()?;
        if let Some(slot) = live.find(keysym, LIVE_SCAN_COLUMNS) {
            return Ok(Some(slot));
        }

        if !allow_register {
            return Ok(None);
        }

        let slot = self
            .find_void_slot(&live, pressed)
            .ok_or(KeyboardError::NoSpareSlots(keysym))?;
        self.register(display, &live, keysym, slot)?;
        Ok(Some(slot))
    }

    /// A slot that may be overwritten: an empty row above the reserved range, or
    /// a registered slot whose keysym is not held down.
    pub fn find_void_slot(&self, live: &KeyboardMapping, pressed: &PressedKeys) -> Option<KeySlot> {
        let first_free = usize::from(live.min_keycode) + RESERVED_KEYCODES;

        let void = live
            .rows()
            .filter(|(keycode, _)| usize::from(*keycode) >= first_free)
            .find(|(_, row)| row.iter().all(|&sym| sym == NO_SYMBOL))
            .map(|(keycode, _)| KeySlot::new(keycode, 0));

        void.or_else(|| {
            self.registered
                .iter()
                .find(|(keysym, _)| !pressed.is_held(**keysym))
                .map(|(_, slot)| *slot)
        })
    }

    fn register(
        &mut self,
        display: &mut impl X11Display,
        live: &KeyboardMapping,
        keysym: Keysym,
        slot: KeySlot,
    ) -> Result<()> {
        let mut row = live
            .row(slot.keycode)
            .map(<[Keysym]>::to_vec)
            .unwrap_or_else(|| vec![NO_SYMBOL; live.width()]);
        if row.is_empty() {
            row.push(NO_SYMBOL);
        }
        row[0] = keysym;
        if let Some(column) = row.get_mut(usize::from(slot.index)) {
            *column = keysym;
        }

        display.change_keyboard_mapping(slot.keycode, &row)?;
        display.sync()?;

        self.registered.retain(|_, bound| *bound != slot);
        self.registered.insert(keysym, slot);

        debug!(
            keysym = %keysym_name(keysym),
            keycode = slot.keycode,
            index = slot.index,
            "registered keysym"
        );
        Ok(())
    }

    /// Erase every registered slot from the live mapping.
    ///
    /// Every slot is attempted; the registry is empty afterwards even if some
    /// writes failed, and the first failure is returned.
    pub fn clear(&mut self, display: &mut impl X11Display) -> Result<()> {
        let empty = vec![NO_SYMBOL; self.native.width().max(1)];
        let mut first_err = None;

        for (keysym, slot) in std::mem::take(&mut self.registered) {
            match display.change_keyboard_mapping(slot.keycode, &empty) {
                Ok(()) => debug!(keycode = slot.keycode, "cleared registered keycode"),
                Err(err) => {
                    warn!(
                        keysym = %keysym_name(keysym),
                        keycode = slot.keycode,
                        error = %err,
                        "failed to clear registered keycode"
                    );
                    first_err.get_or_insert(err);
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => display.sync(),
        }
    }
}
