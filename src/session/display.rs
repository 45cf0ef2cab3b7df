use anyhow::Result;

use crate::keysym::{Keysym, NO_SYMBOL};
use crate::model::{KeySlot, KeyState};
use crate::modifiers::ModifierMasks;

/// Snapshot of the X server's keycode → keysyms table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardMapping {
    pub min_keycode: u8,
    pub keysyms_per_keycode: u8,
    /// Row-major, `keysyms_per_keycode` entries per keycode starting at `min_keycode`.
    pub keysyms: Vec<Keysym>,
}

impl KeyboardMapping {
    pub fn width(&self) -> usize {
        usize::from(self.keysyms_per_keycode)
    }

    pub fn keycode_count(&self) -> usize {
        if self.keysyms_per_keycode == 0 {
            0
        } else {
            self.keysyms.len() / self.width()
        }
    }

    pub fn row(&self, keycode: u8) -> Option<&[Keysym]> {
        let offset = usize::from(keycode.checked_sub(self.min_keycode)?);
        if offset >= self.keycode_count() {
            return None;
        }
        let start = offset * self.width();
        Some(&self.keysyms[start..start + self.width()])
    }

    pub fn rows(&self) -> impl Iterator<Item = (u8, &[Keysym])> + '_ {
        let min = usize::from(self.min_keycode);
        self.keysyms
            .chunks(self.width().max(1))
            .enumerate()
            .filter_map(move |(i, row)| u8::try_from(min + i).ok().map(|keycode| (keycode, row)))
    }

    pub fn keysym_at(&self, slot: KeySlot) -> Keysym {
        self.row(slot.keycode)
            .and_then(|row| row.get(usize::from(slot.index)).copied())
            .unwrap_or(NO_SYMBOL)
    }

    /// First slot holding `keysym` within the leading `columns` columns.
    pub fn find(&self, keysym: Keysym, columns: usize) -> Option<KeySlot> {
        if keysym == NO_SYMBOL {
            return None;
        }
        self.rows().find_map(|(keycode, row)| {
            row.iter()
                .take(columns)
                .position(|&sym| sym == keysym)
                .and_then(|index| u8::try_from(index).ok())
                .map(|index| KeySlot::new(keycode, index))
        })
    }
}

/// The narrow slice of an X display a keyboard session needs.
///
/// Implemented by the real x11rb connection and by [`crate::sim::SimDisplay`].
pub trait X11Display {
    fn keyboard_mapping(&mut self) -> Result<KeyboardMapping>;

    /// Replace the keysyms of a single keycode row.
    fn change_keyboard_mapping(&mut self, keycode: u8, keysyms: &[Keysym]) -> Result<()>;

    fn modifier_masks(&mut self) -> Result<ModifierMasks>;

    /// Whether the XTEST extension is available.
    fn has_xtest(&self) -> bool;

    /// Inject a key event as if the hardware produced it.
    fn fake_key(&mut self, keycode: u8, state: KeyState) -> Result<()>;

    /// Deliver a key event directly to the window holding input focus.
    fn send_focus_key(&mut self, keycode: u8, state: KeyState, modifiers: u16) -> Result<()>;

    /// Block until the server has processed every request sent so far.
    fn sync(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}
