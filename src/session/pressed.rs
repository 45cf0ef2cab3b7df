use std::collections::BTreeMap;

use crate::keysym::Keysym;
use crate::session::dispatch::Stroke;

/// A key this session currently holds down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressedKey {
    pub stroke: Stroke,
    pub count: u32,
}

/// Keys held down by a session, reference counted per keysym.
///
/// An entry exists only while its count is positive.
#[derive(Debug, Default, Clone)]
pub struct PressedKeys {
    entries: BTreeMap<Keysym, PressedKey>,
}

impl PressedKeys {
    /// Returns the count after the press.
    pub fn record_press(&mut self, keysym: Keysym, stroke: Stroke) -> u32 {
        let entry = self
            .entries
            .entry(keysym)
            .or_insert(PressedKey { stroke, count: 0 });
        entry.count += 1;
        entry.count
    }

    /// Returns the count left after the release, or `None` if the key was not held.
    pub fn record_release(&mut self, keysym: Keysym) -> Option<u32> {
        let entry = self.entries.get_mut(&keysym)?;
        entry.count = entry.count.saturating_sub(1);
        let left = entry.count;
        if left == 0 {
            self.entries.remove(&keysym);
        }
        Some(left)
    }

    pub fn get(&self, keysym: Keysym) -> Option<&PressedKey> {
        self.entries.get(&keysym)
    }

    pub fn count(&self, keysym: Keysym) -> u32 {
        self.entries.get(&keysym).map_or(0, |e| e.count)
    }

    pub fn is_held(&self, keysym: Keysym) -> bool {
        self.count(keysym) > 0
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Keysym, &PressedKey)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    pub fn take_all(&mut self) -> Vec<(Keysym, PressedKey)> {
        std::mem::take(&mut self.entries).into_iter().collect()
    }
}
