//! Sessions for platforms that inject keys directly, with no keycode table to
//! manage: virtual-key codes where the layout has the character, Unicode
//! injection everywhere else.

use std::collections::HashMap;

use anyhow::Result as AnyResult;
use tracing::{debug, info, warn};

use crate::error::{KeyboardError, Result};
use crate::keysym::{resolve, LogicalKey, NamedKey, ResolvedKey};
use crate::model::KeyState;
use crate::modifiers::ModifierTracker;
use crate::session::Keyboard;

pub const VK_SHIFT: u16 = 0x10;

/// Raw key injection on a platform without a keycode table.
pub trait DirectInjector {
    fn send_vk(&mut self, vk: u16, state: KeyState) -> AnyResult<()>;

    /// Inject one UTF-16 code unit.
    fn send_unicode(&mut self, unit: u16, state: KeyState) -> AnyResult<()>;

    /// Virtual key for `c` on the active layout, and whether it needs Shift.
    fn vk_for_char(&mut self, c: char) -> Option<(u16, bool)>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectStroke {
    Vk { vk: u16, shift: bool },
    Unicode(Vec<u16>),
}

#[derive(Debug, Clone)]
struct HeldKey {
    stroke: DirectStroke,
    count: u32,
}

pub struct DirectSession<I: DirectInjector> {
    injector: I,
    vk_cache: HashMap<char, Option<(u16, bool)>>,
    pressed: HashMap<LogicalKey, HeldKey>,
    modifiers: ModifierTracker,
    closed: bool,
}

impl<I: DirectInjector> DirectSession<I> {
    pub fn new(injector: I) -> Self {
        info!("direct keyboard session opened");
        Self {
            injector,
            vk_cache: HashMap::new(),
            pressed: HashMap::new(),
            modifiers: ModifierTracker::default(),
            closed: false,
        }
    }

    pub fn injector(&self) -> &I {
        &self.injector
    }

    pub fn modifiers(&self) -> &ModifierTracker {
        &self.modifiers
    }

    pub fn held_count(&self, key: &LogicalKey) -> u32 {
        self.pressed.get(key).map_or(0, |held| held.count)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(KeyboardError::Closed)
        } else {
            Ok(())
        }
    }

    fn guarded<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = op(self);
        if let Err(err) = &result {
            warn!(error = %err, "keyboard operation failed; closing session");
            if let Err(close_err) = self.close() {
                warn!(error = %close_err, "cleanup after failure was incomplete");
            }
        }
        result
    }

    fn stroke_for(&mut self, resolved: &ResolvedKey) -> Result<DirectStroke> {
        let vk = match resolved.key {
            LogicalKey::Named(named) => named.windows_vk(),
            LogicalKey::Char('\n' | '\r') => NamedKey::Enter.windows_vk(),
            LogicalKey::Char('\t') => NamedKey::Tab.windows_vk(),
            LogicalKey::Char(c) => return Ok(self.char_stroke(c)),
            LogicalKey::Keysym(keysym) => {
                return Err(KeyboardError::NoSuchKey {
                    key: resolved.key.to_string(),
                    keysym,
                })
            }
        };
        Ok(DirectStroke::Vk { vk, shift: false })
    }

    fn char_stroke(&mut self, c: char) -> DirectStroke {
        let injector = &mut self.injector;
        let vk = *self
            .vk_cache
            .entry(c)
            .or_insert_with(|| if c.is_ascii() { injector.vk_for_char(c) } else { None });

        match vk {
            Some((vk, shift)) => DirectStroke::Vk { vk, shift },
            None => {
                let mut units = [0u16; 2];
                DirectStroke::Unicode(c.encode_utf16(&mut units).to_vec())
            }
        }
    }

    fn send(&mut self, stroke: &DirectStroke, state: KeyState) -> AnyResult<()> {
        match stroke {
            DirectStroke::Vk { vk, shift } => {
                if *shift && state == KeyState::Pressed {
                    self.injector.send_vk(VK_SHIFT, state)?;
                }
                self.injector.send_vk(*vk, state)?;
                if *shift && state == KeyState::Released {
                    self.injector.send_vk(VK_SHIFT, state)?;
                }
            }
            DirectStroke::Unicode(units) => {
                for unit in units {
                    self.injector.send_unicode(*unit, state)?;
                }
            }
        }
        Ok(())
    }

    fn press_resolved(&mut self, resolved: &ResolvedKey) -> Result<()> {
        if let Some(modifier) = resolved.modifier() {
            self.modifiers.on_key_event(modifier, true);
        }

        let stroke = match self.pressed.get(&resolved.key) {
            Some(held) => held.stroke.clone(),
            None => self.stroke_for(resolved)?,
        };
        self.send(&stroke, KeyState::Pressed)?;

        let held = self
            .pressed
            .entry(resolved.key)
            .or_insert(HeldKey { stroke, count: 0 });
        held.count += 1;
        debug!(key = %resolved.key, count = held.count, "key pressed");
        Ok(())
    }

    fn release_resolved(&mut self, resolved: &ResolvedKey) -> Result<()> {
        let (stroke, left) = match self.pressed.get_mut(&resolved.key) {
            Some(held) => {
                held.count -= 1;
                (held.stroke.clone(), held.count)
            }
            // Releasing an unheld key still sends the key up.
            None => (self.stroke_for(resolved)?, 0),
        };
        if left == 0 {
            self.pressed.remove(&resolved.key);
            if let Some(modifier) = resolved.modifier() {
                self.modifiers.on_key_event(modifier, false);
            }
        }

        self.send(&stroke, KeyState::Released)?;
        debug!(key = %resolved.key, count = left, "key released");
        Ok(())
    }

    fn release_all(&mut self) -> AnyResult<()> {
        let held: Vec<(LogicalKey, HeldKey)> = self.pressed.drain().collect();
        let mut first_err = None;

        for (key, entry) in held {
            for _ in 0..entry.count {
                if let Err(err) = self.send(&entry.stroke, KeyState::Released) {
                    warn!(key = %key, error = %err, "failed to release key");
                    first_err.get_or_insert(err);
                }
            }
        }
        self.modifiers.clear();

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<I: DirectInjector> Keyboard for DirectSession<I> {
    /// Nothing is ever registered here, so `allow_register` has no effect.
    fn press_with(&mut self, key: &LogicalKey, _allow_register: bool) -> Result<()> {
        self.ensure_open()?;
        let resolved = resolve(key)?;
        self.guarded(|session| session.press_resolved(&resolved))
    }

    fn release(&mut self, key: &LogicalKey) -> Result<()> {
        self.ensure_open()?;
        let resolved = resolve(key)?;
        self.guarded(|session| session.release_resolved(&resolved))
    }

    fn reset_all(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.guarded(|session| session.release_all().map_err(KeyboardError::from))
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let released = self.release_all();
        info!("direct keyboard session closed");
        released?;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<I: DirectInjector> Drop for DirectSession<I> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "keyboard session cleanup failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::KeyState::{Pressed as Down, Released as Up};
    use crate::modifiers::Modifier;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Sent {
        Vk(u16, KeyState),
        Unicode(u16, KeyState),
    }

    #[derive(Default)]
    struct Recorder {
        sent: Vec<Sent>,
        lookups: usize,
    }

    impl DirectInjector for Recorder {
        fn send_vk(&mut self, vk: u16, state: KeyState) -> AnyResult<()> {
            self.sent.push(Sent::Vk(vk, state));
            Ok(())
        }

        fn send_unicode(&mut self, unit: u16, state: KeyState) -> AnyResult<()> {
            self.sent.push(Sent::Unicode(unit, state));
            Ok(())
        }

        fn vk_for_char(&mut self, c: char) -> Option<(u16, bool)> {
            self.lookups += 1;
            c.is_ascii_alphanumeric()
                .then(|| (c.to_ascii_uppercase() as u16, c.is_ascii_uppercase()))
        }
    }

    #[test]
    fn uppercase_is_bracketed_with_shift() {
        let mut kb = DirectSession::new(Recorder::default());
        kb.press(&LogicalKey::Char('A')).unwrap();
        kb.release(&LogicalKey::Char('A')).unwrap();

        assert_eq!(
            kb.injector().sent,
            vec![
                Sent::Vk(VK_SHIFT, Down),
                Sent::Vk(0x41, Down),
                Sent::Vk(0x41, Up),
                Sent::Vk(VK_SHIFT, Up),
            ]
        );
    }

    #[test]
    fn characters_off_the_layout_use_unicode_units() {
        let mut kb = DirectSession::new(Recorder::default());
        kb.press_with(&LogicalKey::Char('😀'), true).unwrap();
        kb.release(&LogicalKey::Char('😀')).unwrap();

        assert_eq!(
            kb.injector().sent,
            vec![
                Sent::Unicode(0xd83d, Down),
                Sent::Unicode(0xde00, Down),
                Sent::Unicode(0xd83d, Up),
                Sent::Unicode(0xde00, Up),
            ]
        );
    }

    #[test]
    fn layout_lookups_are_cached() {
        let mut kb = DirectSession::new(Recorder::default());
        for _ in 0..3 {
            kb.press(&LogicalKey::Char('x')).unwrap();
            kb.release(&LogicalKey::Char('x')).unwrap();
        }
        kb.press(&LogicalKey::Char('é')).unwrap();
        kb.release(&LogicalKey::Char('é')).unwrap();
        assert_eq!(kb.injector().lookups, 1);
    }

    #[test]
    fn close_releases_outstanding_presses() {
        let mut kb = DirectSession::new(Recorder::default());
        let ctrl = LogicalKey::Named(NamedKey::Modifier(Modifier::Ctrl));
        kb.press(&ctrl).unwrap();
        kb.press(&ctrl).unwrap();
        assert_eq!(kb.held_count(&ctrl), 2);

        kb.close().unwrap();
        kb.close().unwrap();
        assert!(kb.is_closed());
        assert!(kb.modifiers().is_empty());

        let ups = kb
            .injector()
            .sent
            .iter()
            .filter(|s| **s == Sent::Vk(0x11, Up))
            .count();
        assert_eq!(ups, 2);
        assert!(matches!(kb.press(&ctrl), Err(KeyboardError::Closed)));
    }

    #[test]
    fn x11_only_keysyms_are_missing_here() {
        let mut kb = DirectSession::new(Recorder::default());
        let err = kb.press(&LogicalKey::Keysym(0x1008_ff14)).unwrap_err();
        assert!(matches!(err, KeyboardError::NoSuchKey { .. }));
        assert!(kb.is_closed());
    }
}
