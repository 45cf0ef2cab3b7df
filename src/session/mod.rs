//! Keyboard sessions: the state that sits between a logical key and the events
//! the display server receives.
//!
//! A session owns its display connection, the keycodes it registered, the keys
//! it holds down and the modifiers it has pressed. Whatever happens, closing
//! the session (explicitly, on error, or on drop) releases every held key and
//! erases every registered keycode.

pub mod allocator;
pub mod direct;
pub mod dispatch;
pub mod display;
pub mod pressed;

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::error::{KeyboardError, Result};
use crate::keyboard::{
    evdev_to_x11_keycode, static_keystroke, KEY_1, KEY_A, KEY_APOSTROPHE, KEY_LEFTBRACE,
    KEY_MINUS, KEY_Q, KEY_RIGHTBRACE,
};
use crate::keysym::{keysym_name, resolve, Keysym, LogicalKey, ResolvedKey, NO_SYMBOL};
use crate::model::{KeySlot, KeyState};
use crate::modifiers::ModifierTracker;

use self::allocator::KeycodeAllocator;
use self::dispatch::{Dispatcher, Route, Stroke};
use self::display::{KeyboardMapping, X11Display};
use self::pressed::PressedKeys;

/// The contract every platform backend satisfies.
pub trait Keyboard {
    /// Press `key`. With `allow_register`, keysyms missing from the layout are
    /// written into a spare keycode first.
    fn press_with(&mut self, key: &LogicalKey, allow_register: bool) -> Result<()>;

    fn press(&mut self, key: &LogicalKey) -> Result<()> {
        self.press_with(key, false)
    }

    fn release(&mut self, key: &LogicalKey) -> Result<()>;

    /// Release everything this session still holds down.
    fn reset_all(&mut self) -> Result<()>;

    /// Release held keys, undo keymap changes and disconnect. Idempotent.
    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Deliver every event to the focus window even when XTEST is present.
    pub force_focus_events: bool,
    /// Type US-layout characters through their fixed keycodes. Only honored
    /// when the server layout actually is US.
    pub static_table: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            force_focus_events: false,
            static_table: true,
        }
    }
}

/// Spot checks that the server maps the fixed-table keycodes like a US layout.
pub fn matches_us_layout(mapping: &KeyboardMapping) -> bool {
    let checks: [(u32, char, char); 7] = [
        (KEY_A, 'a', 'A'),
        (KEY_Q, 'q', 'Q'),
        (KEY_1, '1', '!'),
        (KEY_MINUS, '-', '_'),
        (KEY_APOSTROPHE, '\'', '"'),
        (KEY_LEFTBRACE, '[', '{'),
        (KEY_RIGHTBRACE, ']', '}'),
    ];

    checks.iter().all(|&(evdev, unshifted, shifted)| {
        let Ok(keycode) = evdev_to_x11_keycode(evdev) else {
            return false;
        };
        let got0 = mapping.keysym_at(KeySlot::new(keycode, 0));
        let got1 = mapping.keysym_at(KeySlot::new(keycode, 1));
        got0 != NO_SYMBOL && got0 == unshifted as Keysym && got1 == shifted as Keysym
    })
}

/// Keyboard session against an X display.
pub struct X11Session<D: X11Display> {
    display: D,
    allocator: KeycodeAllocator,
    dispatcher: Dispatcher,
    pressed: PressedKeys,
    modifiers: ModifierTracker,
    static_table: bool,
    closed: bool,
}

impl<D: X11Display> X11Session<D> {
    pub fn open(mut display: D, options: SessionOptions) -> Result<Self> {
        let native = display.keyboard_mapping()?;
        let masks = display.modifier_masks()?;
        let xtest = display.has_xtest();

        let static_table = options.static_table && matches_us_layout(&native);
        if options.static_table && !static_table {
            warn!("server keymap is not US; every key goes through the keycode allocator");
        }

        let dispatcher = Dispatcher::new(xtest, options.force_focus_events, masks)?;
        if !xtest {
            warn!("XTEST extension missing; delivering key events to the focus window");
        }

        info!(
            min_keycode = native.min_keycode,
            keysyms_per_keycode = native.keysyms_per_keycode,
            route = ?dispatcher.route(),
            static_table,
            "keyboard session opened"
        );

        Ok(Self {
            display,
            allocator: KeycodeAllocator::new(native),
            dispatcher,
            pressed: PressedKeys::default(),
            modifiers: ModifierTracker::default(),
            static_table,
            closed: false,
        })
    }

    pub fn registered(&self) -> &BTreeMap<Keysym, KeySlot> {
        self.allocator.registered()
    }

    pub fn pressed(&self) -> &PressedKeys {
        &self.pressed
    }

    pub fn modifiers(&self) -> &ModifierTracker {
        &self.modifiers
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn route(&self) -> Route {
        self.dispatcher.route()
    }

    pub fn uses_static_table(&self) -> bool {
        self.static_table
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(KeyboardError::Closed)
        } else {
            Ok(())
        }
    }

    /// Run `op`; if it fails, close the session before handing the error back.
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

    fn static_stroke(&self, resolved: &ResolvedKey) -> Result<Option<Stroke>> {
        if !self.static_table {
            return Ok(None);
        }
        let Some(stroke) = static_keystroke(&resolved.key) else {
            return Ok(None);
        };
        let keycode = evdev_to_x11_keycode(stroke.keycode)?;
        let slot = KeySlot::new(keycode, u8::from(stroke.shift));
        Ok(Some(self.dispatcher.stroke(slot, stroke.shift)))
    }

    fn stroke_for(&mut self, resolved: &ResolvedKey, allow_register: bool) -> Result<Stroke> {
        if let Some(stroke) = self.static_stroke(resolved)? {
            return Ok(stroke);
        }

        let slot = self
            .allocator
            .slot_for(&mut self.display, resolved.keysym, allow_register, &self.pressed)?
            .ok_or_else(|| KeyboardError::NoSuchKey {
                key: resolved.key.to_string(),
                keysym: resolved.keysym,
            })?;
        // XTEST has no column argument; the second column needs a real Shift.
        let shifted = slot.index == 1 && self.dispatcher.route() == Route::Xtest;
        Ok(self.dispatcher.stroke(slot, shifted))
    }

    fn press_resolved(&mut self, resolved: &ResolvedKey, allow_register: bool) -> Result<()> {
        if let Some(modifier) = resolved.modifier() {
            self.modifiers.on_key_event(modifier, true);
        }

        // A key already held keeps the slot it was pressed through.
        let stroke = match self.pressed.get(resolved.keysym) {
            Some(held) => held.stroke,
            None => self.stroke_for(resolved, allow_register)?,
        };

        self.dispatcher
            .send(&mut self.display, &stroke, KeyState::Pressed, &self.modifiers)?;
        let count = self.pressed.record_press(resolved.keysym, stroke);

        debug!(
            key = %resolved.key,
            keysym = %keysym_name(resolved.keysym),
            keycode = stroke.slot.keycode,
            count,
            "key pressed"
        );
        Ok(())
    }

    fn release_resolved(&mut self, resolved: &ResolvedKey) -> Result<()> {
        let stroke = match self.pressed.get(resolved.keysym) {
            Some(held) => held.stroke,
            // Fixed-table keys are released even when not held; anything else
            // has no slot to release.
            None => match self.static_stroke(resolved)? {
                Some(stroke) => stroke,
                None => {
                    debug!(key = %resolved.key, "release of a key that is not held");
                    return Ok(());
                }
            },
        };

        let left = self.pressed.record_release(resolved.keysym).unwrap_or(0);
        if left == 0 && resolved.modifier().is_some() {
            self.modifiers.release_keysym(resolved.keysym);
        }

        self.dispatcher
            .send(&mut self.display, &stroke, KeyState::Released, &self.modifiers)?;

        debug!(
            key = %resolved.key,
            keycode = stroke.slot.keycode,
            count = left,
            "key released"
        );
        Ok(())
    }

    /// Release every outstanding press, best effort. Returns the first failure.
    fn release_all(&mut self) -> anyhow::Result<()> {
        let held = self.pressed.take_all();
        let mut first_err = None;

        for (keysym, entry) in held {
            for _ in 0..entry.count {
                if let Err(err) = self.dispatcher.send(
                    &mut self.display,
                    &entry.stroke,
                    KeyState::Released,
                    &self.modifiers,
                ) {
                    warn!(keysym = %keysym_name(keysym), error = %err, "failed to release key");
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

impl<D: X11Display> Keyboard for X11Session<D> {
    fn press_with(&mut self, key: &LogicalKey, allow_register: bool) -> Result<()> {
        self.ensure_open()?;
        let resolved = resolve(key)?;
        self.guarded(|session| session.press_resolved(&resolved, allow_register))
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
        // Set first so a failing step cannot re-enter close through the guard.
        self.closed = true;

        let released = self.release_all();
        let registered = self.allocator.registered().len();
        let cleared = self.allocator.clear(&mut self.display);
        let disconnected = self.display.close();

        info!(registered, "keyboard session closed");
        released.and(cleared).and(disconnected)?;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<D: X11Display> Drop for X11Session<D> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "keyboard session cleanup failed");
        }
    }
}
