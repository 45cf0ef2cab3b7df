use anyhow::Result;
use tracing::trace;

use crate::keyboard::{evdev_to_x11_keycode, KEY_LEFTSHIFT};
use crate::model::{KeySlot, KeyState};
use crate::modifiers::{ModifierMasks, ModifierTracker};
use crate::session::display::X11Display;

/// How a key event reaches the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// XTEST fake input: indistinguishable from a hardware key.
    Xtest,
    /// A synthetic event delivered to the focused window.
    Focus,
}

/// Everything needed to press or release one key again later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stroke {
    pub slot: KeySlot,
    pub route: Route,
    /// Bracket the key with Shift (fixed-table characters only).
    pub shifted: bool,
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    route: Route,
    masks: ModifierMasks,
    shift_keycode: u8,
}

impl Dispatcher {
    pub fn new(xtest: bool, force_focus: bool, masks: ModifierMasks) -> Result<Self> {
        let route = if xtest && !force_focus {
            Route::Xtest
        } else {
            Route::Focus
        };
        Ok(Self {
            route,
            masks,
            shift_keycode: evdev_to_x11_keycode(KEY_LEFTSHIFT)?,
        })
    }

    pub fn route(&self) -> Route {
        self.route
    }

    pub fn stroke(&self, slot: KeySlot, shifted: bool) -> Stroke {
        Stroke {
            slot,
            route: self.route,
            shifted,
        }
    }

    /// Send one press or release, with Shift wrapped around shifted strokes:
    /// Shift goes down before the key press and up after the key release.
    pub fn send(
        &self,
        display: &mut impl X11Display,
        stroke: &Stroke,
        state: KeyState,
        modifiers: &ModifierTracker,
    ) -> Result<()> {
        let shift = KeySlot::new(self.shift_keycode, 0);

        if stroke.shifted && state == KeyState::Pressed {
            self.send_slot(display, shift, stroke.route, state, modifiers)?;
        }

        self.send_slot(display, stroke.slot, stroke.route, state, modifiers)?;

        if stroke.shifted && state == KeyState::Released {
            self.send_slot(display, shift, stroke.route, state, modifiers)?;
        }

        Ok(())
    }

    fn send_slot(
        &self,
        display: &mut impl X11Display,
        slot: KeySlot,
        route: Route,
        state: KeyState,
        modifiers: &ModifierTracker,
    ) -> Result<()> {
        match route {
            Route::Xtest => display.fake_key(slot.keycode, state)?,
            Route::Focus => {
                // The column doubles as the low state bits: column 1 reads as Shift.
                let mask = u16::from(slot.index) | modifiers.current_mask(&self.masks);
                display.send_focus_key(slot.keycode, state, mask)?;
            }
        }
        trace!(keycode = slot.keycode, index = slot.index, ?route, ?state, "key event sent");

        display.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifiers::Modifier;
    use crate::sim::{SimDelivery, SimDisplay};

    #[test]
    fn shifted_stroke_wraps_press_and_release() {
        let mut display = SimDisplay::us_qwerty();
        let dispatcher = Dispatcher::new(true, false, ModifierMasks::default()).unwrap();
        let stroke = dispatcher.stroke(KeySlot::new(38, 1), true);
        let mods = ModifierTracker::default();

        dispatcher
            .send(&mut display, &stroke, KeyState::Pressed, &mods)
            .unwrap();
        dispatcher
            .send(&mut display, &stroke, KeyState::Released, &mods)
            .unwrap();

        let keycodes: Vec<(u8, KeyState)> = display
            .events()
            .iter()
            .map(|e| (e.keycode, e.state))
            .collect();
        assert_eq!(
            keycodes,
            vec![
                (50, KeyState::Pressed),
                (38, KeyState::Pressed),
                (38, KeyState::Released),
                (50, KeyState::Released),
            ]
        );
        assert_eq!(display.syncs(), 4);
    }

    #[test]
    fn focus_route_carries_column_and_modifier_mask() {
        let mut display = SimDisplay::us_qwerty();
        let dispatcher = Dispatcher::new(true, true, ModifierMasks::default()).unwrap();
        assert_eq!(dispatcher.route(), Route::Focus);

        let mut mods = ModifierTracker::default();
        mods.on_key_event(Modifier::Ctrl, true);
        let stroke = dispatcher.stroke(KeySlot::new(200, 1), false);
        dispatcher
            .send(&mut display, &stroke, KeyState::Pressed, &mods)
            .unwrap();

        let events = display.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].delivery, SimDelivery::Focus);
        assert_eq!(events[0].modifiers, 0x0001 | 0x0004);
    }

    #[test]
    fn missing_xtest_falls_back_to_focus_events() {
        let dispatcher = Dispatcher::new(false, false, ModifierMasks::default()).unwrap();
        assert_eq!(dispatcher.route(), Route::Focus);
    }
}
