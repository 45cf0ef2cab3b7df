use anyhow::{anyhow, Context, Result};
use tracing::{debug, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::xproto::{self, ConnectionExt as _, GetInputFocusReply};
use x11rb::protocol::xtest::{self, ConnectionExt as _};
use x11rb::rust_connection::RustConnection;

use crate::keysym::{Keysym, XK_ALT_L, XK_ALT_R, XK_ISO_LEVEL3_SHIFT, XK_MODE_SWITCH};
use crate::model::{KeySlot, KeyState};
use crate::modifiers::ModifierMasks;
use crate::session::display::{KeyboardMapping, X11Display};

/// X11 special focus value: the focused window follows the pointer.
const POINTER_ROOT: xproto::Window = 1;

/// Modifier rows Mod1..Mod5 in the server's modifier mapping.
const FIRST_MOD_ROW: usize = 3;

fn key_state_to_x11_event_type(state: KeyState) -> u8 {
    match state {
        KeyState::Pressed => xproto::KEY_PRESS_EVENT,
        KeyState::Released => xproto::KEY_RELEASE_EVENT,
    }
}

fn query_xtest(conn: &impl RequestConnection) -> Result<bool> {
    let ext = conn
        .extension_information(xtest::X11_EXTENSION_NAME)
        .context("failed to query X11 extension info")?;

    if ext.is_none() {
        return Ok(false);
    }

    // A server that lists XTEST but cannot report a version is treated as lacking it.
    let version = conn
        .xtest_get_version(2, 2)
        .ok()
        .and_then(|cookie| cookie.reply().ok());
    Ok(version.is_some())
}

fn get_focus(conn: &impl Connection) -> Result<GetInputFocusReply> {
    conn.get_input_focus()
        .context("failed to request input focus")?
        .reply()
        .context("failed to read input focus reply")
}

/// A live connection to an X server.
pub struct XConnection {
    conn: Option<RustConnection>,
    root: xproto::Window,
    min_keycode: u8,
    max_keycode: u8,
    xtest: bool,
}

impl XConnection {
    /// Connect to `display_name`, or `$DISPLAY` when `None`.
    pub fn connect(display_name: Option<&str>) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(display_name).context("failed to connect to X11")?;

        let setup = conn.setup();
        let root = setup
            .roots
            .get(screen_num)
            .ok_or_else(|| anyhow!("invalid X11 screen index"))?
            .root;
        let (min_keycode, max_keycode) = (setup.min_keycode, setup.max_keycode);

        let xtest = query_xtest(&conn)?;
        debug!(screen_num, min_keycode, max_keycode, xtest, "connected to X11");

        Ok(Self {
            conn: Some(conn),
            root,
            min_keycode,
            max_keycode,
            xtest,
        })
    }

    fn conn(&self) -> Result<&RustConnection> {
        self.conn
            .as_ref()
            .ok_or_else(|| anyhow!("X11 connection is closed"))
    }

    /// Window that focus events are addressed to.
    fn focus_window(&self) -> Result<xproto::Window> {
        let focus = get_focus(self.conn()?)?.focus;
        if focus == x11rb::NONE {
            return Err(anyhow!(
                "no X11 input focus detected; click into the target window first"
            ));
        }
        if focus == POINTER_ROOT {
            return Ok(self.root);
        }
        Ok(focus)
    }
}

impl X11Display for XConnection {
    fn keyboard_mapping(&mut self) -> Result<KeyboardMapping> {
        let count = self.max_keycode - self.min_keycode + 1;
        let reply = self
            .conn()?
            .get_keyboard_mapping(self.min_keycode, count)
            .context("failed to request keyboard mapping")?
            .reply()
            .context("failed to read keyboard mapping")?;

        if reply.keysyms_per_keycode == 0 {
            return Err(anyhow!("X server returned 0 keysyms per keycode"));
        }

        Ok(KeyboardMapping {
            min_keycode: self.min_keycode,
            keysyms_per_keycode: reply.keysyms_per_keycode,
            keysyms: reply.keysyms,
        })
    }

    fn change_keyboard_mapping(&mut self, keycode: u8, keysyms: &[Keysym]) -> Result<()> {
        let per = u8::try_from(keysyms.len())
            .map_err(|_| anyhow!("keycode row of {} keysyms is too wide", keysyms.len()))?;
        self.conn()?
            .change_keyboard_mapping(1, keycode, per, keysyms)
            .context("failed to send ChangeKeyboardMapping")?
            .check()
            .with_context(|| format!("X server rejected the mapping for keycode {keycode}"))?;
        Ok(())
    }

    fn modifier_masks(&mut self) -> Result<ModifierMasks> {
        let mapping = self.keyboard_mapping()?;
        let reply = self
            .conn()?
            .get_modifier_mapping()
            .context("failed to request modifier mapping")?
            .reply()
            .context("failed to read modifier mapping")?;

        let mut masks = ModifierMasks::default();
        let per = reply.keycodes.len() / 8;
        if per == 0 {
            warn!("empty modifier mapping; using default Alt/AltGr masks");
            return Ok(masks);
        }

        let row_has = |row: usize, wanted: &[Keysym]| {
            reply.keycodes[row * per..(row + 1) * per]
                .iter()
                .filter(|&&keycode| keycode != 0)
                .any(|&keycode| {
                    (0..2).any(|index| {
                        wanted.contains(&mapping.keysym_at(KeySlot::new(keycode, index)))
                    })
                })
        };

        // Last match wins so an explicit Mod5 AltGr binding beats a stray Mode_switch.
        for row in FIRST_MOD_ROW..8 {
            let bit = 1u16 << row;
            if row_has(row, &[XK_ALT_L, XK_ALT_R]) {
                masks.alt = bit;
            }
            if row_has(row, &[XK_ISO_LEVEL3_SHIFT, XK_MODE_SWITCH]) {
                masks.alt_gr = bit;
            }
        }

        debug!(alt = masks.alt, alt_gr = masks.alt_gr, "modifier masks");
        Ok(masks)
    }

    fn has_xtest(&self) -> bool {
        self.xtest
    }

    fn fake_key(&mut self, keycode: u8, state: KeyState) -> Result<()> {
        // XTEST FakeInput: detail is the keycode, time CURRENT_TIME, device 0 (core keyboard).
        let type_ = key_state_to_x11_event_type(state);
        self.conn()?
            .xtest_fake_input(type_, keycode, x11rb::CURRENT_TIME, self.root, 0, 0, 0)
            .context("failed to send XTEST fake input")?;
        Ok(())
    }

    fn send_focus_key(&mut self, keycode: u8, state: KeyState, modifiers: u16) -> Result<()> {
        let window = self.focus_window()?;
        let event = xproto::KeyPressEvent {
            response_type: key_state_to_x11_event_type(state),
            detail: keycode,
            sequence: 0,
            time: x11rb::CURRENT_TIME,
            root: self.root,
            event: window,
            child: x11rb::NONE,
            root_x: 0,
            root_y: 0,
            event_x: 0,
            event_y: 0,
            state: modifiers.into(),
            same_screen: false,
        };

        self.conn()?
            .send_event(true, window, xproto::EventMask::NO_EVENT, event)
            .context("failed to send key event to the focus window")?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        let conn = self.conn()?;
        conn.flush().context("failed to flush X11 connection")?;
        get_focus(conn)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.flush().context("failed to flush X11 connection")?;
        }
        Ok(())
    }
}
