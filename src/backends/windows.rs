use std::mem;

use anyhow::{anyhow, Result};
use winapi::um::winuser::{
    SendInput, VkKeyScanW, INPUT, INPUT_KEYBOARD, KEYBDINPUT, KEYEVENTF_KEYUP, KEYEVENTF_UNICODE,
};

use crate::model::KeyState;
use crate::session::direct::DirectInjector;

/// High byte of `VkKeyScanW`: Shift is bit 0; Ctrl and Alt mean an AltGr layer.
const VK_SCAN_SHIFT: i16 = 0x0100;
const VK_SCAN_CTRL_ALT: i16 = 0x0600;

/// Injects keys through `SendInput`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SendInputInjector;

fn key_flags(state: KeyState) -> u32 {
    match state {
        KeyState::Pressed => 0,
        KeyState::Released => KEYEVENTF_KEYUP,
    }
}

fn send_keyboard_input(ki: KEYBDINPUT) -> Result<()> {
    // SAFETY: INPUT is plain data; the union is fully overwritten with `ki` below.
    let mut input: INPUT = unsafe { mem::zeroed() };
    input.type_ = INPUT_KEYBOARD;
    unsafe { *input.u.ki_mut() = ki };

    let size = i32::try_from(mem::size_of::<INPUT>())
        .map_err(|_| anyhow!("INPUT structure size out of range"))?;
    // SAFETY: one valid INPUT, with its size, as SendInput requires.
    let sent = unsafe { SendInput(1, &mut input, size) };
    if sent != 1 {
        return Err(anyhow!(
            "SendInput rejected the key event: {}",
            std::io::Error::last_os_error()
        ));
    }
    Ok(())
}

impl DirectInjector for SendInputInjector {
    fn send_vk(&mut self, vk: u16, state: KeyState) -> Result<()> {
        send_keyboard_input(KEYBDINPUT {
            wVk: vk,
            wScan: 0,
            dwFlags: key_flags(state),
            time: 0,
            dwExtraInfo: 0,
        })
    }

    fn send_unicode(&mut self, unit: u16, state: KeyState) -> Result<()> {
        send_keyboard_input(KEYBDINPUT {
            wVk: 0,
            wScan: unit,
            dwFlags: KEYEVENTF_UNICODE | key_flags(state),
            time: 0,
            dwExtraInfo: 0,
        })
    }

    fn vk_for_char(&mut self, c: char) -> Option<(u16, bool)> {
        let mut units = [0u16; 2];
        let [unit] = c.encode_utf16(&mut units) else {
            return None;
        };

        // SAFETY: VkKeyScanW only reads its argument.
        let scan = unsafe { VkKeyScanW(*unit) };
        if scan == -1 || scan & VK_SCAN_CTRL_ALT != 0 {
            return None;
        }
        let vk = u16::try_from(scan & 0xff).ok()?;
        Some((vk, scan & VK_SCAN_SHIFT != 0))
    }
}
