// SPDX-License-Identifier: GPL-3.0-only

//! Key binding resolution and dispatch. Config names keysyms; at install
//! time they are resolved against the server's keyboard mapping and
//! passively grabbed on the root (with lock-modifier variants so NumLock
//! and CapsLock don't defeat the grab).

use std::collections::HashMap;

use once_cell::sync::Lazy;
use tracing::warn;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt as _, Grab, GrabMode, Keycode, ModMask};

use hxm_config::{Action, Config, Modifier};

use crate::x11::{XConn, XError};

const MOD2_MASK: u16 = 1 << 4; // NumLock, usually
const LOCK_MASK: u16 = 1 << 1; // CapsLock

#[derive(Debug, Default)]
pub struct Bindings {
    by_key: HashMap<(Keycode, u16), Action>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve config bindings and install the grabs, replacing any
    /// previous set. Synchronous; runs at init and reconfigure only.
    pub fn install<C: Connection>(&mut self, x: &XConn<C>, config: &Config) -> Result<(), XError> {
        x.conn.ungrab_key(Grab::ANY, x.root, ModMask::ANY)?;
        self.by_key.clear();

        let setup = x.conn.setup();
        let (min, max) = (setup.min_keycode, setup.max_keycode);
        let count = (max as u16 - min as u16 + 1).min(u8::MAX as u16) as u8;
        let mapping = x.conn.get_keyboard_mapping(min, count)?.reply()?;
        let per = mapping.keysyms_per_keycode as usize;

        for bind in &config.keybinds {
            let Some(keysym) = keysym_from_name(&bind.key) else {
                warn!(key = %bind.key, "unknown keysym in binding");
                continue;
            };
            let Some(keycode) = find_keycode(&mapping.keysyms, per, min, keysym) else {
                warn!(key = %bind.key, "keysym not on this keyboard");
                continue;
            };
            let mods = Modifier::mask_of(&bind.mods);
            for extra in [0, MOD2_MASK, LOCK_MASK, MOD2_MASK | LOCK_MASK] {
                x.conn.grab_key(
                    false,
                    x.root,
                    ModMask::from(mods | extra),
                    keycode,
                    GrabMode::ASYNC,
                    GrabMode::ASYNC,
                )?;
            }
            self.by_key.insert((keycode, mods), bind.action.clone());
        }
        Ok(())
    }

    /// Look up the action for a key press, ignoring lock modifiers.
    pub fn lookup(&self, keycode: Keycode, state: u16) -> Option<&Action> {
        let mods = state & !(MOD2_MASK | LOCK_MASK);
        self.by_key.get(&(keycode, mods))
    }
}

fn find_keycode(keysyms: &[u32], per: usize, min: Keycode, keysym: u32) -> Option<Keycode> {
    if per == 0 {
        return None;
    }
    keysyms
        .chunks(per)
        .position(|group| group.first() == Some(&keysym))
        .map(|i| min + i as Keycode)
}

/// Named keysyms bindings realistically use beyond single characters and
/// function keys.
static NAMED_KEYSYMS: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    HashMap::from([
        ("space", 0x0020),
        ("Return", 0xff0d),
        ("Tab", 0xff09),
        ("Escape", 0xff1b),
        ("BackSpace", 0xff08),
        ("Delete", 0xffff),
        ("Left", 0xff51),
        ("Up", 0xff52),
        ("Right", 0xff53),
        ("Down", 0xff54),
        ("Home", 0xff50),
        ("End", 0xff57),
        ("Prior", 0xff55),
        ("PageUp", 0xff55),
        ("Next", 0xff56),
        ("PageDown", 0xff56),
    ])
});

/// Minimal keysym resolution covering what bindings realistically name:
/// latin letters and digits, function keys, and common navigation keys.
pub fn keysym_from_name(name: &str) -> Option<u32> {
    if name.len() == 1 {
        let c = name.chars().next()?;
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            return Some(c as u32);
        }
        if c.is_ascii_uppercase() {
            return Some(c.to_ascii_lowercase() as u32);
        }
    }
    if let Some(n) = name.strip_prefix('F') {
        if let Ok(i) = n.parse::<u32>() {
            if (1..=12).contains(&i) {
                return Some(0xffbe + i - 1);
            }
        }
    }
    NAMED_KEYSYMS.get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keysym_names_resolve() {
        assert_eq!(keysym_from_name("q"), Some('q' as u32));
        assert_eq!(keysym_from_name("Q"), Some('q' as u32));
        assert_eq!(keysym_from_name("4"), Some('4' as u32));
        assert_eq!(keysym_from_name("F1"), Some(0xffbe));
        assert_eq!(keysym_from_name("F12"), Some(0xffc9));
        assert_eq!(keysym_from_name("Return"), Some(0xff0d));
        assert_eq!(keysym_from_name("F13"), None);
        assert_eq!(keysym_from_name("nosuch"), None);
    }

    #[test]
    fn find_keycode_scans_groups() {
        // two keysyms per keycode, starting at keycode 8
        let keysyms = vec![0x61, 0x41, 0x62, 0x42, 0x63, 0x43];
        assert_eq!(find_keycode(&keysyms, 2, 8, 0x62), Some(9));
        assert_eq!(find_keycode(&keysyms, 2, 8, 0x7a), None);
    }

    #[test]
    fn lookup_strips_lock_modifiers() {
        let mut bindings = Bindings::new();
        bindings.by_key.insert((24, 64), Action::Close);
        assert_eq!(bindings.lookup(24, 64), Some(&Action::Close));
        assert_eq!(bindings.lookup(24, 64 | MOD2_MASK), Some(&Action::Close));
        assert_eq!(bindings.lookup(24, 64 | LOCK_MASK | MOD2_MASK), Some(&Action::Close));
        assert_eq!(bindings.lookup(25, 64), None);
    }
}
