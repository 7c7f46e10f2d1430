// SPDX-License-Identifier: GPL-3.0-only

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// X11 modifier masks for the modifiers a binding can name.
const SHIFT_MASK: u16 = 1 << 0;
const CONTROL_MASK: u16 = 1 << 2;
const MOD1_MASK: u16 = 1 << 3;
const MOD4_MASK: u16 = 1 << 6;

/// Modifier key usable in bindings and as the drag modifier
#[derive(Debug, Deserialize, Serialize, Copy, Clone, PartialEq, Eq)]
pub enum Modifier {
    Shift,
    Control,
    /// Mod1, usually Alt
    Alt,
    /// Mod4, usually the logo key
    Super,
}

impl Modifier {
    /// The X11 modifier mask bit for this modifier.
    pub fn mask(self) -> u16 {
        match self {
            Modifier::Shift => SHIFT_MASK,
            Modifier::Control => CONTROL_MASK,
            Modifier::Alt => MOD1_MASK,
            Modifier::Super => MOD4_MASK,
        }
    }

    /// Combined mask for a modifier list.
    pub fn mask_of(mods: &[Modifier]) -> u16 {
        mods.iter().fold(0, |m, x| m | x.mask())
    }
}

impl Display for Modifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Modifier::Shift => write!(f, "Shift"),
            Modifier::Control => write!(f, "Control"),
            Modifier::Alt => write!(f, "Alt"),
            Modifier::Super => write!(f, "Super"),
        }
    }
}

impl FromStr for Modifier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Shift" => Ok(Self::Shift),
            "Control" | "Ctrl" => Ok(Self::Control),
            "Alt" | "Mod1" => Ok(Self::Alt),
            "Super" | "Mod4" | "Logo" => Ok(Self::Super),
            _ => Err(anyhow::anyhow!("Not a valid Modifier")),
        }
    }
}

/// Action a key binding can trigger
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub enum Action {
    /// cycle focus to the next window in recency order
    FocusNext,
    /// cycle focus to the previous window in recency order
    FocusPrev,
    /// politely close the focused window
    Close,
    /// toggle both maximize axes on the focused window
    ToggleMaximize,
    /// toggle fullscreen on the focused window
    ToggleFullscreen,
    /// switch to the given desktop (zero based)
    Desktop(u32),
    /// send the focused window to the given desktop (zero based)
    MoveToDesktop(u32),
    /// toggle showing-desktop mode
    ShowDesktop,
    /// run a command line
    Exec(String),
}

/// A key binding: modifiers plus a keysym name from the keyboard mapping
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct KeyBind {
    pub mods: Vec<Modifier>,
    /// keysym name, e.g. `"Return"`, `"q"`, `"F4"`, `"Left"`
    pub key: String,
    pub action: Action,
}

impl KeyBind {
    pub fn new(mods: Vec<Modifier>, key: impl Into<String>, action: Action) -> Self {
        Self { mods, key: key.into(), action }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_masks_combine() {
        assert_eq!(Modifier::mask_of(&[Modifier::Super, Modifier::Shift]), (1 << 6) | 1);
        assert_eq!(Modifier::mask_of(&[]), 0);
    }

    #[test]
    fn modifier_from_str_aliases() {
        assert_eq!("Mod4".parse::<Modifier>().unwrap(), Modifier::Super);
        assert_eq!("Ctrl".parse::<Modifier>().unwrap(), Modifier::Control);
        assert!("Hyper".parse::<Modifier>().is_err());
    }
}
