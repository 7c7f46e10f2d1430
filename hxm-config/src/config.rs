// SPDX-License-Identifier: GPL-3.0-only

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Action, KeyBind, Modifier};

/// Where a new window without position hints is placed
#[derive(Debug, Deserialize, Serialize, Copy, Clone, PartialEq, Eq)]
pub enum Placement {
    /// centered in the workarea of the active monitor
    Center,
    /// under the pointer, clamped into the workarea
    Pointer,
}

impl Default for Placement {
    fn default() -> Self {
        Placement::Center
    }
}

impl Display for Placement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Placement::Center => write!(f, "Center"),
            Placement::Pointer => write!(f, "Pointer"),
        }
    }
}

impl FromStr for Placement {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Center" => Ok(Self::Center),
            "Pointer" => Ok(Self::Pointer),
            _ => Err(anyhow::anyhow!("Not a valid Placement")),
        }
    }
}

/// Frame colors, 0xRRGGBB
#[derive(Debug, Deserialize, Serialize, Copy, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Theme {
    pub active_border: u32,
    pub inactive_border: u32,
    pub urgent_border: u32,
    pub titlebar_active: u32,
    pub titlebar_inactive: u32,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            active_border: 0x005577,
            inactive_border: 0x444444,
            urgent_border: 0xaa3333,
            titlebar_active: 0x223344,
            titlebar_inactive: 0x2a2a2a,
        }
    }
}

/// Top level hxm configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    /// desktop names; the list length is the desktop count
    pub desktops: Vec<String>,
    /// frame border width in pixels
    pub border_width: u16,
    /// titlebar height in pixels, 0 disables titlebars
    pub titlebar_height: u16,
    pub theme: Theme,
    /// focus a window when it is first mapped
    pub focus_new_windows: bool,
    /// focus the window under the pointer on crossing events
    pub focus_follows_mouse: bool,
    pub placement: Placement,
    /// fullscreen covers the exact monitor geometry instead of the workarea
    pub fullscreen_fills_monitor: bool,
    /// edge snap threshold for interactive moves, pixels
    pub snap_distance: u16,
    /// modifier held with button 1/3 to drag-move/resize a window
    pub drag_modifier: Modifier,
    pub keybinds: Vec<KeyBind>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            desktops: vec!["1".into(), "2".into(), "3".into(), "4".into()],
            border_width: 2,
            titlebar_height: 18,
            theme: Theme::default(),
            focus_new_windows: true,
            focus_follows_mouse: false,
            placement: Placement::Center,
            fullscreen_fills_monitor: true,
            snap_distance: 12,
            drag_modifier: Modifier::Super,
            keybinds: vec![
                KeyBind::new(vec![Modifier::Super], "Tab", Action::FocusNext),
                KeyBind::new(vec![Modifier::Super, Modifier::Shift], "Tab", Action::FocusPrev),
                KeyBind::new(vec![Modifier::Super], "q", Action::Close),
                KeyBind::new(vec![Modifier::Super], "m", Action::ToggleMaximize),
                KeyBind::new(vec![Modifier::Super], "f", Action::ToggleFullscreen),
                KeyBind::new(vec![Modifier::Super], "d", Action::ShowDesktop),
            ],
        }
    }
}

impl Config {
    /// Number of desktops, never zero.
    pub fn desktop_count(&self) -> u32 {
        self.desktops.len().max(1) as u32
    }

    /// Load the config from the first existing candidate path, falling back
    /// to defaults when none parses.
    pub fn load() -> Self {
        for path in Self::config_candidates() {
            if !path.is_file() {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(text) => match ron::from_str::<Config>(&text) {
                    Ok(config) => return config,
                    Err(err) => {
                        warn!("Failed to parse {}: {}", path.display(), err);
                    }
                },
                Err(err) => {
                    warn!("Failed to read {}: {}", path.display(), err);
                }
            }
        }
        warn!("Falling back to default configuration");
        Config::default()
    }

    /// Candidate config files in priority order: XDG, then `~/.config`,
    /// then `/etc`.
    pub fn config_candidates() -> Vec<PathBuf> {
        Self::candidates("config.ron")
    }

    /// The first existing autostart executable, same fallback order as the
    /// config file.
    pub fn autostart_path() -> Option<PathBuf> {
        Self::candidates("autostart").into_iter().find(|p| p.is_file())
    }

    fn candidates(name: &str) -> Vec<PathBuf> {
        let mut out = Vec::new();
        if let Ok(base) = xdg::BaseDirectories::with_prefix("hxm") {
            if let Some(p) = base.find_config_file(name) {
                out.push(p);
            }
        }
        if let Ok(home) = std::env::var("HOME") {
            out.push(PathBuf::from(home).join(".config/hxm").join(name));
        }
        out.push(PathBuf::from("/etc/hxm").join(name));
        out.dedup();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_ron() {
        let config = Config::default();
        let text = ron::to_string(&config).unwrap();
        let back: Config = ron::from_str(&text).unwrap();
        assert_eq!(back.desktops, config.desktops);
        assert_eq!(back.border_width, config.border_width);
        assert_eq!(back.theme, config.theme);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: Config = ron::from_str("(border_width: 5)").unwrap();
        assert_eq!(config.border_width, 5);
        assert_eq!(config.desktop_count(), 4);
    }

    #[test]
    fn desktop_count_never_zero() {
        let config: Config = ron::from_str("(desktops: [])").unwrap();
        assert_eq!(config.desktop_count(), 1);
    }
}
