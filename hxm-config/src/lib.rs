// SPDX-License-Identifier: GPL-3.0-only

//! Config for hxm

mod config;
mod keybind;

pub use config::*;
pub use keybind::*;
