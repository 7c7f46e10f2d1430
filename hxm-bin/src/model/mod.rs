// SPDX-License-Identifier: GPL-3.0-only

//! In-memory client model: the generational slot store and the per-client
//! hot/cold records. The model is the single source of truth; X is I/O.

pub mod client;
pub mod slotmap;
pub mod transient;

pub use client::*;
pub use slotmap::{ClientMap, Handle};
