// SPDX-License-Identifier: GPL-3.0-only

//! Bucket processing in the fixed per-tick order. Each phase fully drains
//! its bucket before the next begins; windows the bucketer flagged as
//! destroyed short-circuit every later phase.

pub mod configure;
pub mod input;
pub mod lifecycle;
pub mod message;
pub mod property;
pub mod randr;

pub use randr::{monitors_from_reply, refit_after_monitor_change};

use x11rb::connection::Connection;
use x11rb::protocol::damage::ConnectionExt as _;

use crate::model::Dirty;
use crate::wm::Wm;
use crate::x11::XError;

pub fn process<C: Connection>(wm: &mut Wm<C>) -> Result<(), XError> {
    // 1. lifecycle replay
    let lifecycle_events = std::mem::take(&mut wm.buckets.lifecycle);
    for event in lifecycle_events {
        lifecycle::handle(wm, event)?;
    }

    // 2. key presses
    let keys = std::mem::take(&mut wm.buckets.keys);
    for ev in keys {
        input::key_press(wm, &ev)?;
    }

    // 3. buttons
    let buttons = std::mem::take(&mut wm.buckets.buttons);
    for ev in buttons {
        input::button(wm, &ev)?;
    }

    // 4. expose
    let expose: Vec<_> = wm.buckets.expose.drain().collect();
    for (window, region) in expose {
        if wm.buckets.destroyed.contains(&window) {
            continue;
        }
        configure::expose(wm, window, region);
    }

    // 5. client messages
    let messages = std::mem::take(&mut wm.buckets.messages);
    for ev in messages {
        message::handle(wm, &ev)?;
    }

    // 6. pointer motion and crossing
    let motion: Vec<_> = wm.buckets.motion.drain().collect();
    for (_, ev) in motion {
        input::motion(wm, &ev);
    }
    if let Some(ev) = wm.buckets.enter.take() {
        input::enter(wm, &ev);
    }
    wm.buckets.leave.take();

    // 7. coalesced configure requests
    let requests: Vec<_> = wm.buckets.configure_requests.drain().collect();
    for (window, pending) in requests {
        if wm.buckets.destroyed.contains(&window) {
            continue;
        }
        configure::request(wm, window, &pending)?;
    }

    // 8. coalesced configure notifies
    let notifies: Vec<_> = wm.buckets.configure_notifies.drain().collect();
    for (window, ev) in notifies {
        if wm.buckets.destroyed.contains(&window) {
            continue;
        }
        configure::notify(wm, window, &ev);
    }

    // 9. property notifies, coalesced per (window, atom)
    let properties: Vec<_> = wm.buckets.properties.drain().collect();
    for ((window, atom), _) in properties {
        if wm.buckets.destroyed.contains(&window) {
            continue;
        }
        property::changed(wm, window, atom)?;
    }

    // 10. damage
    let damage: Vec<_> = wm.buckets.damage.drain().collect();
    for (drawable, region) in damage {
        if let Some(h) = wm.client_of(drawable) {
            let mut subtract = 0;
            if let Some(hot) = wm.clients.hot_mut(h) {
                hot.damage = hot.damage.union(&region);
                hot.dirty |= Dirty::FRAME;
                subtract = hot.damage_handle;
            }
            if subtract != 0 {
                let _ = wm.x.conn.damage_subtract(subtract, x11rb::NONE, x11rb::NONE);
            }
        }
    }

    // 11. output changes
    if let Some(ev) = wm.buckets.randr_change.take() {
        randr::screen_change(wm, &ev)?;
    }
    Ok(())
}
