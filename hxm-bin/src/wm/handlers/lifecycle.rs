// SPDX-License-Identifier: GPL-3.0-only

//! Map/Unmap/Destroy replay. These need arrival order: a window can be
//! mapped, withdrawn, and destroyed within one tick.

use tracing::{debug, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{DestroyNotifyEvent, MapRequestEvent, UnmapNotifyEvent};

use crate::model::{Dirty, Lifecycle};
use crate::wm::{interactive, manage, Wm};
use crate::x11::events::LifecycleEvent;
use crate::x11::XError;

pub fn handle<C: Connection>(wm: &mut Wm<C>, event: LifecycleEvent) -> Result<(), XError> {
    match event {
        LifecycleEvent::Map(ev) => map_request(wm, &ev),
        LifecycleEvent::Unmap(ev) => unmap_notify(wm, &ev),
        LifecycleEvent::Destroy(ev) => destroy_notify(wm, &ev),
    }
}

fn map_request<C: Connection>(wm: &mut Wm<C>, ev: &MapRequestEvent) -> Result<(), XError> {
    if wm.buckets.destroyed.contains(&ev.window) {
        return Ok(());
    }
    match wm.client_of(ev.window) {
        Some(h) => {
            // already ours: a MapRequest on an iconified client deiconifies
            if let Some(hot) = wm.clients.hot_mut(h) {
                if hot.lifecycle == Lifecycle::Unmapped {
                    hot.lifecycle = Lifecycle::Mapped;
                    hot.dirty |= Dirty::VISIBILITY | Dirty::STATE;
                    wm.root_dirty = true;
                }
            }
            Ok(())
        }
        None => {
            // gate managing on the attribute probe; override-redirect and
            // InputOnly windows map unmanaged from the reply handler
            wm.issue_probe(ev.window, crate::x11::cookies::CookieKind::AdoptAttributes, None, 0)
        }
    }
}

fn unmap_notify<C: Connection>(wm: &mut Wm<C>, ev: &UnmapNotifyEvent) -> Result<(), XError> {
    let Some(h) = wm.window_to_client.get(&ev.window).copied() else {
        return Ok(());
    };
    let Some(hot) = wm.clients.hot_mut(h) else { return Ok(()) };
    if hot.ignore_unmap > 0 {
        // echo of a WM-issued unmap (iconify, desktop switch, reparent)
        hot.ignore_unmap -= 1;
        return Ok(());
    }
    // the client withdrew the window
    debug!(window = ev.window, "client withdrew");
    manage::set_wm_state(wm, ev.window, manage::WM_STATE_WITHDRAWN)?;
    manage::unmanage(wm, h, true)
}

fn destroy_notify<C: Connection>(wm: &mut Wm<C>, ev: &DestroyNotifyEvent) -> Result<(), XError> {
    if let Some(h) = wm.frame_to_client.get(&ev.window).copied() {
        // our frame died under a live client; keep the client and let a
        // later unmanage cope with the missing frame
        warn!(frame = ev.window, "frame destroyed under a managed client");
        interactive::cancel_for(wm, h);
        wm.frame_to_client.remove(&ev.window);
        if let Some(hot) = wm.clients.hot_mut(h) {
            hot.frame = 0;
            hot.damage_handle = 0;
        }
        return Ok(());
    }
    let Some(h) = wm.window_to_client.get(&ev.window).copied() else {
        return Ok(());
    };
    if let Some(hot) = wm.clients.hot_mut(h) {
        hot.lifecycle = Lifecycle::Destroyed;
    }
    manage::unmanage(wm, h, false)
}
