// SPDX-License-Identifier: GPL-3.0-only

//! Coalesced ConfigureRequest/ConfigureNotify handling plus Expose
//! routing. Requests from managed clients update `desired` and let the
//! commit phase emit; unmanaged windows are configured straight through.

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    ConfigureNotifyEvent, ConfigWindow, ConfigureWindowAux, ConnectionExt as _, StackMode,
    Window,
};

use crate::model::Dirty;
use crate::util::Rect;
use crate::wm::decor::FrameInsets;
use crate::wm::Wm;
use crate::x11::events::PendingConfigure;
use crate::x11::XError;

pub fn request<C: Connection>(
    wm: &mut Wm<C>,
    window: Window,
    pending: &PendingConfigure,
) -> Result<(), XError> {
    let Some(h) = wm.window_to_client.get(&window).copied() else {
        // unmanaged: pass the coalesced request straight through
        let mut aux = ConfigureWindowAux::new();
        if pending.has(ConfigWindow::X) {
            aux = aux.x(pending.x);
        }
        if pending.has(ConfigWindow::Y) {
            aux = aux.y(pending.y);
        }
        if pending.has(ConfigWindow::WIDTH) {
            aux = aux.width(pending.width.max(1));
        }
        if pending.has(ConfigWindow::HEIGHT) {
            aux = aux.height(pending.height.max(1));
        }
        if pending.has(ConfigWindow::BORDER_WIDTH) {
            aux = aux.border_width(pending.border_width);
        }
        if pending.has(ConfigWindow::SIBLING) {
            aux = aux.sibling(pending.sibling);
        }
        if pending.has(ConfigWindow::STACK_MODE) {
            aux = aux.stack_mode(StackMode::from(pending.stack_mode));
        }
        wm.x.conn.configure_window(window, &aux)?;
        return Ok(());
    };

    let restack = pending.has(ConfigWindow::STACK_MODE).then_some(pending.stack_mode);
    if let Some(hot) = wm.clients.hot_mut(h) {
        if pending.has(ConfigWindow::X) {
            hot.desired.x = pending.x;
        }
        if pending.has(ConfigWindow::Y) {
            hot.desired.y = pending.y;
        }
        if pending.has(ConfigWindow::WIDTH) {
            hot.desired.w = pending.width.max(1);
        }
        if pending.has(ConfigWindow::HEIGHT) {
            hot.desired.h = pending.height.max(1);
        }
        // even a no-op request gets its synthetic ConfigureNotify echo
        hot.dirty |= Dirty::GEOM;
    }
    match restack {
        Some(m) if m == u32::from(StackMode::ABOVE) as u8 => wm.stacking.raise(&mut wm.clients, h),
        Some(m) if m == u32::from(StackMode::BELOW) as u8 => wm.stacking.lower(&mut wm.clients, h),
        _ => {}
    }
    Ok(())
}

/// Reconcile the model's idea of server geometry with reality.
pub fn notify<C: Connection>(wm: &mut Wm<C>, window: Window, ev: &ConfigureNotifyEvent) {
    if let Some(h) = wm.frame_to_client.get(&window).copied() {
        let insets = wm.clients.hot(h).map(|hot| FrameInsets::for_client(&wm.config, hot));
        if let (Some(hot), Some(insets)) = (wm.clients.hot_mut(h), insets) {
            let offset = insets.client_offset();
            hot.server.x = ev.x as i32 + offset.0;
            hot.server.y = ev.y as i32 + offset.1;
        }
        return;
    }
    if let Some(h) = wm.window_to_client.get(&window).copied() {
        if let Some(hot) = wm.clients.hot_mut(h) {
            hot.server.w = ev.width.max(1) as u32;
            hot.server.h = ev.height.max(1) as u32;
            if hot.frame == 0 {
                // unframed (or frame lost): the event carries root coords
                hot.server.x = ev.x as i32;
                hot.server.y = ev.y as i32;
            }
        }
    }
}

/// Expose on a frame accumulates damage and schedules a redraw.
pub fn expose<C: Connection>(wm: &mut Wm<C>, window: Window, region: Rect) {
    if let Some(h) = wm.frame_to_client.get(&window).copied() {
        if let Some(hot) = wm.clients.hot_mut(h) {
            hot.damage = hot.damage.union(&region);
            hot.dirty |= Dirty::FRAME;
        }
    }
}
