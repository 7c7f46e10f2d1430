// SPDX-License-Identifier: GPL-3.0-only

//! EWMH/ICCCM client-message commands: desktop control, activation,
//! state changes, move/resize requests, restacking, close, ping.

use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{AtomEnum, ClientMessageEvent, PropMode, Window};
use x11rb::wrapper::ConnectionExt as _;

use crate::model::{Dirty, Handle, Layer, Lifecycle, ManagePhase, ResizeDir, WinState};
use crate::util::Rect;
use crate::wm::decor::FrameInsets;
use crate::wm::interactive::{self, DragMode};
use crate::wm::{manage, placement, Wm};
use crate::x11::props;
use crate::x11::XError;

/// `_NET_WM_MOVERESIZE` special directions beyond the 0..=7 resize set.
const MOVERESIZE_MOVE: u32 = 8;
const MOVERESIZE_SIZE_KEYBOARD: u32 = 9;
const MOVERESIZE_MOVE_KEYBOARD: u32 = 10;
const MOVERESIZE_CANCEL: u32 = 11;

pub fn handle<C: Connection>(wm: &mut Wm<C>, ev: &ClientMessageEvent) -> Result<(), XError> {
    let a = wm.x.atoms;
    let data = ev.data.as_data32();
    let t = ev.type_;

    if t == a._NET_CURRENT_DESKTOP {
        switch_desktop(wm, data[0]);
    } else if t == a._NET_NUMBER_OF_DESKTOPS {
        set_desktop_count(wm, data[0])?;
    } else if t == a._NET_SHOWING_DESKTOP {
        show_desktop(wm, data[0] != 0);
    } else if t == a._NET_DESKTOP_GEOMETRY || t == a._NET_DESKTOP_VIEWPORT {
        // large-desktop scrolling is not a thing here; just re-announce
        wm.publish_desktop_statics()?;
    } else if t == a._NET_ACTIVE_WINDOW {
        if let Some(h) = wm.client_of(ev.window) {
            activate(wm, h);
        }
    } else if t == a._NET_CLOSE_WINDOW {
        if let Some(h) = wm.client_of(ev.window) {
            manage::close_client(wm, h)?;
        }
    } else if t == a._NET_WM_MOVERESIZE {
        if let Some(h) = wm.client_of(ev.window) {
            moveresize(wm, h, &data)?;
        }
    } else if t == a._NET_MOVERESIZE_WINDOW {
        if let Some(h) = wm.client_of(ev.window) {
            moveresize_window(wm, h, &data);
        }
    } else if t == a._NET_RESTACK_WINDOW {
        if let Some(h) = wm.client_of(ev.window) {
            restack(wm, h, data[1], data[2]);
        }
    } else if t == a._NET_WM_FULLSCREEN_MONITORS {
        if let Some(h) = wm.client_of(ev.window) {
            wm.bump_txn(h);
            if let Some(hot) = wm.clients.hot_mut(h) {
                hot.fullscreen_monitors = Some([data[0], data[1], data[2], data[3]]);
            }
            if wm.clients.hot(h).is_some_and(|hot| hot.state.contains(WinState::FULLSCREEN)) {
                let target = fullscreen_target(wm, h);
                if let Some(hot) = wm.clients.hot_mut(h) {
                    placement::fullscreen_enter(hot, target);
                }
            }
        }
    } else if t == a._NET_WM_STATE {
        if let Some(h) = wm.client_of(ev.window) {
            let phase1 = wm
                .clients
                .hot(h)
                .is_some_and(|hot| hot.phase == ManagePhase::Phase1);
            if phase1 {
                // queue; finish-manage replays these
                if let Some(cold) = wm.clients.cold_mut(h) {
                    cold.pending_state_msgs.push(*ev);
                }
            } else {
                handle_state_message(wm, h, ev);
            }
        }
    } else if t == a.WM_CHANGE_STATE {
        if let Some(h) = wm.client_of(ev.window) {
            match data[0] {
                manage::WM_STATE_ICONIC => iconify(wm, h),
                manage::WM_STATE_NORMAL => deiconify(wm, h),
                _ => {}
            }
        }
    } else if t == a._NET_REQUEST_FRAME_EXTENTS {
        // estimate for a window we have not framed yet
        let b = wm.config.border_width as u32;
        let top = b + wm.config.titlebar_height as u32;
        wm.x.conn.change_property32(
            PropMode::REPLACE,
            ev.window,
            a._NET_FRAME_EXTENTS,
            AtomEnum::CARDINAL,
            &[b, b, top, b],
        )?;
    } else if t == a._NET_WM_PING {
        // pong from a client we pinged; data[2] names the client window
        let target = data[2] as Window;
        if let Some(h) = wm.client_of(if target != 0 { target } else { ev.window }) {
            if let Some(cold) = wm.clients.cold_mut(h) {
                cold.last_pong = data[1];
            }
        }
    }
    Ok(())
}

/// The `_NET_WM_STATE` add/remove/toggle transform plus the semantic
/// side effects of each bit. Bumps the transaction so in-flight probes
/// from before this decision go stale.
pub fn handle_state_message<C: Connection>(wm: &mut Wm<C>, h: Handle, ev: &ClientMessageEvent) {
    let a = wm.x.atoms;
    let data = ev.data.as_data32();
    let action = data[0];
    let mut bits = WinState::empty();
    for atom in [data[1], data[2]] {
        if atom != 0 {
            if let Some(bit) = props::state_bit_from_atom(&a, atom) {
                bits |= bit;
            }
        }
    }
    // HIDDEN and FOCUSED are WM-owned
    bits -= WinState::HIDDEN | WinState::FOCUSED;
    if bits.is_empty() {
        return;
    }
    let Some(current) = wm.clients.hot(h).map(|hot| hot.state) else { return };
    let Some(target) = props::apply_state_action(current, action, bits) else {
        debug!(action, "unknown _NET_WM_STATE action");
        return;
    };
    wm.bump_txn(h);
    apply_state_diff(wm, h, current, target);
}

/// Reconcile current vs desired state bits, dispatching the bits with
/// geometry/stacking side effects to their handlers.
fn apply_state_diff<C: Connection>(
    wm: &mut Wm<C>,
    h: Handle,
    current: WinState,
    target: WinState,
) {
    let changed = current ^ target;
    if changed.is_empty() {
        return;
    }

    if changed.contains(WinState::FULLSCREEN) {
        if target.contains(WinState::FULLSCREEN) {
            let rect = fullscreen_target(wm, h);
            if let Some(hot) = wm.clients.hot_mut(h) {
                placement::fullscreen_enter(hot, rect);
            }
        } else if let Some(hot) = wm.clients.hot_mut(h) {
            placement::fullscreen_exit(hot);
        }
        sync_layer(wm, h);
    }

    let max_h = changed.contains(WinState::MAXIMIZED_H);
    let max_v = changed.contains(WinState::MAXIMIZED_V);
    if max_h || max_v {
        let workarea = wm
            .clients
            .hot(h)
            .map(|hot| wm.monitors.for_rect(&hot.server).workarea);
        if let (Some(hot), Some(wa)) = (wm.clients.hot_mut(h), workarea) {
            if !hot.state.contains(WinState::FULLSCREEN) {
                let add_h = max_h && target.contains(WinState::MAXIMIZED_H);
                let add_v = max_v && target.contains(WinState::MAXIMIZED_V);
                let del_h = max_h && !target.contains(WinState::MAXIMIZED_H);
                let del_v = max_v && !target.contains(WinState::MAXIMIZED_V);
                if add_h || add_v {
                    placement::maximize(hot, add_h, add_v, &wa);
                }
                if del_h || del_v {
                    placement::unmaximize(hot, del_h, del_v);
                }
            }
        }
    }

    if changed.intersects(WinState::ABOVE | WinState::BELOW) {
        if let Some(hot) = wm.clients.hot_mut(h) {
            hot.state.set(WinState::ABOVE, target.contains(WinState::ABOVE));
            hot.state.set(WinState::BELOW, target.contains(WinState::BELOW));
            if !hot.state.contains(WinState::FULLSCREEN) {
                hot.layer = if target.contains(WinState::ABOVE) {
                    Layer::Above
                } else if target.contains(WinState::BELOW) {
                    Layer::Below
                } else {
                    hot.win_type.default_layer()
                };
            }
            hot.dirty |= Dirty::STATE;
        }
        sync_layer(wm, h);
    }

    if changed.contains(WinState::STICKY) {
        if let Some(hot) = wm.clients.hot_mut(h) {
            hot.state.set(WinState::STICKY, target.contains(WinState::STICKY));
            hot.dirty |= Dirty::STATE | Dirty::VISIBILITY | Dirty::DESKTOP;
        }
        wm.root_dirty = true;
    }

    // plain bits without side effects
    for bit in [
        WinState::SKIP_TASKBAR,
        WinState::SKIP_PAGER,
        WinState::MODAL,
        WinState::SHADED,
        WinState::DEMANDS_ATTENTION,
    ] {
        if changed.contains(bit) {
            if let Some(hot) = wm.clients.hot_mut(h) {
                hot.state.set(bit, target.contains(bit));
                hot.dirty |= Dirty::STATE;
            }
        }
    }
}

/// Move the client's stacking entry to its policy layer.
fn sync_layer<C: Connection>(wm: &mut Wm<C>, h: Handle) {
    let Some(layer) = wm.clients.hot(h).map(|hot| hot.layer) else { return };
    wm.stacking.move_to_layer(&mut wm.clients, h, layer);
}

/// Fullscreen target: the exact monitor (or the `_NET_WM_FULLSCREEN_MONITORS`
/// span), or the monitor workarea when configured to respect struts.
pub fn fullscreen_target<C: Connection>(wm: &Wm<C>, h: Handle) -> Rect {
    let Some(hot) = wm.clients.hot(h) else {
        return wm.monitors.primary().rect;
    };
    if let Some([top, bottom, left, right]) = hot.fullscreen_monitors {
        let rect_of = |i: u32| wm.monitors.by_index(i as usize).map(|m| m.rect);
        if let (Some(t), Some(b), Some(l), Some(r)) =
            (rect_of(top), rect_of(bottom), rect_of(left), rect_of(right))
        {
            return t.union(&b).union(&l).union(&r);
        }
    }
    let monitor = wm.monitors.for_rect(&hot.server);
    if wm.config.fullscreen_fills_monitor {
        monitor.rect
    } else {
        monitor.workarea
    }
}

pub fn toggle_fullscreen<C: Connection>(wm: &mut Wm<C>, h: Handle) {
    wm.bump_txn(h);
    let fullscreen = wm
        .clients
        .hot(h)
        .is_some_and(|hot| hot.state.contains(WinState::FULLSCREEN));
    if fullscreen {
        if let Some(hot) = wm.clients.hot_mut(h) {
            placement::fullscreen_exit(hot);
        }
    } else {
        let target = fullscreen_target(wm, h);
        if let Some(hot) = wm.clients.hot_mut(h) {
            placement::fullscreen_enter(hot, target);
        }
    }
    sync_layer(wm, h);
}

pub fn activate<C: Connection>(wm: &mut Wm<C>, h: Handle) {
    let Some(hot) = wm.clients.hot(h) else { return };
    if !hot.is_managed() {
        return;
    }
    let (desktop, sticky) = (hot.desktop, hot.state.contains(WinState::STICKY));
    if !sticky && desktop != wm.current_desktop {
        switch_desktop(wm, desktop);
    }
    deiconify(wm, h);
    wm.focus.set_focus(Some(h));
    wm.stacking.raise(&mut wm.clients, h);
}

pub fn iconify<C: Connection>(wm: &mut Wm<C>, h: Handle) {
    let next = wm.focus.next_focus(&wm.clients, h, wm.current_desktop);
    if let Some(hot) = wm.clients.hot_mut(h) {
        if hot.lifecycle != Lifecycle::Mapped {
            return;
        }
        hot.lifecycle = Lifecycle::Unmapped;
        hot.state |= WinState::HIDDEN;
        hot.dirty |= Dirty::VISIBILITY | Dirty::STATE;
    }
    if wm.focus.focused == Some(h) {
        wm.focus.set_focus(next);
    }
    wm.root_dirty = true;
}

pub fn deiconify<C: Connection>(wm: &mut Wm<C>, h: Handle) {
    if let Some(hot) = wm.clients.hot_mut(h) {
        if hot.lifecycle != Lifecycle::Unmapped {
            return;
        }
        hot.lifecycle = Lifecycle::Mapped;
        hot.state -= WinState::HIDDEN;
        hot.dirty |= Dirty::VISIBILITY | Dirty::STATE;
    }
    wm.root_dirty = true;
}

pub fn switch_desktop<C: Connection>(wm: &mut Wm<C>, desktop: u32) {
    let desktop = desktop.min(wm.desktop_count - 1);
    if desktop == wm.current_desktop {
        return;
    }
    debug!(from = wm.current_desktop, to = desktop, "switching desktop");
    wm.current_desktop = desktop;
    let handles: Vec<_> = wm.clients.iter().collect();
    for h in handles {
        if let Some(hot) = wm.clients.hot_mut(h) {
            if hot.is_managed() {
                hot.dirty |= Dirty::VISIBILITY;
            }
        }
    }
    // focus something visible over there
    let next = wm
        .focus
        .focused
        .filter(|h| {
            wm.clients.hot(*h).is_some_and(|hot| {
                hot.state.contains(WinState::STICKY) || hot.desktop == desktop
            })
        })
        .or_else(|| {
            wm.focus.history().iter().copied().find(|h| {
                wm.clients.hot(*h).is_some_and(|hot| {
                    hot.is_managed()
                        && !hot.state.contains(WinState::HIDDEN)
                        && (hot.desktop == desktop || hot.state.contains(WinState::STICKY))
                })
            })
        });
    wm.focus.set_focus(next);
    wm.root_dirty = true;
}

pub fn move_to_desktop<C: Connection>(wm: &mut Wm<C>, h: Handle, desktop: u32) {
    let desktop = if desktop == 0xFFFF_FFFF { desktop } else { desktop.min(wm.desktop_count - 1) };
    wm.bump_txn(h);
    if let Some(hot) = wm.clients.hot_mut(h) {
        if desktop == 0xFFFF_FFFF {
            hot.state |= WinState::STICKY;
        } else {
            hot.desktop = desktop;
        }
        hot.dirty |= Dirty::DESKTOP | Dirty::VISIBILITY | Dirty::STATE;
    }
    wm.root_dirty = true;
}

pub fn show_desktop<C: Connection>(wm: &mut Wm<C>, showing: bool) {
    if wm.showing_desktop == showing {
        return;
    }
    wm.showing_desktop = showing;
    let handles: Vec<_> = wm.clients.iter().collect();
    for h in handles {
        if let Some(hot) = wm.clients.hot_mut(h) {
            if hot.is_managed() && hot.win_type != crate::model::WindowType::Desktop {
                hot.dirty |= Dirty::VISIBILITY;
            }
        }
    }
    if showing {
        wm.focus.set_focus(None);
    }
    wm.root_dirty = true;
}

fn set_desktop_count<C: Connection>(wm: &mut Wm<C>, count: u32) -> Result<(), XError> {
    let count = count.clamp(1, 64);
    if count == wm.desktop_count {
        return Ok(());
    }
    wm.desktop_count = count;
    wm.desktop_names.truncate(count as usize);
    while (wm.desktop_names.len() as u32) < count {
        wm.desktop_names.push((wm.desktop_names.len() + 1).to_string());
    }
    if wm.current_desktop >= count {
        switch_desktop(wm, count - 1);
    }
    // pull clients on removed desktops back into range
    let handles: Vec<_> = wm.clients.iter().collect();
    for h in handles {
        if let Some(hot) = wm.clients.hot_mut(h) {
            if hot.desktop >= count {
                hot.desktop = count - 1;
                hot.dirty |= Dirty::DESKTOP | Dirty::VISIBILITY;
            }
        }
    }
    wm.publish_desktop_statics()
}

fn moveresize<C: Connection>(wm: &mut Wm<C>, h: Handle, data: &[u32; 5]) -> Result<(), XError> {
    let (x_root, y_root, dir) = (data[0] as i32, data[1] as i32, data[2]);
    match dir {
        MOVERESIZE_CANCEL => {
            interactive::cancel(wm);
            Ok(())
        }
        MOVERESIZE_MOVE | MOVERESIZE_MOVE_KEYBOARD => {
            interactive::start(wm, h, DragMode::Move, (x_root, y_root))
        }
        MOVERESIZE_SIZE_KEYBOARD => {
            let rect = wm.clients.hot(h).map(|hot| hot.desired).unwrap_or_default();
            interactive::start(
                wm,
                h,
                DragMode::Resize(interactive::dir_for_position(&rect, x_root, y_root)),
                (x_root, y_root),
            )
        }
        d => match ResizeDir::from_moveresize(d) {
            Some(dir) => interactive::start(wm, h, DragMode::Resize(dir), (x_root, y_root)),
            None => Ok(()),
        },
    }
}

/// `_NET_MOVERESIZE_WINDOW`: gravity in the low byte (value 10, static,
/// means the coordinates name the frame corner), presence flags in bits
/// 8..=11 for x/y/w/h.
fn moveresize_window<C: Connection>(wm: &mut Wm<C>, h: Handle, data: &[u32; 5]) {
    let gravity = data[0] & 0xff;
    let frame_coords = gravity == 10;
    let has = |bit: u32| data[0] & (1 << bit) != 0;
    wm.bump_txn(h);
    let insets = wm
        .clients
        .hot(h)
        .map(|hot| FrameInsets::for_client(&wm.config, hot))
        .unwrap_or_default();
    let Some(hot) = wm.clients.hot_mut(h) else { return };
    let (off_x, off_y) = if frame_coords { insets.client_offset() } else { (0, 0) };
    if has(8) {
        hot.desired.x = data[1] as i32 + off_x;
    }
    if has(9) {
        hot.desired.y = data[2] as i32 + off_y;
    }
    if has(10) {
        hot.desired.w = (data[3]).max(1);
    }
    if has(11) {
        hot.desired.h = (data[4]).max(1);
    }
    hot.dirty |= Dirty::GEOM;
}

fn restack<C: Connection>(wm: &mut Wm<C>, h: Handle, sibling_xid: u32, detail: u32) {
    const ABOVE: u32 = 0;
    const BELOW: u32 = 1;
    const TOP_IF: u32 = 2;
    const BOTTOM_IF: u32 = 3;
    const OPPOSITE: u32 = 4;
    match (wm.client_of(sibling_xid), detail) {
        (Some(sibling), ABOVE) => {
            wm.stacking.place_relative(&mut wm.clients, h, sibling, true);
        }
        (Some(sibling), BELOW) => {
            wm.stacking.place_relative(&mut wm.clients, h, sibling, false);
        }
        (_, ABOVE | TOP_IF | OPPOSITE) => wm.stacking.raise(&mut wm.clients, h),
        (_, BELOW | BOTTOM_IF) => wm.stacking.lower(&mut wm.clients, h),
        _ => {}
    }
}
