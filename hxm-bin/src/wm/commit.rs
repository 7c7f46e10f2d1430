// SPDX-License-Identifier: GPL-3.0-only

//! The commit phase: walk dirty clients in a fixed per-client order
//! (visibility, geometry, properties, frame, stacking, state), then the
//! focus commit, then the root properties. All emissions are idempotent:
//! nothing is sent when the model already matches the server.

use std::time::Instant;

use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    AtomEnum, ClientMessageEvent, ConfigureNotifyEvent, ConfigureWindowAux, ConnectionExt as _,
    EventMask, InputFocus, PropMode, StackMode, Window, CONFIGURE_NOTIFY_EVENT,
};
use x11rb::wrapper::ConnectionExt as _;

use crate::model::{
    ClientFlags, Dirty, Handle, Lifecycle, Protocols, StrutPartial, WinState, WindowType, OPAQUE,
};
use crate::wm::decor::FrameInsets;
use crate::wm::stacking::Anchor;
use crate::wm::{manage, Wm};
use crate::x11::{props, XError};

pub fn flush_dirty<C: Connection>(wm: &mut Wm<C>, now: Instant) -> Result<(), XError> {
    wm.in_commit_phase = true;
    let result = flush_inner(wm, now);
    wm.in_commit_phase = false;
    result
}

fn flush_inner<C: Connection>(wm: &mut Wm<C>, now: Instant) -> Result<(), XError> {
    debug_assert!(wm.in_commit_phase);

    // settled PHASE1 clients become READY here and get framed
    for h in wm.promote_ready() {
        manage::finish_manage(wm, h)?;
    }

    // workareas follow the current strut set
    let strut_dirty = wm
        .clients
        .iter()
        .any(|h| wm.clients.hot(h).is_some_and(|hot| hot.dirty.contains(Dirty::STRUT)));
    if strut_dirty || wm.root_dirty {
        let struts = collect_struts(wm);
        wm.monitors.apply_struts(struts.iter());
    }

    let dirty_handles: Vec<Handle> = wm
        .clients
        .iter()
        .filter(|h| wm.clients.hot(*h).is_some_and(|hot| !hot.dirty.is_empty()))
        .collect();
    for h in dirty_handles {
        flush_client(wm, h, now)?;
    }

    commit_focus(wm)?;

    // the focus commit repaints the winner and loser in the same tick
    let focus_refresh: Vec<Handle> = wm
        .clients
        .iter()
        .filter(|h| {
            wm.clients
                .hot(*h)
                .is_some_and(|hot| hot.dirty.intersects(Dirty::FRAME | Dirty::STATE))
        })
        .collect();
    for h in focus_refresh {
        redraw_frame(wm, h)?;
        write_client_state(wm, h)?;
        if let Some(hot) = wm.clients.hot_mut(h) {
            hot.dirty -= Dirty::FRAME | Dirty::STATE | Dirty::TITLE;
        }
    }

    if wm.root_dirty {
        wm.root_dirty = false;
        publish_root(wm)?;
    }
    Ok(())
}

fn flush_client<C: Connection>(wm: &mut Wm<C>, h: Handle, now: Instant) -> Result<(), XError> {
    let Some(hot) = wm.clients.hot(h) else { return Ok(()) };
    let mut dirty = hot.dirty;
    let xid = hot.xid;
    let frame = hot.frame;

    if dirty.contains(Dirty::VISIBILITY) {
        flush_visibility(wm, h)?;
    }

    if dirty.contains(Dirty::GEOM) {
        let is_interactive = wm.interactive.map(|d| d.handle) == Some(h);
        if is_interactive && !wm.interactive_gate.try_pass(now) {
            // paced: keep the bit, schedule a timer wakeup
            wm.wakeup_at = Some(now + wm.interactive_gate.remaining(now));
        } else {
            flush_geometry(wm, h)?;
            if let Some(hot) = wm.clients.hot_mut(h) {
                hot.dirty -= Dirty::GEOM;
                // a fresh configure always wants a repaint
                dirty |= hot.dirty & Dirty::FRAME;
            }
        }
    }

    if dirty.contains(Dirty::OPACITY) && frame != 0 {
        let opacity = wm.clients.hot(h).map(|hot| hot.opacity).unwrap_or(OPAQUE);
        if opacity == OPAQUE {
            wm.x.conn.delete_property(frame, wm.x.atoms._NET_WM_WINDOW_OPACITY)?;
        } else {
            wm.x.conn.change_property32(
                PropMode::REPLACE,
                frame,
                wm.x.atoms._NET_WM_WINDOW_OPACITY,
                AtomEnum::CARDINAL,
                &[opacity],
            )?;
        }
    }

    if dirty.contains(Dirty::DESKTOP) {
        let (desktop, sticky) = wm
            .clients
            .hot(h)
            .map(|hot| (hot.desktop, hot.state.contains(WinState::STICKY)))
            .unwrap_or((0, false));
        wm.x.conn.change_property32(
            PropMode::REPLACE,
            xid,
            wm.x.atoms._NET_WM_DESKTOP,
            AtomEnum::CARDINAL,
            &[if sticky { 0xFFFF_FFFF } else { desktop }],
        )?;
    }

    if dirty.intersects(Dirty::FRAME | Dirty::TITLE) {
        redraw_frame(wm, h)?;
    }

    if dirty.contains(Dirty::STACK) {
        stack_sync_to_x(wm, h)?;
        wm.counters.restacks += 1;
    }

    if dirty.contains(Dirty::STATE) {
        write_client_state(wm, h)?;
        manage::write_allowed_actions(wm, xid)?;
    }

    if let Some(hot) = wm.clients.hot_mut(h) {
        // GEOM may have been kept above; everything else is flushed
        hot.dirty &= Dirty::GEOM;
    }
    Ok(())
}

/// Map/unmap for desktop switches, iconify, and show-desktop. Every
/// WM-issued unmap of the client window bumps `ignore_unmap` by exactly
/// one so the UnmapNotify echo is not mistaken for a withdraw.
fn flush_visibility<C: Connection>(wm: &mut Wm<C>, h: Handle) -> Result<(), XError> {
    let Some(hot) = wm.clients.hot(h) else { return Ok(()) };
    if !hot.is_managed() || hot.frame == 0 {
        return Ok(());
    }
    let want = hot.lifecycle == Lifecycle::Mapped
        && (hot.desktop == wm.current_desktop || hot.state.contains(WinState::STICKY))
        && !(wm.showing_desktop && hot.win_type != WindowType::Desktop);
    let (xid, frame, mapped) = (hot.xid, hot.frame, hot.x_mapped);
    if want && !mapped {
        wm.x.conn.map_window(xid)?;
        wm.x.conn.map_window(frame)?;
        manage::set_wm_state(wm, xid, manage::WM_STATE_NORMAL)?;
        if let Some(hot) = wm.clients.hot_mut(h) {
            hot.x_mapped = true;
            hot.state -= WinState::HIDDEN;
        }
    } else if !want && mapped {
        if let Some(hot) = wm.clients.hot_mut(h) {
            hot.ignore_unmap += 1;
            hot.x_mapped = false;
            // HIDDEN is for iconified windows; merely being on another
            // desktop does not count
            if hot.lifecycle == Lifecycle::Unmapped {
                hot.state |= WinState::HIDDEN;
            }
        }
        wm.x.conn.unmap_window(frame)?;
        wm.x.conn.unmap_window(xid)?;
        manage::set_wm_state(wm, xid, manage::WM_STATE_ICONIC)?;
    }
    Ok(())
}

/// The frame-plus-client configure pair, hint constraint, sync-request
/// dispatch, synthetic ConfigureNotify, and optimistic server update.
fn flush_geometry<C: Connection>(wm: &mut Wm<C>, h: Handle) -> Result<(), XError> {
    let Some(hot) = wm.clients.hot(h) else { return Ok(()) };
    let insets = FrameInsets::for_client(&wm.config, hot);
    let fullscreen = hot.state.contains(WinState::FULLSCREEN);
    let mut desired = hot.desired;
    if !fullscreen {
        let (w, hgt) = props::constrain_to_hints(&hot.hints, desired.w, desired.h);
        desired.w = w;
        desired.h = hgt;
    }
    let (xid, frame, server) = (hot.xid, hot.frame, hot.server);
    let resizing = desired.w != server.w || desired.h != server.h;
    let sync_wanted = hot.flags.contains(ClientFlags::SYNC_ENABLED) && resizing;

    if desired != server {
        if sync_wanted {
            send_sync_request(wm, h)?;
        }
        let frame_rect = insets.frame_rect(&desired);
        let offset = insets.client_offset();
        if frame != 0 {
            wm.x.conn.configure_window(
                frame,
                &ConfigureWindowAux::new()
                    .x(frame_rect.x)
                    .y(frame_rect.y)
                    .width(frame_rect.w.max(1))
                    .height(frame_rect.h.max(1)),
            )?;
            wm.x.conn.configure_window(
                xid,
                &ConfigureWindowAux::new()
                    .x(offset.0)
                    .y(offset.1)
                    .width(desired.w.max(1))
                    .height(desired.h.max(1)),
            )?;
        } else {
            wm.x.conn.configure_window(
                xid,
                &ConfigureWindowAux::new()
                    .x(desired.x)
                    .y(desired.y)
                    .width(desired.w.max(1))
                    .height(desired.h.max(1)),
            )?;
        }
        wm.counters.configures_emitted += 1;
        if let Some(hot) = wm.clients.hot_mut(h) {
            hot.desired = desired;
            hot.pending = desired;
            hot.server = desired;
            hot.dirty |= Dirty::FRAME;
        }
    } else {
        wm.counters.configures_suppressed += 1;
    }

    send_synthetic_configure(wm, h)?;
    Ok(())
}

/// ICCCM synthetic ConfigureNotify telling the client its root-relative
/// geometry; duplicates are suppressed against the last one sent.
pub fn send_synthetic_configure<C: Connection>(wm: &mut Wm<C>, h: Handle) -> Result<(), XError> {
    let Some(hot) = wm.clients.hot(h) else { return Ok(()) };
    if hot.desired == hot.last_synthetic {
        return Ok(());
    }
    let (xid, rect) = (hot.xid, hot.desired);
    let event = ConfigureNotifyEvent {
        response_type: CONFIGURE_NOTIFY_EVENT,
        sequence: 0,
        event: xid,
        window: xid,
        above_sibling: x11rb::NONE,
        x: rect.x as i16,
        y: rect.y as i16,
        width: rect.w as u16,
        height: rect.h as u16,
        border_width: 0,
        override_redirect: false,
    };
    wm.x.conn.send_event(false, xid, EventMask::STRUCTURE_NOTIFY, event)?;
    if let Some(hot) = wm.clients.hot_mut(h) {
        hot.last_synthetic = rect;
    }
    Ok(())
}

/// `_NET_WM_SYNC_REQUEST` with the next serial, sent before a resize so
/// the client can tell us when it has drawn.
fn send_sync_request<C: Connection>(wm: &mut Wm<C>, h: Handle) -> Result<(), XError> {
    let Some(hot) = wm.clients.hot_mut(h) else { return Ok(()) };
    hot.sync_value = hot.sync_value.wrapping_add(1);
    let value = hot.sync_value;
    let xid = hot.xid;
    let a = wm.x.atoms;
    let event = ClientMessageEvent::new(
        32,
        xid,
        a.WM_PROTOCOLS,
        [
            a._NET_WM_SYNC_REQUEST,
            x11rb::CURRENT_TIME,
            (value & 0xFFFF_FFFF) as u32,
            ((value >> 32) & 0xFFFF_FFFF) as u32,
            0,
        ],
    );
    wm.x.conn.send_event(false, xid, EventMask::NO_EVENT, event)?;
    Ok(())
}

fn redraw_frame<C: Connection>(wm: &mut Wm<C>, h: Handle) -> Result<(), XError> {
    let Some(hot) = wm.clients.hot(h) else { return Ok(()) };
    if hot.frame == 0 {
        return Ok(());
    }
    let insets = FrameInsets::for_client(&wm.config, hot);
    let focused = wm.focus.focused == Some(h);
    let region = (!hot.damage.is_empty()).then_some(hot.damage);
    wm.decor.frame_redraw(&wm.x, &wm.config.theme, hot, insets, focused, region)?;
    if let Some(hot) = wm.clients.hot_mut(h) {
        hot.damage = Default::default();
    }
    Ok(())
}

/// Emit the deferred restack for one client: anchor below the in-model
/// neighbor (SIBLING+ABOVE), else below-anchor, else raw raise.
fn stack_sync_to_x<C: Connection>(wm: &mut Wm<C>, h: Handle) -> Result<(), XError> {
    debug_assert!(wm.in_commit_phase);
    let Some(anchor) = wm.stacking.anchor(&wm.clients, h) else { return Ok(()) };
    let window_of = |wm: &Wm<C>, x: Handle| {
        wm.clients.hot(x).map(|hot| if hot.frame != 0 { hot.frame } else { hot.xid })
    };
    let Some(target) = window_of(wm, h) else { return Ok(()) };
    let aux = match anchor {
        Anchor::AboveSibling(sibling) => {
            let Some(sib) = window_of(wm, sibling) else { return Ok(()) };
            ConfigureWindowAux::new().sibling(sib).stack_mode(StackMode::ABOVE)
        }
        Anchor::BelowSibling(sibling) => {
            let Some(sib) = window_of(wm, sibling) else { return Ok(()) };
            ConfigureWindowAux::new().sibling(sib).stack_mode(StackMode::BELOW)
        }
        Anchor::TopRaw => ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
    };
    wm.x.conn.configure_window(target, &aux)?;
    Ok(())
}

/// Rewrite `_NET_WM_STATE` from the model bits.
fn write_client_state<C: Connection>(wm: &mut Wm<C>, h: Handle) -> Result<(), XError> {
    let Some(hot) = wm.clients.hot(h) else { return Ok(()) };
    let mut state = hot.state;
    state.set(WinState::FOCUSED, wm.focus.focused == Some(h));
    let atoms = props::state_to_atoms(&wm.x.atoms, state);
    wm.x.conn.change_property32(
        PropMode::REPLACE,
        hot.xid,
        wm.x.atoms._NET_WM_STATE,
        AtomEnum::ATOM,
        &atoms,
    )?;
    Ok(())
}

/// Install focus on the server when the desired target changed: colormap,
/// input focus, and the ICCCM take-focus handshake.
fn commit_focus<C: Connection>(wm: &mut Wm<C>) -> Result<(), XError> {
    let desired_xid = wm.focus.focused.and_then(|h| wm.clients.hot(h)).map(|hot| hot.xid);
    if !wm.focus.dirty && desired_xid == wm.focus.committed {
        return Ok(());
    }
    let previous = wm.focus.committed;
    match wm.focus.focused {
        Some(h) => {
            let Some(hot) = wm.clients.hot(h) else {
                wm.focus.focused = None;
                return Ok(());
            };
            let xid = hot.xid;
            let user_time = hot.user_time;
            let (can_focus, colormap, take_focus) = wm
                .clients
                .cold(h)
                .map(|cold| {
                    (cold.can_focus, cold.colormap, cold.protocols.contains(Protocols::TAKE_FOCUS))
                })
                .unwrap_or((true, 0, false));
            if colormap != 0 {
                wm.x.conn.install_colormap(colormap)?;
            }
            if can_focus {
                wm.x.conn.set_input_focus(InputFocus::POINTER_ROOT, xid, x11rb::CURRENT_TIME)?;
            }
            if take_focus {
                let a = wm.x.atoms;
                let event = ClientMessageEvent::new(
                    32,
                    xid,
                    a.WM_PROTOCOLS,
                    [a.WM_TAKE_FOCUS, user_time, 0, 0, 0],
                );
                wm.x.conn.send_event(false, xid, EventMask::NO_EVENT, event)?;
            }
            wm.focus.committed = Some(xid);
            if let Some(hot) = wm.clients.hot_mut(h) {
                hot.state |= WinState::FOCUSED;
                hot.dirty |= Dirty::FRAME | Dirty::STATE;
            }
        }
        None => {
            wm.x.conn.install_colormap(wm.x.default_colormap)?;
            wm.x.conn.set_input_focus(
                InputFocus::POINTER_ROOT,
                x11rb::NONE,
                x11rb::CURRENT_TIME,
            )?;
            wm.focus.committed = None;
        }
    }
    // the window losing focus needs its FOCUSED bit and frame refreshed
    if previous != wm.focus.committed {
        if let Some(prev_xid) = previous {
            if let Some(h) = wm.client_of(prev_xid) {
                if let Some(hot) = wm.clients.hot_mut(h) {
                    hot.state -= WinState::FOCUSED;
                    hot.dirty |= Dirty::FRAME | Dirty::STATE;
                }
            }
        }
    }
    wm.focus.dirty = false;
    wm.counters.focus_commits += 1;
    wm.root_dirty = true;
    debug!(focus = ?wm.focus.committed, "focus committed");
    Ok(())
}

/// Root property publication: active window, client lists, workarea,
/// desktop state.
fn publish_root<C: Connection>(wm: &mut Wm<C>) -> Result<(), XError> {
    let a = wm.x.atoms;
    let conn = &wm.x.conn;
    let root = wm.x.root;

    let active = wm
        .focus
        .focused
        .and_then(|h| wm.clients.hot(h))
        .map(|hot| hot.xid)
        .unwrap_or(x11rb::NONE);
    conn.change_property32(PropMode::REPLACE, root, a._NET_ACTIVE_WINDOW, AtomEnum::WINDOW, &[
        active,
    ])?;

    let client_list: Vec<Window> = wm
        .mapping_order
        .iter()
        .filter_map(|h| wm.clients.hot(*h))
        .filter(|hot| hot.is_managed())
        .map(|hot| hot.xid)
        .collect();
    conn.change_property32(
        PropMode::REPLACE,
        root,
        a._NET_CLIENT_LIST,
        AtomEnum::WINDOW,
        &client_list,
    )?;

    let stacking_list: Vec<Window> = wm
        .stacking
        .bottom_up()
        .filter_map(|h| wm.clients.hot(h))
        .filter(|hot| hot.is_managed())
        .map(|hot| hot.xid)
        .collect();
    conn.change_property32(
        PropMode::REPLACE,
        root,
        a._NET_CLIENT_LIST_STACKING,
        AtomEnum::WINDOW,
        &stacking_list,
    )?;

    let workarea = wm.monitors.combined_workarea();
    let per_desktop: Vec<u32> = (0..wm.desktop_count)
        .flat_map(|_| {
            [workarea.x as u32, workarea.y as u32, workarea.w, workarea.h]
        })
        .collect();
    conn.change_property32(
        PropMode::REPLACE,
        root,
        a._NET_WORKAREA,
        AtomEnum::CARDINAL,
        &per_desktop,
    )?;

    conn.change_property32(
        PropMode::REPLACE,
        root,
        a._NET_CURRENT_DESKTOP,
        AtomEnum::CARDINAL,
        &[wm.current_desktop],
    )?;
    conn.change_property32(
        PropMode::REPLACE,
        root,
        a._NET_SHOWING_DESKTOP,
        AtomEnum::CARDINAL,
        &[wm.showing_desktop as u32],
    )?;
    Ok(())
}

/// Active struts across all managed clients.
pub fn collect_struts<C: Connection>(wm: &Wm<C>) -> Vec<StrutPartial> {
    wm.clients
        .iter()
        .filter(|h| wm.clients.hot(*h).is_some_and(|hot| hot.is_managed()))
        .filter_map(|h| wm.clients.cold(h).and_then(|cold| cold.strut))
        .collect()
}
