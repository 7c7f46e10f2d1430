// SPDX-License-Identifier: GPL-3.0-only

//! Client lifecycle: the probe fan-out that starts management, the
//! finish-manage step that frames and maps, the abort path for windows
//! that turn out unmanageable, and the teardown.

use tracing::{debug, warn};
use x11rb::connection::Connection;
use x11rb::protocol::damage::ConnectionExt as _;
use x11rb::protocol::xproto::{
    AtomEnum, ButtonIndex, ChangeWindowAttributesAux, ClientMessageEvent, ConfigureWindowAux,
    ConnectionExt as _, CreateWindowAux, EventMask, GrabMode, ModMask, PropMode, SetMode, Window,
    WindowClass,
};
use x11rb::wrapper::ConnectionExt as _;

use crate::model::{
    transient, ClientFlags, Dirty, Handle, Layer, Lifecycle, ManagePhase, Protocols, WinState,
    WindowType,
};
use crate::wm::decor::FrameInsets;
use crate::wm::{commit, interactive, placement, Wm};
use crate::x11::cookies::CookieKind;
use crate::x11::props;
use crate::x11::XError;

/// ICCCM WM_STATE values.
pub const WM_STATE_WITHDRAWN: u32 = 0;
pub const WM_STATE_NORMAL: u32 = 1;
pub const WM_STATE_ICONIC: u32 = 3;

/// The PHASE1 probe fan-out, issued in one burst per new client.
const PROBE_FAN_OUT: [CookieKind; 28] = [
    CookieKind::Attributes,
    CookieKind::Geometry,
    CookieKind::WmClass,
    CookieKind::WmName,
    CookieKind::NetWmName,
    CookieKind::WmIconName,
    CookieKind::NetWmIconName,
    CookieKind::WmHints,
    CookieKind::NormalHints,
    CookieKind::TransientFor,
    CookieKind::ColormapWindows,
    CookieKind::WmProtocols,
    CookieKind::ClientMachine,
    CookieKind::Command,
    CookieKind::NetWmState,
    CookieKind::WindowType,
    CookieKind::StrutPartial,
    CookieKind::Desktop,
    CookieKind::Pid,
    CookieKind::Icon,
    CookieKind::IconGeometry,
    CookieKind::UserTime,
    CookieKind::UserTimeWindow,
    CookieKind::SyncRequestCounter,
    CookieKind::Opacity,
    CookieKind::FullscreenMonitors,
    CookieKind::MotifHints,
    CookieKind::GtkFrameExtents,
];

/// Allocate a slot and fire the probe fan-out. The window is not touched
/// beyond an early PropertyChange subscription that closes the race with
/// properties changing mid-probe.
pub fn manage_start<C: Connection>(
    wm: &mut Wm<C>,
    window: Window,
    adopted: bool,
) -> Result<(), XError> {
    if wm.client_of(window).is_some() {
        return Ok(());
    }
    let h = wm.clients.alloc(window);
    wm.window_to_client.insert(window, h);
    if adopted {
        if let Some(hot) = wm.clients.hot_mut(h) {
            hot.flags |= ClientFlags::ADOPTED;
        }
    }

    wm.x.conn.change_window_attributes(
        window,
        &ChangeWindowAttributesAux::new()
            .event_mask(EventMask::PROPERTY_CHANGE | EventMask::FOCUS_CHANGE),
    )?;

    let txn = wm.next_txn();
    for kind in PROBE_FAN_OUT {
        wm.issue_probe(window, kind, Some(h), txn)?;
    }
    debug!(window, adopted, "manage started");
    Ok(())
}

/// Initial stacking layer for a freshly probed client.
pub fn initial_layer(win_type: WindowType, state: WinState) -> Layer {
    if state.contains(WinState::FULLSCREEN) {
        Layer::Fullscreen
    } else if state.contains(WinState::ABOVE) {
        Layer::Above
    } else if state.contains(WinState::BELOW) {
        Layer::Below
    } else {
        win_type.default_layer()
    }
}

/// Types whose initial geometry is their own business.
fn keeps_own_geometry(win_type: WindowType) -> bool {
    matches!(
        win_type,
        WindowType::Dock | WindowType::Desktop | WindowType::Splash | WindowType::Notification
    )
}

fn focusable_type(win_type: WindowType) -> bool {
    matches!(win_type, WindowType::Normal | WindowType::Dialog | WindowType::Utility)
}

/// PHASE1 is complete: frame, place, map, and announce the client.
pub fn finish_manage<C: Connection>(wm: &mut Wm<C>, h: Handle) -> Result<(), XError> {
    if wm.clients.hot(h).is_none_or(|hot| hot.flags.contains(ClientFlags::MANAGE_ABORTED)) {
        return abort_manage(wm, h);
    }

    // place: transients center over their parent, user positions hold,
    // the rest follow policy; docks and friends keep what they asked for
    let Some(hot) = wm.clients.hot(h) else { return Ok(()) };
    let xid = hot.xid;
    let win_type = hot.win_type;
    let state = hot.state;
    let hints = hot.hints;
    let current = hot.desired;
    let was_mapped = hot.flags.contains(ClientFlags::WAS_MAPPED);
    let start_iconic = hot.flags.contains(ClientFlags::START_ICONIC);
    let user_pos = (hot.hints.user_position || hot.flags.contains(ClientFlags::ADOPTED))
        .then_some((current.x, current.y));
    let insets = FrameInsets::for_client(&wm.config, hot);
    let parent_rect = hot.transient_for.and_then(|p| wm.clients.hot(p)).map(|p| p.desired);

    let pointer = wm.last_pointer;
    let workarea = wm.monitors.at(pointer.0, pointer.1).workarea;
    let placed = if keeps_own_geometry(win_type) {
        current
    } else {
        let constrained = props::constrain_to_hints(&hints, current.w, current.h);
        placement::initial_rect(
            constrained,
            parent_rect,
            user_pos,
            wm.config.placement,
            &workarea,
            pointer,
        )
    };
    let frame_rect = insets.frame_rect(&placed);
    let offset = insets.client_offset();

    // frame creation and reparent
    let frame = wm.x.conn.generate_id()?;
    wm.x.conn.create_window(
        wm.x.root_depth,
        frame,
        wm.x.root,
        frame_rect.x as i16,
        frame_rect.y as i16,
        frame_rect.w.max(1) as u16,
        frame_rect.h.max(1) as u16,
        0,
        WindowClass::INPUT_OUTPUT,
        x11rb::COPY_FROM_PARENT,
        &CreateWindowAux::new()
            .background_pixel(wm.config.theme.inactive_border)
            .event_mask(
                EventMask::SUBSTRUCTURE_REDIRECT
                    | EventMask::SUBSTRUCTURE_NOTIFY
                    | EventMask::BUTTON_PRESS
                    | EventMask::BUTTON_RELEASE
                    | EventMask::POINTER_MOTION
                    | EventMask::ENTER_WINDOW
                    | EventMask::LEAVE_WINDOW
                    | EventMask::EXPOSURE,
            ),
    )?;
    wm.x.conn.change_save_set(SetMode::INSERT, xid)?;
    if was_mapped {
        // reparenting a mapped window makes the server emit an UnmapNotify
        // we must swallow
        if let Some(hot) = wm.clients.hot_mut(h) {
            hot.ignore_unmap += 1;
        }
    }
    wm.x.conn
        .configure_window(xid, &ConfigureWindowAux::new().border_width(0))?;
    wm.x.conn.reparent_window(xid, frame, offset.0 as i16, offset.1 as i16)?;
    wm.x.conn.configure_window(
        xid,
        &ConfigureWindowAux::new()
            .x(offset.0)
            .y(offset.1)
            .width(placed.w)
            .height(placed.h),
    )?;

    // damage subscription
    let mut damage_handle = 0;
    if wm.x.have_damage {
        damage_handle = wm.x.conn.generate_id()?;
        wm.x.conn.damage_create(
            damage_handle,
            xid,
            x11rb::protocol::damage::ReportLevel::NON_EMPTY,
        )?;
    }

    // click-to-focus: sync grab on button 1, replayed after we raise
    wm.x.conn.grab_button(
        false,
        xid,
        EventMask::BUTTON_PRESS,
        GrabMode::SYNC,
        GrabMode::ASYNC,
        x11rb::NONE,
        x11rb::NONE,
        ButtonIndex::M1,
        ModMask::ANY,
    )?;
    // drag-modifier move/resize
    let drag_mod = ModMask::from(wm.config.drag_modifier.mask());
    for button in [ButtonIndex::M1, ButtonIndex::M3] {
        wm.x.conn.grab_button(
            false,
            xid,
            EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE | EventMask::POINTER_MOTION,
            GrabMode::ASYNC,
            GrabMode::ASYNC,
            x11rb::NONE,
            x11rb::NONE,
            button,
            drag_mod,
        )?;
    }

    // model updates
    let current_desktop = wm.current_desktop;
    let showing_desktop = wm.showing_desktop;
    let Some(hot) = wm.clients.hot_mut(h) else { return Ok(()) };
    hot.frame = frame;
    hot.desired = placed;
    hot.server = placed;
    hot.pending = placed;
    hot.damage_handle = damage_handle;
    hot.layer = initial_layer(hot.win_type, hot.state);
    hot.phase = ManagePhase::Done;
    let visible = (hot.desktop == current_desktop || hot.state.contains(WinState::STICKY))
        && !start_iconic
        && !showing_desktop;
    hot.lifecycle = if visible { Lifecycle::Mapped } else { Lifecycle::Unmapped };
    hot.x_mapped = visible;
    hot.dirty |= Dirty::STATE | Dirty::FRAME | Dirty::DESKTOP;
    wm.frame_to_client.insert(frame, h);
    wm.mapping_order.push(h);

    // announce to the client and to panels
    let a = wm.x.atoms;
    wm.x.conn.change_property32(
        PropMode::REPLACE,
        xid,
        a._NET_FRAME_EXTENTS,
        AtomEnum::CARDINAL,
        &[insets.left, insets.right, insets.top, insets.bottom],
    )?;
    write_allowed_actions(wm, xid)?;
    set_wm_state(wm, xid, if visible { WM_STATE_NORMAL } else { WM_STATE_ICONIC })?;
    commit::send_synthetic_configure(wm, h)?;

    // stacking: above the transient parent when there is one
    let parent = wm.clients.hot(h).and_then(|hot| hot.transient_for);
    let layer = wm.clients.hot(h).map(|hot| hot.layer).unwrap_or(Layer::Normal);
    match parent {
        Some(p) if wm.stacking.contains(&wm.clients, p) => {
            wm.stacking.insert_above(&mut wm.clients, h, p, layer);
        }
        _ => wm.stacking.insert_top(&mut wm.clients, h, layer),
    }

    if visible {
        wm.x.conn.map_window(xid)?;
        wm.x.conn.map_window(frame)?;
    }

    wm.focus.insert(h);
    let should_focus = visible
        && focusable_type(win_type)
        && !state.contains(WinState::BELOW)
        && wm.config.focus_new_windows
        && wm.interactive.is_none();
    if should_focus {
        wm.focus.set_focus(Some(h));
        wm.stacking.raise(&mut wm.clients, h);
    }

    wm.counters.manages += 1;
    wm.root_dirty = true;
    debug!(window = xid, frame, "manage finished");

    // replay `_NET_WM_STATE` messages that raced the probes
    let queued = wm
        .clients
        .cold_mut(h)
        .map(|cold| std::mem::take(&mut cold.pending_state_msgs))
        .unwrap_or_default();
    for msg in queued {
        crate::wm::handlers::message::handle_state_message(wm, h, &msg);
    }
    Ok(())
}

/// The attribute probe disqualified the window: let it map unmanaged and
/// forget it ever existed.
pub fn abort_manage<C: Connection>(wm: &mut Wm<C>, h: Handle) -> Result<(), XError> {
    let Some(hot) = wm.clients.hot(h) else { return Ok(()) };
    let xid = hot.xid;
    debug!(window = xid, "manage aborted");
    wm.x.conn.map_window(xid)?;
    wm.window_to_client.remove(&xid);
    wm.clients.free(h);
    wm.counters.manage_aborts += 1;
    Ok(())
}

/// Full teardown of a managed client. With `reparent` the window survives
/// (back at root, original border); without it the window is already gone.
pub fn unmanage<C: Connection>(wm: &mut Wm<C>, h: Handle, reparent: bool) -> Result<(), XError> {
    let Some(hot) = wm.clients.hot(h) else { return Ok(()) };
    let (xid, frame, server, border_width, damage_handle, destroyed, was_focused) = (
        hot.xid,
        hot.frame,
        hot.server,
        hot.border_width,
        hot.damage_handle,
        hot.lifecycle == Lifecycle::Destroyed,
        wm.focus.focused == Some(h),
    );

    interactive::cancel_for(wm, h);
    if let Some(hot) = wm.clients.hot_mut(h) {
        hot.lifecycle = Lifecycle::Unmanaging;
    }

    let next = was_focused.then(|| wm.focus.next_focus(&wm.clients, h, wm.current_desktop)).flatten();
    wm.focus.remove(h);
    if was_focused {
        wm.focus.set_focus(next);
    }

    wm.stacking.remove(&mut wm.clients, h);
    transient::unlink(&mut wm.clients, h);
    transient::orphan_children(&mut wm.clients, h);
    wm.mapping_order.retain(|x| *x != h);
    wm.window_to_client.remove(&xid);
    if frame != 0 {
        wm.frame_to_client.remove(&frame);
    }

    if damage_handle != 0 {
        let _ = wm.x.conn.damage_destroy(damage_handle);
    }

    if !destroyed && reparent {
        let a = wm.x.atoms;
        let _ = wm.x.conn.change_save_set(SetMode::DELETE, xid);
        let _ = wm.x.conn.reparent_window(xid, wm.x.root, server.x as i16, server.y as i16);
        let _ = wm
            .x
            .conn
            .configure_window(xid, &ConfigureWindowAux::new().border_width(border_width as u32));
        for prop in [
            a._NET_WM_DESKTOP,
            a._NET_WM_STATE,
            a._NET_FRAME_EXTENTS,
            a._NET_WM_ALLOWED_ACTIONS,
            a.WM_STATE,
        ] {
            let _ = wm.x.conn.delete_property(xid, prop);
        }
    }
    if frame != 0 {
        let _ = wm.x.conn.destroy_window(frame);
    }

    if let Some(hot) = wm.clients.hot_mut(h) {
        hot.lifecycle = if destroyed { Lifecycle::Destroyed } else { Lifecycle::Unmanaged };
    }
    wm.clients.free(h);
    wm.counters.unmanages += 1;
    wm.root_dirty = true;
    debug!(window = xid, destroyed, "unmanaged");
    Ok(())
}

/// Politely close, or kill when the client never learned ICCCM.
pub fn close_client<C: Connection>(wm: &mut Wm<C>, h: Handle) -> Result<(), XError> {
    let Some((hot, cold)) = wm.clients.hot(h).zip(wm.clients.cold(h)) else { return Ok(()) };
    let xid = hot.xid;
    if cold.protocols.contains(Protocols::DELETE_WINDOW) {
        let a = wm.x.atoms;
        let event = ClientMessageEvent::new(
            32,
            xid,
            a.WM_PROTOCOLS,
            [a.WM_DELETE_WINDOW, x11rb::CURRENT_TIME, 0, 0, 0],
        );
        wm.x.conn.send_event(false, xid, EventMask::NO_EVENT, event)?;
    } else {
        warn!(window = xid, "client has no WM_DELETE_WINDOW, killing");
        wm.x.conn.kill_client(xid)?;
    }
    Ok(())
}

/// ICCCM WM_STATE property (Normal/Iconic/Withdrawn).
pub fn set_wm_state<C: Connection>(wm: &Wm<C>, window: Window, state: u32) -> Result<(), XError> {
    wm.x.conn.change_property32(
        PropMode::REPLACE,
        window,
        wm.x.atoms.WM_STATE,
        wm.x.atoms.WM_STATE,
        &[state, 0],
    )?;
    Ok(())
}

pub fn write_allowed_actions<C: Connection>(wm: &Wm<C>, window: Window) -> Result<(), XError> {
    let a = wm.x.atoms;
    wm.x.conn.change_property32(
        PropMode::REPLACE,
        window,
        a._NET_WM_ALLOWED_ACTIONS,
        AtomEnum::ATOM,
        &[
            a._NET_WM_ACTION_MOVE,
            a._NET_WM_ACTION_RESIZE,
            a._NET_WM_ACTION_MINIMIZE,
            a._NET_WM_ACTION_STICK,
            a._NET_WM_ACTION_MAXIMIZE_HORZ,
            a._NET_WM_ACTION_MAXIMIZE_VERT,
            a._NET_WM_ACTION_FULLSCREEN,
            a._NET_WM_ACTION_CHANGE_DESKTOP,
            a._NET_WM_ACTION_CLOSE,
            a._NET_WM_ACTION_ABOVE,
            a._NET_WM_ACTION_BELOW,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_layer_prefers_state_over_type() {
        assert_eq!(initial_layer(WindowType::Normal, WinState::empty()), Layer::Normal);
        assert_eq!(initial_layer(WindowType::Dock, WinState::empty()), Layer::Dock);
        assert_eq!(initial_layer(WindowType::Normal, WinState::ABOVE), Layer::Above);
        assert_eq!(initial_layer(WindowType::Dock, WinState::FULLSCREEN), Layer::Fullscreen);
        assert_eq!(initial_layer(WindowType::Desktop, WinState::empty()), Layer::Desktop);
    }

    #[test]
    fn probe_fan_out_is_complete_and_distinct() {
        let mut seen = std::collections::HashSet::new();
        for kind in PROBE_FAN_OUT {
            assert!(seen.insert(kind), "duplicate probe kind {kind:?}");
        }
        assert_eq!(PROBE_FAN_OUT.len(), 28);
    }
}
