// SPDX-License-Identifier: GPL-3.0-only

//! Key, button, and pointer handling: binding dispatch, click-to-focus,
//! drag starts, and the focus-follows-mouse option.

use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    Allow, ConnectionExt as _, EnterNotifyEvent, KeyPressEvent, MotionNotifyEvent,
};

use hxm_config::Action;

use crate::model::{Dirty, Lifecycle, WinState};
use crate::wm::handlers::message;
use crate::wm::interactive::{self, DragMode};
use crate::wm::{manage, placement, Wm};
use crate::x11::events::ButtonEvent;
use crate::x11::XError;

pub fn key_press<C: Connection>(wm: &mut Wm<C>, ev: &KeyPressEvent) -> Result<(), XError> {
    let Some(action) = wm.bindings.lookup(ev.detail, u16::from(ev.state)).cloned() else {
        return Ok(());
    };
    run_action(wm, &action)
}

pub fn run_action<C: Connection>(wm: &mut Wm<C>, action: &Action) -> Result<(), XError> {
    match action {
        Action::FocusNext | Action::FocusPrev => {
            let forward = matches!(action, Action::FocusNext);
            if let Some(next) = wm.focus.cycle(&wm.clients, wm.current_desktop, forward) {
                wm.focus.set_focus(Some(next));
                wm.stacking.raise(&mut wm.clients, next);
            }
        }
        Action::Close => {
            if let Some(h) = wm.focus.focused {
                manage::close_client(wm, h)?;
            }
        }
        Action::ToggleMaximize => {
            if let Some(h) = wm.focus.focused {
                wm.bump_txn(h);
                let workarea = wm
                    .clients
                    .hot(h)
                    .map(|hot| wm.monitors.for_rect(&hot.desired).workarea);
                if let (Some(hot), Some(wa)) = (wm.clients.hot_mut(h), workarea) {
                    if hot.state.contains(WinState::MAXIMIZED_H | WinState::MAXIMIZED_V) {
                        placement::unmaximize(hot, true, true);
                    } else {
                        placement::maximize(hot, true, true, &wa);
                    }
                }
            }
        }
        Action::ToggleFullscreen => {
            if let Some(h) = wm.focus.focused {
                message::toggle_fullscreen(wm, h);
            }
        }
        Action::Desktop(n) => message::switch_desktop(wm, *n),
        Action::MoveToDesktop(n) => {
            if let Some(h) = wm.focus.focused {
                message::move_to_desktop(wm, h, *n);
            }
        }
        Action::ShowDesktop => {
            let showing = !wm.showing_desktop;
            message::show_desktop(wm, showing);
        }
        Action::Exec(cmd) => crate::process::spawn_command(cmd),
    }
    Ok(())
}

pub fn button<C: Connection>(wm: &mut Wm<C>, ev: &ButtonEvent) -> Result<(), XError> {
    let e = &ev.ev;
    wm.last_pointer = (e.root_x as i32, e.root_y as i32);

    if !ev.press {
        if wm.interactive.is_some() {
            interactive::finish(wm);
        }
        return Ok(());
    }

    let Some(h) = wm.client_of(e.event) else {
        // root clicks belong to the menu collaborator
        return Ok(());
    };

    let drag_mask = wm.config.drag_modifier.mask();
    let mods = u16::from(e.state) & !(0x10 | 0x2); // strip NumLock/CapsLock
    let on_client = wm.window_to_client.contains_key(&e.event);
    if mods & drag_mask != 0 && matches!(e.detail, 1 | 3) {
        let fullscreen = wm
            .clients
            .hot(h)
            .is_some_and(|hot| hot.state.contains(WinState::FULLSCREEN));
        if !fullscreen {
            let mode = if e.detail == 1 {
                DragMode::Move
            } else {
                let rect = wm.clients.hot(h).map(|hot| hot.desired).unwrap_or_default();
                DragMode::Resize(interactive::dir_for_position(
                    &rect,
                    e.root_x as i32,
                    e.root_y as i32,
                ))
            };
            interactive::start(wm, h, mode, (e.root_x as i32, e.root_y as i32))?;
        }
    } else {
        // click to focus and raise
        wm.focus.set_focus(Some(h));
        wm.stacking.raise(&mut wm.clients, h);
        debug!(window = e.event, "click focus");
    }
    if on_client {
        // release the sync button grab and let the client see the click
        wm.x.conn.allow_events(Allow::REPLAY_POINTER, e.time)?;
    }
    Ok(())
}

pub fn motion<C: Connection>(wm: &mut Wm<C>, ev: &MotionNotifyEvent) {
    wm.last_pointer = (ev.root_x as i32, ev.root_y as i32);
    if wm.interactive.is_some() {
        interactive::motion(wm, (ev.root_x as i32, ev.root_y as i32), ev.state);
        return;
    }
    // cache the border octant for the resize cursor
    if let Some(h) = wm.frame_to_client.get(&ev.event).copied() {
        let rect = wm.clients.hot(h).map(|hot| hot.desired);
        if let (Some(hot), Some(rect)) = (wm.clients.hot_mut(h), rect) {
            hot.cursor_dir =
                Some(interactive::dir_for_position(&rect, ev.root_x as i32, ev.root_y as i32));
        }
    }
}

pub fn enter<C: Connection>(wm: &mut Wm<C>, ev: &EnterNotifyEvent) {
    if !wm.config.focus_follows_mouse || wm.interactive.is_some() {
        return;
    }
    if let Some(h) = wm.client_of(ev.event) {
        let mapped = wm
            .clients
            .hot(h)
            .is_some_and(|hot| hot.lifecycle == Lifecycle::Mapped);
        if mapped && wm.focus.focused != Some(h) {
            wm.focus.set_focus(Some(h));
            if let Some(hot) = wm.clients.hot_mut(h) {
                hot.dirty |= Dirty::FRAME;
            }
        }
    }
}
