// SPDX-License-Identifier: GPL-3.0-only

//! RandR screen-change handling: refresh the monitor set, republish the
//! desktop geometry, and refit fullscreen clients onto their monitors.

use itertools::Itertools;
use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::randr::{GetMonitorsReply, ScreenChangeNotifyEvent};
use x11rb::protocol::xproto::{AtomEnum, PropMode};
use x11rb::wrapper::ConnectionExt as _;

use crate::model::WinState;
use crate::monitor::{Monitor, Monitors};
use crate::util::Rect;
use crate::wm::{placement, Wm};
use crate::x11::XError;

pub fn monitors_from_reply(reply: &GetMonitorsReply, screen_size: (u16, u16)) -> Monitors {
    // deterministic order: primary first, then left-to-right, top-to-bottom
    let mut list: Vec<Monitor> = reply
        .monitors
        .iter()
        .filter(|m| m.width > 0 && m.height > 0)
        .sorted_by_key(|m| (!m.primary, m.x, m.y))
        .map(|m| {
            Monitor::new(
                Rect::new(m.x as i32, m.y as i32, m.width as u32, m.height as u32),
                m.primary,
            )
        })
        .collect();
    if list.is_empty() {
        return Monitors::single(screen_size.0, screen_size.1);
    }
    if !list.iter().any(|m| m.primary) {
        list[0].primary = true;
    }
    Monitors { list }
}

pub fn screen_change<C: Connection>(
    wm: &mut Wm<C>,
    ev: &ScreenChangeNotifyEvent,
) -> Result<(), XError> {
    debug!(width = ev.width, height = ev.height, "screen changed");
    wm.x.screen_size = (ev.width, ev.height);
    let a = wm.x.atoms;
    wm.x.conn.change_property32(
        PropMode::REPLACE,
        wm.x.root,
        a._NET_DESKTOP_GEOMETRY,
        AtomEnum::CARDINAL,
        &[ev.width as u32, ev.height as u32],
    )?;
    wm.refresh_monitors_async()?;
    Ok(())
}

/// After the monitor set changed: recompute workareas, push fullscreen
/// clients onto their (possibly moved) monitors, and pull stray windows
/// back into view.
pub fn refit_after_monitor_change<C: Connection>(wm: &mut Wm<C>) {
    let struts = super::super::commit::collect_struts(wm);
    wm.monitors.apply_struts(struts.iter());
    let handles: Vec<_> = wm.clients.iter().collect();
    for h in handles {
        let Some(hot) = wm.clients.hot(h) else { continue };
        if !hot.is_managed() {
            continue;
        }
        if hot.state.contains(WinState::FULLSCREEN) {
            let target = super::message::fullscreen_target(wm, h);
            if let Some(hot) = wm.clients.hot_mut(h) {
                placement::fullscreen_enter(hot, target);
            }
        } else {
            let monitor_area = wm.monitors.for_rect(&hot.desired).workarea;
            let clamped = hot.desired.clamp_into(&monitor_area);
            if let Some(hot) = wm.clients.hot_mut(h) {
                if clamped != hot.desired {
                    hot.desired = clamped;
                    hot.dirty |= crate::model::Dirty::GEOM;
                }
            }
        }
    }
    wm.root_dirty = true;
}
