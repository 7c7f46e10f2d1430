// SPDX-License-Identifier: GPL-3.0-only

//! PropertyNotify handling: map the changed atom to a re-probe through the
//! cookie jar. State lands when the reply comes back; nothing is read
//! synchronously.

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{Atom, AtomEnum, Window};

use crate::wm::Wm;
use crate::x11::cookies::CookieKind;
use crate::x11::XError;

pub fn changed<C: Connection>(wm: &mut Wm<C>, window: Window, atom: Atom) -> Result<(), XError> {
    let Some(h) = wm.client_of(window) else { return Ok(()) };
    let Some(hot) = wm.clients.hot(h) else { return Ok(()) };
    let xid = hot.xid;
    if window != xid {
        // property events on the frame are not client properties
        return Ok(());
    }
    let txn = hot.applied_txn;

    let a = wm.x.atoms;
    let core = |e: AtomEnum| u32::from(e);
    let kind = if atom == a._NET_WM_NAME {
        CookieKind::NetWmName
    } else if atom == core(AtomEnum::WM_NAME) {
        if wm.clients.cold(h).is_some_and(|cold| cold.title_is_ewmh) {
            return Ok(());
        }
        CookieKind::WmName
    } else if atom == a._NET_WM_ICON_NAME {
        CookieKind::NetWmIconName
    } else if atom == core(AtomEnum::WM_ICON_NAME) {
        if wm.clients.cold(h).is_some_and(|cold| cold.icon_name_is_ewmh) {
            return Ok(());
        }
        CookieKind::WmIconName
    } else if atom == core(AtomEnum::WM_HINTS) {
        CookieKind::WmHints
    } else if atom == core(AtomEnum::WM_NORMAL_HINTS) {
        CookieKind::NormalHints
    } else if atom == core(AtomEnum::WM_CLASS) {
        CookieKind::WmClass
    } else if atom == core(AtomEnum::WM_TRANSIENT_FOR) {
        CookieKind::TransientFor
    } else if atom == core(AtomEnum::WM_COMMAND) {
        CookieKind::Command
    } else if atom == a.WM_CLIENT_MACHINE {
        CookieKind::ClientMachine
    } else if atom == a.WM_PROTOCOLS {
        CookieKind::WmProtocols
    } else if atom == a.WM_COLORMAP_WINDOWS {
        CookieKind::ColormapWindows
    } else if atom == a._NET_WM_STRUT_PARTIAL {
        CookieKind::StrutPartial
    } else if atom == a._NET_WM_STRUT {
        if wm.clients.cold(h).is_some_and(|cold| cold.strut_is_partial) {
            return Ok(());
        }
        CookieKind::StrutLegacy
    } else if atom == a._MOTIF_WM_HINTS {
        CookieKind::MotifHints
    } else if atom == a._GTK_FRAME_EXTENTS {
        CookieKind::GtkFrameExtents
    } else if atom == a._NET_WM_ICON {
        CookieKind::Icon
    } else if atom == a._NET_WM_ICON_GEOMETRY {
        CookieKind::IconGeometry
    } else if atom == a._NET_WM_USER_TIME {
        CookieKind::UserTime
    } else if atom == a._NET_WM_USER_TIME_WINDOW {
        CookieKind::UserTimeWindow
    } else if atom == a._NET_WM_WINDOW_OPACITY {
        CookieKind::Opacity
    } else if atom == a._NET_WM_SYNC_REQUEST_COUNTER {
        CookieKind::SyncRequestCounter
    } else if atom == a._NET_WM_FULLSCREEN_MONITORS {
        CookieKind::FullscreenMonitors
    } else {
        return Ok(());
    };
    wm.issue_probe(xid, kind, Some(h), txn)
}
