// SPDX-License-Identifier: GPL-3.0-only

//! Interactive move/resize. The drag only mutates `desired` geometry; the
//! commit phase paces the actual configures to ~60 Hz. A drag cancels when
//! every pointer button clears (lost ButtonRelease recovery), on an
//! explicit `_NET_WM_MOVERESIZE` CANCEL, and when the pointer grab is
//! refused.

use std::time::Instant;

use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt as _, EventMask, GrabMode, KeyButMask};

use crate::model::{Dirty, Handle, ResizeDir, SnapState};
use crate::util::Rect;
use crate::wm::{placement, Wm};
use crate::x11::cookies::{CookieEntry, CookieKind};
use crate::x11::{stash, XError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragMode {
    Move,
    Resize(ResizeDir),
}

#[derive(Debug, Clone, Copy)]
pub struct Drag {
    pub handle: Handle,
    pub mode: DragMode,
    pub start_root: (i32, i32),
    pub start_geom: Rect,
    /// pointer grab confirmed by the async GrabPointer reply
    pub granted: bool,
}

/// Minimum client size during an interactive resize, before hints.
const MIN_DRAG_SIZE: u32 = 16;

/// Begin a drag. The pointer grab is issued asynchronously; motion is
/// applied immediately and rolled back if the grab is refused.
pub fn start<C: Connection>(
    wm: &mut Wm<C>,
    h: Handle,
    mode: DragMode,
    root_pos: (i32, i32),
) -> Result<(), XError> {
    if wm.interactive.is_some() {
        return Ok(());
    }
    let Some(hot) = wm.clients.hot(h) else { return Ok(()) };
    let start_geom = hot.desired;
    let grab_window = if hot.frame != 0 { hot.frame } else { hot.xid };

    let cookie = wm.x.conn.grab_pointer(
        false,
        grab_window,
        EventMask::BUTTON_PRESS
            | EventMask::BUTTON_RELEASE
            | EventMask::POINTER_MOTION,
        GrabMode::ASYNC,
        GrabMode::ASYNC,
        x11rb::NONE,
        x11rb::NONE,
        x11rb::CURRENT_TIME,
    )?;
    let seq = stash(cookie);
    wm.counters.cookies_issued += 1;
    wm.jar.insert(CookieEntry {
        seq,
        kind: CookieKind::GrabPointer,
        owner: Some(h),
        data: 0,
        issued_at: Instant::now(),
        txn: 0,
    });

    wm.interactive = Some(Drag { handle: h, mode, start_root: root_pos, start_geom, granted: false });
    debug!(handle = h.bits(), ?mode, "interactive drag started");
    Ok(())
}

/// Apply a coalesced motion update to the dragged client.
pub fn motion<C: Connection>(wm: &mut Wm<C>, root_pos: (i32, i32), buttons: KeyButMask) {
    let Some(drag) = wm.interactive else { return };
    let button_mask = KeyButMask::BUTTON1
        | KeyButMask::BUTTON2
        | KeyButMask::BUTTON3
        | KeyButMask::BUTTON4
        | KeyButMask::BUTTON5;
    if u16::from(buttons & button_mask) == 0 {
        // ButtonRelease was lost; recover
        cancel(wm);
        return;
    }
    let dx = root_pos.0 - drag.start_root.0;
    let dy = root_pos.1 - drag.start_root.1;
    let workarea = wm.monitors.at(root_pos.0, root_pos.1).workarea;
    let snap_distance = wm.config.snap_distance;
    let Some(hot) = wm.clients.hot_mut(drag.handle) else {
        wm.interactive = None;
        return;
    };
    match drag.mode {
        DragMode::Move => {
            let moved = Rect::new(
                drag.start_geom.x + dx,
                drag.start_geom.y + dy,
                drag.start_geom.w,
                drag.start_geom.h,
            );
            let (snapped, snap) = placement::snap_to_edges(moved, &workarea, snap_distance);
            hot.desired.x = snapped.x;
            hot.desired.y = snapped.y;
            hot.snap = snap;
        }
        DragMode::Resize(dir) => {
            hot.desired = resize_rect(&drag.start_geom, dir, dx, dy);
            hot.snap = SnapState::None;
        }
    }
    if hot.desired != hot.server {
        hot.dirty |= Dirty::GEOM;
    }
}

/// Geometry for a resize drag: the grabbed edge/corner follows the
/// pointer, the opposite edge stays put.
pub fn resize_rect(start: &Rect, dir: ResizeDir, dx: i32, dy: i32) -> Rect {
    let mut r = *start;
    let clamp_w = |w: i32| (w.max(MIN_DRAG_SIZE as i32)) as u32;
    let clamp_h = |h: i32| (h.max(MIN_DRAG_SIZE as i32)) as u32;
    let left = matches!(dir, ResizeDir::TopLeft | ResizeDir::Left | ResizeDir::BottomLeft);
    let right = matches!(dir, ResizeDir::TopRight | ResizeDir::Right | ResizeDir::BottomRight);
    let top = matches!(dir, ResizeDir::TopLeft | ResizeDir::Top | ResizeDir::TopRight);
    let bottom = matches!(dir, ResizeDir::BottomLeft | ResizeDir::Bottom | ResizeDir::BottomRight);
    if right {
        r.w = clamp_w(start.w as i32 + dx);
    } else if left {
        r.w = clamp_w(start.w as i32 - dx);
        r.x = start.right() - r.w as i32;
    }
    if bottom {
        r.h = clamp_h(start.h as i32 + dy);
    } else if top {
        r.h = clamp_h(start.h as i32 - dy);
        r.y = start.bottom() - r.h as i32;
    }
    r
}

/// Finish the drag normally (ButtonRelease).
pub fn finish<C: Connection>(wm: &mut Wm<C>) {
    if wm.interactive.take().is_some() {
        let _ = wm.x.conn.ungrab_pointer(x11rb::CURRENT_TIME);
        debug!("interactive drag finished");
    }
}

/// Abort the drag and restore the pre-drag geometry.
pub fn cancel<C: Connection>(wm: &mut Wm<C>) {
    let Some(drag) = wm.interactive.take() else { return };
    let _ = wm.x.conn.ungrab_pointer(x11rb::CURRENT_TIME);
    if let Some(hot) = wm.clients.hot_mut(drag.handle) {
        hot.desired = drag.start_geom;
        hot.snap = SnapState::None;
        if hot.desired != hot.server {
            hot.dirty |= Dirty::GEOM;
        }
    }
    debug!(handle = drag.handle.bits(), "interactive drag canceled");
}

/// Cancel only if the drag belongs to `h` (client going away).
pub fn cancel_for<C: Connection>(wm: &mut Wm<C>, h: Handle) {
    if wm.interactive.map(|d| d.handle) == Some(h) {
        cancel(wm);
    }
}

/// Pick the resize direction from where the pointer sits on the frame.
pub fn dir_for_position(rect: &Rect, px: i32, py: i32) -> ResizeDir {
    let third_w = (rect.w / 3).max(1) as i32;
    let third_h = (rect.h / 3).max(1) as i32;
    let col = ((px - rect.x) / third_w).clamp(0, 2);
    let row = ((py - rect.y) / third_h).clamp(0, 2);
    match (row, col) {
        (0, 0) => ResizeDir::TopLeft,
        (0, 1) => ResizeDir::Top,
        (0, 2) => ResizeDir::TopRight,
        (1, 0) => ResizeDir::Left,
        (1, 2) => ResizeDir::Right,
        (2, 0) => ResizeDir::BottomLeft,
        (2, 1) => ResizeDir::Bottom,
        _ => ResizeDir::BottomRight,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_right_grows_width_only() {
        let start = Rect::new(100, 100, 200, 150);
        let r = resize_rect(&start, ResizeDir::Right, 50, 999);
        assert_eq!(r, Rect::new(100, 100, 250, 150));
    }

    #[test]
    fn resize_top_left_keeps_bottom_right_fixed() {
        let start = Rect::new(100, 100, 200, 150);
        let r = resize_rect(&start, ResizeDir::TopLeft, 20, 30);
        assert_eq!((r.right(), r.bottom()), (300, 250));
        assert_eq!(r, Rect::new(120, 130, 180, 120));
    }

    #[test]
    fn resize_never_collapses() {
        let start = Rect::new(0, 0, 100, 100);
        let r = resize_rect(&start, ResizeDir::BottomRight, -500, -500);
        assert_eq!((r.w, r.h), (MIN_DRAG_SIZE, MIN_DRAG_SIZE));
    }

    #[test]
    fn dir_from_pointer_octant() {
        let rect = Rect::new(0, 0, 90, 90);
        assert_eq!(dir_for_position(&rect, 5, 5), ResizeDir::TopLeft);
        assert_eq!(dir_for_position(&rect, 45, 5), ResizeDir::Top);
        assert_eq!(dir_for_position(&rect, 85, 85), ResizeDir::BottomRight);
        assert_eq!(dir_for_position(&rect, 5, 45), ResizeDir::Left);
    }
}
