// SPDX-License-Identifier: GPL-3.0-only

//! Placement policy and the maximize/fullscreen geometry state machines.
//! All pure over the hot record and a workarea; the commit phase turns the
//! resulting `desired` geometry and dirty bits into X requests.

use hxm_config::Placement;

use crate::model::{ClientFlags, ClientHot, Dirty, Layer, SnapState, WinState};
use crate::util::Rect;

/// Pick the initial rect for a new window: centered over its transient
/// parent when it has one, else at the client's requested position when
/// the hints say the user asked for it, else per policy. Always clamped
/// into the workarea.
pub fn initial_rect(
    size: (u32, u32),
    transient_parent: Option<Rect>,
    user_pos: Option<(i32, i32)>,
    placement: Placement,
    workarea: &Rect,
    pointer: (i32, i32),
) -> Rect {
    let r = Rect::new(0, 0, size.0.max(1), size.1.max(1));
    if let Some(parent) = transient_parent {
        return r.center_in(&parent).clamp_into(workarea);
    }
    if let Some((x, y)) = user_pos {
        return Rect::new(x, y, r.w, r.h).clamp_into(workarea);
    }
    match placement {
        Placement::Center => r.center_in(workarea),
        Placement::Pointer => Rect::new(
            pointer.0 - r.w as i32 / 2,
            pointer.1 - r.h as i32 / 2,
            r.w,
            r.h,
        )
        .clamp_into(workarea),
    }
}

/// Maximize one or both axes. The first axis to enter saves the current
/// server geometry; each axis fills the workarea independently, widened by
/// the client's invisible GTK shadow so the visible frame lands exactly on
/// the workarea edges.
pub fn maximize(hot: &mut ClientHot, horizontal: bool, vertical: bool, workarea: &Rect) {
    if !horizontal && !vertical {
        return;
    }
    if !hot.state.intersects(WinState::MAXIMIZED_H | WinState::MAXIMIZED_V) {
        hot.saved_max = hot.server;
    }
    let ext = hot.gtk_extents.unwrap_or_default();
    if horizontal {
        hot.state |= WinState::MAXIMIZED_H;
        hot.desired.x = workarea.x - ext.left as i32;
        hot.desired.w = workarea.w + ext.left + ext.right;
    }
    if vertical {
        hot.state |= WinState::MAXIMIZED_V;
        hot.desired.y = workarea.y - ext.top as i32;
        hot.desired.h = workarea.h + ext.top + ext.bottom;
    }
    hot.dirty |= Dirty::GEOM | Dirty::STATE;
}

/// Undo maximize on the named axes, restoring only those axes from the
/// saved pre-maximize geometry.
pub fn unmaximize(hot: &mut ClientHot, horizontal: bool, vertical: bool) {
    if horizontal && hot.state.contains(WinState::MAXIMIZED_H) {
        hot.state -= WinState::MAXIMIZED_H;
        hot.desired.x = hot.saved_max.x;
        hot.desired.w = hot.saved_max.w;
        hot.dirty |= Dirty::GEOM | Dirty::STATE;
    }
    if vertical && hot.state.contains(WinState::MAXIMIZED_V) {
        hot.state -= WinState::MAXIMIZED_V;
        hot.desired.y = hot.saved_max.y;
        hot.desired.h = hot.saved_max.h;
        hot.dirty |= Dirty::GEOM | Dirty::STATE;
    }
}

/// Enter fullscreen: save geometry, layer, decoration and maximize bits,
/// then cover `target` (workarea or exact monitor per config) in the
/// fullscreen layer.
pub fn fullscreen_enter(hot: &mut ClientHot, target: Rect) {
    if hot.state.contains(WinState::FULLSCREEN) {
        hot.desired = target;
        hot.dirty |= Dirty::GEOM;
        return;
    }
    hot.saved_fs = hot.server;
    hot.saved_fs_layer = hot.layer;
    hot.saved_fs_state = hot.state & (WinState::MAXIMIZED_H | WinState::MAXIMIZED_V);
    hot.saved_fs_undecorated = hot.flags.contains(ClientFlags::UNDECORATED);
    hot.state |= WinState::FULLSCREEN;
    hot.state -= WinState::MAXIMIZED_H | WinState::MAXIMIZED_V;
    hot.flags |= ClientFlags::UNDECORATED;
    hot.layer = Layer::Fullscreen;
    hot.desired = target;
    hot.dirty |= Dirty::GEOM | Dirty::STATE | Dirty::STACK | Dirty::FRAME;
}

/// Leave fullscreen, restoring everything the enter saved.
pub fn fullscreen_exit(hot: &mut ClientHot) {
    if !hot.state.contains(WinState::FULLSCREEN) {
        return;
    }
    hot.state -= WinState::FULLSCREEN;
    hot.state |= hot.saved_fs_state;
    if !hot.saved_fs_undecorated {
        hot.flags -= ClientFlags::UNDECORATED;
    }
    hot.layer = hot.saved_fs_layer;
    hot.desired = hot.saved_fs;
    hot.dirty |= Dirty::GEOM | Dirty::STATE | Dirty::STACK | Dirty::FRAME;
}

/// Snap a dragged rect to the workarea edges within `threshold` pixels.
pub fn snap_to_edges(rect: Rect, workarea: &Rect, threshold: u16) -> (Rect, SnapState) {
    let thr = threshold as i32;
    let mut r = rect;
    let mut snap = SnapState::None;
    if (r.x - workarea.x).abs() <= thr {
        r.x = workarea.x;
        snap = SnapState::Left;
    } else if (workarea.right() - r.right()).abs() <= thr {
        r.x = workarea.right() - r.w as i32;
        snap = SnapState::Right;
    }
    if (r.y - workarea.y).abs() <= thr {
        r.y = workarea.y;
        snap = SnapState::Top;
    } else if (workarea.bottom() - r.bottom()).abs() <= thr {
        r.y = workarea.bottom() - r.h as i32;
        snap = SnapState::Bottom;
    }
    (r, snap)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hot_with_server(rect: Rect) -> ClientHot {
        let mut hot = ClientHot::new(1);
        hot.server = rect;
        hot.desired = rect;
        hot
    }

    #[test]
    fn maximize_then_unmaximize_restores_desired() {
        let wa = Rect::new(0, 30, 1920, 1050);
        let before = Rect::new(100, 200, 640, 480);
        let mut hot = hot_with_server(before);
        maximize(&mut hot, true, true, &wa);
        assert_eq!(hot.desired, wa);
        assert!(hot.state.contains(WinState::MAXIMIZED_H | WinState::MAXIMIZED_V));
        unmaximize(&mut hot, true, true);
        assert_eq!(hot.desired, before);
        assert!(!hot.state.intersects(WinState::MAXIMIZED_H | WinState::MAXIMIZED_V));
    }

    #[test]
    fn partial_unmaximize_restores_one_axis() {
        let wa = Rect::new(0, 0, 1000, 800);
        let before = Rect::new(50, 60, 300, 200);
        let mut hot = hot_with_server(before);
        maximize(&mut hot, true, true, &wa);
        unmaximize(&mut hot, true, false);
        assert_eq!((hot.desired.x, hot.desired.w), (50, 300));
        assert_eq!((hot.desired.y, hot.desired.h), (0, 800));
        assert!(hot.state.contains(WinState::MAXIMIZED_V));
        assert!(!hot.state.contains(WinState::MAXIMIZED_H));
    }

    #[test]
    fn fullscreen_round_trip_restores_everything() {
        let before = Rect::new(10, 20, 400, 300);
        let mut hot = hot_with_server(before);
        hot.layer = Layer::Normal;
        hot.state |= WinState::MAXIMIZED_H;
        fullscreen_enter(&mut hot, Rect::new(0, 0, 1920, 1080));
        assert_eq!(hot.desired, Rect::new(0, 0, 1920, 1080));
        assert_eq!(hot.layer, Layer::Fullscreen);
        assert!(hot.flags.contains(ClientFlags::UNDECORATED));
        assert!(!hot.state.contains(WinState::MAXIMIZED_H));
        fullscreen_exit(&mut hot);
        assert_eq!(hot.desired, before);
        assert_eq!(hot.layer, Layer::Normal);
        assert!(!hot.flags.contains(ClientFlags::UNDECORATED));
        assert!(hot.state.contains(WinState::MAXIMIZED_H));
        assert!(!hot.state.contains(WinState::FULLSCREEN));
    }

    #[test]
    fn transient_centers_over_parent() {
        let wa = Rect::new(0, 0, 1920, 1080);
        let parent = Rect::new(100, 100, 800, 600);
        let r = initial_rect((400, 300), Some(parent), None, Placement::Center, &wa, (0, 0));
        assert_eq!(r, Rect::new(300, 250, 400, 300));
    }

    #[test]
    fn user_position_wins_over_policy() {
        let wa = Rect::new(0, 0, 1000, 1000);
        let r = initial_rect((100, 100), None, Some((50, 60)), Placement::Center, &wa, (0, 0));
        assert_eq!(r, Rect::new(50, 60, 100, 100));
    }

    #[test]
    fn pointer_placement_clamps() {
        let wa = Rect::new(0, 0, 1000, 1000);
        let r = initial_rect((200, 200), None, None, Placement::Pointer, &wa, (990, 990));
        assert!(r.right() <= 1000 && r.bottom() <= 1000);
    }

    #[test]
    fn snap_catches_near_edges() {
        let wa = Rect::new(0, 30, 1920, 1050);
        let (r, snap) = snap_to_edges(Rect::new(5, 400, 300, 200), &wa, 12);
        assert_eq!(r.x, 0);
        assert_eq!(snap, SnapState::Left);
        let (r, snap) = snap_to_edges(Rect::new(500, 33, 300, 200), &wa, 12);
        assert_eq!(r.y, 30);
        assert_eq!(snap, SnapState::Top);
        let (r, snap) = snap_to_edges(Rect::new(500, 500, 300, 200), &wa, 12);
        assert_eq!(r, Rect::new(500, 500, 300, 200));
        assert_eq!(snap, SnapState::None);
    }
}
