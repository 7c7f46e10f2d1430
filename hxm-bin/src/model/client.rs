// SPDX-License-Identifier: GPL-3.0-only

//! Per-client records, split by access pattern: the hot half is touched on
//! every tick or event, the cold half only on manage, property change, and
//! unmanage.

use bitflags::bitflags;
use x11rb::protocol::xproto::{ClientMessageEvent, Window};

use super::slotmap::Handle;
use crate::util::Rect;

/// Lifecycle of a managed window. Only `New -> Ready` and
/// `Mapped <-> Unmapped` repeat during a lifetime; every other edge is
/// one-shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// probes in flight
    New,
    /// probes complete, not yet framed
    Ready,
    Mapped,
    /// iconified or on another desktop
    Unmapped,
    /// teardown in progress
    Unmanaging,
    /// window already gone from the server
    Destroyed,
    /// reparented back to root
    Unmanaged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagePhase {
    /// initial probe fan-out outstanding
    Phase1,
    Done,
}

/// Stacking layers, bottom to top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Layer {
    Desktop,
    Below,
    Normal,
    Dock,
    Above,
    Fullscreen,
    Overlay,
}

impl Layer {
    pub const COUNT: usize = 7;
    pub const ALL: [Layer; Self::COUNT] = [
        Layer::Desktop,
        Layer::Below,
        Layer::Normal,
        Layer::Dock,
        Layer::Above,
        Layer::Fullscreen,
        Layer::Overlay,
    ];

    pub fn index(self) -> usize {
        match self {
            Layer::Desktop => 0,
            Layer::Below => 1,
            Layer::Normal => 2,
            Layer::Dock => 3,
            Layer::Above => 4,
            Layer::Fullscreen => 5,
            Layer::Overlay => 6,
        }
    }
}

/// EWMH window type, already reduced to the one winning atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowType {
    Normal,
    Dialog,
    Dock,
    Desktop,
    Splash,
    Toolbar,
    Utility,
    Menu,
    DropdownMenu,
    PopupMenu,
    Tooltip,
    Combo,
    Dnd,
    Notification,
}

impl WindowType {
    /// Types that are never managed; discovering one mid-probe aborts the
    /// manage and the window is mapped unmanaged.
    pub fn unmanageable(self) -> bool {
        matches!(
            self,
            WindowType::DropdownMenu
                | WindowType::PopupMenu
                | WindowType::Tooltip
                | WindowType::Combo
                | WindowType::Dnd
        )
    }

    /// The stacking layer this type starts in.
    pub fn default_layer(self) -> Layer {
        match self {
            WindowType::Desktop => Layer::Desktop,
            WindowType::Dock => Layer::Dock,
            WindowType::Notification => Layer::Above,
            _ => Layer::Normal,
        }
    }
}

bitflags! {
    /// EWMH `_NET_WM_STATE` bits plus the WM-written FOCUSED/HIDDEN.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WinState: u32 {
        const MAXIMIZED_H = 1 << 0;
        const MAXIMIZED_V = 1 << 1;
        const ABOVE = 1 << 2;
        const BELOW = 1 << 3;
        const STICKY = 1 << 4;
        const SKIP_TASKBAR = 1 << 5;
        const SKIP_PAGER = 1 << 6;
        const FULLSCREEN = 1 << 7;
        const HIDDEN = 1 << 8;
        const MODAL = 1 << 9;
        const SHADED = 1 << 10;
        const DEMANDS_ATTENTION = 1 << 11;
        const FOCUSED = 1 << 12;
    }
}

bitflags! {
    /// Miscellaneous per-client switches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ClientFlags: u16 {
        const UNDECORATED = 1 << 0;
        const URGENT = 1 << 1;
        /// the window type came from `_NET_WM_WINDOW_TYPE`, not a fallback
        const TYPE_FROM_EWMH = 1 << 2;
        /// attribute probe found the window unmanageable
        const MANAGE_ABORTED = 1 << 3;
        /// client advertised a sync-request counter
        const SYNC_ENABLED = 1 << 4;
        /// WM_HINTS initial_state asked for iconic
        const START_ICONIC = 1 << 5;
        /// taken over at WM startup rather than via MapRequest
        const ADOPTED = 1 << 6;
        /// attribute probe saw the window already viewable
        const WAS_MAPPED = 1 << 7;
    }
}

bitflags! {
    /// Pending commit work per client, drained by the flush phase.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Dirty: u16 {
        const GEOM = 1 << 0;
        const STACK = 1 << 1;
        const STATE = 1 << 2;
        const TITLE = 1 << 3;
        const HINTS = 1 << 4;
        const STRUT = 1 << 5;
        const OPACITY = 1 << 6;
        const DESKTOP = 1 << 7;
        const FRAME = 1 << 8;
        const VISIBILITY = 1 << 9;
    }
}

bitflags! {
    /// WM_PROTOCOLS the client advertised.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Protocols: u8 {
        const DELETE_WINDOW = 1 << 0;
        const TAKE_FOCUS = 1 << 1;
        const SYNC_REQUEST = 1 << 2;
        const PING = 1 << 3;
    }
}

/// Resize direction for interactive resizes and border cursors, matching
/// the `_NET_WM_MOVERESIZE` direction encoding 0..=7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeDir {
    TopLeft,
    Top,
    TopRight,
    Right,
    BottomRight,
    Bottom,
    BottomLeft,
    Left,
}

impl ResizeDir {
    pub fn from_moveresize(dir: u32) -> Option<Self> {
        Some(match dir {
            0 => ResizeDir::TopLeft,
            1 => ResizeDir::Top,
            2 => ResizeDir::TopRight,
            3 => ResizeDir::Right,
            4 => ResizeDir::BottomRight,
            5 => ResizeDir::Bottom,
            6 => ResizeDir::BottomLeft,
            7 => ResizeDir::Left,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapState {
    #[default]
    None,
    Left,
    Right,
    Top,
    Bottom,
}

/// Parsed WM_NORMAL_HINTS, normalized for the constrain step.
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeHints {
    pub valid: bool,
    pub user_position: bool,
    pub min: Option<(u32, u32)>,
    pub max: Option<(u32, u32)>,
    pub base: Option<(u32, u32)>,
    pub inc: Option<(u32, u32)>,
    /// (min, max) aspect as width/height ratios
    pub aspect: Option<(f64, f64)>,
}

/// Client-drawn shadow insets from `_GTK_FRAME_EXTENTS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extents {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

/// Premultiplied-alpha icon selected from `_NET_WM_ICON`.
#[derive(Debug, Clone)]
pub struct Icon {
    pub width: u32,
    pub height: u32,
    /// premultiplied ARGB, row major
    pub pixels: Vec<u32>,
}

pub const OPAQUE: u32 = 0xffff_ffff;

/// Hot half: everything the tick loop and event handlers touch.
#[derive(Debug)]
pub struct ClientHot {
    pub xid: Window,
    /// frame window, 0 while unframed or after the frame died
    pub frame: Window,
    /// last geometry the server confirmed
    pub server: Rect,
    /// geometry the model wants
    pub desired: Rect,
    /// geometry of the configure most recently sent and not yet confirmed
    pub pending: Rect,
    /// last synthetic ConfigureNotify sent, for duplicate suppression
    pub last_synthetic: Rect,
    pub win_type: WindowType,
    /// policy layer derived from type/state
    pub layer: Layer,
    pub flags: ClientFlags,
    pub state: WinState,
    pub lifecycle: Lifecycle,
    /// whether the frame/client pair is currently mapped on the server
    pub x_mapped: bool,
    pub phase: ManagePhase,
    pub pending_replies: u32,
    /// transaction of the newest applied reply; older replies are stale
    pub applied_txn: u64,
    pub dirty: Dirty,
    /// authoritative stacking position back-pointers
    pub stacking_layer: Layer,
    pub stacking_index: usize,
    pub transient_for: Option<Handle>,
    pub transient_head: Option<Handle>,
    pub transient_next: Option<Handle>,
    pub desktop: u32,
    pub damage: Rect,
    /// X damage object, 0 when the extension is absent
    pub damage_handle: u32,
    pub sync_counter: u32,
    pub sync_value: i64,
    /// WM-issued unmaps whose UnmapNotify must be swallowed
    pub ignore_unmap: u32,
    pub saved_max: Rect,
    pub saved_fs: Rect,
    pub saved_fs_layer: Layer,
    pub saved_fs_state: WinState,
    pub saved_fs_undecorated: bool,
    pub hints: SizeHints,
    pub gtk_extents: Option<Extents>,
    /// decoration override from `_MOTIF_WM_HINTS`
    pub motif_decor: Option<bool>,
    pub opacity: u32,
    pub icon_geometry: Option<Rect>,
    pub user_time: u32,
    pub user_time_window: Window,
    pub cursor_dir: Option<ResizeDir>,
    pub snap: SnapState,
    pub fullscreen_monitors: Option<[u32; 4]>,
    /// client's original border width, restored at unmanage
    pub border_width: u16,
}

impl ClientHot {
    pub fn new(xid: Window) -> Self {
        Self {
            xid,
            frame: 0,
            server: Rect::default(),
            desired: Rect::default(),
            pending: Rect::default(),
            last_synthetic: Rect::default(),
            win_type: WindowType::Normal,
            layer: Layer::Normal,
            flags: ClientFlags::empty(),
            state: WinState::empty(),
            lifecycle: Lifecycle::New,
            x_mapped: false,
            phase: ManagePhase::Phase1,
            pending_replies: 0,
            applied_txn: 0,
            dirty: Dirty::empty(),
            stacking_layer: Layer::Normal,
            stacking_index: usize::MAX,
            transient_for: None,
            transient_head: None,
            transient_next: None,
            desktop: 0,
            damage: Rect::default(),
            damage_handle: 0,
            sync_counter: 0,
            sync_value: 0,
            ignore_unmap: 0,
            saved_max: Rect::default(),
            saved_fs: Rect::default(),
            saved_fs_layer: Layer::Normal,
            saved_fs_state: WinState::empty(),
            saved_fs_undecorated: false,
            hints: SizeHints::default(),
            gtk_extents: None,
            motif_decor: None,
            opacity: OPAQUE,
            icon_geometry: None,
            user_time: 0,
            user_time_window: 0,
            cursor_dir: None,
            snap: SnapState::None,
            fullscreen_monitors: None,
            border_width: 0,
        }
    }

    /// Whether the client counts for `_NET_CLIENT_LIST` and visibility work.
    pub fn is_managed(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Mapped | Lifecycle::Unmapped)
    }

    pub fn decorated(&self) -> bool {
        if self.state.contains(WinState::FULLSCREEN) {
            return false;
        }
        match self.motif_decor {
            Some(decor) => decor,
            None => {
                !self.flags.contains(ClientFlags::UNDECORATED)
                    && matches!(
                        self.win_type,
                        WindowType::Normal | WindowType::Dialog | WindowType::Utility
                    )
            }
        }
    }
}

/// Cold half: strings and rarely-read protocol state. Dropped wholesale at
/// unmanage.
#[derive(Debug, Default)]
pub struct ClientCold {
    pub title: String,
    /// the title came from `_NET_WM_NAME`; ICCCM WM_NAME must not clobber
    pub title_is_ewmh: bool,
    pub icon_name: String,
    pub icon_name_is_ewmh: bool,
    pub wm_class_instance: String,
    pub wm_class_class: String,
    pub client_machine: String,
    pub command: String,
    pub protocols: Protocols,
    pub strut: Option<StrutPartial>,
    pub strut_is_partial: bool,
    pub colormap: u32,
    pub colormap_windows: Vec<Window>,
    pub can_focus: bool,
    /// `_NET_WM_STATE` client messages that arrived before management
    /// completed; replayed by finish-manage
    pub pending_state_msgs: Vec<ClientMessageEvent>,
    pub icon: Option<Icon>,
    pub pid: u32,
    /// last `_NET_WM_PING` pong, X server time
    pub last_pong: u32,
}

/// `_NET_WM_STRUT_PARTIAL` (legacy struts are widened to full ranges).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StrutPartial {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
    pub left_start_y: u32,
    pub left_end_y: u32,
    pub right_start_y: u32,
    pub right_end_y: u32,
    pub top_start_x: u32,
    pub top_end_x: u32,
    pub bottom_start_x: u32,
    pub bottom_end_x: u32,
}

impl StrutPartial {
    pub fn is_empty(&self) -> bool {
        self.left == 0 && self.right == 0 && self.top == 0 && self.bottom == 0
    }

    /// Swap inverted start/end ranges in place.
    pub fn sanitize(&mut self) {
        for (start, end) in [
            (&mut self.left_start_y, &mut self.left_end_y),
            (&mut self.right_start_y, &mut self.right_end_y),
            (&mut self.top_start_x, &mut self.top_end_x),
            (&mut self.bottom_start_x, &mut self.bottom_end_x),
        ] {
            if *start > *end {
                std::mem::swap(start, end);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strut_sanitize_swaps_inverted_ranges() {
        let mut strut = StrutPartial { top: 30, top_start_x: 1920, top_end_x: 0, ..Default::default() };
        strut.sanitize();
        assert_eq!((strut.top_start_x, strut.top_end_x), (0, 1920));
    }

    #[test]
    fn fullscreen_forces_undecorated() {
        let mut hot = ClientHot::new(1);
        assert!(hot.decorated());
        hot.state |= WinState::FULLSCREEN;
        assert!(!hot.decorated());
        hot.state = WinState::empty();
        hot.motif_decor = Some(false);
        assert!(!hot.decorated());
    }

    #[test]
    fn dock_types_are_not_decorated() {
        let mut hot = ClientHot::new(1);
        hot.win_type = WindowType::Dock;
        assert!(!hot.decorated());
    }
}
