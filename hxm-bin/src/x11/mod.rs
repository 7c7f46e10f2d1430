// SPDX-License-Identifier: GPL-3.0-only

//! X server connection plumbing: ownership handshake, the interned atom
//! table, extension negotiation, and reply-by-sequence harvesting for the
//! cookie jar.
//!
//! Replies are never waited on blindly. The connection tracks the newest
//! full sequence number the server has provably processed (advanced by
//! every event we read and by an end-of-tick GetInputFocus sync point);
//! a reply is only pulled once its sequence is at or below that horizon,
//! at which point the bytes are already buffered locally and the pull
//! cannot block.

pub mod atoms;
pub mod cookies;
pub mod events;
pub mod props;
pub mod source;

use x11rb::connection::{Connection, DiscardMode, ReplyOrError, RequestConnection, RequestKind};
use x11rb::cookie::Cookie;
use x11rb::errors::{ConnectionError, ParseError, ReplyError, ReplyOrIdError};
use x11rb::protocol::damage::ConnectionExt as _;
use x11rb::protocol::randr::ConnectionExt as _;
use x11rb::protocol::sync::ConnectionExt as _;
use x11rb::protocol::xproto::{
    AtomEnum, ChangeWindowAttributesAux, Colormap, ConnectionExt as _, CreateWindowAux, EventMask,
    PropMode, Window, WindowClass,
};
use x11rb::protocol::{damage, randr, sync as xsync, ErrorKind, Event};
use x11rb::wrapper::ConnectionExt as _;
use x11rb::x11_utils::{TryParse, X11Error};

pub use atoms::Atoms;

/// Errors out of the X layer. Only the init-time kinds are fatal; everything
/// observed mid-tick is logged and absorbed per the recovery policy.
#[derive(Debug, thiserror::Error)]
pub enum XError {
    #[error("another window manager owns the display")]
    WmRunning,
    #[error("X connection failed: {0}")]
    Connection(#[from] ConnectionError),
    #[error("X request failed: {0}")]
    Reply(#[from] ReplyError),
    #[error("X id allocation failed: {0}")]
    Id(#[from] ReplyOrIdError),
    #[error("malformed X reply: {0}")]
    Parse(#[from] ParseError),
}

/// Outcome of asking the jar's transport for one sequence.
#[derive(Debug)]
pub enum Harvest {
    Reply(Vec<u8>),
    Error(X11Error),
    /// reaped by the abandonment timeout, no data
    TimedOut,
}

/// Extract the raw sequence number of a reply cookie without discarding the
/// reply: the jar claims it later via [`XConn::harvest`]. The eventual
/// `wait_for_reply_or_raw_error` (or `discard_reply` on timeout) releases
/// the connection-side bookkeeping the forgotten cookie would have.
pub fn stash<C, R>(cookie: Cookie<'_, C, R>) -> u64
where
    C: RequestConnection + ?Sized,
    R: TryParse,
{
    let seq = cookie.sequence_number();
    std::mem::forget(cookie);
    seq
}

#[derive(Debug)]
pub struct XConn<C: Connection> {
    pub conn: C,
    pub atoms: Atoms,
    pub root: Window,
    pub root_depth: u8,
    pub default_colormap: Colormap,
    pub screen_size: (u16, u16),
    /// the 1x1 `_NET_SUPPORTING_WM_CHECK` child
    pub wm_window: Window,
    pub have_randr: bool,
    pub have_damage: bool,
    pub have_sync: bool,
    last_seen: u64,
    sync_seq: Option<u64>,
}

impl<C: Connection> XConn<C> {
    /// Intern atoms, negotiate extensions, and size up the screen. Round
    /// trips are fine here; this only runs at init.
    pub fn new(conn: C, screen_num: usize) -> Result<Self, XError> {
        let atoms = Atoms::new(&conn)?.reply()?;
        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        let root_depth = screen.root_depth;
        let default_colormap = screen.default_colormap;
        let screen_size = (screen.width_in_pixels, screen.height_in_pixels);

        let have_randr = conn.extension_information(randr::X11_EXTENSION_NAME)?.is_some();
        if have_randr {
            conn.randr_query_version(1, 5)?.reply()?;
        }
        let have_damage = conn.extension_information(damage::X11_EXTENSION_NAME)?.is_some();
        if have_damage {
            conn.damage_query_version(1, 1)?.reply()?;
        }
        let have_sync = conn.extension_information(xsync::X11_EXTENSION_NAME)?.is_some();
        if have_sync {
            conn.sync_initialize(3, 1)?.reply()?;
        }

        Ok(Self {
            conn,
            atoms,
            root,
            root_depth,
            default_colormap,
            screen_size,
            wm_window: 0,
            have_randr,
            have_damage,
            have_sync,
            last_seen: 0,
            sync_seq: None,
        })
    }

    /// Take substructure redirect on the root. An Access error means another
    /// WM is running; that is fatal and leaves no partial setup behind.
    pub fn become_wm(&self) -> Result<(), XError> {
        let mask = EventMask::SUBSTRUCTURE_REDIRECT
            | EventMask::SUBSTRUCTURE_NOTIFY
            | EventMask::STRUCTURE_NOTIFY
            | EventMask::PROPERTY_CHANGE
            | EventMask::FOCUS_CHANGE
            | EventMask::BUTTON_PRESS
            | EventMask::ENTER_WINDOW
            | EventMask::LEAVE_WINDOW;
        let res = self
            .conn
            .change_window_attributes(self.root, &ChangeWindowAttributesAux::new().event_mask(mask))?
            .check();
        if let Err(ReplyError::X11Error(ref error)) = res {
            if error.error_kind == ErrorKind::Access {
                return Err(XError::WmRunning);
            }
        }
        res?;
        if self.have_randr {
            self.conn.randr_select_input(self.root, randr::NotifyMask::SCREEN_CHANGE)?;
        }
        Ok(())
    }

    /// Create the wm-check window, claim WM_S0, and publish `_NET_SUPPORTED`
    /// plus the supporting-check pair.
    pub fn announce(&mut self) -> Result<(), XError> {
        let win = self.conn.generate_id()?;
        self.conn.create_window(
            self.root_depth,
            win,
            self.root,
            -1,
            -1,
            1,
            1,
            0,
            WindowClass::INPUT_OUTPUT,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new().override_redirect(1),
        )?;
        self.conn.map_window(win)?;
        self.conn.set_selection_owner(win, self.atoms.WM_S0, x11rb::CURRENT_TIME)?;
        if self.conn.get_selection_owner(self.atoms.WM_S0)?.reply()?.owner != win {
            return Err(XError::WmRunning);
        }

        let supported = self.supported_atoms();
        self.conn.change_property32(
            PropMode::REPLACE,
            self.root,
            self.atoms._NET_SUPPORTED,
            AtomEnum::ATOM,
            &supported,
        )?;
        for target in [self.root, win] {
            self.conn.change_property32(
                PropMode::REPLACE,
                target,
                self.atoms._NET_SUPPORTING_WM_CHECK,
                AtomEnum::WINDOW,
                &[win],
            )?;
        }
        self.conn.change_property8(
            PropMode::REPLACE,
            win,
            self.atoms._NET_WM_NAME,
            self.atoms.UTF8_STRING,
            b"hxm",
        )?;
        self.conn.change_property32(
            PropMode::REPLACE,
            win,
            self.atoms._NET_WM_PID,
            AtomEnum::CARDINAL,
            &[std::process::id()],
        )?;
        self.wm_window = win;
        Ok(())
    }

    fn supported_atoms(&self) -> Vec<u32> {
        let a = &self.atoms;
        vec![
            a._NET_SUPPORTED,
            a._NET_SUPPORTING_WM_CHECK,
            a._NET_CLIENT_LIST,
            a._NET_CLIENT_LIST_STACKING,
            a._NET_ACTIVE_WINDOW,
            a._NET_CURRENT_DESKTOP,
            a._NET_NUMBER_OF_DESKTOPS,
            a._NET_DESKTOP_NAMES,
            a._NET_DESKTOP_GEOMETRY,
            a._NET_DESKTOP_VIEWPORT,
            a._NET_VIRTUAL_ROOTS,
            a._NET_WORKAREA,
            a._NET_SHOWING_DESKTOP,
            a._NET_WM_NAME,
            a._NET_WM_ICON_NAME,
            a._NET_WM_DESKTOP,
            a._NET_WM_STRUT,
            a._NET_WM_STRUT_PARTIAL,
            a._NET_FRAME_EXTENTS,
            a._NET_REQUEST_FRAME_EXTENTS,
            a._NET_WM_ALLOWED_ACTIONS,
            a._NET_WM_FULLSCREEN_MONITORS,
            a._NET_WM_WINDOW_OPACITY,
            a._NET_CLOSE_WINDOW,
            a._NET_WM_MOVERESIZE,
            a._NET_MOVERESIZE_WINDOW,
            a._NET_RESTACK_WINDOW,
            a._NET_WM_PING,
            a._NET_WM_SYNC_REQUEST,
            a._NET_WM_SYNC_REQUEST_COUNTER,
            a._NET_WM_WINDOW_TYPE,
            a._NET_WM_WINDOW_TYPE_DESKTOP,
            a._NET_WM_WINDOW_TYPE_DOCK,
            a._NET_WM_WINDOW_TYPE_TOOLBAR,
            a._NET_WM_WINDOW_TYPE_MENU,
            a._NET_WM_WINDOW_TYPE_UTILITY,
            a._NET_WM_WINDOW_TYPE_SPLASH,
            a._NET_WM_WINDOW_TYPE_DIALOG,
            a._NET_WM_WINDOW_TYPE_DROPDOWN_MENU,
            a._NET_WM_WINDOW_TYPE_POPUP_MENU,
            a._NET_WM_WINDOW_TYPE_TOOLTIP,
            a._NET_WM_WINDOW_TYPE_COMBO,
            a._NET_WM_WINDOW_TYPE_DND,
            a._NET_WM_WINDOW_TYPE_NOTIFICATION,
            a._NET_WM_WINDOW_TYPE_NORMAL,
            a._NET_WM_STATE,
            a._NET_WM_STATE_MODAL,
            a._NET_WM_STATE_STICKY,
            a._NET_WM_STATE_MAXIMIZED_VERT,
            a._NET_WM_STATE_MAXIMIZED_HORZ,
            a._NET_WM_STATE_SHADED,
            a._NET_WM_STATE_SKIP_TASKBAR,
            a._NET_WM_STATE_SKIP_PAGER,
            a._NET_WM_STATE_HIDDEN,
            a._NET_WM_STATE_FULLSCREEN,
            a._NET_WM_STATE_ABOVE,
            a._NET_WM_STATE_BELOW,
            a._NET_WM_STATE_DEMANDS_ATTENTION,
            a._NET_WM_STATE_FOCUSED,
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
        ]
    }

    /// Newest sequence the server is known to have processed.
    pub fn note_sequence(&mut self, seq: u64) {
        if seq > self.last_seen {
            self.last_seen = seq;
        }
    }

    pub fn confirmed(&self, seq: u64) -> bool {
        seq <= self.last_seen
    }

    /// Non-blocking event read; advances the sequence horizon.
    pub fn poll_event(&mut self) -> Result<Option<Event>, ConnectionError> {
        match self.conn.poll_for_event_with_sequence()? {
            Some((event, seq)) => {
                self.note_sequence(seq);
                Ok(Some(event))
            }
            None => Ok(None),
        }
    }

    /// Claim the reply or error for `seq` if the horizon proves it has
    /// arrived. `None` means still pending.
    pub fn harvest(&mut self, seq: u64) -> Result<Option<Harvest>, XError> {
        if !self.confirmed(seq) {
            return Ok(None);
        }
        match self.conn.wait_for_reply_or_raw_error(seq)? {
            ReplyOrError::Reply(buf) => Ok(Some(Harvest::Reply(buf.as_ref().to_vec()))),
            ReplyOrError::Error(buf) => {
                let err = self.conn.parse_error(buf.as_ref())?;
                Ok(Some(Harvest::Error(err)))
            }
        }
    }

    /// Drop all bookkeeping for an abandoned sequence.
    pub fn abandon(&self, seq: u64) {
        self.conn.discard_reply(seq, RequestKind::HasResponse, DiscardMode::DiscardReplyAndError);
    }

    /// Issue the end-of-tick sync point when the jar still has entries in
    /// flight. Its reply proves every earlier request was processed.
    pub fn ensure_sync_point(&mut self) -> Result<(), XError> {
        if self.sync_seq.is_none() {
            let cookie = self.conn.get_input_focus()?;
            self.sync_seq = Some(stash(cookie));
        }
        Ok(())
    }

    /// Retire an outstanding sync point. With `fd_ready` the socket woke us,
    /// so the tiny reply is either buffered already or one short read away.
    pub fn harvest_sync_point(&mut self, fd_ready: bool) -> Result<(), XError> {
        let Some(seq) = self.sync_seq else { return Ok(()) };
        if !fd_ready && !self.confirmed(seq) {
            return Ok(());
        }
        match self.conn.wait_for_reply_or_raw_error(seq) {
            Ok(_) => {}
            Err(err) => return Err(err.into()),
        }
        self.note_sequence(seq);
        self.sync_seq = None;
        Ok(())
    }

    pub fn flush(&self) -> Result<(), ConnectionError> {
        self.conn.flush()
    }
}
