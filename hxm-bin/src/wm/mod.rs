// SPDX-License-Identifier: GPL-3.0-only

//! The window manager context and the tick engine driver.
//!
//! One tick: drain ready cookies, ingest and coalesce events, process the
//! buckets in fixed order, flush dirty state, write the transport once.
//! The in-memory model is the single source of truth; X is treated as I/O.

pub mod bindings;
pub mod commit;
pub mod decor;
pub mod focus;
pub mod handlers;
pub mod interactive;
pub mod manage;
pub mod placement;
pub mod reply;
pub mod stacking;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use x11rb::connection::Connection;
use x11rb::protocol::randr::ConnectionExt as _;
use x11rb::protocol::sync::ConnectionExt as _;
use x11rb::protocol::xproto::{
    AtomEnum, ChangeWindowAttributesAux, ConnectionExt as _, EventMask, MapState, Window,
    WindowClass,
};
use x11rb::wrapper::ConnectionExt as _;

use hxm_config::Config;

use crate::diag::Counters;
use crate::model::{ClientMap, Handle, Lifecycle, ManagePhase};
use crate::monitor::Monitors;
use crate::util::RateGate;
use crate::x11::cookies::{CookieEntry, CookieJar, CookieKind};
use crate::x11::events::Buckets;
use crate::x11::{stash, XConn, XError};

use self::bindings::Bindings;
use self::decor::Decor;
use self::focus::FocusState;
use self::interactive::Drag;
use self::stacking::Stacking;

/// Ready-reply budget per jar drain.
const MAX_REPLIES_PER_TICK: usize = 64;
/// Interactive geometry flushes are paced to roughly this period.
pub const INTERACTIVE_FLUSH_PERIOD: Duration = Duration::from_millis(16);

pub struct Wm<C: Connection> {
    pub x: XConn<C>,
    pub config: Config,
    pub clients: ClientMap,
    pub window_to_client: HashMap<Window, Handle>,
    pub frame_to_client: HashMap<Window, Handle>,
    pub jar: CookieJar,
    pub buckets: Buckets,
    pub stacking: Stacking,
    pub focus: FocusState,
    pub monitors: Monitors,
    /// append-ordered mapping list backing `_NET_CLIENT_LIST`
    pub mapping_order: Vec<Handle>,
    pub current_desktop: u32,
    pub desktop_count: u32,
    pub desktop_names: Vec<String>,
    pub showing_desktop: bool,
    pub counters: Counters,
    pub interactive: Option<Drag>,
    pub bindings: Bindings,
    pub decor: Decor,
    pub in_commit_phase: bool,
    /// root properties need republishing at the end of this tick
    pub root_dirty: bool,
    pub shutdown: bool,
    pub reload_pending: bool,
    pub restart_pending: bool,
    pub dump_stats_pending: bool,
    /// the X fd woke this dispatch cycle
    pub fd_ready: bool,
    pub interactive_gate: RateGate,
    /// deadline for a timer-driven re-flush of gated interactive geometry
    pub wakeup_at: Option<Instant>,
    pub last_pointer: (i32, i32),
    txn_counter: u64,
}

impl<C: Connection> Wm<C> {
    pub fn new(x: XConn<C>, config: Config) -> Self {
        let desktop_count = config.desktop_count();
        let desktop_names = config.desktops.clone();
        let monitors = Monitors::single(x.screen_size.0, x.screen_size.1);
        Self {
            x,
            config,
            clients: ClientMap::new(),
            window_to_client: HashMap::new(),
            frame_to_client: HashMap::new(),
            jar: CookieJar::new(),
            buckets: Buckets::new(),
            stacking: Stacking::new(),
            focus: FocusState::new(),
            monitors,
            mapping_order: Vec::new(),
            current_desktop: 0,
            desktop_count,
            desktop_names,
            showing_desktop: false,
            counters: Counters::default(),
            interactive: None,
            bindings: Bindings::new(),
            decor: Decor::new(),
            in_commit_phase: false,
            root_dirty: true,
            shutdown: false,
            reload_pending: false,
            restart_pending: false,
            dump_stats_pending: false,
            fd_ready: false,
            interactive_gate: RateGate::new(INTERACTIVE_FLUSH_PERIOD),
            wakeup_at: None,
            last_pointer: (0, 0),
            txn_counter: 0,
        }
    }

    /// Init after become_wm: announce, restore restart continuity, probe
    /// monitors, install key grabs, adopt pre-existing windows. Round trips
    /// are allowed here.
    pub fn init(&mut self) -> Result<(), XError> {
        self.x.announce()?;
        self.decor.init(&self.x)?;
        let pointer = self.x.conn.query_pointer(self.x.root)?.reply()?;
        self.last_pointer = (pointer.root_x as i32, pointer.root_y as i32);
        self.refresh_monitors_sync()?;
        self.bindings.install(&self.x, &self.config)?;
        self.restore_restart_data()?;
        self.publish_desktop_statics()?;
        self.scan_existing()?;
        self.x.flush()?;
        Ok(())
    }

    /// One engine tick. `fd_ready` says the X fd woke us (vs timer/signal).
    pub fn tick(&mut self, fd_ready: bool) -> Result<(), XError> {
        let now = Instant::now();
        self.counters.ticks += 1;

        if let Err(err) = self.x.harvest_sync_point(fd_ready) {
            return self.absorb(err);
        }

        // 1. settle async replies
        if let Err(err) = self.drain_cookies(now) {
            return self.absorb(err);
        }

        // 2. bounded ingest + coalesce
        self.buckets.clear();
        loop {
            match self.x.poll_event() {
                Ok(Some(event)) => {
                    if !self.buckets.ingest(event) {
                        self.counters.events_dropped += 1;
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => return self.absorb(err.into()),
            }
        }
        self.counters.events_ingested += self.buckets.ingested;
        self.counters.events_coalesced += self.buckets.coalesced;
        self.counters.x_errors += self.buckets.x_errors;

        // 3. fixed-order processing
        if let Err(err) = handlers::process(self) {
            self.absorb::<()>(err).ok();
        }

        // 4. commit dirty model state
        if let Err(err) = commit::flush_dirty(self, now) {
            self.absorb::<()>(err).ok();
        }

        if self.dump_stats_pending {
            self.dump_stats_pending = false;
            self.counters.dump();
        }

        // 5. one flush per tick
        if !self.jar.is_empty() {
            if let Err(err) = self.x.ensure_sync_point() {
                return self.absorb(err);
            }
        }
        if let Err(err) = self.x.flush() {
            return self.absorb(err.into());
        }
        Ok(())
    }

    /// Recoverable errors are logged and absorbed; a dead connection stops
    /// the loop cleanly.
    fn absorb<T: Default>(&mut self, err: XError) -> Result<T, XError> {
        match err {
            XError::Connection(_) => {
                warn!("X connection lost: {err}");
                self.shutdown = true;
                Ok(T::default())
            }
            other => {
                debug!("absorbed X error: {other}");
                Ok(T::default())
            }
        }
    }

    fn drain_cookies(&mut self, now: Instant) -> Result<(), XError> {
        let ready = {
            let x = &mut self.x;
            self.jar.drain(now, MAX_REPLIES_PER_TICK, |seq| x.harvest(seq))?
        };
        for (entry, harvest) in ready {
            self.counters.cookies_harvested += 1;
            if matches!(harvest, crate::x11::Harvest::TimedOut) {
                self.counters.cookies_timed_out += 1;
                self.x.abandon(entry.seq);
            }
            reply::dispatch(self, entry, harvest);
        }
        Ok(())
    }

    pub fn next_txn(&mut self) -> u64 {
        self.txn_counter += 1;
        self.txn_counter
    }

    /// Bump a client's transaction id; replies issued before this point
    /// become stale for state-bearing kinds.
    pub fn bump_txn(&mut self, h: Handle) {
        let txn = self.next_txn();
        if let Some(hot) = self.clients.hot_mut(h) {
            hot.applied_txn = txn;
        }
    }

    pub fn client_of(&self, window: Window) -> Option<Handle> {
        self.window_to_client
            .get(&window)
            .or_else(|| self.frame_to_client.get(&window))
            .copied()
    }

    /// Register one async probe in the jar. `owner == Some` counts toward
    /// the client's pending replies.
    pub fn issue_probe(
        &mut self,
        window: Window,
        kind: CookieKind,
        owner: Option<Handle>,
        txn: u64,
    ) -> Result<(), XError> {
        use CookieKind::*;
        let a = self.x.atoms;
        let conn = &self.x.conn;
        let prop = |p: u32, t: u32, len: u32| conn.get_property(false, window, p, t, 0, len);
        let any = u32::from(AtomEnum::ANY);
        let atom = u32::from(AtomEnum::ATOM);
        let cardinal = u32::from(AtomEnum::CARDINAL);
        let win_t = u32::from(AtomEnum::WINDOW);
        let string = u32::from(AtomEnum::STRING);
        let seq = match kind {
            AdoptAttributes | Attributes => stash(conn.get_window_attributes(window)?),
            Geometry => stash(conn.get_geometry(window)?),
            WmClass => stash(prop(u32::from(AtomEnum::WM_CLASS), string, 1024)?),
            WmName => stash(prop(u32::from(AtomEnum::WM_NAME), any, 1024)?),
            NetWmName => stash(prop(a._NET_WM_NAME, a.UTF8_STRING, 1024)?),
            WmIconName => stash(prop(u32::from(AtomEnum::WM_ICON_NAME), any, 1024)?),
            NetWmIconName => stash(prop(a._NET_WM_ICON_NAME, a.UTF8_STRING, 1024)?),
            WmHints => stash(prop(u32::from(AtomEnum::WM_HINTS), u32::from(AtomEnum::WM_HINTS), 9)?),
            NormalHints => stash(prop(
                u32::from(AtomEnum::WM_NORMAL_HINTS),
                u32::from(AtomEnum::WM_SIZE_HINTS),
                18,
            )?),
            TransientFor => stash(prop(u32::from(AtomEnum::WM_TRANSIENT_FOR), win_t, 1)?),
            ColormapWindows => stash(prop(a.WM_COLORMAP_WINDOWS, win_t, 64)?),
            WmProtocols => stash(prop(a.WM_PROTOCOLS, atom, 32)?),
            ClientMachine => stash(prop(a.WM_CLIENT_MACHINE, any, 256)?),
            Command => stash(prop(u32::from(AtomEnum::WM_COMMAND), any, 256)?),
            NetWmState => stash(prop(a._NET_WM_STATE, atom, 32)?),
            WindowType => stash(prop(a._NET_WM_WINDOW_TYPE, atom, 32)?),
            StrutPartial => stash(prop(a._NET_WM_STRUT_PARTIAL, cardinal, 12)?),
            StrutLegacy => stash(prop(a._NET_WM_STRUT, cardinal, 4)?),
            Desktop => stash(prop(a._NET_WM_DESKTOP, cardinal, 1)?),
            Pid => stash(prop(a._NET_WM_PID, cardinal, 1)?),
            Icon => stash(prop(a._NET_WM_ICON, cardinal, 1 << 22)?),
            IconGeometry => stash(prop(a._NET_WM_ICON_GEOMETRY, cardinal, 4)?),
            UserTime => stash(prop(a._NET_WM_USER_TIME, cardinal, 1)?),
            UserTimeWindow => stash(prop(a._NET_WM_USER_TIME_WINDOW, win_t, 1)?),
            SyncRequestCounter => stash(prop(a._NET_WM_SYNC_REQUEST_COUNTER, cardinal, 1)?),
            SyncCounterValue => {
                // `window` carries the counter id for this kind
                stash(conn.sync_query_counter(window)?)
            }
            Opacity => stash(prop(a._NET_WM_WINDOW_OPACITY, cardinal, 1)?),
            FullscreenMonitors => stash(prop(a._NET_WM_FULLSCREEN_MONITORS, cardinal, 4)?),
            MotifHints => stash(prop(a._MOTIF_WM_HINTS, any, 5)?),
            GtkFrameExtents => stash(prop(a._GTK_FRAME_EXTENTS, cardinal, 4)?),
            GrabPointer | RandrMonitors => unreachable!("issued by their own helpers"),
        };
        self.counters.cookies_issued += 1;
        self.jar.insert(CookieEntry {
            seq,
            kind,
            owner,
            data: window as u64,
            issued_at: Instant::now(),
            txn,
        });
        if let Some(h) = owner {
            if let Some(hot) = self.clients.hot_mut(h) {
                hot.pending_replies += 1;
            }
        }
        Ok(())
    }

    /// Async monitor refresh via the jar (RandR change handling).
    pub fn refresh_monitors_async(&mut self) -> Result<(), XError> {
        if !self.x.have_randr {
            self.monitors = Monitors::single(self.x.screen_size.0, self.x.screen_size.1);
            self.root_dirty = true;
            return Ok(());
        }
        let seq = stash(self.x.conn.randr_get_monitors(self.x.root, true)?);
        self.counters.cookies_issued += 1;
        self.jar.insert(CookieEntry {
            seq,
            kind: CookieKind::RandrMonitors,
            owner: None,
            data: 0,
            issued_at: Instant::now(),
            txn: 0,
        });
        Ok(())
    }

    fn refresh_monitors_sync(&mut self) -> Result<(), XError> {
        if !self.x.have_randr {
            self.monitors = Monitors::single(self.x.screen_size.0, self.x.screen_size.1);
            return Ok(());
        }
        let reply = self.x.conn.randr_get_monitors(self.x.root, true)?.reply()?;
        self.monitors = crate::wm::handlers::monitors_from_reply(&reply, self.x.screen_size);
        Ok(())
    }

    /// Adopt windows that existed before the WM started. Synchronous; only
    /// runs at init.
    fn scan_existing(&mut self) -> Result<(), XError> {
        let tree = self.x.conn.query_tree(self.x.root)?.reply()?;
        for window in tree.children {
            if window == self.x.wm_window {
                continue;
            }
            let attrs = match self.x.conn.get_window_attributes(window)?.reply() {
                Ok(attrs) => attrs,
                Err(_) => continue,
            };
            if attrs.override_redirect
                || attrs.class == WindowClass::INPUT_ONLY
                || attrs.map_state != MapState::VIEWABLE
            {
                continue;
            }
            debug!(window, "adopting existing window");
            manage::manage_start(self, window, true)?;
        }
        Ok(())
    }

    /// Restore desktop and focus hints a previous instance left across
    /// `--restart`, then delete the property.
    fn restore_restart_data(&mut self) -> Result<(), XError> {
        let reply = self
            .x
            .conn
            .get_property(
                false,
                self.x.root,
                self.x.atoms._HXM_RESTART_DATA,
                AtomEnum::CARDINAL,
                0,
                2,
            )?
            .reply()?;
        if let Some(mut values) = reply.value32() {
            if let Some(desktop) = values.next() {
                self.current_desktop = desktop.min(self.desktop_count.saturating_sub(1));
            }
            // the focused window is re-resolved after adoption, see scan
        }
        self.x.conn.delete_property(self.x.root, self.x.atoms._HXM_RESTART_DATA)?;
        Ok(())
    }

    /// Desktop-count/name/viewport properties that only change on
    /// reconfigure.
    pub fn publish_desktop_statics(&mut self) -> Result<(), XError> {
        let a = self.x.atoms;
        let conn = &self.x.conn;
        conn.change_property32(
            x11rb::protocol::xproto::PropMode::REPLACE,
            self.x.root,
            a._NET_NUMBER_OF_DESKTOPS,
            AtomEnum::CARDINAL,
            &[self.desktop_count],
        )?;
        let mut names = Vec::new();
        for name in &self.desktop_names {
            names.extend_from_slice(name.as_bytes());
            names.push(0);
        }
        conn.change_property8(
            x11rb::protocol::xproto::PropMode::REPLACE,
            self.x.root,
            a._NET_DESKTOP_NAMES,
            a.UTF8_STRING,
            &names,
        )?;
        let (w, h) = self.x.screen_size;
        conn.change_property32(
            x11rb::protocol::xproto::PropMode::REPLACE,
            self.x.root,
            a._NET_DESKTOP_GEOMETRY,
            AtomEnum::CARDINAL,
            &[w as u32, h as u32],
        )?;
        let viewports: Vec<u32> = (0..self.desktop_count).flat_map(|_| [0, 0]).collect();
        conn.change_property32(
            x11rb::protocol::xproto::PropMode::REPLACE,
            self.x.root,
            a._NET_DESKTOP_VIEWPORT,
            AtomEnum::CARDINAL,
            &viewports,
        )?;
        conn.change_property32(
            x11rb::protocol::xproto::PropMode::REPLACE,
            self.x.root,
            a._NET_VIRTUAL_ROOTS,
            AtomEnum::WINDOW,
            &[],
        )?;
        self.root_dirty = true;
        Ok(())
    }

    /// Reload configuration (SIGHUP or config file change).
    pub fn reconfigure(&mut self) {
        let config = Config::load();
        self.desktop_count = config.desktop_count();
        self.desktop_names = config.desktops.clone();
        if self.current_desktop >= self.desktop_count {
            self.current_desktop = self.desktop_count - 1;
        }
        self.config = config;
        if let Err(err) = self.bindings.install(&self.x, &self.config) {
            warn!("rebinding keys failed: {err}");
        }
        if let Err(err) = self.publish_desktop_statics() {
            warn!("republishing desktop properties failed: {err}");
        }
        self.root_dirty = true;
        debug!("configuration reloaded");
    }

    /// Write restart continuity data; the exec happens in main after the
    /// loop unwinds.
    pub fn prepare_restart(&mut self) -> Result<(), XError> {
        let focused_xid = self
            .focus
            .focused
            .and_then(|h| self.clients.hot(h))
            .map(|hot| hot.xid)
            .unwrap_or(0);
        self.x.conn.change_property32(
            x11rb::protocol::xproto::PropMode::REPLACE,
            self.x.root,
            self.x.atoms._HXM_RESTART_DATA,
            AtomEnum::CARDINAL,
            &[self.current_desktop, focused_xid],
        )?;
        self.x.flush()?;
        Ok(())
    }

    /// Orderly teardown: reparent every client back to root and drop the
    /// redirect. Called on exit, skipped on restart (the save-set carries
    /// clients across the exec).
    pub fn teardown(&mut self) {
        let handles: Vec<Handle> = self.clients.iter().collect();
        for h in handles {
            if let Err(err) = manage::unmanage(self, h, true) {
                debug!("teardown unmanage failed: {err}");
            }
        }
        let _ = self.x.conn.change_window_attributes(
            self.x.root,
            &ChangeWindowAttributesAux::new().event_mask(EventMask::NO_EVENT),
        );
        if self.x.wm_window != 0 {
            let _ = self.x.conn.destroy_window(self.x.wm_window);
        }
        let _ = self.x.flush();
    }

    /// PHASE1 completion check, run by the commit phase: clients whose
    /// probes all settled become READY (or abort).
    pub fn promote_ready(&mut self) -> Vec<Handle> {
        let mut ready = Vec::new();
        for h in self.clients.iter().collect::<Vec<_>>() {
            let Some(hot) = self.clients.hot_mut(h) else { continue };
            if hot.phase == ManagePhase::Phase1
                && hot.lifecycle == Lifecycle::New
                && hot.pending_replies == 0
            {
                hot.lifecycle = Lifecycle::Ready;
                ready.push(h);
            }
        }
        ready
    }
}
