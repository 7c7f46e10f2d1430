// SPDX-License-Identifier: GPL-3.0-only

//! Reply dispatcher: every async reply (or its timeout/error) lands here.
//!
//! Contract: sentinel cookies (no owner) are pre-management probes and
//! handled first. Owned cookies resolve their client through the
//! generational handle; a client unmanaged while the reply was in flight
//! simply drops it. State-bearing replies older than the client's newest
//! applied transaction are stale and must not mutate anything, but they
//! still count toward PHASE1 settlement.

use tracing::{debug, warn};
use x11rb::connection::Connection;
use x11rb::properties::{WmHintsState, WmSizeHints, WmSizeHintsSpecification};
use x11rb::protocol::randr;
use x11rb::protocol::sync as xsync;
use x11rb::protocol::xproto::{
    ConnectionExt as _, GetGeometryReply, GetPropertyReply, GetWindowAttributesReply,
    GrabPointerReply, GrabStatus, MapState, Window, WindowClass,
};
use x11rb::x11_utils::TryParse;

use crate::model::{
    transient, ClientFlags, Dirty, Handle, Lifecycle, ManagePhase, Protocols, SizeHints, WinState,
    OPAQUE,
};
use crate::util::Rect;
use crate::wm::{interactive, manage, Wm};
use crate::x11::cookies::{CookieEntry, CookieKind};
use crate::x11::{props, Harvest};

fn parse<T: TryParse>(buf: &[u8]) -> Option<T> {
    T::try_parse(buf).ok().map(|(v, _)| v)
}

/// Property value bytes, `None` when the property is unset/typeless.
fn value(reply: &GetPropertyReply) -> Option<&[u8]> {
    (reply.type_ != 0 && reply.format != 0).then_some(reply.value.as_slice())
}

pub fn dispatch<C: Connection>(wm: &mut Wm<C>, entry: CookieEntry, harvest: Harvest) {
    if matches!(harvest, Harvest::Error(_)) {
        wm.counters.cookies_errored += 1;
        if let Harvest::Error(ref err) = harvest {
            debug!(kind = ?entry.kind, seq = entry.seq, error = ?err.error_kind, "async reply error");
        }
    }

    let Some(owner) = entry.owner else {
        sentinel(wm, &entry, harvest);
        return;
    };

    // client gone while the reply was in flight
    if wm.clients.hot(owner).is_none() {
        return;
    }

    let stale = is_state_bearing(entry.kind)
        && wm.clients.hot(owner).is_some_and(|hot| entry.txn < hot.applied_txn);
    if stale {
        wm.counters.stale_replies += 1;
    } else {
        match harvest {
            Harvest::Reply(buf) => owned_reply(wm, owner, &entry, &buf),
            Harvest::Error(_) | Harvest::TimedOut => owned_missing(wm, owner, &entry),
        }
        if is_state_bearing(entry.kind) {
            if let Some(hot) = wm.clients.hot_mut(owner) {
                if entry.txn > hot.applied_txn {
                    hot.applied_txn = entry.txn;
                }
            }
        }
    }

    // PHASE1 settlement; the commit phase observes READY and finishes
    if let Some(hot) = wm.clients.hot_mut(owner) {
        hot.pending_replies = hot.pending_replies.saturating_sub(1);
    }
}

/// Kinds whose replies mutate client state and therefore obey txn ordering.
fn is_state_bearing(kind: CookieKind) -> bool {
    !matches!(kind, CookieKind::GrabPointer | CookieKind::SyncCounterValue)
}

fn sentinel<C: Connection>(wm: &mut Wm<C>, entry: &CookieEntry, harvest: Harvest) {
    match (entry.kind, harvest) {
        (CookieKind::AdoptAttributes, Harvest::Reply(buf)) => {
            let window = entry.data as Window;
            let Some(attrs) = parse::<GetWindowAttributesReply>(&buf) else { return };
            if attrs.override_redirect || attrs.class == WindowClass::INPUT_ONLY {
                // unmanaged by design; let it show itself
                let _ = wm.x.conn.map_window(window);
            } else if let Err(err) = manage::manage_start(wm, window, false) {
                warn!(window, "manage start failed: {err}");
            }
        }
        (CookieKind::RandrMonitors, Harvest::Reply(buf)) => {
            let Some(reply) = parse::<randr::GetMonitorsReply>(&buf) else { return };
            wm.monitors = super::handlers::monitors_from_reply(&reply, wm.x.screen_size);
            super::handlers::refit_after_monitor_change(wm);
        }
        (kind, Harvest::TimedOut | Harvest::Error(_)) => {
            debug!(?kind, "sentinel probe abandoned");
        }
        _ => {}
    }
}

/// Timeout or error: apply the sensible default for the kind. During the
/// PHASE1 attribute probe this aborts the manage; every other missing
/// reply just settles its pending-reply slot.
fn owned_missing<C: Connection>(wm: &mut Wm<C>, h: Handle, entry: &CookieEntry) {
    match entry.kind {
        CookieKind::Attributes => {
            if let Some(hot) = wm.clients.hot_mut(h) {
                if hot.phase == ManagePhase::Phase1 {
                    hot.flags |= ClientFlags::MANAGE_ABORTED;
                }
            }
        }
        CookieKind::GrabPointer => {
            interactive::cancel_for(wm, h);
        }
        _ => {}
    }
}

fn owned_reply<C: Connection>(wm: &mut Wm<C>, h: Handle, entry: &CookieEntry, buf: &[u8]) {
    use CookieKind::*;
    match entry.kind {
        Attributes => {
            let Some(attrs) = parse::<GetWindowAttributesReply>(buf) else { return };
            let Some((hot, cold)) = wm.clients.pair_mut(h) else { return };
            if attrs.override_redirect || attrs.class == WindowClass::INPUT_ONLY {
                hot.flags |= ClientFlags::MANAGE_ABORTED;
            }
            if attrs.map_state == MapState::VIEWABLE {
                hot.flags |= ClientFlags::WAS_MAPPED;
            }
            cold.colormap = attrs.colormap;
        }
        Geometry => {
            let Some(geom) = parse::<GetGeometryReply>(buf) else { return };
            let Some(hot) = wm.clients.hot_mut(h) else { return };
            let rect =
                Rect::new(geom.x as i32, geom.y as i32, geom.width as u32, geom.height as u32);
            hot.server = rect;
            hot.desired = rect;
            hot.pending = rect;
            hot.border_width = geom.border_width;
        }
        GrabPointer => {
            let Some(reply) = parse::<GrabPointerReply>(buf) else { return };
            if reply.status == GrabStatus::SUCCESS {
                if let Some(drag) = wm.interactive.as_mut() {
                    if drag.handle == h {
                        drag.granted = true;
                    }
                }
            } else {
                debug!("pointer grab refused, canceling drag");
                interactive::cancel_for(wm, h);
            }
        }
        SyncCounterValue => {
            let Some(reply) = parse::<xsync::QueryCounterReply>(buf) else { return };
            if let Some(hot) = wm.clients.hot_mut(h) {
                hot.sync_value = ((reply.counter_value.hi as i64) << 32)
                    | (reply.counter_value.lo as i64);
            }
        }
        _ => {
            let Some(reply) = parse::<GetPropertyReply>(buf) else { return };
            property_reply(wm, h, entry, &reply);
        }
    }
}

fn property_reply<C: Connection>(
    wm: &mut Wm<C>,
    h: Handle,
    entry: &CookieEntry,
    reply: &GetPropertyReply,
) {
    use CookieKind::*;
    let val = value(reply);
    let a = wm.x.atoms;
    match entry.kind {
        WmClass => {
            if let Some((instance, class)) = val.and_then(props::parse_wm_class) {
                if let Some(cold) = wm.clients.cold_mut(h) {
                    cold.wm_class_instance = instance;
                    cold.wm_class_class = class;
                }
            }
        }
        NetWmName => match val.and_then(props::parse_utf8_text) {
            Some(title) => {
                if let Some(cold) = wm.clients.cold_mut(h) {
                    cold.title = title;
                    cold.title_is_ewmh = true;
                }
                mark(wm, h, Dirty::TITLE | Dirty::FRAME);
            }
            None => {
                if let Some(cold) = wm.clients.cold_mut(h) {
                    cold.title_is_ewmh = false;
                }
                // EWMH name missing or invalid: fall back to ICCCM
                let _ = wm.issue_probe(entry.data as Window, WmName, Some(h), entry.txn);
            }
        },
        WmName => {
            let ewmh = wm.clients.cold(h).is_some_and(|cold| cold.title_is_ewmh);
            if !ewmh {
                if let Some(title) = val.and_then(props::parse_latin1_text) {
                    if let Some(cold) = wm.clients.cold_mut(h) {
                        cold.title = title;
                    }
                    mark(wm, h, Dirty::TITLE | Dirty::FRAME);
                }
            }
        }
        NetWmIconName => match val.and_then(props::parse_utf8_text) {
            Some(name) => {
                if let Some(cold) = wm.clients.cold_mut(h) {
                    cold.icon_name = name;
                    cold.icon_name_is_ewmh = true;
                }
                mark(wm, h, Dirty::TITLE);
            }
            None => {
                if let Some(cold) = wm.clients.cold_mut(h) {
                    cold.icon_name_is_ewmh = false;
                }
                let _ = wm.issue_probe(entry.data as Window, WmIconName, Some(h), entry.txn);
            }
        },
        WmIconName => {
            let ewmh = wm.clients.cold(h).is_some_and(|cold| cold.icon_name_is_ewmh);
            if !ewmh {
                if let Some(name) = val.and_then(props::parse_latin1_text) {
                    if let Some(cold) = wm.clients.cold_mut(h) {
                        cold.icon_name = name;
                    }
                    mark(wm, h, Dirty::TITLE);
                }
            }
        }
        WmHints => {
            let hints = x11rb::properties::WmHints::from_reply(reply).ok().flatten();
            let Some((hot, cold)) = wm.clients.pair_mut(h) else { return };
            match hints {
                Some(hints) => {
                    cold.can_focus = hints.input.unwrap_or(true);
                    if matches!(hints.initial_state, Some(WmHintsState::Iconic)) {
                        hot.flags |= ClientFlags::START_ICONIC;
                    }
                    if hints.urgent {
                        hot.flags |= ClientFlags::URGENT;
                        hot.state |= WinState::DEMANDS_ATTENTION;
                    } else {
                        hot.flags -= ClientFlags::URGENT;
                        hot.state -= WinState::DEMANDS_ATTENTION;
                    }
                    hot.dirty |= Dirty::FRAME | Dirty::STATE;
                }
                None => {
                    cold.can_focus = true;
                }
            }
        }
        NormalHints => {
            let parsed = WmSizeHints::from_reply(reply).ok().flatten();
            let Some(hot) = wm.clients.hot_mut(h) else { return };
            match parsed {
                Some(sh) => {
                    let to_u = |p: (i32, i32)| (p.0.max(0) as u32, p.1.max(0) as u32);
                    hot.hints = SizeHints {
                        valid: true,
                        user_position: matches!(
                            sh.position,
                            Some((WmSizeHintsSpecification::UserSpecified, _, _))
                        ),
                        min: sh.min_size.map(to_u),
                        max: sh.max_size.map(to_u),
                        base: sh.base_size.map(to_u),
                        inc: sh.size_increment.map(to_u),
                        aspect: sh.aspect.map(|(min, max)| {
                            let ratio = |r: x11rb::properties::AspectRatio| {
                                if r.denominator != 0 {
                                    r.numerator as f64 / r.denominator as f64
                                } else {
                                    0.0
                                }
                            };
                            (ratio(min), ratio(max))
                        }),
                    };
                    hot.dirty |= Dirty::HINTS;
                    if hot.is_managed() {
                        hot.dirty |= Dirty::GEOM;
                    }
                }
                None => hot.hints = SizeHints::default(),
            }
        }
        TransientFor => {
            let Some(parent_xid) = val.and_then(props::parse_window) else { return };
            let parent = wm.client_of(parent_xid);
            match parent {
                Some(p) if p != h => {
                    transient::link(&mut wm.clients, h, p);
                    if let Some(hot) = wm.clients.hot_mut(h) {
                        if !hot.flags.contains(ClientFlags::TYPE_FROM_EWMH) {
                            hot.win_type = crate::model::WindowType::Dialog;
                        }
                    }
                }
                _ => {}
            }
        }
        ColormapWindows => {
            if let Some(cold) = wm.clients.cold_mut(h) {
                cold.colormap_windows = val.map(props::parse_window_list).unwrap_or_default();
            }
        }
        WmProtocols => {
            let mut protocols = Protocols::empty();
            if let Some(bytes) = val {
                for atom in props::parse_window_list(bytes) {
                    if atom == a.WM_DELETE_WINDOW {
                        protocols |= Protocols::DELETE_WINDOW;
                    } else if atom == a.WM_TAKE_FOCUS {
                        protocols |= Protocols::TAKE_FOCUS;
                    } else if atom == a._NET_WM_SYNC_REQUEST {
                        protocols |= Protocols::SYNC_REQUEST;
                    } else if atom == a._NET_WM_PING {
                        protocols |= Protocols::PING;
                    }
                }
            }
            if let Some(cold) = wm.clients.cold_mut(h) {
                cold.protocols = protocols;
            }
        }
        ClientMachine => {
            if let Some(text) = val.and_then(props::parse_latin1_text) {
                if let Some(cold) = wm.clients.cold_mut(h) {
                    cold.client_machine = text;
                }
            }
        }
        Command => {
            if let Some(bytes) = val {
                let text: String = bytes
                    .split(|b| *b == 0)
                    .filter(|part| !part.is_empty())
                    .map(|part| String::from_utf8_lossy(part).into_owned())
                    .collect::<Vec<_>>()
                    .join(" ");
                if let Some(cold) = wm.clients.cold_mut(h) {
                    cold.command = text;
                }
            }
        }
        NetWmState => {
            let Some(bytes) = val else { return };
            let parsed = props::parse_state_atoms(&a, bytes);
            if let Some(hot) = wm.clients.hot_mut(h) {
                // initial client-declared state; post-manage changes come
                // through client messages only
                if hot.phase == ManagePhase::Phase1 {
                    hot.state |= parsed
                        - (WinState::HIDDEN | WinState::FOCUSED);
                    hot.dirty |= Dirty::STATE;
                }
            }
        }
        WindowType => {
            let Some(win_type) = val.and_then(|bytes| props::parse_window_type(&a, bytes)) else {
                return;
            };
            if let Some(hot) = wm.clients.hot_mut(h) {
                hot.win_type = win_type;
                hot.flags |= ClientFlags::TYPE_FROM_EWMH;
                if win_type.unmanageable() && hot.phase == ManagePhase::Phase1 {
                    hot.flags |= ClientFlags::MANAGE_ABORTED;
                }
                hot.layer = manage::initial_layer(win_type, hot.state);
                if hot.is_managed() {
                    hot.dirty |= Dirty::STACK | Dirty::FRAME;
                }
            }
        }
        StrutPartial => {
            match val.and_then(props::parse_strut_partial) {
                Some(strut) => {
                    if let Some(cold) = wm.clients.cold_mut(h) {
                        cold.strut = (!strut.is_empty()).then_some(strut);
                        cold.strut_is_partial = true;
                    }
                    mark(wm, h, Dirty::STRUT);
                    wm.root_dirty = true;
                }
                None => {
                    if let Some(cold) = wm.clients.cold_mut(h) {
                        cold.strut_is_partial = false;
                    }
                    // waterfall to the legacy form
                    let _ = wm.issue_probe(entry.data as Window, StrutLegacy, Some(h), entry.txn);
                }
            }
        }
        StrutLegacy => {
            let partial = wm.clients.cold(h).is_some_and(|cold| cold.strut_is_partial);
            if !partial {
                let strut =
                    val.and_then(|bytes| props::parse_strut_legacy(bytes, wm.x.screen_size));
                if let Some(cold) = wm.clients.cold_mut(h) {
                    cold.strut = strut.filter(|s| !s.is_empty());
                }
                mark(wm, h, Dirty::STRUT);
                wm.root_dirty = true;
            }
        }
        Desktop => {
            let Some(hot) = wm.clients.hot_mut(h) else { return };
            match val.and_then(props::parse_cardinal) {
                Some(0xFFFF_FFFF) => {
                    hot.state |= WinState::STICKY;
                    hot.dirty |= Dirty::STATE;
                }
                Some(desk) => {
                    hot.desktop = desk.min(wm.desktop_count - 1);
                    hot.dirty |= Dirty::DESKTOP;
                }
                None => {
                    hot.desktop = wm.current_desktop;
                }
            }
        }
        Pid => {
            if let Some(pid) = val.and_then(props::parse_cardinal) {
                if let Some(cold) = wm.clients.cold_mut(h) {
                    cold.pid = pid;
                }
            }
        }
        Icon => {
            if let Some(icon) = val.and_then(props::parse_icon) {
                if let Some(cold) = wm.clients.cold_mut(h) {
                    cold.icon = Some(icon);
                }
                mark(wm, h, Dirty::FRAME);
            }
        }
        IconGeometry => {
            if let Some(hot) = wm.clients.hot_mut(h) {
                hot.icon_geometry = val.and_then(props::parse_icon_geometry);
            }
        }
        UserTime => {
            if let Some(time) = val.and_then(props::parse_cardinal) {
                if let Some(hot) = wm.clients.hot_mut(h) {
                    hot.user_time = time;
                }
            }
        }
        UserTimeWindow => {
            if let Some(win) = val.and_then(props::parse_window) {
                if let Some(hot) = wm.clients.hot_mut(h) {
                    hot.user_time_window = win;
                }
            }
        }
        SyncRequestCounter => {
            if let Some(counter) = val.and_then(props::parse_cardinal) {
                let enabled = wm
                    .clients
                    .cold(h)
                    .is_some_and(|cold| cold.protocols.contains(Protocols::SYNC_REQUEST));
                if let Some(hot) = wm.clients.hot_mut(h) {
                    hot.sync_counter = counter;
                    if enabled {
                        hot.flags |= ClientFlags::SYNC_ENABLED;
                    }
                }
                // chase the current counter value
                let _ = wm.issue_probe(counter, SyncCounterValue, Some(h), entry.txn);
            }
        }
        Opacity => {
            let opacity = val.and_then(props::parse_cardinal).unwrap_or(OPAQUE);
            if let Some(hot) = wm.clients.hot_mut(h) {
                if hot.opacity != opacity {
                    hot.opacity = opacity;
                    hot.dirty |= Dirty::OPACITY;
                }
            }
        }
        FullscreenMonitors => {
            if let Some(hot) = wm.clients.hot_mut(h) {
                hot.fullscreen_monitors = val.and_then(props::parse_fullscreen_monitors);
            }
        }
        MotifHints => {
            let decor = val.and_then(props::parse_motif_decor);
            if let Some(hot) = wm.clients.hot_mut(h) {
                if hot.motif_decor != decor {
                    hot.motif_decor = decor;
                    hot.dirty |= Dirty::FRAME | Dirty::GEOM;
                }
            }
        }
        GtkFrameExtents => {
            if let Some(hot) = wm.clients.hot_mut(h) {
                hot.gtk_extents = val.and_then(props::parse_gtk_frame_extents);
            }
        }
        AdoptAttributes | Attributes | Geometry | GrabPointer | SyncCounterValue
        | RandrMonitors => unreachable!("handled before property dispatch"),
    }
}

fn mark<C: Connection>(wm: &mut Wm<C>, h: Handle, dirty: Dirty) {
    if let Some(hot) = wm.clients.hot_mut(h) {
        if hot.lifecycle != Lifecycle::New {
            hot.dirty |= dirty;
        }
    }
}
