// SPDX-License-Identifier: GPL-3.0-only

//! Per-tick event buckets. Events read off the X fd are sorted into typed
//! buckets and coalesced where replay is not needed; the tick then
//! processes buckets in a fixed order regardless of arrival interleaving.

use std::collections::{HashMap, HashSet};

use x11rb::protocol::xproto::{
    Atom, ButtonPressEvent, ClientMessageEvent, ConfigureNotifyEvent, ConfigureRequestEvent,
    ConfigWindow, DestroyNotifyEvent, EnterNotifyEvent, KeyPressEvent, MapRequestEvent,
    MotionNotifyEvent, PropertyNotifyEvent, UnmapNotifyEvent, Window,
};
use x11rb::protocol::{randr, Event};

use crate::util::Rect;

/// Upper bound on raw events pulled off the transport per tick; the rest
/// stay queued in the connection for the next tick.
pub const MAX_EVENTS_PER_TICK: usize = 1024;

/// Lifecycle events need replay in arrival order.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Map(MapRequestEvent),
    Unmap(UnmapNotifyEvent),
    Destroy(DestroyNotifyEvent),
}

#[derive(Debug, Clone)]
pub struct ButtonEvent {
    pub press: bool,
    pub ev: ButtonPressEvent,
}

/// A coalesced ConfigureRequest: later requests overlay earlier ones
/// per field, tracked by the accumulated value mask.
#[derive(Debug, Clone, Copy, Default)]
pub struct PendingConfigure {
    pub mask: u16,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub border_width: u32,
    pub sibling: Window,
    pub stack_mode: u8,
}

impl PendingConfigure {
    pub fn overlay(&mut self, ev: &ConfigureRequestEvent) {
        let mask = u16::from(ev.value_mask);
        self.mask |= mask;
        if mask & u16::from(ConfigWindow::X) != 0 {
            self.x = ev.x as i32;
        }
        if mask & u16::from(ConfigWindow::Y) != 0 {
            self.y = ev.y as i32;
        }
        if mask & u16::from(ConfigWindow::WIDTH) != 0 {
            self.width = ev.width as u32;
        }
        if mask & u16::from(ConfigWindow::HEIGHT) != 0 {
            self.height = ev.height as u32;
        }
        if mask & u16::from(ConfigWindow::BORDER_WIDTH) != 0 {
            self.border_width = ev.border_width as u32;
        }
        if mask & u16::from(ConfigWindow::SIBLING) != 0 {
            self.sibling = ev.sibling;
        }
        if mask & u16::from(ConfigWindow::STACK_MODE) != 0 {
            self.stack_mode = u32::from(ev.stack_mode) as u8;
        }
    }

    pub fn has(&self, field: ConfigWindow) -> bool {
        self.mask & u16::from(field) != 0
    }
}

#[derive(Debug, Default)]
pub struct Buckets {
    pub lifecycle: Vec<LifecycleEvent>,
    pub keys: Vec<KeyPressEvent>,
    pub buttons: Vec<ButtonEvent>,
    pub messages: Vec<ClientMessageEvent>,
    pub expose: HashMap<Window, Rect>,
    pub configure_requests: HashMap<Window, PendingConfigure>,
    pub configure_notifies: HashMap<Window, ConfigureNotifyEvent>,
    pub properties: HashMap<(Window, Atom), PropertyNotifyEvent>,
    pub motion: HashMap<Window, MotionNotifyEvent>,
    pub enter: Option<EnterNotifyEvent>,
    pub leave: Option<EnterNotifyEvent>,
    pub damage: HashMap<u32, Rect>,
    pub randr_change: Option<randr::ScreenChangeNotifyEvent>,
    /// windows destroyed this tick; later handlers short-circuit on these
    pub destroyed: HashSet<Window>,
    pub ingested: u64,
    pub coalesced: u64,
    pub x_errors: u64,
}

impl Buckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for a new tick. Buffers keep their capacity.
    pub fn clear(&mut self) {
        self.lifecycle.clear();
        self.keys.clear();
        self.buttons.clear();
        self.messages.clear();
        self.expose.clear();
        self.configure_requests.clear();
        self.configure_notifies.clear();
        self.properties.clear();
        self.motion.clear();
        self.enter = None;
        self.leave = None;
        self.damage.clear();
        self.randr_change = None;
        self.destroyed.clear();
        self.ingested = 0;
        self.coalesced = 0;
        self.x_errors = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.ingested == 0
    }

    /// Sort one event into its bucket, applying the coalescing rule for its
    /// kind. Returns false once the per-tick budget is spent.
    pub fn ingest(&mut self, event: Event) -> bool {
        if self.ingested as usize >= MAX_EVENTS_PER_TICK {
            return false;
        }
        self.ingested += 1;
        match event {
            Event::MapRequest(ev) => self.lifecycle.push(LifecycleEvent::Map(ev)),
            Event::UnmapNotify(ev) => self.lifecycle.push(LifecycleEvent::Unmap(ev)),
            Event::DestroyNotify(ev) => {
                self.cancel_pending(ev.window);
                self.destroyed.insert(ev.window);
                self.lifecycle.push(LifecycleEvent::Destroy(ev));
            }
            Event::KeyPress(ev) => self.keys.push(ev),
            Event::ButtonPress(ev) => self.buttons.push(ButtonEvent { press: true, ev }),
            Event::ButtonRelease(ev) => self.buttons.push(ButtonEvent { press: false, ev }),
            Event::ClientMessage(ev) => self.messages.push(ev),
            Event::Expose(ev) => {
                let rect = Rect::new(ev.x as i32, ev.y as i32, ev.width as u32, ev.height as u32);
                let slot = self.expose.entry(ev.window).or_default();
                if !slot.is_empty() {
                    self.coalesced += 1;
                }
                *slot = slot.union(&rect);
            }
            Event::ConfigureRequest(ev) => {
                let slot = self.configure_requests.entry(ev.window).or_default();
                if slot.mask != 0 {
                    self.coalesced += 1;
                }
                slot.overlay(&ev);
            }
            Event::ConfigureNotify(ev) => {
                if self.configure_notifies.insert(ev.window, ev).is_some() {
                    self.coalesced += 1;
                }
            }
            Event::PropertyNotify(ev) => {
                if self.properties.insert((ev.window, ev.atom), ev).is_some() {
                    self.coalesced += 1;
                }
            }
            Event::MotionNotify(ev) => {
                if self.motion.insert(ev.event, ev).is_some() {
                    self.coalesced += 1;
                }
            }
            Event::EnterNotify(ev) => {
                if self.enter.replace(ev).is_some() {
                    self.coalesced += 1;
                }
            }
            Event::LeaveNotify(ev) => {
                if self.leave.replace(ev).is_some() {
                    self.coalesced += 1;
                }
            }
            Event::DamageNotify(ev) => {
                let rect = Rect::new(
                    ev.area.x as i32,
                    ev.area.y as i32,
                    ev.area.width as u32,
                    ev.area.height as u32,
                );
                let slot = self.damage.entry(ev.drawable).or_default();
                if !slot.is_empty() {
                    self.coalesced += 1;
                }
                *slot = slot.union(&rect);
            }
            Event::RandrScreenChangeNotify(ev) => {
                if self.randr_change.replace(ev).is_some() {
                    self.coalesced += 1;
                }
            }
            Event::Error(_) => {
                self.x_errors += 1;
            }
            _ => {}
        }
        true
    }

    /// A DestroyNotify arriving in the same tick cancels still-pending
    /// map/configure work for that window.
    fn cancel_pending(&mut self, window: Window) {
        self.lifecycle.retain(|ev| !matches!(ev, LifecycleEvent::Map(m) if m.window == window));
        self.configure_requests.remove(&window);
        self.configure_notifies.remove(&window);
        self.expose.remove(&window);
        self.motion.remove(&window);
        self.properties.retain(|(w, _), _| *w != window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use x11rb::protocol::xproto::{Property, StackMode};

    fn configure_request(window: Window, mask: ConfigWindow, x: i16, w: u16) -> Event {
        Event::ConfigureRequest(ConfigureRequestEvent {
            response_type: 23,
            stack_mode: StackMode::ABOVE,
            sequence: 0,
            parent: 1,
            window,
            sibling: 0,
            x,
            y: 0,
            width: w,
            height: 100,
            border_width: 0,
            value_mask: mask.into(),
        })
    }

    fn property_notify(window: Window, atom: Atom) -> Event {
        Event::PropertyNotify(PropertyNotifyEvent {
            response_type: 28,
            sequence: 0,
            window,
            atom,
            time: 0,
            state: Property::NEW_VALUE,
        })
    }

    #[test]
    fn configure_requests_overlay_per_field() {
        let mut buckets = Buckets::new();
        buckets.ingest(configure_request(7, ConfigWindow::X | ConfigWindow::WIDTH, 10, 300));
        buckets.ingest(configure_request(7, ConfigWindow::WIDTH, 0, 500));
        let pending = &buckets.configure_requests[&7];
        assert!(pending.has(ConfigWindow::X));
        assert!(pending.has(ConfigWindow::WIDTH));
        assert_eq!(pending.x, 10);
        assert_eq!(pending.width, 500);
        assert_eq!(buckets.coalesced, 1);
        assert_eq!(buckets.ingested, 2);
    }

    #[test]
    fn property_notify_keeps_last_per_window_atom() {
        let mut buckets = Buckets::new();
        buckets.ingest(property_notify(3, 100));
        buckets.ingest(property_notify(3, 100));
        buckets.ingest(property_notify(3, 101));
        assert_eq!(buckets.properties.len(), 2);
        // ingested == kept + coalesced
        assert_eq!(buckets.ingested, 3);
        assert_eq!(buckets.coalesced, 1);
    }

    #[test]
    fn destroy_cancels_pending_map_and_configure() {
        let mut buckets = Buckets::new();
        buckets.ingest(Event::MapRequest(MapRequestEvent {
            response_type: 20,
            sequence: 0,
            parent: 1,
            window: 9,
        }));
        buckets.ingest(configure_request(9, ConfigWindow::X, 5, 10));
        buckets.ingest(Event::DestroyNotify(DestroyNotifyEvent {
            response_type: 17,
            sequence: 0,
            event: 1,
            window: 9,
        }));
        assert!(buckets.configure_requests.is_empty());
        assert!(buckets.destroyed.contains(&9));
        assert_eq!(buckets.lifecycle.len(), 1);
        assert!(matches!(buckets.lifecycle[0], LifecycleEvent::Destroy(_)));
    }

    #[test]
    fn ingest_budget_is_enforced() {
        let mut buckets = Buckets::new();
        for i in 0..MAX_EVENTS_PER_TICK + 10 {
            let accepted = buckets.ingest(property_notify(i as Window, 1));
            if i < MAX_EVENTS_PER_TICK {
                assert!(accepted);
            } else {
                assert!(!accepted);
            }
        }
        assert_eq!(buckets.ingested as usize, MAX_EVENTS_PER_TICK);
    }
}
