// SPDX-License-Identifier: GPL-3.0-only

//! Generational slot store for client records.
//!
//! Handles are `{slot index, generation}` packed into 64 bits. A freed slot
//! bumps its generation, so every handle that pointed at it resolves to
//! nothing from then on; late X replies that still carry such a handle are
//! dropped at lookup instead of corrupting a recycled slot.
//!
//! Hot and cold halves of a record live in parallel vectors: the hot half
//! is touched every tick and stays inline, the cold half is boxed and only
//! materialized while the slot is live.

use x11rb::protocol::xproto::Window;

use super::client::{ClientCold, ClientHot};

/// Stable reference to a client slot. Never dangles: resolution checks the
/// generation stored in the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    pub fn bits(self) -> u64 {
        (self.index as u64) << 32 | self.generation as u64
    }

    pub fn from_bits(bits: u64) -> Self {
        Self { index: (bits >> 32) as u32, generation: bits as u32 }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    live: bool,
}

#[derive(Debug, Default)]
pub struct ClientMap {
    meta: Vec<Slot>,
    hot: Vec<ClientHot>,
    cold: Vec<Option<Box<ClientCold>>>,
    free: Vec<u32>,
    live: usize,
}

impl ClientMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    /// Allocate a slot for a new client window. Reuses freed slots; their
    /// generation was already bumped at free time.
    pub fn alloc(&mut self, xid: Window) -> Handle {
        let index = match self.free.pop() {
            Some(i) => i,
            None => {
                self.meta.push(Slot { generation: 1, live: false });
                self.hot.push(ClientHot::new(0));
                self.cold.push(None);
                (self.meta.len() - 1) as u32
            }
        };
        let i = index as usize;
        debug_assert!(!self.meta[i].live);
        self.meta[i].live = true;
        self.hot[i] = ClientHot::new(xid);
        self.cold[i] = Some(Box::default());
        self.live += 1;
        Handle { index, generation: self.meta[i].generation }
    }

    /// Release a slot, invalidating every outstanding handle for it. The
    /// cold record (and all its strings) drops here.
    pub fn free(&mut self, h: Handle) -> bool {
        if !self.contains(h) {
            return false;
        }
        let i = h.index();
        self.meta[i].live = false;
        self.meta[i].generation = self.meta[i].generation.wrapping_add(1);
        self.cold[i] = None;
        self.free.push(h.index);
        self.live -= 1;
        true
    }

    pub fn contains(&self, h: Handle) -> bool {
        self.meta
            .get(h.index())
            .map(|s| s.live && s.generation == h.generation)
            .unwrap_or(false)
    }

    pub fn hot(&self, h: Handle) -> Option<&ClientHot> {
        self.contains(h).then(|| &self.hot[h.index()])
    }

    pub fn hot_mut(&mut self, h: Handle) -> Option<&mut ClientHot> {
        self.contains(h).then(|| &mut self.hot[h.index()])
    }

    pub fn cold(&self, h: Handle) -> Option<&ClientCold> {
        self.contains(h).then(|| self.cold[h.index()].as_deref().unwrap())
    }

    pub fn cold_mut(&mut self, h: Handle) -> Option<&mut ClientCold> {
        self.contains(h).then(|| self.cold[h.index()].as_deref_mut().unwrap())
    }

    pub fn pair_mut(&mut self, h: Handle) -> Option<(&mut ClientHot, &mut ClientCold)> {
        if !self.contains(h) {
            return None;
        }
        let i = h.index();
        Some((&mut self.hot[i], self.cold[i].as_deref_mut().unwrap()))
    }

    /// Handles of all live slots, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = Handle> + '_ {
        self.meta.iter().enumerate().filter(|(_, s)| s.live).map(|(i, s)| Handle {
            index: i as u32,
            generation: s.generation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_resolve_free() {
        let mut map = ClientMap::new();
        let h = map.alloc(0x100);
        assert_eq!(map.len(), 1);
        assert_eq!(map.hot(h).unwrap().xid, 0x100);
        assert!(map.cold(h).is_some());
        assert!(map.free(h));
        assert_eq!(map.len(), 0);
        assert!(map.hot(h).is_none());
        assert!(!map.free(h));
    }

    #[test]
    fn stale_handle_after_reuse_misses() {
        let mut map = ClientMap::new();
        let h1 = map.alloc(0x100);
        map.free(h1);
        let h2 = map.alloc(0x200);
        // same slot, new generation
        assert_eq!(h1.index(), h2.index());
        assert!(map.hot(h1).is_none());
        assert_eq!(map.hot(h2).unwrap().xid, 0x200);
    }

    #[test]
    fn handle_bits_round_trip() {
        let mut map = ClientMap::new();
        map.alloc(1);
        let h = map.alloc(2);
        assert_eq!(Handle::from_bits(h.bits()), h);
    }

    #[test]
    fn iter_visits_only_live() {
        let mut map = ClientMap::new();
        let a = map.alloc(1);
        let b = map.alloc(2);
        let c = map.alloc(3);
        map.free(b);
        let seen: Vec<_> = map.iter().collect();
        assert_eq!(seen, vec![a, c]);
        for h in seen {
            assert!(map.contains(h));
        }
    }
}
