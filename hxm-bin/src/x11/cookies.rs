// SPDX-License-Identifier: GPL-3.0-only

//! The cookie jar: every async X request whose reply the engine still
//! cares about, keyed by protocol sequence number.
//!
//! Open addressing with linear probing and backshift deletion, so probe
//! chains stay contiguous without tombstones. The drain is bounded work:
//! it walks from a rotating cursor and hands back at most `max_replies`
//! ready (or expired) entries per call, removing each entry before the
//! caller dispatches it so a handler can safely issue new cookies.

use std::time::{Duration, Instant};

use smallvec::SmallVec;

use super::Harvest;
use crate::model::Handle;

/// Abandonment window for in-flight requests.
pub const COOKIE_TIMEOUT: Duration = Duration::from_secs(5);

const MIN_CAPACITY: usize = 64;
const MAX_LOAD_PERCENT: usize = 70;

/// What kind of reply a jar entry is waiting for. The reply dispatcher
/// matches on this to pick the typed parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CookieKind {
    // pre-management probes (owner is None)
    AdoptAttributes,
    // PHASE1 fan-out and re-probes
    Attributes,
    Geometry,
    WmClass,
    WmName,
    NetWmName,
    WmIconName,
    NetWmIconName,
    WmHints,
    NormalHints,
    TransientFor,
    ColormapWindows,
    WmProtocols,
    ClientMachine,
    Command,
    NetWmState,
    WindowType,
    StrutPartial,
    StrutLegacy,
    Desktop,
    Pid,
    Icon,
    IconGeometry,
    UserTime,
    UserTimeWindow,
    SyncRequestCounter,
    SyncCounterValue,
    Opacity,
    FullscreenMonitors,
    MotifHints,
    GtkFrameExtents,
    // one-shots
    GrabPointer,
    RandrMonitors,
}

/// One in-flight request.
#[derive(Debug, Clone)]
pub struct CookieEntry {
    pub seq: u64,
    pub kind: CookieKind,
    /// owning client; `None` marks a pre-management probe
    pub owner: Option<Handle>,
    /// kind-specific payload (an xid, an atom, a button serial, ...)
    pub data: u64,
    pub issued_at: Instant,
    /// transaction id at issue time, compared against the client's
    /// newest applied transaction at dispatch
    pub txn: u64,
}

#[derive(Debug)]
pub struct CookieJar {
    slots: Vec<Option<CookieEntry>>,
    live: usize,
    scan_cursor: usize,
}

impl Default for CookieJar {
    fn default() -> Self {
        Self::with_capacity(MIN_CAPACITY)
    }
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        Self { slots: (0..capacity).map(|_| None).collect(), live: 0, scan_cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn mask(&self) -> usize {
        self.slots.len() - 1
    }

    fn home(&self, seq: u64) -> usize {
        seq as usize & self.mask()
    }

    /// Register an in-flight request. Re-inserting a sequence that is
    /// already present overwrites its metadata.
    pub fn insert(&mut self, entry: CookieEntry) {
        if (self.live + 1) * 100 >= self.slots.len() * MAX_LOAD_PERCENT {
            self.grow();
        }
        let mask = self.mask();
        let mut i = self.home(entry.seq);
        loop {
            match &self.slots[i] {
                Some(existing) if existing.seq == entry.seq => {
                    self.slots[i] = Some(entry);
                    return;
                }
                Some(_) => i = (i + 1) & mask,
                None => {
                    self.slots[i] = Some(entry);
                    self.live += 1;
                    return;
                }
            }
        }
    }

    pub fn contains(&self, seq: u64) -> bool {
        self.find(seq).is_some()
    }

    fn find(&self, seq: u64) -> Option<usize> {
        let mask = self.mask();
        let mut i = self.home(seq);
        loop {
            match &self.slots[i] {
                Some(entry) if entry.seq == seq => return Some(i),
                Some(_) => i = (i + 1) & mask,
                None => return None,
            }
        }
    }

    pub fn remove(&mut self, seq: u64) -> Option<CookieEntry> {
        self.find(seq).map(|i| self.remove_at(i))
    }

    /// Backshift deletion: pull successors in the probe chain back over the
    /// hole so lookups never need tombstones.
    fn remove_at(&mut self, mut i: usize) -> CookieEntry {
        let mask = self.mask();
        let removed = self.slots[i].take().expect("remove_at on empty slot");
        self.live -= 1;
        let mut j = i;
        loop {
            j = (j + 1) & mask;
            let Some(entry) = &self.slots[j] else { break };
            let home = self.home(entry.seq);
            let dist_home = j.wrapping_sub(home) & mask;
            let dist_hole = j.wrapping_sub(i) & mask;
            if dist_home >= dist_hole {
                self.slots[i] = self.slots[j].take();
                i = j;
            }
        }
        removed
    }

    fn grow(&mut self) {
        let mut bigger = Self::with_capacity(self.slots.len() * 2);
        for slot in self.slots.drain(..).flatten() {
            bigger.insert_unchecked(slot);
        }
        bigger.scan_cursor = self.scan_cursor & bigger.mask();
        *self = bigger;
    }

    fn insert_unchecked(&mut self, entry: CookieEntry) {
        let mask = self.mask();
        let mut i = self.home(entry.seq);
        while self.slots[i].is_some() {
            i = (i + 1) & mask;
        }
        self.slots[i] = Some(entry);
        self.live += 1;
    }

    /// Bounded, fair drain. `poll` is asked whether each visited sequence
    /// has a reply ready; ready and expired entries are removed and
    /// returned for dispatch, pending ones stay. The scan cursor rotates so
    /// no region of the table can starve.
    pub fn drain<E>(
        &mut self,
        now: Instant,
        max_replies: usize,
        mut poll: impl FnMut(u64) -> Result<Option<Harvest>, E>,
    ) -> Result<SmallVec<[(CookieEntry, Harvest); 8]>, E> {
        let mut out = SmallVec::new();
        if self.live == 0 {
            return Ok(out);
        }
        let capacity = self.slots.len();
        let mask = self.mask();
        let mut cursor = self.scan_cursor & mask;
        let mut visited = 0;
        while visited < capacity && out.len() < max_replies {
            let i = cursor;
            cursor = (cursor + 1) & mask;
            visited += 1;
            let Some(entry) = &self.slots[i] else { continue };
            let seq = entry.seq;
            if let Some(harvest) = poll(seq)? {
                let entry = self.remove_at(i);
                out.push((entry, harvest));
                // backshift may have pulled a successor into this slot
                cursor = i;
                continue;
            }
            if now.duration_since(entry.issued_at) >= COOKIE_TIMEOUT {
                let entry = self.remove_at(i);
                out.push((entry, Harvest::TimedOut));
                cursor = i;
            }
        }
        self.scan_cursor = cursor;
        Ok(out)
    }

    /// Probe-chain invariant: every live entry is reachable from its home
    /// slot without crossing an empty slot.
    #[cfg(test)]
    fn check_chains(&self) {
        let mask = self.mask();
        for (i, slot) in self.slots.iter().enumerate() {
            let Some(entry) = slot else { continue };
            let mut j = self.home(entry.seq);
            loop {
                assert!(self.slots[j].is_some(), "hole in probe chain for seq {}", entry.seq);
                if j == i {
                    break;
                }
                j = (j + 1) & mask;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(seq: u64) -> CookieEntry {
        CookieEntry {
            seq,
            kind: CookieKind::Geometry,
            owner: None,
            data: 0,
            issued_at: Instant::now(),
            txn: 0,
        }
    }

    #[test]
    fn insert_find_remove() {
        let mut jar = CookieJar::new();
        for seq in 0..40u64 {
            jar.insert(entry(seq));
        }
        assert_eq!(jar.len(), 40);
        jar.check_chains();
        assert!(jar.contains(17));
        assert_eq!(jar.remove(17).unwrap().seq, 17);
        assert!(!jar.contains(17));
        jar.check_chains();
    }

    #[test]
    fn overwrite_same_sequence_keeps_len() {
        let mut jar = CookieJar::new();
        jar.insert(entry(5));
        let mut updated = entry(5);
        updated.kind = CookieKind::WmClass;
        jar.insert(updated);
        assert_eq!(jar.len(), 1);
        assert_eq!(jar.remove(5).unwrap().kind, CookieKind::WmClass);
    }

    #[test]
    fn load_factor_bounded_after_inserts() {
        let mut jar = CookieJar::new();
        for seq in 0..1000u64 {
            jar.insert(entry(seq));
            assert!(jar.len() * 100 <= jar.capacity() * MAX_LOAD_PERCENT);
        }
        jar.check_chains();
    }

    #[test]
    fn colliding_sequences_survive_backshift() {
        let mut jar = CookieJar::new();
        let cap = jar.capacity() as u64;
        // all hash to the same home slot
        for k in 0..8u64 {
            jar.insert(entry(3 + k * cap));
        }
        jar.check_chains();
        jar.remove(3 + 2 * cap);
        jar.check_chains();
        for k in [0u64, 1, 3, 4, 5, 6, 7] {
            assert!(jar.contains(3 + k * cap), "lost seq after backshift");
        }
    }

    #[test]
    fn drain_is_bounded_and_fair() {
        let mut jar = CookieJar::new();
        let now = Instant::now();
        for seq in 0..10u64 {
            jar.insert(entry(seq));
        }
        // only sequences < 5 are ready; cap at 3 per call
        let ready =
            |seq: u64| -> Result<Option<Harvest>, ()> {
                Ok((seq < 5).then(|| Harvest::Reply(Vec::new())))
            };
        let first = jar.drain(now, 3, ready).unwrap();
        assert_eq!(first.len(), 3);
        let second = jar.drain(now, 3, ready).unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(jar.len(), 5);
        jar.check_chains();
    }

    #[test]
    fn expired_entries_time_out() {
        let mut jar = CookieJar::new();
        let mut old = entry(9);
        old.issued_at = Instant::now() - COOKIE_TIMEOUT - Duration::from_millis(1);
        jar.insert(old);
        jar.insert(entry(10));
        let out = jar
            .drain(Instant::now(), 16, |_| -> Result<Option<Harvest>, ()> { Ok(None) })
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0].1, Harvest::TimedOut));
        assert_eq!(out[0].0.seq, 9);
        assert_eq!(jar.len(), 1);
    }
}
