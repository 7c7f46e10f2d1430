// SPDX-License-Identifier: GPL-3.0-only

//! Stacking manager: one ordered vector of handles per layer, bottom to
//! top. The vectors and the per-client `stacking_layer`/`stacking_index`
//! back-pointers are the authoritative order; X restacks are deferred to
//! the commit phase, which anchors each dirty window below its in-model
//! neighbor.

use tracing::warn;

use crate::model::transient;
use crate::model::{ClientMap, Dirty, Handle, Layer};

/// Transient-propagation recursion guard.
const MAX_STACK_DEPTH: usize = 256;

/// Where the commit phase should anchor a window when syncing its order
/// to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// configure with SIBLING + ABOVE: place just above this handle
    AboveSibling(Handle),
    /// configure with SIBLING + BELOW: place just below this handle
    BelowSibling(Handle),
    /// no neighbor at all: raw ABOVE
    TopRaw,
}

#[derive(Debug, Default)]
pub struct Stacking {
    layers: [Vec<Handle>; Layer::COUNT],
}

impl Stacking {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(&self, layer: Layer) -> &[Handle] {
        &self.layers[layer.index()]
    }

    /// All handles bottom-up across layers, for
    /// `_NET_CLIENT_LIST_STACKING`.
    pub fn bottom_up(&self) -> impl Iterator<Item = Handle> + '_ {
        self.layers.iter().flat_map(|v| v.iter().copied())
    }

    pub fn contains(&self, clients: &ClientMap, h: Handle) -> bool {
        self.position(clients, h).is_some()
    }

    /// Authoritative position: trust the back-pointers when they check
    /// out, otherwise fall back to a guarded linear search (the next
    /// mutation rewrites the stale pointers).
    fn position(&self, clients: &ClientMap, h: Handle) -> Option<(Layer, usize)> {
        let hot = clients.hot(h)?;
        let vec = &self.layers[hot.stacking_layer.index()];
        if vec.get(hot.stacking_index) == Some(&h) {
            return Some((hot.stacking_layer, hot.stacking_index));
        }
        for layer in Layer::ALL {
            if let Some(i) = self.layers[layer.index()].iter().position(|x| *x == h) {
                warn!(handle = h.bits(), "healed stale stacking back-pointer");
                return Some((layer, i));
            }
        }
        None
    }

    fn reindex(&mut self, clients: &mut ClientMap, layer: Layer, from: usize) {
        for i in from..self.layers[layer.index()].len() {
            let h = self.layers[layer.index()][i];
            if let Some(hot) = clients.hot_mut(h) {
                hot.stacking_layer = layer;
                hot.stacking_index = i;
            }
        }
    }

    /// Insert at the top of `layer`.
    pub fn insert_top(&mut self, clients: &mut ClientMap, h: Handle, layer: Layer) {
        debug_assert!(!self.contains(clients, h));
        let vec = &mut self.layers[layer.index()];
        vec.push(h);
        let i = vec.len() - 1;
        if let Some(hot) = clients.hot_mut(h) {
            hot.stacking_layer = layer;
            hot.stacking_index = i;
            hot.dirty |= Dirty::STACK;
        }
    }

    /// Insert directly above `sibling` (same layer). Falls back to the top
    /// of `fallback_layer` if the sibling is gone.
    pub fn insert_above(
        &mut self,
        clients: &mut ClientMap,
        h: Handle,
        sibling: Handle,
        fallback_layer: Layer,
    ) {
        match self.position(clients, sibling) {
            Some((layer, i)) => {
                self.layers[layer.index()].insert(i + 1, h);
                self.reindex(clients, layer, i + 1);
                if let Some(hot) = clients.hot_mut(h) {
                    hot.dirty |= Dirty::STACK;
                }
            }
            None => self.insert_top(clients, h, fallback_layer),
        }
    }

    /// Remove from whichever layer holds the handle.
    pub fn remove(&mut self, clients: &mut ClientMap, h: Handle) {
        let Some((layer, i)) = self.position(clients, h) else { return };
        self.layers[layer.index()].remove(i);
        self.reindex(clients, layer, i);
        if let Some(hot) = clients.hot_mut(h) {
            hot.stacking_index = usize::MAX;
        }
    }

    /// Raise to the top of its layer, transient children above it.
    pub fn raise(&mut self, clients: &mut ClientMap, h: Handle) {
        self.raise_guarded(clients, h, 0);
    }

    fn raise_guarded(&mut self, clients: &mut ClientMap, h: Handle, depth: usize) {
        if depth >= MAX_STACK_DEPTH {
            warn!(handle = h.bits(), "stacking recursion guard hit");
            return;
        }
        let Some((layer, i)) = self.position(clients, h) else { return };
        let vec = &mut self.layers[layer.index()];
        if i + 1 != vec.len() {
            vec.remove(i);
            vec.push(h);
            self.reindex(clients, layer, i);
        }
        if let Some(hot) = clients.hot_mut(h) {
            hot.dirty |= Dirty::STACK;
        }
        for child in transient::children(clients, h) {
            self.raise_guarded(clients, child, depth + 1);
        }
    }

    /// Lower to the bottom of its layer; children go down first so they
    /// finish above the parent.
    pub fn lower(&mut self, clients: &mut ClientMap, h: Handle) {
        self.lower_guarded(clients, h, 0);
    }

    fn lower_guarded(&mut self, clients: &mut ClientMap, h: Handle, depth: usize) {
        if depth >= MAX_STACK_DEPTH {
            warn!(handle = h.bits(), "stacking recursion guard hit");
            return;
        }
        for child in transient::children(clients, h) {
            self.lower_guarded(clients, child, depth + 1);
        }
        let Some((layer, i)) = self.position(clients, h) else { return };
        if i != 0 {
            let vec = &mut self.layers[layer.index()];
            vec.remove(i);
            vec.insert(0, h);
            self.reindex(clients, layer, 0);
        }
        if let Some(hot) = clients.hot_mut(h) {
            hot.dirty |= Dirty::STACK;
        }
    }

    /// Move to the top of a different layer (no-op when already there).
    pub fn move_to_layer(&mut self, clients: &mut ClientMap, h: Handle, layer: Layer) {
        match self.position(clients, h) {
            Some((current, _)) if current == layer => {
                self.raise(clients, h);
            }
            Some(_) => {
                self.remove(clients, h);
                self.insert_top(clients, h, layer);
            }
            None => self.insert_top(clients, h, layer),
        }
    }

    /// Place directly above or below a sibling within the sibling's layer,
    /// for `_NET_RESTACK_WINDOW`.
    pub fn place_relative(
        &mut self,
        clients: &mut ClientMap,
        h: Handle,
        sibling: Handle,
        above: bool,
    ) {
        let Some((target_layer, _)) = self.position(clients, sibling) else { return };
        self.remove(clients, h);
        let Some((layer, i)) = self.position(clients, sibling) else {
            self.insert_top(clients, h, target_layer);
            return;
        };
        let at = if above { i + 1 } else { i };
        self.layers[layer.index()].insert(at, h);
        self.reindex(clients, layer, at.min(i));
        if let Some(hot) = clients.hot_mut(h) {
            hot.dirty |= Dirty::STACK;
        }
    }

    /// Resolve the commit-phase anchor for `h`: prefer the window directly
    /// below (same layer, else topmost of any lower layer), then the window
    /// directly above, else raw-top. The below-anchor preference keeps
    /// iterative rebuilds stable.
    pub fn anchor(&self, clients: &ClientMap, h: Handle) -> Option<Anchor> {
        let (layer, i) = self.position(clients, h)?;
        if i > 0 {
            return Some(Anchor::AboveSibling(self.layers[layer.index()][i - 1]));
        }
        for lower in Layer::ALL[..layer.index()].iter().rev() {
            if let Some(below) = self.layers[lower.index()].last() {
                return Some(Anchor::AboveSibling(*below));
            }
        }
        if let Some(above) = self.layers[layer.index()].get(i + 1) {
            return Some(Anchor::BelowSibling(*above));
        }
        for upper in Layer::ALL[layer.index() + 1..].iter() {
            if let Some(above) = self.layers[upper.index()].first() {
                return Some(Anchor::BelowSibling(*above));
            }
        }
        Some(Anchor::TopRaw)
    }

    /// Invariant check used by tests: every back-pointer matches the vector
    /// position and no handle appears twice.
    #[cfg(test)]
    pub fn check_invariants(&self, clients: &ClientMap) {
        let mut seen = std::collections::HashSet::new();
        for layer in Layer::ALL {
            for (i, h) in self.layers[layer.index()].iter().enumerate() {
                assert!(seen.insert(*h), "handle present twice in stacking");
                let hot = clients.hot(*h).expect("stacked handle must resolve");
                assert_eq!(hot.stacking_layer, layer);
                assert_eq!(hot.stacking_index, i);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::transient;

    fn setup(n: usize) -> (ClientMap, Stacking, Vec<Handle>) {
        let mut clients = ClientMap::new();
        let mut stacking = Stacking::new();
        let handles: Vec<_> = (0..n)
            .map(|i| {
                let h = clients.alloc(i as u32 + 1);
                stacking.insert_top(&mut clients, h, Layer::Normal);
                h
            })
            .collect();
        (clients, stacking, handles)
    }

    #[test]
    fn raise_moves_to_top_and_reindexes() {
        let (mut clients, mut stacking, handles) = setup(3);
        stacking.raise(&mut clients, handles[0]);
        assert_eq!(stacking.layer(Layer::Normal), &[handles[1], handles[2], handles[0]]);
        stacking.check_invariants(&clients);
        assert!(clients.hot(handles[0]).unwrap().dirty.contains(Dirty::STACK));
    }

    #[test]
    fn lower_puts_children_above_parent() {
        let (mut clients, mut stacking, handles) = setup(3);
        // handles[2] is a dialog of handles[1]
        transient::link(&mut clients, handles[2], handles[1]);
        stacking.lower(&mut clients, handles[1]);
        let order = stacking.layer(Layer::Normal);
        let parent_pos = order.iter().position(|h| *h == handles[1]).unwrap();
        let child_pos = order.iter().position(|h| *h == handles[2]).unwrap();
        assert_eq!(parent_pos, 0);
        assert!(child_pos > parent_pos);
        stacking.check_invariants(&clients);
    }

    #[test]
    fn raise_carries_transients() {
        let (mut clients, mut stacking, handles) = setup(4);
        transient::link(&mut clients, handles[1], handles[0]);
        stacking.raise(&mut clients, handles[0]);
        let order = stacking.layer(Layer::Normal);
        let parent_pos = order.iter().position(|h| *h == handles[0]).unwrap();
        let child_pos = order.iter().position(|h| *h == handles[1]).unwrap();
        assert!(child_pos > parent_pos);
        stacking.check_invariants(&clients);
    }

    #[test]
    fn move_to_layer_and_anchor() {
        let (mut clients, mut stacking, handles) = setup(3);
        stacking.move_to_layer(&mut clients, handles[1], Layer::Fullscreen);
        stacking.check_invariants(&clients);
        // fullscreen client sits alone in its layer; anchor is the top of
        // the normal layer below
        assert_eq!(
            stacking.anchor(&clients, handles[1]),
            Some(Anchor::AboveSibling(handles[2]))
        );
        // bottom of normal layer anchors below its upper neighbor
        assert_eq!(stacking.anchor(&clients, handles[0]), Some(Anchor::BelowSibling(handles[2])));
    }

    #[test]
    fn anchor_top_raw_when_alone() {
        let mut clients = ClientMap::new();
        let mut stacking = Stacking::new();
        let h = clients.alloc(1);
        stacking.insert_top(&mut clients, h, Layer::Normal);
        assert_eq!(stacking.anchor(&clients, h), Some(Anchor::TopRaw));
    }

    #[test]
    fn remove_heals_and_reindexes() {
        let (mut clients, mut stacking, handles) = setup(5);
        stacking.remove(&mut clients, handles[2]);
        stacking.check_invariants(&clients);
        assert_eq!(stacking.layer(Layer::Normal).len(), 4);
        // stale back-pointer: corrupt it, position() self-heals
        clients.hot_mut(handles[3]).unwrap().stacking_index = 0;
        stacking.raise(&mut clients, handles[3]);
        stacking.check_invariants(&clients);
    }

    #[test]
    fn bottom_up_crosses_layers_in_order() {
        let (mut clients, mut stacking, handles) = setup(2);
        let dock = clients.alloc(99);
        stacking.insert_top(&mut clients, dock, Layer::Dock);
        let order: Vec<_> = stacking.bottom_up().collect();
        assert_eq!(order, vec![handles[0], handles[1], dock]);
    }
}
