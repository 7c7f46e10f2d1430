// SPDX-License-Identifier: GPL-3.0-only

//! Single-focus model with an MRU history. `focused` is what the model
//! wants; the commit phase installs it on the server and records the
//! installed window in `committed`.

use crate::model::{ClientMap, Handle, Lifecycle};

#[derive(Debug, Default)]
pub struct FocusState {
    /// most recently focused first, all managed clients
    history: Vec<Handle>,
    /// desired focus target; `None` means focus the root
    pub focused: Option<Handle>,
    /// client window currently holding the X input focus
    pub committed: Option<u32>,
    /// set when `focused` changed and the commit phase must act
    pub dirty: bool,
}

impl FocusState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[Handle] {
        &self.history
    }

    /// Move (or insert) a client at the head of the history.
    pub fn touch(&mut self, h: Handle) {
        self.history.retain(|x| *x != h);
        self.history.insert(0, h);
    }

    /// Insert at the head without focusing, for finish-manage.
    pub fn insert(&mut self, h: Handle) {
        if !self.history.contains(&h) {
            self.history.insert(0, h);
        }
    }

    pub fn remove(&mut self, h: Handle) {
        self.history.retain(|x| *x != h);
        if self.focused == Some(h) {
            self.focused = None;
            self.dirty = true;
        }
    }

    pub fn set_focus(&mut self, target: Option<Handle>) {
        if self.focused != target {
            self.focused = target;
            self.dirty = true;
        }
        if let Some(h) = target {
            self.touch(h);
        }
    }

    /// Pick the fallback focus after `leaving` goes away: a still-mapped
    /// transient parent wins, else the first mapped client in MRU order on
    /// the given desktop (or sticky).
    pub fn next_focus(
        &self,
        clients: &ClientMap,
        leaving: Handle,
        desktop: u32,
    ) -> Option<Handle> {
        let mapped_on = |h: Handle| {
            clients.hot(h).is_some_and(|hot| {
                hot.lifecycle == Lifecycle::Mapped
                    && (hot.desktop == desktop
                        || hot.state.contains(crate::model::WinState::STICKY))
            })
        };
        if let Some(parent) = clients.hot(leaving).and_then(|hot| hot.transient_for) {
            if mapped_on(parent) {
                return Some(parent);
            }
        }
        self.history.iter().copied().find(|h| *h != leaving && mapped_on(*h))
    }

    /// MRU cycle helper for the focus-next/prev bindings.
    pub fn cycle(&self, clients: &ClientMap, desktop: u32, forward: bool) -> Option<Handle> {
        let mapped: Vec<Handle> = self
            .history
            .iter()
            .copied()
            .filter(|h| {
                clients.hot(*h).is_some_and(|hot| {
                    hot.lifecycle == Lifecycle::Mapped
                        && (hot.desktop == desktop
                            || hot.state.contains(crate::model::WinState::STICKY))
                })
            })
            .collect();
        if mapped.is_empty() {
            return None;
        }
        let current = self.focused.and_then(|f| mapped.iter().position(|h| *h == f));
        let next = match (current, forward) {
            (Some(i), true) => (i + 1) % mapped.len(),
            (Some(i), false) => (i + mapped.len() - 1) % mapped.len(),
            (None, _) => 0,
        };
        Some(mapped[next])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{transient, WinState};

    fn mapped(clients: &mut ClientMap, xid: u32, desktop: u32) -> Handle {
        let h = clients.alloc(xid);
        let hot = clients.hot_mut(h).unwrap();
        hot.lifecycle = Lifecycle::Mapped;
        hot.desktop = desktop;
        h
    }

    #[test]
    fn touch_moves_to_head() {
        let mut clients = ClientMap::new();
        let mut focus = FocusState::new();
        let a = mapped(&mut clients, 1, 0);
        let b = mapped(&mut clients, 2, 0);
        focus.touch(a);
        focus.touch(b);
        assert_eq!(focus.history(), &[b, a]);
        focus.touch(a);
        assert_eq!(focus.history(), &[a, b]);
    }

    #[test]
    fn next_focus_prefers_transient_parent() {
        let mut clients = ClientMap::new();
        let mut focus = FocusState::new();
        let parent = mapped(&mut clients, 1, 0);
        let other = mapped(&mut clients, 2, 0);
        let dialog = mapped(&mut clients, 3, 0);
        transient::link(&mut clients, dialog, parent);
        focus.touch(parent);
        focus.touch(other);
        focus.touch(dialog);
        // MRU would pick `other`, but the parent wins
        assert_eq!(focus.next_focus(&clients, dialog, 0), Some(parent));
    }

    #[test]
    fn next_focus_walks_mru_on_right_desktop() {
        let mut clients = ClientMap::new();
        let mut focus = FocusState::new();
        let a = mapped(&mut clients, 1, 0);
        let b = mapped(&mut clients, 2, 1);
        let sticky = mapped(&mut clients, 3, 5);
        clients.hot_mut(sticky).unwrap().state |= WinState::STICKY;
        let leaving = mapped(&mut clients, 4, 0);
        focus.touch(a);
        focus.touch(b);
        focus.touch(sticky);
        focus.touch(leaving);
        // desktop 0: b is elsewhere, sticky counts everywhere
        assert_eq!(focus.next_focus(&clients, leaving, 0), Some(sticky));
        focus.remove(sticky);
        assert_eq!(focus.next_focus(&clients, leaving, 0), Some(a));
    }

    #[test]
    fn remove_clears_focus_and_marks_dirty() {
        let mut clients = ClientMap::new();
        let mut focus = FocusState::new();
        let a = mapped(&mut clients, 1, 0);
        focus.set_focus(Some(a));
        focus.dirty = false;
        focus.remove(a);
        assert_eq!(focus.focused, None);
        assert!(focus.dirty);
    }

    #[test]
    fn cycle_wraps_both_directions() {
        let mut clients = ClientMap::new();
        let mut focus = FocusState::new();
        let a = mapped(&mut clients, 1, 0);
        let b = mapped(&mut clients, 2, 0);
        let c = mapped(&mut clients, 3, 0);
        focus.touch(c);
        focus.touch(b);
        focus.touch(a);
        focus.set_focus(Some(a));
        assert_eq!(focus.cycle(&clients, 0, true), Some(b));
        assert_eq!(focus.cycle(&clients, 0, false), Some(c));
    }
}
