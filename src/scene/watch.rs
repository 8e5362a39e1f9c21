//! Abonnementen op wijzigingen van nodes.
//!
//! Een instancer die een curve volgt registreert hier een watch per node.
//! Elke wijziging aan een gevolgde node levert een [`ChangeSignal`] op dat
//! later door de sessie wordt uitgedeeld.

use std::collections::{BTreeMap, BTreeSet};

use super::node::NodeId;
use crate::instancing::{ChangeKind, WatchRegistry};

/// Identifier van een watch.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct WatchId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Watch {
    target: NodeId,
    subscriber: NodeId,
}

/// Wijziging die bij een abonnee moet aankomen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeSignal {
    pub watch: WatchId,
    pub subscriber: NodeId,
    pub source: NodeId,
    pub kind: ChangeKind,
}

/// Tabel met actieve watches en nog niet uitgedeelde signalen.
#[derive(Debug, Clone, Default)]
pub struct WatchTable {
    watches: BTreeMap<WatchId, Watch>,
    pending: Vec<ChangeSignal>,
    next_id: u64,
}

impl WatchTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Meld een wijziging aan `source`.
    pub fn emit(&mut self, source: NodeId, kind: ChangeKind) {
        for (&id, watch) in &self.watches {
            if watch.target == source {
                self.pending.push(ChangeSignal {
                    watch: id,
                    subscriber: watch.subscriber,
                    source,
                    kind,
                });
            }
        }
    }

    /// Haal alle wachtende signalen op.
    pub fn take_signals(&mut self) -> Vec<ChangeSignal> {
        std::mem::take(&mut self.pending)
    }

    /// Vergeet alle watches en signalen.
    pub fn clear(&mut self) {
        self.watches.clear();
        self.pending.clear();
    }

    #[must_use]
    pub fn is_watched(&self, target: NodeId) -> bool {
        self.watches.values().any(|watch| watch.target == target)
    }

    /// Abonnees die `target` volgen.
    #[must_use]
    pub fn subscribers_of(&self, target: NodeId) -> BTreeSet<NodeId> {
        self.watches
            .values()
            .filter(|watch| watch.target == target)
            .map(|watch| watch.subscriber)
            .collect()
    }

    /// Aantal watches van een abonnee.
    #[must_use]
    pub fn watch_count(&self, subscriber: NodeId) -> usize {
        self.watches
            .values()
            .filter(|watch| watch.subscriber == subscriber)
            .count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.watches.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }
}

impl WatchRegistry for WatchTable {
    type Target = NodeId;
    type Subscriber = NodeId;
    type WatchId = WatchId;

    fn watch(&mut self, target: NodeId, subscriber: NodeId) -> WatchId {
        let id = WatchId(self.next_id);
        self.next_id += 1;
        self.watches.insert(id, Watch { target, subscriber });
        id
    }

    fn unwatch(&mut self, id: WatchId) -> bool {
        let removed = self.watches.remove(&id).is_some();
        self.pending.retain(|signal| signal.watch != id);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_reach_only_watchers_of_the_source() {
        let mut table = WatchTable::new();
        let a = table.watch(NodeId::new(1), NodeId::new(10));
        table.watch(NodeId::new(2), NodeId::new(11));

        table.emit(NodeId::new(1), ChangeKind::CurveShape);
        let signals = table.take_signals();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].watch, a);
        assert_eq!(signals[0].subscriber, NodeId::new(10));
        assert!(table.take_signals().is_empty());
    }

    #[test]
    fn unwatch_drops_pending_signals() {
        let mut table = WatchTable::new();
        let id = table.watch(NodeId::new(1), NodeId::new(10));
        table.emit(NodeId::new(1), ChangeKind::CurveTransform);

        assert!(table.unwatch(id));
        assert!(!table.unwatch(id));
        assert!(table.take_signals().is_empty());
        assert!(!table.is_watched(NodeId::new(1)));
    }

    #[test]
    fn subscribers_are_listed_once_per_target() {
        let mut table = WatchTable::new();
        table.watch(NodeId::new(1), NodeId::new(10));
        table.watch(NodeId::new(1), NodeId::new(11));
        table.watch(NodeId::new(2), NodeId::new(10));

        let subscribers: Vec<NodeId> = table.subscribers_of(NodeId::new(1)).into_iter().collect();
        assert_eq!(subscribers, vec![NodeId::new(10), NodeId::new(11)]);
        assert!(table.subscribers_of(NodeId::new(3)).is_empty());
    }
}
