//! The shared search tree: decision nodes (D-nodes) alternate with chance
//! nodes (C-nodes), each guarded by its own lock so many trials can descend
//! and backup concurrently.
//!
//! Grounded on the same `Mutex`-guarded shared-state idiom the parallel MDD
//! solver uses for its fringe (one lock per unit of mutable state, atomics
//! for counters that are read far more often than written), adapted here so
//! each *node* rather than the whole search carries its own lock: many
//! workers touch disjoint parts of the tree at once and a single global lock
//! would serialise them needlessly.
//!
//! D-locks are always acquired before the C-lock of a child, and a node
//! never holds its own lock while acquiring a child's: that fixed order (and
//! the fact a node is never locked together with its parent) is what keeps
//! concurrent selection/backup deadlock-free.

use std::hash::Hash;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use fxhash::FxBuildHasher;
use parking_lot::Mutex;

use crate::error::{InternalInvariantError, ThtsResult};
use crate::reward::Reward;
use crate::stats::Stat;

/// Atomic visit/virtual-loss bookkeeping shared by D-nodes and C-nodes.
#[derive(Debug, Default)]
pub struct VisitCounters {
    pub num_visits: AtomicU64,
    pub num_backups: AtomicU64,
    /// In-flight trials that have selected through this node but not yet
    /// backed up; used both for virtual-loss steering and for the
    /// visits-exceed-children invariant check.
    pub virtual_losses: AtomicI64,
}

impl VisitCounters {
    pub fn add_virtual_loss(&self) {
        self.virtual_losses.fetch_add(1, Ordering::AcqRel);
    }

    pub fn remove_virtual_loss(&self) {
        self.virtual_losses.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn visits(&self) -> u64 {
        self.num_visits.load(Ordering::Acquire)
    }

    pub fn in_flight(&self) -> i64 {
        self.virtual_losses.load(Ordering::Acquire)
    }
}

/// A decision node: the state the acting agent observes, one child C-node
/// per legal action.
pub struct DNode<S, A> {
    pub state: S,
    pub depth: u32,
    pub is_sink: bool,
    pub counters: VisitCounters,
    pub heuristic_value: Option<Reward>,
    inner: Mutex<DNodeInner<S, A>>,
}

struct DNodeInner<S, A> {
    children: Vec<(A, Arc<CNode<S, A>>)>,
    stat: Stat,
}

impl<S, A: Clone + PartialEq> DNode<S, A> {
    pub fn new(state: S, depth: u32, is_sink: bool, heuristic_value: Option<Reward>, stat: Stat) -> Arc<Self> {
        Arc::new(DNode {
            state,
            depth,
            is_sink,
            counters: VisitCounters::default(),
            heuristic_value,
            inner: Mutex::new(DNodeInner { children: Vec::new(), stat }),
        })
    }

    /// Returns the child C-node for `action`, creating it via `make` if this
    /// is the first selection of `action` from this node. The returned `bool`
    /// is `true` exactly when this call ran `make` (the child did not exist
    /// before this call), used by the trial loop's first-visit termination.
    pub fn child_or_insert(self: &Arc<Self>, action: A, make: impl FnOnce() -> Arc<CNode<S, A>>) -> (Arc<CNode<S, A>>, bool) {
        let mut inner = self.inner.lock();
        if let Some((_, c)) = inner.children.iter().find(|(a, _)| *a == action) {
            return (c.clone(), false);
        }
        let c = make();
        inner.children.push((action, c.clone()));
        (c, true)
    }

    pub fn children(&self) -> Vec<(A, Arc<CNode<S, A>>)> {
        self.inner.lock().children.clone()
    }

    pub fn with_stat<R>(&self, f: impl FnOnce(&Stat) -> R) -> R {
        f(&self.inner.lock().stat)
    }

    pub fn with_stat_mut<R>(&self, f: impl FnOnce(&mut Stat) -> R) -> R {
        f(&mut self.inner.lock().stat)
    }

    /// Sanity check run after each selection through this node: the total
    /// trials its children have completed or still have in flight can never
    /// exceed this node's own visit count plus its own in-flight trials. A
    /// violation means a child was credited with more selections than this
    /// node ever recorded, which can only mean the tree was mutated outside
    /// the D-lock-before-C-lock discipline.
    pub fn check_visit_invariant(&self) -> ThtsResult<()> {
        let visits = self.counters.visits();
        let in_flight = self.counters.in_flight().max(0) as u64;
        let children_sum: u64 = self
            .inner
            .lock()
            .children
            .iter()
            .map(|(_, c)| c.counters.num_backups.load(Ordering::Acquire) + c.counters.in_flight().max(0) as u64)
            .sum();
        if children_sum > visits + in_flight {
            return Err(InternalInvariantError::VisitCountExceedsChildren { visits, children_sum, in_flight }.into());
        }
        Ok(())
    }
}

/// A chance node: the outcome of taking one action from the parent D-node,
/// with one child D-node per distinct successor observation seen so far.
pub struct CNode<S, A> {
    pub action: A,
    pub counters: VisitCounters,
    inner: Mutex<CNodeInner<S, A>>,
}

struct CNodeInner<S, A> {
    /// Children keyed by observation; kept as a `Vec` since chance nodes
    /// rarely fan out to more than a handful of distinct observations.
    children: Vec<(u64, Arc<DNode<S, A>>)>,
    stat: Stat,
}

impl<S, A: Clone + PartialEq> CNode<S, A> {
    pub fn new(action: A, stat: Stat) -> Arc<Self> {
        Arc::new(CNode {
            action,
            counters: VisitCounters::default(),
            inner: Mutex::new(CNodeInner { children: Vec::new(), stat }),
        })
    }

    /// Returns the child D-node for `obs_key`, creating it via `make` if this
    /// is the first time this C-node has seen that observation. The returned
    /// `bool` is `true` exactly when this call ran `make`.
    pub fn child_or_insert(self: &Arc<Self>, obs_key: u64, make: impl FnOnce() -> Arc<DNode<S, A>>) -> (Arc<DNode<S, A>>, bool) {
        let mut inner = self.inner.lock();
        if let Some((_, existing)) = inner.children.iter().find(|(k, _)| *k == obs_key) {
            return (existing.clone(), false);
        }
        let node = make();
        inner.children.push((obs_key, node.clone()));
        (node, true)
    }

    pub fn children(&self) -> Vec<(u64, Arc<DNode<S, A>>)> {
        self.inner.lock().children.clone()
    }

    pub fn with_stat<R>(&self, f: impl FnOnce(&Stat) -> R) -> R {
        f(&self.inner.lock().stat)
    }

    pub fn with_stat_mut<R>(&self, f: impl FnOnce(&mut Stat) -> R) -> R {
        f(&mut self.inner.lock().stat)
    }
}

/// Keys the transposition table on `(observation, depth)`, holding only weak
/// references so a node that every trial has stopped reaching can be
/// reclaimed rather than pinned alive forever.
pub struct TranspositionTable<K, S, A> {
    table: DashMap<(K, u32), Weak<DNode<S, A>>, FxBuildHasher>,
}

impl<K: Eq + Hash + Clone, S, A> Default for TranspositionTable<K, S, A> {
    fn default() -> Self {
        TranspositionTable { table: DashMap::default() }
    }
}

impl<K: Eq + Hash + Clone, S, A> TranspositionTable<K, S, A> {
    pub fn get(&self, key: &K, depth: u32) -> Option<Arc<DNode<S, A>>> {
        self.table.get(&(key.clone(), depth)).and_then(|w| w.upgrade())
    }

    /// Inserts `node` under `(key, depth)`, replacing any dead weak entry.
    pub fn insert(&self, key: K, depth: u32, node: &Arc<DNode<S, A>>) {
        self.table.insert((key, depth), Arc::downgrade(node));
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::uct::UctStat;

    #[test]
    fn child_or_insert_reuses_existing_child() {
        let root: Arc<DNode<i32, i32>> = DNode::new(0, 0, false, None, Stat::Uct(UctStat::default()));
        let (a, a_fresh) = root.child_or_insert(1, || CNode::new(1, Stat::Uct(UctStat::default())));
        let (b, b_fresh) = root.child_or_insert(1, || panic!("should not rebuild"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(1, root.children().len());
        assert!(a_fresh);
        assert!(!b_fresh);
    }

    #[test]
    fn transposition_table_drops_dead_weak_entries() {
        let table: TranspositionTable<i32, i32, i32> = TranspositionTable::default();
        {
            let node: Arc<DNode<i32, i32>> = DNode::new(5, 2, false, None, Stat::Uct(UctStat::default()));
            table.insert(42, 2, &node);
            assert!(table.get(&42, 2).is_some());
        }
        assert!(table.get(&42, 2).is_none());
    }

    #[test]
    fn visit_invariant_holds_for_a_freshly_selected_child() {
        let root: Arc<DNode<i32, i32>> = DNode::new(0, 0, false, None, Stat::Uct(UctStat::default()));
        root.counters.num_visits.fetch_add(1, Ordering::AcqRel);
        let (cnode, _) = root.child_or_insert(1, || CNode::new(1, Stat::Uct(UctStat::default())));
        cnode.counters.add_virtual_loss();
        assert!(root.check_visit_invariant().is_ok());
    }

    #[test]
    fn visit_invariant_catches_a_child_credited_with_more_trials_than_the_parent_recorded() {
        let root: Arc<DNode<i32, i32>> = DNode::new(0, 0, false, None, Stat::Uct(UctStat::default()));
        let (cnode, _) = root.child_or_insert(1, || CNode::new(1, Stat::Uct(UctStat::default())));
        cnode.counters.num_backups.fetch_add(5, Ordering::AcqRel);
        assert!(root.check_visit_invariant().is_err());
    }

    #[test]
    fn virtual_loss_round_trips() {
        let counters = VisitCounters::default();
        counters.add_virtual_loss();
        counters.add_virtual_loss();
        assert_eq!(2, counters.in_flight());
        counters.remove_virtual_loss();
        assert_eq!(1, counters.in_flight());
    }
}
