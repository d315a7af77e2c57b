//! Arena tape for reverse-mode automatic differentiation.
//!
//! The tape is an append-only arena of [`Node`]s plus three auxiliary pools
//! (`f64` slots, node references and batched linear-algebra records). A
//! node may only reference nodes allocated before it, so allocation order is
//! a valid topological order and the reverse sweep is a single backward
//! iteration. Nothing is freed individually: [`Tape::recover`] truncates
//! every pool back to a [`Checkpoint`] in constant time, keeping capacity.
//!
//! Each thread owns one tape, reached through [`with_tape`].

use std::cell::RefCell;
use std::fmt::Debug;
use std::marker::PhantomData;

use tracing::debug;

use super::batched::Batched;
use super::node::{IdRange, Node, Op, ValueRange, chain};
use crate::config::TapeConfig;

/// Unique identifier for a node on the tape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Get the internal index.
    pub fn index(&self) -> usize {
        self.0
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }
}

/// Position of the tape at the time of [`Tape::mark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Checkpoint {
    nodes: usize,
    values: usize,
    ids: usize,
    batched: usize,
}

impl Checkpoint {
    /// Number of nodes that were on the tape when the mark was taken.
    pub fn nodes(&self) -> usize {
        self.nodes
    }
}

/// Memory usage snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapeStats {
    pub nodes: usize,
    pub aux_values: usize,
    pub aux_ids: usize,
    pub batched: usize,
    /// Largest node count seen since the last [`Tape::free_all`].
    pub peak_nodes: usize,
    /// Allocated node capacity.
    pub node_capacity: usize,
    pub epoch: u32,
}

/// Arena of nodes.
pub struct Tape {
    nodes: Vec<Node>,
    values: Vec<f64>,
    ids: Vec<NodeId>,
    batched: Vec<Batched>,
    epoch: u32,
    peak_nodes: usize,
}

impl Tape {
    /// Create an empty tape without reserving memory.
    pub const fn new() -> Self {
        Self {
            nodes: Vec::new(),
            values: Vec::new(),
            ids: Vec::new(),
            batched: Vec::new(),
            epoch: 0,
            peak_nodes: 0,
        }
    }

    /// Create an empty tape with reserved capacity.
    pub fn with_config(config: TapeConfig) -> Self {
        let mut tape = Self::new();
        tape.reserve(config);
        tape
    }

    /// Grow capacity to at least what `config` asks for.
    pub fn reserve(&mut self, config: TapeConfig) {
        self.nodes
            .reserve(config.node_capacity.saturating_sub(self.nodes.len()));
        self.values
            .reserve(config.aux_value_capacity.saturating_sub(self.values.len()));
        self.ids
            .reserve(config.aux_id_capacity.saturating_sub(self.ids.len()));
    }

    /// Append a node and return its id.
    pub fn alloc(&mut self, value: f64, op: Op) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(value, op, self.epoch));
        self.peak_nodes = self.peak_nodes.max(self.nodes.len());
        id
    }

    /// Copy `values` into the auxiliary `f64` pool.
    pub fn alloc_values(&mut self, values: impl IntoIterator<Item = f64>) -> ValueRange {
        let start = self.values.len();
        self.values.extend(values);
        ValueRange {
            start: aux_offset(start),
            len: aux_offset(self.values.len() - start),
        }
    }

    /// Copy `ids` into the auxiliary node-reference pool.
    pub fn alloc_ids(&mut self, ids: impl IntoIterator<Item = NodeId>) -> IdRange {
        let start = self.ids.len();
        self.ids.extend(ids);
        IdRange {
            start: aux_offset(start),
            len: aux_offset(self.ids.len() - start),
        }
    }

    pub(crate) fn alloc_batched(&mut self, record: Batched) -> u32 {
        self.batched.push(record);
        aux_offset(self.batched.len() - 1)
    }

    /// Get node by id.
    ///
    /// # Panics
    ///
    /// Panics if `id` lies beyond the end of the tape.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Get all nodes.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn values(&self, range: ValueRange) -> &[f64] {
        &self.values[range.as_range()]
    }

    pub fn ids(&self, range: IdRange) -> &[NodeId] {
        &self.ids[range.as_range()]
    }

    pub(crate) fn batched(&self, index: u32) -> &Batched {
        &self.batched[index as usize]
    }

    /// Current epoch; bumped by every recovery.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the tape is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Record the current position of every pool.
    pub fn mark(&self) -> Checkpoint {
        Checkpoint {
            nodes: self.nodes.len(),
            values: self.values.len(),
            ids: self.ids.len(),
            batched: self.batched.len(),
        }
    }

    /// Release everything allocated after `checkpoint`.
    ///
    /// Capacity is kept. Handles to released nodes become dangling; the
    /// epoch is bumped so debug builds catch their later use.
    pub fn recover(&mut self, checkpoint: Checkpoint) {
        debug_assert!(
            checkpoint.nodes <= self.nodes.len(),
            "checkpoint at {} lies beyond the tape end {}",
            checkpoint.nodes,
            self.nodes.len()
        );
        let released = self.nodes.len().saturating_sub(checkpoint.nodes);
        self.nodes.truncate(checkpoint.nodes);
        self.values.truncate(checkpoint.values);
        self.ids.truncate(checkpoint.ids);
        self.batched.truncate(checkpoint.batched);
        self.epoch = self.epoch.wrapping_add(1);
        debug!(released, epoch = self.epoch, "recovered tape");
    }

    /// Release every node, keeping capacity.
    pub fn recover_all(&mut self) {
        self.recover(Checkpoint::default());
    }

    /// Release every node and return the memory to the allocator.
    pub fn free_all(&mut self) {
        let released = self.nodes.len();
        self.nodes = Vec::new();
        self.values = Vec::new();
        self.ids = Vec::new();
        self.batched = Vec::new();
        self.peak_nodes = 0;
        self.epoch = self.epoch.wrapping_add(1);
        debug!(released, epoch = self.epoch, "freed tape");
    }

    /// Zero the adjoint of every node at or after position `from`.
    pub fn set_zero_adjoints(&mut self, from: usize) {
        for node in &mut self.nodes[from..] {
            node.adjoint = 0.0;
        }
    }

    /// Run the chain rule on every node from the end of the tape down to
    /// position `stop` inclusive. Returns the number of nodes visited.
    pub fn sweep(&mut self, stop: usize) -> usize {
        let Self {
            nodes,
            values,
            ids,
            batched,
            ..
        } = self;
        let end = nodes.len();
        for index in (stop..end).rev() {
            chain(index, nodes, values, ids, batched);
        }
        end.saturating_sub(stop)
    }

    /// Nodes referenced by node `id`.
    pub fn operands(&self, id: NodeId) -> smallvec::SmallVec<[NodeId; 4]> {
        match self.nodes[id.0].op {
            Op::Leaf => smallvec::SmallVec::new(),
            Op::Unary { a, .. } | Op::Scaled { a, .. } => smallvec::smallvec![a],
            Op::Binary { a, b, .. } => smallvec::smallvec![a, b],
            Op::Sum { operands } | Op::Precomputed { operands, .. } => {
                self.ids(operands).iter().copied().collect()
            }
            Op::Batched { index } => self.batched(index).operands(&self.ids),
        }
    }

    /// Memory usage snapshot.
    pub fn stats(&self) -> TapeStats {
        TapeStats {
            nodes: self.nodes.len(),
            aux_values: self.values.len(),
            aux_ids: self.ids.len(),
            batched: self.batched.len(),
            peak_nodes: self.peak_nodes,
            node_capacity: self.nodes.capacity(),
            epoch: self.epoch,
        }
    }
}

impl Default for Tape {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Tape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tape")
            .field("num_nodes", &self.nodes.len())
            .field("num_aux_values", &self.values.len())
            .field("num_aux_ids", &self.ids.len())
            .field("epoch", &self.epoch)
            .finish()
    }
}

pub(crate) fn aux_offset(n: usize) -> u32 {
    u32::try_from(n).unwrap_or_else(|_| panic!("tape pool offset {n} exceeds u32::MAX"))
}

thread_local! {
    static TAPE: RefCell<Tape> = const { RefCell::new(Tape::new()) };
}

/// Access the thread-local tape.
///
/// # Panics
///
/// Panics if called re-entrantly from inside another `with_tape` closure.
///
/// # Example
///
/// ```
/// use agrad::reverse::with_tape;
/// use agrad::reverse::node::Op;
///
/// let id = with_tape(|tape| tape.alloc(1.5, Op::Leaf));
/// assert_eq!(with_tape(|tape| tape.node(id).value()), 1.5);
/// agrad::reverse::recover_all();
/// ```
pub fn with_tape<R>(f: impl FnOnce(&mut Tape) -> R) -> R {
    TAPE.with(|t| f(&mut t.borrow_mut()))
}

/// Like [`with_tape`], but returns `None` instead of panicking when the tape
/// is already borrowed or the thread is shutting down.
pub(crate) fn try_with_tape<R>(f: impl FnOnce(&mut Tape) -> R) -> Option<R> {
    TAPE.try_with(|t| t.try_borrow_mut().ok().map(|mut t| f(&mut t)))
        .ok()
        .flatten()
}

/// Record the current position of the thread-local tape.
pub fn mark() -> Checkpoint {
    with_tape(|t| t.mark())
}

/// Release everything allocated on the thread-local tape after `checkpoint`.
pub fn recover(checkpoint: Checkpoint) {
    with_tape(|t| t.recover(checkpoint));
}

/// Release every node on the thread-local tape, keeping capacity.
pub fn recover_all() {
    with_tape(|t| t.recover_all());
}

/// Release every node on the thread-local tape and its memory.
pub fn free_all() {
    with_tape(|t| t.free_all());
}

/// Zero every adjoint on the thread-local tape.
pub fn set_zero_all_adjoints() {
    with_tape(|t| t.set_zero_adjoints(0));
}

/// Reserve capacity on the thread-local tape.
pub fn configure(config: TapeConfig) {
    with_tape(|t| t.reserve(config));
}

/// Memory usage of the thread-local tape.
pub fn stats() -> TapeStats {
    with_tape(|t| t.stats())
}

/// Number of nodes on the thread-local tape.
pub fn len() -> usize {
    with_tape(|t| t.len())
}

/// Scoped region of the thread-local tape.
///
/// Everything allocated while the guard is alive is released when it is
/// dropped, including during unwinding. Nodes created before the scope
/// are untouched and remain valid.
///
/// Scopes are meant to be dropped in reverse order of creation. If an
/// enclosing scope is dropped first, the inner guard finds its region
/// already released and leaves the tape alone.
#[must_use = "the scope is recovered as soon as the guard is dropped"]
pub struct NestedScope {
    mark: Checkpoint,
    _local: PhantomData<*const ()>,
}

impl NestedScope {
    /// Position of the tape when the scope was entered.
    pub fn mark(&self) -> Checkpoint {
        self.mark
    }

    /// Zero the adjoints of nodes allocated inside the scope.
    pub fn zero_adjoints(&self) {
        with_tape(|t| t.set_zero_adjoints(self.mark.nodes));
    }

    /// Number of nodes allocated inside the scope.
    pub fn len(&self) -> usize {
        len().saturating_sub(self.mark.nodes)
    }

    /// Check if the scope has not allocated anything yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for NestedScope {
    fn drop(&mut self) {
        let mark = self.mark;
        // An enclosing scope dropped first has already released this one.
        match try_with_tape(|t| (mark.nodes <= t.len()).then(|| t.recover(mark))) {
            Some(Some(())) => debug!(nodes = mark.nodes, "left nested scope"),
            Some(None) => debug!(nodes = mark.nodes, "nested scope already released"),
            None => debug!(nodes = mark.nodes, "nested scope dropped while tape unavailable"),
        }
    }
}

impl Debug for NestedScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NestedScope")
            .field("mark", &self.mark.nodes)
            .finish()
    }
}

/// Enter a nested scope on the thread-local tape.
pub fn start_nested() -> NestedScope {
    let mark = mark();
    debug!(nodes = mark.nodes, "entered nested scope");
    NestedScope {
        mark,
        _local: PhantomData,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reverse::node::BinaryOp;

    #[test]
    fn test_alloc_leaf() {
        let mut tape = Tape::new();
        let a = tape.alloc(1.0, Op::Leaf);
        let b = tape.alloc(2.0, Op::Leaf);

        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(tape.len(), 2);
        assert!(tape.node(a).is_leaf());
        assert_eq!(tape.node(b).value(), 2.0);
        assert_eq!(tape.node(b).adjoint(), 0.0);
    }

    #[test]
    fn test_sweep_visits_every_node_once() {
        let mut tape = Tape::new();
        let a = tape.alloc(3.0, Op::Leaf);
        let b = tape.alloc(4.0, Op::Leaf);
        let c = tape.alloc(
            12.0,
            Op::Binary {
                kind: BinaryOp::Mul,
                a,
                b,
            },
        );
        let d = tape.alloc(
            15.0,
            Op::Binary {
                kind: BinaryOp::Add,
                a: c,
                b: a,
            },
        );
        tape.node_mut(d).adjoint = 1.0;

        assert_eq!(tape.sweep(0), 4);
        assert_eq!(tape.node(a).adjoint(), 5.0);
        assert_eq!(tape.node(b).adjoint(), 3.0);
    }

    #[test]
    fn test_recover_truncates_all_pools() {
        let mut tape = Tape::new();
        tape.alloc(1.0, Op::Leaf);
        let checkpoint = tape.mark();
        let epoch = tape.epoch();

        let a = tape.alloc(2.0, Op::Leaf);
        let values = tape.alloc_values([1.0, 2.0]);
        let ids = tape.alloc_ids([a]);
        tape.alloc(
            3.0,
            Op::Precomputed {
                operands: ids,
                partials: values,
            },
        );

        tape.recover(checkpoint);
        assert_eq!(tape.mark(), checkpoint);
        assert_eq!(tape.len(), 1);
        assert_ne!(tape.epoch(), epoch);
    }

    #[test]
    fn test_recover_keeps_capacity() {
        let mut tape = Tape::with_config(TapeConfig::empty().with_node_capacity(64));
        for i in 0..32 {
            tape.alloc(f64::from(i), Op::Leaf);
        }
        let capacity = tape.stats().node_capacity;
        tape.recover_all();
        assert!(tape.is_empty());
        assert_eq!(tape.stats().node_capacity, capacity);
        assert_eq!(tape.stats().peak_nodes, 32);

        tape.free_all();
        assert_eq!(tape.stats().node_capacity, 0);
        assert_eq!(tape.stats().peak_nodes, 0);
    }

    #[test]
    fn test_operands() {
        let mut tape = Tape::new();
        let a = tape.alloc(1.0, Op::Leaf);
        let b = tape.alloc(2.0, Op::Leaf);
        let ids = tape.alloc_ids([a, b, a]);
        let s = tape.alloc(4.0, Op::Sum { operands: ids });
        assert!(tape.operands(a).is_empty());
        assert_eq!(tape.operands(s).as_slice(), &[a, b, a]);
    }

    #[test]
    fn test_nested_scope_recovers_on_drop() {
        recover_all();
        with_tape(|t| t.alloc(1.0, Op::Leaf));
        {
            let scope = start_nested();
            with_tape(|t| {
                t.alloc(2.0, Op::Leaf);
                t.alloc(3.0, Op::Leaf);
            });
            assert_eq!(scope.len(), 2);
            assert_eq!(scope.mark().nodes(), 1);
        }
        assert_eq!(len(), 1);
        recover_all();
    }

    #[test]
    fn test_nested_scope_recovers_on_panic() {
        recover_all();
        let result = std::panic::catch_unwind(|| {
            let _scope = start_nested();
            with_tape(|t| t.alloc(2.0, Op::Leaf));
            panic!("model failed");
        });
        assert!(result.is_err());
        assert_eq!(len(), 0);
    }

    #[test]
    fn test_nested_scopes_dropped_out_of_order() {
        recover_all();
        let outer = start_nested();
        with_tape(|t| t.alloc(1.0, Op::Leaf));
        let inner = start_nested();
        with_tape(|t| t.alloc(2.0, Op::Leaf));
        drop(outer);
        assert_eq!(len(), 0);
        let epoch = stats().epoch;
        drop(inner);
        assert_eq!(len(), 0);
        assert_eq!(stats().epoch, epoch);
    }
}
