//! Dependency-graph view of the tape.

use petgraph::graph::{DiGraph, NodeIndex};

use super::tape::{NodeId, Tape, with_tape};

/// Build the dependency graph of `tape`.
///
/// Graph node `i` carries tape node `i`; an edge `u -> v` means node `v`
/// references node `u`. Every edge points forward in allocation order.
pub fn dependency_graph_of(tape: &Tape) -> DiGraph<NodeId, ()> {
    let mut graph = DiGraph::with_capacity(tape.len(), tape.len());
    let indices: Vec<NodeIndex> = (0..tape.len())
        .map(|i| graph.add_node(NodeId::from_index(i)))
        .collect();
    for (i, &target) in indices.iter().enumerate() {
        for operand in tape.operands(NodeId::from_index(i)) {
            graph.add_edge(indices[operand.index()], target, ());
        }
    }
    graph
}

/// Dependency graph of the thread-local tape.
pub fn dependency_graph() -> DiGraph<NodeId, ()> {
    with_tape(|t| dependency_graph_of(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reverse::{Var, ops, start_nested};
    use crate::scalar::Real;
    use petgraph::algo::toposort;

    #[test]
    fn test_allocation_order_is_topological() {
        let _scope = start_nested();
        let x = Var::new(0.3);
        let y = Var::new(-1.2);
        let a = [x, y, x * y, y.exp()];
        let c = ops::multiply(&a, (2, 2), &[1.0, 2.0], (2, 1)).unwrap();
        let _f = ops::log_sum_exp(&c).unwrap() + x.sin();

        let graph = dependency_graph();
        assert!(toposort(&graph, None).is_ok());
        for edge in graph.raw_edges() {
            assert!(edge.source().index() < edge.target().index());
        }
    }

    #[test]
    fn test_edges_follow_operands() {
        use crate::reverse::node::{BinaryOp, Op};

        let mut tape = Tape::new();
        let a = tape.alloc(1.0, Op::Leaf);
        let b = tape.alloc(2.0, Op::Leaf);
        tape.alloc(
            3.0,
            Op::Binary {
                kind: BinaryOp::Add,
                a,
                b,
            },
        );
        let graph = dependency_graph_of(&tape);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph[NodeIndex::new(1)], b);
        assert!(graph.contains_edge(NodeIndex::new(0), NodeIndex::new(2)));
        assert!(graph.contains_edge(NodeIndex::new(1), NodeIndex::new(2)));
    }
}
