//! Batched linear-algebra nodes.
//!
//! A batched node replaces what would otherwise be O(n^2) or O(n^3) scalar
//! nodes with a single node that performs one combined adjoint update using
//! faer. Operand values are cached column-major in the auxiliary `f64` pool
//! so the reverse pass can view them as [`MatRef`]s without copying.
//!
//! Multi-output nodes (matrix product, linear solve) allocate their outputs
//! as leaves *before* the batched node. Consumers of the outputs therefore
//! chain first, and the batched node then reads the output adjoints and
//! distributes them to its operands.

use faer::linalg::matmul::matmul;
use faer::linalg::solvers::Solve;
use faer::{Accum, Mat, MatRef, Par};
use smallvec::SmallVec;

use super::node::{IdRange, Node, ValueRange};
use super::tape::NodeId;

/// A dense operand: cached values plus node references when differentiated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block {
    pub(crate) values: ValueRange,
    pub(crate) ids: Option<IdRange>,
}

impl Block {
    fn values<'a>(&self, pool: &'a [f64]) -> &'a [f64] {
        &pool[self.values.as_range()]
    }

    fn ids<'a>(&self, pool: &'a [NodeId]) -> Option<&'a [NodeId]> {
        self.ids.map(|range| &pool[range.as_range()])
    }
}

/// Batched records stored beside the node array.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Batched {
    /// Inner product; the result is the batched node itself.
    Dot { lhs: Block, rhs: Block },
    /// `x^T A x` with `A` n-by-n; the result is the batched node itself.
    QuadForm { a: Block, x: Block, n: u32 },
    /// `C = A B` with `A` rows-by-inner and `B` inner-by-cols.
    MatMul {
        a: Block,
        b: Block,
        rows: u32,
        inner: u32,
        cols: u32,
        out: IdRange,
    },
    /// `C = A^-1 B` with `A` n-by-n and `B` n-by-cols.
    Solve {
        a: Block,
        b: Block,
        n: u32,
        cols: u32,
        out: IdRange,
    },
}

impl Batched {
    pub(crate) fn operands(&self, ids: &[NodeId]) -> SmallVec<[NodeId; 4]> {
        let mut operands = SmallVec::new();
        let (first, second) = match *self {
            Self::Dot { lhs, rhs } => (lhs, rhs),
            Self::QuadForm { a, x, .. } => (a, x),
            Self::MatMul { a, b, .. } | Self::Solve { a, b, .. } => (a, b),
        };
        for block in [first, second] {
            if let Some(block_ids) = block.ids(ids) {
                operands.extend_from_slice(block_ids);
            }
        }
        if let Self::MatMul { out, .. } | Self::Solve { out, .. } = self {
            operands.extend_from_slice(&ids[out.as_range()]);
        }
        operands
    }

    /// Distribute the adjoint to the operands.
    ///
    /// `adjoint` is the batched node's own adjoint, used by the
    /// single-output variants.
    pub(crate) fn chain(&self, adjoint: f64, nodes: &mut [Node], values: &[f64], ids: &[NodeId]) {
        match *self {
            Self::Dot { lhs, rhs } => {
                let (lhs_values, rhs_values) = (lhs.values(values), rhs.values(values));
                if let Some(lhs_ids) = lhs.ids(ids) {
                    accumulate(nodes, lhs_ids, rhs_values.iter().map(|&v| adjoint * v));
                }
                if let Some(rhs_ids) = rhs.ids(ids) {
                    accumulate(nodes, rhs_ids, lhs_values.iter().map(|&v| adjoint * v));
                }
            }
            Self::QuadForm { a, x, n } => {
                let n = n as usize;
                let a_mat = MatRef::from_column_major_slice(a.values(values), n, n);
                let x_values = x.values(values);
                if let Some(a_ids) = a.ids(ids) {
                    // d/dA_ij = x_i x_j
                    let grads = (0..n).flat_map(|j| {
                        (0..n).map(move |i| adjoint * x_values[i] * x_values[j])
                    });
                    accumulate(nodes, a_ids, grads);
                }
                if let Some(x_ids) = x.ids(ids) {
                    // d/dx = (A + A^T) x
                    let grads = (0..n).map(|i| {
                        let s: f64 = (0..n)
                            .map(|j| (a_mat[(i, j)] + a_mat[(j, i)]) * x_values[j])
                            .sum();
                        adjoint * s
                    });
                    accumulate(nodes, x_ids, grads);
                }
            }
            Self::MatMul {
                a,
                b,
                rows,
                inner,
                cols,
                out,
            } => {
                let (m, k, n) = (rows as usize, inner as usize, cols as usize);
                let adj_c = output_adjoints(nodes, &ids[out.as_range()], m, n);
                if let Some(a_ids) = a.ids(ids) {
                    let b_mat = MatRef::from_column_major_slice(b.values(values), k, n);
                    let mut adj_a = Mat::<f64>::zeros(m, k);
                    matmul(
                        adj_a.as_mut(),
                        Accum::Replace,
                        adj_c.as_ref(),
                        b_mat.transpose(),
                        1.0,
                        Par::Seq,
                    );
                    accumulate_mat(nodes, a_ids, adj_a.as_ref());
                }
                if let Some(b_ids) = b.ids(ids) {
                    let a_mat = MatRef::from_column_major_slice(a.values(values), m, k);
                    let mut adj_b = Mat::<f64>::zeros(k, n);
                    matmul(
                        adj_b.as_mut(),
                        Accum::Replace,
                        a_mat.transpose(),
                        adj_c.as_ref(),
                        1.0,
                        Par::Seq,
                    );
                    accumulate_mat(nodes, b_ids, adj_b.as_ref());
                }
            }
            Self::Solve {
                a,
                b,
                n,
                cols,
                out,
            } => {
                let (n, cols) = (n as usize, cols as usize);
                let out_ids = &ids[out.as_range()];
                let mut adj_b = output_adjoints(nodes, out_ids, n, cols);
                // adj_B = A^-T adj_C
                let a_mat = MatRef::from_column_major_slice(a.values(values), n, n);
                let lu = a_mat.transpose().partial_piv_lu();
                lu.solve_in_place(&mut adj_b);

                if let Some(a_ids) = a.ids(ids) {
                    // adj_A = -adj_B C^T
                    let c_mat = Mat::from_fn(n, cols, |i, j| nodes[out_ids[i + j * n].index()].value);
                    let mut adj_a = Mat::<f64>::zeros(n, n);
                    matmul(
                        adj_a.as_mut(),
                        Accum::Replace,
                        adj_b.as_ref(),
                        c_mat.transpose(),
                        -1.0,
                        Par::Seq,
                    );
                    accumulate_mat(nodes, a_ids, adj_a.as_ref());
                }
                if let Some(b_ids) = b.ids(ids) {
                    accumulate_mat(nodes, b_ids, adj_b.as_ref());
                }
            }
        }
    }
}

/// Gather output adjoints into a column-major matrix.
fn output_adjoints(nodes: &[Node], out: &[NodeId], rows: usize, cols: usize) -> Mat<f64> {
    Mat::from_fn(rows, cols, |i, j| nodes[out[i + j * rows].index()].adjoint)
}

fn accumulate(nodes: &mut [Node], ids: &[NodeId], grads: impl Iterator<Item = f64>) {
    for (id, grad) in ids.iter().zip(grads) {
        nodes[id.index()].adjoint += grad;
    }
}

fn accumulate_mat(nodes: &mut [Node], ids: &[NodeId], grads: MatRef<'_, f64>) {
    let rows = grads.nrows();
    for (k, id) in ids.iter().enumerate() {
        nodes[id.index()].adjoint += grads[(k % rows, k / rows)];
    }
}
