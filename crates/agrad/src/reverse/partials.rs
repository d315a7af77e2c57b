//! Constant folding for mixed `Var`/`f64` primitives.
//!
//! [`Operand`] lifts the distinction between a differentiated variable and
//! a plain constant into the type system. Primitives generic over `Operand`
//! allocate no node, adjoint slot or partial for constant arguments, and
//! skip computing their partials entirely.

use smallvec::SmallVec;

use super::node::Op;
use super::tape::{NodeId, Tape, with_tape};
use super::var::Var;

/// An argument to a reverse-mode primitive: either `f64` or `Var`.
pub trait Operand: Copy {
    /// `true` for types that carry a tape node.
    const DIFFERENTIABLE: bool;

    /// Value of the operand, resolved against `tape`.
    fn primal_in(&self, tape: &Tape) -> f64;

    /// Node of the operand, `None` for constants.
    fn node_in(&self, tape: &Tape) -> Option<NodeId>;

    /// The operand as a variable, `None` for constants.
    fn as_var(&self) -> Option<Var>;
}

impl Operand for f64 {
    const DIFFERENTIABLE: bool = false;

    fn primal_in(&self, _tape: &Tape) -> f64 {
        *self
    }

    fn node_in(&self, _tape: &Tape) -> Option<NodeId> {
        None
    }

    fn as_var(&self) -> Option<Var> {
        None
    }
}

impl Operand for Var {
    const DIFFERENTIABLE: bool = true;

    fn primal_in(&self, tape: &Tape) -> f64 {
        tape.get(*self).value()
    }

    fn node_in(&self, tape: &Tape) -> Option<NodeId> {
        tape.get(*self);
        Some(self.id())
    }

    fn as_var(&self) -> Option<Var> {
        Some(*self)
    }
}

/// Builder for an n-ary node whose partials are computed up front.
///
/// Constant operands are dropped as they are added, so the resulting node
/// references only the differentiated ones. With no differentiated operand
/// at all, [`build`](Self::build) yields a plain leaf.
///
/// # Example
///
/// ```
/// use agrad::Var;
/// use agrad::reverse::{OperandsAndPartials, grad, start_nested};
///
/// let _scope = start_nested();
/// let mu = Var::new(1.0);
/// let sigma = 2.0;
/// let y = 3.0;
/// // Normal log density up to a constant, differentiated in mu only.
/// let z = (y - 1.0) / sigma;
/// let mut builder = OperandsAndPartials::new();
/// builder.add(y, -z / sigma);
/// builder.add(mu, z / sigma);
/// builder.add(sigma, (z * z - 1.0) / sigma);
/// let lp = builder.build(-0.5 * z * z - sigma.ln());
/// assert_eq!(grad(&lp, &[mu]), vec![0.5]);
/// ```
#[derive(Debug, Default)]
pub struct OperandsAndPartials {
    operands: SmallVec<[Var; 8]>,
    partials: SmallVec<[f64; 8]>,
}

impl OperandsAndPartials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operand and its partial. Constants are ignored.
    pub fn add<O: Operand>(&mut self, operand: O, partial: f64) {
        if let Some(var) = operand.as_var() {
            self.operands.push(var);
            self.partials.push(partial);
        }
    }

    /// Register a slice of operands and their partials.
    ///
    /// The partial is only evaluated for differentiated operands.
    pub fn add_slice<O: Operand>(
        &mut self,
        operands: &[O],
        mut partial: impl FnMut(usize) -> f64,
    ) {
        if !O::DIFFERENTIABLE {
            return;
        }
        for (i, operand) in operands.iter().enumerate() {
            self.add(*operand, partial(i));
        }
    }

    /// Number of differentiated operands registered so far.
    pub fn len(&self) -> usize {
        self.operands.len()
    }

    /// Check if every operand so far was constant.
    pub fn is_empty(&self) -> bool {
        self.operands.is_empty()
    }

    /// Allocate the node.
    pub fn build(self, value: f64) -> Var {
        with_tape(|t| self.build_in(t, value))
    }

    pub(crate) fn build_in(self, t: &mut Tape, value: f64) -> Var {
        if self.operands.is_empty() {
            return t.push(value, Op::Leaf);
        }
        for var in &self.operands {
            t.get(*var);
        }
        let operands = t.alloc_ids(self.operands.iter().map(Var::id));
        let partials = t.alloc_values(self.partials.iter().copied());
        t.push(value, Op::Precomputed { operands, partials })
    }
}
