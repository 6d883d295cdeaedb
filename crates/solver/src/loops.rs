//! Loop-closure equations.
//!
//! The caller supplies one function that sums vector elements around each
//! closed path. The engine reuses it unchanged at every kinematic order: the
//! [`LoopContext`] it receives decides whether `ctx.eval(v, &[..])` yields a
//! position, velocity or acceleration contribution, and what the overrides
//! mean.
//!
//! ```ignore
//! let loops = move |ctx: &LoopContext<'_>, x: &[f64], drive: f64| {
//!     vec![ctx.eval(crank, &[drive]) + ctx.eval(rod, &[x[0]]) - ctx.eval(slider, &[x[1]])]
//! };
//! ```

use std::cell::RefCell;

use nalgebra::{DVector, Vector2};
use slotmap::{SecondaryMap, SlotMap};

use crate::error::DefinitionError;
use crate::vector::{Order, Polar, PolarState, VectorElement, VectorId};

/// Per-element polar state at one sample.
pub type ElementStates = SecondaryMap<VectorId, PolarState>;

/// The caller's loop-closure function.
///
/// Returns one 2-D closure error per loop; the engine stacks them into a
/// flat residual `[x0, y0, x1, y1, ...]`.
pub trait LoopEquationSystem {
    fn loops(&self, ctx: &LoopContext<'_>, unknowns: &[f64], drive: f64) -> Vec<Vector2<f64>>;
}

impl<F> LoopEquationSystem for F
where
    F: Fn(&LoopContext<'_>, &[f64], f64) -> Vec<Vector2<f64>>,
{
    fn loops(&self, ctx: &LoopContext<'_>, unknowns: &[f64], drive: f64) -> Vec<Vector2<f64>> {
        self(ctx, unknowns, drive)
    }
}

/// Evaluation context for one call of the loop equations.
///
/// Records the polar values each element was evaluated with, so that the
/// converged call of one order can seed the next.
pub struct LoopContext<'a> {
    vectors: &'a SlotMap<VectorId, VectorElement>,
    known: &'a ElementStates,
    order: Order,
    observed: RefCell<SecondaryMap<VectorId, Polar>>,
    fault: RefCell<Option<DefinitionError>>,
}

impl<'a> LoopContext<'a> {
    pub(crate) fn new(
        vectors: &'a SlotMap<VectorId, VectorElement>,
        known: &'a ElementStates,
        order: Order,
    ) -> Self {
        Self {
            vectors,
            known,
            order,
            observed: RefCell::new(SecondaryMap::new()),
            fault: RefCell::new(None),
        }
    }

    /// The kinematic order being evaluated.
    pub fn order(&self) -> Order {
        self.order
    }

    /// Contribution of element `vector` at the current order.
    ///
    /// `overrides` supply the element's free parameters, magnitude first. A
    /// wrong override count is recorded as a definition fault and the
    /// element contributes the zero vector.
    pub fn eval(&self, vector: VectorId, overrides: &[f64]) -> Vector2<f64> {
        let Some(element) = self.vectors.get(vector) else {
            self.record_fault(DefinitionError::UnknownVector);
            return Vector2::zeros();
        };
        let known = self
            .known
            .get(vector)
            .copied()
            .unwrap_or_else(|| element.declared_state());

        match element.evaluate(self.order, &known, overrides) {
            Ok((values, contribution)) => {
                self.observed.borrow_mut().insert(vector, values);
                contribution
            }
            Err(fault) => {
                self.record_fault(fault);
                Vector2::zeros()
            }
        }
    }

    fn record_fault(&self, fault: DefinitionError) {
        let mut slot = self.fault.borrow_mut();
        if slot.is_none() {
            *slot = Some(fault);
        }
    }

    /// Evaluate `system` and flatten its closure errors into a residual.
    pub(crate) fn residual(
        &self,
        system: &dyn LoopEquationSystem,
        unknowns: &[f64],
        drive: f64,
    ) -> Result<DVector<f64>, DefinitionError> {
        let closures = system.loops(self, unknowns, drive);
        if let Some(fault) = self.fault.borrow_mut().take() {
            return Err(fault);
        }
        Ok(DVector::from_iterator(
            closures.len() * 2,
            closures.iter().flat_map(|c| [c.x, c.y]),
        ))
    }

    /// Values observed during the last evaluation.
    pub(crate) fn into_observed(self) -> SecondaryMap<VectorId, Polar> {
        self.observed.into_inner()
    }
}
