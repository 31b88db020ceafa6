// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralCDI — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Composable projection operators over the multi-peak state.
//!
//! The variant set is closed: sequences, the four single-peak projections,
//! and the cross-peak mount. `a * b` composes like functions (`b` runs
//! first), and `repeat` unrolls an operator into a sequence of independent
//! copies, so one "iteration" of a reconstruction recipe is just an operator
//! value applied repeatedly. Every variant mutates the state in place and
//! dispatches to the peak that is active *at application time*; operators
//! never capture a peak reference at construction.

use crate::error::MultiResult;
use crate::mount::MountOp;
use crate::state::MultiState;
use std::ops::Mul;

#[derive(Clone, Debug)]
pub enum Operator {
    /// Fixed ordered sequence; applying it applies each member in order.
    Seq(Vec<Operator>),
    /// One error-reduction iteration on the active peak.
    Er,
    /// One hybrid input-output iteration with feedback `beta`.
    Hio { beta: f64 },
    /// Shrinkwrap support update on the active peak.
    Shrink { threshold: f64, sigma: f64 },
    /// Recenter the active peak (and the shared fields with it).
    Center,
    /// Cross-peak consistency projection and random peak hand-off.
    Mount(MountOp),
}

impl Operator {
    pub fn hio(beta: f64) -> Self {
        Operator::Hio { beta }
    }

    pub fn shrink(threshold: f64, sigma: f64) -> Self {
        Operator::Shrink { threshold, sigma }
    }

    /// A sequence of `times` independent copies of this operator. Each copy
    /// sees the state as left by the previous one.
    pub fn repeat(&self, times: usize) -> Self {
        Operator::Seq(vec![self.clone(); times])
    }

    /// Apply to the state in place; the state is returned for chaining.
    /// Engine failures propagate unchanged.
    pub fn apply<'a>(&self, state: &'a mut MultiState) -> MultiResult<&'a mut MultiState> {
        match self {
            Operator::Seq(ops) => {
                for op in ops {
                    op.apply(state)?;
                }
            }
            Operator::Er => state.active_peak_mut().er()?,
            Operator::Hio { beta } => state.active_peak_mut().hio(*beta)?,
            Operator::Shrink { threshold, sigma } => {
                let active = state.active();
                state.active_peak_mut().shrink(*threshold, *sigma)?;
                state.propagate_support(active);
            }
            Operator::Center => {
                let shift = state.active_peak_mut().center()?;
                state.roll_companions(shift);
            }
            Operator::Mount(op) => op.apply(state)?,
        }
        Ok(state)
    }
}

impl Mul for Operator {
    type Output = Operator;

    /// Function-composition order: in `a * b`, `b` is applied first.
    fn mul(self, rhs: Operator) -> Operator {
        let mut items = match rhs {
            Operator::Seq(ops) => ops,
            other => vec![other],
        };
        match self {
            Operator::Seq(ops) => items.extend(ops),
            other => items.push(other),
        }
        Operator::Seq(items)
    }
}
