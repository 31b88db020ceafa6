// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralCDI — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use thiserror::Error;

pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Errors emitted by the transform and intensity engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("{context}: expected shape {expected:?}, got {got:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("{0} must not be empty")]
    EmptyInput(&'static str),
    #[error("measured intensity must be non-negative, found {value} at sample {index}")]
    NegativeIntensity { index: usize, value: f64 },
    #[error("sample coordinate arrays ({xs}, {ys}, {zs}) disagree with {expected} data samples")]
    GeometryLength {
        expected: usize,
        xs: usize,
        ys: usize,
        zs: usize,
    },
    #[error("unknown loss kind '{0}'; expected one of: l2, poisson")]
    UnknownLoss(String),
}
