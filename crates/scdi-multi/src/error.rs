// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralCDI — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use scdi_core::CoreError;
use scdi_peak::PeakError;
use thiserror::Error;

pub type MultiResult<T> = std::result::Result<T, MultiError>;

/// Errors from multi-peak state construction and operator application.
#[derive(Debug, Error)]
pub enum MultiError {
    #[error("at least one diffraction peak is required")]
    EmptyPeakList,
    #[error(
        "peak counts disagree: {intensities} intensities, {g_vecs} g-vectors, {masks} reciprocal masks"
    )]
    CountMismatch {
        intensities: usize,
        g_vecs: usize,
        masks: usize,
    },
    #[error("peak {index}: {what} shape {got:?} does not match {expected:?}")]
    ShapeMismatch {
        index: usize,
        what: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("peak {index} has a degenerate reciprocal vector (|g|² = {norm_sq})")]
    DegenerateGVector { index: usize, norm_sq: f64 },
    #[error("{supplied} rotation matrices supplied for {peaks} peaks")]
    RotationCount { supplied: usize, peaks: usize },
    #[error("every reciprocal sample was excluded by the rotated geometry")]
    EmptySampling,
    #[error("reciprocal basis matrix is singular")]
    SingularBasis,
    #[error(transparent)]
    Peak(#[from] PeakError),
    #[error(transparent)]
    Core(#[from] CoreError),
}
