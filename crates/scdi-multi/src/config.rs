// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralCDI — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Construction-time knobs for a multi-peak reconstruction.

use nalgebra::Matrix3;
use ndarray::Array3;
use scdi_core::LossKind;
use serde::{Deserialize, Serialize};

/// Optional configuration for [`crate::MultiState::new`].
///
/// Everything defaults to the plain uniform-grid reconstruction: L2 loss,
/// support derived from the first peak's intensity, no rotations, host
/// entropy for the peak-selection RNG.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiConfig {
    /// Fit metric reported by the per-peak engines.
    pub loss: LossKind,
    /// Explicit shared support; derived from the first peak when absent.
    pub support: Option<Array3<bool>>,
    /// Per-peak diffractometer rotations. Enables continuous (non-grid)
    /// reciprocal sampling.
    pub rotations: Option<Vec<Matrix3<f64>>>,
    /// Continuous resampling on the canonical grid even without rotations.
    pub high_strain: bool,
    /// Zero measured intensity outside each peak's reciprocal mask.
    pub trunc_rec_support: bool,
    /// Seed for the active-peak selection RNG; host entropy when absent.
    pub seed: Option<u64>,
}

impl MultiConfig {
    /// Convenience for deterministic runs and tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }
}
