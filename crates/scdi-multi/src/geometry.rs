// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralCDI — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Angle arithmetic for the phase-unwrapping step.

use num_complex::Complex64;
use std::f64::consts::{PI, TAU};

/// Amplitude below which a complex sample's phase is numerically undefined.
pub const PHASE_AMP_EPS: f64 = 1e-6;

/// Signed difference `a − b` wrapped into `(-π, π]`.
///
/// The raw difference is reduced modulo `2π` and the minimum-magnitude
/// representative among `d`, `d − 2π`, `d + 2π` is kept; at the `±π` tie the
/// positive branch wins so the result stays in the half-open interval.
pub fn angle_difference(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(TAU);
    let mut best = d;
    for candidate in [d - TAU, d + TAU] {
        if candidate.abs() < best.abs() {
            best = candidate;
        }
    }
    if best <= -PI {
        best + TAU
    } else {
        best
    }
}

/// Wrapped difference between a complex sample's phase and `target`.
///
/// Returns `0` when the amplitude is below [`PHASE_AMP_EPS`]: a near-zero
/// voxel has no meaningful phase and must not steer the unwrap.
pub fn min_diff_angle(value: Complex64, target: f64) -> f64 {
    if value.norm() < PHASE_AMP_EPS {
        return 0.0;
    }
    angle_difference(value.arg(), target)
}
