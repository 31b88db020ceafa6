// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralCDI — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Continuous reciprocal sampling geometry for rotated / high-strain peaks.
//!
//! Each peak's rotation carries the canonical reciprocal grid to that peak's
//! detector frame. A grid point survives only if every peak's rotation keeps
//! it inside the canonical periodic domain `[-π, π]` on all three axes; the
//! shared `keep_ind` subset keeps the flattened indexing identical across
//! peaks so data, masks, and coordinates stay aligned.

use nalgebra::{Matrix3, Vector3};
use scdi_core::{fft::freq_coordinate, SamplePoints};
use std::f64::consts::PI;
use tracing::debug;

#[derive(Debug)]
pub(crate) struct Sampling {
    /// Flattened (row-major) grid indices retained by every peak.
    pub keep_ind: Vec<usize>,
    /// Rotated sample coordinates per peak, aligned with `keep_ind`.
    pub coords: Vec<SamplePoints>,
}

pub(crate) fn build_sampling(
    shape: (usize, usize, usize),
    rotations: &[Matrix3<f64>],
) -> Sampling {
    let (nx, ny, nz) = shape;
    let total = nx * ny * nz;
    let mut keep_ind = Vec::new();
    let mut coords = vec![SamplePoints::default(); rotations.len()];
    let mut rotated = vec![Vector3::zeros(); rotations.len()];
    let mut flat = 0usize;
    for i in 0..nx {
        for j in 0..ny {
            for k in 0..nz {
                let q = Vector3::new(
                    freq_coordinate(i, nx),
                    freq_coordinate(j, ny),
                    freq_coordinate(k, nz),
                );
                for (slot, rotation) in rotated.iter_mut().zip(rotations.iter()) {
                    *slot = rotation * q;
                }
                let keep = rotated
                    .iter()
                    .all(|p| p.iter().all(|c| c.abs() <= PI));
                if keep {
                    keep_ind.push(flat);
                    for (peak, p) in coords.iter_mut().zip(rotated.iter()) {
                        peak.xs.push(p.x);
                        peak.ys.push(p.y);
                        peak.zs.push(p.z);
                    }
                }
                flat += 1;
            }
        }
    }
    debug!(
        kept = keep_ind.len(),
        total,
        peaks = rotations.len(),
        "built continuous sampling lattice"
    );
    Sampling { keep_ind, coords }
}
