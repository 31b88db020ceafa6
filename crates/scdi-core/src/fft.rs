// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralCDI — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Cached 3D FFT plans over `ndarray` volumes.
//!
//! A volume transform is three axis passes with per-axis 1D plans from
//! `rustfft`. Lanes along the leading axes are strided, so each lane is
//! gathered into a scratch buffer, transformed, and scattered back. The
//! inverse transform carries the `1/N` normalisation so a forward/inverse
//! round trip is the identity.

use ndarray::{Array3, ArrayViewMut3, Axis};
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Forward and inverse plans for one fixed volume shape.
pub struct FftPlan3 {
    shape: (usize, usize, usize),
    forward: [Arc<dyn Fft<f64>>; 3],
    inverse: [Arc<dyn Fft<f64>>; 3],
}

impl std::fmt::Debug for FftPlan3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftPlan3")
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

impl FftPlan3 {
    pub fn new(shape: (usize, usize, usize)) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        let dims = [shape.0, shape.1, shape.2];
        let forward = dims.map(|n| planner.plan_fft_forward(n));
        let inverse = dims.map(|n| planner.plan_fft_inverse(n));
        Self {
            shape,
            forward,
            inverse,
        }
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }

    /// Total number of voxels covered by the plan.
    pub fn len(&self) -> usize {
        self.shape.0 * self.shape.1 * self.shape.2
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pass(&self, data: &mut ArrayViewMut3<'_, Complex64>, axis: usize, inverse: bool) {
        let fft = if inverse {
            &self.inverse[axis]
        } else {
            &self.forward[axis]
        };
        let mut lane_buf = vec![Complex64::new(0.0, 0.0); fft.len()];
        for mut lane in data.lanes_mut(Axis(axis)) {
            for (slot, value) in lane_buf.iter_mut().zip(lane.iter()) {
                *slot = *value;
            }
            fft.process(&mut lane_buf);
            for (value, slot) in lane.iter_mut().zip(lane_buf.iter()) {
                *value = *slot;
            }
        }
    }

    pub fn forward_view(&self, data: &mut ArrayViewMut3<'_, Complex64>) {
        for axis in 0..3 {
            self.pass(data, axis, false);
        }
    }

    pub fn inverse_view(&self, data: &mut ArrayViewMut3<'_, Complex64>) {
        for axis in 0..3 {
            self.pass(data, axis, true);
        }
        let scale = 1.0 / self.len() as f64;
        data.mapv_inplace(|v| v * scale);
    }

    pub fn forward(&self, data: &mut Array3<Complex64>) {
        self.forward_view(&mut data.view_mut());
    }

    pub fn inverse(&self, data: &mut Array3<Complex64>) {
        self.inverse_view(&mut data.view_mut());
    }
}

/// Signed reciprocal coordinate of grid index `i` on an axis of length `n`,
/// in radians per voxel: `2π·k/n` with `k` wrapped into `[-n/2, n/2)`.
pub fn freq_coordinate(i: usize, n: usize) -> f64 {
    let signed = if i < n.div_ceil(2) {
        i as isize
    } else {
        i as isize - n as isize
    };
    std::f64::consts::TAU * signed as f64 / n as f64
}
