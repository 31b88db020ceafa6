// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralCDI — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Separable periodic Gaussian blur used by the shrinkwrap support update.

use ndarray::{Array3, Axis};

/// Normalised 1D Gaussian taps truncated at `⌈3σ⌉`.
fn kernel(sigma: f64) -> Vec<f64> {
    let radius = (3.0 * sigma).ceil().max(1.0) as usize;
    let mut taps: Vec<f64> = (0..=2 * radius)
        .map(|t| {
            let x = t as f64 - radius as f64;
            (-0.5 * (x / sigma).powi(2)).exp()
        })
        .collect();
    let total: f64 = taps.iter().sum();
    for tap in taps.iter_mut() {
        *tap /= total;
    }
    taps
}

/// Blur a volume with an isotropic Gaussian of width `sigma`, one separable
/// pass per axis with periodic wrap. Total mass is preserved.
pub fn gaussian_blur3(field: &Array3<f64>, sigma: f64) -> Array3<f64> {
    assert!(sigma > 0.0, "blur width must be positive");
    let taps = kernel(sigma);
    let radius = taps.len() / 2;
    let mut out = field.clone();
    for axis in 0..3 {
        let n = out.len_of(Axis(axis));
        let mut scratch = vec![0.0; n];
        for mut lane in out.lanes_mut(Axis(axis)) {
            for (i, slot) in scratch.iter_mut().enumerate() {
                let mut acc = 0.0;
                for (t, &w) in taps.iter().enumerate() {
                    let offset = i as isize + t as isize - radius as isize;
                    let src = offset.rem_euclid(n as isize) as usize;
                    acc += w * lane[src];
                }
                *slot = acc;
            }
            for (value, slot) in lane.iter_mut().zip(scratch.iter()) {
                *value = *slot;
            }
        }
    }
    out
}
