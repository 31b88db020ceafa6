// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralCDI — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Shared-object state across every measured peak.
//!
//! One physical object (density plus displacement field) is constrained by
//! N diffraction peaks. Each peak keeps its own complex reconstruction and
//! engine; the shared fields live here. Exactly one peak is active at a
//! time: the projection operators read the active index, and only the mount
//! projection may move it.

use crate::config::MultiConfig;
use crate::error::{MultiError, MultiResult};
use crate::sampling::{build_sampling, Sampling};
use nalgebra::{Matrix3, Vector3};
use ndarray::Array3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scdi_core::{derive_support, CoreState};
use scdi_peak::{roll3, PeakState};
use tracing::{info, warn};

/// Reciprocal vectors with `|g|²` at or below this are rejected outright:
/// the unwrap step divides by `g·g`.
const G_NORM_EPS: f64 = 1e-12;

/// Aggregated reconstruction state for a multi-peak run.
#[derive(Debug)]
pub struct MultiState {
    pub(crate) rho: Array3<f64>,
    pub(crate) ux: Array3<f64>,
    pub(crate) uy: Array3<f64>,
    pub(crate) uz: Array3<f64>,
    pub(crate) support: Array3<bool>,
    pub(crate) peaks: Vec<PeakState>,
    pub(crate) g_vecs: Vec<Vector3<f64>>,
    pub(crate) rng: StdRng,
    pub(crate) sampling: Option<Sampling>,
    active: usize,
}

impl MultiState {
    /// Build the state from measured peaks.
    ///
    /// Fails fast on an empty peak list, count or shape mismatches, and
    /// degenerate reciprocal vectors. When no support is configured the
    /// first peak's intensity autocorrelation provides the initial guess.
    pub fn new(
        intensities: &[Array3<f64>],
        g_vecs: &[Vector3<f64>],
        rec_masks: &[Array3<bool>],
        config: MultiConfig,
    ) -> MultiResult<Self> {
        if intensities.is_empty() {
            return Err(MultiError::EmptyPeakList);
        }
        if g_vecs.len() != intensities.len() || rec_masks.len() != intensities.len() {
            return Err(MultiError::CountMismatch {
                intensities: intensities.len(),
                g_vecs: g_vecs.len(),
                masks: rec_masks.len(),
            });
        }
        let shape = intensities[0].dim();
        for (index, intens) in intensities.iter().enumerate() {
            if intens.dim() != shape {
                return Err(MultiError::ShapeMismatch {
                    index,
                    what: "intensity",
                    expected: intensities[0].shape().to_vec(),
                    got: intens.shape().to_vec(),
                });
            }
            if rec_masks[index].dim() != shape {
                return Err(MultiError::ShapeMismatch {
                    index,
                    what: "reciprocal mask",
                    expected: intensities[0].shape().to_vec(),
                    got: rec_masks[index].shape().to_vec(),
                });
            }
            let norm_sq = g_vecs[index].norm_squared();
            if norm_sq <= G_NORM_EPS {
                return Err(MultiError::DegenerateGVector { index, norm_sq });
            }
        }

        let support = match config.support {
            Some(support) => {
                if support.dim() != shape {
                    return Err(MultiError::ShapeMismatch {
                        index: 0,
                        what: "support",
                        expected: intensities[0].shape().to_vec(),
                        got: support.shape().to_vec(),
                    });
                }
                support
            }
            None => derive_support(&intensities[0], 0.1)?,
        };

        let sampling = if config.rotations.is_some() || config.high_strain {
            let rotations: Vec<Matrix3<f64>> = match &config.rotations {
                Some(rotations) => {
                    if rotations.len() != intensities.len() {
                        return Err(MultiError::RotationCount {
                            supplied: rotations.len(),
                            peaks: intensities.len(),
                        });
                    }
                    for rotation in rotations {
                        if (rotation.determinant().abs() - 1.0).abs() > 1e-6 {
                            warn!("rotation matrix determinant deviates from ±1");
                        }
                    }
                    rotations.clone()
                }
                None => vec![Matrix3::identity(); intensities.len()],
            };
            let sampling = build_sampling(shape, &rotations);
            if sampling.keep_ind.is_empty() {
                return Err(MultiError::EmptySampling);
            }
            Some(sampling)
        } else {
            None
        };

        let mut peaks = Vec::with_capacity(intensities.len());
        for (index, (intens, mask)) in intensities.iter().zip(rec_masks.iter()).enumerate() {
            let core = match &sampling {
                Some(sampling) => {
                    let flat_intens: Vec<f64> = intens.iter().copied().collect();
                    let flat_mask: Vec<bool> = mask.iter().copied().collect();
                    let sub_intens: Vec<f64> =
                        sampling.keep_ind.iter().map(|&i| flat_intens[i]).collect();
                    let sub_mask: Vec<bool> =
                        sampling.keep_ind.iter().map(|&i| flat_mask[i]).collect();
                    CoreState::with_points(
                        config.loss,
                        sub_intens,
                        sub_mask,
                        sampling.coords[index].clone(),
                        shape,
                        config.trunc_rec_support,
                    )?
                }
                None => CoreState::new(config.loss, intens, mask, config.trunc_rec_support)?,
            };
            peaks.push(PeakState::from_core(core, support.clone()));
        }

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let active = rng.gen_range(0..peaks.len());
        info!(
            peaks = peaks.len(),
            active,
            sampled = sampling.as_ref().map(|s| s.keep_ind.len()),
            "constructed multi-peak state"
        );

        Ok(Self {
            rho: Array3::zeros(shape),
            ux: Array3::zeros(shape),
            uy: Array3::zeros(shape),
            uz: Array3::zeros(shape),
            support,
            peaks,
            g_vecs: g_vecs.to_vec(),
            rng,
            sampling,
            active,
        })
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.rho.dim()
    }

    pub fn num_peaks(&self) -> usize {
        self.peaks.len()
    }

    /// Index of the peak currently driving the single-peak projections.
    /// Written only by the mount projection.
    pub fn active(&self) -> usize {
        self.active
    }

    pub(crate) fn set_active(&mut self, index: usize) {
        debug_assert!(index < self.peaks.len());
        self.active = index;
    }

    pub fn peak(&self, index: usize) -> &PeakState {
        &self.peaks[index]
    }

    pub fn active_peak(&self) -> &PeakState {
        &self.peaks[self.active]
    }

    pub fn active_peak_mut(&mut self) -> &mut PeakState {
        &mut self.peaks[self.active]
    }

    pub fn g_vec(&self, index: usize) -> Vector3<f64> {
        self.g_vecs[index]
    }

    pub fn rho(&self) -> &Array3<f64> {
        &self.rho
    }

    pub fn rho_mut(&mut self) -> &mut Array3<f64> {
        &mut self.rho
    }

    pub fn support(&self) -> &Array3<bool> {
        &self.support
    }

    pub fn displacement(&self) -> (&Array3<f64>, &Array3<f64>, &Array3<f64>) {
        (&self.ux, &self.uy, &self.uz)
    }

    pub fn displacement_mut(
        &mut self,
    ) -> (&mut Array3<f64>, &mut Array3<f64>, &mut Array3<f64>) {
        (&mut self.ux, &mut self.uy, &mut self.uz)
    }

    /// Retained sample count for continuous geometries, `None` on grids.
    pub fn retained_samples(&self) -> Option<usize> {
        self.sampling.as_ref().map(|s| s.keep_ind.len())
    }

    /// Fit metric of the active peak's engine.
    pub fn loss(&self) -> f64 {
        self.active_peak().core.loss()
    }

    /// Copy the support written by shrinkwrap on `from` to the shared field
    /// and every other peak; all sub-states index one physical support.
    pub(crate) fn propagate_support(&mut self, from: usize) {
        let updated = self.peaks[from].support.clone();
        for (index, peak) in self.peaks.iter_mut().enumerate() {
            if index != from {
                peak.support.assign(&updated);
            }
        }
        self.support.assign(&updated);
    }

    /// Apply the circular shift produced by centering the active peak to the
    /// shared fields and the companion peaks, keeping every volume aligned.
    pub(crate) fn roll_companions(&mut self, shift: [isize; 3]) {
        if shift == [0, 0, 0] {
            return;
        }
        self.rho = roll3(&self.rho, shift);
        self.ux = roll3(&self.ux, shift);
        self.uy = roll3(&self.uy, shift);
        self.uz = roll3(&self.uz, shift);
        self.support = roll3(&self.support, shift);
        let active = self.active;
        for (index, peak) in self.peaks.iter_mut().enumerate() {
            if index != active {
                peak.real_space = roll3(&peak.real_space, shift);
                peak.support = roll3(&peak.support, shift);
            }
        }
    }
}
