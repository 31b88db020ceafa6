// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralCDI — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! The mount projection: reconcile the active peak with the shared object,
//! then hand off to a randomly drawn peak.
//!
//! Sign convention, used consistently here and in the reprojection: a peak's
//! real-space field is `rho · exp(−i g·u)`. The phase-unwrap step therefore
//! measures each voxel's discrepancy against the target angle `−g·u`, and a
//! displacement correction of `delta·g` changes the carried phase by
//! `−delta·(g·g)`.

use crate::error::{MultiError, MultiResult};
use crate::geometry::min_diff_angle;
use crate::state::MultiState;
use nalgebra::{Matrix3, Vector3};
use ndarray::{Array3, Zip};
use num_complex::Complex64;
use rand::Rng;
use scdi_core::state::AMP_EPS;
use std::f64::consts::TAU;
use tracing::{debug, info};

/// Below this total density the shared object is considered unset and the
/// mount bootstraps entirely from the active peak's own field.
const RHO_EPS: f64 = 1e-6;

/// Cross-peak consistency projection (see module docs).
#[derive(Clone, Debug)]
pub struct MountOp {
    beta: f64,
    /// Rows are the primitive reciprocal-lattice vectors; every peak's `g`
    /// is an integer combination of them.
    recip_basis: Matrix3<f64>,
    /// Columns are the primitive real-lattice vectors `2π·recip_basis⁻¹`,
    /// the translations a phase measurement can never distinguish.
    real_basis: Matrix3<f64>,
}

impl MountOp {
    /// `beta` blends how much of the new phase estimate to trust. The basis
    /// must be invertible; the unwrap solves against it per voxel.
    pub fn new(beta: f64, recip_basis: Matrix3<f64>) -> MultiResult<Self> {
        let inverse = recip_basis
            .try_inverse()
            .ok_or(MultiError::SingularBasis)?;
        Ok(Self {
            beta,
            recip_basis,
            real_basis: inverse * TAU,
        })
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub(crate) fn apply(&self, state: &mut MultiState) -> MultiResult<()> {
        let active = state.active();
        let g = state.g_vecs[active];
        let gg = g.norm_squared();

        // Least-squares amplitude match between the active peak and the
        // shared density scale, restricted to the support.
        let mut num = 0.0;
        let mut den = 0.0;
        let mut rho_total = 0.0;
        Zip::from(&state.peaks[active].real_space)
            .and(&state.rho)
            .and(&state.support)
            .for_each(|rs, &rho, &inside| {
                if inside {
                    let amp = rs.norm();
                    num += amp * rho;
                    den += amp * amp;
                    rho_total += rho;
                }
            });
        let (beta, rsp_mul) = if rho_total < RHO_EPS {
            // Density effectively unset (first mount): trust the peak fully.
            (1.0, 1.0)
        } else if den > AMP_EPS * AMP_EPS {
            (self.beta, num / den)
        } else {
            (self.beta, 1.0)
        };
        debug!(active, rsp_mul, beta, "mount rescale");

        // Rescale the peak onto the shared scale and blend the density.
        // Outside the support neither field carries information.
        Zip::from(&mut state.peaks[active].real_space)
            .and(&mut state.rho)
            .and(&state.support)
            .for_each(|rs, rho, &inside| {
                if inside {
                    *rs *= rsp_mul;
                    *rho = (1.0 - beta) * *rho + beta * rs.norm();
                } else {
                    *rs = Complex64::new(0.0, 0.0);
                    *rho = 0.0;
                }
            });
        Zip::from(&mut state.ux)
            .and(&mut state.uy)
            .and(&mut state.uz)
            .and(&state.support)
            .for_each(|ux, uy, uz, &inside| {
                if !inside {
                    *ux = 0.0;
                    *uy = 0.0;
                    *uz = 0.0;
                }
            });

        // Phase unwrap: project the measured phase discrepancy onto the
        // displacement field along this peak's g. The median over live
        // voxels removes the global phase offset the data cannot fix.
        let dim = state.rho.raw_dim();
        let mut delta = Array3::<f64>::zeros(dim);
        let mut live = Array3::<bool>::from_elem(dim, false);
        let mut live_values = Vec::new();
        Zip::from(&mut delta)
            .and(&mut live)
            .and(&state.peaks[active].real_space)
            .and(&state.ux)
            .and(&state.uy)
            .and(&state.uz)
            .for_each(|d, l, &rs, &ux, &uy, &uz| {
                let target = -(g.x * ux + g.y * uy + g.z * uz);
                let value = beta * min_diff_angle(rs, target) / gg;
                *d = value;
                *l = rs.norm() > AMP_EPS;
                if *l {
                    live_values.push(value);
                }
            });
        let offset = median(&mut live_values);
        Zip::from(&mut state.ux)
            .and(&mut state.uy)
            .and(&mut state.uz)
            .and(&delta)
            .and(&live)
            .for_each(|ux, uy, uz, &d, &l| {
                if l {
                    let correction = d - offset;
                    *ux -= correction * g.x;
                    *uy -= correction * g.y;
                    *uz -= correction * g.z;
                }
            });

        // Lattice unwrap: a displacement is observable only modulo the
        // real-lattice translations, so strip the integer part.
        Zip::from(&mut state.ux)
            .and(&mut state.uy)
            .and(&mut state.uz)
            .and(&state.support)
            .for_each(|ux, uy, uz, &inside| {
                if !inside {
                    return;
                }
                let coords = self.recip_basis * Vector3::new(*ux, *uy, *uz) / TAU;
                let wraps = coords.map(|c| (c + 0.5).floor());
                if wraps != Vector3::zeros() {
                    let correction = self.real_basis * wraps;
                    *ux -= correction.x;
                    *uy -= correction.y;
                    *uz -= correction.z;
                }
            });

        // Hand off to a uniformly drawn peak (possibly the same one) and
        // rebuild its field from the shared object.
        let next = state.rng.gen_range(0..state.peaks.len());
        state.set_active(next);
        info!(from = active, to = next, "mount switched active peak");

        let g_next = state.g_vecs[next];
        Zip::from(&mut state.peaks[next].real_space)
            .and(&state.rho)
            .and(&state.ux)
            .and(&state.uy)
            .and(&state.uz)
            .for_each(|rs, &rho, &ux, &uy, &uz| {
                let phase = -(g_next.x * ux + g_next.y * uy + g_next.z * uz);
                *rs = Complex64::from_polar(rho, phase);
            });
        let peak = &mut state.peaks[next];
        peak.core.forward(&peak.real_space)?;
        let mut num = 0.0;
        let mut den = 0.0;
        for ((value, &amp), &masked) in peak
            .core
            .recip_space()
            .iter()
            .zip(peak.core.amplitude())
            .zip(peak.core.rec_support())
        {
            if masked {
                let norm = value.norm();
                num += amp * norm;
                den += norm * norm;
            }
        }
        let scale = if den > AMP_EPS * AMP_EPS {
            num / den
        } else {
            1.0
        };
        peak.real_space.mapv_inplace(|v| v * scale);
        for value in peak.core.recip_space_mut() {
            *value *= scale;
        }
        debug!(scale, "mount reprojected the new active peak");
        Ok(())
    }
}

/// Median of the collected values; `0` for an empty set (no live voxels
/// means there is no offset to remove).
fn median(values: &mut Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mid = values.len() / 2;
    let (_, upper, _) = values.select_nth_unstable_by(mid, f64::total_cmp);
    let upper = *upper;
    if values.len() % 2 == 1 {
        upper
    } else {
        let lower = values[..mid]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        0.5 * (lower + upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_odd_and_even_sets() {
        assert_eq!(median(&mut vec![3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut vec![4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&mut Vec::new()), 0.0);
        assert_eq!(median(&mut vec![7.25]), 7.25);
    }

    #[test]
    fn singular_basis_is_rejected() {
        let singular = Matrix3::new(1.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        assert!(matches!(
            MountOp::new(0.9, singular),
            Err(MultiError::SingularBasis)
        ));
    }

    #[test]
    fn real_basis_inverts_the_reciprocal_basis() {
        let basis = Matrix3::new(1.0, 0.1, 0.0, 0.0, 1.2, 0.0, 0.0, 0.0, 0.8);
        let op = MountOp::new(1.0, basis).unwrap();
        let product = op.recip_basis * op.real_basis / TAU;
        assert!((product - Matrix3::identity()).norm() < 1e-12);
    }
}
