// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralCDI — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! One peak's reconstruction state and the projections that drive it.

use crate::blur::gaussian_blur3;
use ndarray::{Array3, Zip};
use num_complex::Complex64;
use scdi_core::{derive_support, CoreError, CoreState, LossKind};
use thiserror::Error;
use tracing::{debug, warn};

pub type PeakResult<T> = std::result::Result<T, PeakError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PeakError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("support shape {got:?} does not match the intensity shape {expected:?}")]
    SupportShape { expected: Vec<usize>, got: Vec<usize> },
}

/// Real-space estimate, support, and engine for a single diffraction peak.
///
/// The real-space field carries the peak-specific phase; the engine owns the
/// reciprocal half (measured intensity, mask, transforms). The support is a
/// plain boolean volume with the same spatial indexing as the field.
#[derive(Debug)]
pub struct PeakState {
    pub real_space: Array3<Complex64>,
    pub support: Array3<bool>,
    pub core: CoreState,
}

impl PeakState {
    /// Build a grid-sampled peak from measured data.
    ///
    /// When no support is supplied one is derived from the intensity
    /// autocorrelation, thresholded at 10% of its peak magnitude.
    pub fn new(
        loss: LossKind,
        intens: &Array3<f64>,
        rec_support: &Array3<bool>,
        support: Option<Array3<bool>>,
        truncate: bool,
    ) -> PeakResult<Self> {
        let support = match support {
            Some(support) => {
                if support.dim() != intens.dim() {
                    return Err(PeakError::SupportShape {
                        expected: intens.shape().to_vec(),
                        got: support.shape().to_vec(),
                    });
                }
                support
            }
            None => derive_support(intens, 0.1)?,
        };
        let core = CoreState::new(loss, intens, rec_support, truncate)?;
        Ok(Self::from_core(core, support))
    }

    /// Wrap an already-built engine. The real-space field starts as the
    /// support indicator: unit amplitude inside, zero outside.
    pub fn from_core(core: CoreState, support: Array3<bool>) -> Self {
        let real_space = support.mapv(|s| {
            if s {
                Complex64::new(1.0, 0.0)
            } else {
                Complex64::new(0.0, 0.0)
            }
        });
        Self {
            real_space,
            support,
            core,
        }
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.core.shape()
    }

    /// Modulus-constraint projection: forward transform, amplitude match in
    /// reciprocal space, transform back.
    fn projected(&mut self) -> PeakResult<Array3<Complex64>> {
        self.core.forward(&self.real_space)?;
        self.core.project_modulus();
        let mut out = Array3::from_elem(self.real_space.raw_dim(), Complex64::new(0.0, 0.0));
        self.core.back_project(&mut out)?;
        Ok(out)
    }

    /// One error-reduction iteration: modulus projection, then the support
    /// constraint in real space.
    pub fn er(&mut self) -> PeakResult<()> {
        let proj = self.projected()?;
        Zip::from(&mut self.real_space)
            .and(&proj)
            .and(&self.support)
            .for_each(|value, &p, &inside| {
                *value = if inside { p } else { Complex64::new(0.0, 0.0) };
            });
        Ok(())
    }

    /// One hybrid input-output iteration with feedback `beta`: interior of
    /// the support behaves like ER, the exterior relaxes as
    /// `ρ_{i+1} = ρ_i − β·proj(ρ_i)`.
    pub fn hio(&mut self, beta: f64) -> PeakResult<()> {
        let proj = self.projected()?;
        Zip::from(&mut self.real_space)
            .and(&proj)
            .and(&self.support)
            .for_each(|value, &p, &inside| {
                *value = if inside { p } else { *value - p * beta };
            });
        Ok(())
    }

    /// Shrinkwrap support update: Gaussian-blur the current magnitude with
    /// width `sigma` and keep voxels above `threshold` of the blurred peak.
    pub fn shrink(&mut self, threshold: f64, sigma: f64) -> PeakResult<()> {
        let magnitude = self.real_space.mapv(|v| v.norm());
        let blurred = gaussian_blur3(&magnitude, sigma);
        let max = blurred.fold(0.0_f64, |acc, &v| acc.max(v));
        if max <= 0.0 {
            warn!("shrinkwrap on an all-zero field leaves an empty support");
            self.support.fill(false);
            return Ok(());
        }
        let cut = threshold * max;
        Zip::from(&mut self.support)
            .and(&blurred)
            .for_each(|slot, &v| *slot = v > cut);
        debug!(
            voxels = self.support.iter().filter(|&&s| s).count(),
            threshold, sigma, "shrinkwrap updated support"
        );
        Ok(())
    }

    /// Recenter so the support's center of mass sits on the zero-frequency
    /// origin, undoing the spatial drift ER/HIO accumulate. Returns the
    /// applied circular shift so callers can move companion fields in step.
    pub fn center(&mut self) -> PeakResult<[isize; 3]> {
        let com = match support_center(&self.support) {
            Some(com) => com,
            None => {
                warn!("center skipped: support is empty");
                return Ok([0, 0, 0]);
            }
        };
        let shift = [-com[0], -com[1], -com[2]];
        self.real_space = roll3(&self.real_space, shift);
        self.support = roll3(&self.support, shift);
        debug!(?shift, "recentered reconstruction");
        Ok(shift)
    }
}

/// Rounded center of mass of the support, or `None` when it is empty.
fn support_center(support: &Array3<bool>) -> Option<[isize; 3]> {
    let mut acc = [0.0_f64; 3];
    let mut count = 0usize;
    for ((i, j, k), &inside) in support.indexed_iter() {
        if inside {
            acc[0] += i as f64;
            acc[1] += j as f64;
            acc[2] += k as f64;
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    Some(acc.map(|a| (a / count as f64).round() as isize))
}

/// Circularly shift a volume: `out[i] = a[(i − shift) mod n]` per axis.
pub fn roll3<A: Clone>(a: &Array3<A>, shift: [isize; 3]) -> Array3<A> {
    let dim = a.dim();
    let sizes = [dim.0 as isize, dim.1 as isize, dim.2 as isize];
    Array3::from_shape_fn(dim, |(i, j, k)| {
        let src = [
            (i as isize - shift[0]).rem_euclid(sizes[0]) as usize,
            (j as isize - shift[1]).rem_euclid(sizes[1]) as usize,
            (k as isize - shift[2]).rem_euclid(sizes[2]) as usize,
        ];
        a[[src[0], src[1], src[2]]].clone()
    })
}
