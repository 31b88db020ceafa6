// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralCDI — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Engine state: measured intensity, reciprocal mask, sampling geometry, and
//! the reciprocal-space working buffer.
//!
//! The engine is deliberately agnostic about what the real-space field means.
//! It moves a complex volume to reciprocal space (FFT on uniform grids, direct
//! non-uniform DFT at continuous coordinates), matches its modulus against the
//! measured amplitudes inside the reciprocal mask, and moves it back. Loss
//! metrics are reported for monitoring only; convergence control belongs to
//! the caller's iteration schedule.

use crate::error::{CoreError, CoreResult};
use crate::fft::FftPlan3;
use ndarray::{Array3, ArrayViewMut3, Zip};
use num_complex::Complex64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

/// Amplitudes below this are treated as carrying no usable phase.
pub const AMP_EPS: f64 = 1e-6;

/// Fit metric reported by [`CoreState::loss`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossKind {
    #[default]
    L2,
    Poisson,
}

impl FromStr for LossKind {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "l2" => Ok(LossKind::L2),
            "poisson" => Ok(LossKind::Poisson),
            other => Err(CoreError::UnknownLoss(other.to_string())),
        }
    }
}

/// Continuous reciprocal sample coordinates, in radians per voxel.
///
/// On-grid coordinates reproduce the FFT exactly, so a `Points` geometry whose
/// coordinates happen to lie on the canonical lattice agrees with `Grid`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SamplePoints {
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub zs: Vec<f64>,
}

impl SamplePoints {
    pub fn new(xs: Vec<f64>, ys: Vec<f64>, zs: Vec<f64>) -> Self {
        Self { xs, ys, zs }
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }
}

/// How reciprocal samples map onto the detector data.
#[derive(Clone, Debug, PartialEq)]
pub enum SampleGeometry {
    /// Uniform sampling on the canonical FFT lattice.
    Grid,
    /// Continuous coordinates, one triple per data sample.
    Points(SamplePoints),
}

/// Transform + intensity-matching engine for one diffraction peak.
#[derive(Debug)]
pub struct CoreState {
    loss: LossKind,
    shape: (usize, usize, usize),
    intens: Vec<f64>,
    amp: Vec<f64>,
    rec_support: Vec<bool>,
    geometry: SampleGeometry,
    plan: FftPlan3,
    recip_space: Vec<Complex64>,
}

impl CoreState {
    /// Grid-sampled engine from a measured intensity volume and its mask.
    ///
    /// `truncate` zeroes measured intensity outside the reciprocal mask so
    /// masked-out samples cannot leak into the loss metric.
    pub fn new(
        loss: LossKind,
        intens: &Array3<f64>,
        rec_support: &Array3<bool>,
        truncate: bool,
    ) -> CoreResult<Self> {
        if intens.is_empty() {
            return Err(CoreError::EmptyInput("intensity volume"));
        }
        if rec_support.dim() != intens.dim() {
            return Err(CoreError::ShapeMismatch {
                context: "reciprocal mask",
                expected: intens.shape().to_vec(),
                got: rec_support.shape().to_vec(),
            });
        }
        let shape = intens.dim();
        let flat: Vec<f64> = intens.iter().copied().collect();
        let mask: Vec<bool> = rec_support.iter().copied().collect();
        Self::build(loss, flat, mask, SampleGeometry::Grid, shape, truncate)
    }

    /// Engine sampled at explicit continuous coordinates, with data and mask
    /// already restricted to the retained sample subset.
    pub fn with_points(
        loss: LossKind,
        intens: Vec<f64>,
        rec_support: Vec<bool>,
        points: SamplePoints,
        shape: (usize, usize, usize),
        truncate: bool,
    ) -> CoreResult<Self> {
        if intens.is_empty() {
            return Err(CoreError::EmptyInput("intensity samples"));
        }
        if rec_support.len() != intens.len() {
            return Err(CoreError::ShapeMismatch {
                context: "reciprocal mask",
                expected: vec![intens.len()],
                got: vec![rec_support.len()],
            });
        }
        check_points(&points, intens.len())?;
        Self::build(
            loss,
            intens,
            rec_support,
            SampleGeometry::Points(points),
            shape,
            truncate,
        )
    }

    fn build(
        loss: LossKind,
        mut intens: Vec<f64>,
        rec_support: Vec<bool>,
        geometry: SampleGeometry,
        shape: (usize, usize, usize),
        truncate: bool,
    ) -> CoreResult<Self> {
        if let Some((index, &value)) = intens
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v < 0.0)
        {
            return Err(CoreError::NegativeIntensity { index, value });
        }
        if truncate {
            for (value, &keep) in intens.iter_mut().zip(rec_support.iter()) {
                if !keep {
                    *value = 0.0;
                }
            }
        }
        let amp = intens.iter().map(|v| v.sqrt()).collect();
        let samples = intens.len();
        Ok(Self {
            loss,
            shape,
            intens,
            amp,
            rec_support,
            geometry,
            plan: FftPlan3::new(shape),
            recip_space: vec![Complex64::new(0.0, 0.0); samples],
        })
    }

    pub fn loss_kind(&self) -> LossKind {
        self.loss
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }

    /// Number of reciprocal samples (grid voxels, or retained points).
    pub fn sample_count(&self) -> usize {
        self.intens.len()
    }

    pub fn geometry(&self) -> &SampleGeometry {
        &self.geometry
    }

    pub fn amplitude(&self) -> &[f64] {
        &self.amp
    }

    pub fn rec_support(&self) -> &[bool] {
        &self.rec_support
    }

    pub fn recip_space(&self) -> &[Complex64] {
        &self.recip_space
    }

    pub fn recip_space_mut(&mut self) -> &mut [Complex64] {
        &mut self.recip_space
    }

    /// Reprogram the sampling geometry with new continuous coordinates.
    ///
    /// `rebuild_plan` is part of the engine contract for backends with an
    /// expensive precomputed stage; the direct-sum backend evaluates phases on
    /// the fly, so the flag only forces a coordinate revalidation here.
    pub fn set_points(
        &mut self,
        xs: Vec<f64>,
        ys: Vec<f64>,
        zs: Vec<f64>,
        rebuild_plan: bool,
    ) -> CoreResult<()> {
        let points = SamplePoints::new(xs, ys, zs);
        check_points(&points, self.intens.len())?;
        if rebuild_plan {
            self.plan = FftPlan3::new(self.shape);
        }
        debug!(samples = points.len(), "reprogrammed sample coordinates");
        self.geometry = SampleGeometry::Points(points);
        Ok(())
    }

    /// Forward transform of `real` into the reciprocal working buffer.
    pub fn forward(&mut self, real: &Array3<Complex64>) -> CoreResult<()> {
        if real.dim() != self.shape {
            return Err(CoreError::ShapeMismatch {
                context: "real-space field",
                expected: vec![self.shape.0, self.shape.1, self.shape.2],
                got: real.shape().to_vec(),
            });
        }
        match &self.geometry {
            SampleGeometry::Grid => {
                self.recip_space.clear();
                self.recip_space.extend(real.iter().copied());
                let mut view = ArrayViewMut3::from_shape(self.shape, &mut self.recip_space)
                    .expect("grid buffer matches plan shape");
                self.plan.forward_view(&mut view);
            }
            SampleGeometry::Points(points) => {
                nudft_forward(real, points, &mut self.recip_space);
            }
        }
        Ok(())
    }

    /// Replace reciprocal amplitudes with measured ones inside the mask.
    ///
    /// Phase is preserved; samples with numerically dead amplitude take the
    /// measured amplitude at zero phase. Outside the mask the field passes
    /// through untouched.
    pub fn project_modulus(&mut self) {
        for ((value, &amp), &masked) in self
            .recip_space
            .iter_mut()
            .zip(self.amp.iter())
            .zip(self.rec_support.iter())
        {
            if !masked {
                continue;
            }
            let norm = value.norm();
            *value = if norm > AMP_EPS {
                *value * (amp / norm)
            } else {
                Complex64::new(amp, 0.0)
            };
        }
    }

    /// Transform the reciprocal working buffer back to real space.
    ///
    /// Uniform grids use the inverse FFT; point geometries use the adjoint
    /// non-uniform DFT with the same `1/N` normalisation.
    pub fn back_project(&self, out: &mut Array3<Complex64>) -> CoreResult<()> {
        if out.dim() != self.shape {
            return Err(CoreError::ShapeMismatch {
                context: "real-space output",
                expected: vec![self.shape.0, self.shape.1, self.shape.2],
                got: out.shape().to_vec(),
            });
        }
        match &self.geometry {
            SampleGeometry::Grid => {
                for (slot, value) in out.iter_mut().zip(self.recip_space.iter()) {
                    *slot = *value;
                }
                self.plan.inverse(out);
            }
            SampleGeometry::Points(points) => {
                nudft_adjoint(&self.recip_space, points, out);
            }
        }
        Ok(())
    }

    /// Scalar fit metric over masked samples for the configured loss kind.
    pub fn loss(&self) -> f64 {
        let mut residual = 0.0;
        let mut reference = 0.0;
        let mut poisson = 0.0;
        let mut count = 0usize;
        for i in 0..self.intens.len() {
            if !self.rec_support[i] {
                continue;
            }
            count += 1;
            let model = self.recip_space[i].norm();
            match self.loss {
                LossKind::L2 => {
                    let diff = model - self.amp[i];
                    residual += diff * diff;
                    reference += self.amp[i] * self.amp[i];
                }
                LossKind::Poisson => {
                    let rate = (model * model).max(AMP_EPS * AMP_EPS);
                    poisson += rate - self.intens[i] * rate.ln();
                }
            }
        }
        if count == 0 {
            return 0.0;
        }
        match self.loss {
            LossKind::L2 => (residual / reference.max(AMP_EPS)).sqrt(),
            LossKind::Poisson => poisson / count as f64,
        }
    }
}

fn check_points(points: &SamplePoints, expected: usize) -> CoreResult<()> {
    if points.xs.len() != expected || points.ys.len() != expected || points.zs.len() != expected {
        return Err(CoreError::GeometryLength {
            expected,
            xs: points.xs.len(),
            ys: points.ys.len(),
            zs: points.zs.len(),
        });
    }
    Ok(())
}

/// Direct type-2 non-uniform DFT: evaluate the spectrum of a gridded field at
/// arbitrary coordinates. `O(M·N)`; acceptable because rotated geometries are
/// the exception and the grid FFT path covers the common case.
fn nudft_forward(real: &Array3<Complex64>, points: &SamplePoints, out: &mut Vec<Complex64>) {
    let evaluated: Vec<Complex64> = (0..points.len())
        .into_par_iter()
        .map(|m| {
            let (qx, qy, qz) = (points.xs[m], points.ys[m], points.zs[m]);
            let mut acc = Complex64::new(0.0, 0.0);
            for ((i, j, k), value) in real.indexed_iter() {
                let phase = qx * i as f64 + qy * j as f64 + qz * k as f64;
                acc += value * Complex64::new(phase.cos(), -phase.sin());
            }
            acc
        })
        .collect();
    *out = evaluated;
}

/// Adjoint of [`nudft_forward`], normalised by the grid volume so the on-grid
/// case matches the inverse FFT.
fn nudft_adjoint(recip: &[Complex64], points: &SamplePoints, out: &mut Array3<Complex64>) {
    let scale = 1.0 / out.len() as f64;
    Zip::indexed(out).par_for_each(|(i, j, k), slot| {
        let mut acc = Complex64::new(0.0, 0.0);
        for m in 0..points.len() {
            let phase =
                points.xs[m] * i as f64 + points.ys[m] * j as f64 + points.zs[m] * k as f64;
            acc += recip[m] * Complex64::new(phase.cos(), phase.sin());
        }
        *slot = acc * scale;
    });
}

/// First support estimate from a measured intensity: the inverse transform of
/// the intensity approximates the object autocorrelation, thresholded at
/// `rel_threshold` of its peak magnitude.
pub fn derive_support(intens: &Array3<f64>, rel_threshold: f64) -> CoreResult<Array3<bool>> {
    if intens.is_empty() {
        return Err(CoreError::EmptyInput("intensity volume"));
    }
    let mut buf = intens.mapv(|v| Complex64::new(v, 0.0));
    FftPlan3::new(intens.dim()).inverse(&mut buf);
    let mag = buf.mapv(|v| v.norm());
    let max = mag.fold(0.0_f64, |acc, &v| acc.max(v));
    if max <= 0.0 {
        return Err(CoreError::EmptyInput("intensity signal"));
    }
    let support = mag.mapv(|v| v > rel_threshold * max);
    debug!(
        voxels = support.iter().filter(|&&s| s).count(),
        "derived support from intensity autocorrelation"
    );
    Ok(support)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn uniform_mask(shape: (usize, usize, usize), value: bool) -> Array3<bool> {
        Array3::from_elem(shape, value)
    }

    #[test]
    fn loss_kind_parses_case_insensitively() {
        assert_eq!("L2".parse::<LossKind>().unwrap(), LossKind::L2);
        assert_eq!("poisson".parse::<LossKind>().unwrap(), LossKind::Poisson);
        assert!(matches!(
            "huber".parse::<LossKind>(),
            Err(CoreError::UnknownLoss(_))
        ));
    }

    #[test]
    fn modulus_projection_restores_measured_amplitudes_inside_mask() {
        let shape = (4, 4, 4);
        let intens = Array3::from_elem(shape, 4.0);
        let mut mask = uniform_mask(shape, true);
        mask[[1, 1, 1]] = false;
        let mut core = CoreState::new(LossKind::L2, &intens, &mask, false).unwrap();
        let field = Array3::from_shape_fn(shape, |(i, j, k)| {
            Complex64::new(0.5 + i as f64, j as f64 - k as f64)
        });
        core.forward(&field).unwrap();
        let before = core.recip_space().to_vec();
        core.project_modulus();
        let flat_masked: Vec<bool> = mask.iter().copied().collect();
        for (i, value) in core.recip_space().iter().enumerate() {
            if flat_masked[i] {
                assert!((value.norm() - 2.0).abs() < 1e-12, "sample {i}");
            } else {
                assert_eq!(*value, before[i]);
            }
        }
    }

    #[test]
    fn on_grid_points_match_the_fft() {
        let shape = (4, 4, 2);
        let intens = Array3::from_elem(shape, 1.0);
        let mask = uniform_mask(shape, true);
        let mut grid = CoreState::new(LossKind::L2, &intens, &mask, false).unwrap();

        let mut xs = Vec::new();
        let mut ys = Vec::new();
        let mut zs = Vec::new();
        for i in 0..shape.0 {
            for j in 0..shape.1 {
                for k in 0..shape.2 {
                    xs.push(crate::fft::freq_coordinate(i, shape.0));
                    ys.push(crate::fft::freq_coordinate(j, shape.1));
                    zs.push(crate::fft::freq_coordinate(k, shape.2));
                }
            }
        }
        let flat_intens: Vec<f64> = intens.iter().copied().collect();
        let flat_mask: Vec<bool> = mask.iter().copied().collect();
        let mut pts = CoreState::with_points(
            LossKind::L2,
            flat_intens,
            flat_mask,
            SamplePoints::new(xs, ys, zs),
            shape,
            false,
        )
        .unwrap();

        let field = Array3::from_shape_fn(shape, |(i, j, k)| {
            Complex64::new(i as f64 - 1.0, (j * k) as f64 * 0.5)
        });
        grid.forward(&field).unwrap();
        pts.forward(&field).unwrap();
        for (a, b) in grid.recip_space().iter().zip(pts.recip_space().iter()) {
            assert!((a - b).norm() < 1e-9);
        }

        let mut from_grid = Array3::from_elem(shape, Complex64::new(0.0, 0.0));
        let mut from_pts = from_grid.clone();
        grid.back_project(&mut from_grid).unwrap();
        pts.back_project(&mut from_pts).unwrap();
        for (a, b) in from_grid.iter().zip(from_pts.iter()) {
            assert!((a - b).norm() < 1e-9);
        }
    }

    #[test]
    fn l2_loss_vanishes_on_consistent_data_and_poisson_stays_finite() {
        let shape = (4, 4, 4);
        let field = Array3::from_shape_fn(shape, |(i, j, k)| {
            Complex64::new(1.0 + i as f64, j as f64 - 0.5 * k as f64)
        });
        let mut spectrum = field.clone();
        FftPlan3::new(shape).forward(&mut spectrum);
        let intens = spectrum.mapv(|v| v.norm_sqr());
        let mask = uniform_mask(shape, true);

        let mut l2 = CoreState::new(LossKind::L2, &intens, &mask, false).unwrap();
        l2.forward(&field).unwrap();
        assert!(l2.loss() < 1e-9);

        let mut poisson = CoreState::new(LossKind::Poisson, &intens, &mask, false).unwrap();
        poisson.forward(&field).unwrap();
        assert!(poisson.loss().is_finite());
    }

    #[test]
    fn set_points_validates_coordinate_lengths() {
        let shape = (2, 2, 2);
        let intens = Array3::from_elem(shape, 1.0);
        let mask = uniform_mask(shape, true);
        let mut core = CoreState::new(LossKind::L2, &intens, &mask, false).unwrap();
        assert!(matches!(
            core.set_points(vec![0.0; 3], vec![0.0; 8], vec![0.0; 8], false),
            Err(CoreError::GeometryLength { expected: 8, .. })
        ));
        assert!(core
            .set_points(vec![0.1; 8], vec![-0.2; 8], vec![0.3; 8], true)
            .is_ok());
        assert!(matches!(core.geometry(), SampleGeometry::Points(p) if p.len() == 8));
    }

    #[test]
    fn construction_rejects_bad_inputs() {
        let shape = (2, 2, 2);
        let mut intens = Array3::from_elem(shape, 1.0);
        let mask = uniform_mask(shape, true);
        let small_mask = uniform_mask((2, 2, 1), true);
        assert!(matches!(
            CoreState::new(LossKind::L2, &intens, &small_mask, false),
            Err(CoreError::ShapeMismatch { .. })
        ));
        intens[[0, 0, 1]] = -3.0;
        assert!(matches!(
            CoreState::new(LossKind::L2, &intens, &mask, false),
            Err(CoreError::NegativeIntensity { .. })
        ));
    }

    #[test]
    fn truncate_zeroes_masked_out_intensity() {
        let shape = (2, 2, 2);
        let intens = Array3::from_elem(shape, 9.0);
        let mut mask = uniform_mask(shape, true);
        mask[[0, 1, 0]] = false;
        let core = CoreState::new(LossKind::L2, &intens, &mask, true).unwrap();
        let flat_mask: Vec<bool> = mask.iter().copied().collect();
        for (i, &a) in core.amplitude().iter().enumerate() {
            let expected = if flat_mask[i] { 3.0 } else { 0.0 };
            assert_eq!(a, expected);
        }
    }

    #[test]
    fn derived_support_is_nonempty_and_bounded_by_threshold() {
        let shape = (8, 8, 8);
        let mut obj = Array3::from_elem(shape, Complex64::new(0.0, 0.0));
        for i in 3..6 {
            for j in 3..6 {
                for k in 3..6 {
                    obj[[i, j, k]] = Complex64::new(1.0, 0.0);
                }
            }
        }
        let mut spectrum = obj.clone();
        FftPlan3::new(shape).forward(&mut spectrum);
        let intens = spectrum.mapv(|v| v.norm_sqr());
        let support = derive_support(&intens, 0.1).unwrap();
        let count = support.iter().filter(|&&s| s).count();
        assert!(count > 0);
        assert!(count < shape.0 * shape.1 * shape.2);
    }
}
