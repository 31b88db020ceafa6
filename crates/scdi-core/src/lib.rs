// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralCDI — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Transform and intensity-matching engine for Bragg coherent diffraction
//! imaging.
//!
//! This crate owns the reciprocal-space half of a reconstruction: cached 3D
//! FFT plans for uniform sampling, a direct non-uniform DFT for continuous
//! (rotated or high-strain) sample coordinates, measured-intensity storage
//! behind a reciprocal mask, the modulus projection, and the fit metrics that
//! the projection layers above report. Everything here is backend-agnostic
//! dense array arithmetic; the iteration schedules live in the peak and
//! multi-peak crates.

pub mod error;
pub mod fft;
pub mod state;

pub use error::{CoreError, CoreResult};
pub use fft::FftPlan3;
pub use state::{derive_support, CoreState, LossKind, SampleGeometry, SamplePoints};
