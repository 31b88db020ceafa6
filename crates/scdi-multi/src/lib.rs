// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralCDI — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Multi-peak Bragg coherent diffraction imaging.
//!
//! A single physical object, a non-negative electron density `rho` with a
//! vector displacement field `u`, is reconstructed from several measured
//! diffraction peaks, each tied to a reciprocal-lattice vector `g`. The
//! classical single-peak projections (ER, HIO, shrinkwrap, centering) run on
//! one peak at a time; the mount projection periodically folds the active
//! peak's estimate back into the shared object, unwraps the displacement
//! ambiguities, and hands control to a randomly chosen peak.
//!
//! ```no_run
//! use nalgebra::{Matrix3, Vector3};
//! use scdi_multi::{MountOp, MultiConfig, MultiState, Operator};
//! # fn peaks() -> (Vec<ndarray::Array3<f64>>, Vec<Vector3<f64>>, Vec<ndarray::Array3<bool>>) { unimplemented!() }
//!
//! let (intensities, g_vecs, masks) = peaks();
//! let mut state = MultiState::new(&intensities, &g_vecs, &masks, MultiConfig::default())?;
//! let mount = Operator::Mount(MountOp::new(0.9, Matrix3::identity())?);
//! let cycle = mount * (Operator::Er * Operator::hio(0.9).repeat(20)).repeat(3);
//! for _ in 0..50 {
//!     cycle.apply(&mut state)?;
//! }
//! # Ok::<(), scdi_multi::MultiError>(())
//! ```

pub mod config;
pub mod error;
pub mod geometry;
pub mod mount;
pub mod operator;
mod sampling;
pub mod state;

pub use config::MultiConfig;
pub use error::{MultiError, MultiResult};
pub use geometry::{angle_difference, min_diff_angle};
pub use mount::MountOp;
pub use operator::Operator;
pub use scdi_core::LossKind;
pub use state::MultiState;
