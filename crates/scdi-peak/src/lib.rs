// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralCDI — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Single-peak phase retrieval: one diffraction peak's real-space estimate,
//! its support, and the classical projection primitives over them.
//!
//! The four primitives (error reduction, hybrid input-output, shrinkwrap,
//! centering) all mutate a [`PeakState`] in place. Multi-peak
//! reconciliation across several peaks is layered on top in `scdi-multi`;
//! nothing here knows that other peaks exist.

pub mod blur;
pub mod state;

pub use blur::gaussian_blur3;
pub use state::{roll3, PeakError, PeakResult, PeakState};
