// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralCDI — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Minimal two-peak reconstruction on synthetic data.
//!
//! Builds intensities from a known cube with a linear displacement field,
//! then runs a classic schedule: blocks of HIO+ER on the active peak with a
//! mount hand-off between blocks, shrinkwrap every few cycles.

use nalgebra::{Matrix3, Vector3};
use ndarray::Array3;
use num_complex::Complex64;
use scdi_multi::{MountOp, MultiConfig, MultiResult, MultiState, Operator};

const SHAPE: (usize, usize, usize) = (16, 16, 16);

fn main() -> MultiResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let support = Array3::from_shape_fn(SHAPE, |(i, j, k)| {
        (6..10).contains(&i) && (6..10).contains(&j) && (6..10).contains(&k)
    });
    let g_vecs = [Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 1.0, 0.0)];
    let mut intensities = Vec::new();
    for g in &g_vecs {
        let field = Array3::from_shape_fn(SHAPE, |(i, j, k)| {
            if support[[i, j, k]] {
                let u = Vector3::new(0.02 * i as f64, -0.01 * j as f64, 0.015 * k as f64);
                Complex64::from_polar(1.0, -g.dot(&u))
            } else {
                Complex64::new(0.0, 0.0)
            }
        });
        let mut spectrum = field;
        scdi_core::FftPlan3::new(SHAPE).forward(&mut spectrum);
        intensities.push(spectrum.mapv(|v| v.norm_sqr()));
    }
    let masks = vec![Array3::from_elem(SHAPE, true); 2];

    let mut state = MultiState::new(
        &intensities,
        &g_vecs,
        &masks,
        MultiConfig::seeded(2025),
    )?;

    let mount = Operator::Mount(MountOp::new(0.9, Matrix3::identity())?);
    let block = Operator::Er.repeat(5) * Operator::hio(0.9).repeat(20);
    let cycle = Operator::shrink(0.1, 1.0) * (mount * block.clone()).repeat(4);

    for round in 0..10 {
        cycle.apply(&mut state)?;
        println!("round {round}: loss = {:.3e}", state.loss());
    }

    let recovered: usize = state.support().iter().filter(|&&s| s).count();
    println!("final support occupies {recovered} voxels");
    Ok(())
}
