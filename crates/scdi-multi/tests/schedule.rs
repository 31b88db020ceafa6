// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralCDI — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Operator-schedule behaviour against the multi-peak state.

use nalgebra::Vector3;
use ndarray::Array3;
use num_complex::Complex64;
use scdi_multi::{MultiConfig, MultiState, Operator};

const SHAPE: (usize, usize, usize) = (8, 8, 8);

fn centered_cube() -> Array3<bool> {
    Array3::from_shape_fn(SHAPE, |(i, j, k)| {
        (3..6).contains(&i) && (3..6).contains(&j) && (3..6).contains(&k)
    })
}

fn state_from_cube(seed: u64) -> MultiState {
    let support = centered_cube();
    let obj = support.mapv(|inside| {
        if inside {
            Complex64::new(1.0, 0.0)
        } else {
            Complex64::new(0.0, 0.0)
        }
    });
    let mut spectrum = obj;
    scdi_core::FftPlan3::new(SHAPE).forward(&mut spectrum);
    let intens = spectrum.mapv(|v| v.norm_sqr());
    let mask = Array3::from_elem(SHAPE, true);
    let config = MultiConfig {
        support: Some(support),
        seed: Some(seed),
        ..MultiConfig::default()
    };
    MultiState::new(
        &[intens],
        &[Vector3::new(1.0, 0.0, 0.0)],
        &[mask],
        config,
    )
    .unwrap()
}

#[test]
fn one_er_iteration_recovers_a_known_cube_exactly() {
    let mut state = state_from_cube(9);
    Operator::Er.apply(&mut state).unwrap();
    let support = centered_cube();
    for (idx, &inside) in support.indexed_iter() {
        let value = state.active_peak().real_space[idx];
        if inside {
            assert!((value.norm() - 1.0).abs() < 1e-9, "magnitude at {idx:?}");
            assert!(value.im.abs() < 1e-9, "phase at {idx:?}");
        } else {
            assert_eq!(value, Complex64::new(0.0, 0.0));
        }
    }
}

#[test]
fn composed_and_sequential_application_agree() {
    let mut composed = state_from_cube(13);
    let mut sequential = state_from_cube(13);

    (Operator::Er * Operator::hio(0.9))
        .apply(&mut composed)
        .unwrap();
    Operator::hio(0.9).apply(&mut sequential).unwrap();
    Operator::Er.apply(&mut sequential).unwrap();

    let a = &composed.active_peak().real_space;
    let b = &sequential.active_peak().real_space;
    for (x, y) in a.iter().zip(b.iter()) {
        assert!((x - y).norm() < 1e-15);
    }
}

#[test]
fn projections_preserve_support_shape_and_values() {
    let mut state = state_from_cube(21);
    let before = state.support().clone();
    Operator::Er.apply(&mut state).unwrap();
    Operator::hio(0.8).apply(&mut state).unwrap();
    assert_eq!(state.support(), &before);
    assert_eq!(state.support().dim(), before.dim());
}

#[test]
fn shrinkwrap_through_the_state_keeps_the_bright_region() {
    let mut state = state_from_cube(17);
    Operator::Er.apply(&mut state).unwrap();
    Operator::shrink(0.1, 1.0).apply(&mut state).unwrap();
    // The recovered cube is the only signal; its center must survive and
    // the refreshed support must be propagated to the shared field.
    assert!(state.support()[[4, 4, 4]]);
    assert!(state.active_peak().support[[4, 4, 4]]);
    assert!(state.support().iter().any(|&s| s));
}

#[test]
fn centering_rolls_all_volumes_in_step() {
    let mut state = state_from_cube(31);
    Operator::Er.apply(&mut state).unwrap();
    Operator::Center.apply(&mut state).unwrap();
    // Cube center of mass (4,4,4) lands on the zero-frequency origin.
    assert!(state.support()[[0, 0, 0]]);
    assert!(state.active_peak().support[[0, 0, 0]]);
    assert!((state.active_peak().real_space[[0, 0, 0]].norm() - 1.0).abs() < 1e-9);
}
