// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralCDI — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! End-to-end checks of the mount projection on synthetic single-peak data
//! where the true density and displacement field are known.

use nalgebra::{Matrix3, Vector3};
use ndarray::Array3;
use num_complex::Complex64;
use scdi_multi::{MountOp, MultiConfig, MultiState, Operator};

const SHAPE: (usize, usize, usize) = (8, 8, 8);

fn cube_support() -> Array3<bool> {
    Array3::from_shape_fn(SHAPE, |(i, j, k)| {
        (3..6).contains(&i) && (3..6).contains(&j) && (3..6).contains(&k)
    })
}

fn cube_density(support: &Array3<bool>) -> Array3<f64> {
    support.mapv(|inside| if inside { 1.0 } else { 0.0 })
}

/// Smooth displacement field, well inside one ambiguity cell (|u| < π).
fn true_displacement(support: &Array3<bool>) -> [Array3<f64>; 3] {
    let mut ux = Array3::zeros(SHAPE);
    let mut uy = Array3::zeros(SHAPE);
    let mut uz = Array3::zeros(SHAPE);
    for ((i, j, k), &inside) in support.indexed_iter() {
        if inside {
            ux[[i, j, k]] = 0.05 * i as f64 - 0.2;
            uy[[i, j, k]] = 0.03 * (j as f64 - 4.0);
            uz[[i, j, k]] = -0.04 * k as f64 + 0.1;
        }
    }
    [ux, uy, uz]
}

/// Peak field under the `rho·exp(−i g·u)` convention, with an optional
/// uniform phase offset added on top.
fn peak_field(
    rho: &Array3<f64>,
    u: &[Array3<f64>; 3],
    g: Vector3<f64>,
    phase_offset: f64,
) -> Array3<Complex64> {
    Array3::from_shape_fn(SHAPE, |idx| {
        let carried = -(g.x * u[0][idx] + g.y * u[1][idx] + g.z * u[2][idx]) + phase_offset;
        Complex64::from_polar(rho[idx], carried)
    })
}

fn measured_intensity(field: &Array3<Complex64>) -> Array3<f64> {
    let mut spectrum = field.clone();
    scdi_core::FftPlan3::new(SHAPE).forward(&mut spectrum);
    spectrum.mapv(|v| v.norm_sqr())
}

fn single_peak_state(intens: Array3<f64>, g: Vector3<f64>, support: Array3<bool>) -> MultiState {
    let mask = Array3::from_elem(SHAPE, true);
    let config = MultiConfig {
        support: Some(support),
        seed: Some(5),
        ..MultiConfig::default()
    };
    MultiState::new(&[intens], &[g], &[mask], config).unwrap()
}

#[test]
fn a_global_phase_offset_does_not_corrupt_the_displacement_field() {
    let g = Vector3::new(1.0, 0.0, 0.0);
    let support = cube_support();
    let rho = cube_density(&support);
    let u = true_displacement(&support);

    let truth = peak_field(&rho, &u, g, 0.0);
    let mut state = single_peak_state(measured_intensity(&truth), g, support.clone());

    state.rho_mut().assign(&rho);
    {
        let (ux, uy, uz) = state.displacement_mut();
        ux.assign(&u[0]);
        uy.assign(&u[1]);
        uz.assign(&u[2]);
    }
    // The retrieved phase carries an arbitrary uniform offset on top of the
    // true displacement phase.
    state.active_peak_mut().real_space = peak_field(&rho, &u, g, 0.37);

    let mount = Operator::Mount(MountOp::new(1.0, Matrix3::identity()).unwrap());
    mount.apply(&mut state).unwrap();

    let (ux, uy, uz) = state.displacement();
    for ((idx, &inside), truth_x) in support.indexed_iter().zip(u[0].iter()) {
        if inside {
            assert!((ux[idx] - truth_x).abs() < 1e-6, "ux at {idx:?}");
        } else {
            assert_eq!(ux[idx], 0.0);
        }
    }
    for (idx, &inside) in support.indexed_iter() {
        if inside {
            assert!((uy[idx] - u[1][idx]).abs() < 1e-6);
            assert!((uz[idx] - u[2][idx]).abs() < 1e-6);
            assert!((state.rho()[idx] - rho[idx]).abs() < 1e-6);
        }
    }
}

#[test]
fn the_lattice_unwrap_removes_an_ambiguity_translation() {
    let g = Vector3::new(1.0, 0.0, 0.0);
    let support = cube_support();
    let rho = cube_density(&support);
    let u = true_displacement(&support);

    let truth = peak_field(&rho, &u, g, 0.0);
    let mut state = single_peak_state(measured_intensity(&truth), g, support.clone());

    state.rho_mut().assign(&rho);
    {
        // Shift the stored field by one full real-lattice translation along
        // x: invisible to every peak phase, so only the lattice step can
        // remove it.
        let (ux, uy, uz) = state.displacement_mut();
        ux.assign(&u[0]);
        uy.assign(&u[1]);
        uz.assign(&u[2]);
        for (value, &inside) in ux.iter_mut().zip(support.iter()) {
            if inside {
                *value += std::f64::consts::TAU;
            }
        }
    }
    state.active_peak_mut().real_space = truth;

    let mount = Operator::Mount(MountOp::new(1.0, Matrix3::identity()).unwrap());
    mount.apply(&mut state).unwrap();

    let (ux, uy, uz) = state.displacement();
    for (idx, &inside) in support.indexed_iter() {
        if inside {
            assert!((ux[idx] - u[0][idx]).abs() < 1e-9, "ux at {idx:?}");
            assert!((uy[idx] - u[1][idx]).abs() < 1e-9);
            assert!((uz[idx] - u[2][idx]).abs() < 1e-9);
        }
    }
}

#[test]
fn the_first_mount_bootstraps_the_density_from_the_peak() {
    let g = Vector3::new(0.0, 1.0, 0.0);
    let support = cube_support();
    let rho = cube_density(&support);
    let truth = peak_field(&rho, &true_displacement(&support), g, 0.0);
    let mut state = single_peak_state(measured_intensity(&truth), g, support.clone());

    // Shared density untouched (all zero): the low beta must be overridden
    // and the peak's own amplitude adopted wholesale.
    let mount = Operator::Mount(MountOp::new(0.25, Matrix3::identity()).unwrap());
    mount.apply(&mut state).unwrap();

    for (idx, &inside) in support.indexed_iter() {
        if inside {
            // The freshly constructed peak field is the support indicator.
            assert!((state.rho()[idx] - 1.0).abs() < 1e-9);
        } else {
            assert_eq!(state.rho()[idx], 0.0);
        }
    }
}

#[test]
fn mount_keeps_switching_within_bounds_over_many_draws() {
    let g1 = Vector3::new(1.0, 0.0, 0.0);
    let g2 = Vector3::new(0.0, 1.0, 0.0);
    let support = cube_support();
    let rho = cube_density(&support);
    let u = true_displacement(&support);
    let intens1 = measured_intensity(&peak_field(&rho, &u, g1, 0.0));
    let intens2 = measured_intensity(&peak_field(&rho, &u, g2, 0.0));
    let mask = Array3::from_elem(SHAPE, true);
    let config = MultiConfig {
        support: Some(support),
        seed: Some(42),
        ..MultiConfig::default()
    };
    let mut state = MultiState::new(
        &[intens1, intens2],
        &[g1, g2],
        &[mask.clone(), mask],
        config,
    )
    .unwrap();

    let mount = Operator::Mount(MountOp::new(0.9, Matrix3::identity()).unwrap());
    let mut seen = [false; 2];
    for _ in 0..12 {
        mount.apply(&mut state).unwrap();
        assert!(state.active() < 2);
        seen[state.active()] = true;
    }
    // Uniform draws over twelve rounds visit both peaks.
    assert!(seen[0] && seen[1]);
}
