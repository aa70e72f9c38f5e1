//! Shared synthetic data and reference solvers for the integration tests
#![allow(dead_code)]

use ndarray::{Array1, Array2};
use rand::{
    distributions::{Distribution, Uniform},
    SeedableRng,
};
use rand_chacha::ChaCha8Rng;
use std::f64::consts::PI;

/// `n × d` covariates drawn uniformly from `[0, 2)`
pub fn uniform_samples(n: usize, d: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let uniform = Uniform::new(0.0, 2.0);

    let mut x = Array2::zeros((n, d));
    for i in 0..n {
        for j in 0..d {
            x[[i, j]] = uniform.sample(&mut rng);
        }
    }
    x
}

/// Box-Muller normal draws with standard deviation `sd`
pub fn gaussian_noise(n: usize, sd: f64, seed: u64) -> Array1<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let uniform = Uniform::new(0.0, 1.0);

    (0..n)
        .map(|_| {
            let u1: f64 = uniform.sample(&mut rng);
            let u2: f64 = uniform.sample(&mut rng);
            sd * (-2.0 * (1.0 - u1).ln()).sqrt() * (2.0 * PI * u2).cos()
        })
        .collect()
}

pub fn hinge(value: f64, knot: f64) -> f64 {
    (value - knot).max(0.0)
}

/// Sample value of covariate `variable` closest to `target`
pub fn nearest_sample(x: &Array2<f64>, variable: usize, target: f64) -> f64 {
    x.column(variable)
        .iter()
        .copied()
        .min_by(|a, b| (a - target).abs().total_cmp(&(b - target).abs()))
        .unwrap()
}

/// Ordinary least squares via the normal equations
pub fn least_squares(design: &Array2<f64>, y: &Array1<f64>) -> Array1<f64> {
    let a = design.t().dot(design);
    let b = design.t().dot(y);
    gaussian_elimination(a, b)
}

/// Dense solve with partial pivoting
fn gaussian_elimination(mut a: Array2<f64>, mut b: Array1<f64>) -> Array1<f64> {
    let n = a.nrows();

    for k in 0..n {
        let mut max_idx = k;
        let mut max_val = a[[k, k]].abs();
        for i in (k + 1)..n {
            if a[[i, k]].abs() > max_val {
                max_val = a[[i, k]].abs();
                max_idx = i;
            }
        }
        assert!(max_val > 1e-14, "singular normal equations");

        if max_idx != k {
            for j in 0..n {
                a.swap([k, j], [max_idx, j]);
            }
            b.swap(k, max_idx);
        }

        for i in (k + 1)..n {
            let factor = a[[i, k]] / a[[k, k]];
            for j in (k + 1)..n {
                a[[i, j]] -= factor * a[[k, j]];
            }
            b[i] -= factor * b[k];
        }
    }

    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += a[[i, j]] * x[j];
        }
        x[i] = (b[i] - sum) / a[[i, i]];
    }
    x
}

pub fn assert_matrix_close(actual: &Array2<f64>, expected: &Array2<f64>, tol: f64) {
    assert_eq!(actual.dim(), expected.dim());
    for ((idx, a), e) in actual.indexed_iter().zip(expected.iter()) {
        assert!(
            (a - e).abs() <= tol * (1.0 + e.abs()),
            "entry {:?}: {} vs {}",
            idx,
            a,
            e
        );
    }
}

pub fn assert_vector_close(actual: &Array1<f64>, expected: &Array1<f64>, tol: f64) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert!(
            (a - e).abs() <= tol * (1.0 + e.abs()),
            "entry {}: {} vs {}",
            i,
            a,
            e
        );
    }
}
