//! Forward and backward search on synthetic hinge models
mod common;

use approx::assert_relative_eq;
use common::{gaussian_noise, hinge, least_squares, nearest_sample, uniform_samples};
use mars_rust::{backward_pass, forward_pass, Mars, MarsConfig, MarsError};
use ndarray::{Array1, Array2};

fn additive_sample(n: usize) -> (Array2<f64>, Array1<f64>) {
    let x = uniform_samples(n, 2, 2024);
    let noise = gaussian_noise(n, 0.05, 11);
    let y = Array1::from_shape_fn(n, |i| {
        1.0 + 3.0 * hinge(x[[i, 0]], 1.0) + 1.5 * hinge(x[[i, 1]], 0.8) + noise[i]
    });
    (x, y)
}

/// Whether some basis function ends in a hinge on `variable` within `tol` of `knot`
fn has_hinge_near(basis: &[mars_rust::BasisFunction], variable: usize, knot: f64, tol: f64) -> bool {
    basis.iter().any(|b| {
        b.terms()
            .iter()
            .any(|t| t.hinge && t.variable == variable && (t.knot - knot).abs() < tol)
    })
}

#[test]
fn test_single_hinge_recovers_exact_knot() {
    let n = 100;
    let x = uniform_samples(n, 2, 42);
    let k0 = nearest_sample(&x, 0, 1.0);
    let y = Array1::from_shape_fn(n, |i| 1.0 + 2.0 * hinge(x[[i, 0]], k0));

    let config = MarsConfig::default().with_max_basis(3);
    let result = forward_pass(&x, &y, &config).unwrap();
    let model = result.model;

    assert_eq!(model.len(), 3);
    let last = model.basis()[2].terms();
    assert_eq!(last.len(), 1);
    assert!(last[0].hinge);
    assert_eq!(last[0].variable, 0);
    assert_eq!(last[0].knot, k0);

    let reference = least_squares(&model.design_matrix(&x), &y);
    let coefficients = model.coefficients();

    let intercept_tol = 0.05 * reference[0].abs() + 0.1;
    assert!(
        (coefficients[0] - reference[0]).abs() <= intercept_tol,
        "intercept {} vs {}",
        coefficients[0],
        reference[0]
    );
    for j in 1..3 {
        let tol = 0.05 * reference[j].abs() + 0.05;
        assert!(
            (coefficients[j] - reference[j]).abs() <= tol,
            "coefficient {}: {} vs {}",
            j,
            coefficients[j],
            reference[j]
        );
    }
    assert_relative_eq!(coefficients[2], 2.0, epsilon = 1e-4);
}

#[test]
fn test_additive_model_recovers_both_knots() {
    let (x, y) = additive_sample(200);

    let config = MarsConfig::default().with_max_basis(5);
    let result = forward_pass(&x, &y, &config).unwrap();

    assert_eq!(result.model.len(), 5);
    assert!(has_hinge_near(result.model.basis(), 0, 1.0, 0.2));
    assert!(has_hinge_near(result.model.basis(), 1, 0.8, 0.2));
}

#[test]
fn test_parents_come_from_top_scores() {
    let (x, y) = additive_sample(150);

    let width = 2;
    let config = MarsConfig::default()
        .with_max_basis(9)
        .with_queue_width(width);
    let result = forward_pass(&x, &y, &config).unwrap();

    assert!(!result.rounds.is_empty());
    for round in &result.rounds {
        assert!(round.parents.len() <= width);
        assert!(round.parents.contains(&round.parent));

        let mut order: Vec<usize> = (0..round.scores.len()).collect();
        order.sort_by(|&a, &b| round.scores[a].total_cmp(&round.scores[b]));
        let expected: Vec<usize> = order.into_iter().rev().take(width).collect();
        assert_eq!(round.parents, expected);
    }

    // Round i starts with 1 + 2i scores
    for (i, round) in result.rounds.iter().enumerate() {
        assert_eq!(round.scores.len(), 1 + 2 * i);
    }
}

#[test]
fn test_aging_keeps_search_valid() {
    let (x, y) = additive_sample(120);

    let config = MarsConfig::default()
        .with_max_basis(7)
        .with_queue_width(1)
        .with_aging_factor(0.5);
    let result = forward_pass(&x, &y, &config).unwrap();

    assert_eq!(result.rounds.len(), 3);
    assert_eq!(result.rounds[0].scores, vec![1.0]);

    // New basis functions enter at 0; the constant is explored first
    let second = &result.rounds[1];
    assert_eq!(second.parents, vec![0]);
    assert_eq!(&second.scores[1..], &[0.0, 0.0]);

    // Entries skipped in the second round were aged once
    let third = &result.rounds[2];
    assert_eq!(&third.scores[1..], &[0.5, 0.5, 0.0, 0.0]);
}

#[test]
fn test_backward_prunes_forward_model() {
    let (x, y) = additive_sample(200);

    let config = MarsConfig::default().with_max_basis(9);
    let forward = forward_pass(&x, &y, &config).unwrap();
    let grown = forward.model.len();
    let grown_lof = forward.model.lof();

    let backward = backward_pass(&y, forward.model).unwrap();

    assert_eq!(backward.steps.len(), grown - 1);
    for (i, step) in backward.steps.iter().enumerate() {
        assert!(step.removed >= 1);
        assert_eq!(step.basis_count, grown - 1 - i);
        assert!(backward.model.lof() <= step.lof);
    }
    assert!(backward.model.lof() <= grown_lof);
    assert!(backward.model.basis()[0].is_constant());
    assert!(has_hinge_near(backward.model.basis(), 0, 1.0, 0.2));
    assert!(has_hinge_near(backward.model.basis(), 1, 0.8, 0.2));
}

#[test]
fn test_mars_fit_predicts_signal() {
    let (x, y) = additive_sample(200);

    let mut mars = Mars::new(MarsConfig::default().with_max_basis(7));
    mars.fit(&x, &y).unwrap();

    let predictions = mars.predict(&x).unwrap();
    let mse: f64 = (0..x.nrows())
        .map(|i| {
            let truth = 1.0 + 3.0 * hinge(x[[i, 0]], 1.0) + 1.5 * hinge(x[[i, 1]], 0.8);
            (predictions[i] - truth).powi(2)
        })
        .sum::<f64>()
        / x.nrows() as f64;
    assert!(mse < 0.01, "mse {}", mse);

    assert_eq!(mars.pruning_steps.len(), 2 * mars.forward_rounds.len());
}

#[test]
fn test_fit_rejects_mismatched_samples() {
    let x = uniform_samples(10, 2, 1);
    let y = Array1::zeros(9);

    let mut mars = Mars::new(MarsConfig::default());
    assert!(matches!(
        mars.fit(&x, &y),
        Err(MarsError::DimensionMismatch(_))
    ));
}
