//! Dense Cholesky factorisation, triangular solves and rank updates
//!
//! The fitting engine keeps a lower-triangular factor `L` with `L·Lᵀ = C`
//! for the centred covariance matrix `C` of the design matrix. Knot
//! refinements change `C` by a symmetric rank-two matrix, which is folded into
//! `L` with two rank-one updates instead of a fresh O(p³) factorisation.

use ndarray::{s, Array1, Array2};
use crate::{MarsError, Result};

fn check_square(a: &Array2<f64>, what: &str) -> Result<usize> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(MarsError::DimensionMismatch(format!(
            "{} needs a square matrix, got {}x{}",
            what,
            n,
            a.ncols()
        )));
    }
    Ok(n)
}

/// Lower-triangular Cholesky factor `L` with `L·Lᵀ = a`
///
/// Only the lower triangle of `a` is read. Fails with
/// [`MarsError::NotPositiveDefinite`] when a pivot is not strictly positive.
#[cfg(not(feature = "blas"))]
pub fn cholesky(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = check_square(a, "cholesky")?;
    let mut l = Array2::zeros((n, n));

    for j in 0..n {
        let mut pivot = a[[j, j]];
        for k in 0..j {
            pivot -= l[[j, k]] * l[[j, k]];
        }

        if pivot.is_nan() || pivot <= 0.0 {
            return Err(MarsError::NotPositiveDefinite(format!(
                "pivot {} = {:e}",
                j, pivot
            )));
        }

        let ljj = pivot.sqrt();
        l[[j, j]] = ljj;

        for i in (j + 1)..n {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            l[[i, j]] = sum / ljj;
        }
    }

    Ok(l)
}

/// Lower-triangular Cholesky factor `L` with `L·Lᵀ = a` (LAPACK `potrf`)
#[cfg(feature = "blas")]
pub fn cholesky(a: &Array2<f64>) -> Result<Array2<f64>> {
    use ndarray_linalg::{Cholesky, UPLO};

    check_square(a, "cholesky")?;
    let l = a
        .cholesky(UPLO::Lower)
        .map_err(|e| MarsError::NotPositiveDefinite(format!("{:?}", e)))?;

    // potrf does not always stop on NaN
    if let Some(j) = l.diag().iter().position(|d| !d.is_finite()) {
        return Err(MarsError::NotPositiveDefinite(format!(
            "pivot {} = {:e}",
            j,
            l[[j, j]]
        )));
    }
    Ok(l)
}

/// Solve `L·Lᵀ·x = b` given the lower-triangular factor `L`
pub fn cholesky_solve(l: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = check_square(l, "cholesky_solve")?;
    if b.len() != n {
        return Err(MarsError::DimensionMismatch(format!(
            "factor is {}x{} but right-hand side has {} elements",
            n,
            n,
            b.len()
        )));
    }

    // Forward substitution: L·z = b
    let mut z = Array1::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * z[k];
        }
        z[i] = sum / l[[i, i]];
    }

    // Back substitution: Lᵀ·x = z
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = z[i];
        for k in (i + 1)..n {
            sum -= l[[k, i]] * x[k];
        }
        x[i] = sum / l[[i, i]];
    }

    Ok(x)
}

/// Fold `Σ σᵢ·vᵢ·vᵢᵀ` into the Cholesky factor `l`, in place.
///
/// On entry `l·lᵀ = C`; on success `l·lᵀ = C + Σ σᵢ·vᵢ·vᵢᵀ`. The pairs are
/// applied one after another and `σ` may have either sign, so a pair can
/// also be a downdate. Each pass works on the unit-diagonal form
/// `L = L̃·D^½` and carries the running scale `b`:
///
/// ```text
/// v[i+1..]  -= v[i]·L̃[i+1.., i]
/// L'[i, i]   = sqrt(d[i] + (σ/b)·v[i]²)
/// L'[i+1..,i] = L̃[i+1.., i]·L'[i, i] + (σ/b)·v[i]·v[i+1..] / L'[i, i]
/// b         += σ·v[i]² / d[i]
/// ```
///
/// A radicand that is not strictly positive means the updated matrix is not
/// positive definite; it is reported as [`MarsError::RankUpdate`] and `l` is
/// left in an unspecified state.
pub fn update_cholesky(l: &mut Array2<f64>, updates: Vec<(Array1<f64>, f64)>) -> Result<()> {
    let n = check_square(l, "update_cholesky")?;

    for (mut v, sigma) in updates {
        if v.len() != n {
            return Err(MarsError::DimensionMismatch(format!(
                "update vector has {} elements but factor is {}x{}",
                v.len(),
                n,
                n
            )));
        }

        let diag = l.diag().to_owned();
        if let Some(j) = diag.iter().position(|&d| d.is_nan() || d <= 0.0) {
            return Err(MarsError::InvalidParameter(format!(
                "factor diagonal must be positive, got {:e} at {}",
                diag[j], j
            )));
        }

        for (j, mut column) in l.columns_mut().into_iter().enumerate() {
            let d = diag[j];
            column.mapv_inplace(|e| e / d);
        }
        let diag_sq = diag.mapv(|d| d * d);

        let mut b = 1.0;
        for i in 0..n {
            let vi = v[i];
            for r in (i + 1)..n {
                v[r] -= vi * l[[r, i]];
            }

            let scale = sigma / b;
            let radicand = diag_sq[i] + scale * vi * vi;
            if !radicand.is_finite() || radicand <= 0.0 {
                return Err(MarsError::RankUpdate { column: i, radicand });
            }

            let lii = radicand.sqrt();
            l[[i, i]] = lii;
            for r in (i + 1)..n {
                l[[r, i]] = l[[r, i]] * lii + scale * vi * v[r] / lii;
            }

            b += sigma * vi * vi / diag_sq[i];
        }
    }

    Ok(())
}

/// Split the symmetric perturbation `a·eₙᵀ + eₙ·aᵀ` (diagonal entry added
/// once) into `(eigenvector, eigenvalue)` pairs for [`update_cholesky`].
///
/// With `a' = a[..n-1]` the non-zero eigenvalues are
/// `(a[n-1] ± sqrt(a[n-1]² + 4‖a'‖²)) / 2` and the eigenvectors are
/// `[a'/λ, 1]` normalised. When `a'` vanishes the perturbation is the single
/// rank-one term `a[n-1]·eₙ·eₙᵀ`, and a zero `a` yields no pairs.
/// A pair whose eigenvalue underflows to zero carries nothing and is dropped.
pub fn decompose_addition(addition: &Array1<f64>) -> Vec<(Array1<f64>, f64)> {
    let n = addition.len();
    if n == 0 {
        return Vec::new();
    }

    let last = addition[n - 1];
    let off = addition.slice(s![..n - 1]);
    let off_sq = off.dot(&off);

    if off_sq == 0.0 {
        if last == 0.0 {
            return Vec::new();
        }
        let mut e = Array1::zeros(n);
        e[n - 1] = 1.0;
        return vec![(e, last)];
    }

    // Larger root first; the product of the roots is -‖a'‖², so the smaller
    // one never cancels against `last`.
    let root = (last * last + 4.0 * off_sq).sqrt();
    let large = if last >= 0.0 {
        (last + root) / 2.0
    } else {
        (last - root) / 2.0
    };
    let small = -off_sq / large;

    [large, small]
        .into_iter()
        .filter(|&eigenvalue| eigenvalue != 0.0 && eigenvalue.is_finite())
        .filter_map(|eigenvalue| {
            let mut vector = Array1::ones(n);
            vector
                .slice_mut(s![..n - 1])
                .assign(&off.mapv(|a| a / eigenvalue));
            let norm = vector.dot(&vector).sqrt();
            vector.mapv_inplace(|e| e / norm);
            vector
                .iter()
                .all(|e| e.is_finite())
                .then_some((vector, eigenvalue))
        })
        .collect()
}
