//! Model state and incremental least-squares fitting
//!
//! A [`Model`] owns the design matrix, centred covariance matrix, right-hand
//! side and Cholesky factor for its list of basis functions. Besides a full
//! [`Model::fit`] it supports three incremental operations used by the
//! searches:
//!
//! - [`Model::extend`]: new columns are appended, only the new cross terms of
//!   the covariance are computed, then the factor is rebuilt.
//! - [`Model::update`]: the knot of the last basis function moves down; the
//!   covariance changes by a symmetric rank-two matrix which is folded into
//!   the factor with [`update_cholesky`], no refactorisation.
//! - [`Model::shrink`]: one basis function is deleted and the factor rebuilt.

use ndarray::{concatenate, s, Array1, Array2, ArrayView1, Axis};
use crate::{
    basis::BasisFunction,
    linalg::{cholesky, cholesky_solve, decompose_addition, update_cholesky},
    MarsError, Result,
};

/// Ridge added to the covariance diagonal.
///
/// Basis functions produced by the forward pass are not necessarily linearly
/// independent, so the covariance can be singular without it.
pub const REGULARIZATION: f64 = 1e-8;

/// Default cost `d` charged per non-constant basis function in the lack-of-fit
pub const DEFAULT_PENALTY: f64 = 3.0;

/// Rows touched by one knot refinement and the change of the last column on
/// those rows. Lives only for the duration of [`Model::update`].
struct UpdateContext {
    rows: Vec<usize>,
    delta: Array1<f64>,
    delta_mean: f64,
}

/// Basis functions plus the least-squares state fitted on them
#[derive(Debug, Clone)]
pub struct Model {
    /// Basis functions; index 0 is always the constant function
    basis: Vec<BasisFunction>,
    /// GCV cost per non-constant basis function
    penalty: f64,
    /// `D[i, j] = basis_j(x_i)`
    design: Array2<f64>,
    /// Column means of the design matrix
    means: Array1<f64>,
    /// `(D - μ)ᵀ(D - μ) + REGULARIZATION·I`
    covariance: Array2<f64>,
    /// `Dᵀ(y - ȳ)`
    rhs: Array1<f64>,
    /// Lower-triangular `L` with `L·Lᵀ = covariance`
    factor: Array2<f64>,
    coefficients: Array1<f64>,
    y_mean: f64,
    lof: f64,
}

impl Default for Model {
    fn default() -> Self {
        Self::new(DEFAULT_PENALTY)
    }
}

impl Model {
    /// Unfitted model holding only the constant basis function
    pub fn new(penalty: f64) -> Self {
        Self {
            basis: vec![BasisFunction::constant()],
            penalty,
            design: Array2::zeros((0, 0)),
            means: Array1::zeros(0),
            covariance: Array2::zeros((0, 0)),
            rhs: Array1::zeros(0),
            factor: Array2::zeros((0, 0)),
            coefficients: Array1::zeros(0),
            y_mean: 0.0,
            lof: f64::INFINITY,
        }
    }

    /// Number of basis functions, the constant included; never zero
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.basis.len()
    }

    pub fn basis(&self) -> &[BasisFunction] {
        &self.basis
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    pub fn design(&self) -> &Array2<f64> {
        &self.design
    }

    pub fn covariance(&self) -> &Array2<f64> {
        &self.covariance
    }

    pub fn rhs(&self) -> &Array1<f64> {
        &self.rhs
    }

    pub fn factor(&self) -> &Array2<f64> {
        &self.factor
    }

    pub fn means(&self) -> &Array1<f64> {
        &self.means
    }

    pub fn penalty(&self) -> f64 {
        self.penalty
    }

    /// Lack-of-fit of the last fit; `+∞` before the first fit
    pub fn lof(&self) -> f64 {
        self.lof
    }

    /// Design-matrix column of basis function `index`
    pub fn column(&self, index: usize) -> ArrayView1<'_, f64> {
        self.design.column(index)
    }

    /// Append basis functions without refitting; follow with [`Model::extend`]
    pub fn add<I>(&mut self, bases: I)
    where
        I: IntoIterator<Item = BasisFunction>,
    {
        self.basis.extend(bases);
    }

    /// Swap the last basis function for `basis` without refitting
    pub fn replace_last(&mut self, basis: BasisFunction) -> Result<()> {
        if self.basis.len() < 2 {
            return Err(MarsError::InvalidParameter(
                "the constant basis function cannot be replaced".to_string(),
            ));
        }
        let last = self.basis.len() - 1;
        self.basis[last] = basis;
        Ok(())
    }

    /// Evaluate every basis function on `x`
    pub fn design_matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        let xv = x.view();
        let mut design = Array2::zeros((x.nrows(), self.basis.len()));
        for (j, basis) in self.basis.iter().enumerate() {
            design.column_mut(j).assign(&basis.evaluate(&xv));
        }
        design
    }

    /// Weighted sum of the basis functions evaluated on `x`
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.coefficients.len() != self.basis.len() {
            return Err(MarsError::NotFitted);
        }
        check_variables(&self.basis, x.ncols())?;

        Ok(self.design_matrix(x).dot(&self.coefficients))
    }

    /// Full fit from scratch
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_samples(x, y)?;
        check_variables(&self.basis, x.ncols())?;

        let n = x.nrows() as f64;
        self.design = self.design_matrix(x);
        self.means = self.design.sum_axis(Axis(0)) / n;

        let centred = &self.design - &self.means;
        self.covariance = centred.t().dot(&centred);
        self.covariance
            .diag_mut()
            .map_inplace(|c| *c += REGULARIZATION);

        self.y_mean = y.sum() / n;
        let y_mean = self.y_mean;
        self.rhs = self.design.t().dot(&y.mapv(|v| v - y_mean));

        self.factor = cholesky(&self.covariance)?;
        self.solve(y)
    }

    /// Fit after the last `count` basis functions were appended with
    /// [`Model::add`].
    ///
    /// Existing design columns, covariance entries and right-hand side entries
    /// are reused; the factor is recomputed.
    pub fn extend(&mut self, x: &Array2<f64>, y: &Array1<f64>, count: usize) -> Result<()> {
        let p = self.basis.len();
        if count == 0 || self.design.ncols() + count != p {
            return Err(MarsError::InvalidParameter(format!(
                "extend by {} expects a fitted model with {} basis functions, design has {} columns",
                count,
                p.saturating_sub(count),
                self.design.ncols()
            )));
        }
        check_samples(x, y)?;
        if x.nrows() != self.design.nrows() {
            return Err(MarsError::DimensionMismatch(format!(
                "model was fitted on {} samples, got {}",
                self.design.nrows(),
                x.nrows()
            )));
        }

        let old = p - count;
        check_variables(&self.basis[old..], x.ncols())?;

        let n = x.nrows() as f64;
        let xv = x.view();
        let mut new_columns = Array2::zeros((x.nrows(), count));
        for (k, basis) in self.basis[old..].iter().enumerate() {
            new_columns.column_mut(k).assign(&basis.evaluate(&xv));
        }
        let new_means = new_columns.sum_axis(Axis(0)) / n;

        self.design = concatenate(Axis(1), &[self.design.view(), new_columns.view()])
            .map_err(|e| MarsError::DimensionMismatch(e.to_string()))?;
        self.means = concatenate(Axis(0), &[self.means.view(), new_means.view()])
            .map_err(|e| MarsError::DimensionMismatch(e.to_string()))?;

        // Cross terms of the new centred columns with every centred column
        let centred = &self.design - &self.means;
        let centred_new = &new_columns - &new_means;
        let cross = centred.t().dot(&centred_new);

        let mut covariance = Array2::zeros((p, p));
        covariance.slice_mut(s![..old, ..old]).assign(&self.covariance);
        covariance.slice_mut(s![.., old..]).assign(&cross);
        covariance
            .slice_mut(s![old.., ..old])
            .assign(&cross.slice(s![..old, ..]).t());
        for j in old..p {
            covariance[[j, j]] += REGULARIZATION;
        }
        self.covariance = covariance;

        let y_mean = self.y_mean;
        let rhs_new = new_columns.t().dot(&y.mapv(|v| v - y_mean));
        self.rhs = concatenate(Axis(0), &[self.rhs.view(), rhs_new.view()])
            .map_err(|e| MarsError::DimensionMismatch(e.to_string()))?;

        self.factor = cholesky(&self.covariance)?;
        self.solve(y)
    }

    /// Move the knot of the last basis function from `upper_knot` down to
    /// `new_knot` and refit with a rank-two factor update.
    ///
    /// The last basis function must already be the refined one: its last term
    /// a hinge on `variable` at `new_knot`, with the design column still
    /// holding the values for `upper_knot`. `parent_column` is the
    /// design column of the basis function it was grown from.
    ///
    /// A failed rank update leaves the model inconsistent; discard it.
    pub fn update(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        upper_knot: f64,
        new_knot: f64,
        variable: usize,
        parent_column: ArrayView1<f64>,
    ) -> Result<()> {
        let p = self.basis.len();
        let n = x.nrows();

        if p < 2 || self.design.ncols() != p {
            return Err(MarsError::InvalidParameter(
                "update needs a fitted model with a non-constant last basis function".to_string(),
            ));
        }
        if new_knot.is_nan() || new_knot > upper_knot {
            return Err(MarsError::InvalidParameter(format!(
                "new knot {} must not exceed the current knot {}",
                new_knot, upper_knot
            )));
        }
        if variable >= x.ncols() {
            return Err(MarsError::InvalidParameter(format!(
                "variable {} out of range for {} covariates",
                variable,
                x.ncols()
            )));
        }
        match self.basis[p - 1].terms().last() {
            Some(term) if term.variable == variable && term.hinge && term.knot == new_knot => {}
            _ => {
                return Err(MarsError::InvalidParameter(format!(
                    "last basis function must end in a hinge on variable {} at knot {}",
                    variable, new_knot
                )))
            }
        }
        if y.len() != n || self.design.nrows() != n || parent_column.len() != n {
            return Err(MarsError::DimensionMismatch(format!(
                "update on {} samples: y has {}, design has {}, parent column has {}",
                n,
                y.len(),
                self.design.nrows(),
                parent_column.len()
            )));
        }

        let last = p - 1;
        let context = initialise_update(x, upper_knot, new_knot, variable, &parent_column);
        let previous_mean = self.means[last];
        self.means[last] += context.delta_mean;

        for (&row, &delta) in context.rows.iter().zip(context.delta.iter()) {
            self.design[[row, last]] += delta;
        }

        let addition = self.covariance_addition(&context, previous_mean);
        if addition.iter().any(|&a| a != 0.0) {
            for j in 0..last {
                self.covariance[[last, j]] += addition[j];
                self.covariance[[j, last]] += addition[j];
            }
            self.covariance[[last, last]] += addition[last];

            update_cholesky(&mut self.factor, decompose_addition(&addition))?;
        }

        let y_mean = self.y_mean;
        self.rhs[last] += context
            .rows
            .iter()
            .zip(context.delta.iter())
            .map(|(&row, &delta)| delta * (y[row] - y_mean))
            .sum::<f64>();

        self.solve(y)
    }

    /// Delete basis function `index` and refit.
    ///
    /// The matching row/column of the covariance is dropped and the factor is
    /// rebuilt from scratch.
    pub fn shrink(&mut self, y: &Array1<f64>, index: usize) -> Result<()> {
        let p = self.basis.len();
        if index == 0 {
            return Err(MarsError::InvalidParameter(
                "the constant basis function cannot be removed".to_string(),
            ));
        }
        if index >= p {
            return Err(MarsError::InvalidParameter(format!(
                "basis index {} out of range for {} basis functions",
                index, p
            )));
        }
        if self.design.ncols() != p {
            return Err(MarsError::InvalidParameter(
                "shrink needs a fitted model".to_string(),
            ));
        }
        if y.len() != self.design.nrows() {
            return Err(MarsError::DimensionMismatch(format!(
                "model was fitted on {} samples but y has {} elements",
                self.design.nrows(),
                y.len()
            )));
        }

        self.basis.remove(index);
        let keep: Vec<usize> = (0..p).filter(|&j| j != index).collect();
        self.design = self.design.select(Axis(1), &keep);
        self.covariance = self.covariance.select(Axis(0), &keep).select(Axis(1), &keep);
        self.rhs = self.rhs.select(Axis(0), &keep);
        self.means = self.means.select(Axis(0), &keep);

        self.factor = cholesky(&self.covariance)?;
        self.solve(y)
    }

    /// Change of the last covariance row/column caused by `context`.
    ///
    /// Entry `j < last` is `Σ Δ·(D_j - μ_j)`; the diagonal entry contracts
    /// `Δ` with the centred last column both before and after the change.
    fn covariance_addition(&self, context: &UpdateContext, previous_mean: f64) -> Array1<f64> {
        let p = self.basis.len();
        let last = p - 1;
        let current_mean = self.means[last];

        let mut addition = Array1::zeros(p);
        for (&row, &delta) in context.rows.iter().zip(context.delta.iter()) {
            let design_row = self.design.row(row);
            for j in 0..last {
                addition[j] += delta * (design_row[j] - self.means[j]);
            }
            let current = design_row[last];
            addition[last] += delta * (current - delta - previous_mean)
                + delta * (current - current_mean);
        }
        addition
    }

    /// Coefficients and lack-of-fit from the current factor and right-hand side
    fn solve(&mut self, y: &Array1<f64>) -> Result<()> {
        let mut coefficients = cholesky_solve(&self.factor, &self.rhs)?;

        // The centred system leaves the constant column undetermined; its
        // coefficient carries the intercept.
        let offset: f64 = coefficients
            .iter()
            .zip(self.means.iter())
            .skip(1)
            .map(|(beta, mean)| beta * mean)
            .sum();
        coefficients[0] = self.y_mean - offset;

        self.coefficients = coefficients;
        self.lof = self.lack_of_fit(y);
        Ok(())
    }

    /// `(RSS / n) / (1 - c/n)²` with `c = p + 1 + d·(p - 1)`
    fn lack_of_fit(&self, y: &Array1<f64>) -> f64 {
        let n = y.len() as f64;
        let residuals = y - &self.design.dot(&self.coefficients);
        let rss = residuals.dot(&residuals);

        let p = self.basis.len() as f64;
        let effective_params = p + 1.0 + self.penalty * (p - 1.0);
        if effective_params >= n {
            return f64::INFINITY;
        }

        let shrinkage = 1.0 - effective_params / n;
        rss / n / (shrinkage * shrinkage)
    }
}

fn initialise_update(
    x: &Array2<f64>,
    upper_knot: f64,
    new_knot: f64,
    variable: usize,
    parent_column: &ArrayView1<f64>,
) -> UpdateContext {
    let mut rows = Vec::new();
    let mut delta = Vec::new();
    for (i, &value) in x.column(variable).iter().enumerate() {
        if value > new_knot {
            rows.push(i);
            delta.push((value.min(upper_knot) - new_knot) * parent_column[i]);
        }
    }

    let delta_mean = delta.iter().sum::<f64>() / x.nrows() as f64;
    UpdateContext {
        rows,
        delta: Array1::from_vec(delta),
        delta_mean,
    }
}

fn check_samples(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(MarsError::DimensionMismatch(format!(
            "X has {} rows but y has {} elements",
            x.nrows(),
            y.len()
        )));
    }
    if x.nrows() == 0 {
        return Err(MarsError::InvalidParameter("no samples".to_string()));
    }
    Ok(())
}

fn check_variables(bases: &[BasisFunction], ncols: usize) -> Result<()> {
    let max_variable = bases
        .iter()
        .flat_map(|b| b.terms().iter().map(|t| t.variable))
        .max();
    match max_variable {
        Some(v) if v >= ncols => Err(MarsError::DimensionMismatch(format!(
            "basis uses variable {} but X has {} columns",
            v, ncols
        ))),
        _ => Ok(()),
    }
}
