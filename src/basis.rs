//! Hinge basis functions

use ndarray::{Array1, ArrayView2};

/// One factor of a basis function: `(x[variable] - knot)`, optionally hinged
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Term {
    /// Column of the sample matrix this term reads
    pub variable: usize,
    /// Knot subtracted from the covariate
    pub knot: f64,
    /// Clamp negative differences to zero
    pub hinge: bool,
}

impl Term {
    #[inline]
    fn apply(&self, value: f64) -> f64 {
        let diff = value - self.knot;
        if self.hinge {
            diff.max(0.0)
        } else {
            diff
        }
    }
}

/// Product of (possibly hinged) linear terms.
///
/// A basis function with no terms is the constant `1`. Terms can only be
/// appended, so a child built from a parent always starts with the parent's
/// terms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasisFunction {
    terms: Vec<Term>,
}

impl BasisFunction {
    /// The constant basis function
    pub fn constant() -> Self {
        Self::default()
    }

    /// Append one term
    pub fn add(&mut self, variable: usize, knot: f64, hinge: bool) {
        self.terms.push(Term { variable, knot, hinge });
    }

    /// Copy of `self` with one extra term appended
    pub fn with_term(&self, variable: usize, knot: f64, hinge: bool) -> Self {
        let mut child = self.clone();
        child.add(variable, knot, hinge);
        child
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Number of terms in the product
    pub fn degree(&self) -> usize {
        self.terms.len()
    }

    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    /// Whether any term reads `variable`
    pub fn uses_variable(&self, variable: usize) -> bool {
        self.terms.iter().any(|t| t.variable == variable)
    }

    /// Knot of the most recently appended term
    pub fn last_knot(&self) -> Option<f64> {
        self.terms.last().map(|t| t.knot)
    }

    /// Evaluate on every row of `x`
    ///
    /// Term variables must be valid column indices of `x`.
    pub fn evaluate(&self, x: &ArrayView2<f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| self.terms.iter().map(|t| t.apply(row[t.variable])).product())
            .collect()
    }
}
