//! MARS estimator: forward pass followed by backward pass

use ndarray::{Array1, Array2};
use crate::{
    backward::{backward_pass, PruningStep},
    basis::BasisFunction,
    forward::{forward_pass, ForwardRound, DEFAULT_QUEUE_WIDTH},
    model::{Model, DEFAULT_PENALTY},
    MarsError, Result,
};

/// Search settings
#[derive(Debug, Clone, PartialEq)]
pub struct MarsConfig {
    /// Forward pass stops once the model holds at least this many basis functions
    pub max_basis: usize,
    /// Parents explored per forward round
    pub queue_width: usize,
    /// Score bonus for every basis function left out of a round
    pub aging_factor: f64,
    /// Cost `d` per non-constant basis function in the lack-of-fit
    pub penalty: f64,
}

impl Default for MarsConfig {
    fn default() -> Self {
        Self {
            max_basis: 11,
            queue_width: DEFAULT_QUEUE_WIDTH,
            aging_factor: 0.0,
            penalty: DEFAULT_PENALTY,
        }
    }
}

impl MarsConfig {
    pub fn with_max_basis(mut self, max_basis: usize) -> Self {
        self.max_basis = max_basis;
        self
    }

    pub fn with_queue_width(mut self, queue_width: usize) -> Self {
        self.queue_width = queue_width;
        self
    }

    pub fn with_aging_factor(mut self, aging_factor: f64) -> Self {
        self.aging_factor = aging_factor;
        self
    }

    pub fn with_penalty(mut self, penalty: f64) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_basis == 0 {
            return Err(MarsError::InvalidParameter(
                "max_basis must be at least 1".to_string(),
            ));
        }
        if self.queue_width == 0 {
            return Err(MarsError::InvalidParameter(
                "queue_width must be at least 1".to_string(),
            ));
        }
        if !self.aging_factor.is_finite() || self.aging_factor < 0.0 {
            return Err(MarsError::InvalidParameter(format!(
                "aging_factor must be finite and non-negative, got {}",
                self.aging_factor
            )));
        }
        if !self.penalty.is_finite() || self.penalty < 0.0 {
            return Err(MarsError::InvalidParameter(format!(
                "penalty must be finite and non-negative, got {}",
                self.penalty
            )));
        }
        Ok(())
    }
}

/// Multivariate Adaptive Regression Splines
pub struct Mars {
    pub config: MarsConfig,
    /// Pruned model
    pub model: Option<Model>,
    /// Forward pass trace
    pub forward_rounds: Vec<ForwardRound>,
    /// Backward pass trace
    pub pruning_steps: Vec<PruningStep>,
    /// Covariates seen during fitting
    pub n_features: usize,
}

impl Mars {
    pub fn new(config: MarsConfig) -> Self {
        Self {
            config,
            model: None,
            forward_rounds: Vec::new(),
            pruning_steps: Vec::new(),
            n_features: 0,
        }
    }

    /// Whether model has been fitted
    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    /// Grow a model with the forward pass, then prune it with the backward pass
    ///
    /// # Arguments
    /// * `x` - Covariate matrix, one row per sample
    /// * `y` - Response vector
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.config.validate()?;

        if x.nrows() != y.len() {
            return Err(MarsError::DimensionMismatch(format!(
                "X has {} rows but y has {} elements",
                x.nrows(),
                y.len()
            )));
        }
        if x.ncols() == 0 {
            return Err(MarsError::DimensionMismatch(
                "X has no covariate columns".to_string(),
            ));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(MarsError::InvalidParameter(
                "samples contain NaN or infinite values".to_string(),
            ));
        }

        let forward = forward_pass(x, y, &self.config)?;
        let backward = backward_pass(y, forward.model)?;

        self.model = Some(backward.model);
        self.forward_rounds = forward.rounds;
        self.pruning_steps = backward.steps;
        self.n_features = x.ncols();

        Ok(())
    }

    /// Predict response for new data
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let model = self.model.as_ref().ok_or(MarsError::NotFitted)?;

        if x.ncols() != self.n_features {
            return Err(MarsError::DimensionMismatch(format!(
                "X has {} columns but model was fitted on {}",
                x.ncols(),
                self.n_features
            )));
        }

        model.predict(x)
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.model.as_ref().map(|m| m.coefficients())
    }

    pub fn basis(&self) -> Option<&[BasisFunction]> {
        self.model.as_ref().map(|m| m.basis())
    }

    /// Lack-of-fit of the pruned model
    pub fn lof(&self) -> Option<f64> {
        self.model.as_ref().map(|m| m.lof())
    }
}
