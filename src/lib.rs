//! mars_rust: Multivariate Adaptive Regression Splines in Rust
//!
//! Fits a piecewise-linear regression as a weighted sum of hinge basis
//! functions. The forward pass grows the model one pair of basis functions at
//! a time, refining knots with rank-two Cholesky updates instead of
//! refactoring, and the backward pass prunes it back with a GCV-style
//! lack-of-fit criterion.

pub mod basis;
pub mod linalg;
pub mod model;
pub mod forward;
pub mod backward;
pub mod mars;

pub use basis::{BasisFunction, Term};
pub use model::Model;
pub use forward::{forward_pass, CandidateQueue, ForwardResult, ForwardRound};
pub use backward::{backward_pass, BackwardResult, PruningStep};
pub use mars::{Mars, MarsConfig};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarsError {
    #[error("Matrix dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Covariance matrix is not positive definite: {0}")]
    NotPositiveDefinite(String),

    #[error("Cholesky rank update failed at column {column}: radicand {radicand:e}")]
    RankUpdate { column: usize, radicand: f64 },

    #[error("Model has not been fitted yet")]
    NotFitted,
}

impl MarsError {
    /// Failures that only invalidate the candidate being evaluated.
    ///
    /// The searches discard such candidates and carry on; every other error
    /// is a broken precondition and aborts the run.
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            MarsError::NotPositiveDefinite(_) | MarsError::RankUpdate { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MarsError>;
