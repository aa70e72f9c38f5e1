//! Backward pass: greedy pruning of a grown model

use ndarray::Array1;
use crate::{model::Model, Result};

/// One accepted removal
#[derive(Debug, Clone, PartialEq)]
pub struct PruningStep {
    /// Position of the removed basis function in the model it was removed from
    pub removed: usize,
    /// Basis functions left after the removal
    pub basis_count: usize,
    pub lof: f64,
}

/// Best model seen while pruning plus the removal trace
#[derive(Debug, Clone)]
pub struct BackwardResult {
    pub model: Model,
    pub steps: Vec<PruningStep>,
}

/// Prune `model` one basis function at a time.
///
/// Each step tries every removal except the constant function and keeps the
/// one with the lowest lack-of-fit. The pass returns the best model over all
/// sizes, including the unpruned one. Removals that fail to factorise are
/// skipped; a step with no valid removal ends the pass.
pub fn backward_pass(y: &Array1<f64>, model: Model) -> Result<BackwardResult> {
    let mut best_model = model.clone();
    let mut current = model;
    let mut steps = Vec::new();

    while current.len() > 1 {
        let mut step_best: Option<(usize, Model)> = None;

        for index in 1..current.len() {
            let mut candidate = current.clone();
            match candidate.shrink(y, index) {
                Ok(()) => {}
                Err(e) if e.is_numerical() => {
                    log::debug!("skipping removal of basis function {}: {}", index, e);
                    continue;
                }
                Err(e) => return Err(e),
            }

            let better = step_best
                .as_ref()
                .map_or(true, |(_, best)| candidate.lof() < best.lof());
            if better {
                step_best = Some((index, candidate));
            }
        }

        let Some((removed, pruned)) = step_best else {
            log::warn!(
                "backward pass stopped at {} basis functions: no removal could be refitted",
                current.len()
            );
            break;
        };

        log::debug!(
            "backward step {}: removed basis function {} -> {} basis functions, lof {:.6e}",
            steps.len() + 1,
            removed,
            pruned.len(),
            pruned.lof()
        );
        steps.push(PruningStep {
            removed,
            basis_count: pruned.len(),
            lof: pruned.lof(),
        });

        if pruned.lof() < best_model.lof() {
            best_model = pruned.clone();
        }
        current = pruned;
    }

    log::info!(
        "backward pass kept {} basis functions, lof {:.6e}",
        best_model.len(),
        best_model.lof()
    );
    Ok(BackwardResult {
        model: best_model,
        steps,
    })
}
