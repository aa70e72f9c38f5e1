//! Forward pass: greedy growth of the basis
//!
//! Every round picks the top-`k` basis functions of the [`CandidateQueue`] as
//! parents. For each parent and each covariate not yet used along the
//! parent's term chain, the pair `parent·x_v` / `parent·h(x_v - t)` is
//! appended with [`Model::extend`] at the largest eligible knot, and the knot
//! is then swept downwards with [`Model::update`]. The lowest lack-of-fit seen
//! anywhere in the round becomes the next model.

use ndarray::{Array1, Array2, ArrayView1};
use crate::{mars::MarsConfig, model::Model, MarsError, Result};

/// Number of parents explored per round unless configured otherwise
pub const DEFAULT_QUEUE_WIDTH: usize = 5;

/// Score of each basis function of the current model, indexed by position.
///
/// A score is the lack-of-fit improvement the basis function achieved the
/// last time it was explored as a parent; unexplored functions start at 0
/// and the constant function at 1.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateQueue {
    scores: Vec<f64>,
}

impl Default for CandidateQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateQueue {
    /// Queue for a model holding only the constant basis function
    pub fn new() -> Self {
        Self { scores: vec![1.0] }
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    /// Indices of the `k` highest scores, best first.
    ///
    /// Equal scores put the later index first, so the order is fully
    /// determined by the scores.
    pub fn top(&self, k: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.scores.len()).collect();
        order.sort_by(|&a, &b| self.scores[a].total_cmp(&self.scores[b]));
        order.into_iter().rev().take(k).collect()
    }

    pub fn set_score(&mut self, index: usize, score: f64) {
        self.scores[index] = score;
    }

    /// Raise the score of every entry that was not explored this round
    pub fn age(&mut self, explored: &[usize], aging_factor: f64) {
        for (index, score) in self.scores.iter_mut().enumerate() {
            if !explored.contains(&index) {
                *score += aging_factor;
            }
        }
    }

    /// Register `count` new basis functions with score 0
    pub fn push_unexplored(&mut self, count: usize) {
        self.scores.extend(std::iter::repeat(0.0).take(count));
    }
}

/// What happened in one forward round
#[derive(Debug, Clone)]
pub struct ForwardRound {
    /// Queue scores at the start of the round
    pub scores: Vec<f64>,
    /// Parents explored, best score first
    pub parents: Vec<usize>,
    /// Parent of the accepted pair
    pub parent: usize,
    pub variable: usize,
    pub knot: f64,
    /// Lack-of-fit of the accepted model
    pub lof: f64,
}

/// Grown model plus the per-round trace
#[derive(Debug, Clone)]
pub struct ForwardResult {
    pub model: Model,
    pub rounds: Vec<ForwardRound>,
}

struct Candidate {
    model: Model,
    parent: usize,
    variable: usize,
    knot: f64,
}

/// Grow a model from the constant function until it holds at least
/// `config.max_basis` basis functions.
///
/// Pairs are added together, so the final size can exceed `max_basis` by
/// one. The pass also stops early when a round produces no valid candidate.
pub fn forward_pass(x: &Array2<f64>, y: &Array1<f64>, config: &MarsConfig) -> Result<ForwardResult> {
    config.validate()?;

    let mut model = Model::new(config.penalty);
    model.fit(x, y)?;

    let mut queue = CandidateQueue::new();
    let mut rounds = Vec::new();

    while model.len() < config.max_basis {
        let scores = queue.scores().to_vec();
        let parents = queue.top(config.queue_width);

        let mut best: Option<Candidate> = None;
        let mut best_lof = f64::INFINITY;

        for &m in &parents {
            let parent = model.basis()[m].clone();
            let parent_column = model.column(m);
            let mut parent_lof = f64::INFINITY;

            for v in (0..x.ncols()).filter(|&v| !parent.uses_variable(v)) {
                let knots = eligible_knots(x, parent_column, v);
                let Some(&first) = knots.first() else {
                    continue;
                };

                let mut candidate = model.clone();
                candidate.add(vec![
                    parent.with_term(v, 0.0, false),
                    parent.with_term(v, first, true),
                ]);
                if let Err(e) = candidate.extend(x, y, 2) {
                    discard(e, m, v, first)?;
                    continue;
                }

                let mut upper = first;
                for &knot in &knots[1..] {
                    candidate.replace_last(parent.with_term(v, knot, true))?;
                    if let Err(e) = candidate.update(x, y, upper, knot, v, parent_column) {
                        // The factor is no longer valid for the rest of the sweep
                        discard(e, m, v, knot)?;
                        break;
                    }
                    upper = knot;

                    let lof = candidate.lof();
                    if lof < parent_lof {
                        parent_lof = lof;
                    }
                    if lof < best_lof {
                        best_lof = lof;
                        best = Some(Candidate {
                            model: candidate.clone(),
                            parent: m,
                            variable: v,
                            knot,
                        });
                    }
                }
            }

            queue.set_score(m, model.lof() - parent_lof);
        }
        queue.age(&parents, config.aging_factor);

        let Some(best) = best else {
            log::warn!(
                "forward pass stopped at {} basis functions: no valid candidate",
                model.len()
            );
            break;
        };

        let added = best.model.len() - model.len();
        log::info!(
            "forward round {}: parent {} variable {} knot {:.6} -> {} basis functions, lof {:.6e}",
            rounds.len() + 1,
            best.parent,
            best.variable,
            best.knot,
            best.model.len(),
            best_lof
        );
        rounds.push(ForwardRound {
            scores,
            parents,
            parent: best.parent,
            variable: best.variable,
            knot: best.knot,
            lof: best_lof,
        });

        model = best.model;
        queue.push_unexplored(added);
    }

    Ok(ForwardResult { model, rounds })
}

/// Distinct finite values of covariate `variable` on rows where the parent is
/// positive, largest first
fn eligible_knots(x: &Array2<f64>, parent_column: ArrayView1<f64>, variable: usize) -> Vec<f64> {
    let mut knots = Vec::new();
    for (&value, &parent) in x.column(variable).iter().zip(parent_column.iter()) {
        if parent > 0.0 && value.is_finite() {
            knots.push(value);
        }
    }
    knots.sort_by(|a, b| b.total_cmp(a));
    knots.dedup();
    knots
}

fn discard(error: MarsError, parent: usize, variable: usize, knot: f64) -> Result<()> {
    if !error.is_numerical() {
        return Err(error);
    }
    log::debug!(
        "discarding candidate (parent {}, variable {}, knot {}): {}",
        parent,
        variable,
        knot,
        error
    );
    Ok(())
}
