//! Exhaustive grid search over the model hyperparameters.
//!
//! The grid is the Cartesian product of three candidate lists, visited with the
//! first axis outermost. An axis configured with a value in [0, 1] is fixed to
//! that value; any other value (the negative sentinel) searches the default
//! candidates. The best point is the strict maximum of the objective: ties keep
//! the first point visited, and NaN objectives never win.

use crate::config::ModelParameters;

/// Default candidates for the peptide emission probability (α).
pub const DEFAULT_PEP_EMISSION_GRID: [f64; 5] = [0.1, 0.3, 0.5, 0.7, 0.9];
/// Default candidates for the spurious emission probability (β).
pub const DEFAULT_PEP_SPURIOUS_EMISSION_GRID: [f64; 1] = [0.001];
/// Default candidates for the protein prior (γ).
pub const DEFAULT_PROT_PRIOR_GRID: [f64; 1] = [0.5];

/// One (α, β, γ) point of the grid.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HyperparameterPoint {
    pub pep_emission: f64,
    pub pep_spurious_emission: f64,
    pub prot_prior: f64,
}

/// Candidate values per axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterCandidates {
    pub pep_emission: Vec<f64>,
    pub pep_spurious_emission: Vec<f64>,
    pub prot_prior: Vec<f64>,
}

impl ParameterCandidates {
    /// Fixes every in-range axis and searches the defaults for the others.
    pub fn from_model(model: &ModelParameters) -> Self {
        Self {
            pep_emission: axis(model.pep_emission, &DEFAULT_PEP_EMISSION_GRID),
            pep_spurious_emission: axis(
                model.pep_spurious_emission,
                &DEFAULT_PEP_SPURIOUS_EMISSION_GRID,
            ),
            prot_prior: axis(model.prot_prior, &DEFAULT_PROT_PRIOR_GRID),
        }
    }

    pub fn grid(&self) -> GridSearch<'_, f64, f64, f64> {
        GridSearch::new(&self.pep_emission, &self.pep_spurious_emission, &self.prot_prior)
    }

    /// The point at `indices` (α, β, γ).
    pub fn point(&self, indices: [usize; 3]) -> Option<HyperparameterPoint> {
        Some(HyperparameterPoint {
            pep_emission: *self.pep_emission.get(indices[0])?,
            pep_spurious_emission: *self.pep_spurious_emission.get(indices[1])?,
            prot_prior: *self.prot_prior.get(indices[2])?,
        })
    }
}

fn axis(value: f64, defaults: &[f64]) -> Vec<f64> {
    if (0.0..=1.0).contains(&value) {
        vec![value]
    } else {
        defaults.to_vec()
    }
}

/// An evaluated grid point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub indices: [usize; 3],
    pub objective: f64,
}

/// Mutable record of a search: every evaluation and the running best.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchState {
    lower_bound: f64,
    evaluations: Vec<Evaluation>,
    best: Option<usize>,
}

impl SearchState {
    /// A point must beat `lower_bound` to become the best.
    pub fn new(lower_bound: f64) -> Self {
        Self {
            lower_bound,
            evaluations: Vec::new(),
            best: None,
        }
    }

    /// Records an evaluation; returns whether it is the new best.
    pub fn record(&mut self, indices: [usize; 3], objective: f64) -> bool {
        let threshold = self.best().map_or(self.lower_bound, |b| b.objective);
        self.evaluations.push(Evaluation { indices, objective });
        if objective > threshold {
            self.best = Some(self.evaluations.len() - 1);
            true
        } else {
            false
        }
    }

    pub fn evaluations(&self) -> &[Evaluation] {
        &self.evaluations
    }

    pub fn best(&self) -> Option<&Evaluation> {
        self.best.map(|i| &self.evaluations[i])
    }

    /// Indices of the best point, or the first grid point when nothing beat the bound.
    pub fn best_indices(&self) -> [usize; 3] {
        self.best().map_or([0; 3], |b| b.indices)
    }
}

/// Three-axis exhaustive grid.
#[derive(Debug, Clone, Copy)]
pub struct GridSearch<'a, A, B, C> {
    first: &'a [A],
    second: &'a [B],
    third: &'a [C],
}

impl<'a, A, B, C> GridSearch<'a, A, B, C> {
    pub fn new(first: &'a [A], second: &'a [B], third: &'a [C]) -> Self {
        Self {
            first,
            second,
            third,
        }
    }

    pub fn nr_combos(&self) -> usize {
        self.first.len() * self.second.len() * self.third.len()
    }

    /// Evaluates every point, first axis outermost, stopping at the first error.
    pub fn evaluate<F, E>(&self, lower_bound: f64, mut evaluator: F) -> Result<SearchState, E>
    where
        F: FnMut(&A, &B, &C) -> Result<f64, E>,
    {
        let mut state = SearchState::new(lower_bound);
        for (i, a) in self.first.iter().enumerate() {
            for (j, b) in self.second.iter().enumerate() {
                for (k, c) in self.third.iter().enumerate() {
                    let objective = evaluator(a, b, c)?;
                    state.record([i, j, k], objective);
                }
            }
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    #[test]
    fn sentinel_axes_use_defaults() {
        let model = ModelParameters {
            pep_emission: -1.0,
            pep_spurious_emission: 0.01,
            prot_prior: -1.0,
            ..Default::default()
        };
        let candidates = ParameterCandidates::from_model(&model);
        assert_eq!(candidates.pep_emission, DEFAULT_PEP_EMISSION_GRID.to_vec());
        assert_eq!(candidates.pep_spurious_emission, vec![0.01]);
        assert_eq!(candidates.prot_prior, vec![0.5]);
        assert_eq!(candidates.grid().nr_combos(), 5);
    }

    #[test]
    fn visits_first_axis_outermost() {
        let a = [1, 2];
        let b = [10];
        let c = [100, 200];
        let mut visited = Vec::new();
        GridSearch::new(&a, &b, &c)
            .evaluate(-1.0, |x, y, z| {
                visited.push(x + y + z);
                Ok::<_, Infallible>(0.0)
            })
            .expect("evaluate");
        assert_eq!(visited, vec![111, 211, 112, 212]);
    }

    #[test]
    fn strict_maximum_keeps_first_tie() {
        let a = [0.1, 0.2, 0.3, 0.4];
        let objectives = [0.5, 0.9, 0.9, 0.2];
        let state = GridSearch::new(&a, &[()], &[()])
            .evaluate(-1.0, |x, _, _| {
                let i = a.iter().position(|v| v == x).expect("candidate");
                Ok::<_, Infallible>(objectives[i])
            })
            .expect("evaluate");
        assert_eq!(state.best_indices(), [1, 0, 0]);
        assert_eq!(state.evaluations().len(), 4);
    }

    #[test]
    fn nan_never_wins() {
        let mut state = SearchState::new(-1.0);
        assert!(!state.record([0, 0, 0], f64::NAN));
        assert!(state.record([1, 0, 0], 0.1));
        assert!(!state.record([2, 0, 0], f64::NAN));
        assert_eq!(state.best_indices(), [1, 0, 0]);

        let mut all_nan = SearchState::new(-1.0);
        all_nan.record([3, 0, 0], f64::NAN);
        assert!(all_nan.best().is_none());
        assert_eq!(all_nan.best_indices(), [0, 0, 0]);
    }

    #[test]
    fn evaluator_errors_stop_the_search() {
        let a = [1, 2, 3];
        let mut calls = 0;
        let result = GridSearch::new(&a, &[()], &[()]).evaluate(-1.0, |x, _, _| {
            calls += 1;
            if *x == 2 {
                Err("boom")
            } else {
                Ok(0.0)
            }
        });
        assert_eq!(result, Err("boom"));
        assert_eq!(calls, 2);
    }
}
