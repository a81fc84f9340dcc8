//! Loopy belief propagation over a compiled factor graph.
//!
//! This module implements scheduled, dampened message passing with the
//! generalized p-norm marginalization rule. Every message starts uniform; all
//! factor → variable edges are queued ab initio and recomputed in scheduler
//! order. After each update the message is blended with its previous value,
//!
//! ```text
//! new = λ · old + (1 − λ) · recomputed
//! ```
//!
//! and compared with it by max absolute difference. A change above the
//! convergence threshold re-queues the edge and wakes every message depending
//! on it; a smaller change marks the edge converged. The loop ends when the
//! queue drains or the iteration budget is spent. Running out of budget is an
//! accepted inaccuracy, reported through [`BeliefPropagationDiagnostics`],
//! never an error.

use std::fmt::Debug;
use std::hash::Hash;

use crate::engine::errors::InferenceError;
use crate::engine::factor_graph::{EdgeDirection, EdgeIdx, FactorGraph, VarIdx};
use crate::engine::pmf::{PNorm, Pmf};
use crate::engine::scheduler::{MessageScheduler, SchedulingType};

/// Default iteration budget per component (2^31 message updates).
pub const DEFAULT_MAX_ITERATIONS: u64 = 1 << 31;

/// Configuration for loopy belief propagation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeliefPropagationConfig {
    /// Dampening factor in [0, 1]. 0 overwrites old messages, 1 never moves them.
    pub dampening_lambda: f64,
    /// Max absolute message change under which an edge counts as converged.
    pub convergence_threshold: f64,
    /// Maximum number of message updates.
    pub max_iterations: u64,
    /// Marginalization norm; `Finite(1.0)` is sum-product.
    pub p_norm: PNorm,
    /// Order in which due messages are recomputed.
    pub scheduling: SchedulingType,
}

impl Default for BeliefPropagationConfig {
    fn default() -> Self {
        Self {
            dampening_lambda: 1e-3,
            convergence_threshold: 1e-5,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            p_norm: PNorm::default(),
            scheduling: SchedulingType::Priority,
        }
    }
}

impl BeliefPropagationConfig {
    pub fn validate(self) -> Result<Self, InferenceError> {
        if !(0.0..=1.0).contains(&self.dampening_lambda) {
            return Err(InferenceError::Configuration(
                "loopy_belief_propagation: dampening_lambda must be in [0, 1]".into(),
            ));
        }
        if self.convergence_threshold <= 0.0 || !self.convergence_threshold.is_finite() {
            return Err(InferenceError::Configuration(
                "loopy_belief_propagation: convergence_threshold must be finite and > 0".into(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(InferenceError::Configuration(
                "loopy_belief_propagation: max_nr_iterations must be > 0".into(),
            ));
        }
        if let PNorm::Finite(p) = self.p_norm {
            if !(p.is_finite() && p > 0.0) {
                return Err(InferenceError::Configuration(
                    "loopy_belief_propagation: p_norm_inference must be a number".into(),
                ));
            }
        }
        Ok(self)
    }
}

/// Runtime diagnostics emitted by loopy belief propagation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BeliefPropagationDiagnostics {
    /// Iteration limit configured for this run.
    pub max_iterations: u64,
    /// Number of message updates actually executed.
    pub iterations_run: u64,
    /// Whether every edge converged before the iteration limit.
    pub converged: bool,
    /// Largest message change among the updates of the run.
    pub max_message_delta: f64,
    /// Change of the last executed update.
    pub final_message_delta: f64,
    pub variable_count: usize,
    pub factor_count: usize,
    pub edge_count: usize,
}

/// Marginal result for one requested variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariablePosterior<L> {
    pub label: L,
    /// Normalized marginal, narrowed to its non-zero support.
    pub marginal: Pmf,
    /// `1 - P(0)`, see [`Pmf::presence_probability`].
    pub posterior: f64,
}

/// Message passing state for one factor graph.
#[derive(Debug)]
pub struct BeliefPropagationEngine<'g, L> {
    graph: &'g FactorGraph<L>,
    config: BeliefPropagationConfig,
    messages: Vec<Pmf>,
    diagnostics: BeliefPropagationDiagnostics,
    finished: bool,
}

impl<'g, L> BeliefPropagationEngine<'g, L>
where
    L: Copy + Eq + Hash + Debug,
{
    pub fn new(
        graph: &'g FactorGraph<L>,
        config: BeliefPropagationConfig,
    ) -> Result<Self, InferenceError> {
        let config = config.validate()?;
        let messages = (0..graph.edge_count() as u32)
            .map(|e| {
                let (_, _, _, var) = graph.endpoints(EdgeIdx(e));
                Pmf::uniform(graph.max_value(var))
            })
            .collect();
        Ok(Self {
            graph,
            config,
            messages,
            diagnostics: BeliefPropagationDiagnostics {
                max_iterations: config.max_iterations,
                variable_count: graph.variable_count(),
                factor_count: graph.factor_count(),
                edge_count: graph.edge_count(),
                ..Default::default()
            },
            finished: false,
        })
    }

    /// Runs message passing with the configured scheduling policy.
    pub fn run(&mut self) -> Result<BeliefPropagationDiagnostics, InferenceError> {
        let mut scheduler = self.config.scheduling.scheduler(self.graph.edge_count());
        self.run_with_scheduler(scheduler.as_mut())
    }

    /// Runs message passing, drawing due edges from `scheduler`.
    pub fn run_with_scheduler(
        &mut self,
        scheduler: &mut dyn MessageScheduler,
    ) -> Result<BeliefPropagationDiagnostics, InferenceError> {
        for edge in self.graph.factor_to_variable_edges() {
            scheduler.push(edge, f64::INFINITY);
        }

        let threshold = self.config.convergence_threshold;
        while self.diagnostics.iterations_run < self.config.max_iterations {
            let Some(edge) = scheduler.pop() else {
                break;
            };
            let fresh = self.compute_message(edge)?;
            let current = &self.messages[edge.0 as usize];
            let updated = current.dampen(&fresh, self.config.dampening_lambda)?;
            let delta = current.max_abs_difference(&updated);
            self.messages[edge.0 as usize] = updated;

            self.diagnostics.iterations_run += 1;
            self.diagnostics.final_message_delta = delta;
            self.diagnostics.max_message_delta = self.diagnostics.max_message_delta.max(delta);

            if delta > threshold {
                scheduler.push(edge, delta);
                for dependent in self.graph.dependents(edge) {
                    scheduler.push(dependent, delta);
                }
            }
        }

        self.diagnostics.converged = scheduler.is_empty();
        self.finished = true;
        Ok(self.diagnostics)
    }

    fn compute_message(&self, edge: EdgeIdx) -> Result<Pmf, InferenceError> {
        let (direction, factor, slot, var) = self.graph.endpoints(edge);
        match direction {
            EdgeDirection::FactorToVariable => {
                let incoming: Vec<&Pmf> = self
                    .graph
                    .incoming_to_factor(factor)
                    .map(|e| &self.messages[e.0 as usize])
                    .collect();
                self.graph
                    .factor(factor)
                    .message_to(slot, &incoming, self.config.p_norm)
            }
            EdgeDirection::VariableToFactor => {
                // Messages from every other factor touching the variable.
                let reverse = EdgeIdx(edge.0 - 1);
                let mut product = Pmf::uniform(self.graph.max_value(var));
                for incoming in self.graph.incoming_to_variable(var) {
                    if incoming != reverse {
                        product = product.product(&self.messages[incoming.0 as usize])?;
                    }
                }
                Ok(product)
            }
        }
    }

    /// Normalized product of every factor message arriving at `var`.
    pub fn marginal(&self, var: VarIdx) -> Result<Pmf, InferenceError> {
        let mut belief = Pmf::uniform(self.graph.max_value(var));
        for incoming in self.graph.incoming_to_variable(var) {
            belief = belief.product(&self.messages[incoming.0 as usize])?;
        }
        Ok(belief.narrowed())
    }

    /// Marginals and presence posteriors for the requested variables.
    ///
    /// Runs message passing first when [`Self::run`] has not been called.
    pub fn estimate_posteriors(
        &mut self,
        requested: &[L],
    ) -> Result<Vec<VariablePosterior<L>>, InferenceError> {
        if !self.finished {
            self.run()?;
        }
        requested
            .iter()
            .map(|label| {
                let var = self.graph.variable(label).ok_or_else(|| {
                    InferenceError::Internal(format!(
                        "posterior requested for unknown variable {:?}",
                        label
                    ))
                })?;
                let marginal = self.marginal(var)?;
                let posterior = marginal.presence_probability();
                Ok(VariablePosterior {
                    label: *label,
                    marginal,
                    posterior,
                })
            })
            .collect()
    }
}
