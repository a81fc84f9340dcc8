//! Entry point: graph building, hyperparameter search and the final pass.
//!
//! ```text
//! identifications ──► EvidenceGraph ──► components
//!                                         │  per grid point (protein scores only)
//!                                         ▼
//!                    compile ─► belief propagation ─► posteriors ─► objective
//!                                         │  best point, user's PSM/group flags
//!                                         ▼
//!                               final pass ─► indistinguishable groups
//! ```
//!
//! Components are inferred independently, in parallel when the `parallel`
//! feature is on. A component that fails to compile or propagate is logged and
//! left at its priors; the rest of the run is unaffected.

use tracing::{debug, info, warn};

use crate::config::InferenceConfig;
use crate::engine::belief_propagation::{
    BeliefPropagationConfig, BeliefPropagationDiagnostics, BeliefPropagationEngine,
};
use crate::engine::compiler::{compile_component, CompileOptions, EvidenceSource, VariableLabel};
use crate::engine::errors::InferenceError;
use crate::engine::factor::ModelFactors;
use crate::evidence::graph::{Component, EvidenceGraph, NodeIdx};
use crate::evidence::ident::{
    PeptideIdentification, ProteinIdentification, POSTERIOR_SCORE_TYPE, SEARCH_ENGINE_NAME,
};
use crate::metrics::{self, DecoyRocScorer, DiscriminationScore};
use crate::optimizer::{Evaluation, HyperparameterPoint, ParameterCandidates};
use crate::posterior;

/// Objective value a grid point has to beat.
const SEARCH_LOWER_BOUND: f64 = -1.0;

/// Everything one inference pass needs; fixed for the duration of the pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassConfig {
    pub model: ModelFactors,
    pub compile: CompileOptions,
    pub belief_propagation: BeliefPropagationConfig,
}

impl PassConfig {
    /// Pass at `point` for the given user settings.
    pub fn new(
        config: &InferenceConfig,
        point: HyperparameterPoint,
        belief_propagation: BeliefPropagationConfig,
    ) -> Self {
        Self {
            model: ModelFactors {
                pep_emission: point.pep_emission,
                pep_spurious_emission: point.pep_spurious_emission,
                prot_prior: point.prot_prior,
                pep_prior: config.model_parameters.pep_prior,
            },
            compile: CompileOptions {
                user_defined_priors: config.user_defined_priors,
                annotate_group_probabilities: config.annotate_group_probabilities,
                update_psm_probabilities: config.update_psm_probabilities,
            },
            belief_propagation,
        }
    }

    /// The same pass writing protein posteriors only, as used while searching.
    pub fn proteins_only(mut self) -> Self {
        self.compile.annotate_group_probabilities = false;
        self.compile.update_psm_probabilities = false;
        self
    }
}

/// Result of inferring one component.
#[derive(Debug)]
pub enum ComponentOutcome {
    Inferred {
        posteriors: Vec<(NodeIdx, f64)>,
        diagnostics: BeliefPropagationDiagnostics,
    },
    /// Single node or single node kind: nothing to infer.
    Skipped,
    /// A structural or numerical error confined to this component.
    Failed(InferenceError),
}

/// Compiles and propagates one component. Never touches the identifications.
///
/// Component-scoped errors become [`ComponentOutcome::Failed`]; any other
/// error is returned as is.
pub fn infer_component(
    graph: &EvidenceGraph,
    component: &Component,
    source: EvidenceSource<'_>,
    pass: &PassConfig,
) -> Result<ComponentOutcome, InferenceError> {
    if component.len() < 2 || graph.is_single_kind(component) {
        return Ok(ComponentOutcome::Skipped);
    }
    match propagate(graph, component, source, pass) {
        Ok((posteriors, diagnostics)) => Ok(ComponentOutcome::Inferred {
            posteriors,
            diagnostics,
        }),
        Err(err) if err.is_component_scoped() => Ok(ComponentOutcome::Failed(err)),
        Err(err) => Err(err),
    }
}

fn propagate(
    graph: &EvidenceGraph,
    component: &Component,
    source: EvidenceSource<'_>,
    pass: &PassConfig,
) -> Result<(Vec<(NodeIdx, f64)>, BeliefPropagationDiagnostics), InferenceError> {
    let compiled = compile_component(graph, component, source, &pass.model, pass.compile)?;
    let mut engine = BeliefPropagationEngine::new(&compiled.graph, pass.belief_propagation)?;
    let diagnostics = engine.run()?;
    let posteriors = engine
        .estimate_posteriors(&compiled.requested)?
        .into_iter()
        .filter_map(|p| match p.label {
            VariableLabel::Node(node) => Some((node, p.posterior)),
            VariableLabel::EvidenceSum(_) => None,
        })
        .collect();
    Ok((posteriors, diagnostics))
}

/// Component counts of one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PassSummary {
    pub inferred: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Inferred components that hit the iteration cap.
    pub not_converged: usize,
}

/// Runs one pass over every component and writes its posteriors.
///
/// Protein scores are reset to their priors first. Component-scoped failures
/// are logged and counted; an internal error aborts the pass before anything
/// is written.
pub fn run_inference_pass(
    graph: &mut EvidenceGraph,
    proteins: &mut ProteinIdentification,
    peptides: &mut [PeptideIdentification],
    pass: &PassConfig,
) -> Result<PassSummary, InferenceError> {
    if !graph.has_components() {
        graph.compute_connected_components();
    }

    let outcomes = {
        let shared: &EvidenceGraph = graph;
        let source = EvidenceSource::new(proteins, peptides);
        shared
            .apply_on_components(|component| infer_component(shared, component, source, pass))
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?
    };

    posterior::reset_protein_scores(
        proteins,
        pass.model.prot_prior,
        pass.compile.user_defined_priors,
    );

    let mut summary = PassSummary::default();
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            ComponentOutcome::Inferred {
                posteriors,
                diagnostics,
            } => {
                debug!(
                    component = index,
                    iterations = diagnostics.iterations_run,
                    converged = diagnostics.converged,
                    final_delta = diagnostics.final_message_delta,
                    "belief propagation finished"
                );
                if !diagnostics.converged {
                    summary.not_converged += 1;
                }
                posterior::write_posteriors(graph, proteins, peptides, &posteriors)?;
                summary.inferred += 1;
            }
            ComponentOutcome::Skipped => {
                debug!(component = index, "skipped component with a single node kind");
                summary.skipped += 1;
            }
            ComponentOutcome::Failed(err) => {
                warn!(
                    component = index,
                    error = %err,
                    "loopy belief propagation failed in a connected component; skipping inference there"
                );
                summary.failed += 1;
            }
        }
    }
    if summary.skipped > 0 {
        warn!(
            skipped = summary.skipped,
            "connected components with a single node kind skipped; their scores stay at the prior"
        );
    }
    Ok(summary)
}

/// Outcome of a complete inference run.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceSummary {
    /// Hyperparameters of the final pass.
    pub best: HyperparameterPoint,
    /// Every grid evaluation; empty when only one combination was configured.
    pub evaluations: Vec<(HyperparameterPoint, f64)>,
    /// Component counts of the final pass.
    pub final_pass: PassSummary,
}

impl InferenceSummary {
    /// Number of inference passes run, final pass included.
    pub fn passes_run(&self) -> usize {
        self.evaluations.len() + 1
    }
}

/// Bayesian protein inference with hyperparameter search.
pub struct BayesianProteinInference {
    config: InferenceConfig,
    scorer: Box<dyn DiscriminationScore>,
}

impl std::fmt::Debug for BayesianProteinInference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BayesianProteinInference")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BayesianProteinInference {
    /// Validates `config`; the default objective is [`DecoyRocScorer`] with the configured AUC weight.
    pub fn new(config: InferenceConfig) -> Result<Self, InferenceError> {
        config.validate()?;
        Ok(Self {
            config,
            scorer: Box::new(DecoyRocScorer::new(config.param_optimize.aucweight)),
        })
    }

    /// Replaces the objective of the hyperparameter search.
    pub fn with_scorer(mut self, scorer: impl DiscriminationScore + 'static) -> Self {
        self.scorer = Box::new(scorer);
        self
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Builds the evidence graph from the identifications and infers posteriors.
    ///
    /// Protein hit scores become posterior probabilities; PSM scores too when
    /// `update_PSM_probabilities` is set.
    pub fn infer_posterior_probabilities(
        &self,
        proteins: &mut ProteinIdentification,
        peptides: &mut [PeptideIdentification],
    ) -> Result<InferenceSummary, InferenceError> {
        let mut graph = EvidenceGraph::build(proteins, peptides, self.config.top_psms);
        graph.compute_connected_components();
        graph.cluster_indistinguishable_nodes();
        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            components = graph.components().len(),
            "built evidence graph"
        );
        self.infer_on_graph(&mut graph, proteins, peptides)
    }

    /// Infers posteriors on a prebuilt evidence graph over `proteins` and `peptides`.
    pub fn infer_on_graph(
        &self,
        graph: &mut EvidenceGraph,
        proteins: &mut ProteinIdentification,
        peptides: &mut [PeptideIdentification],
    ) -> Result<InferenceSummary, InferenceError> {
        let belief_propagation = self.config.loopy_belief_propagation.to_config()?;
        let candidates = ParameterCandidates::from_model(&self.config.model_parameters);
        let grid = candidates.grid();

        proteins.score_type = POSTERIOR_SCORE_TYPE.to_string();
        proteins.search_engine = SEARCH_ENGINE_NAME.to_string();
        proteins.higher_score_better = true;
        if self.config.user_defined_priors {
            posterior::record_user_priors(proteins);
        }
        if !graph.has_components() {
            graph.compute_connected_components();
        }
        info!(
            roc_n = metrics::peptide_roc_n(peptides),
            "peptide FDR AUC before protein inference"
        );

        let mut evaluations = Vec::new();
        let best_indices = if grid.nr_combos() > 1 {
            info!(combinations = grid.nr_combos(), "testing hyperparameter combinations");
            let state = grid.evaluate(SEARCH_LOWER_BOUND, |&alpha, &beta, &gamma| {
                let point = HyperparameterPoint {
                    pep_emission: alpha,
                    pep_spurious_emission: beta,
                    prot_prior: gamma,
                };
                let pass = PassConfig::new(&self.config, point, belief_propagation).proteins_only();
                run_inference_pass(graph, proteins, peptides, &pass)?;
                let objective = self.scorer.score(proteins);
                debug!(alpha, beta, gamma, objective, "evaluated grid point");
                Ok::<f64, InferenceError>(objective)
            })?;
            for &Evaluation { indices, objective } in state.evaluations() {
                if let Some(point) = candidates.point(indices) {
                    evaluations.push((point, objective));
                }
            }
            state.best_indices()
        } else {
            info!("only one combination specified, skipping grid search");
            [0; 3]
        };

        let best = candidates.point(best_indices).ok_or_else(|| {
            InferenceError::Internal(format!("grid point {:?} out of range", best_indices))
        })?;
        info!(
            alpha = best.pep_emission,
            beta = best.pep_spurious_emission,
            gamma = best.prot_prior,
            "running with best parameters"
        );

        let pass = PassConfig::new(&self.config, best, belief_propagation);
        let final_pass = run_inference_pass(graph, proteins, peptides, &pass)?;
        info!(
            roc_n = metrics::peptide_roc_n(peptides),
            "peptide FDR AUC after protein inference"
        );
        proteins.indistinguishable_proteins = posterior::indistinguishable_groups(graph, proteins);

        Ok(InferenceSummary {
            best,
            evaluations,
            final_pass,
        })
    }
}
