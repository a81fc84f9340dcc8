//! Translation of one evidence-graph component into a factor graph.
//!
//! Nodes are visited by generative rank (proteins first, PSMs last), so every
//! upstream variable already exists when a node's factors are created:
//!
//! | Node | Variable | Factors |
//! |---|---|---|
//! | protein | binary | prior `[1 - γ, γ]` |
//! | protein / peptide group | count `0..=Σ input max` | adder over upstream |
//! | PSM | binary | sum-evidence on (count, psm), peptide evidence on psm |
//!
//! A PSM whose evidence reaches it through several upstream nodes first gets an
//! auxiliary evidence-sum count variable, fed by an adder.

use smallvec::SmallVec;

use crate::engine::errors::InferenceError;
use crate::engine::factor::ModelFactors;
use crate::engine::factor_graph::{FactorGraph, FactorGraphBuilder, VarIdx};
use crate::evidence::graph::{Component, EvidenceGraph, EvidenceNode, NodeIdx};
use crate::evidence::ident::{
    PeptideHit, PeptideIdentification, ProteinHit, ProteinIdentification,
};

/// Label of a factor graph variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum VariableLabel {
    /// The variable of an evidence node.
    Node(NodeIdx),
    /// Count of present upstream evidence for a PSM with several upstream nodes.
    EvidenceSum(NodeIdx),
}

/// Which posteriors a compiled component should report, and prior handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompileOptions {
    /// Use each protein's recorded prior instead of γ.
    pub user_defined_priors: bool,
    /// Request protein-group posteriors.
    pub annotate_group_probabilities: bool,
    /// Request PSM posteriors.
    pub update_psm_probabilities: bool,
}

/// Read-only view of the identifications an evidence graph refers to.
#[derive(Debug, Clone, Copy)]
pub struct EvidenceSource<'a> {
    pub proteins: &'a ProteinIdentification,
    pub peptides: &'a [PeptideIdentification],
}

impl<'a> EvidenceSource<'a> {
    pub fn new(proteins: &'a ProteinIdentification, peptides: &'a [PeptideIdentification]) -> Self {
        Self { proteins, peptides }
    }

    fn protein(&self, hit: usize) -> Result<&'a ProteinHit, InferenceError> {
        self.proteins.hits.get(hit).ok_or_else(|| {
            InferenceError::Structural(format!(
                "protein hit {} out of range ({} hits)",
                hit,
                self.proteins.hits.len()
            ))
        })
    }

    fn peptide_hit(&self, identification: usize, hit: usize) -> Result<&'a PeptideHit, InferenceError> {
        self.peptides
            .get(identification)
            .and_then(|id| id.hits.get(hit))
            .ok_or_else(|| {
                InferenceError::Structural(format!(
                    "peptide hit {} of identification {} out of range",
                    hit, identification
                ))
            })
    }
}

/// A component's factor graph and the variables whose posteriors are wanted.
#[derive(Debug)]
pub struct CompiledComponent {
    pub graph: FactorGraph<VariableLabel>,
    pub requested: Vec<VariableLabel>,
}

/// Compiles `component` of `graph` into a factor graph.
///
/// Fails with a structural error when a group or PSM has no upstream input,
/// when a node refers to a hit missing from `source`, or when a score or prior
/// is not a probability. Nothing outside the returned value is modified.
pub fn compile_component(
    graph: &EvidenceGraph,
    component: &Component,
    source: EvidenceSource<'_>,
    model: &ModelFactors,
    options: CompileOptions,
) -> Result<CompiledComponent, InferenceError> {
    let mut order: Vec<NodeIdx> = component.nodes().to_vec();
    order.sort_by_key(|&n| (graph.kind(n).rank(), n));

    let mut builder = FactorGraphBuilder::new();
    let mut requested = Vec::new();

    for node in order {
        let label = VariableLabel::Node(node);
        match graph.node(node) {
            EvidenceNode::Protein { hit } => {
                let protein = source.protein(*hit)?;
                let prior = if options.user_defined_priors {
                    protein.prior
                } else {
                    None
                };
                let var = builder.add_variable(label, 1)?;
                builder.insert_dependency(model.protein_prior(var, prior)?)?;
                requested.push(label);
            }
            EvidenceNode::ProteinGroup { .. } | EvidenceNode::PeptideGroup => {
                let inputs = upstream_inputs(graph, &builder, node)?;
                let max: usize = inputs.iter().map(|(_, m)| m).sum();
                let var = builder.add_variable(label, max)?;
                builder.insert_dependency(model.probabilistic_adder(&inputs, (var, max))?)?;
                if options.annotate_group_probabilities
                    && matches!(graph.node(node), EvidenceNode::ProteinGroup { .. })
                {
                    requested.push(label);
                }
            }
            EvidenceNode::PeptideSpectrumMatch { identification, hit } => {
                let peptide = source.peptide_hit(*identification, *hit)?;
                let inputs = upstream_inputs(graph, &builder, node)?;
                let (count, count_max) = match inputs.as_slice() {
                    [single] => *single,
                    _ => {
                        let max: usize = inputs.iter().map(|(_, m)| m).sum();
                        let sum = builder.add_variable(VariableLabel::EvidenceSum(node), max)?;
                        builder.insert_dependency(model.probabilistic_adder(&inputs, (sum, max))?)?;
                        (sum, max)
                    }
                };
                let psm = builder.add_variable(label, 1)?;
                builder.insert_dependency(model.sum_evidence(
                    count,
                    count_max,
                    psm,
                    peptide.evidence_count(),
                )?)?;
                builder.insert_dependency(model.peptide_evidence(psm, peptide.score)?)?;
                if options.update_psm_probabilities {
                    requested.push(label);
                }
            }
        }
    }

    Ok(CompiledComponent {
        graph: builder.build()?,
        requested,
    })
}

fn upstream_inputs(
    graph: &EvidenceGraph,
    builder: &FactorGraphBuilder<VariableLabel>,
    node: NodeIdx,
) -> Result<SmallVec<[(VarIdx, usize); 4]>, InferenceError> {
    let upstream = graph.upstream(node);
    if upstream.is_empty() {
        return Err(InferenceError::Structural(format!(
            "{:?} node {:?} has no upstream evidence",
            graph.kind(node),
            node
        )));
    }
    upstream
        .into_iter()
        .map(|u| {
            let var = builder.variable(&VariableLabel::Node(u)).ok_or_else(|| {
                InferenceError::Internal(format!("upstream node {:?} of {:?} not compiled", u, node))
            })?;
            let max = builder
                .max_value(var)
                .ok_or_else(|| InferenceError::Internal(format!("variable {:?} missing", var)))?;
            Ok((var, max))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::belief_propagation::{BeliefPropagationConfig, BeliefPropagationEngine};
    use crate::evidence::ident::{PeptideHit, ProteinHit};

    fn model() -> ModelFactors {
        ModelFactors {
            pep_emission: 0.9,
            pep_spurious_emission: 0.01,
            prot_prior: 0.5,
            pep_prior: 0.5,
        }
    }

    fn identifications() -> (ProteinIdentification, Vec<PeptideIdentification>) {
        let proteins = ProteinIdentification::with_hits(vec![
            ProteinHit::new("P1"),
            ProteinHit::new("P2"),
        ]);
        let peptides = vec![
            PeptideIdentification::with_hits(vec![PeptideHit::new("AAK", 0.9, ["P1", "P2"])]),
            PeptideIdentification::with_hits(vec![PeptideHit::new("CCK", 0.6, ["P1"])]),
        ];
        (proteins, peptides)
    }

    #[test]
    fn raw_graph_uses_evidence_sum_for_shared_psm() {
        let (proteins, peptides) = identifications();
        let mut graph = EvidenceGraph::build(&proteins, &peptides, 1);
        graph.compute_connected_components();
        let component = &graph.components()[0];

        let compiled = compile_component(
            &graph,
            component,
            EvidenceSource::new(&proteins, &peptides),
            &model(),
            CompileOptions {
                update_psm_probabilities: true,
                ..Default::default()
            },
        )
        .expect("compile");

        // P1, P2, AAK, CCK and one evidence sum for AAK.
        assert_eq!(compiled.graph.variable_count(), 5);
        let sum = compiled
            .graph
            .variable(&VariableLabel::EvidenceSum(NodeIdx(2)))
            .expect("evidence sum");
        assert_eq!(compiled.graph.max_value(sum), 2);
        // 2 priors, 1 adder, 2 × (sum-evidence + peptide evidence).
        assert_eq!(compiled.graph.factor_count(), 7);
        assert_eq!(compiled.requested.len(), 4);
    }

    #[test]
    fn clustered_graph_requests_groups_when_annotating() {
        let (proteins, peptides) = identifications();
        let mut graph = EvidenceGraph::build(&proteins, &peptides, 1);
        graph.cluster_indistinguishable_nodes();
        graph.compute_connected_components();
        let component = &graph.components()[0];

        let compiled = compile_component(
            &graph,
            component,
            EvidenceSource::new(&proteins, &peptides),
            &model(),
            CompileOptions {
                annotate_group_probabilities: true,
                ..Default::default()
            },
        )
        .expect("compile");

        // P1 and P2 are distinguishable by CCK: two protein groups, two peptide groups.
        let groups = compiled
            .requested
            .iter()
            .filter(|l| matches!(l, VariableLabel::Node(n) if matches!(graph.node(*n), EvidenceNode::ProteinGroup { .. })))
            .count();
        assert_eq!(groups, 2);
        assert!(compiled
            .graph
            .variables()
            .iter()
            .all(|v| !matches!(v.label, VariableLabel::EvidenceSum(_))));

        let mut engine =
            BeliefPropagationEngine::new(&compiled.graph, BeliefPropagationConfig::default())
                .expect("engine");
        let posteriors = engine.estimate_posteriors(&compiled.requested).expect("posteriors");
        assert!(posteriors.iter().all(|p| (0.0..=1.0).contains(&p.posterior)));
    }

    #[test]
    fn user_priors_replace_gamma() {
        let mut proteins = ProteinIdentification::with_hits(vec![ProteinHit::new("P1")]);
        proteins.hits[0].prior = Some(0.2);
        let peptides = vec![PeptideIdentification::with_hits(vec![PeptideHit::new(
            "AAK",
            0.5,
            ["P1"],
        )])];
        let mut graph = EvidenceGraph::build(&proteins, &peptides, 1);
        graph.compute_connected_components();
        let component = &graph.components()[0];
        let source = EvidenceSource::new(&proteins, &peptides);

        let posterior = |user_defined_priors| {
            let compiled = compile_component(
                &graph,
                component,
                source,
                &model(),
                CompileOptions {
                    user_defined_priors,
                    ..Default::default()
                },
            )
            .expect("compile");
            let mut engine =
                BeliefPropagationEngine::new(&compiled.graph, BeliefPropagationConfig::default())
                    .expect("engine");
            engine.estimate_posteriors(&compiled.requested).expect("posteriors")[0].posterior
        };
        assert!(posterior(true) < posterior(false));
    }

    #[test]
    fn invalid_score_is_structural() {
        let proteins = ProteinIdentification::with_hits(vec![ProteinHit::new("P1")]);
        let peptides = vec![PeptideIdentification::with_hits(vec![PeptideHit::new(
            "AAK",
            1.7,
            ["P1"],
        )])];
        let mut graph = EvidenceGraph::build(&proteins, &peptides, 1);
        graph.compute_connected_components();

        let err = compile_component(
            &graph,
            &graph.components()[0],
            EvidenceSource::new(&proteins, &peptides),
            &model(),
            CompileOptions::default(),
        )
        .expect_err("score outside [0, 1]");
        assert!(matches!(err, InferenceError::Structural(_)));
    }

    #[test]
    fn dangling_back_references_are_structural() {
        let proteins = ProteinIdentification::with_hits(vec![ProteinHit::new("P1")]);
        let peptides = vec![PeptideIdentification::with_hits(vec![PeptideHit::new(
            "AAK",
            0.5,
            ["P1"],
        )])];

        let compile = |graph: &EvidenceGraph| {
            compile_component(
                graph,
                &graph.components()[0],
                EvidenceSource::new(&proteins, &peptides),
                &model(),
                CompileOptions::default(),
            )
        };

        // Protein hit 3 does not exist; priors are off, so only the hit lookup can catch it.
        let mut graph = EvidenceGraph::new();
        let protein = graph.add_node(EvidenceNode::Protein { hit: 3 });
        let psm = graph.add_node(EvidenceNode::PeptideSpectrumMatch {
            identification: 0,
            hit: 0,
        });
        graph.add_edge(protein, psm).expect("edge");
        graph.compute_connected_components();
        let err = compile(&graph).expect_err("dangling protein hit");
        assert!(matches!(err, InferenceError::Structural(_)), "{}", err);

        let mut graph = EvidenceGraph::new();
        let protein = graph.add_node(EvidenceNode::Protein { hit: 0 });
        let psm = graph.add_node(EvidenceNode::PeptideSpectrumMatch {
            identification: 7,
            hit: 0,
        });
        graph.add_edge(protein, psm).expect("edge");
        graph.compute_connected_components();
        let err = compile(&graph).expect_err("dangling peptide identification");
        assert!(matches!(err, InferenceError::Structural(_)), "{}", err);
        assert!(err.is_component_scoped());
    }

    #[test]
    fn group_without_upstream_is_structural() {
        let proteins = ProteinIdentification::default();
        let mut graph = EvidenceGraph::new();
        let group = graph.add_node(EvidenceNode::PeptideGroup);
        let psm = graph.add_node(EvidenceNode::PeptideSpectrumMatch {
            identification: 0,
            hit: 0,
        });
        graph.add_edge(group, psm).expect("edge");
        graph.compute_connected_components();
        let peptides = vec![PeptideIdentification::with_hits(vec![PeptideHit::new(
            "AAK",
            0.5,
            ["P1"],
        )])];

        let err = compile_component(
            &graph,
            &graph.components()[0],
            EvidenceSource::new(&proteins, &peptides),
            &model(),
            CompileOptions::default(),
        )
        .expect_err("group without inputs");
        assert!(err.to_string().contains("no upstream"));
    }
}
