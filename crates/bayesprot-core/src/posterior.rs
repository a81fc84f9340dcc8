//! Writing inference results back into the identifications.
//!
//! A pass first resets every protein score to its prior, so proteins in
//! components that were skipped or failed keep a meaningful score, and then
//! overwrites the scores of everything that was inferred.

use crate::engine::errors::InferenceError;
use crate::evidence::graph::{EvidenceGraph, EvidenceNode, NodeIdx, NodeKind};
use crate::evidence::ident::{PeptideIdentification, ProteinGroupRecord, ProteinIdentification};

/// Records each protein's current score as its user-defined prior.
///
/// Called once at the start of every run, so a score updated between runs
/// replaces the prior recorded by the previous one.
pub fn record_user_priors(proteins: &mut ProteinIdentification) {
    for hit in &mut proteins.hits {
        hit.prior = Some(hit.score);
    }
}

/// Sets every protein score to its prior: the recorded user prior when enabled, γ otherwise.
pub fn reset_protein_scores(
    proteins: &mut ProteinIdentification,
    prot_prior: f64,
    user_defined_priors: bool,
) {
    for hit in &mut proteins.hits {
        hit.score = match hit.prior {
            Some(prior) if user_defined_priors => prior,
            _ => prot_prior,
        };
    }
}

/// Writes `(node, posterior)` pairs onto proteins, protein groups and PSMs.
///
/// Peptide groups carry no score and are ignored.
pub fn write_posteriors(
    graph: &mut EvidenceGraph,
    proteins: &mut ProteinIdentification,
    peptides: &mut [PeptideIdentification],
    posteriors: &[(NodeIdx, f64)],
) -> Result<(), InferenceError> {
    for &(node, posterior) in posteriors {
        match graph.node(node).clone() {
            EvidenceNode::Protein { hit } => {
                let protein = proteins.hits.get_mut(hit).ok_or_else(|| {
                    InferenceError::Internal(format!("protein hit {} out of range", hit))
                })?;
                protein.score = posterior;
            }
            EvidenceNode::ProteinGroup { .. } => graph.set_group_probability(node, posterior)?,
            EvidenceNode::PeptideSpectrumMatch { identification, hit } => {
                let psm = peptides
                    .get_mut(identification)
                    .and_then(|id| id.hits.get_mut(hit))
                    .ok_or_else(|| {
                        InferenceError::Internal(format!(
                            "peptide hit {} of identification {} out of range",
                            hit, identification
                        ))
                    })?;
                psm.score = posterior;
            }
            EvidenceNode::PeptideGroup => {}
        }
    }
    Ok(())
}

/// Protein-group records of every multi-node component, in component order.
///
/// Each record holds the group posterior and the accessions of its member proteins.
pub fn indistinguishable_groups(
    graph: &EvidenceGraph,
    proteins: &ProteinIdentification,
) -> Vec<ProteinGroupRecord> {
    let mut records = Vec::new();
    graph.apply_on_components_sequentially(|component| {
        if component.len() < 2 {
            return;
        }
        for &node in component.nodes() {
            let EvidenceNode::ProteinGroup { probability } = *graph.node(node) else {
                continue;
            };
            let mut members: Vec<NodeIdx> = graph
                .neighbors(node)
                .iter()
                .copied()
                .filter(|&n| graph.kind(n) == NodeKind::Protein)
                .collect();
            members.sort_unstable();
            let accessions = members
                .into_iter()
                .filter_map(|n| match graph.node(n) {
                    EvidenceNode::Protein { hit } => {
                        proteins.hits.get(*hit).map(|h| h.accession.clone())
                    }
                    _ => None,
                })
                .collect();
            records.push(ProteinGroupRecord {
                probability,
                accessions,
            });
        }
    });
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::ident::{PeptideHit, ProteinHit};

    fn fixture() -> (EvidenceGraph, ProteinIdentification, Vec<PeptideIdentification>) {
        let proteins = ProteinIdentification::with_hits(vec![
            ProteinHit::new("P1"),
            ProteinHit::new("P2"),
            ProteinHit::new("P3"),
        ]);
        let peptides = vec![PeptideIdentification::with_hits(vec![PeptideHit::new(
            "AAK",
            0.9,
            ["P1", "P2"],
        )])];
        let mut graph = EvidenceGraph::build(&proteins, &peptides, 1);
        graph.compute_connected_components();
        graph.cluster_indistinguishable_nodes();
        (graph, proteins, peptides)
    }

    #[test]
    fn reset_uses_user_priors_only_when_enabled() {
        let mut proteins = ProteinIdentification::with_hits(vec![
            ProteinHit::new("P1"),
            ProteinHit::new("P2"),
        ]);
        proteins.hits[0].score = 0.8;
        record_user_priors(&mut proteins);
        assert_eq!(proteins.hits[0].prior, Some(0.8));

        reset_protein_scores(&mut proteins, 0.5, true);
        assert_eq!(proteins.hits[0].score, 0.8);
        assert_eq!(proteins.hits[1].score, 0.0);

        reset_protein_scores(&mut proteins, 0.5, false);
        assert_eq!(proteins.hits[0].score, 0.5);

        proteins.hits[0].score = 0.1;
        record_user_priors(&mut proteins);
        assert_eq!(proteins.hits[0].prior, Some(0.1));
    }

    #[test]
    fn posteriors_land_on_their_records() {
        let (mut graph, mut proteins, mut peptides) = fixture();
        let group = (0..graph.node_count() as u32)
            .map(NodeIdx)
            .find(|&n| graph.kind(n) == NodeKind::ProteinGroup)
            .expect("protein group");

        write_posteriors(
            &mut graph,
            &mut proteins,
            &mut peptides,
            &[(NodeIdx(0), 0.7), (NodeIdx(3), 0.95), (group, 0.9)],
        )
        .expect("write");

        assert_eq!(proteins.hits[0].score, 0.7);
        assert_eq!(peptides[0].hits[0].score, 0.95);
        assert_eq!(graph.node(group), &EvidenceNode::ProteinGroup { probability: 0.9 });
    }

    #[test]
    fn groups_list_member_accessions() {
        let (mut graph, proteins, _) = fixture();
        let group = (0..graph.node_count() as u32)
            .map(NodeIdx)
            .find(|&n| graph.kind(n) == NodeKind::ProteinGroup)
            .expect("protein group");
        graph.set_group_probability(group, 0.6).expect("group");

        let records = indistinguishable_groups(&graph, &proteins);
        // P3 is a singleton component and contributes nothing.
        assert_eq!(
            records,
            vec![ProteinGroupRecord {
                probability: 0.6,
                accessions: vec!["P1".to_string(), "P2".to_string()],
            }]
        );
    }
}
