//! Identification records exchanged with the calling pipeline.
//!
//! These are plain data: the inference core reads protein priors, PSM scores
//! and peptide evidence counts from them, and writes posteriors back.

/// Score type set on protein identifications after inference.
pub const POSTERIOR_SCORE_TYPE: &str = "Posterior Probability";

/// Search engine name set on protein identifications after inference.
pub const SEARCH_ENGINE_NAME: &str = "BayesProt";

/// A protein candidate.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProteinHit {
    pub accession: String,
    /// Posterior probability after inference; arbitrary before.
    pub score: f64,
    /// Whether the accession belongs to the decoy database.
    pub is_decoy: bool,
    /// User-defined prior probability, recorded from `score` when enabled.
    pub prior: Option<f64>,
}

impl ProteinHit {
    pub fn new(accession: impl Into<String>) -> Self {
        Self {
            accession: accession.into(),
            ..Default::default()
        }
    }

    pub fn decoy(accession: impl Into<String>) -> Self {
        Self {
            accession: accession.into(),
            is_decoy: true,
            ..Default::default()
        }
    }
}

/// Proteins that cannot be told apart by the observed PSMs.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProteinGroupRecord {
    pub probability: f64,
    pub accessions: Vec<String>,
}

/// The protein-level result of one run.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProteinIdentification {
    pub search_engine: String,
    pub score_type: String,
    pub higher_score_better: bool,
    pub hits: Vec<ProteinHit>,
    pub indistinguishable_proteins: Vec<ProteinGroupRecord>,
}

impl ProteinIdentification {
    pub fn with_hits(hits: Vec<ProteinHit>) -> Self {
        Self {
            higher_score_better: true,
            hits,
            ..Default::default()
        }
    }
}

/// A peptide-spectrum match candidate.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeptideHit {
    pub sequence: String,
    /// Probability that the match is correct.
    pub score: f64,
    /// Accessions of every protein containing the peptide.
    pub protein_accessions: Vec<String>,
    /// Whether the match comes from the decoy database.
    pub is_decoy: bool,
}

impl PeptideHit {
    pub fn new<S: Into<String>>(
        sequence: impl Into<String>,
        score: f64,
        accessions: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            sequence: sequence.into(),
            score,
            protein_accessions: accessions.into_iter().map(Into::into).collect(),
            is_decoy: false,
        }
    }

    pub fn decoy<S: Into<String>>(
        sequence: impl Into<String>,
        score: f64,
        accessions: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            is_decoy: true,
            ..Self::new(sequence, score, accessions)
        }
    }

    /// Number of peptide evidences (parent protein occurrences).
    pub fn evidence_count(&self) -> usize {
        self.protein_accessions.len()
    }
}

/// All candidate matches for one spectrum.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeptideIdentification {
    pub higher_score_better: bool,
    pub hits: Vec<PeptideHit>,
}

impl PeptideIdentification {
    pub fn with_hits(hits: Vec<PeptideHit>) -> Self {
        Self {
            higher_score_better: true,
            hits,
        }
    }

    /// Hit indices of the best `top` hits by score (`0` keeps all).
    pub fn top_hits(&self, top: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.hits.len()).collect();
        order.sort_by(|&a, &b| {
            let (sa, sb) = (self.hits[a].score, self.hits[b].score);
            let ord = if self.higher_score_better {
                sb.total_cmp(&sa)
            } else {
                sa.total_cmp(&sb)
            };
            ord.then(a.cmp(&b))
        });
        if top > 0 {
            order.truncate(top);
        }
        order
    }
}
