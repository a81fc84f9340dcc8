//! Discrimination scores used to rank hyperparameter points.
//!
//! A [`DiscriminationScore`] turns a scored protein list into one number,
//! higher being better. [`DecoyRocScorer`] is the built-in target–decoy
//! objective:
//!
//! ```text
//! w · rocN + (1 − w) · (1 − calibration error)
//! ```
//!
//! - `rocN`: area under the ROC curve (targets vs. decoys) up to `N` false
//!   positives, normalized to [0, 1].
//! - calibration error: mean absolute difference between the FDR estimated from
//!   the posteriors and the decoy-based FDR, along the score ranking.
//!
//! Ranking is deterministic: equal scores keep hit order and are treated as a
//! single ROC step.

use crate::evidence::ident::{PeptideIdentification, ProteinIdentification};

/// Default number of false positives up to which the ROC area is taken.
pub const DEFAULT_FP_CUTOFF: usize = 50;

/// Objective maximized by the hyperparameter search.
pub trait DiscriminationScore: Send + Sync {
    fn score(&self, proteins: &ProteinIdentification) -> f64;
}

/// Target–decoy objective combining rocN and posterior calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecoyRocScorer {
    /// Weight of the ROC term; `1 - auc_weight` weighs calibration.
    pub auc_weight: f64,
    /// False positives after which the ROC curve is cut; `0` uses every decoy.
    pub fp_cutoff: usize,
}

impl Default for DecoyRocScorer {
    fn default() -> Self {
        Self {
            auc_weight: 0.2,
            fp_cutoff: DEFAULT_FP_CUTOFF,
        }
    }
}

impl DecoyRocScorer {
    pub fn new(auc_weight: f64) -> Self {
        Self {
            auc_weight,
            ..Default::default()
        }
    }
}

impl DiscriminationScore for DecoyRocScorer {
    fn score(&self, proteins: &ProteinIdentification) -> f64 {
        let ranked = ranked_hits(proteins);
        let roc = roc_n(&ranked, self.fp_cutoff);
        let calibration = calibration_error(&ranked);
        self.auc_weight * roc + (1.0 - self.auc_weight) * (1.0 - calibration)
    }
}

/// `(score, is_decoy)` pairs, best first.
pub fn ranked_hits(proteins: &ProteinIdentification) -> Vec<(f64, bool)> {
    let mut ranked: Vec<(f64, bool)> = proteins
        .hits
        .iter()
        .map(|h| (h.score, h.is_decoy))
        .collect();
    if proteins.higher_score_better {
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
    } else {
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
    }
    ranked
}

/// `(score, is_decoy)` of the best hit of every spectrum, best first.
///
/// Scores are PSM probabilities, so higher is better regardless of each
/// identification's own orientation flag.
pub fn ranked_top_psms(peptides: &[PeptideIdentification]) -> Vec<(f64, bool)> {
    let mut ranked: Vec<(f64, bool)> = peptides
        .iter()
        .filter_map(|id| {
            let best = *id.top_hits(1).first()?;
            let hit = &id.hits[best];
            Some((hit.score, hit.is_decoy))
        })
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
    ranked
}

/// ROC area of the best PSM per spectrum, using every decoy.
pub fn peptide_roc_n(peptides: &[PeptideIdentification]) -> f64 {
    roc_n(&ranked_top_psms(peptides), 0)
}

/// Normalized ROC area up to `fp_cutoff` false positives.
///
/// Returns 0 without targets. Without any decoy and a zero cutoff the ranking is perfect.
pub fn roc_n(ranked: &[(f64, bool)], fp_cutoff: usize) -> f64 {
    let total_tp = ranked.iter().filter(|(_, decoy)| !decoy).count();
    if total_tp == 0 {
        return 0.0;
    }
    let total_fp = ranked.len() - total_tp;
    let cutoff = if fp_cutoff == 0 { total_fp } else { fp_cutoff };
    if cutoff == 0 {
        return 1.0;
    }
    let cutoff = cutoff as f64;

    let (mut tp, mut fp, mut area) = (0.0_f64, 0.0_f64, 0.0_f64);
    let mut i = 0;
    while i < ranked.len() && fp < cutoff {
        let score = ranked[i].0;
        let (mut block_tp, mut block_fp) = (0.0, 0.0);
        while i < ranked.len() && ranked[i].0 == score {
            if ranked[i].1 {
                block_fp += 1.0;
            } else {
                block_tp += 1.0;
            }
            i += 1;
        }
        if block_fp > 0.0 && fp + block_fp > cutoff {
            // Cut the tied step at the cutoff, interpolating linearly.
            let taken = cutoff - fp;
            let tp_at_cut = tp + block_tp * taken / block_fp;
            area += taken * (tp + tp_at_cut) / 2.0;
            tp = tp_at_cut;
            fp = cutoff;
            break;
        }
        area += block_fp * (2.0 * tp + block_tp) / 2.0;
        tp += block_tp;
        fp += block_fp;
    }
    if fp < cutoff {
        area += (cutoff - fp) * tp;
    }
    area / (cutoff * total_tp as f64)
}

/// Mean |estimated FDR − decoy FDR| over every rank of the list.
///
/// The estimated FDR at rank `k` is the mean of `1 − score` over the first `k`
/// hits; the decoy FDR is the fraction of decoys among them.
pub fn calibration_error(ranked: &[(f64, bool)]) -> f64 {
    if ranked.is_empty() {
        return 0.0;
    }
    let (mut error_mass, mut decoys, mut total) = (0.0, 0.0, 0.0);
    for (k, &(score, decoy)) in ranked.iter().enumerate() {
        error_mass += 1.0 - score;
        if decoy {
            decoys += 1.0;
        }
        let n = (k + 1) as f64;
        total += (error_mass / n - decoys / n).abs();
    }
    total / ranked.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::ident::{PeptideHit, ProteinHit};

    fn proteins(hits: &[(f64, bool)]) -> ProteinIdentification {
        ProteinIdentification::with_hits(
            hits.iter()
                .enumerate()
                .map(|(i, &(score, decoy))| {
                    let mut hit = if decoy {
                        ProteinHit::decoy(format!("DECOY_{}", i))
                    } else {
                        ProteinHit::new(format!("P{}", i))
                    };
                    hit.score = score;
                    hit
                })
                .collect(),
        )
    }

    #[test]
    fn perfect_separation_has_full_roc_area() {
        let ranked = ranked_hits(&proteins(&[(0.1, true), (0.9, false), (0.8, false)]));
        assert_eq!(roc_n(&ranked, 1), 1.0);
        assert_eq!(roc_n(&ranked, 0), 1.0);
    }

    #[test]
    fn inverted_ranking_has_no_roc_area() {
        let ranked = ranked_hits(&proteins(&[(0.9, true), (0.1, false)]));
        assert_eq!(roc_n(&ranked, 1), 0.0);
    }

    #[test]
    fn tied_block_counts_half() {
        let ranked = ranked_hits(&proteins(&[(0.5, true), (0.5, false)]));
        assert!((roc_n(&ranked, 1) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn no_targets_scores_zero() {
        let ranked = ranked_hits(&proteins(&[(0.5, true)]));
        assert_eq!(roc_n(&ranked, 10), 0.0);
    }

    #[test]
    fn calibrated_posteriors_have_small_error() {
        // Posterior 1 for targets and 0 for the decoy ranked last is exactly calibrated.
        let ranked = ranked_hits(&proteins(&[(1.0, false), (1.0, false), (0.0, true)]));
        let exact = calibration_error(&ranked);
        assert!(exact.abs() < 1e-12);

        let overconfident = ranked_hits(&proteins(&[(1.0, false), (1.0, true)]));
        assert!(calibration_error(&overconfident) > 0.2);
    }

    #[test]
    fn peptide_roc_uses_best_hit_per_spectrum() {
        let peptides = vec![
            PeptideIdentification::with_hits(vec![
                PeptideHit::new("AAK", 0.9, ["P1"]),
                PeptideHit::decoy("KAA", 0.95, ["DECOY_P1"]),
            ]),
            PeptideIdentification::with_hits(vec![PeptideHit::new("CCK", 0.8, ["P2"])]),
            PeptideIdentification::with_hits(vec![PeptideHit::decoy("KCC", 0.1, ["DECOY_P2"])]),
            PeptideIdentification::default(),
        ];
        // The decoy outranks AAK within the first spectrum and is its best hit.
        assert_eq!(
            ranked_top_psms(&peptides),
            vec![(0.95, true), (0.8, false), (0.1, true)]
        );
        // The only target sits between the two decoys: half the area.
        assert!((peptide_roc_n(&peptides) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn objective_blends_both_terms() {
        let ids = proteins(&[(1.0, false), (0.0, true)]);
        let auc_only = DecoyRocScorer {
            auc_weight: 1.0,
            fp_cutoff: 1,
        };
        let calibration_only = DecoyRocScorer {
            auc_weight: 0.0,
            fp_cutoff: 1,
        };
        assert_eq!(auc_only.score(&ids), 1.0);
        assert!((calibration_only.score(&ids) - 1.0).abs() < 1e-12);
        assert!(DecoyRocScorer::default().score(&ids) <= 1.0);
    }
}
