//! Shared fixtures for the bayesprot integration and property tests.

use bayesprot_core::config::InferenceConfig;
use bayesprot_core::evidence::ident::{
    PeptideHit, PeptideIdentification, ProteinHit, ProteinIdentification,
};

/// Target proteins with the given accessions.
pub fn proteins(accessions: &[&str]) -> ProteinIdentification {
    ProteinIdentification::with_hits(accessions.iter().map(|a| ProteinHit::new(*a)).collect())
}

/// A spectrum with a single PSM.
pub fn spectrum(sequence: &str, score: f64, accessions: &[&str]) -> PeptideIdentification {
    PeptideIdentification::with_hits(vec![PeptideHit::new(
        sequence,
        score,
        accessions.iter().copied(),
    )])
}

/// Fixed hyperparameters (no grid search) and tight, undampened message passing.
pub fn fixed_config(alpha: f64, beta: f64, gamma: f64) -> InferenceConfig {
    let mut config = InferenceConfig::default();
    config.model_parameters.pep_emission = alpha;
    config.model_parameters.pep_spurious_emission = beta;
    config.model_parameters.prot_prior = gamma;
    config.loopy_belief_propagation.dampening_lambda = 0.0;
    config.loopy_belief_propagation.convergence_threshold = 1e-12;
    config
}

/// Exact posterior of a protein with one PSM of score `score` and one peptide evidence.
pub fn closed_form(alpha: f64, beta: f64, gamma: f64, pep_prior: f64, score: f64) -> f64 {
    let emission = |absent: f64| {
        (1.0 - score) * (1.0 - pep_prior) * absent + score * pep_prior * (1.0 - absent)
    };
    let present = gamma * emission((1.0 - beta) * (1.0 - alpha));
    let absent = (1.0 - gamma) * emission(1.0 - beta);
    present / (present + absent)
}

pub fn assert_close(actual: f64, expected: f64, tol: f64, label: &str) {
    assert!(
        (actual - expected).abs() <= tol,
        "{} mismatch: expected {:.15}, got {:.15}, diff={:.3e}",
        label,
        expected,
        actual,
        (actual - expected).abs()
    );
}
