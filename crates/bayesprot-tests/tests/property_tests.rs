//! Property tests for posterior invariants and search determinism.

use bayesprot_core::engine::pmf::{Pmf, NORMALIZATION_TOLERANCE};
use bayesprot_core::optimizer::SearchState;
use bayesprot_core::BayesianProteinInference;
use bayesprot_tests::{fixed_config, proteins, spectrum};
use proptest::prelude::*;

/// Posterior of protein `P` given two PSMs, one shared with `Q`.
fn protein_posterior(alpha: f64, beta: f64, gamma: f64, s1: f64, s2: f64) -> f64 {
    let mut prots = proteins(&["P", "Q"]);
    let mut peps = vec![
        spectrum("AAK", s1, &["P"]),
        spectrum("CCK", s2, &["P", "Q"]),
    ];
    BayesianProteinInference::new(fixed_config(alpha, beta, gamma))
        .expect("config")
        .infer_posterior_probabilities(&mut prots, &mut peps)
        .expect("inference");
    prots.hits[0].score
}

proptest! {
    #[test]
    fn pmf_is_normalized(first in -5i64..5, table in prop::collection::vec(0f64..10.0, 1..8)) {
        prop_assume!(table.iter().sum::<f64>() > 0.0);
        let pmf = Pmf::new(first, table).unwrap();
        let mass: f64 = pmf.table().iter().sum();
        prop_assert!((mass - 1.0).abs() < NORMALIZATION_TOLERANCE);
        prop_assert!(pmf.first_support() <= pmf.last_support());
        let narrowed = pmf.narrowed();
        prop_assert!(narrowed.first_support() >= pmf.first_support());
        prop_assert!(narrowed.last_support() <= pmf.last_support());
    }

    #[test]
    fn posterior_never_decreases_with_prior(
        alpha in 0.05f64..0.95,
        beta in 0.001f64..0.2,
        g1 in 0.01f64..0.99,
        g2 in 0.01f64..0.99,
        s1 in 0.0f64..1.0,
        s2 in 0.0f64..1.0,
    ) {
        let (low, high) = if g1 <= g2 { (g1, g2) } else { (g2, g1) };
        let p_low = protein_posterior(alpha, beta, low, s1, s2);
        let p_high = protein_posterior(alpha, beta, high, s1, s2);
        prop_assert!(p_high >= p_low - 1e-9, "γ {} -> {}, γ {} -> {}", low, p_low, high, p_high);
    }

    #[test]
    fn posteriors_are_probabilities(
        alpha in 0.05f64..0.95,
        gamma in 0.01f64..0.99,
        s1 in 0.0f64..1.0,
        s2 in 0.0f64..1.0,
    ) {
        let p = protein_posterior(alpha, 0.01, gamma, s1, s2);
        prop_assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn search_best_is_first_strict_maximum(objectives in prop::collection::vec(-1.0f64..1.0, 1..20)) {
        let mut state = SearchState::new(-1.0);
        for (i, &objective) in objectives.iter().enumerate() {
            state.record([i, 0, 0], objective);
        }
        let max = objectives.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let first = objectives.iter().position(|&o| o == max).unwrap();
        if max > -1.0 {
            prop_assert_eq!(state.best_indices(), [first, 0, 0]);
        } else {
            prop_assert!(state.best().is_none());
        }
    }
}
