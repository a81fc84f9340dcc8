//! # BayesProt Core
//!
//! Bayesian protein inference for bottom-up proteomics.
//!
//! Peptide-spectrum matches (PSMs) and the proteins they map to form an
//! evidence graph. Each connected component of that graph is compiled into a
//! factor graph (protein priors, probabilistic adders for indistinguishable
//! groups, PSM emission tables) and solved with scheduled, dampened loopy
//! belief propagation. A grid search over the emission and prior
//! hyperparameters picks the point with the best target–decoy
//! discrimination before the final pass writes posteriors back.
//!
//! ```no_run
//! use bayesprot_core::{BayesianProteinInference, InferenceConfig};
//! use bayesprot_core::evidence::ident::{
//!     PeptideHit, PeptideIdentification, ProteinHit, ProteinIdentification,
//! };
//!
//! let mut proteins = ProteinIdentification::with_hits(vec![ProteinHit::new("P12345")]);
//! let mut peptides = vec![PeptideIdentification::with_hits(vec![
//!     PeptideHit::new("LVNELTEFAK", 0.95, ["P12345"]),
//! ])];
//!
//! let inference = BayesianProteinInference::new(InferenceConfig::default())?;
//! inference.infer_posterior_probabilities(&mut proteins, &mut peptides)?;
//! println!("{}", proteins.hits[0].score);
//! # Ok::<(), bayesprot_core::InferenceError>(())
//! ```

pub mod config;
pub mod engine;
pub mod evidence;
pub mod inference;
pub mod metrics;
pub mod optimizer;
pub mod posterior;

// Re-export commonly used types
pub use config::InferenceConfig;
pub use engine::errors::InferenceError;
pub use evidence::graph::EvidenceGraph;
pub use inference::{BayesianProteinInference, InferenceSummary};
