//! Evidence inputs of protein inference.
//!
//! - **ident**: identification records (proteins, peptide-spectrum matches)
//! - **graph**: the protein–peptide evidence graph and its components

pub mod graph;
pub mod ident;
