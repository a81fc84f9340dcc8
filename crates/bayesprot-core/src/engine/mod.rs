//! The inference engine.
//!
//! This module provides:
//! - **errors**: Error types for inference failures
//! - **pmf**: Discrete distributions and p-norm marginalization
//! - **factor**: Table and probabilistic-adder factors of the model
//! - **factor_graph**: Factor graph storage and its owning builder
//! - **compiler**: Translation of evidence components into factor graphs
//! - **scheduler**: Message scheduling policies
//! - **belief_propagation**: Loopy belief propagation over a factor graph

pub mod belief_propagation;
pub mod compiler;
pub mod errors;
pub mod factor;
pub mod factor_graph;
pub mod pmf;
pub mod scheduler;
