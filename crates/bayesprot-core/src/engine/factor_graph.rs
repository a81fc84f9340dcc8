//! Factor graph storage and its owning builder.
//!
//! A [`FactorGraphBuilder`] collects variables and factor dependencies. Calling
//! [`FactorGraphBuilder::build`] consumes the builder and returns an owned
//! [`FactorGraph`], so a builder is either turned into exactly one graph or
//! dropped on the error path.
//!
//! The built graph is bipartite: each (factor, scope slot) pair is a *link*
//! and every link carries two directed edges, `2k` (factor → variable) and
//! `2k + 1` (variable → factor). Messages live outside the graph, indexed by
//! [`EdgeIdx`].

use std::fmt::Debug;
use std::hash::Hash;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::engine::errors::InferenceError;
use crate::engine::factor::Factor;

/// Index of a variable node.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct VarIdx(pub u32);

/// Index of a factor node.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct FactorIdx(pub u32);

/// Index of a directed message edge.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct EdgeIdx(pub u32);

/// Direction and endpoints of a directed edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDirection {
    FactorToVariable,
    VariableToFactor,
}

/// A binary or bounded count variable with domain `0..=max_value`.
#[derive(Debug, Clone)]
pub struct Variable<L> {
    pub label: L,
    pub max_value: usize,
}

#[derive(Debug, Clone, Copy)]
struct Link {
    factor: FactorIdx,
    slot: usize,
    variable: VarIdx,
}

/// Owning builder for a [`FactorGraph`].
#[derive(Debug)]
pub struct FactorGraphBuilder<L> {
    variables: Vec<Variable<L>>,
    index: FxHashMap<L, VarIdx>,
    factors: Vec<Factor>,
}

impl<L> Default for FactorGraphBuilder<L> {
    fn default() -> Self {
        Self {
            variables: Vec::new(),
            index: FxHashMap::default(),
            factors: Vec::new(),
        }
    }
}

impl<L> FactorGraphBuilder<L>
where
    L: Copy + Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a variable, or returns the existing one for the same label.
    ///
    /// Re-registering a label with a different domain is a structural error.
    pub fn add_variable(&mut self, label: L, max_value: usize) -> Result<VarIdx, InferenceError> {
        if let Some(&idx) = self.index.get(&label) {
            let existing = self.variables[idx.0 as usize].max_value;
            if existing != max_value {
                return Err(InferenceError::Structural(format!(
                    "variable {:?} registered with domains 0..={} and 0..={}",
                    label, existing, max_value
                )));
            }
            return Ok(idx);
        }
        let idx = VarIdx(self.variables.len() as u32);
        self.variables.push(Variable { label, max_value });
        self.index.insert(label, idx);
        Ok(idx)
    }

    pub fn variable(&self, label: &L) -> Option<VarIdx> {
        self.index.get(label).copied()
    }

    pub fn max_value(&self, var: VarIdx) -> Option<usize> {
        self.variables.get(var.0 as usize).map(|v| v.max_value)
    }

    /// Adds a factor whose scope refers to already registered variables.
    pub fn insert_dependency(&mut self, factor: Factor) -> Result<FactorIdx, InferenceError> {
        for (var, max) in factor.scope().iter().zip(factor.domain_maxima()) {
            let variable = self.variables.get(var.0 as usize).ok_or_else(|| {
                InferenceError::Structural(format!("factor refers to unknown variable {:?}", var))
            })?;
            if variable.max_value != max {
                return Err(InferenceError::Structural(format!(
                    "factor expects {:?} to range over 0..={}, variable {:?} ranges over 0..={}",
                    var, max, variable.label, variable.max_value
                )));
            }
        }
        let idx = FactorIdx(self.factors.len() as u32);
        self.factors.push(factor);
        Ok(idx)
    }

    /// Consumes the builder and wires the bipartite edge structure.
    ///
    /// Every variable must be in the scope of at least one factor.
    pub fn build(self) -> Result<FactorGraph<L>, InferenceError> {
        let mut links = Vec::new();
        let mut factor_links = Vec::with_capacity(self.factors.len());
        let mut variable_links: Vec<SmallVec<[u32; 4]>> = vec![SmallVec::new(); self.variables.len()];

        for (f, factor) in self.factors.iter().enumerate() {
            let start = links.len() as u32;
            for (slot, &variable) in factor.scope().iter().enumerate() {
                variable_links[variable.0 as usize].push(links.len() as u32);
                links.push(Link {
                    factor: FactorIdx(f as u32),
                    slot,
                    variable,
                });
            }
            factor_links.push(start..links.len() as u32);
        }

        if let Some(orphan) = variable_links.iter().position(|l| l.is_empty()) {
            return Err(InferenceError::Structural(format!(
                "variable {:?} is not connected to any factor",
                self.variables[orphan].label
            )));
        }

        Ok(FactorGraph {
            variables: self.variables,
            index: self.index,
            factors: self.factors,
            links,
            factor_links,
            variable_links,
        })
    }
}

/// An immutable factor graph over variables labelled with `L`.
#[derive(Debug)]
pub struct FactorGraph<L> {
    variables: Vec<Variable<L>>,
    index: FxHashMap<L, VarIdx>,
    factors: Vec<Factor>,
    links: Vec<Link>,
    factor_links: Vec<std::ops::Range<u32>>,
    variable_links: Vec<SmallVec<[u32; 4]>>,
}

impl<L> FactorGraph<L>
where
    L: Copy + Eq + Hash + Debug,
{
    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn factor_count(&self) -> usize {
        self.factors.len()
    }

    pub fn edge_count(&self) -> usize {
        self.links.len() * 2
    }

    pub fn variables(&self) -> &[Variable<L>] {
        &self.variables
    }

    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    pub fn variable(&self, label: &L) -> Option<VarIdx> {
        self.index.get(label).copied()
    }

    pub fn max_value(&self, var: VarIdx) -> usize {
        self.variables[var.0 as usize].max_value
    }

    pub fn factor(&self, idx: FactorIdx) -> &Factor {
        &self.factors[idx.0 as usize]
    }

    /// Direction, factor, slot, and variable of an edge.
    pub fn endpoints(&self, edge: EdgeIdx) -> (EdgeDirection, FactorIdx, usize, VarIdx) {
        let link = self.links[(edge.0 / 2) as usize];
        let direction = if edge.0 % 2 == 0 {
            EdgeDirection::FactorToVariable
        } else {
            EdgeDirection::VariableToFactor
        };
        (direction, link.factor, link.slot, link.variable)
    }

    /// All factor → variable edges, in factor order.
    pub fn factor_to_variable_edges(&self) -> impl Iterator<Item = EdgeIdx> + '_ {
        (0..self.links.len() as u32).map(|k| EdgeIdx(2 * k))
    }

    /// Factor → variable edges arriving at `var`.
    pub fn incoming_to_variable(&self, var: VarIdx) -> impl Iterator<Item = EdgeIdx> + '_ {
        self.variable_links[var.0 as usize]
            .iter()
            .map(|&k| EdgeIdx(2 * k))
    }

    /// Variable → factor edges arriving at `factor`, in slot order.
    pub fn incoming_to_factor(&self, factor: FactorIdx) -> impl Iterator<Item = EdgeIdx> + '_ {
        self.factor_links[factor.0 as usize]
            .clone()
            .map(|k| EdgeIdx(2 * k + 1))
    }

    /// Edges whose next value depends on the message carried by `edge`.
    ///
    /// A factor → variable message feeds every other message leaving the
    /// variable; a variable → factor message feeds every other message leaving
    /// the factor.
    pub fn dependents(&self, edge: EdgeIdx) -> SmallVec<[EdgeIdx; 8]> {
        let link_idx = edge.0 / 2;
        let link = self.links[link_idx as usize];
        if edge.0 % 2 == 0 {
            self.variable_links[link.variable.0 as usize]
                .iter()
                .filter(|&&k| k != link_idx)
                .map(|&k| EdgeIdx(2 * k + 1))
                .collect()
        } else {
            self.factor_links[link.factor.0 as usize]
                .clone()
                .filter(|&k| k != link_idx)
                .map(|k| EdgeIdx(2 * k))
                .collect()
        }
    }
}
