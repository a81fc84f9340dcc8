//! Factors of the protein inference model and their message rules.
//!
//! Two factor shapes cover the whole model:
//!
//! - **Table factors** hold a dense conditional probability table over a small
//!   scope (protein priors, peptide evidence, PSM sum-evidence tables).
//! - **Probabilistic adders** constrain an output count variable to equal the
//!   sum of their binary or count inputs. A group is present when the count is
//!   at least one, which makes the adder a probabilistic OR over its members.
//!
//! Messages are computed with the generalized p-norm rule from
//! [`PNorm`]; adders use p-convolution so they never materialize the joint
//! table over all inputs.

use smallvec::SmallVec;

use crate::engine::errors::InferenceError;
use crate::engine::factor_graph::VarIdx;
use crate::engine::pmf::{PNorm, Pmf};

/// A factor node of the factor graph.
#[derive(Debug, Clone)]
pub enum Factor {
    Table(TableFactor),
    Adder(AdderFactor),
}

impl Factor {
    /// Variables this factor depends on, in message-slot order.
    pub fn scope(&self) -> &[VarIdx] {
        match self {
            Factor::Table(table) => &table.scope,
            Factor::Adder(adder) => &adder.scope,
        }
    }

    /// Domain maximum of each scope variable (`0..=max`).
    pub fn domain_maxima(&self) -> SmallVec<[usize; 4]> {
        match self {
            Factor::Table(table) => table.dims.iter().map(|d| d - 1).collect(),
            Factor::Adder(adder) => adder.maxima.clone(),
        }
    }

    /// Computes the message sent to the variable in `slot`.
    ///
    /// `incoming[s]` is the current variable-to-factor message for slot `s`; the
    /// entry at `slot` is ignored.
    pub fn message_to(
        &self,
        slot: usize,
        incoming: &[&Pmf],
        p: PNorm,
    ) -> Result<Pmf, InferenceError> {
        let scope_len = self.scope().len();
        if slot >= scope_len || incoming.len() != scope_len {
            return Err(InferenceError::Internal(format!(
                "factor: slot {} / {} incoming messages for scope of {}",
                slot,
                incoming.len(),
                scope_len
            )));
        }
        match self {
            Factor::Table(table) => table.message_to(slot, incoming, p),
            Factor::Adder(adder) => adder.message_to(slot, incoming, p),
        }
    }
}

/// Dense table over the joint domain of its scope, row-major (last slot fastest).
#[derive(Debug, Clone)]
pub struct TableFactor {
    scope: SmallVec<[VarIdx; 4]>,
    dims: SmallVec<[usize; 4]>,
    table: Vec<f64>,
}

impl TableFactor {
    pub fn new(
        scope: &[VarIdx],
        dims: &[usize],
        table: Vec<f64>,
    ) -> Result<Self, InferenceError> {
        if scope.is_empty() || scope.len() != dims.len() {
            return Err(InferenceError::Structural(format!(
                "table factor: scope of {} variables with {} dimensions",
                scope.len(),
                dims.len()
            )));
        }
        if dims.iter().any(|&d| d == 0) {
            return Err(InferenceError::Structural(
                "table factor: empty dimension".into(),
            ));
        }
        ensure_distinct(scope)?;
        let expected: usize = dims.iter().product();
        if table.len() != expected {
            return Err(InferenceError::Structural(format!(
                "table factor: {} entries for dimensions {:?}",
                table.len(),
                dims
            )));
        }
        if table.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(InferenceError::Numerical(
                "table factor: entries must be finite and non-negative".into(),
            ));
        }
        Ok(Self {
            scope: scope.into(),
            dims: dims.into(),
            table,
        })
    }

    /// Entry for a full assignment of the scope.
    pub fn entry(&self, assignment: &[usize]) -> f64 {
        let mut flat = 0;
        for (value, dim) in assignment.iter().zip(&self.dims) {
            flat = flat * dim + value;
        }
        self.table[flat]
    }

    fn message_to(&self, slot: usize, incoming: &[&Pmf], p: PNorm) -> Result<Pmf, InferenceError> {
        let mut acc = vec![0.0; self.dims[slot]];
        let mut index: SmallVec<[usize; 4]> = SmallVec::from_elem(0, self.dims.len());

        for &weight in &self.table {
            if weight > 0.0 {
                let mut w = weight;
                for (s, &value) in index.iter().enumerate() {
                    if s != slot {
                        w *= incoming[s].probability(value as i64);
                    }
                }
                let target = index[slot];
                acc[target] = p.combine(acc[target], p.lift(w));
            }
            for s in (0..self.dims.len()).rev() {
                index[s] += 1;
                if index[s] < self.dims[s] {
                    break;
                }
                index[s] = 0;
            }
        }

        Pmf::new(0, acc.into_iter().map(|a| p.lower(a)).collect())
    }
}

/// `output = Σ inputs`; scope is the inputs followed by the output.
#[derive(Debug, Clone)]
pub struct AdderFactor {
    scope: SmallVec<[VarIdx; 4]>,
    maxima: SmallVec<[usize; 4]>,
}

impl AdderFactor {
    pub fn new(inputs: &[(VarIdx, usize)], output: (VarIdx, usize)) -> Result<Self, InferenceError> {
        if inputs.is_empty() {
            return Err(InferenceError::Structural(format!(
                "adder factor: output {:?} has no inputs",
                output.0
            )));
        }
        let total: usize = inputs.iter().map(|(_, max)| max).sum();
        if output.1 != total {
            return Err(InferenceError::Structural(format!(
                "adder factor: output domain {} does not match input sum {}",
                output.1, total
            )));
        }
        let mut scope: SmallVec<[VarIdx; 4]> = inputs.iter().map(|(var, _)| *var).collect();
        let mut maxima: SmallVec<[usize; 4]> = inputs.iter().map(|(_, max)| *max).collect();
        scope.push(output.0);
        maxima.push(output.1);
        ensure_distinct(&scope)?;
        Ok(Self { scope, maxima })
    }

    fn output_slot(&self) -> usize {
        self.scope.len() - 1
    }

    fn lifted(&self, slot: usize, message: &Pmf, p: PNorm) -> Vec<f64> {
        (0..=self.maxima[slot])
            .map(|v| p.lift(message.probability(v as i64)))
            .collect()
    }

    fn message_to(&self, slot: usize, incoming: &[&Pmf], p: PNorm) -> Result<Pmf, InferenceError> {
        let output = self.output_slot();

        let mut others = vec![1.0];
        for s in 0..output {
            if s != slot {
                others = convolve(&others, &self.lifted(s, incoming[s], p), p);
            }
        }

        let mut acc = if slot == output {
            others
        } else {
            let out = self.lifted(output, incoming[output], p);
            (0..=self.maxima[slot])
                .map(|value| {
                    others.iter().enumerate().fold(0.0, |acc, (sum, &o)| {
                        match out.get(value + sum) {
                            Some(&y) => p.combine(acc, o * y),
                            None => acc,
                        }
                    })
                })
                .collect()
        };
        acc.resize(self.maxima[slot] + 1, 0.0);

        Pmf::new(0, acc.into_iter().map(|a| p.lower(a)).collect())
    }
}

/// Convolution of lifted masses: `c[i + j] ⊕= a[i] * b[j]`.
fn convolve(a: &[f64], b: &[f64], p: PNorm) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, &x) in a.iter().enumerate() {
        if x == 0.0 {
            continue;
        }
        for (j, &y) in b.iter().enumerate() {
            out[i + j] = p.combine(out[i + j], x * y);
        }
    }
    out
}

fn ensure_distinct(scope: &[VarIdx]) -> Result<(), InferenceError> {
    for (i, var) in scope.iter().enumerate() {
        if scope[..i].contains(var) {
            return Err(InferenceError::Structural(format!(
                "factor scope lists variable {:?} twice",
                var
            )));
        }
    }
    Ok(())
}

/// Builds the factors of the protein inference model for one hyperparameter point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelFactors {
    /// Probability that a present protein emits a given peptide (α).
    pub pep_emission: f64,
    /// Probability that a peptide is emitted spuriously (β).
    pub pep_spurious_emission: f64,
    /// Prior probability of protein presence (γ).
    pub prot_prior: f64,
    /// Prior probability of a peptide identification being correct.
    pub pep_prior: f64,
}

impl ModelFactors {
    /// Binary prior `[1 - γ, γ]`; `prior` overrides γ for this protein.
    pub fn protein_prior(&self, protein: VarIdx, prior: Option<f64>) -> Result<Factor, InferenceError> {
        let gamma = prior.unwrap_or(self.prot_prior);
        check_probability("protein prior", gamma)?;
        Ok(Factor::Table(TableFactor::new(
            &[protein],
            &[2],
            vec![1.0 - gamma, gamma],
        )?))
    }

    /// Emission table of the search-engine score: `[(1 - s)(1 - π), s π]`.
    pub fn peptide_evidence(&self, psm: VarIdx, score: f64) -> Result<Factor, InferenceError> {
        check_probability("PSM score", score)?;
        Ok(Factor::Table(TableFactor::new(
            &[psm],
            &[2],
            vec![(1.0 - score) * (1.0 - self.pep_prior), score * self.pep_prior],
        )?))
    }

    /// `P(psm | count)` with `P(absent | count = i) = (1 - β)(1 - α)^i`.
    ///
    /// Rows cover the count variable's domain `0..=count_max`. A peptide with
    /// `nr_evidences` known parent proteins cannot be generated by more of
    /// them, so rows above `nr_evidences` carry no mass; zero evidences means
    /// the count is unrestricted.
    pub fn sum_evidence(
        &self,
        count: VarIdx,
        count_max: usize,
        psm: VarIdx,
        nr_evidences: usize,
    ) -> Result<Factor, InferenceError> {
        let mut table = Vec::with_capacity(2 * (count_max + 1));
        for i in 0..=count_max {
            if nr_evidences > 0 && i > nr_evidences {
                table.extend([0.0, 0.0]);
                continue;
            }
            let absent = self.not_conditional_given_sum(i);
            table.push(absent);
            table.push(1.0 - absent);
        }
        Ok(Factor::Table(TableFactor::new(
            &[count, psm],
            &[count_max + 1, 2],
            table,
        )?))
    }

    /// Probabilistic OR of the inputs, expressed as an adder onto a count variable.
    pub fn probabilistic_adder(
        &self,
        inputs: &[(VarIdx, usize)],
        output: (VarIdx, usize),
    ) -> Result<Factor, InferenceError> {
        Ok(Factor::Adder(AdderFactor::new(inputs, output)?))
    }

    fn not_conditional_given_sum(&self, sum: usize) -> f64 {
        (1.0 - self.pep_spurious_emission) * (1.0 - self.pep_emission).powi(sum as i32)
    }
}

fn check_probability(what: &str, value: f64) -> Result<(), InferenceError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(InferenceError::Structural(format!(
            "{} must be a probability in [0, 1], got {}",
            what, value
        )))
    }
}
