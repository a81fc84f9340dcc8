//! Discrete probability mass functions over bounded integer supports.
//!
//! A [`Pmf`] stores a dense probability table for the contiguous support
//! `[first_support, last_support]`. Every constructed PMF is normalized, so the
//! table always sums to one and the support is never empty.
//!
//! [`PNorm`] implements the generalized marginalization rule used by the
//! message passing engine. Marginalizing with `p = 1` is the usual sum-product
//! rule, `p = ∞` keeps only the best configuration (max-product), and values in
//! between weight high-probability configurations more strongly:
//!
//! ```text
//! ‖v‖_p = (Σ v_i^p)^(1/p)
//! ```

use crate::engine::errors::InferenceError;

/// Tolerance used when checking that a table sums to one.
pub const NORMALIZATION_TOLERANCE: f64 = 1e-9;

/// A normalized probability mass function over a contiguous integer support.
#[derive(Debug, Clone, PartialEq)]
pub struct Pmf {
    first_support: i64,
    table: Vec<f64>,
}

impl Pmf {
    /// Builds a PMF from unnormalized non-negative masses.
    ///
    /// Fails with a numerical error when the table is empty, contains negative
    /// or non-finite entries, or has no probability mass at all.
    pub fn new(first_support: i64, mut table: Vec<f64>) -> Result<Self, InferenceError> {
        if table.is_empty() {
            return Err(InferenceError::Numerical(
                "pmf: support must contain at least one value".into(),
            ));
        }
        let mut mass = 0.0;
        for &value in &table {
            if !value.is_finite() || value < 0.0 {
                return Err(InferenceError::Numerical(format!(
                    "pmf: invalid probability mass {} at support starting {}",
                    value, first_support
                )));
            }
            mass += value;
        }
        if mass <= 0.0 || !mass.is_finite() {
            return Err(InferenceError::Numerical(format!(
                "pmf: table over [{}, {}] has no probability mass",
                first_support,
                first_support + table.len() as i64 - 1
            )));
        }
        for value in &mut table {
            *value /= mass;
        }
        Ok(Self {
            first_support,
            table,
        })
    }

    /// Uniform distribution over `[0, max_value]`.
    pub fn uniform(max_value: usize) -> Self {
        let len = max_value + 1;
        Self {
            first_support: 0,
            table: vec![1.0 / len as f64; len],
        }
    }

    /// Lowest value with an entry in the table.
    pub fn first_support(&self) -> i64 {
        self.first_support
    }

    /// Highest value with an entry in the table.
    pub fn last_support(&self) -> i64 {
        self.first_support + self.table.len() as i64 - 1
    }

    /// Dense probabilities indexed by offset from [`Pmf::first_support`].
    pub fn table(&self) -> &[f64] {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Whether `value` lies inside the support range.
    pub fn contains(&self, value: i64) -> bool {
        value >= self.first_support && value <= self.last_support()
    }

    /// Probability of `value`, zero outside the support.
    pub fn probability(&self, value: i64) -> f64 {
        if self.contains(value) {
            self.table[(value - self.first_support) as usize]
        } else {
            0.0
        }
    }

    /// Probability of presence: `1 - P(0)`.
    ///
    /// A support that excludes zero puts all mass on present states, so the
    /// result is one without indexing out of range.
    pub fn presence_probability(&self) -> f64 {
        if self.contains(0) {
            (1.0 - self.probability(0)).clamp(0.0, 1.0)
        } else {
            1.0
        }
    }

    /// Copy of the PMF with leading and trailing zero-mass entries removed.
    pub fn narrowed(&self) -> Pmf {
        let start = self.table.iter().position(|&v| v > 0.0).unwrap_or(0);
        let end = self
            .table
            .iter()
            .rposition(|&v| v > 0.0)
            .unwrap_or(self.table.len() - 1);
        Pmf {
            first_support: self.first_support + start as i64,
            table: self.table[start..=end].to_vec(),
        }
    }

    /// Max absolute difference between two PMFs over the union of their supports.
    pub fn max_abs_difference(&self, other: &Pmf) -> f64 {
        let lo = self.first_support.min(other.first_support);
        let hi = self.last_support().max(other.last_support());
        (lo..=hi)
            .map(|v| (self.probability(v) - other.probability(v)).abs())
            .fold(0.0, f64::max)
    }

    /// Convex blend `lambda * self + (1 - lambda) * fresh`, renormalized.
    ///
    /// Both PMFs must share the same support; messages on one edge always do.
    pub fn dampen(&self, fresh: &Pmf, lambda: f64) -> Result<Pmf, InferenceError> {
        if self.first_support != fresh.first_support || self.table.len() != fresh.table.len() {
            return Err(InferenceError::Internal(format!(
                "pmf: cannot dampen [{}, {}] with [{}, {}]",
                self.first_support,
                self.last_support(),
                fresh.first_support,
                fresh.last_support()
            )));
        }
        if lambda <= 0.0 {
            return Ok(fresh.clone());
        }
        let blended = self
            .table
            .iter()
            .zip(&fresh.table)
            .map(|(&old, &new)| lambda * old + (1.0 - lambda) * new)
            .collect();
        Pmf::new(self.first_support, blended)
    }

    /// Elementwise product with another PMF on the same support, renormalized.
    pub fn product(&self, other: &Pmf) -> Result<Pmf, InferenceError> {
        if self.first_support != other.first_support || self.table.len() != other.table.len() {
            return Err(InferenceError::Internal(format!(
                "pmf: cannot multiply [{}, {}] with [{}, {}]",
                self.first_support,
                self.last_support(),
                other.first_support,
                other.last_support()
            )));
        }
        let table = self
            .table
            .iter()
            .zip(&other.table)
            .map(|(a, b)| a * b)
            .collect();
        Pmf::new(self.first_support, table)
    }
}

/// Norm used to marginalize out variables when computing factor messages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PNorm {
    /// `(Σ v^p)^(1/p)`; `p = 1` is sum-product.
    Finite(f64),
    /// `max v`; max-product inference.
    Infinity,
}

impl PNorm {
    /// Interprets the `p_norm_inference` option: values `<= 0` mean infinity.
    pub fn from_parameter(p: f64) -> Self {
        if p <= 0.0 || p.is_infinite() {
            PNorm::Infinity
        } else {
            PNorm::Finite(p)
        }
    }

    /// Maps a mass into the space where marginalization is a plain fold.
    #[inline]
    pub(crate) fn lift(self, value: f64) -> f64 {
        match self {
            PNorm::Finite(p) if p != 1.0 => value.powf(p),
            _ => value,
        }
    }

    /// Folds a lifted mass into an accumulator.
    #[inline]
    pub(crate) fn combine(self, acc: f64, lifted: f64) -> f64 {
        match self {
            PNorm::Finite(_) => acc + lifted,
            PNorm::Infinity => acc.max(lifted),
        }
    }

    /// Maps an accumulator back to probability space.
    #[inline]
    pub(crate) fn lower(self, acc: f64) -> f64 {
        match self {
            PNorm::Finite(p) if p != 1.0 => acc.powf(1.0 / p),
            _ => acc,
        }
    }
}

impl Default for PNorm {
    fn default() -> Self {
        PNorm::Finite(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(pmf: &Pmf) -> f64 {
        pmf.table().iter().sum()
    }

    #[test]
    fn new_normalizes_table() {
        let pmf = Pmf::new(2, vec![1.0, 3.0]).expect("pmf");
        assert!((sum(&pmf) - 1.0).abs() < NORMALIZATION_TOLERANCE);
        assert_eq!(pmf.first_support(), 2);
        assert_eq!(pmf.last_support(), 3);
        assert!((pmf.probability(3) - 0.75).abs() < 1e-12);
        assert_eq!(pmf.probability(7), 0.0);
    }

    #[test]
    fn new_rejects_zero_mass_and_nan() {
        assert!(Pmf::new(0, vec![0.0, 0.0]).is_err());
        assert!(Pmf::new(0, vec![f64::NAN, 1.0]).is_err());
        assert!(Pmf::new(0, vec![-0.1, 1.0]).is_err());
        assert!(Pmf::new(0, vec![]).is_err());
    }

    #[test]
    fn narrowing_drops_zero_tails() {
        let pmf = Pmf::new(0, vec![0.0, 0.5, 0.5, 0.0]).expect("pmf");
        let narrowed = pmf.narrowed();
        assert_eq!(narrowed.first_support(), 1);
        assert_eq!(narrowed.last_support(), 2);
        assert!(narrowed.first_support() <= narrowed.last_support());
    }

    #[test]
    fn presence_probability_handles_support_without_zero() {
        let certain = Pmf::new(0, vec![0.0, 1.0]).expect("pmf").narrowed();
        assert!(!certain.contains(0));
        assert_eq!(certain.presence_probability(), 1.0);

        let group = Pmf::new(0, vec![0.25, 0.5, 0.25]).expect("pmf");
        assert!((group.presence_probability() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn dampening_blends_and_renormalizes() {
        let old = Pmf::new(0, vec![0.5, 0.5]).expect("old");
        let fresh = Pmf::new(0, vec![0.1, 0.9]).expect("fresh");
        let damped = old.dampen(&fresh, 0.5).expect("dampen");
        assert!((damped.probability(1) - 0.7).abs() < 1e-12);
        assert_eq!(old.dampen(&fresh, 0.0).expect("no dampening"), fresh);
        assert!(old.dampen(&Pmf::uniform(2), 0.5).is_err());
    }

    #[test]
    fn max_abs_difference_spans_both_supports() {
        let a = Pmf::new(0, vec![1.0]).expect("a");
        let b = Pmf::new(1, vec![1.0]).expect("b");
        assert!((a.max_abs_difference(&b) - 1.0).abs() < 1e-12);
        assert_eq!(a.max_abs_difference(&a), 0.0);
    }

    #[test]
    fn p_norm_parameter_mapping() {
        assert_eq!(PNorm::from_parameter(0.0), PNorm::Infinity);
        assert_eq!(PNorm::from_parameter(-3.0), PNorm::Infinity);
        assert_eq!(PNorm::from_parameter(f64::INFINITY), PNorm::Infinity);
        assert_eq!(PNorm::from_parameter(1.0), PNorm::Finite(1.0));

        let two = PNorm::Finite(2.0);
        let acc = two.combine(two.combine(0.0, two.lift(3.0)), two.lift(4.0));
        assert!((two.lower(acc) - 5.0).abs() < 1e-12);
        let inf = PNorm::Infinity;
        assert_eq!(inf.lower(inf.combine(inf.combine(0.0, 3.0), 4.0)), 4.0);
    }
}
