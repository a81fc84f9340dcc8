//! Inference configuration.
//!
//! [`InferenceConfig`] groups the settings in three sections mirroring the
//! flat option names accepted by [`InferenceConfig::set_option`]:
//!
//! | Key | Default |
//! |---|---|
//! | `top_PSMs` | 1 (0 keeps all) |
//! | `update_PSM_probabilities` | true |
//! | `annotate_group_probabilities` | true |
//! | `user_defined_priors` | false |
//! | `model_parameters:{pep_emission, pep_spurious_emission, prot_prior}` | -1 (search) |
//! | `model_parameters:pep_prior` | 0.5 |
//! | `loopy_belief_propagation:scheduling_type` | priority |
//! | `loopy_belief_propagation:dampening_lambda` | 1e-3 |
//! | `loopy_belief_propagation:convergence_threshold` | 1e-5 |
//! | `loopy_belief_propagation:max_nr_iterations` | 2^31 |
//! | `loopy_belief_propagation:p_norm_inference` | 1 (≤ 0 means ∞) |
//! | `param_optimize:aucweight` | 0.2 |

use std::str::FromStr;

use crate::engine::belief_propagation::{BeliefPropagationConfig, DEFAULT_MAX_ITERATIONS};
use crate::engine::errors::InferenceError;
use crate::engine::pmf::PNorm;
use crate::engine::scheduler::SchedulingType;

/// Model hyperparameters; α, β and γ outside [0, 1] are searched.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ModelParameters {
    pub pep_emission: f64,
    pub pep_spurious_emission: f64,
    pub prot_prior: f64,
    pub pep_prior: f64,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            pep_emission: -1.0,
            pep_spurious_emission: -1.0,
            prot_prior: -1.0,
            pep_prior: 0.5,
        }
    }
}

/// Settings of the message passing engine.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LoopyBeliefPropagationSettings {
    pub scheduling_type: SchedulingType,
    pub dampening_lambda: f64,
    pub convergence_threshold: f64,
    pub max_nr_iterations: u64,
    pub p_norm_inference: f64,
}

impl Default for LoopyBeliefPropagationSettings {
    fn default() -> Self {
        Self {
            scheduling_type: SchedulingType::Priority,
            dampening_lambda: 1e-3,
            convergence_threshold: 1e-5,
            max_nr_iterations: DEFAULT_MAX_ITERATIONS,
            p_norm_inference: 1.0,
        }
    }
}

impl LoopyBeliefPropagationSettings {
    /// Validated engine configuration.
    pub fn to_config(&self) -> Result<BeliefPropagationConfig, InferenceError> {
        BeliefPropagationConfig {
            dampening_lambda: self.dampening_lambda,
            convergence_threshold: self.convergence_threshold,
            max_iterations: self.max_nr_iterations,
            p_norm: PNorm::from_parameter(self.p_norm_inference),
            scheduling: self.scheduling_type,
        }
        .validate()
    }
}

/// Settings of the hyperparameter search.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ParamOptimizeSettings {
    /// 0 optimizes calibration only, 1 the ROC area only.
    pub aucweight: f64,
}

impl Default for ParamOptimizeSettings {
    fn default() -> Self {
        Self { aucweight: 0.2 }
    }
}

/// Complete configuration of a protein inference run.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct InferenceConfig {
    #[cfg_attr(feature = "serde", serde(rename = "top_PSMs"))]
    pub top_psms: usize,
    #[cfg_attr(feature = "serde", serde(rename = "update_PSM_probabilities"))]
    pub update_psm_probabilities: bool,
    pub annotate_group_probabilities: bool,
    /// Use each protein's score at the start of a run as its prior.
    pub user_defined_priors: bool,
    pub model_parameters: ModelParameters,
    pub loopy_belief_propagation: LoopyBeliefPropagationSettings,
    pub param_optimize: ParamOptimizeSettings,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            top_psms: 1,
            update_psm_probabilities: true,
            annotate_group_probabilities: true,
            user_defined_priors: false,
            model_parameters: ModelParameters::default(),
            loopy_belief_propagation: LoopyBeliefPropagationSettings::default(),
            param_optimize: ParamOptimizeSettings::default(),
        }
    }
}

impl InferenceConfig {
    /// Builds a configuration from flat `key = value` options over the defaults.
    pub fn from_options<I, K, V>(options: I) -> Result<Self, InferenceError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in options {
            config.set_option(key.as_ref(), value.as_ref())?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Sets one option by its flat name.
    pub fn set_option(&mut self, key: &str, value: &str) -> Result<(), InferenceError> {
        let model = &mut self.model_parameters;
        let bp = &mut self.loopy_belief_propagation;
        match key {
            "top_PSMs" => self.top_psms = parse(key, value)?,
            "update_PSM_probabilities" => self.update_psm_probabilities = parse_flag(key, value)?,
            "annotate_group_probabilities" => {
                self.annotate_group_probabilities = parse_flag(key, value)?
            }
            "user_defined_priors" => self.user_defined_priors = parse_flag(key, value)?,
            "model_parameters:pep_emission" => model.pep_emission = parse(key, value)?,
            "model_parameters:pep_spurious_emission" => {
                model.pep_spurious_emission = parse(key, value)?
            }
            "model_parameters:prot_prior" => model.prot_prior = parse(key, value)?,
            "model_parameters:pep_prior" => model.pep_prior = parse(key, value)?,
            "loopy_belief_propagation:scheduling_type" => bp.scheduling_type = value.parse()?,
            "loopy_belief_propagation:dampening_lambda" => bp.dampening_lambda = parse(key, value)?,
            "loopy_belief_propagation:convergence_threshold" => {
                bp.convergence_threshold = parse(key, value)?
            }
            "loopy_belief_propagation:max_nr_iterations" => {
                bp.max_nr_iterations = parse(key, value)?
            }
            "loopy_belief_propagation:p_norm_inference" => {
                bp.p_norm_inference = parse(key, value)?
            }
            "param_optimize:aucweight" => self.param_optimize.aucweight = parse(key, value)?,
            other => {
                return Err(InferenceError::Configuration(format!(
                    "unknown option '{}'",
                    other
                )))
            }
        }
        Ok(())
    }

    /// Checks value ranges; every error is a configuration error.
    pub fn validate(&self) -> Result<(), InferenceError> {
        let model = &self.model_parameters;
        for (name, value) in [
            ("pep_emission", model.pep_emission),
            ("pep_spurious_emission", model.pep_spurious_emission),
            ("prot_prior", model.prot_prior),
        ] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(InferenceError::Configuration(format!(
                    "model_parameters:{} must be in [-1, 1], got {}",
                    name, value
                )));
            }
        }
        if !(0.0..=1.0).contains(&model.pep_prior) {
            return Err(InferenceError::Configuration(format!(
                "model_parameters:pep_prior must be in [0, 1], got {}",
                model.pep_prior
            )));
        }
        if !(0.0..=1.0).contains(&self.param_optimize.aucweight) {
            return Err(InferenceError::Configuration(format!(
                "param_optimize:aucweight must be in [0, 1], got {}",
                self.param_optimize.aucweight
            )));
        }
        if !self.loopy_belief_propagation.p_norm_inference.is_finite() {
            return Err(InferenceError::Configuration(
                "loopy_belief_propagation:p_norm_inference must be a number".into(),
            ));
        }
        self.loopy_belief_propagation.to_config()?;
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, InferenceError> {
    value.trim().parse().map_err(|_| {
        InferenceError::Configuration(format!("option '{}': invalid value '{}'", key, value))
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool, InferenceError> {
    match value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(InferenceError::Configuration(format!(
            "option '{}' must be 'true' or 'false', got '{}'",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = InferenceConfig::default();
        config.validate().expect("defaults validate");
        assert_eq!(config.top_psms, 1);
        assert_eq!(config.loopy_belief_propagation.max_nr_iterations, 1 << 31);
        let bp = config.loopy_belief_propagation.to_config().expect("bp config");
        assert_eq!(bp.p_norm, PNorm::Finite(1.0));
    }

    #[test]
    fn flat_options_override_defaults() {
        let config = InferenceConfig::from_options([
            ("top_PSMs", "0"),
            ("update_PSM_probabilities", "false"),
            ("model_parameters:pep_emission", "0.9"),
            ("loopy_belief_propagation:scheduling_type", "fifo"),
            ("loopy_belief_propagation:p_norm_inference", "-1"),
            ("param_optimize:aucweight", "0.5"),
        ])
        .expect("config");
        assert_eq!(config.top_psms, 0);
        assert!(!config.update_psm_probabilities);
        assert_eq!(config.model_parameters.pep_emission, 0.9);
        assert_eq!(config.loopy_belief_propagation.scheduling_type, SchedulingType::Fifo);
        assert_eq!(config.param_optimize.aucweight, 0.5);
        let bp = config.loopy_belief_propagation.to_config().expect("bp config");
        assert_eq!(bp.p_norm, PNorm::Infinity);
    }

    #[test]
    fn bad_options_are_configuration_errors() {
        for (key, value) in [
            ("top_PSMs", "-1"),
            ("user_defined_priors", "yes"),
            ("model_parameters:prot_prior", "1.5"),
            ("model_parameters:pep_prior", "-0.1"),
            ("loopy_belief_propagation:scheduling_type", "random_spanning_tree"),
            ("loopy_belief_propagation:dampening_lambda", "2"),
            ("loopy_belief_propagation:max_nr_iterations", "0"),
            ("param_optimize:aucweight", "abc"),
            ("nr_PSMs", "1"),
        ] {
            let err = InferenceConfig::from_options([(key, value)]).expect_err(key);
            assert!(matches!(err, InferenceError::Configuration(_)), "{}: {}", key, err);
        }
    }
}
