use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cdf::DEFAULT_BINS;
use crate::error::{MarginError, Result};
use crate::monte_carlo::MonteCarloConfig;
use crate::roots::RootOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub n_trials: usize,
    pub seed: u64,
    pub surrogate_samples: usize,
    pub sampling_freq: usize,
    pub surrogate_degree: usize,
    pub cdf_bins: usize,
    pub cutoff: f64,
    pub buffer_limit: f64,
    pub compute_impact: bool,
    pub compute_absorption: bool,
    pub root_max_expansions: usize,
    pub root_max_iter: usize,
    pub root_tolerance: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let roots = RootOptions::default();
        Self {
            n_trials: 1000,
            seed: 2026,
            surrogate_samples: 100,
            sampling_freq: 1,
            surrogate_degree: 2,
            cdf_bins: DEFAULT_BINS,
            cutoff: 0.9,
            buffer_limit: 0.0,
            compute_impact: true,
            compute_absorption: true,
            root_max_expansions: roots.max_expansions,
            root_max_iter: roots.max_iter,
            root_tolerance: roots.tolerance,
        }
    }
}

impl AnalysisConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let cfg: AnalysisConfig = toml::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_trials == 0 {
            return Err(MarginError::Configuration(
                "n_trials must be greater than zero".to_string(),
            ));
        }

        if self.surrogate_samples == 0 || self.sampling_freq == 0 {
            return Err(MarginError::Configuration(
                "surrogate_samples and sampling_freq must be greater than zero".to_string(),
            ));
        }

        if !(1..=2).contains(&self.surrogate_degree) {
            return Err(MarginError::Configuration(
                "surrogate_degree must be 1 or 2".to_string(),
            ));
        }

        if self.cdf_bins == 0 {
            return Err(MarginError::Configuration(
                "cdf_bins must be greater than zero".to_string(),
            ));
        }

        if !(self.cutoff > 0.0 && self.cutoff < 1.0) {
            return Err(MarginError::Configuration(
                "cutoff must lie strictly between 0 and 1".to_string(),
            ));
        }

        if !self.buffer_limit.is_finite() {
            return Err(MarginError::Configuration(
                "buffer_limit must be finite".to_string(),
            ));
        }

        if self.root_max_expansions == 0 || self.root_max_iter == 0 {
            return Err(MarginError::Configuration(
                "root finding iteration limits must be greater than zero".to_string(),
            ));
        }

        if !(self.root_tolerance > 0.0) {
            return Err(MarginError::Configuration(
                "root_tolerance must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn root_options(&self) -> RootOptions {
        RootOptions {
            max_expansions: self.root_max_expansions,
            max_iter: self.root_max_iter,
            tolerance: self.root_tolerance,
        }
    }

    pub fn monte_carlo(&self) -> MonteCarloConfig {
        MonteCarloConfig {
            n_trials: self.n_trials,
            seed: self.seed,
            compute_impact: self.compute_impact,
            compute_absorption: self.compute_absorption,
            cdf_bins: self.cdf_bins,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "n_trials = 25\nseed = 7\ncompute_absorption = false").unwrap();

        let cfg = AnalysisConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(cfg.n_trials, 25);
        assert_eq!(cfg.seed, 7);
        assert!(!cfg.compute_absorption);
        assert_eq!(cfg.cdf_bins, DEFAULT_BINS);
        assert_eq!(cfg.monte_carlo().n_trials, 25);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cfg = AnalysisConfig {
            cutoff: 1.0,
            ..AnalysisConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(MarginError::Configuration(_))));

        let cfg = AnalysisConfig {
            surrogate_degree: 3,
            ..AnalysisConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_a_toml_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "n_trials = \"many\"").unwrap();
        assert!(matches!(
            AnalysisConfig::from_toml_file(file.path()),
            Err(MarginError::Toml(_))
        ));
    }
}
