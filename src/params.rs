//! Network parameters: design decisions, input specifications and constants.

use serde::{Deserialize, Serialize};

use crate::error::{MarginError, Result};

/// Direction in which an input specification becomes harder to meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDirection {
    Increase,
    Decrease,
}

impl ChangeDirection {
    pub fn sign(self) -> f64 {
        match self {
            ChangeDirection::Increase => 1.0,
            ChangeDirection::Decrease => -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignParam {
    pub key: String,
    pub value: f64,
    pub nominal: f64,
    /// Range explored when synthesizing surrogate training data.
    pub universe: (f64, f64),
}

impl DesignParam {
    pub fn new(key: impl Into<String>, nominal: f64, universe: (f64, f64)) -> Result<Self> {
        let key = key.into();
        if !(universe.1 >= universe.0) {
            return Err(MarginError::Configuration(format!(
                "design parameter {key}: universe upper bound below lower bound"
            )));
        }
        Ok(Self {
            key,
            value: nominal,
            nominal,
            universe,
        })
    }

    pub fn reset(&mut self) {
        self.value = self.nominal;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedParam {
    pub key: String,
    pub value: f64,
}

impl FixedParam {
    pub fn new(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Component `component` of the network's `distribution`-th spec distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecSource {
    pub distribution: usize,
    pub component: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    pub key: String,
    pub value: f64,
    pub nominal: f64,
    pub change_dir: ChangeDirection,
    /// `None` for deterministic specifications.
    pub source: Option<SpecSource>,
}

impl InputSpec {
    pub fn deterministic(
        key: impl Into<String>,
        nominal: f64,
        change_dir: ChangeDirection,
    ) -> Self {
        Self {
            key: key.into(),
            value: nominal,
            nominal,
            change_dir,
            source: None,
        }
    }

    pub fn stochastic(
        key: impl Into<String>,
        nominal: f64,
        change_dir: ChangeDirection,
        source: SpecSource,
    ) -> Self {
        Self {
            source: Some(source),
            ..Self::deterministic(key, nominal, change_dir)
        }
    }

    pub fn is_stochastic(&self) -> bool {
        self.source.is_some()
    }

    pub fn reset(&mut self) {
        self.value = self.nominal;
    }
}
