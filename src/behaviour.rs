//! Behaviour models
//!
//! A behaviour is called with positional numeric arguments and afterwards
//! exposes named outputs. The network only sees the [`Behaviour`] trait.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{MarginError, Result};

/// Named outputs of the last invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BehaviourOutputs {
    values: BTreeMap<String, Vec<f64>>,
}

impl BehaviourOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.values.insert(name.into(), values);
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.values.get(name).map(Vec::as_slice)
    }

    /// First element of output `name`.
    pub fn scalar(&self, name: &str) -> Result<f64> {
        self.at(name, 0)
    }

    pub fn at(&self, name: &str, index: usize) -> Result<f64> {
        self.get(name)
            .and_then(|values| values.get(index).copied())
            .ok_or_else(|| MarginError::Model(format!("no output {name}[{index}]")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

pub trait Behaviour {
    fn key(&self) -> &str;

    fn invoke(&mut self, args: &[f64]) -> Result<()>;

    fn outputs(&self) -> &BehaviourOutputs;
}

type BehaviourFn = dyn Fn(&[f64]) -> Result<Vec<(String, Vec<f64>)>>;

/// Behaviour backed by a closure returning `(name, values)` pairs.
pub struct FnBehaviour {
    key: String,
    arity: Option<usize>,
    model: Box<BehaviourFn>,
    outputs: BehaviourOutputs,
}

impl FnBehaviour {
    pub fn new<F>(key: impl Into<String>, model: F) -> Self
    where
        F: Fn(&[f64]) -> Result<Vec<(String, Vec<f64>)>> + 'static,
    {
        Self {
            key: key.into(),
            arity: None,
            model: Box::new(model),
            outputs: BehaviourOutputs::new(),
        }
    }

    /// Reject calls with a different number of arguments.
    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }
}

impl fmt::Debug for FnBehaviour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnBehaviour")
            .field("key", &self.key)
            .field("arity", &self.arity)
            .field("outputs", &self.outputs)
            .finish()
    }
}

impl Behaviour for FnBehaviour {
    fn key(&self) -> &str {
        &self.key
    }

    fn invoke(&mut self, args: &[f64]) -> Result<()> {
        if let Some(arity) = self.arity {
            if args.len() != arity {
                return Err(MarginError::Model(format!(
                    "{} expects {arity} arguments, got {}",
                    self.key,
                    args.len()
                )));
            }
        }
        let produced = (self.model)(args)?;
        self.outputs.clear();
        for (name, values) in produced {
            self.outputs.set(name, values);
        }
        Ok(())
    }

    fn outputs(&self) -> &BehaviourOutputs {
        &self.outputs
    }
}
