//! Margin analysis network
//!
//! [`Components`] holds everything a problem definition wires together.
//! A [`NetworkModel`] supplies the forward pass over those components, and
//! [`MarginNetwork`] drives it: repeated trials, the excess-to-performance
//! surrogate, and the impact and absorption matrices.
//!
//! Sensitivity probes run the forward model with modified inputs and then
//! roll every history back, so only real trials are ever accumulated.

use nalgebra::{DMatrix, DVector};
use rand::RngCore;
use tracing::{debug, info};

use crate::behaviour::{Behaviour, BehaviourOutputs};
use crate::distribution::Distribution;
use crate::doe::{Design, DoeMethod};
use crate::error::{ensure_len, MarginError, Result, RootFindingFailure};
use crate::margin::{MarginNode, Performance};
use crate::matrices::{AbsorptionMatrix, ImpactMatrix};
use crate::params::{DesignParam, FixedParam, InputSpec};
use crate::roots::{default_step, find_root, RootOptions, RootSearchError};
use crate::surrogate::PolynomialSurrogate;

/// Relative size below which a predicted performance at the limit counts as zero.
const IMPACT_ZERO_TOLERANCE: f64 = 1e-12;

#[derive(Default)]
pub struct Components {
    pub design_params: Vec<DesignParam>,
    pub input_specs: Vec<InputSpec>,
    pub fixed_params: Vec<FixedParam>,
    /// Distributions backing stochastic input specs.
    pub spec_distributions: Vec<Distribution>,
    pub behaviours: Vec<Box<dyn Behaviour>>,
    pub margin_nodes: Vec<MarginNode>,
    pub performances: Vec<Performance>,
}

/// History lengths captured before a probe.
struct HistoryMarks {
    nodes: Vec<usize>,
    performances: Vec<usize>,
    distributions: Vec<usize>,
}

/// Last excess and target of every node.
struct Probe {
    excess: Vec<f64>,
    target: Vec<f64>,
}

impl Components {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of a design, input or fixed parameter by key.
    pub fn value(&self, key: &str) -> Result<f64> {
        self.design_params
            .iter()
            .map(|p| (&p.key, p.value))
            .chain(self.input_specs.iter().map(|s| (&s.key, s.value)))
            .chain(self.fixed_params.iter().map(|f| (&f.key, f.value)))
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v)
            .ok_or_else(|| MarginError::Configuration(format!("unknown parameter {key}")))
    }

    /// Invoke behaviour `index` and return its outputs.
    pub fn invoke(&mut self, index: usize, args: &[f64]) -> Result<&BehaviourOutputs> {
        let behaviour = self.behaviours.get_mut(index).ok_or_else(|| {
            MarginError::Configuration(format!("no behaviour at index {index}"))
        })?;
        behaviour.invoke(args)?;
        Ok(behaviour.outputs())
    }

    /// One draw per spec distribution; every stochastic spec takes its
    /// component of the draw.
    pub fn draw_input_specs(&mut self, rng: &mut dyn RngCore) -> Result<()> {
        for (index, distribution) in self.spec_distributions.iter_mut().enumerate() {
            let draw = distribution.sample(1, &mut *rng);
            for spec in &mut self.input_specs {
                let Some(source) = spec.source.filter(|s| s.distribution == index) else {
                    continue;
                };
                spec.value = *draw.get((source.component, 0)).ok_or_else(|| {
                    MarginError::Configuration(format!(
                        "spec {} reads component {} of a {}-d distribution",
                        spec.key,
                        source.component,
                        draw.nrows()
                    ))
                })?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for spec in &self.input_specs {
            let Some(source) = spec.source else {
                continue;
            };
            let distribution = self.spec_distributions.get(source.distribution).ok_or_else(|| {
                MarginError::Configuration(format!(
                    "spec {} references missing distribution {}",
                    spec.key, source.distribution
                ))
            })?;
            if source.component >= distribution.ndim() {
                return Err(MarginError::Configuration(format!(
                    "spec {} reads component {} of a {}-d distribution",
                    spec.key,
                    source.component,
                    distribution.ndim()
                )));
            }
        }
        Ok(())
    }

    fn marks(&self) -> HistoryMarks {
        HistoryMarks {
            nodes: self.margin_nodes.iter().map(MarginNode::len).collect(),
            performances: self.performances.iter().map(Performance::len).collect(),
            distributions: self
                .spec_distributions
                .iter()
                .map(Distribution::n_samples)
                .collect(),
        }
    }

    fn rollback(&mut self, marks: &HistoryMarks) {
        for (node, &len) in self.margin_nodes.iter_mut().zip(&marks.nodes) {
            node.rollback(len);
        }
        for (performance, &len) in self.performances.iter_mut().zip(&marks.performances) {
            performance.rollback(len);
        }
        for (distribution, &len) in self.spec_distributions.iter_mut().zip(&marks.distributions) {
            distribution.rollback(len);
        }
    }

    fn last_excess(&self) -> Result<Vec<f64>> {
        self.margin_nodes
            .iter()
            .map(|node| {
                node.excess().last().ok_or_else(|| MarginError::InsufficientData {
                    context: format!("excess of node {}", node.label()),
                    needed: 1,
                    got: 0,
                })
            })
            .collect()
    }

    fn last_performance(&self) -> Result<Vec<f64>> {
        self.performances
            .iter()
            .map(|perf| {
                perf.values().last().ok_or_else(|| MarginError::InsufficientData {
                    context: format!("performance {}", perf.label()),
                    needed: 1,
                    got: 0,
                })
            })
            .collect()
    }

    fn last_probe(&self) -> Result<Probe> {
        let target = self
            .margin_nodes
            .iter()
            .map(|node| node.target().last().unwrap_or(f64::NAN))
            .collect();
        Ok(Probe {
            excess: self.last_excess()?,
            target,
        })
    }
}

/// Problem definition: the forward pass over a network's components.
pub trait NetworkModel {
    /// Evaluate behaviours in order and record one sample into every margin
    /// node and performance.
    fn forward(&mut self, components: &mut Components) -> Result<()>;

    /// Draw fresh values for the stochastic inputs.
    fn randomize(&mut self, components: &mut Components, rng: &mut dyn RngCore) -> Result<()> {
        components.draw_input_specs(rng)
    }
}

/// Where surrogate training data comes from.
#[derive(Debug, Clone)]
pub enum SurrogateTraining {
    /// Latin hypercube over the design-parameter universes, with
    /// `sampling_freq` randomized forward passes per design point.
    Synthesize {
        n_samples: usize,
        sampling_freq: usize,
    },
    /// Rows of `excess` (`n x n_nodes`) paired with rows of `performance`
    /// (`n x n_performances`).
    External {
        excess: DMatrix<f64>,
        performance: DMatrix<f64>,
    },
}

/// Result of one absorption computation.
#[derive(Debug, Clone)]
pub struct AbsorptionOutcome {
    pub absorption: DMatrix<f64>,
    pub deterioration: DMatrix<f64>,
    /// Smallest positive deterioration across nodes, per spec.
    pub deterioration_vector: DVector<f64>,
    pub failures: Vec<RootFindingFailure>,
}

pub struct MarginNetwork<M> {
    label: String,
    components: Components,
    model: M,
    impact: ImpactMatrix,
    absorption: AbsorptionMatrix,
    surrogate: Option<PolynomialSurrogate>,
    surrogate_degree: usize,
    root_options: RootOptions,
}

impl<M: NetworkModel> MarginNetwork<M> {
    pub fn new(components: Components, model: M, label: impl Into<String>) -> Result<Self> {
        components.validate()?;
        let n_nodes = components.margin_nodes.len();
        Ok(Self {
            label: label.into(),
            impact: ImpactMatrix::new(n_nodes, components.performances.len()),
            absorption: AbsorptionMatrix::new(n_nodes, components.input_specs.len()),
            components,
            model,
            surrogate: None,
            surrogate_degree: 2,
            root_options: RootOptions::default(),
        })
    }

    pub fn with_surrogate_degree(mut self, degree: usize) -> Self {
        self.surrogate_degree = degree;
        self
    }

    pub fn with_root_options(mut self, options: RootOptions) -> Self {
        self.root_options = options;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut Components {
        &mut self.components
    }

    pub fn into_components(self) -> Components {
        self.components
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn margin_nodes(&self) -> &[MarginNode] {
        &self.components.margin_nodes
    }

    pub fn performances(&self) -> &[Performance] {
        &self.components.performances
    }

    pub fn input_specs(&self) -> &[InputSpec] {
        &self.components.input_specs
    }

    pub fn impact_matrix(&self) -> &ImpactMatrix {
        &self.impact
    }

    pub fn absorption_matrix(&self) -> &AbsorptionMatrix {
        &self.absorption
    }

    pub fn surrogate(&self) -> Option<&PolynomialSurrogate> {
        self.surrogate.as_ref()
    }

    pub fn root_options(&self) -> &RootOptions {
        &self.root_options
    }

    /// Number of trials recorded by the first margin node.
    pub fn n_trials(&self) -> usize {
        self.components.margin_nodes.first().map_or(0, MarginNode::len)
    }

    pub fn forward(&mut self) -> Result<()> {
        self.model.forward(&mut self.components)
    }

    pub fn randomize(&mut self, rng: &mut dyn RngCore) -> Result<()> {
        self.model.randomize(&mut self.components, rng)
    }

    pub fn train_performance_surrogate(
        &mut self,
        training: SurrogateTraining,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        let (excess, performance) = match training {
            SurrogateTraining::External {
                excess,
                performance,
            } => (excess, performance),
            SurrogateTraining::Synthesize {
                n_samples,
                sampling_freq,
            } => self.synthesize_training_data(n_samples, sampling_freq, rng)?,
        };

        ensure_len(
            "surrogate excess columns",
            self.components.margin_nodes.len(),
            excess.ncols(),
        )?;
        ensure_len(
            "surrogate performance columns",
            self.components.performances.len(),
            performance.ncols(),
        )?;

        let surrogate = PolynomialSurrogate::fit(&excess, &performance, self.surrogate_degree)?;
        info!(
            network = %self.label,
            samples = excess.nrows(),
            degree = self.surrogate_degree,
            residual_rms = surrogate.residual_rms(),
            "trained performance surrogate"
        );
        self.surrogate = Some(surrogate);
        Ok(())
    }

    fn synthesize_training_data(
        &mut self,
        n_samples: usize,
        sampling_freq: usize,
        rng: &mut dyn RngCore,
    ) -> Result<(DMatrix<f64>, DMatrix<f64>)> {
        if sampling_freq == 0 {
            return Err(MarginError::Configuration(
                "sampling frequency must be positive".to_string(),
            ));
        }
        let lower: Vec<f64> = self.components.design_params.iter().map(|p| p.universe.0).collect();
        let upper: Vec<f64> = self.components.design_params.iter().map(|p| p.universe.1).collect();
        let design = Design::new(&lower, &upper, n_samples, DoeMethod::LatinHypercube, &mut *rng)?;
        let points = design.unscaled();

        let marks = self.components.marks();
        let saved_design: Vec<f64> = self
            .components
            .design_params
            .iter()
            .map(|p| p.value)
            .collect();
        let saved_specs: Vec<f64> = self.components.input_specs.iter().map(|s| s.value).collect();

        let rows = n_samples * sampling_freq;
        let mut excess = DMatrix::<f64>::zeros(rows, self.components.margin_nodes.len());
        let mut performance = DMatrix::<f64>::zeros(rows, self.components.performances.len());

        let result = (|| -> Result<()> {
            for (point, values) in points.row_iter().enumerate() {
                for (param, value) in self.components.design_params.iter_mut().zip(values.iter()) {
                    param.value = *value;
                }
                for repeat in 0..sampling_freq {
                    self.model.randomize(&mut self.components, &mut *rng)?;
                    self.model.forward(&mut self.components)?;
                    let row = point * sampling_freq + repeat;
                    for (j, e) in self.components.last_excess()?.into_iter().enumerate() {
                        excess[(row, j)] = e;
                    }
                    for (j, p) in self.components.last_performance()?.into_iter().enumerate() {
                        performance[(row, j)] = p;
                    }
                }
            }
            Ok(())
        })();

        for (param, value) in self.components.design_params.iter_mut().zip(saved_design) {
            param.value = value;
        }
        for (spec, value) in self.components.input_specs.iter_mut().zip(saved_specs) {
            spec.value = value;
        }
        self.components.rollback(&marks);
        result?;

        debug!(network = %self.label, rows, "synthesized surrogate training data");
        Ok((excess, performance))
    }

    /// Fractional performance change when each node's excess is driven to
    /// zero, `(p_limit - p_nominal) / p_limit`. Appends one slice. Cells whose
    /// predicted limit is zero (relative to the nominal) are NaN and masked
    /// in the impact matrix.
    pub fn compute_impact(&mut self) -> Result<DMatrix<f64>> {
        let surrogate = self.surrogate.as_ref().ok_or(MarginError::SurrogateNotTrained)?;
        let nominal_excess = self.components.last_excess()?;
        let nominal = surrogate.predict(&nominal_excess)?;

        let n_nodes = nominal_excess.len();
        let mut slice = DMatrix::<f64>::zeros(n_nodes, nominal.len());
        for i in 0..n_nodes {
            let mut exhausted = nominal_excess.clone();
            exhausted[i] = 0.0;
            let at_limit = surrogate.predict(&exhausted)?;
            for (j, (limit, nom)) in at_limit.iter().zip(&nominal).enumerate() {
                let impact = (limit - nom) / limit;
                let vanishing = limit.abs() <= IMPACT_ZERO_TOLERANCE * nom.abs().max(1.0);
                slice[(i, j)] = if impact.is_finite() && !vanishing {
                    impact
                } else {
                    debug!(node = i, performance = j, limit, "impact undefined at the limit");
                    f64::NAN
                };
            }
        }

        self.impact.push_slice(&slice)?;
        Ok(slice)
    }

    /// Threshold sensitivity of each node to each spec at the spec value
    /// that exhausts the node. Failed solves are NaN, masked, and listed.
    pub fn compute_absorption(&mut self) -> Result<AbsorptionOutcome> {
        if self.surrogate.is_none() {
            return Err(MarginError::SurrogateNotTrained);
        }
        let n_nodes = self.components.margin_nodes.len();
        let n_specs = self.components.input_specs.len();

        let nominal_specs: Vec<f64> = self.components.input_specs.iter().map(|s| s.value).collect();
        let baseline = self.probe(None)?;

        let mut absorption = DMatrix::<f64>::from_element(n_nodes, n_specs, f64::NAN);
        let mut deterioration = DMatrix::<f64>::from_element(n_nodes, n_specs, f64::NAN);
        let mut failed = vec![false; n_nodes * n_specs];
        let mut failures = Vec::new();

        for k in 0..n_specs {
            let s0 = nominal_specs[k];
            let sign = self.components.input_specs[k].change_dir.sign();
            for i in 0..n_nodes {
                match self.absorption_cell(i, k, s0, sign, &baseline) {
                    Ok((a, d)) => {
                        absorption[(i, k)] = a;
                        deterioration[(i, k)] = d;
                    }
                    Err(CellError::Failure(failure)) => {
                        debug!(network = %self.label, %failure, "absorption cell flagged");
                        failed[i * n_specs + k] = true;
                        failures.push(failure);
                    }
                    Err(CellError::Fatal(error)) => return Err(error),
                }
            }
        }

        let deterioration_vector = DVector::from_iterator(
            n_specs,
            (0..n_specs).map(|k| {
                deterioration
                    .column(k)
                    .iter()
                    .copied()
                    .filter(|d| d.is_finite() && *d > 0.0)
                    .fold(f64::NAN, f64::min)
            }),
        );

        self.absorption
            .push_trial(&absorption, &deterioration, failed, &deterioration_vector)?;
        Ok(AbsorptionOutcome {
            absorption,
            deterioration,
            deterioration_vector,
            failures,
        })
    }

    fn absorption_cell(
        &mut self,
        node: usize,
        spec: usize,
        s0: f64,
        sign: f64,
        baseline: &Probe,
    ) -> std::result::Result<(f64, f64), CellError> {
        let failure =
            |reason: String| CellError::Failure(RootFindingFailure::new(node, spec, reason));
        if s0 == 0.0 {
            return Err(failure("nominal specification is zero".to_string()));
        }

        let options = self.root_options;
        let root = find_root(
            |x| self.probe(Some((spec, x))).map(|p| p.excess[node]),
            s0,
            default_step(s0),
            sign,
            &options,
        );
        let limit = match root {
            Ok(limit) => limit,
            Err(RootSearchError::Evaluation(error)) => return Err(CellError::Fatal(error)),
            Err(other) => return Err(failure(other.to_string())),
        };

        let det = sign * (limit - s0) / s0;
        if det == 0.0 {
            return Err(failure("node is exhausted at the nominal specification".to_string()));
        }
        let tt_nominal = baseline.target[node];
        if !tt_nominal.is_finite() || tt_nominal == 0.0 {
            return Err(failure(format!("nominal threshold {tt_nominal} cannot normalize")));
        }
        let tt_limit = self
            .probe(Some((spec, limit)))
            .map_err(CellError::Fatal)?
            .target[node];

        debug!(node, spec, limit, deterioration = det, "absorption root");
        Ok(((tt_limit - tt_nominal).abs() / (tt_nominal * det), det))
    }

    /// Forward pass with one spec overridden, read back and rolled back.
    fn probe(&mut self, spec: Option<(usize, f64)>) -> Result<Probe> {
        let marks = self.components.marks();
        let saved = spec.map(|(k, value)| {
            let old = self.components.input_specs[k].value;
            self.components.input_specs[k].value = value;
            (k, old)
        });

        let result = self
            .model
            .forward(&mut self.components)
            .and_then(|()| self.components.last_probe());

        if let Some((k, old)) = saved {
            self.components.input_specs[k].value = old;
        }
        self.components.rollback(&marks);
        result
    }

    /// Drop the `n` oldest trials from every node, performance and matrix;
    /// `0` clears everything, including spec distribution draws.
    pub fn reset(&mut self, n: usize) {
        let c = &mut self.components;
        if n == 0 {
            c.margin_nodes.iter_mut().for_each(|node| node.reset(0));
            c.performances.iter_mut().for_each(|perf| perf.reset(0));
            c.spec_distributions.iter_mut().for_each(Distribution::reset);
            self.impact.truncate(0);
            self.absorption.truncate(0);
            return;
        }

        for node in &mut c.margin_nodes {
            node.reset(node.len().saturating_sub(n));
        }
        for perf in &mut c.performances {
            perf.reset(perf.len().saturating_sub(n));
        }
        self.impact.truncate(self.impact.n_trials().saturating_sub(n));
        self.absorption
            .truncate(self.absorption.n_trials().saturating_sub(n));
    }
}

enum CellError {
    Failure(RootFindingFailure),
    Fatal(MarginError),
}
