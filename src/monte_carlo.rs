use nalgebra::DMatrix;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cdf::DEFAULT_BINS;
use crate::error::Result;
use crate::network::{MarginNetwork, NetworkModel};

pub const DEFAULT_MONTE_CARLO_TRIALS: usize = 1000;

#[derive(Clone, Debug)]
pub struct MonteCarloConfig {
    pub n_trials: usize,
    pub seed: u64,
    pub compute_impact: bool,
    pub compute_absorption: bool,
    pub cdf_bins: usize,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            n_trials: DEFAULT_MONTE_CARLO_TRIALS,
            seed: 2026,
            compute_impact: true,
            compute_absorption: true,
            cdf_bins: DEFAULT_BINS,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TrialRecord {
    pub trial: usize,
    pub excess: Vec<f64>,
    pub performance: Vec<f64>,
    pub root_failures: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct NodeSummary {
    pub label: String,
    pub mean_excess: f64,
    pub std_excess: f64,
    /// `None` when too few distinct samples were collected.
    pub excess_limit: Option<f64>,
    pub reliability: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PerformanceSummary {
    pub label: String,
    pub mean: f64,
    pub std_dev: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct MonteCarloSummary {
    pub network: String,
    pub n_trials: usize,
    pub seed: u64,
    pub nodes: Vec<NodeSummary>,
    pub performances: Vec<PerformanceSummary>,
    pub mean_impact: Vec<Vec<f64>>,
    pub mean_absorption: Vec<Vec<f64>>,
    pub mean_deterioration: Vec<f64>,
    pub root_failures: usize,
    /// Impact cells left NaN because the performance vanished at the limit.
    pub undefined_impact: usize,
}

/// `randomize -> forward -> impact -> absorption` for every trial. Impact and
/// absorption are both skipped while no surrogate is trained.
pub fn run_monte_carlo<M: NetworkModel>(
    network: &mut MarginNetwork<M>,
    config: &MonteCarloConfig,
    rng: &mut dyn RngCore,
) -> Result<Vec<TrialRecord>> {
    let mut records = Vec::with_capacity(config.n_trials);
    let trained = network.surrogate().is_some();
    let with_impact = config.compute_impact && trained;
    let with_absorption = config.compute_absorption && trained;
    if !trained && (config.compute_impact || config.compute_absorption) {
        warn!(
            network = network.label(),
            "no trained surrogate, impact and absorption skipped"
        );
    }

    for trial in 0..config.n_trials {
        network.randomize(&mut *rng)?;
        network.forward()?;
        if with_impact {
            network.compute_impact()?;
        }
        let root_failures = if with_absorption {
            network.compute_absorption()?.failures.len()
        } else {
            0
        };

        records.push(TrialRecord {
            trial,
            excess: network
                .margin_nodes()
                .iter()
                .map(|n| n.excess().last().unwrap_or(f64::NAN))
                .collect(),
            performance: network
                .performances()
                .iter()
                .map(|p| p.values().last().unwrap_or(f64::NAN))
                .collect(),
            root_failures,
        });

        if (trial + 1) % 100 == 0 {
            debug!(trial = trial + 1, total = config.n_trials, "monte carlo progress");
        }
    }

    let root_failures: usize = records.iter().map(|r| r.root_failures).sum();
    if root_failures > 0 {
        warn!(
            network = network.label(),
            root_failures,
            "absorption cells without a specification limit were flagged as NaN"
        );
    }
    let undefined_impact = network.impact_matrix().undefined_count();
    if undefined_impact > 0 {
        warn!(
            network = network.label(),
            undefined_impact,
            "impact cells with zero performance at the limit were flagged as NaN"
        );
    }
    info!(
        network = network.label(),
        trials = config.n_trials,
        "monte carlo complete"
    );
    Ok(records)
}

/// Same as [`run_monte_carlo`] with a ChaCha stream seeded from the config.
pub fn run_seeded<M: NetworkModel>(
    network: &mut MarginNetwork<M>,
    config: &MonteCarloConfig,
) -> Result<Vec<TrialRecord>> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    run_monte_carlo(network, config, &mut rng)
}

pub fn summarize<M: NetworkModel>(
    network: &MarginNetwork<M>,
    config: &MonteCarloConfig,
) -> MonteCarloSummary {
    let nodes = network
        .margin_nodes()
        .iter()
        .map(|node| {
            let (excess_limit, reliability) = match node.compute_cdf(config.cdf_bins) {
                Ok(summary) => (Some(summary.excess_limit), Some(summary.reliability)),
                Err(err) => {
                    debug!(node = node.label(), %err, "no cdf summary");
                    (None, None)
                }
            };
            NodeSummary {
                label: node.label().to_string(),
                mean_excess: node.excess().mean().unwrap_or(f64::NAN),
                std_excess: node.excess().std_dev().unwrap_or(f64::NAN),
                excess_limit,
                reliability,
            }
        })
        .collect();

    let performances = network
        .performances()
        .iter()
        .map(|perf| PerformanceSummary {
            label: perf.label().to_string(),
            mean: perf.values().mean().unwrap_or(f64::NAN),
            std_dev: perf.values().std_dev().unwrap_or(f64::NAN),
        })
        .collect();

    let absorption = network.absorption_matrix();
    MonteCarloSummary {
        network: network.label().to_string(),
        n_trials: network.n_trials(),
        seed: config.seed,
        nodes,
        performances,
        mean_impact: rows(&network.impact_matrix().mean()),
        mean_absorption: rows(&absorption.mean()),
        mean_deterioration: absorption.mean_deterioration_vector().iter().copied().collect(),
        root_failures: absorption.failure_count(),
        undefined_impact: network.impact_matrix().undefined_count(),
    }
}

fn rows(matrix: &DMatrix<f64>) -> Vec<Vec<f64>> {
    matrix
        .row_iter()
        .map(|row| row.iter().copied().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::GaussianDistribution;
    use crate::margin::{MarginNode, Performance, Polarity};
    use crate::network::{Components, SurrogateTraining};
    use crate::params::{ChangeDirection, InputSpec, SpecSource};

    /// Capacity 10 against a Gaussian load.
    struct Load;

    impl NetworkModel for Load {
        fn forward(&mut self, c: &mut Components) -> Result<()> {
            let load = c.value("load")?;
            c.margin_nodes[0].evaluate(10.0, load);
            c.performances[0].record(2.0 * load);
            Ok(())
        }
    }

    fn load_network() -> MarginNetwork<Load> {
        let mut c = Components::new();
        c.spec_distributions.push(
            GaussianDistribution::univariate(8.0, 0.25)
                .unwrap()
                .into_distribution(),
        );
        c.input_specs.push(InputSpec::stochastic(
            "load",
            8.0,
            ChangeDirection::Increase,
            SpecSource {
                distribution: 0,
                component: 0,
            },
        ));
        c.margin_nodes
            .push(MarginNode::new("capacity").with_buffer_limit(1.0));
        c.performances.push(Performance::new("cost", Polarity::LessIsBetter));
        MarginNetwork::new(c, Load, "load").unwrap().with_surrogate_degree(1)
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let config = MonteCarloConfig {
            n_trials: 50,
            compute_absorption: false,
            ..MonteCarloConfig::default()
        };
        let mut first = load_network();
        let mut second = load_network();
        let a = run_seeded(&mut first, &config).unwrap();
        let b = run_seeded(&mut second, &config).unwrap();

        assert_eq!(a.len(), 50);
        let excess_a: Vec<f64> = a.iter().map(|r| r.excess[0]).collect();
        let excess_b: Vec<f64> = b.iter().map(|r| r.excess[0]).collect();
        assert_eq!(excess_a, excess_b);
        assert_eq!(first.impact_matrix().n_trials(), 0);
    }

    #[test]
    fn untrained_default_run_skips_sensitivities() {
        let mut network = load_network();
        let config = MonteCarloConfig {
            n_trials: 20,
            ..MonteCarloConfig::default()
        };
        let records = run_seeded(&mut network, &config).unwrap();

        assert_eq!(records.len(), 20);
        assert_eq!(network.n_trials(), 20);
        assert_eq!(network.impact_matrix().n_trials(), 0);
        assert_eq!(network.absorption_matrix().n_trials(), 0);
        assert!(records.iter().all(|r| r.root_failures == 0));
    }

    #[test]
    fn summary_reports_excess_statistics() {
        let mut network = load_network();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        network
            .train_performance_surrogate(
                SurrogateTraining::External {
                    excess: DMatrix::from_column_slice(3, 1, &[1.0, 2.0, 3.0]),
                    performance: DMatrix::from_column_slice(3, 1, &[18.0, 16.0, 14.0]),
                },
                &mut rng,
            )
            .unwrap();

        let config = MonteCarloConfig {
            n_trials: 2000,
            cdf_bins: 50,
            ..MonteCarloConfig::default()
        };
        run_monte_carlo(&mut network, &config, &mut rng).unwrap();
        let summary = summarize(&network, &config);

        assert_eq!(summary.n_trials, 2000);
        assert!((summary.nodes[0].mean_excess - 2.0).abs() < 0.05);
        assert!(summary.nodes[0].reliability.unwrap() > 0.95);
        assert_eq!(network.impact_matrix().n_trials(), 2000);
        assert_eq!(network.absorption_matrix().n_trials(), 2000);
        assert_eq!(summary.root_failures, 0);
        assert_eq!(summary.undefined_impact, 0);
        // |10 - s0| / (s0 * (10 - s0) / s0) for every draw s0
        assert!((summary.mean_absorption[0][0] - 1.0).abs() < 1e-6);
    }
}
