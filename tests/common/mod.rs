//! Shared analytic network: three margin nodes, two performances, two specs.

#![allow(dead_code)]

use design_margins::doe::{Design, DoeMethod};
use design_margins::{
    Behaviour, ChangeDirection, Components, FnBehaviour, InputSpec, MarginKind, MarginNetwork,
    MarginNode, NetworkModel, Performance, Polarity, Result, SurrogateTraining,
};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;

pub const SPEC_CENTRES: [f64; 2] = [1.2, 1.0];

pub fn p1(d: &[f64]) -> f64 {
    d[0] * d[0] + d[1] * d[1] + 2.0 * d[2] * d[2]
}

pub fn p2(d: &[f64]) -> f64 {
    d[0] + 2.0 * d[1] + d[2]
}

pub fn thresholds(s1: f64, s2: f64) -> [f64; 3] {
    [s1 * s1 + 2.0 * s1 + s2, s1 + 2.0 * s2, s1 + s2]
}

/// Fixed decided values; thresholds either fixed or computed from `s1`, `s2`.
pub struct Analytic {
    pub decided: [f64; 3],
    pub fixed_thresholds: Option<[f64; 3]>,
}

impl NetworkModel for Analytic {
    fn forward(&mut self, c: &mut Components) -> Result<()> {
        let tt = match self.fixed_thresholds {
            Some(tt) => tt,
            None => {
                let (s1, s2) = (c.value("s1")?, c.value("s2")?);
                let out = c.invoke(0, &[s1, s2])?;
                [out.at("tt", 0)?, out.at("tt", 1)?, out.at("tt", 2)?]
            }
        };
        let (perf_1, perf_2) = {
            let out = c.invoke(1, &self.decided)?;
            (out.scalar("p1")?, out.scalar("p2")?)
        };

        for (i, node) in c.margin_nodes.iter_mut().enumerate() {
            node.evaluate(self.decided[i], tt[i]);
        }
        c.performances[0].record(perf_1);
        c.performances[1].record(perf_2);
        Ok(())
    }
}

pub fn analytic_components() -> Components {
    let mut c = Components::new();
    c.input_specs = vec![
        InputSpec::deterministic("s1", SPEC_CENTRES[0], ChangeDirection::Decrease),
        InputSpec::deterministic("s2", SPEC_CENTRES[1], ChangeDirection::Decrease),
    ];
    let behaviours: Vec<Box<dyn Behaviour>> = vec![
        Box::new(
            FnBehaviour::new("thresholds", |a: &[f64]| {
                Ok(vec![("tt".to_string(), thresholds(a[0], a[1]).to_vec())])
            })
            .with_arity(2),
        ),
        Box::new(
            FnBehaviour::new("performance", |a: &[f64]| {
                Ok(vec![
                    ("p1".to_string(), vec![p1(a)]),
                    ("p2".to_string(), vec![p2(a)]),
                ])
            })
            .with_arity(3),
        ),
    ];
    c.behaviours = behaviours;
    c.margin_nodes = ["E1", "E2", "E3"]
        .into_iter()
        .map(|label| MarginNode::new(label).with_kind(MarginKind::MustExceed))
        .collect();
    c.performances = vec![
        Performance::new("P1", Polarity::LessIsBetter),
        Performance::new("P2", Polarity::LessIsBetter),
    ];
    c
}

pub fn analytic_network(model: Analytic) -> MarginNetwork<Analytic> {
    MarginNetwork::new(analytic_components(), model, "analytic").unwrap()
}

/// Train on a Latin hypercube over excess, mapping excess `e` to `p(tt + e)`.
pub fn train_on_excess(network: &mut MarginNetwork<Analytic>, tt: [f64; 3], seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let excess = Design::new(&[-1.0; 3], &[1.0; 3], 100_usize, DoeMethod::LatinHypercube, &mut rng)
        .unwrap()
        .unscaled();

    let mut performance = DMatrix::<f64>::zeros(excess.nrows(), 2);
    for (i, row) in excess.row_iter().enumerate() {
        let decided: Vec<f64> = row.iter().zip(&tt).map(|(e, t)| e + t).collect();
        performance[(i, 0)] = p1(&decided);
        performance[(i, 1)] = p2(&decided);
    }

    network
        .train_performance_surrogate(
            SurrogateTraining::External {
                excess,
                performance,
            },
            &mut rng,
        )
        .unwrap();
}
