//! Reference problem: a thermally loaded vane strut
//!
//! A lean strut of width `w`, height `h` and lean angle `theta` connects a hub
//! of radius `r1` to a shroud of radius `r2`. The nacelle and gas-path
//! temperatures `T1`, `T2` are correlated Gaussians. Three margins are
//! monitored: buckling load against axial force, and yield stress against
//! the axial and the bending stress. Weight is the performance.

use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector};

use crate::behaviour::{Behaviour, FnBehaviour};
use crate::distribution::GaussianDistribution;
use crate::error::{MarginError, Result};
use crate::margin::{MarginKind, MarginNode, Performance, Polarity};
use crate::network::{Components, MarginNetwork, NetworkModel};
use crate::params::{ChangeDirection, DesignParam, FixedParam, InputSpec, SpecSource};

pub const LENGTH: usize = 0;
pub const WEIGHT: usize = 1;
pub const AXIAL: usize = 2;
pub const BENDING: usize = 3;
pub const BUCKLING: usize = 4;

pub const TEMPERATURE_MEAN: [f64; 2] = [370.0, 580.0];
pub const TEMPERATURE_COVARIANCE: [f64; 4] = [50.0, 25.0, 25.0, 100.0];

fn output(name: &str, value: f64) -> (String, Vec<f64>) {
    (name.to_string(), vec![value])
}

/// Strut length from the hub/shroud geometry at lean angle `theta` (degrees).
pub fn strut_length(theta: f64, r1: f64, r2: f64) -> Result<f64> {
    let c = theta.to_radians().cos();
    let disc = (r1 * c).powi(2) + r2 * r2 - r1 * r1;
    if disc < 0.0 {
        return Err(MarginError::Model(format!(
            "no strut length for theta={theta}, r1={r1}, r2={r2}"
        )));
    }
    Ok(-r1 * c + disc.sqrt())
}

fn behaviours() -> Vec<FnBehaviour> {
    vec![
        FnBehaviour::new("length", |a: &[f64]| {
            Ok(vec![output("length", strut_length(a[0], a[1], a[2])?)])
        })
        .with_arity(3),
        // rho, w, h, L
        FnBehaviour::new("weight", |a: &[f64]| {
            Ok(vec![output("weight", a[0] * a[1] * a[2] * a[3])])
        })
        .with_arity(4),
        // alpha, E, T1, T2, w, h, theta
        FnBehaviour::new("axial", |a: &[f64]| {
            let (alpha, e, t1, t2, w, h, theta) = (a[0], a[1], a[2], a[3], a[4], a[5], a[6]);
            let sigma_a = e * alpha * (t2 - t1) * theta.to_radians().cos();
            Ok(vec![
                output("force", sigma_a * w * h / 1000.0),
                output("sigma_a", sigma_a),
            ])
        })
        .with_arity(7),
        // alpha, E, T1, T2, h, theta, L
        FnBehaviour::new("bending", |a: &[f64]| {
            let (alpha, e, t1, t2, h, theta, l) = (a[0], a[1], a[2], a[3], a[4], a[5], a[6]);
            let sigma_m = (3.0 * e * h / (2.0 * l)) * alpha * (t2 - t1) * theta.to_radians().sin();
            Ok(vec![output("sigma_m", sigma_m)])
        })
        .with_arity(7),
        // E, K, w, h, L
        FnBehaviour::new("buckling", |a: &[f64]| {
            let (e, k, w, h, l) = (a[0], a[1], a[2], a[3], a[4]);
            let load = PI * PI * e * w * h.powi(3) / (12.0 * (k * l).powi(2));
            Ok(vec![output("buckling", load / 1000.0)])
        })
        .with_arity(5),
    ]
}

pub fn strut_components() -> Result<Components> {
    let temperatures = GaussianDistribution::new(
        DVector::from_row_slice(&TEMPERATURE_MEAN),
        DMatrix::from_row_slice(2, 2, &TEMPERATURE_COVARIANCE),
    )?
    .with_label("temperatures");

    let mut c = Components::new();
    c.fixed_params = vec![
        FixedParam::new("alpha", 4.17e-5),
        FixedParam::new("E", 156.3e3),
        FixedParam::new("rho", 8.19e-6),
        FixedParam::new("r1", 346.5),
        FixedParam::new("r2", 536.5),
        FixedParam::new("K", 1.0),
    ];
    c.design_params = vec![
        DesignParam::new("w", 130.0, (70.0, 130.0))?,
        DesignParam::new("h", 20.0, (0.5, 20.0))?,
        DesignParam::new("theta", 85.0, (0.0, 90.0))?,
    ];
    c.input_specs = vec![
        InputSpec::stochastic(
            "T1",
            TEMPERATURE_MEAN[0],
            ChangeDirection::Decrease,
            SpecSource {
                distribution: 0,
                component: 0,
            },
        ),
        InputSpec::stochastic(
            "T2",
            TEMPERATURE_MEAN[1],
            ChangeDirection::Increase,
            SpecSource {
                distribution: 0,
                component: 1,
            },
        ),
        InputSpec::deterministic("sigma_y", 460.0, ChangeDirection::Decrease),
    ];
    c.spec_distributions = vec![temperatures.into_distribution()];
    c.behaviours = behaviours()
        .into_iter()
        .map(|b| Box::new(b) as Box<dyn Behaviour>)
        .collect();
    c.margin_nodes = vec![
        MarginNode::new("buckling").with_kind(MarginKind::MustExceed),
        MarginNode::new("axial_stress").with_kind(MarginKind::MustExceed),
        MarginNode::new("bending_stress").with_kind(MarginKind::MustExceed),
    ];
    c.performances = vec![Performance::new("weight", Polarity::LessIsBetter)];
    Ok(c)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StrutModel;

impl NetworkModel for StrutModel {
    fn forward(&mut self, c: &mut Components) -> Result<()> {
        let (w, h, theta) = (c.value("w")?, c.value("h")?, c.value("theta")?);
        let (t1, t2, sigma_y) = (c.value("T1")?, c.value("T2")?, c.value("sigma_y")?);
        let (alpha, e, rho) = (c.value("alpha")?, c.value("E")?, c.value("rho")?);
        let (r1, r2, k) = (c.value("r1")?, c.value("r2")?, c.value("K")?);

        let length = c.invoke(LENGTH, &[theta, r1, r2])?.scalar("length")?;
        let weight = c.invoke(WEIGHT, &[rho, w, h, length])?.scalar("weight")?;
        let (force, sigma_a) = {
            let out = c.invoke(AXIAL, &[alpha, e, t1, t2, w, h, theta])?;
            (out.scalar("force")?, out.scalar("sigma_a")?)
        };
        let sigma_m = c
            .invoke(BENDING, &[alpha, e, t1, t2, h, theta, length])?
            .scalar("sigma_m")?;
        let buckling = c
            .invoke(BUCKLING, &[e, k, w, h, length])?
            .scalar("buckling")?;

        c.margin_nodes[0].evaluate(buckling, force);
        c.margin_nodes[1].evaluate(sigma_y, sigma_a);
        c.margin_nodes[2].evaluate(sigma_y, sigma_m);
        c.performances[0].record(weight);
        Ok(())
    }
}

pub fn strut_network() -> Result<MarginNetwork<StrutModel>> {
    MarginNetwork::new(strut_components()?, StrutModel, "strut")
}
