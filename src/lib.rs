//! Design margins - margin analysis networks
//!
//! Propagates discretized N-dimensional uncertainty through a network of
//! behaviour models, records the excess of every margin node, and measures
//! how each node trades against performance (impact) and against input
//! specifications (absorption).

pub mod behaviour;
pub mod cdf;
pub mod config;
pub mod distribution;
pub mod doe;
pub mod error;
pub mod margin;
pub mod matrices;
pub mod monte_carlo;
pub mod network;
pub mod output;
pub mod params;
pub mod roots;
pub mod series;
pub mod strut;
pub mod surrogate;

// Re-export main types
pub use behaviour::{Behaviour, BehaviourOutputs, FnBehaviour};
pub use cdf::{CdfCurve, CdfSummary};
pub use config::AnalysisConfig;
pub use distribution::{Distribution, GaussianDistribution, UniformDistribution};
pub use doe::{Design, DoeMethod};
pub use error::{MarginError, Result, RootFindingFailure};
pub use margin::{MarginKind, MarginNode, Performance, Polarity};
pub use matrices::{AbsorptionMatrix, ImpactMatrix, TrialMatrix};
pub use network::{AbsorptionOutcome, Components, MarginNetwork, NetworkModel, SurrogateTraining};
pub use params::{ChangeDirection, DesignParam, FixedParam, InputSpec, SpecSource};
pub use series::SampleSeries;
pub use surrogate::PolynomialSurrogate;
