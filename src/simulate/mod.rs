//! Data generation and the Monte Carlo driver.
//!
//! - [`config`]: fixed parameters of a run
//! - [`copula`]: clustered uniforms from a Gaussian copula
//! - [`negbinom`]: negative binomial counts from those uniforms
//! - [`driver`]: repeated generate, fit and test cycles

pub mod config;
pub mod copula;
pub mod driver;
pub mod negbinom;

pub use config::SimulationConfig;
pub use copula::correlated_uniforms;
pub use driver::{Hypothesis, Replicate, Simulation, SimulationResult};
pub use negbinom::{negbinom, poisson_quantile};
