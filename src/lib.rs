//! Robust GEE Score Test Simulation Library
//!
//! Monte Carlo calibration of the robust score test for nested Poisson GEE
//! mean models, on clustered and overdispersed counts.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Design matrices and cluster labels
//! - **model**: GEE Poisson fitting with working correlation structures
//! - **test**: Robust score test for nested models
//! - **simulate**: Copula uniforms, negative binomial counts, Monte Carlo driver
//! - **report**: Result tables and scale box plots (text and SVG)
//!
//! # Example
//!
//! ```no_run
//! use gee_score_sim::prelude::*;
//!
//! let config = SimulationConfig::default().with_reps(200, 50);
//! let sim = Simulation::new(config).unwrap();
//!
//! let null = sim
//!     .dosim(Hypothesis::Null, CovStructKind::Independence, 200)
//!     .unwrap();
//! println!("Type I error at 0.1: {:.3}", null.rejection_rate());
//! ```

pub mod data;
pub mod error;
pub mod model;
pub mod report;
pub mod simulate;
pub mod test;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::data::{DesignMatrix, Groups};
    pub use crate::error::{Result, SimError};
    pub use crate::model::{CovStruct, CovStructKind, GeeFit, GeeModel, ScaleMethod};
    pub use crate::report::{
        draw_boxplot_svg, render_boxplot, run_report, BoxPanel, BoxStats, Report, ReportCycle,
        ResultTable, DEFAULT_PLOT_SIZE, DEFAULT_PLOT_WIDTH,
    };
    pub use crate::simulate::{
        correlated_uniforms, negbinom, poisson_quantile, Hypothesis, Simulation,
        SimulationConfig, SimulationResult,
    };
    pub use crate::test::{compare_score_test, ScoreTestResult};
}
