//! GEE mean models and working correlation structures.

pub mod cov_struct;
pub mod gee;

pub use cov_struct::{CovStruct, CovStructKind};
pub use gee::{GeeFit, GeeModel, ScaleMethod};
