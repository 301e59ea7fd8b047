//! Data structures shared by the models and the simulation.

mod design_matrix;
mod groups;

pub use design_matrix::DesignMatrix;
pub use groups::Groups;
