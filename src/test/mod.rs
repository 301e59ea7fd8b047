//! Statistical hypothesis testing for nested GEE models.

pub mod score;

pub use score::{compare_score_test, ScoreTestResult};
