//! H0/H1 summary table.

use crate::simulate::SimulationResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One row of a [`ResultTable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub label: String,
    pub mean_p_value: f64,
    pub rejection_rate: f64,
}

/// Mean p-value and rejection rate per hypothesis.
///
/// Displays as a right-aligned text table with columns `Mean` and
/// `Prop(p<threshold)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub threshold: f64,
    pub rows: Vec<TableRow>,
}

impl ResultTable {
    /// Build a table with one row per simulation result, in order.
    pub fn from_results(threshold: f64, results: &[&SimulationResult]) -> Self {
        let rows = results
            .iter()
            .map(|r| TableRow {
                label: r.hypothesis.label().to_string(),
                mean_p_value: r.mean_p_value(),
                rejection_rate: r.rejection_rate(),
            })
            .collect();
        Self { threshold, rows }
    }

    pub fn row(&self, label: &str) -> Option<&TableRow> {
        self.rows.iter().find(|r| r.label == label)
    }

    fn prop_header(&self) -> String {
        format!("Prop(p<{})", self.threshold)
    }
}

impl fmt::Display for ResultTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mean_header = "Mean";
        let prop_header = self.prop_header();

        let label_w = self.rows.iter().map(|r| r.label.len()).max().unwrap_or(0);
        let cells: Vec<(String, String)> = self
            .rows
            .iter()
            .map(|r| {
                (
                    format!("{:.6}", r.mean_p_value),
                    format!("{:.6}", r.rejection_rate),
                )
            })
            .collect();
        let mean_w = cells
            .iter()
            .map(|c| c.0.len())
            .chain(std::iter::once(mean_header.len()))
            .max()
            .unwrap_or(0);
        let prop_w = cells
            .iter()
            .map(|c| c.1.len())
            .chain(std::iter::once(prop_header.len()))
            .max()
            .unwrap_or(0);

        writeln!(
            f,
            "{:label_w$}  {:>mean_w$}  {:>prop_w$}",
            "", mean_header, prop_header
        )?;
        for (row, (mean, prop)) in self.rows.iter().zip(&cells) {
            writeln!(
                f,
                "{:<label_w$}  {:>mean_w$}  {:>prop_w$}",
                row.label, mean, prop
            )?;
        }
        Ok(())
    }
}
