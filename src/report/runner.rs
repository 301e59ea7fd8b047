//! The two-cycle simulation report.

use super::boxplot::{render_boxplot, BoxStats};
use super::plot::{draw_boxplot_svg, BoxPanel};
use super::table::ResultTable;
use crate::error::Result;
use crate::model::CovStructKind;
use crate::simulate::{Hypothesis, Simulation, SimulationConfig, SimulationResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default plot width in characters.
pub const DEFAULT_PLOT_WIDTH: usize = 60;

/// H0 and H1 results for one working structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportCycle {
    pub cov_struct: CovStructKind,
    pub n_reps: usize,
    pub table: ResultTable,
    /// Scale summaries in the order null|H0, alt|H0, null|H1, alt|H1.
    pub scale_boxes: Vec<BoxStats>,
    pub null: SimulationResult,
    pub alt: SimulationResult,
}

impl ReportCycle {
    /// Run both hypotheses with one working structure.
    pub fn run(sim: &Simulation, cov_struct: CovStructKind, n_reps: usize) -> Result<Self> {
        log::info!(
            "report cycle: {} working structure, {} replicates",
            cov_struct,
            n_reps
        );
        let null = sim.dosim(Hypothesis::Null, cov_struct, n_reps)?;
        let alt = sim.dosim(Hypothesis::Alternative, cov_struct, n_reps)?;

        let table = ResultTable::from_results(sim.config().threshold, &[&null, &alt]);
        let scale_boxes = vec![
            BoxStats::from_values("null|H0", &null.scales_null)?,
            BoxStats::from_values("alt|H0", &null.scales_alt)?,
            BoxStats::from_values("null|H1", &alt.scales_null)?,
            BoxStats::from_values("alt|H1", &alt.scales_alt)?,
        ];

        Ok(Self {
            cov_struct,
            n_reps,
            table,
            scale_boxes,
            null,
            alt,
        })
    }

    pub fn result(&self, hypothesis: Hypothesis) -> &SimulationResult {
        match hypothesis {
            Hypothesis::Null => &self.null,
            Hypothesis::Alternative => &self.alt,
        }
    }

    /// Table followed by the scale box plot.
    pub fn to_text(&self, width: usize) -> String {
        let mut text = format!(
            "Working structure: {} ({} replicates)\n\n",
            self.cov_struct, self.n_reps
        );
        text.push_str(&self.table.to_string());
        if let Some(a) = self.null.mean_dep_param() {
            text.push_str(&format!("Mean working correlation (null fit, H0): {:.4}\n", a));
        }
        text.push('\n');
        text.push_str(&render_boxplot("Estimated scale", &self.scale_boxes, width));
        text
    }
}

/// Full report: independence first, then exchangeable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub config: SimulationConfig,
    pub cycles: Vec<ReportCycle>,
}

impl Report {
    pub fn cycle(&self, cov_struct: CovStructKind) -> Option<&ReportCycle> {
        self.cycles.iter().find(|c| c.cov_struct == cov_struct)
    }

    pub fn to_text(&self, width: usize) -> String {
        self.cycles
            .iter()
            .map(|c| c.to_text(width))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Draw the scale box plots of every cycle into one SVG, one panel per cycle.
    pub fn save_plot(&self, path: &Path, size: (u32, u32)) -> Result<()> {
        let captions: Vec<String> = self
            .cycles
            .iter()
            .map(|c| format!("{} ({} replicates)", c.cov_struct, c.n_reps))
            .collect();
        let panels: Vec<BoxPanel<'_>> = self
            .cycles
            .iter()
            .zip(&captions)
            .map(|(c, caption)| BoxPanel {
                caption: caption.as_str(),
                boxes: &c.scale_boxes,
            })
            .collect();
        draw_boxplot_svg(path, &panels, size)
    }
}

/// Run the independence and exchangeable cycles on one fixed design.
pub fn run_report(config: &SimulationConfig) -> Result<Report> {
    let sim = Simulation::new(config.clone())?;

    let plan = [
        (CovStructKind::Independence, config.independence_reps),
        (CovStructKind::Exchangeable, config.exchangeable_reps),
    ];
    let cycles = plan
        .iter()
        .map(|&(kind, reps)| ReportCycle::run(&sim, kind, reps))
        .collect::<Result<Vec<_>>>()?;

    Ok(Report {
        config: config.clone(),
        cycles,
    })
}
