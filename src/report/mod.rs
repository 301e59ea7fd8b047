//! Tables and box plots summarizing simulation runs.

mod boxplot;
mod plot;
mod runner;
mod table;

pub use boxplot::{render_boxplot, BoxStats};
pub use plot::{draw_boxplot_svg, BoxPanel, DEFAULT_PLOT_SIZE};
pub use runner::{run_report, Report, ReportCycle, DEFAULT_PLOT_WIDTH};
pub use table::{ResultTable, TableRow};
