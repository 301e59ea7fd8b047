//! SVG box plots of the scale estimates.

use super::boxplot::BoxStats;
use crate::error::{SimError, Result};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::Path;

/// Default canvas size in pixels.
pub const DEFAULT_PLOT_SIZE: (u32, u32) = (1200, 500);

/// Horizontal units per box; box centers sit on multiples of this.
const SLOT: i32 = 10;
const HALF_BOX: i32 = 3;
const HALF_CAP: i32 = 2;

/// One chart panel: a caption and the boxes drawn in it, left to right.
#[derive(Debug, Clone, Copy)]
pub struct BoxPanel<'a> {
    pub caption: &'a str,
    pub boxes: &'a [BoxStats],
}

fn plot_err<E: std::fmt::Display>(e: E) -> SimError {
    SimError::Plot(e.to_string())
}

/// Draw the panels side by side into an SVG file at `path`.
///
/// Each box shows the quartiles, a red median line, whiskers with caps and
/// outliers as open circles, on a y-axis labelled "Estimated scale".
pub fn draw_boxplot_svg(path: &Path, panels: &[BoxPanel<'_>], size: (u32, u32)) -> Result<()> {
    if panels.is_empty() || panels.iter().any(|p| p.boxes.is_empty()) {
        return Err(SimError::EmptyData(
            "box plot needs at least one panel with one box".to_string(),
        ));
    }

    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let areas = root.split_evenly((1, panels.len()));
    for (area, panel) in areas.iter().zip(panels) {
        draw_panel(area, panel)?;
    }

    root.present().map_err(plot_err)?;
    log::info!("wrote scale box plot to {}", path.display());
    Ok(())
}

fn draw_panel(area: &DrawingArea<SVGBackend<'_>, Shift>, panel: &BoxPanel<'_>) -> Result<()> {
    let lo = panel.boxes.iter().map(|b| b.min).fold(f64::INFINITY, f64::min);
    let hi = panel.boxes.iter().map(|b| b.max).fold(f64::NEG_INFINITY, f64::max);
    let pad = if hi > lo { 0.05 * (hi - lo) } else { 1.0 };
    let n = panel.boxes.len() as i32;

    let mut chart = ChartBuilder::on(area)
        .caption(panel.caption, ("sans-serif", 18))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-SLOT / 2..n * SLOT - SLOT / 2, (lo - pad)..(hi + pad))
        .map_err(plot_err)?;

    let labels: Vec<&str> = panel.boxes.iter().map(|b| b.label.as_str()).collect();
    chart
        .configure_mesh()
        .disable_x_mesh()
        .y_desc("Estimated scale")
        .x_labels(2 * panel.boxes.len() + 1)
        .x_label_formatter(&|x| {
            if x.rem_euclid(SLOT) == 0 {
                labels
                    .get((x / SLOT) as usize)
                    .map(|l| l.to_string())
                    .unwrap_or_default()
            } else {
                String::new()
            }
        })
        .draw()
        .map_err(plot_err)?;

    for (i, b) in panel.boxes.iter().enumerate() {
        let cx = i as i32 * SLOT;
        let corners = [(cx - HALF_BOX, b.q1), (cx + HALF_BOX, b.q3)];

        chart
            .draw_series(std::iter::once(Rectangle::new(
                corners,
                BLUE.mix(0.2).filled(),
            )))
            .map_err(plot_err)?;
        chart
            .draw_series(std::iter::once(Rectangle::new(corners, BLUE.stroke_width(1))))
            .map_err(plot_err)?;

        chart
            .draw_series(vec![
                PathElement::new(vec![(cx, b.q3), (cx, b.whisker_high)], BLACK),
                PathElement::new(vec![(cx, b.q1), (cx, b.whisker_low)], BLACK),
                PathElement::new(
                    vec![(cx - HALF_CAP, b.whisker_high), (cx + HALF_CAP, b.whisker_high)],
                    BLACK,
                ),
                PathElement::new(
                    vec![(cx - HALF_CAP, b.whisker_low), (cx + HALF_CAP, b.whisker_low)],
                    BLACK,
                ),
            ])
            .map_err(plot_err)?;
        chart
            .draw_series(std::iter::once(PathElement::new(
                vec![(cx - HALF_BOX, b.median), (cx + HALF_BOX, b.median)],
                RED.stroke_width(2),
            )))
            .map_err(plot_err)?;

        chart
            .draw_series(
                b.outliers
                    .iter()
                    .map(|&v| Circle::new((cx, v), 3, BLACK.stroke_width(1))),
            )
            .map_err(plot_err)?;
    }

    Ok(())
}
