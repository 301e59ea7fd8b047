//! Box plot summaries of the scale estimates, rendered as text.

use crate::error::{SimError, Result};
use serde::{Deserialize, Serialize};

/// Narrowest plot area accepted by [`render_boxplot`].
const MIN_WIDTH: usize = 20;

/// Five-number summary with Tukey whiskers.
///
/// Quartiles use linear interpolation between order statistics. Whiskers
/// reach the most extreme values within 1.5 IQR of the box; anything
/// beyond is an outlier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxStats {
    pub label: String,
    pub n: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub whisker_low: f64,
    pub whisker_high: f64,
    pub outliers: Vec<f64>,
}

impl BoxStats {
    pub fn from_values(label: impl Into<String>, values: &[f64]) -> Result<Self> {
        let label = label.into();
        if values.is_empty() {
            return Err(SimError::EmptyData(format!("no values for box '{}'", label)));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(SimError::Numerical(format!(
                "non-finite value in box '{}'",
                label
            )));
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let q1 = quantile(&sorted, 0.25);
        let median = quantile(&sorted, 0.5);
        let q3 = quantile(&sorted, 0.75);
        let iqr = q3 - q1;
        let lo_fence = q1 - 1.5 * iqr;
        let hi_fence = q3 + 1.5 * iqr;

        let whisker_low = sorted
            .iter()
            .copied()
            .find(|&v| v >= lo_fence)
            .unwrap_or(q1);
        let whisker_high = sorted
            .iter()
            .rev()
            .copied()
            .find(|&v| v <= hi_fence)
            .unwrap_or(q3);
        let outliers = sorted
            .iter()
            .copied()
            .filter(|&v| v < lo_fence || v > hi_fence)
            .collect();

        Ok(Self {
            label,
            n: sorted.len(),
            min: sorted[0],
            q1,
            median,
            q3,
            max: sorted[sorted.len() - 1],
            whisker_low,
            whisker_high,
            outliers,
        })
    }

    pub fn n_outliers(&self) -> usize {
        self.outliers.len()
    }
}

/// Quantile of sorted data, linear between order statistics.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Draw horizontal box plots on a shared axis, one row per box.
///
/// `|` marks whisker ends, `[` and `]` the quartiles, `#` the box
/// body, `M` the median and `o` outliers.
pub fn render_boxplot(title: &str, boxes: &[BoxStats], width: usize) -> String {
    let width = width.max(MIN_WIDTH);
    let mut out = String::new();
    out.push_str(title);
    out.push('\n');
    if boxes.is_empty() {
        return out;
    }

    let lo = boxes.iter().map(|b| b.min).fold(f64::INFINITY, f64::min);
    let hi = boxes.iter().map(|b| b.max).fold(f64::NEG_INFINITY, f64::max);
    let pos = |v: f64| -> usize {
        if hi > lo {
            (((v - lo) / (hi - lo)) * (width - 1) as f64).round() as usize
        } else {
            width / 2
        }
    };
    let label_w = boxes.iter().map(|b| b.label.len()).max().unwrap_or(0);

    for b in boxes {
        let mut row = vec![' '; width];
        let (wl, q1, med, q3, wh) = (
            pos(b.whisker_low),
            pos(b.q1),
            pos(b.median),
            pos(b.q3),
            pos(b.whisker_high),
        );
        for cell in row.iter_mut().take(q1).skip(wl) {
            *cell = '-';
        }
        for cell in row.iter_mut().take(wh + 1).skip(q3) {
            *cell = '-';
        }
        for cell in row.iter_mut().take(q3 + 1).skip(q1) {
            *cell = '#';
        }
        row[wl] = '|';
        row[wh] = '|';
        row[q1] = '[';
        row[q3] = ']';
        row[med] = 'M';
        for &v in &b.outliers {
            row[pos(v)] = 'o';
        }

        let line: String = row.into_iter().collect();
        out.push_str(&format!("{:>label_w$} {}\n", b.label, line.trim_end()));
    }

    let lo_text = format!("{:.3}", lo);
    let hi_text = format!("{:.3}", hi);
    let gap = width.saturating_sub(lo_text.len() + hi_text.len()).max(1);
    out.push_str(&format!(
        "{:label_w$} {}{}{}\n",
        "",
        lo_text,
        " ".repeat(gap),
        hi_text
    ));
    out
}
