//! Plotting sink.
//!
//! Sessions never draw anything themselves; they hand plot data to a
//! [`Plotter`] attached with `Session::with_plotter`.

use serde::{Deserialize, Serialize};
use tracing::info;

/// One scatter/line point in original (denormalized) units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlotPoint {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisLabels {
    pub x: String,
    pub y: String,
}

pub trait Plotter: Send {
    /// Render every series on one chart. `labels[i]` names `series[i]`.
    fn scatter(&mut self, title: &str, series: &[Vec<PlotPoint>], labels: &[&str], axes: &AxisLabels);

    /// Render a bar chart of `(label, value)` pairs.
    fn bars(&mut self, title: &str, bars: &[(String, f32)]);
}

/// Writes a one-line summary of every chart to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPlotter;

impl Plotter for LogPlotter {
    fn scatter(&mut self, title: &str, series: &[Vec<PlotPoint>], labels: &[&str], axes: &AxisLabels) {
        for (points, label) in series.iter().zip(labels) {
            info!(
                title,
                series = label,
                points = points.len(),
                x_axis = %axes.x,
                y_axis = %axes.y,
                "scatter"
            );
        }
    }

    fn bars(&mut self, title: &str, bars: &[(String, f32)]) {
        for (label, value) in bars {
            info!(title, bar = %label, value, "bar");
        }
    }
}
