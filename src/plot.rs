//! Dual-axis chart rendering for the plot request.
//!
//! Temperature is drawn in blue against the primary y axis, humidity in red
//! against the secondary one, both over seconds elapsed since the oldest
//! retained sample. The chart goes through a scratch PNG file on disk and is
//! returned as raw bytes ready to be sent as a photo.

use plotters::prelude::*;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::coordinator::state::Series;

const WIDTH: u32 = 800;
const HEIGHT: u32 = 480;

#[derive(Debug, thiserror::Error)]
pub enum PlotError {
    #[error("chart drawing failed: {0}")]
    Draw(String),

    #[error("failed to handle scratch image file: {0}")]
    Io(#[from] std::io::Error),
}

pub fn render(temperature: &Series, humidity: &Series) -> Result<Vec<u8>, PlotError> {
    let path = scratch_path();
    draw(&path, temperature, humidity)?;
    let bytes = std::fs::read(&path)?;
    let _ = std::fs::remove_file(&path);
    Ok(bytes)
}

fn scratch_path() -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("termobot-plot-{}-{seq}.png", std::process::id()))
}

fn draw(path: &Path, temperature: &Series, humidity: &Series) -> Result<(), PlotError> {
    // both series share one time origin so the axes line up
    let origin = match (temperature.first_at(), humidity.first_at()) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => chrono::Local::now(),
    };
    let temp_points: Vec<(f64, f64)> = temperature
        .iter()
        .map(|(v, at)| (seconds_since(origin, *at), *v))
        .collect();
    let hum_points: Vec<(f64, f64)> = humidity
        .iter()
        .map(|(v, at)| (seconds_since(origin, *at), *v))
        .collect();

    let x_max = temp_points
        .iter()
        .chain(hum_points.iter())
        .map(|(x, _)| *x)
        .fold(0.0_f64, f64::max)
        .max(1.0);

    let root = BitMapBackend::new(path, (WIDTH, HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(to_draw_error)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .x_label_area_size(30)
        .y_label_area_size(40)
        .right_y_label_area_size(40)
        .build_cartesian_2d(0.0..x_max, value_range(&temp_points))
        .map_err(to_draw_error)?
        .set_secondary_coord(0.0..x_max, value_range(&hum_points));

    chart
        .draw_series(LineSeries::new(temp_points, &BLUE).point_size(2))
        .map_err(to_draw_error)?;
    chart
        .draw_secondary_series(LineSeries::new(hum_points, &RED).point_size(2))
        .map_err(to_draw_error)?;

    root.present().map_err(to_draw_error)?;
    Ok(())
}

fn seconds_since(origin: chrono::DateTime<chrono::Local>, at: chrono::DateTime<chrono::Local>) -> f64 {
    (at - origin).num_milliseconds() as f64 / 1000.0
}

fn value_range(points: &[(f64, f64)]) -> Range<f64> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for (_, v) in points {
        min = min.min(*v);
        max = max.max(*v);
    }
    if !min.is_finite() || !max.is_finite() {
        return 0.0..1.0;
    }
    // keep flat series away from the chart border
    let pad = ((max - min) * 0.1).max(0.5);
    (min - pad)..(max + pad)
}

fn to_draw_error<E: std::fmt::Display>(e: E) -> PlotError {
    PlotError::Draw(e.to_string())
}
