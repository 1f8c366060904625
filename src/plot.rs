//! Plotting training curves and tabular data
//!
//! By convention class 0 is plotted in red and class 1 in blue.

use std::error::Error;

use plotters::{
    chart::ChartBuilder,
    prelude::{BitMapBackend, Circle, IntoDrawingArea},
    series::LineSeries,
    style::{BLUE, Color, RED, WHITE},
};

use crate::tabular::Table;

/// Plots a per-epoch loss curve as a line chart
pub fn plot_loss_curve(losses: &[f32], file_name: &str, title: &str) -> Result<(), Box<dyn Error>> {
    if losses.is_empty() {
        log::warn!("no losses to plot, skipping '{}'", file_name);
        return Ok(());
    }
    let root_area = BitMapBackend::new(file_name, (640, 480)).into_drawing_area();
    root_area.fill(&WHITE)?;

    let max_loss = losses.iter().copied().fold(f32::MIN, f32::max);
    let y_max = if max_loss > 0.0 { max_loss * 1.05 } else { 1.0 };

    let mut chart = ChartBuilder::on(&root_area)
        .caption(title, ("sans-serif", 40))
        .margin(20)
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(0f32..losses.len() as f32, 0f32..y_max)?;

    chart
        .configure_mesh()
        .x_desc("epoch")
        .y_desc("loss")
        .draw()?;

    chart.draw_series(LineSeries::new(
        losses.iter().enumerate().map(|(i, &l)| (i as f32, l)),
        &BLUE,
    ))?;

    root_area.present()?;
    log::info!("loss curve saved to '{}'", file_name);
    Ok(())
}

/// Scatters two feature columns of a table, colored by a binary label column
pub fn plot_tabular(
    table: &Table,
    x_col: &str,
    y_col: &str,
    label_col: &str,
    file_name: &str,
) -> Result<(), Box<dyn Error>> {
    let xs = table.column(x_col)?;
    let ys = table.column(y_col)?;
    let labels = table.column(label_col)?;

    let pad = |min: f32, max: f32| {
        let margin = ((max - min) * 0.05).max(0.1);
        (min - margin, max + margin)
    };
    let (x_min, x_max) = pad(
        xs.iter().copied().fold(f32::INFINITY, f32::min),
        xs.iter().copied().fold(f32::NEG_INFINITY, f32::max),
    );
    let (y_min, y_max) = pad(
        ys.iter().copied().fold(f32::INFINITY, f32::min),
        ys.iter().copied().fold(f32::NEG_INFINITY, f32::max),
    );

    let root_area = BitMapBackend::new(file_name, (640, 480)).into_drawing_area();
    root_area.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root_area)
        .caption(
            format!("{} vs {} by {}", x_col, y_col, label_col),
            ("sans-serif", 40),
        )
        .margin(20)
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart.configure_mesh().x_desc(x_col).y_desc(y_col).draw()?;

    chart.draw_series(xs.iter().zip(ys.iter()).zip(labels.iter()).map(
        |((&x, &y), &label)| {
            let color = if label > 0.5 { BLUE } else { RED };
            Circle::new((x, y), 3, color.filled())
        },
    ))?;

    root_area.present()?;
    log::info!("data plot saved to '{}'", file_name);
    Ok(())
}
