use anyhow::{Result, anyhow};
use plotters::prelude::*;
use std::path::Path;

const CHART_WIDTH: u32 = 1000;
const CHART_HEIGHT: u32 = 600;

/// Renders a vertical bar chart of category counts to a PNG file.
/// The caller decides which (and how many) rows to chart.
pub fn bar_chart(path: &Path, title: &str, rows: &[(String, u64)]) -> Result<()> {
    if rows.is_empty() {
        return Err(anyhow!("no data to chart"));
    }
    let max_count = rows.iter().map(|(_, count)| *count).max().unwrap_or(0);

    let root = BitMapBackend::new(path, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| anyhow!("filling chart background: {e}"))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(140)
        .y_label_area_size(60)
        .build_cartesian_2d(0usize..rows.len(), 0u64..max_count + 1)
        .map_err(|e| anyhow!("building chart axes: {e}"))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(rows.len())
        .x_label_formatter(&|index| {
            rows.get(*index)
                .map(|(label, _)| label.clone())
                .unwrap_or_default()
        })
        .draw()
        .map_err(|e| anyhow!("drawing chart mesh: {e}"))?;

    chart
        .draw_series(rows.iter().enumerate().map(|(index, (_, count))| {
            Rectangle::new([(index, 0), (index + 1, *count)], BLUE.filled())
        }))
        .map_err(|e| anyhow!("drawing chart bars: {e}"))?;

    root.present()
        .map_err(|e| anyhow!("writing chart to {}: {e}", path.display()))?;
    Ok(())
}
