use plotters::prelude::*;
use thiserror::Error;

use crate::domain::analysis::NumericProjection;

#[derive(Error, Debug)]
pub enum SeriesPlotError {
    #[error("projection has no months to plot")]
    EmptySeries,
    #[error("failed to render series plot: {0}")]
    Plot(String),
}

/// Writes baseline and simulated series as a line chart PNG.
pub async fn write_series_png(output_path: &str, projection: &NumericProjection) -> Result<(), SeriesPlotError> {
    if projection.months.is_empty() {
        return Err(SeriesPlotError::EmptySeries);
    }
    let output_path = output_path.to_string();
    let projection = projection.clone();
    tokio::task::spawn_blocking(move || render_series_png(&output_path, &projection))
        .await
        .map_err(|e| SeriesPlotError::Plot(e.to_string()))??;
    Ok(())
}

fn value_range(projection: &NumericProjection) -> (f64, f64) {
    let values = projection
        .baseline_series
        .iter()
        .chain(projection.simulated_series.iter())
        .copied();
    let (min, max) = values.fold((0.0_f64, f64::NEG_INFINITY), |(min, max), value| {
        (min.min(value), max.max(value))
    });
    let max = if max <= min { min + 1.0 } else { max };
    let padding = (max - min) * 0.05;
    (min - padding, max + padding)
}

fn render_series_png(output_path: &str, projection: &NumericProjection) -> Result<(), SeriesPlotError> {
    let months = &projection.months;
    let (min_y, max_y) = value_range(projection);
    let max_x = months.len().saturating_sub(1).max(1) as i32;

    let root = BitMapBackend::new(output_path, (900, 600)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| SeriesPlotError::Plot(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption("Baseline vs Simulated Revenue", ("sans-serif", 30))
        .x_label_area_size(55)
        .y_label_area_size(90)
        .build_cartesian_2d(0..max_x, min_y..max_y)
        .map_err(|e| SeriesPlotError::Plot(e.to_string()))?;

    let label_count = months.len().clamp(1, 12);
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Month")
        .y_desc("Amount")
        .label_style(("sans-serif", 18))
        .axis_desc_style(("sans-serif", 22))
        .x_labels(label_count)
        .x_label_formatter(&|index| {
            if *index < 0 {
                return String::new();
            }
            months
                .get(*index as usize)
                .map(|month| month.chars().take(7).collect())
                .unwrap_or_default()
        })
        .draw()
        .map_err(|e| SeriesPlotError::Plot(e.to_string()))?;

    let baseline_color = RGBColor(30, 122, 204);
    let simulated_color = RGBColor(214, 92, 38);
    chart
        .draw_series(LineSeries::new(
            projection
                .baseline_series
                .iter()
                .enumerate()
                .map(|(idx, value)| (idx as i32, *value)),
            baseline_color.stroke_width(2),
        ))
        .map_err(|e| SeriesPlotError::Plot(e.to_string()))?
        .label("baseline")
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], baseline_color));
    chart
        .draw_series(LineSeries::new(
            projection
                .simulated_series
                .iter()
                .enumerate()
                .map(|(idx, value)| (idx as i32, *value)),
            simulated_color.stroke_width(2),
        ))
        .map_err(|e| SeriesPlotError::Plot(e.to_string()))?
        .label("simulated")
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], simulated_color));

    chart
        .configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.8))
        .draw()
        .map_err(|e| SeriesPlotError::Plot(e.to_string()))?;

    root.present()
        .map_err(|e| SeriesPlotError::Plot(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_projection;
    use assert_fs::prelude::*;
    use predicates::prelude::*;

    #[tokio::test]
    async fn write_series_png_creates_file() {
        let output_file = assert_fs::NamedTempFile::new("series.png").unwrap();

        write_series_png(output_file.path().to_str().unwrap(), &sample_projection())
            .await
            .unwrap();

        output_file.assert(predicate::path::exists());
        let metadata = std::fs::metadata(output_file.path()).unwrap();
        assert!(metadata.len() > 0);
    }

    #[tokio::test]
    async fn write_series_png_rejects_empty_projection() {
        let mut projection = sample_projection();
        projection.months.clear();
        let output_file = assert_fs::NamedTempFile::new("empty.png").unwrap();

        let error = write_series_png(output_file.path().to_str().unwrap(), &projection)
            .await
            .expect_err("expected empty series error");

        assert!(matches!(error, SeriesPlotError::EmptySeries));
    }

    #[test]
    fn flat_series_still_has_a_range() {
        let mut projection = sample_projection();
        projection.baseline_series = vec![0.0, 0.0, 0.0];
        projection.simulated_series = vec![0.0, 0.0, 0.0];

        let (min, max) = value_range(&projection);

        assert!(max > min);
    }
}
