//! Report charts using Plotters: feature importance bars and fraud distribution pie

use std::path::Path;

use anyhow::bail;
use plotters::element::Pie;
use plotters::prelude::*;

/// Number of features shown in the importance chart
pub const TOP_FEATURES: usize = 10;

const IMPORTANCE_BLUE: RGBColor = RGBColor(0x00, 0x7b, 0xff);
const NOT_FRAUD_GREEN: RGBColor = RGBColor(0x28, 0xa7, 0x45);
const FRAUD_RED: RGBColor = RGBColor(0xdc, 0x35, 0x45);

/// Highest-scoring `k` features, ascending by importance
///
/// Ties keep their input order. Returns every feature when there are fewer
/// than `k`.
pub fn top_importances(names: &[String], importances: &[f64], k: usize) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = names
        .iter()
        .cloned()
        .zip(importances.iter().copied())
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    let keep_from = ranked.len().saturating_sub(k);
    ranked.split_off(keep_from)
}

/// Pie slice colours, assigned in slice order
const SLICE_COLORS: [RGBColor; 2] = [NOT_FRAUD_GREEN, FRAUD_RED];

/// Colour of the pie slice at `rank`, counting from the most frequent label
pub fn slice_color(rank: usize) -> RGBColor {
    SLICE_COLORS[rank % SLICE_COLORS.len()]
}

/// Horizontal bar chart of the given (feature, importance) pairs
///
/// `top` is expected in ascending order, so the most important feature ends
/// up as the top bar.
pub fn create_feature_importance_chart(
    top: &[(String, f64)],
    output_path: &Path,
) -> crate::Result<()> {
    if top.is_empty() {
        bail!("no feature importances to plot");
    }

    let max_importance = top.iter().map(|(_, value)| *value).fold(0.0, f64::max);
    let x_max = if max_importance > 0.0 {
        max_importance * 1.1
    } else {
        1.0
    };

    let root = BitMapBackend::new(output_path, (1000, 700)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Top 10 Key Fraud Indicators", ("sans-serif", 30))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(230)
        .build_cartesian_2d(0f64..x_max, (0..top.len()).into_segmented())?;

    chart
        .configure_mesh()
        .disable_y_mesh()
        .x_desc("Importance")
        .axis_desc_style(("sans-serif", 18))
        .y_labels(top.len())
        .y_label_formatter(&|value| match value {
            SegmentValue::CenterOf(index) => top
                .get(*index)
                .map(|(name, _)| name.clone())
                .unwrap_or_default(),
            _ => String::new(),
        })
        .draw()?;

    chart.draw_series(top.iter().enumerate().map(|(index, (_, importance))| {
        let mut bar = Rectangle::new(
            [
                (0.0, SegmentValue::Exact(index)),
                (*importance, SegmentValue::Exact(index + 1)),
            ],
            IMPORTANCE_BLUE.filled(),
        );
        bar.set_margin(6, 6, 0, 0);
        bar
    }))?;

    root.present()?;
    tracing::debug!(path = %output_path.display(), "feature importance chart saved");

    Ok(())
}

/// Pie chart of predicted label counts with percentage annotations
///
/// `counts` is expected most frequent first; slices take green then red in
/// that order. Labels with a zero count are expected to be left out by the
/// caller; an all-zero distribution renders the title only.
pub fn create_fraud_distribution_chart(
    counts: &[(String, usize)],
    output_path: &Path,
) -> crate::Result<()> {
    let root = BitMapBackend::new(output_path, (800, 800)).into_drawing_area();
    root.fill(&WHITE)?;
    let area = root.titled(
        "Distribution of Predicted Fraudulent Providers",
        ("sans-serif", 30),
    )?;

    let total: usize = counts.iter().map(|(_, count)| count).sum();
    if total > 0 {
        let (width, height) = area.dim_in_pixel();
        let center = (width as i32 / 2, height as i32 / 2);
        let radius = f64::from(width.min(height)) * 0.38;

        let sizes: Vec<f64> = counts.iter().map(|(_, count)| *count as f64).collect();
        let colors: Vec<RGBColor> = (0..counts.len()).map(slice_color).collect();
        let labels: Vec<&str> = counts.iter().map(|(label, _)| label.as_str()).collect();

        let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
        pie.start_angle(90.0);
        pie.label_style(("sans-serif", 26).into_font().color(&BLACK));
        pie.percentages(("sans-serif", radius * 0.09).into_font().color(&WHITE));
        area.draw(&pie)?;
    }

    root.present()?;
    tracing::debug!(path = %output_path.display(), "fraud distribution chart saved");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn names(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("feature_{i}")).collect()
    }

    #[test]
    fn test_top_importances_truncates_to_k() {
        let names = names(14);
        let importances: Vec<f64> = (0..14).map(|i| ((i * 3) % 14) as f64).collect();

        let top = top_importances(&names, &importances, TOP_FEATURES);
        assert_eq!(top.len(), 10);
        let values: Vec<f64> = top.iter().map(|(_, value)| *value).collect();
        assert_eq!(values, (4..14).map(|v| v as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_top_importances_fewer_than_k() {
        let names = names(6);
        let importances = [0.3, 0.1, 0.25, 0.05, 0.2, 0.1];

        let top = top_importances(&names, &importances, TOP_FEATURES);
        assert_eq!(top.len(), 6);
        assert_eq!(top.first().unwrap().0, "feature_3");
        assert_eq!(top.last().unwrap().0, "feature_0");
        assert!(top.windows(2).all(|pair| pair[0].1 <= pair[1].1));
    }

    #[test]
    fn test_slice_colors_follow_rank() {
        assert_eq!(slice_color(0), RGBColor(0x28, 0xa7, 0x45));
        assert_eq!(slice_color(1), RGBColor(0xdc, 0x35, 0x45));
    }

    #[test]
    fn test_create_feature_importance_chart() {
        let temp_dir = tempdir().unwrap();
        let output_path = temp_dir.path().join("feature_importance.png");
        let top = top_importances(&names(6), &[0.1, 0.3, 0.2, 0.15, 0.05, 0.2], TOP_FEATURES);

        create_feature_importance_chart(&top, &output_path).unwrap();
        assert!(output_path.exists());
    }

    #[test]
    fn test_feature_importance_chart_rejects_empty() {
        let temp_dir = tempdir().unwrap();
        let output_path = temp_dir.path().join("empty.png");
        assert!(create_feature_importance_chart(&[], &output_path).is_err());
    }

    #[test]
    fn test_create_fraud_distribution_chart() {
        let temp_dir = tempdir().unwrap();
        let output_path = temp_dir.path().join("fraud_distribution.png");
        let counts = vec![("No".to_string(), 7), ("Yes".to_string(), 3)];

        create_fraud_distribution_chart(&counts, &output_path).unwrap();
        assert!(output_path.exists());
    }

    #[test]
    fn test_fraud_majority_distribution_chart() {
        let temp_dir = tempdir().unwrap();
        let output_path = temp_dir.path().join("fraud_majority.png");
        // "Yes" leads, so it takes the first slice colour
        let counts = vec![("Yes".to_string(), 5), ("No".to_string(), 2)];

        create_fraud_distribution_chart(&counts, &output_path).unwrap();
        assert!(output_path.exists());
    }
}
