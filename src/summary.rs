//! Rebuild the popularity-bin summary table from the per-track table.
//!
//! Tracks are assigned with the half-open rule of [`PopularityBin::assign`]
//! (`[0,25)`, `[25,50)`, `[50,75)`, `[75,100]`), not the inclusive bounds the
//! live views filter with.

use std::path::Path;

use polars::prelude::*;
use thiserror::Error;

use crate::format::round2;
use crate::store::{self, PopularityBin, f64_values, i64_values};

#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
    #[error("track table has no popularity column")]
    NoPopularity,
}

pub type Result<T> = std::result::Result<T, SummaryError>;

/// Metrics averaged per bin, in output column order.
pub const SUMMARY_METRICS: &[&str] = &[
    "popularity",
    "duration_min",
    "danceability",
    "energy",
    "key",
    "loudness",
    "mode",
    "speechiness",
    "acousticness",
    "instrumentalness",
    "liveness",
    "valence",
];

const BIN_CODE: &str = "popularity_bin_code";

fn assignment_predicate(bin: PopularityBin) -> Expr {
    let (lower, upper) = bin.bounds();
    let above = col("popularity").gt_eq(lit(lower));
    if bin == PopularityBin::TOP {
        above.and(col("popularity").lt_eq(lit(upper)))
    } else {
        above.and(col("popularity").lt(lit(upper)))
    }
}

/// Group tracks by bin and average every summary metric.
///
/// Output columns: `popularity_bin`, `popularity_bin_code`, `count`, then the
/// metrics of [`SUMMARY_METRICS`] the track table carries, each rounded to
/// two decimals. There is always one row per bin, in bin order; a bin without
/// tracks has a zero count and null means.
pub fn build_summary(tracks: &DataFrame) -> Result<DataFrame> {
    if tracks.column("popularity").is_err() {
        return Err(SummaryError::NoPopularity);
    }

    let metrics: Vec<&str> = SUMMARY_METRICS
        .iter()
        .copied()
        .filter(|m| {
            let present = tracks.column(m).is_ok();
            if !present {
                log::warn!("Track table has no {} column; leaving it out of the summary", m);
            }
            present
        })
        .collect();

    let [low, mid_low, mid_high, high] = PopularityBin::ALL;
    let code = when(assignment_predicate(low))
        .then(lit(low.code()))
        .when(assignment_predicate(mid_low))
        .then(lit(mid_low.code()))
        .when(assignment_predicate(mid_high))
        .then(lit(mid_high.code()))
        .when(assignment_predicate(high))
        .then(lit(high.code()))
        .otherwise(lit(-1i64))
        .alias(BIN_CODE);

    let mut aggs = vec![len().cast(DataType::Int64).alias("count")];
    aggs.extend(
        metrics
            .iter()
            .map(|m| col(*m).cast(DataType::Float64).mean().alias(*m)),
    );

    let grouped = tracks
        .clone()
        .lazy()
        .with_column(code)
        .filter(col(BIN_CODE).gt_eq(lit(0i64)))
        .group_by([col(BIN_CODE)])
        .agg(aggs)
        .sort([BIN_CODE], SortMultipleOptions::default())
        .collect()?;

    let grouped_codes = i64_values(&grouped, BIN_CODE)?;
    let grouped_counts = i64_values(&grouped, "count")?;
    let rows: Vec<Option<usize>> = PopularityBin::ALL
        .iter()
        .map(|bin| grouped_codes.iter().position(|c| *c == Some(bin.code())))
        .collect();

    let labels: Vec<&str> = PopularityBin::ALL.iter().map(|b| b.label()).collect();
    let codes: Vec<i64> = PopularityBin::ALL.iter().map(|b| b.code()).collect();
    let counts: Vec<i64> = rows
        .iter()
        .map(|row| row.and_then(|i| grouped_counts[i]).unwrap_or(0))
        .collect();

    let mut columns = vec![
        Column::new("popularity_bin".into(), labels),
        Column::new(BIN_CODE.into(), codes),
        Column::new("count".into(), counts),
    ];
    for m in &metrics {
        let values = f64_values(&grouped, m)?;
        let means: Vec<Option<f64>> = rows
            .iter()
            .map(|row| row.and_then(|i| values[i]).map(round2))
            .collect();
        columns.push(Column::new((*m).into(), means));
    }

    let summary = DataFrame::new(columns)?;
    log::info!("Summarized {} tracks into {} bins", tracks.height(), summary.height());
    Ok(summary)
}

/// Write a summary frame as CSV with a header row.
pub fn write_summary(summary: &mut DataFrame, path: &Path) -> Result<()> {
    store::write_csv(summary, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TableStore;
    use crate::store::tests::sample_tracks;
    use crate::store::string_values;

    #[test]
    fn test_half_open_assignment_and_means() {
        let summary = build_summary(&sample_tracks()).unwrap();
        let labels = string_values(&summary, "popularity_bin").unwrap();
        let labels: Vec<&str> = labels.iter().map(|l| l.as_deref().unwrap()).collect();
        assert_eq!(labels, vec!["0-25", "25-50", "50-75", "75-100"]);

        // 25 and 40 land in 25-50; 50 lands in 50-75 only.
        let counts = i64_values(&summary, "count").unwrap();
        assert_eq!(counts, vec![Some(1), Some(2), Some(1), Some(2)]);

        let energy = f64_values(&summary, "energy").unwrap();
        assert_eq!(energy, vec![Some(0.2), Some(0.45), Some(0.6), Some(0.85)]);
        let popularity = f64_values(&summary, "popularity").unwrap();
        assert_eq!(popularity, vec![Some(10.0), Some(32.5), Some(50.0), Some(87.5)]);
    }

    #[test]
    fn test_missing_metrics_are_skipped() {
        let summary = build_summary(&sample_tracks()).unwrap();
        assert!(summary.column("danceability").is_err());
        assert!(summary.column("duration_min").is_ok());
        let names: Vec<String> = summary
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(&names[..4], &["popularity_bin", "popularity_bin_code", "count", "popularity"]);
    }

    #[test]
    fn test_out_of_range_and_empty_bins() {
        let tracks = df!(
            "track_id" => &["a", "b", "c"],
            "popularity" => &[100i64, 101, 3]
        )
        .unwrap();
        let summary = build_summary(&tracks).unwrap();
        assert_eq!(summary.height(), 4);
        let counts = i64_values(&summary, "count").unwrap();
        assert_eq!(counts, vec![Some(1), Some(0), Some(0), Some(1)]);
        let popularity = f64_values(&summary, "popularity").unwrap();
        assert_eq!(popularity, vec![Some(3.0), None, None, Some(100.0)]);
    }

    #[test]
    fn test_requires_popularity() {
        let tracks = df!("track_id" => &["a"]).unwrap();
        assert!(matches!(build_summary(&tracks), Err(SummaryError::NoPopularity)));
    }

    #[test]
    fn test_written_summary_loads_into_store() {
        let dir = tempfile::tempdir().unwrap();
        let tracks_path = dir.path().join("tracks.csv");
        let histogram_path = dir.path().join("out").join("histogram.csv");

        let mut tracks = sample_tracks();
        let mut file = std::fs::File::create(&tracks_path).unwrap();
        CsvWriter::new(&mut file).include_header(true).finish(&mut tracks).unwrap();

        let mut summary = build_summary(&tracks).unwrap();
        write_summary(&mut summary, &histogram_path).unwrap();

        let store = TableStore::load(&tracks_path, &histogram_path).unwrap();
        assert_eq!(store.metric_columns(), &["count", "duration_min", "energy"]);
        assert_eq!(store.bin_value(PopularityBin::MidLow, "count").unwrap(), Some(2.0));
    }

    #[test]
    fn test_summary_with_empty_bin_loads_and_serves() {
        use crate::views::Dashboard;

        let dir = tempfile::tempdir().unwrap();
        let tracks_path = dir.path().join("tracks.csv");
        let histogram_path = dir.path().join("histogram.csv");

        // Nothing at 75 or above.
        let mut tracks = sample_tracks()
            .lazy()
            .filter(col("popularity").lt(lit(75i64)))
            .collect()
            .unwrap();
        let mut file = std::fs::File::create(&tracks_path).unwrap();
        CsvWriter::new(&mut file).include_header(true).finish(&mut tracks).unwrap();

        let mut summary = build_summary(&tracks).unwrap();
        write_summary(&mut summary, &histogram_path).unwrap();

        let store = TableStore::load(&tracks_path, &histogram_path).unwrap();
        assert_eq!(store.bin_value(PopularityBin::High, "count").unwrap(), Some(0.0));
        assert_eq!(store.bin_value(PopularityBin::High, "energy").unwrap(), None);

        let view = Dashboard::new(store).unwrap().metric_view("count").unwrap();
        assert_eq!(view.chart.bars[3].value, Some(0.0));
        assert_eq!(view.most_popular.comparison, "100% lower");
    }
}
