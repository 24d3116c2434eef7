//! Group-by, filter and join operations over the track table.
//!
//! Everything here is a pure function of its input frames. Percentages are
//! computed against the height of the frame passed in, so the same functions
//! serve both the full table and a single popularity bin.

use polars::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::store::bins::{self, BinError, PopularityBin};
use crate::store::{f64_values, string_values};

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
    #[error("table has no column \"{0}\"")]
    MissingColumn(String),
    #[error("Popularity bin error: {0}")]
    Bin(#[from] BinError),
}

pub type Result<T> = std::result::Result<T, AggregateError>;

/// Output field for a category's share of the full table.
pub const TOTAL_COUNT: &str = "total_count";
/// Output field for a category's share of one popularity bin.
pub const BIN_COUNT: &str = "bin_count";

const ROW_ORDER: &str = "__row_order";

/// One category value and its share of the rows, in percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryShare {
    pub value: String,
    pub percent: f64,
}

/// Share of a category value in the full table and in one bin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinedShare {
    pub value: String,
    pub total_percent: f64,
    pub bin_percent: f64,
}

/// Percentage of rows per distinct value of `category`.
///
/// Returns a two-column frame `(category, alias)` sorted ascending by
/// percentage, equal percentages keeping first-encountered order. Category
/// values are rendered as strings. An empty input gives an empty frame.
pub fn count_by_category(df: &DataFrame, category: &str, alias: &str) -> Result<DataFrame> {
    require(df, category)?;

    let total = df.height();
    if total == 0 {
        return empty_distribution(category, alias);
    }

    let out = df
        .clone()
        .lazy()
        .group_by_stable([col(category).cast(DataType::String)])
        .agg([(len().cast(DataType::Float64) / lit(total as f64) * lit(100.0)).alias(alias)])
        .sort([alias], SortMultipleOptions::default().with_maintain_order(true))
        .collect()?;
    Ok(out)
}

fn empty_distribution(category: &str, alias: &str) -> Result<DataFrame> {
    let out = DataFrame::new(vec![
        Column::new(category.into(), Vec::<String>::new()),
        Column::new(alias.into(), Vec::<f64>::new()),
    ])?;
    Ok(out)
}

/// Tracks whose popularity lies within `[lower, upper]`, both ends inclusive.
pub fn filter_popularity(df: &DataFrame, lower: i64, upper: i64) -> Result<DataFrame> {
    require(df, "popularity")?;
    let out = df
        .clone()
        .lazy()
        .filter(
            col("popularity")
                .gt_eq(lit(lower))
                .and(col("popularity").lt_eq(lit(upper))),
        )
        .collect()?;
    Ok(out)
}

/// Tracks falling in `bin` under the live (inclusive) bounds.
pub fn filter_by_bin(df: &DataFrame, bin: PopularityBin) -> Result<DataFrame> {
    let (lower, upper) = bin.bounds();
    filter_popularity(df, lower, upper)
}

/// Same as [`filter_by_bin`] for a raw `"<lower>-<upper>"` label.
pub fn filter_by_bin_label(df: &DataFrame, label: &str) -> Result<DataFrame> {
    let (lower, upper) = bins::parse_bounds(label)?;
    filter_popularity(df, lower, upper)
}

/// Mean of a numeric column; `None` for an empty frame or an all-null column.
pub fn column_mean(df: &DataFrame, column: &str) -> Result<Option<f64>> {
    require(df, column)?;
    let series = df
        .column(column)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(series.mean())
}

/// Inner join of two distributions on the category value.
///
/// Values present on one side only are dropped. Rows keep the order of
/// `total`. The output columns are `(category, total_alias, bin_alias)`.
pub fn join_distributions(
    total: &DataFrame,
    bin: &DataFrame,
    category: &str,
    total_alias: &str,
    bin_alias: &str,
) -> Result<DataFrame> {
    require(total, category)?;
    require(bin, category)?;

    let out = total
        .clone()
        .lazy()
        .with_row_index(ROW_ORDER, None)
        .join(
            bin.clone().lazy(),
            [col(category)],
            [col(category)],
            JoinArgs::new(JoinType::Inner),
        )
        .sort([ROW_ORDER], SortMultipleOptions::default())
        .select([col(category), col(total_alias), col(bin_alias)])
        .collect()?;
    Ok(out)
}

/// Read a `(category, alias)` frame back into typed rows.
pub fn shares(dist: &DataFrame, category: &str, alias: &str) -> Result<Vec<CategoryShare>> {
    let values = string_values(dist, category)?;
    let percents = f64_values(dist, alias)?;
    Ok(values
        .into_iter()
        .zip(percents)
        .map(|(value, percent)| CategoryShare {
            value: value.unwrap_or_else(|| "Unknown".to_string()),
            percent: percent.unwrap_or(0.0),
        })
        .collect())
}

/// Read a joined frame back into typed rows.
pub fn joined_shares(
    joined: &DataFrame,
    category: &str,
    total_alias: &str,
    bin_alias: &str,
) -> Result<Vec<JoinedShare>> {
    let values = string_values(joined, category)?;
    let totals = f64_values(joined, total_alias)?;
    let bins = f64_values(joined, bin_alias)?;
    Ok(values
        .into_iter()
        .zip(totals)
        .zip(bins)
        .map(|((value, total), bin)| JoinedShare {
            value: value.unwrap_or_else(|| "Unknown".to_string()),
            total_percent: total.unwrap_or(0.0),
            bin_percent: bin.unwrap_or(0.0),
        })
        .collect())
}

fn require(df: &DataFrame, column: &str) -> Result<()> {
    if df.column(column).is_err() {
        return Err(AggregateError::MissingColumn(column.to_string()));
    }
    Ok(())
}
