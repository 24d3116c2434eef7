//! Selection-to-view mapping: turns a tab selection into a render payload.
//!
//! A [`Dashboard`] owns the immutable store and the average table built from
//! it. Both view operations borrow it read-only, so identical selections
//! always produce identical payloads.

use polars::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::aggregate::{self, AggregateError, BIN_COUNT, JoinedShare, TOTAL_COUNT};
use crate::derived::{AverageMetrics, DifferenceText, percentage_difference};
use crate::format::{format_label, format_number, round2};
use crate::store::{
    COUNT_METRIC, Category, DISPLAY_COLUMNS, PopularityBin, StoreError, TableStore, string_values,
};

/// Rows per table page.
pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Error, Debug)]
pub enum ViewError {
    #[error("unknown metric \"{0}\"")]
    UnknownMetric(String),
    #[error("Aggregation error: {0}")]
    Aggregate(#[from] AggregateError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
}

pub type Result<T> = std::result::Result<T, ViewError>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub label: String,
    pub value: Option<f64>,
    pub text: String,
}

/// Vertical bar chart of one summary column over the popularity bins.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarChart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub bars: Vec<Bar>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricView {
    pub metric: String,
    pub chart: BarChart,
    pub average_title: String,
    pub average_text: String,
    pub most_popular: DifferenceText,
    pub least_popular: DifferenceText,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ButterflyRow {
    pub value: String,
    /// Share in the full table, drawn to the left (negated).
    pub left: f64,
    pub left_text: String,
    /// Share in the selected bin, drawn to the right.
    pub right: f64,
    pub right_text: String,
}

/// Back-to-back horizontal bars: full-table share vs. bin share.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ButterflyChart {
    pub title: String,
    pub category_label: String,
    pub left_name: String,
    pub right_name: String,
    pub rows: Vec<ButterflyRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableColumn {
    pub id: String,
    pub name: String,
}

/// One page of the filtered track table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablePage {
    pub columns: Vec<TableColumn>,
    pub rows: Vec<Vec<String>>,
    pub page: usize,
    pub page_size: usize,
    pub total_rows: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryView {
    pub category: Category,
    pub bin: PopularityBin,
    pub chart: ButterflyChart,
    pub table: TablePage,
}

/// A selectable tab: its identifier and display label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tab {
    pub id: String,
    pub label: String,
}

impl Tab {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            label: format_label(id),
        }
    }
}

/// Every tab the dashboard offers, with display labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tabs {
    pub metrics: Vec<Tab>,
    pub categories: Vec<Tab>,
    pub bins: Vec<String>,
}

pub struct Dashboard {
    store: TableStore,
    averages: AverageMetrics,
    page_size: usize,
}

impl Dashboard {
    /// Compute the average table once and wrap the store.
    pub fn new(store: TableStore) -> Result<Self> {
        let averages = AverageMetrics::compute(&store)?;
        log::info!("Computed averages for {} metrics", averages.len());
        Ok(Self {
            store,
            averages,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn store(&self) -> &TableStore {
        &self.store
    }

    pub fn averages(&self) -> &AverageMetrics {
        &self.averages
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn tabs(&self) -> Tabs {
        Tabs {
            metrics: self.store.metric_columns().iter().map(String::as_str).map(Tab::new).collect(),
            categories: Category::ALL.iter().map(|c| Tab::new(c.column())).collect(),
            bins: PopularityBin::ALL.iter().map(|b| b.label().to_string()).collect(),
        }
    }

    /// Bar chart, average card and top/bottom comparisons for one metric.
    pub fn metric_view(&self, metric: &str) -> Result<MetricView> {
        if !self.store.is_metric(metric) {
            return Err(ViewError::UnknownMetric(metric.to_string()));
        }
        log::debug!("metric view: {}", metric);

        let chart = self.histogram_chart(metric)?;
        let average = self.averages.get(metric);
        let compare = |bin: PopularityBin| -> Result<DifferenceText> {
            let bin_mean = self.store.bin_value(bin, metric)?;
            let difference = match (bin_mean, average) {
                (Some(bin_mean), Some(average)) => percentage_difference(bin_mean, average),
                _ => None,
            };
            Ok(DifferenceText::new(bin, metric, difference))
        };

        Ok(MetricView {
            metric: metric.to_string(),
            chart,
            average_title: format!("AVG {}", format_label(metric)),
            average_text: self.averages.display(metric),
            most_popular: compare(PopularityBin::TOP)?,
            least_popular: compare(PopularityBin::BOTTOM)?,
        })
    }

    fn histogram_chart(&self, metric: &str) -> Result<BarChart> {
        let label = format_label(metric);
        let (title, mut y_label) = if metric == COUNT_METRIC {
            ("Track Count by Popularity".to_string(), "Count".to_string())
        } else {
            (format!("Average {} by Popularity", label), format!("Average {}", label))
        };
        if metric == "duration_min" {
            y_label.push_str(" (min)");
        }

        let bars = self
            .store
            .histogram_values(metric)?
            .into_iter()
            .map(|(bin, value)| Bar {
                label: bin.label().to_string(),
                value,
                text: value.map(format_number).unwrap_or_default(),
            })
            .collect();

        Ok(BarChart {
            title,
            x_label: format_label("popularity_bin"),
            y_label,
            bars,
        })
    }

    /// Butterfly chart and track table for one category within one bin.
    pub fn category_view(&self, category: Category, bin: PopularityBin, page: usize) -> Result<CategoryView> {
        log::debug!("category view: {} / {} (page {})", category, bin, page);
        let column = category.column();
        let tracks = self.store.tracks();
        let in_bin = aggregate::filter_by_bin(tracks, bin)?;

        let total = aggregate::count_by_category(tracks, column, TOTAL_COUNT)?;
        let binned = aggregate::count_by_category(&in_bin, column, BIN_COUNT)?;
        let joined = aggregate::join_distributions(&total, &binned, column, TOTAL_COUNT, BIN_COUNT)?;
        let rows = aggregate::joined_shares(&joined, column, TOTAL_COUNT, BIN_COUNT)?;

        Ok(CategoryView {
            category,
            bin,
            chart: butterfly_chart(column, rows),
            table: self.table_page(&in_bin, page)?,
        })
    }

    fn table_page(&self, df: &DataFrame, page: usize) -> Result<TablePage> {
        let present: Vec<&str> = DISPLAY_COLUMNS
            .iter()
            .copied()
            .filter(|c| df.column(c).is_ok())
            .collect();

        let total_rows = df.height();
        let page_size = self.page_size;
        let total_pages = total_rows.div_ceil(page_size);
        let offset = page.saturating_mul(page_size);

        let mut rows = Vec::new();
        if offset < total_rows {
            let slice = df.slice(offset as i64, page_size);
            let columns = present
                .iter()
                .map(|c| string_values(&slice, c))
                .collect::<PolarsResult<Vec<_>>>()?;
            for i in 0..slice.height() {
                rows.push(
                    columns
                        .iter()
                        .map(|values| values[i].clone().unwrap_or_default())
                        .collect(),
                );
            }
        }

        Ok(TablePage {
            columns: present
                .iter()
                .map(|c| TableColumn {
                    id: c.to_string(),
                    name: format_label(c),
                })
                .collect(),
            rows,
            page,
            page_size,
            total_rows,
            total_pages,
        })
    }
}

fn butterfly_chart(column: &str, rows: Vec<JoinedShare>) -> ButterflyChart {
    let label = format_label(column);
    ButterflyChart {
        title: format!("Track Count by {}", label),
        category_label: label,
        left_name: format_label(TOTAL_COUNT),
        right_name: format_label(BIN_COUNT),
        rows: rows
            .into_iter()
            .map(|share| ButterflyRow {
                value: share.value,
                left: -share.total_percent,
                left_text: format!("{}%", format_number(round2(share.total_percent).abs())),
                right: share.bin_percent,
                right_text: format!("{:.1}%", share.bin_percent),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{sample_histogram, sample_store, sample_tracks};

    fn dashboard() -> Dashboard {
        Dashboard::new(sample_store()).unwrap()
    }

    #[test]
    fn test_metric_view_energy() {
        let view = dashboard().metric_view("energy").unwrap();
        assert_eq!(view.chart.title, "Average Energy by Popularity");
        assert_eq!(view.chart.x_label, "Popularity Bin");
        assert_eq!(view.chart.y_label, "Average Energy");
        let labels: Vec<&str> = view.chart.bars.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["0-25", "25-50", "50-75", "75-100"]);
        assert_eq!(view.chart.bars[3].value, Some(0.85));
        assert_eq!(view.chart.bars[3].text, "0.85");
        assert_eq!(view.average_title, "AVG Energy");
        assert_eq!(view.average_text, "0.57");
        // (0.85 - 0.57) / 0.57 * 100 = 49.12..
        assert_eq!(view.most_popular.difference, Some(49.12));
        assert_eq!(view.most_popular.comparison, "49.12% higher");
        // (0.2 - 0.57) / 0.57 * 100 = -64.91..
        assert_eq!(view.least_popular.difference, Some(-64.91));
        assert_eq!(view.least_popular.comparison, "64.91% lower");
        assert_eq!(view.least_popular.lead, "Least popular tracks (0-25) have");
    }

    #[test]
    fn test_metric_view_count_and_duration_labels() {
        let dash = dashboard();
        let count = dash.metric_view("count").unwrap();
        assert_eq!(count.chart.title, "Track Count by Popularity");
        assert_eq!(count.chart.y_label, "Count");
        assert_eq!(count.average_text, "1.5");
        assert_eq!(count.chart.bars[1].text, "2.0");

        let duration = dash.metric_view("duration_min").unwrap();
        assert_eq!(duration.chart.title, "Average Duration by Popularity");
        assert_eq!(duration.chart.y_label, "Average Duration (min)");
        assert_eq!(duration.average_title, "AVG Duration");
        assert!(duration.most_popular.tail.starts_with("duration "));
    }

    #[test]
    fn test_metric_view_unknown_metric() {
        let err = dashboard().metric_view("popularity").err().unwrap();
        assert!(matches!(err, ViewError::UnknownMetric(m) if m == "popularity"));
    }

    #[test]
    fn test_metric_view_missing_average_is_not_available() {
        let mut histogram = sample_histogram();
        histogram
            .with_column(Column::new("valence".into(), &[0.0, 0.3, 0.4, 0.5]))
            .unwrap();
        let store = TableStore::from_frames(sample_tracks(), histogram).unwrap();
        let view = Dashboard::new(store).unwrap().metric_view("valence").unwrap();
        assert_eq!(view.average_text, "N/A");
        assert_eq!(view.most_popular.comparison, "N/A");
        assert_eq!(view.most_popular.difference, None);
        assert_eq!(view.least_popular.comparison, "N/A");
    }

    #[test]
    fn test_metric_view_is_idempotent() {
        let dash = dashboard();
        let a = serde_json::to_string(&dash.metric_view("energy").unwrap()).unwrap();
        let b = serde_json::to_string(&dash.metric_view("energy").unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_category_view_chart() {
        let view = dashboard()
            .category_view(Category::GeneralGenre, PopularityBin::MidLow, 0)
            .unwrap();
        assert_eq!(view.chart.title, "Track Count by General Genre");
        assert_eq!(view.chart.left_name, "Total Count");
        assert_eq!(view.chart.right_name, "Bin Count");
        let values: Vec<&str> = view.chart.rows.iter().map(|r| r.value.as_str()).collect();
        // Ordered by full-table share; ties keep the popularity-sorted order.
        assert_eq!(values, vec!["Pop", "Rock"]);

        let rock = &view.chart.rows[1];
        assert!((rock.left + 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(rock.left_text, "33.33%");
        assert_eq!(rock.right_text, "66.7%");
        assert_eq!(view.chart.rows[0].right_text, "33.3%");
    }

    #[test]
    fn test_category_view_table() {
        let view = dashboard()
            .category_view(Category::Explicit, PopularityBin::MidLow, 0)
            .unwrap();
        let ids: Vec<&str> = view.table.columns.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, DISPLAY_COLUMNS.to_vec());
        assert_eq!(view.table.columns[2].name, "Album Name");
        assert_eq!(view.table.total_rows, 3);
        assert_eq!(view.table.total_pages, 1);
        // Most popular first.
        let names: Vec<&str> = view.table.rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(names, vec!["Upper Edge", "Middle", "Edge"]);
        assert_eq!(view.table.rows[0][6], "50");
    }

    #[test]
    fn test_category_view_pagination() {
        let dash = Dashboard::new(sample_store()).unwrap().with_page_size(2);
        let first = dash
            .category_view(Category::Explicit, PopularityBin::MidLow, 0)
            .unwrap();
        assert_eq!(first.table.rows.len(), 2);
        assert_eq!(first.table.total_pages, 2);

        let second = dash
            .category_view(Category::Explicit, PopularityBin::MidLow, 1)
            .unwrap();
        assert_eq!(second.table.rows.len(), 1);
        assert_eq!(second.table.rows[0][0], "Edge");

        let past_end = dash
            .category_view(Category::Explicit, PopularityBin::MidLow, 5)
            .unwrap();
        assert!(past_end.table.rows.is_empty());
        assert_eq!(past_end.table.total_rows, 3);
    }

    #[test]
    fn test_category_view_empty_bin() {
        let tracks = sample_tracks()
            .lazy()
            .filter(col("popularity").lt(lit(75i64)))
            .collect()
            .unwrap();
        let store = TableStore::from_frames(tracks, sample_histogram()).unwrap();
        let view = Dashboard::new(store)
            .unwrap()
            .category_view(Category::TimeSignature, PopularityBin::High, 0)
            .unwrap();
        assert!(view.chart.rows.is_empty());
        assert!(view.table.rows.is_empty());
        assert_eq!(view.table.total_pages, 0);
    }

    #[test]
    fn test_category_view_is_idempotent() {
        let dash = dashboard();
        let a = serde_json::to_string(
            &dash.category_view(Category::Explicit, PopularityBin::High, 0).unwrap(),
        )
        .unwrap();
        let b = serde_json::to_string(
            &dash.category_view(Category::Explicit, PopularityBin::High, 0).unwrap(),
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_tabs() {
        let tabs = dashboard().tabs();
        assert_eq!(tabs.metrics[0].id, "count");
        assert_eq!(tabs.metrics[1].label, "Duration");
        assert_eq!(tabs.categories[2].label, "Time Signature");
        assert_eq!(tabs.bins, vec!["0-25", "25-50", "50-75", "75-100"]);
    }
}
