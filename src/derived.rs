//! Global metric averages and per-bin deviation from them.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::aggregate::{self, AggregateError};
use crate::format::{format_label, format_number, round2};
use crate::store::{COUNT_METRIC, PopularityBin, TableStore};

/// Marker shown wherever a value cannot be computed.
pub const NOT_AVAILABLE: &str = "N/A";

/// Global mean per metric, rounded to two decimals.
///
/// Built once from the store and handed to every view by reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AverageMetrics {
    values: BTreeMap<String, f64>,
}

impl AverageMetrics {
    /// `count` is averaged over the summary table, every other metric over
    /// the full track table. Metrics the track table lacks are left out.
    pub fn compute(store: &TableStore) -> Result<Self, AggregateError> {
        let mut values = BTreeMap::new();
        for metric in store.metric_columns() {
            let source = if metric == COUNT_METRIC {
                store.histogram()
            } else {
                store.tracks()
            };
            match aggregate::column_mean(source, metric) {
                Ok(Some(mean)) => {
                    values.insert(metric.clone(), round2(mean));
                }
                Ok(None) => log::warn!("No values to average for metric {}", metric),
                Err(AggregateError::MissingColumn(column)) => {
                    log::warn!("Track table has no column {}; its average is unavailable", column)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Self { values })
    }

    pub fn get(&self, metric: &str) -> Option<f64> {
        self.values.get(metric).copied()
    }

    /// Average rendered for display, or [`NOT_AVAILABLE`].
    pub fn display(&self, metric: &str) -> String {
        self.get(metric)
            .map(format_number)
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, f64)> for AverageMetrics {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Signed percentage deviation of a bin mean from the global average,
/// rounded to two decimals.
///
/// A zero bin mean is reported as exactly `-100` whatever the average. A
/// zero average with a non-zero bin mean has no meaningful ratio and yields
/// `None`.
pub fn percentage_difference(bin_mean: f64, global_avg: f64) -> Option<f64> {
    if bin_mean == 0.0 {
        return Some(-100.0);
    }
    if global_avg == 0.0 {
        return None;
    }
    Some(round2((bin_mean - global_avg) / global_avg * 100.0))
}

/// Direction of a bin value relative to the global average.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Comparison {
    Higher(f64),
    Lower(f64),
    Same,
    NotAvailable,
}

impl Comparison {
    pub fn from_difference(difference: Option<f64>) -> Self {
        match difference {
            Some(d) if d > 0.0 => Self::Higher(d),
            Some(d) if d < 0.0 => Self::Lower(d.abs()),
            Some(_) => Self::Same,
            None => Self::NotAvailable,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Higher(d) => write!(f, "{}% higher", format_number(*d)),
            // A bin mean of zero is the integral -100 sentinel.
            Self::Lower(d) if *d == 100.0 => f.write_str("100% lower"),
            Self::Lower(d) => write!(f, "{}% lower", format_number(*d)),
            Self::Same => f.write_str("the same"),
            Self::NotAvailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

/// The three-part sentence comparing one bin with the overall average.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DifferenceText {
    pub lead: String,
    pub comparison: String,
    pub tail: String,
    pub difference: Option<f64>,
}

impl DifferenceText {
    pub fn new(bin: PopularityBin, metric: &str, difference: Option<f64>) -> Self {
        let lead = match bin {
            PopularityBin::BOTTOM => format!("Least popular tracks ({}) have", bin),
            PopularityBin::TOP => format!("Most popular tracks ({}) have", bin),
            _ => String::new(),
        };
        Self {
            lead,
            comparison: Comparison::from_difference(difference).to_string(),
            tail: format!("{} than the overall average.", format_label(metric).to_lowercase()),
            difference,
        }
    }
}

impl fmt::Display for DifferenceText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.lead.is_empty() {
            write!(f, "{} ", self.lead)?;
        }
        write!(f, "{} {}", self.comparison, self.tail)
    }
}
