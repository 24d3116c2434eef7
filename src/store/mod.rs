//! Immutable in-memory tables loaded once at startup.
//!
//! The store owns the per-track table (sorted by popularity, most popular
//! first) and the four-row popularity-bin summary table. Nothing mutates
//! either frame after [`TableStore::from_frames`] returns.

pub mod bins;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use polars::prelude::*;
use serde::{Serialize, Serializer};
use thiserror::Error;

pub use bins::{BinError, PopularityBin};

/// Summary-table columns that are bin keys rather than metrics.
pub const EXCLUDED_METRIC_COLUMNS: &[&str] = &["popularity_bin", "popularity_bin_code", "popularity"];

/// Metric identifier for the per-bin track count.
pub const COUNT_METRIC: &str = "count";

/// Columns every track table must carry, besides the [`Category`] columns.
pub const REQUIRED_TRACK_COLUMNS: &[&str] = &["track_id", "popularity"];

/// Columns shown in the per-bin track table, in display order.
pub const DISPLAY_COLUMNS: &[&str] = &[
    "track_name",
    "artists",
    "album_name",
    "genres",
    "general_genre",
    "explicit",
    "popularity",
];

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
    #[error("{table} table is missing required column \"{column}\"")]
    MissingColumn { table: &'static str, column: String },
    #[error("Popularity bin error: {0}")]
    Bin(#[from] BinError),
    #[error("summary table must hold exactly the bins 0-25, 25-50, 50-75, 75-100 in order, found {0:?}")]
    SummaryBins(Vec<String>),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown category \"{0}\" (expected general_genre, explicit or time_signature)")]
pub struct UnknownCategory(pub String);

/// Categorical columns the dashboard can break tracks down by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    GeneralGenre,
    Explicit,
    TimeSignature,
}

impl Category {
    pub const ALL: [Category; 3] = [Self::GeneralGenre, Self::Explicit, Self::TimeSignature];

    pub fn column(&self) -> &'static str {
        match self {
            Self::GeneralGenre => "general_genre",
            Self::Explicit => "explicit",
            Self::TimeSignature => "time_signature",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.column() == s.trim())
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.column())
    }
}

pub struct TableStore {
    tracks: DataFrame,
    histogram: DataFrame,
    metric_columns: Vec<String>,
}

impl TableStore {
    /// Load both CSV tables from disk.
    pub fn load(tracks_path: &Path, histogram_path: &Path) -> Result<Self> {
        let tracks = read_csv(tracks_path)?;
        let histogram = read_csv(histogram_path)?;
        log::info!(
            "Loaded {} tracks from {} and {} summary rows from {}",
            tracks.height(),
            tracks_path.display(),
            histogram.height(),
            histogram_path.display()
        );
        Self::from_frames(tracks, histogram)
    }

    /// Load only the per-track table, unvalidated (for the summary builder).
    pub fn load_tracks(tracks_path: &Path) -> Result<DataFrame> {
        let tracks = read_csv(tracks_path)?;
        log::info!("Loaded {} tracks from {}", tracks.height(), tracks_path.display());
        Ok(tracks)
    }

    /// Validate and take ownership of already-loaded frames.
    pub fn from_frames(tracks: DataFrame, histogram: DataFrame) -> Result<Self> {
        let categories = Category::ALL.iter().map(|c| c.column());
        for column in REQUIRED_TRACK_COLUMNS.iter().copied().chain(categories) {
            require_column(&tracks, "track", column)?;
        }
        require_column(&histogram, "summary", "popularity_bin")?;

        let labels = string_values(&histogram, "popularity_bin")?;
        let labels: Vec<String> = labels.into_iter().map(Option::unwrap_or_default).collect();
        // Malformed labels are a data error: reject the whole table.
        for label in &labels {
            bins::parse_bounds(label)?;
        }
        let expected: Vec<&str> = PopularityBin::ALL.iter().map(|b| b.label()).collect();
        if labels != expected {
            return Err(StoreError::SummaryBins(labels));
        }

        let tracks = tracks.sort(
            ["popularity"],
            SortMultipleOptions::default()
                .with_order_descending(true)
                .with_maintain_order(true),
        )?;

        let metric_columns: Vec<String> = histogram
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .filter(|name| !EXCLUDED_METRIC_COLUMNS.contains(&name.as_str()))
            .collect();
        log::debug!("Metric columns: {}", metric_columns.join(", "));

        Ok(Self {
            tracks,
            histogram,
            metric_columns,
        })
    }

    pub fn tracks(&self) -> &DataFrame {
        &self.tracks
    }

    pub fn histogram(&self) -> &DataFrame {
        &self.histogram
    }

    /// Metric identifiers in summary-table column order (`count` first for
    /// tables produced by the summary builder).
    pub fn metric_columns(&self) -> &[String] {
        &self.metric_columns
    }

    pub fn is_metric(&self, metric: &str) -> bool {
        self.metric_columns.iter().any(|m| m == metric)
    }

    /// Per-bin values of one summary column, in bin order.
    pub fn histogram_values(&self, metric: &str) -> Result<Vec<(PopularityBin, Option<f64>)>> {
        let values = f64_values(&self.histogram, metric)?;
        Ok(PopularityBin::ALL.into_iter().zip(values).collect())
    }

    /// Summary value of one metric for one bin.
    pub fn bin_value(&self, bin: PopularityBin, metric: &str) -> Result<Option<f64>> {
        Ok(self
            .histogram_values(metric)?
            .into_iter()
            .find(|(b, _)| *b == bin)
            .and_then(|(_, v)| v))
    }
}

/// Read a headed CSV file, any schema.
pub(crate) fn read_csv(path: &Path) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Write a frame as CSV with a header row, creating parent directories.
pub(crate) fn write_csv(df: &mut DataFrame, path: &Path) -> PolarsResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = std::fs::File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)
}

fn require_column(df: &DataFrame, table: &'static str, column: &str) -> Result<()> {
    if df.column(column).is_err() {
        return Err(StoreError::MissingColumn {
            table,
            column: column.to_string(),
        });
    }
    Ok(())
}

/// Values of a numeric column as `f64`, nulls preserved.
pub(crate) fn f64_values(df: &DataFrame, column: &str) -> PolarsResult<Vec<Option<f64>>> {
    let series = df
        .column(column)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

/// Values of an integer column as `i64`, nulls preserved.
pub(crate) fn i64_values(df: &DataFrame, column: &str) -> PolarsResult<Vec<Option<i64>>> {
    let series = df
        .column(column)?
        .as_materialized_series()
        .cast(&DataType::Int64)?;
    Ok(series.i64()?.into_iter().collect())
}

/// Values of any column rendered as strings, nulls preserved.
pub(crate) fn string_values(df: &DataFrame, column: &str) -> PolarsResult<Vec<Option<String>>> {
    let series = df
        .column(column)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) fn sample_tracks() -> DataFrame {
        df!(
            "track_id" => &["t1", "t2", "t3", "t4", "t5", "t6"],
            "track_name" => &["Low One", "Edge", "Middle", "Upper Edge", "Hit", "Smash"],
            "artists" => &["A", "B", "C", "D", "E", "F ft. G"],
            "album_name" => &["L", "E", "M", "U", "H", "S"],
            "genres" => &["folk", "rock", "pop", "rock-pop", "pop", "dance"],
            "general_genre" => &["Folk", "Rock", "Pop", "Rock", "Pop", "Electronic"],
            "popularity" => &[10i64, 25, 40, 50, 80, 95],
            "explicit" => &["No", "No", "Yes", "No", "Yes", "Yes"],
            "duration_min" => &[3.0, 4.0, 3.5, 2.5, 3.0, 4.0],
            "energy" => &[0.2, 0.4, 0.5, 0.6, 0.8, 0.9],
            "time_signature" => &[4i64, 4, 3, 4, 4, 4]
        )
        .unwrap()
    }

    pub(crate) fn sample_histogram() -> DataFrame {
        df!(
            "popularity_bin" => &["0-25", "25-50", "50-75", "75-100"],
            "count" => &[1i64, 2, 1, 2],
            "popularity" => &[10.0, 32.5, 50.0, 87.5],
            "duration_min" => &[3.0, 3.75, 2.5, 3.5],
            "energy" => &[0.2, 0.45, 0.6, 0.85]
        )
        .unwrap()
    }

    pub(crate) fn sample_store() -> TableStore {
        TableStore::from_frames(sample_tracks(), sample_histogram()).unwrap()
    }

    #[test]
    fn test_tracks_sorted_by_popularity_descending() {
        let store = sample_store();
        let popularity = f64_values(store.tracks(), "popularity").unwrap();
        let popularity: Vec<f64> = popularity.into_iter().map(|v| v.unwrap()).collect();
        assert_eq!(popularity, vec![95.0, 80.0, 50.0, 40.0, 25.0, 10.0]);
    }

    #[test]
    fn test_metric_columns_exclude_bin_keys() {
        let store = sample_store();
        assert_eq!(store.metric_columns(), &["count", "duration_min", "energy"]);
        assert!(store.is_metric("count"));
        assert!(!store.is_metric("popularity"));
        assert!(!store.is_metric("popularity_bin"));
    }

    #[test]
    fn test_bin_value_lookup() {
        let store = sample_store();
        assert_eq!(store.bin_value(PopularityBin::High, "energy").unwrap(), Some(0.85));
        assert_eq!(store.bin_value(PopularityBin::Low, "count").unwrap(), Some(1.0));
        assert!(store.bin_value(PopularityBin::Low, "nonexistent").is_err());
    }

    #[test]
    fn test_rejects_wrong_bin_set() {
        let histogram = df!(
            "popularity_bin" => &["0-25", "25-50", "50-75"],
            "count" => &[1i64, 2, 3]
        )
        .unwrap();
        let err = TableStore::from_frames(sample_tracks(), histogram).err().unwrap();
        assert!(matches!(err, StoreError::SummaryBins(_)));
    }

    #[test]
    fn test_rejects_malformed_bin_label() {
        let histogram = df!(
            "popularity_bin" => &["0-25", "25-50", "fifty", "75-100"],
            "count" => &[1i64, 2, 3, 4]
        )
        .unwrap();
        let err = TableStore::from_frames(sample_tracks(), histogram).err().unwrap();
        assert!(matches!(err, StoreError::Bin(BinError::Malformed(_))));
    }

    #[test]
    fn test_rejects_missing_popularity() {
        let tracks = df!("track_id" => &["t1"]).unwrap();
        let err = TableStore::from_frames(tracks, sample_histogram()).err().unwrap();
        assert!(matches!(
            err,
            StoreError::MissingColumn { table: "track", .. }
        ));
    }

    #[test]
    fn test_rejects_missing_category_column() {
        for category in Category::ALL {
            let tracks = sample_tracks().drop(category.column()).unwrap();
            let err = TableStore::from_frames(tracks, sample_histogram()).err().unwrap();
            assert!(matches!(
                err,
                StoreError::MissingColumn { table: "track", column } if column == category.column()
            ));
        }
    }

    #[test]
    fn test_load_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let tracks_path = dir.path().join("tracks.csv");
        let histogram_path = dir.path().join("histogram.csv");

        let mut f = std::fs::File::create(&tracks_path).unwrap();
        writeln!(f, "track_id,track_name,popularity,explicit,general_genre,time_signature,energy").unwrap();
        writeln!(f, "a,First,12,No,Pop,4,0.5").unwrap();
        writeln!(f, "b,Second,90,Yes,Rock,3,0.7").unwrap();

        let mut f = std::fs::File::create(&histogram_path).unwrap();
        writeln!(f, "popularity_bin,popularity_bin_code,count,popularity,energy").unwrap();
        writeln!(f, "0-25,0,1,12.0,0.5").unwrap();
        writeln!(f, "25-50,1,0,0.0,0.0").unwrap();
        writeln!(f, "50-75,2,0,0.0,0.0").unwrap();
        writeln!(f, "75-100,3,1,90.0,0.7").unwrap();

        let store = TableStore::load(&tracks_path, &histogram_path).unwrap();
        assert_eq!(store.tracks().height(), 2);
        assert_eq!(store.metric_columns(), &["count", "energy"]);
        let names = string_values(store.tracks(), "track_name").unwrap();
        assert_eq!(names[0].as_deref(), Some("Second"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = TableStore::load(Path::new("/nonexistent/tracks.csv"), Path::new("/nonexistent/h.csv"))
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::Read { .. }));
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("explicit".parse::<Category>(), Ok(Category::Explicit));
        assert_eq!("time_signature".parse::<Category>(), Ok(Category::TimeSignature));
        assert!("genre".parse::<Category>().is_err());
    }
}
