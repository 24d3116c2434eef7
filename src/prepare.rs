//! Clean a raw track export into the prepared per-track table.
//!
//! `trackdash prepare` → drops repeated listings, folds multi-genre tracks
//! into one row, converts durations to minutes, rewrites the explicit flag as
//! `Yes`/`No`, attaches the general genre and formats artist credits.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use polars::prelude::*;
use thiserror::Error;

use crate::format::round2;
use crate::store::{self, StoreError, f64_values, string_values};

#[derive(Error, Debug)]
pub enum PrepareError {
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("{table} table is missing column \"{column}\"")]
    MissingColumn { table: &'static str, column: String },
}

pub type Result<T> = std::result::Result<T, PrepareError>;

/// Genre column name in the raw export.
const RAW_GENRE: &str = "track_genre";
const GENRE: &str = "genre";

/// Genre to general-genre lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenreMap {
    map: HashMap<String, String>,
}

impl GenreMap {
    /// Load a `genre,general_genre` CSV file.
    pub fn load(path: &Path) -> Result<Self> {
        let df = store::read_csv(path)?;
        let map = Self::from_frame(&df)?;
        log::info!("Loaded {} genre mappings from {}", map.len(), path.display());
        Ok(map)
    }

    /// Later rows win over earlier rows for the same genre.
    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        require(df, "genre map", GENRE)?;
        require(df, "genre map", "general_genre")?;
        let genres = string_values(df, GENRE)?;
        let general = string_values(df, "general_genre")?;
        Ok(genres
            .into_iter()
            .zip(general)
            .filter_map(|(genre, general)| Some((genre?, general?)))
            .collect())
    }

    pub fn get(&self, genre: &str) -> Option<&str> {
        self.map.get(genre).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl FromIterator<(String, String)> for GenreMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

/// Run every cleaning step over a raw export.
pub fn prepare_tracks(raw: DataFrame, genres: &GenreMap) -> Result<DataFrame> {
    let raw_rows = raw.height();
    let mut df = drop_index_columns(raw)?;
    if df.column(GENRE).is_err() && df.column(RAW_GENRE).is_ok() {
        df.rename(RAW_GENRE, GENRE.into())?;
    }

    let df = drop_duplicates(&df)?;
    let df = combine_duplicates(&df)?;
    let df = convert_duration(&df)?;
    let df = explicit_to_text(&df)?;
    let df = map_genre(&df, genres)?;
    let df = format_artists(&df)?;

    log::info!("Prepared {} tracks from {} raw rows", df.height(), raw_rows);
    Ok(df)
}

/// Read the raw export and genre map, clean, and write the prepared table.
pub fn prepare_file(raw_path: &Path, genre_map_path: &Path, output: &Path) -> Result<DataFrame> {
    let raw = store::read_csv(raw_path)?;
    let genres = GenreMap::load(genre_map_path)?;
    let mut prepared = prepare_tracks(raw, &genres)?;
    store::write_csv(&mut prepared, output)?;
    Ok(prepared)
}

/// Drop the unnamed row-index column pandas-style exports carry.
fn drop_index_columns(df: DataFrame) -> Result<DataFrame> {
    let index_columns: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .filter(|name| name.is_empty() || name.starts_with("Unnamed"))
        .collect();
    let mut df = df;
    for name in &index_columns {
        log::debug!("Dropping index column {:?}", name);
        df = df.drop(name)?;
    }
    Ok(df)
}

/// Keep the first row of every `(track_name, artists, genre)` triple.
pub fn drop_duplicates(df: &DataFrame) -> Result<DataFrame> {
    let keys = key_rows(df, &["track_name", "artists", GENRE])?;
    let mut seen = HashSet::new();
    let keep: Vec<bool> = keys.into_iter().map(|key| seen.insert(key)).collect();
    Ok(df.filter(&BooleanChunked::from_slice("keep".into(), &keep))?)
}

/// Collapse rows sharing a `track_id` into the first one.
///
/// The distinct genres of the group, in first-seen order, are joined with
/// `-` into a new `genres` column.
pub fn combine_duplicates(df: &DataFrame) -> Result<DataFrame> {
    require(df, "track", "track_id")?;
    require(df, "track", GENRE)?;
    let ids = string_values(df, "track_id")?;
    let genres = string_values(df, GENRE)?;

    let mut combined: HashMap<Option<String>, Vec<String>> = HashMap::new();
    for (id, genre) in ids.iter().zip(&genres) {
        let entry = combined.entry(id.clone()).or_default();
        if let Some(genre) = genre {
            if !entry.contains(genre) {
                entry.push(genre.clone());
            }
        }
    }

    let mut seen = HashSet::new();
    let first: Vec<bool> = ids.iter().map(|id| seen.insert(id.clone())).collect();
    let mut out = df.filter(&BooleanChunked::from_slice("first".into(), &first))?;

    let joined: Vec<Option<String>> = string_values(&out, "track_id")?
        .into_iter()
        .map(|id| combined.get(&id).map(|g| g.join("-")))
        .collect();
    out.with_column(Column::new("genres".into(), joined))?;
    Ok(out)
}

/// Replace `duration_ms` with `duration_min`, rounded to two decimals.
pub fn convert_duration(df: &DataFrame) -> Result<DataFrame> {
    require(df, "track", "duration_ms")?;
    let minutes: Vec<Option<f64>> = f64_values(df, "duration_ms")?
        .into_iter()
        .map(|ms| ms.map(|ms| round2(ms / 60_000.0)))
        .collect();
    let mut out = df.drop("duration_ms")?;
    out.with_column(Column::new("duration_min".into(), minutes))?;
    Ok(out)
}

/// Rewrite the boolean `explicit` flag as `Yes`/`No` text.
pub fn explicit_to_text(df: &DataFrame) -> Result<DataFrame> {
    require(df, "track", "explicit")?;
    let text: Vec<Option<String>> = string_values(df, "explicit")?
        .into_iter()
        .map(|v| v.map(|v| yes_no(&v)))
        .collect();
    let mut out = df.clone();
    out.with_column(Column::new("explicit".into(), text))?;
    Ok(out)
}

fn yes_no(value: &str) -> String {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => "Yes".to_string(),
        "false" => "No".to_string(),
        _ => value.to_string(),
    }
}

/// Add `general_genre` from the lookup; unmapped genres are null.
pub fn map_genre(df: &DataFrame, genres: &GenreMap) -> Result<DataFrame> {
    require(df, "track", GENRE)?;
    let mut unmapped = HashSet::new();
    let general: Vec<Option<String>> = string_values(df, GENRE)?
        .into_iter()
        .map(|genre| {
            let genre = genre?;
            let general = genres.get(&genre).map(str::to_string);
            if general.is_none() {
                unmapped.insert(genre);
            }
            general
        })
        .collect();
    if !unmapped.is_empty() {
        let mut unmapped: Vec<String> = unmapped.into_iter().collect();
        unmapped.sort();
        log::warn!("No general genre for: {}", unmapped.join(", "));
    }

    let mut out = df.clone();
    out.with_column(Column::new("general_genre".into(), general))?;
    Ok(out)
}

/// Render `;`-separated artist credits as `A ft. B`.
pub fn format_artists(df: &DataFrame) -> Result<DataFrame> {
    require(df, "track", "artists")?;
    let artists: Vec<Option<String>> = string_values(df, "artists")?
        .into_iter()
        .map(|v| v.map(|v| v.replace(';', " ft. ")))
        .collect();
    let mut out = df.clone();
    out.with_column(Column::new("artists".into(), artists))?;
    Ok(out)
}

fn key_rows(df: &DataFrame, columns: &[&str]) -> Result<Vec<Vec<Option<String>>>> {
    let values = columns
        .iter()
        .map(|c| {
            require(df, "track", c)?;
            Ok(string_values(df, c)?)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((0..df.height())
        .map(|i| values.iter().map(|column| column[i].clone()).collect())
        .collect())
}

fn require(df: &DataFrame, table: &'static str, column: &str) -> Result<()> {
    if df.column(column).is_err() {
        return Err(PrepareError::MissingColumn {
            table,
            column: column.to_string(),
        });
    }
    Ok(())
}
