//! Track dashboard: popularity-bin aggregates over a prepared music dataset.
//!
//! The [`store`] holds the two input tables, [`aggregate`] and [`derived`]
//! compute distributions and deviations over them, and [`views`] maps a tab
//! selection onto a render payload that the CLI or the [`serve`] API hands
//! to a front end. [`prepare`] and [`summary`] build the two tables from a
//! raw track export.

pub mod aggregate;
pub mod config;
pub mod derived;
pub mod format;
pub mod prepare;
pub mod serve;
pub mod store;
pub mod summary;
pub mod views;

pub use derived::AverageMetrics;
pub use store::{Category, PopularityBin, TableStore};
pub use views::Dashboard;

/// Application name for XDG paths
pub const APP_NAME: &str = "trackdash";
