use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::views::DEFAULT_PAGE_SIZE;

/// Application configuration loaded from TOML config file.
/// All fields have defaults; the config file is optional.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Prepared per-track table (CSV).
    pub tracks_path: PathBuf,
    /// Popularity-bin summary table (CSV).
    pub histogram_path: PathBuf,
    /// Genre to general-genre lookup used by `prepare` (CSV).
    pub genre_map_path: PathBuf,
    /// Rows per page in the per-bin track table.
    pub page_size: usize,
    /// HTTP server settings.
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the dashboard API on.
    pub host: String,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tracks_path: PathBuf::from("data/spotify_data_prepared.csv"),
            histogram_path: PathBuf::from("data/histogram_data.csv"),
            genre_map_path: PathBuf::from("data/genre_map.csv"),
            page_size: DEFAULT_PAGE_SIZE,
            server: ServerConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8050,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/trackdash/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match Self::parse(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
