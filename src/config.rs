//! # Configuration Management
//!
//! Two files configure a run:
//!
//! - `agenda-config.toml`: display size, panel wiring, calendars, cache and
//!   file locations. Optional; a missing or invalid file means defaults.
//! - `weather.json`: forecast location and DataHub API key. Required unless
//!   weather is disabled. A missing file is replaced by a template to fill in.
//!
//! Command-line flags override the TOML values in `main.rs`.

use crate::agenda::DEFAULT_LOOKAHEAD_DAYS;
use crate::cache::DEFAULT_TTL_HOURS;
use crate::frame::{DEFAULT_HEIGHT, DEFAULT_WIDTH};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default application config file name
pub const CONFIG_FILE: &str = "agenda-config.toml";

/// Template written when `weather.json` is missing.
const WEATHER_TEMPLATE: &str = "{\n\t\"lat\": \"54.9755153\",\n\t\"lon\": \"-1.6222127\",\n\t\"apikey\": \"00000000-0000-0000-0000-000000000000\"\n}\n";

/// Errors loading required configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No credentials file existed, so a template was written in its place
    #[error("{} created. Fill it in and retry.", .0.display())]
    TemplateCreated(PathBuf),

    /// The file exists but lacks fields or holds unusable values
    #[error("{} is in an incorrect format: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("config IO on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Application configuration loaded from agenda-config.toml
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub display: DisplayConfig,
    pub agenda: AgendaConfig,
    pub cache: CacheConfig,
    pub paths: PathsConfig,
}

/// Frame size and panel wiring
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Frame width in pixels (file output only; the panel fixes its own)
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    pub hardware: HardwareConfig,
}

/// GPIO lines (BCM numbering) and SPI device of the panel HAT.
/// Chip select is driven by the kernel SPI driver.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub spi_device: String,
    pub gpio_chip: String,
    pub dc_pin: u32,
    pub rst_pin: u32,
    pub busy_pin: u32,
    /// SPI clock in Hz
    pub spi_speed_hz: u32,
}

/// Which calendars to read and how far ahead
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AgendaConfig {
    /// Comma-separated calendar names; `primary` is the account's main one
    pub calendars: String,
    pub lookahead_days: u32,
}

/// Change-detection cache. No path disables it.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub path: Option<PathBuf>,
    pub ttl_hours: u32,
}

/// Credential file locations
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// File holding a Google OAuth access token
    pub token_file: PathBuf,
    pub weather_file: PathBuf,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            hardware: HardwareConfig::default(),
        }
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        // Waveshare e-Paper HAT wiring
        Self {
            spi_device: "/dev/spidev0.0".to_string(),
            gpio_chip: "/dev/gpiochip0".to_string(),
            dc_pin: 25,
            rst_pin: 17,
            busy_pin: 24,
            spi_speed_hz: 4_000_000,
        }
    }
}

impl Default for AgendaConfig {
    fn default() -> Self {
        Self {
            calendars: "primary".to_string(),
            lookahead_days: DEFAULT_LOOKAHEAD_DAYS,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            ttl_hours: DEFAULT_TTL_HOURS,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            token_file: PathBuf::from("token.json"),
            weather_file: PathBuf::from("weather.json"),
        }
    }
}

impl Config {
    /// Load configuration from agenda-config.toml
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_FILE)
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    tracing::debug!("loaded configuration from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("invalid config file {}: {}", path.display(), e);
                    tracing::warn!("using default configuration");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("no config file at {}, using defaults", path.display());
                Self::default()
            }
        }
    }
}

/// Forecast location and API key
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherConfig {
    pub lat: f64,
    pub lon: f64,
    pub apikey: String,
}

/// On-disk shape. Coordinates are usually quoted strings but plain numbers
/// are accepted too.
#[derive(Deserialize)]
struct RawWeatherConfig {
    lat: Option<serde_json::Value>,
    lon: Option<serde_json::Value>,
    apikey: Option<String>,
}

impl WeatherConfig {
    /// Read the credentials, writing a template and failing if there are none.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => Self::parse(path, &contents),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                fs::write(path, WEATHER_TEMPLATE).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Err(ConfigError::TemplateCreated(path.to_path_buf()))
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let malformed = |reason: String| ConfigError::Malformed {
            path: path.to_path_buf(),
            reason,
        };

        let raw: RawWeatherConfig =
            serde_json::from_str(contents).map_err(|e| malformed(e.to_string()))?;

        let coordinate = |name: &str, value: Option<serde_json::Value>| -> Result<f64, ConfigError> {
            let parsed = match value {
                Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
                Some(serde_json::Value::Number(n)) => n.as_f64(),
                _ => return Err(malformed(format!("missing \"{}\"", name))),
            };
            parsed.ok_or_else(|| malformed(format!("\"{}\" is not a number", name)))
        };

        let lat = coordinate("lat", raw.lat)?;
        let lon = coordinate("lon", raw.lon)?;
        let apikey = raw
            .apikey
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| malformed("missing \"apikey\"".to_string()))?;

        Ok(Self { lat, lon, apikey })
    }
}
