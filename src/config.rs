//! Host configuration, loaded from TOML.
//!
//! Covers the listen address, the search deadline and one simulated profile
//! per provider. A missing default file means built-in defaults; a file
//! named explicitly must exist and parse.

use flightsearch_core::CoordinatorConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Top-level configuration for the flightsearch host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Coordinator settings (search deadline).
    pub search: CoordinatorConfig,
    /// Simulated providers, one inquiry router each.
    pub providers: Vec<ProviderProfile>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            search: CoordinatorConfig::default(),
            providers: vec![
                ProviderProfile::amadeus(),
                ProviderProfile::skyscanner(),
                ProviderProfile::aviationstack(),
            ],
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 5000,
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Inclusive `min..=max` range as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd> Span<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    fn is_ordered(&self) -> bool {
        self.min <= self.max
    }
}

/// Behaviour of one simulated flight provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderProfile {
    /// Provider id, also the routing key.
    pub id: String,
    /// Probability in `[0, 1]` that a call fails.
    pub failure_rate: f64,
    /// Airlines offers are drawn from.
    pub airlines: Vec<String>,
    /// Flight numbers offers are drawn from.
    pub flight_numbers: Vec<String>,
    /// Highest number of stops on a generated offer.
    pub max_stops: u8,
    /// Price added per stop.
    pub stop_surcharge: u32,
    /// Currency every offer is priced in.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Latency of a successful call, in milliseconds.
    pub delay_ms: Span<u64>,
    /// Latency of a failing call, in milliseconds.
    pub failure_delay_ms: Span<u64>,
    /// Number of offers per successful call.
    pub offers: Span<u32>,
    /// Hour of day (UTC) departures fall in.
    pub departure_hours: Span<u32>,
    /// Flight duration in minutes.
    pub duration_minutes: Span<u32>,
    /// Price before stop surcharges.
    pub base_price: Span<u32>,
}

fn default_currency() -> String {
    "USD".to_owned()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

impl ProviderProfile {
    /// Full-service carriers, moderate latency.
    pub fn amadeus() -> Self {
        Self {
            id: "Amadeus".to_owned(),
            failure_rate: 0.05,
            airlines: strings(&[
                "American Airlines",
                "Delta Air Lines",
                "United Airlines",
                "British Airways",
            ]),
            flight_numbers: strings(&["AA123", "AA456", "AA789", "AA321"]),
            max_stops: 2,
            stop_surcharge: 50,
            currency: default_currency(),
            delay_ms: Span::new(8_000, 12_000),
            failure_delay_ms: Span::new(2_000, 5_000),
            offers: Span::new(2, 4),
            departure_hours: Span::new(6, 19),
            duration_minutes: Span::new(180, 479),
            base_price: Span::new(200, 799),
        }
    }

    /// International carriers, slower and flakier.
    pub fn skyscanner() -> Self {
        Self {
            id: "Skyscanner".to_owned(),
            failure_rate: 0.10,
            airlines: strings(&[
                "Lufthansa",
                "Emirates",
                "Qatar Airways",
                "Singapore Airlines",
                "Air France",
            ]),
            flight_numbers: strings(&["LH001", "EK205", "QR915", "SQ25", "AF447"]),
            max_stops: 1,
            stop_surcharge: 75,
            currency: default_currency(),
            delay_ms: Span::new(15_000, 20_000),
            failure_delay_ms: Span::new(3_000, 6_000),
            offers: Span::new(3, 5),
            departure_hours: Span::new(8, 21),
            duration_minutes: Span::new(200, 519),
            base_price: Span::new(180, 749),
        }
    }

    /// Low-cost carriers, slowest of the three.
    pub fn aviationstack() -> Self {
        Self {
            id: "Aviationstack".to_owned(),
            failure_rate: 0.05,
            airlines: strings(&[
                "Southwest Airlines",
                "JetBlue Airways",
                "Alaska Airlines",
                "Frontier Airlines",
            ]),
            flight_numbers: strings(&["WN101", "B6205", "AS150", "F9420"]),
            max_stops: 1,
            stop_surcharge: 40,
            currency: default_currency(),
            delay_ms: Span::new(25_000, 30_000),
            failure_delay_ms: Span::new(4_000, 7_000),
            offers: Span::new(1, 3),
            departure_hours: Span::new(10, 17),
            duration_minutes: Span::new(150, 419),
            base_price: Span::new(150, 599),
        }
    }

    /// Validates this profile, returning an error naming the first bad field.
    pub fn validate(&self) -> crate::error::Result<()> {
        let fail = |what: &str| {
            Err(crate::error::AppError::Config(format!(
                "provider {}: {what}",
                self.id
            )))
        };
        if self.id.trim().is_empty() {
            return Err(crate::error::AppError::Config(
                "provider id must not be empty".to_owned(),
            ));
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return fail("failure_rate must be between 0 and 1");
        }
        if self.airlines.is_empty() || self.flight_numbers.is_empty() {
            return fail("airlines and flight_numbers must not be empty");
        }
        if !self.delay_ms.is_ordered() || !self.failure_delay_ms.is_ordered() {
            return fail("delay ranges must have min <= max");
        }
        if !self.offers.is_ordered()
            || !self.duration_minutes.is_ordered()
            || !self.base_price.is_ordered()
        {
            return fail("offer ranges must have min <= max");
        }
        if !self.departure_hours.is_ordered() || self.departure_hours.max > 23 {
            return fail("departure_hours must be an ordered range within 0..=23");
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::AppError::Config(e.to_string()))
    }

    /// Load `path` if given, else the default config file if it exists, else
    /// built-in defaults. The result is validated.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit `path` cannot be loaded or the loaded
    /// configuration is invalid.
    pub fn load(path: Option<&Path>) -> crate::error::Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::default_config_path();
                if default_path.is_file() {
                    Self::from_file(&default_path)?
                } else {
                    tracing::debug!(path = %default_path.display(), "no config file, using defaults");
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/flightsearch/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp/flightsearch-config"))
            .join("flightsearch")
            .join("config.toml")
    }

    /// Validates the whole configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`](crate::error::AppError::Config) describing
    /// the first problem found.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.server.port == 0 {
            return Err(crate::error::AppError::Config(
                "server.port must be greater than 0".to_owned(),
            ));
        }
        self.search.validate()?;
        if self.providers.is_empty() {
            return Err(crate::error::AppError::Config(
                "at least one provider must be configured".to_owned(),
            ));
        }
        let mut seen = HashSet::new();
        for profile in &self.providers {
            profile.validate()?;
            if !seen.insert(profile.id.as_str()) {
                return Err(crate::error::AppError::Config(format!(
                    "provider {} configured twice",
                    profile.id
                )));
            }
        }
        Ok(())
    }
}
