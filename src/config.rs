//! Run configuration, read from a TOML file.
//!
//! Every key is optional; missing keys fall back to the values of the Cape
//! Verde yearly extraction.

use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    request::{Frequency, Reducer},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Cloud project the Earth Engine session is opened for
    pub project_id: String,
    pub location: String,
    pub frequency: Frequency,
    pub start_year: i32,
    /// Exclusive
    pub end_year: i32,
    pub out_dir: PathBuf,
    pub dataset: String,
    pub band: String,
    /// Output pixel size in meters. The dataset is nominally 0.1 degree.
    pub scale: f64,
    pub crs: String,
    pub reducer: Reducer,
    /// (lon, lat) vertices
    pub region: Vec<(f64, f64)>,
    /// Per network call. Absent means wait indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub base_url: String,
    /// Environment variable holding the OAuth access token
    pub token_env: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            project_id: "ee-scoutdp".to_string(),
            location: "Cape_Verde".to_string(),
            frequency: Frequency::Year,
            start_year: 2001,
            end_year: 2002,
            out_dir: default_out_dir(),
            dataset: "NASA/GPM_L3/IMERG_V06".to_string(),
            band: "precipitationCal".to_string(),
            scale: 11132.0,
            crs: "EPSG:4326".to_string(),
            reducer: Reducer::Sum,
            region: vec![
                (14.30578, -25.82906),
                (17.56269, -25.82906),
                (17.56269, -22.18359),
                (14.30578, -22.18359),
            ],
            timeout_secs: None,
            service: ServiceConfig::default(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            base_url: "https://earthengine.googleapis.com".to_string(),
            token_env: "EE_ACCESS_TOKEN".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read `{}`: {}", path.display(), e)))?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn default_out_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("NASA_GPM_Data")
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn should_default_to_cape_verde_yearly() {
        let config = Config::default();

        assert_eq!(config.location, "Cape_Verde");
        assert_eq!(config.frequency, Frequency::Year);
        assert_eq!((config.start_year, config.end_year), (2001, 2002));
        assert_eq!(config.dataset, "NASA/GPM_L3/IMERG_V06");
        assert_eq!(config.band, "precipitationCal");
        assert_eq!(config.scale, 11132.0);
        assert_eq!(config.crs, "EPSG:4326");
        assert_eq!(config.reducer, Reducer::Sum);
        assert_eq!(config.region.len(), 4);
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn should_fill_missing_keys_with_defaults() {
        let config = Config::from_toml_str(
            r#"
            location = "Sal"
            frequency = "month"
            timeout_secs = 30

            [service]
            token_env = "MY_TOKEN"
            "#,
        )
        .unwrap();

        assert_eq!(config.location, "Sal");
        assert_eq!(config.frequency, Frequency::Month);
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.service.token_env, "MY_TOKEN");
        assert_eq!(config.service.base_url, "https://earthengine.googleapis.com");
        assert_eq!(config.band, "precipitationCal");
    }

    #[test]
    fn should_read_region_as_pairs() {
        let config = Config::from_toml_str(
            "region = [[-25.3, 14.8], [-22.6, 14.8], [-22.6, 17.3], [-25.3, 17.3]]",
        )
        .unwrap();

        assert_eq!(config.region[2], (-22.6, 17.3));
    }

    #[test]
    fn should_reject_unknown_keys() {
        let result = Config::from_toml_str("sclae = 1000");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn should_round_trip_defaults_through_toml() {
        let config = Config::default();
        let text = config.to_toml_string().unwrap();

        assert_eq!(Config::from_toml_str(&text).unwrap(), config);
    }
}
