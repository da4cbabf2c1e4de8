use std::{
    collections::HashSet,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable identifier of one scheduler instance.
pub type InstanceId = String;

pub const DEFAULT_UPDATE_INTERVAL: u64 = 120; // 2 minutes
pub const MIN_UPDATE_INTERVAL: u64 = 30;
pub const MAX_UPDATE_INTERVAL: u64 = 3600;

#[derive(Debug, Error, PartialEq)]
#[error("update interval must be within 30..=3600 seconds, got {0}")]
pub struct IntervalError(pub u64);

/// Validate a refresh interval given in seconds.
pub fn update_interval(secs: u64) -> Result<Duration, IntervalError> {
    if (MIN_UPDATE_INTERVAL..=MAX_UPDATE_INTERVAL).contains(&secs) {
        Ok(Duration::from_secs(secs))
    } else {
        Err(IntervalError(secs))
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_reports() -> String {
    "0.0.0.0:4000".to_string()
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("apps/server/static")
}

#[derive(Debug, PartialEq, Deserialize, Serialize)]
pub struct RawConfig {
    pub server: Server,
    #[serde(rename = "light", default)]
    pub lights: Vec<RawLight>,
}

impl RawConfig {
    /// Parse the config file at the specified path.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file at {:?}", path))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .context("Failed to read config file to string")?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn example() -> Self {
        Self {
            server: Server {
                listen: default_listen(),
                reports: default_reports(),
                state_file: PathBuf::from("/var/lib/light-scheduler/state.json"),
                static_dir: default_static_dir(),
            },
            lights: vec![RawLight {
                id: "living-room".to_string(),
                name: Some("Living Room".to_string()),
                address: "esp-light0.local:4210".to_string(),
                device_id: 0,
                update_interval: Some(DEFAULT_UPDATE_INTERVAL),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Server {
    /// Address of the HTTP API.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// UDP address fixtures send their state reports to.
    #[serde(default = "default_reports")]
    pub reports: String,

    /// JSON file holding edited schedules and options.
    pub state_file: PathBuf,

    /// Directory with the schedule editor page and its assets.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

#[derive(Debug, PartialEq, Deserialize, Serialize)]
pub struct RawLight {
    /// Instance id used in API paths.
    pub id: String,

    /// Display name, defaults to the id.
    pub name: Option<String>,

    /// Control address of the fixture (host or host:port).
    pub address: String,

    /// Id the fixture puts in its state reports.
    pub device_id: u32,

    /// Refresh interval in seconds.
    pub update_interval: Option<u64>,
}

#[derive(Debug)]
pub struct Config {
    pub server: Server,
    pub lights: Vec<LightConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightConfig {
    pub id: InstanceId,
    pub name: String,
    pub address: String,
    pub device_id: u32,
    pub update_interval: Duration,
}

impl TryFrom<RawLight> for LightConfig {
    type Error = anyhow::Error;

    fn try_from(raw: RawLight) -> Result<Self, Self::Error> {
        if raw.id.is_empty() {
            bail!("Light id must not be empty");
        }
        let update_interval = update_interval(raw.update_interval.unwrap_or(DEFAULT_UPDATE_INTERVAL))
            .context(format!("Invalid update_interval for light {:?}", raw.id))?;
        Ok(LightConfig {
            name: raw.name.unwrap_or_else(|| raw.id.clone()),
            id: raw.id,
            address: raw.address,
            device_id: raw.device_id,
            update_interval,
        })
    }
}

impl TryFrom<RawConfig> for Config {
    type Error = anyhow::Error;

    fn try_from(raw_config: RawConfig) -> Result<Self, Self::Error> {
        if raw_config.lights.is_empty() {
            bail!("No [[light]] configured");
        }

        let mut ids = HashSet::new();
        let mut lights = Vec::with_capacity(raw_config.lights.len());
        for raw_light in raw_config.lights {
            if !ids.insert(raw_light.id.clone()) {
                bail!("Duplicate light id {:?}", raw_light.id);
            }
            lights.push(LightConfig::try_from(raw_light)?);
        }

        Ok(Config {
            server: raw_config.server,
            lights,
        })
    }
}
