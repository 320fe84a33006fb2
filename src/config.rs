use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveTime;
use serde::Deserialize;

use crate::period;
use crate::rates::{RateTable, SessionRate};

pub const DEFAULT_CONFIG_FILE: &str = "payouts.toml";

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    cutoff_hour: u32,
    cutoff_minute: u32,
    verify_eligibility: bool,
    rates: Option<BTreeMap<String, SessionRate>>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            cutoff_hour: 0,
            cutoff_minute: 0,
            verify_eligibility: true,
            rates: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub cutoff: NaiveTime,
    pub rates: RateTable,
    pub verify_eligibility: bool,
    pub source: Option<PathBuf>,
}

impl AppConfig {
    /// Reads `path`, or `payouts.toml` in the working directory when present.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if !default_path.exists() {
                    return Self::from_toml("", None);
                }
                default_path
            }
        };

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&raw, Some(path))
            .with_context(|| format!("invalid payout config {}", path.display()))
    }

    pub fn from_toml(raw: &str, source: Option<&Path>) -> anyhow::Result<Self> {
        let file: FileConfig = toml::from_str(raw)?;
        let cutoff = period::cutoff_time(file.cutoff_hour, file.cutoff_minute)?;
        let rates = match file.rates {
            Some(rates) => RateTable::new(rates)?,
            None => RateTable::default(),
        };
        Ok(Self {
            cutoff,
            rates,
            verify_eligibility: file.verify_eligibility,
            source: source.map(Path::to_path_buf),
        })
    }
}

pub fn database_url() -> anyhow::Result<String> {
    std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")
}
