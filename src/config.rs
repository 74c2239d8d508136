use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::models::StageId;

pub const CONFIG_ENV: &str = "SALES_ANALYTICS_CONFIG";

/// Expected stage-over-previous conversion, in percent. The first stage has
/// no predecessor and so no benchmark.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Benchmarks {
    pub zoom1_held: f64,
    pub zoom2_held: f64,
    pub contract_review: f64,
    pub push: f64,
    pub deals: f64,
}

impl Default for Benchmarks {
    fn default() -> Self {
        Self {
            zoom1_held: 60.0,
            zoom2_held: 50.0,
            contract_review: 40.0,
            push: 50.0,
            deals: 30.0,
        }
    }
}

impl Benchmarks {
    pub fn for_stage(&self, stage: StageId) -> f64 {
        match stage {
            StageId::ZoomBooked => 0.0,
            StageId::Zoom1Held => self.zoom1_held,
            StageId::Zoom2Held => self.zoom2_held,
            StageId::ContractReview => self.contract_review,
            StageId::Push => self.push,
            StageId::Deals => self.deals,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Days after which a day's weight in the weighted forecast halves.
    pub half_life_days: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self { half_life_days: 7.0 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GoalConfig {
    pub default: f64,
    pub managers: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub benchmarks: Benchmarks,
    pub forecast: ForecastConfig,
    pub goals: GoalConfig,
}

impl Config {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid configuration")
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Explicit path first, then the environment, then built-in defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        match path {
            Some(path) => {
                let config = Self::from_path(&path)?;
                tracing::info!(path = %path.display(), "loaded configuration");
                Ok(config)
            }
            None => {
                tracing::debug!("no configuration file, using defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Sales goal for a manager, or for the whole team when `manager` is `None`.
/// Managers without an override get the default; the team goal falls back to
/// the sum of manager goals when no default is set.
pub fn resolve_goal(goals: &GoalConfig, manager: Option<&str>) -> f64 {
    match manager {
        Some(name) => goals.managers.get(name).copied().unwrap_or(goals.default),
        None if goals.default > 0.0 => goals.default,
        None => goals.managers.values().sum(),
    }
}
