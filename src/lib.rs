//! Sales funnel analytics and month-end forecasting.
//!
//! The engines in [`funnel`] and [`forecast`] are pure functions over plain
//! numbers. [`db`] loads those numbers from the daily report store, and
//! [`report`] / [`export`] render the results.

pub mod config;
pub mod db;
pub mod export;
pub mod forecast;
pub mod funnel;
pub mod models;
pub mod report;

pub use config::{resolve_goal, Benchmarks, Config};
pub use forecast::{cumulative_observations, forecast_monthly, forecast_weighted};
pub use funnel::compute_funnel;
pub use models::{ForecastResult, FunnelReport, Observation, StageCounts, StageId};
