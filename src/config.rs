//! Runtime configuration for the dashboard, loaded from the environment.
//!
//! A `.env` file is honoured through `dotenv`. Every value has a default so the
//! dashboard starts without any configuration at all.

use crate::api::builtin_stations;
use crate::error::{AppError, Result};
use crate::models::{BoundingBox, Station};
use chrono::NaiveDate;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_API_BASE_URL: &str = "https://genhack4-hackathon-vertex.vercel.app";

/// Everything the dashboard needs that is not user interaction.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Base URL of the climate API, without a trailing slash.
    pub api_base_url: String,
    /// Region queried for heatmap data.
    pub heatmap_bbox: BoundingBox,
    /// Stations shown when the API returns none.
    pub fallback_stations: Vec<Station>,
    pub http_timeout: Duration,
    /// Interval between backend health checks.
    pub health_interval: Duration,
    pub probe_max_wait: Duration,
    pub probe_interval: Duration,
    /// How long a rendering error must persist before it becomes terminal.
    pub render_grace: Duration,
    pub timeline_start: NaiveDate,
    pub timeline_end: NaiveDate,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            heatmap_bbox: BoundingBox::paris(),
            fallback_stations: builtin_stations(),
            http_timeout: Duration::from_secs(30),
            health_interval: Duration::from_secs(30),
            probe_max_wait: Duration::from_millis(2000),
            probe_interval: Duration::from_millis(100),
            render_grace: Duration::from_millis(2000),
            timeline_start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
            timeline_end: NaiveDate::from_ymd_opt(2021, 12, 31).unwrap_or_default(),
        }
    }
}

impl DashboardConfig {
    /// Loads configuration from `.env` and the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        let api_base_url = env::var("CLIMATE_API_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base_url);

        let config = Self {
            api_base_url,
            heatmap_bbox: parse_var("CLIMATE_HEATMAP_BBOX")?.unwrap_or(defaults.heatmap_bbox),
            fallback_stations: defaults.fallback_stations,
            http_timeout: secs_var("CLIMATE_HTTP_TIMEOUT_SECS")?.unwrap_or(defaults.http_timeout),
            health_interval: secs_var("CLIMATE_HEALTH_INTERVAL_SECS")?
                .unwrap_or(defaults.health_interval),
            probe_max_wait: millis_var("CLIMATE_PROBE_MAX_WAIT_MS")?
                .unwrap_or(defaults.probe_max_wait),
            probe_interval: millis_var("CLIMATE_PROBE_INTERVAL_MS")?
                .unwrap_or(defaults.probe_interval),
            render_grace: millis_var("CLIMATE_RENDER_GRACE_MS")?.unwrap_or(defaults.render_grace),
            timeline_start: parse_var("CLIMATE_TIMELINE_START")?.unwrap_or(defaults.timeline_start),
            timeline_end: parse_var("CLIMATE_TIMELINE_END")?.unwrap_or(defaults.timeline_end),
        };

        if config.timeline_end < config.timeline_start {
            return Err(AppError::Config(format!(
                "Timeline end {} is before start {}",
                config.timeline_end, config.timeline_start
            )));
        }
        if config.probe_interval.is_zero() {
            warn!("CLIMATE_PROBE_INTERVAL_MS is 0; probe will retry without pausing");
        }

        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }
}

fn parse_var<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AppError::Config(format!("{}='{}': {}", key, raw, e))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(AppError::Env(e)),
    }
}

fn secs_var(key: &str) -> Result<Option<Duration>> {
    Ok(parse_var::<u64>(key)?.map(Duration::from_secs))
}

fn millis_var(key: &str) -> Result<Option<Duration>> {
    Ok(parse_var::<u64>(key)?.map(Duration::from_millis))
}
