//! Provides a client for the climate dashboard backend.
//!
//! This module defines `ClimateApiClient`, one async method per backend resource
//! (stations, temperature series, regional indicators, ERA5 grids, heatmap points and
//! the health check). Bodies are normalised through the decoders in `crate::models`.
//! The client never retries; callers decide whether to retry or fall back.

use crate::error::{AppError, Result};
use crate::models::{decode_listing, BoundingBox, RegionalIndicator, Station, TemperatureReading};
use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// An asynchronous client for the climate data API.
#[derive(Debug, Clone)]
pub struct ClimateApiClient {
    client: Client,
    base_url: String,
}

impl ClimateApiClient {
    /// Creates a client for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches all weather stations, optionally restricted to a city.
    ///
    /// Corresponds to `GET /api/stations[?city=]`.
    pub async fn get_stations(&self, city: Option<&str>) -> Result<Vec<Station>> {
        info!("Fetching stations (city: {})", city.unwrap_or("any"));
        let mut query = Vec::new();
        if let Some(city) = city {
            query.push(("city", city.to_string()));
        }
        let body = self.get_json("/api/stations", &query).await?;
        let stations: Vec<Station> = decode_listing(body, "stations")?;
        debug!("Received {} stations", stations.len());
        Ok(stations)
    }

    /// Fetches the daily temperature series for one station.
    ///
    /// Corresponds to `GET /api/temperature?station_id=&start_date=&end_date=`.
    pub async fn get_station_temperature(
        &self,
        station_id: i64,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<TemperatureReading>> {
        info!(
            "Fetching temperature series for station {} ({:?} to {:?})",
            station_id, start_date, end_date
        );
        let mut query = vec![("station_id", station_id.to_string())];
        if let Some(start) = start_date {
            query.push(("start_date", start.format(DATE_FORMAT).to_string()));
        }
        if let Some(end) = end_date {
            query.push(("end_date", end.format(DATE_FORMAT).to_string()));
        }
        let body = self.get_json("/api/temperature", &query).await?;
        let readings: Vec<TemperatureReading> = decode_listing(body, "data")?;
        debug!(
            "Received {} readings for station {}",
            readings.len(),
            station_id
        );
        Ok(readings)
    }

    /// Fetches aggregate temperature indicators per administrative zone.
    ///
    /// Corresponds to `GET /api/gadm/indicators?country=&admin_level=`.
    pub async fn get_gadm_indicators(
        &self,
        country: &str,
        admin_level: Option<u8>,
    ) -> Result<Vec<RegionalIndicator>> {
        info!(
            "Fetching GADM indicators for {} (admin level {:?})",
            country, admin_level
        );
        let mut query = vec![("country", country.to_string())];
        if let Some(level) = admin_level {
            query.push(("admin_level", level.to_string()));
        }
        let body = self.get_json("/api/gadm/indicators", &query).await?;
        decode_listing(body, "data")
    }

    /// Fetches gridded ERA5 climate data for a region and period.
    ///
    /// Corresponds to `GET /api/era5?bbox=&start_date=&end_date=&variables=`. The body is
    /// returned undecoded; see `crate::models::decode_grid_points`.
    pub async fn get_era5_data(
        &self,
        bbox: &BoundingBox,
        start_date: NaiveDate,
        end_date: NaiveDate,
        variables: Option<&[&str]>,
    ) -> Result<Value> {
        info!(
            "Fetching ERA5 data for {} from {} to {}",
            bbox, start_date, end_date
        );
        let mut query = vec![
            ("bbox", bbox.to_query()),
            ("start_date", start_date.format(DATE_FORMAT).to_string()),
            ("end_date", end_date.format(DATE_FORMAT).to_string()),
        ];
        if let Some(variables) = variables {
            query.push(("variables", variables.join(",")));
        }
        self.get_json("/api/era5", &query).await
    }

    /// Fetches heatmap samples for one date.
    ///
    /// Corresponds to `GET /api/heatmap?date=&bbox=`. The body is returned undecoded;
    /// see `crate::models::decode_heatmap_points`.
    pub async fn get_heatmap_data(
        &self,
        date: NaiveDate,
        bbox: Option<&BoundingBox>,
    ) -> Result<Value> {
        info!("Fetching heatmap data for {}", date);
        let mut query = vec![("date", date.format(DATE_FORMAT).to_string())];
        if let Some(bbox) = bbox {
            query.push(("bbox", bbox.to_query()));
        }
        self.get_json("/api/heatmap", &query).await
    }

    /// Returns true when `GET /health` answers with a success status.
    ///
    /// Never fails: transport errors count as unhealthy.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => {
                let healthy = response.status().is_success();
                debug!("Health check {} -> {}", url, response.status());
                healthy
            },
            Err(e) => {
                warn!("Health check {} failed: {}", url, e);
                false
            },
        }
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                error!("Error requesting {}: {}", url, e);
                AppError::from(e)
            })?;

        // Check HTTP status code and turn failures into a RequestFailure
        let status = response.status();
        if !status.is_success() {
            error!("API request to {} failed with status {}", url, status);
            if status == reqwest::StatusCode::NOT_FOUND {
                error!("Received 404 Not Found. Check CLIMATE_API_BASE_URL and the endpoint path.");
            }
            return Err(AppError::Request {
                status: status.as_u16(),
                url,
            });
        }

        response.json::<Value>().await.map_err(|e| {
            error!("Error parsing response JSON from {}: {}", url, e);
            AppError::Decode(format!("{} returned invalid JSON: {}", url, e))
        })
    }
}
