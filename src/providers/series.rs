//! Temperature-series provider for the selected station.
//!
//! Selecting a station fetches its full series, replacing whatever series was shown
//! before. Nothing is cached or merged across selections.

use crate::api::ClimateApiClient;
use crate::error::AppError;
use crate::models::{Station, StationSeriesPoint};
use crate::runtime::RequestSequencer;
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct SeriesState {
    pub station_id: Option<i64>,
    /// Ordered by date.
    pub points: Arc<Vec<StationSeriesPoint>>,
    pub loading: bool,
    pub error: Option<AppError>,
}

pub struct SeriesProvider {
    client: ClimateApiClient,
    sequencer: RequestSequencer,
    state: watch::Sender<SeriesState>,
}

impl SeriesProvider {
    pub fn new(client: ClimateApiClient) -> Self {
        let (state, _) = watch::channel(SeriesState::default());
        Self {
            client,
            sequencer: RequestSequencer::new(),
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SeriesState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SeriesState {
        self.state.borrow().clone()
    }

    /// Drops the current series and cancels any fetch in flight.
    pub fn clear(&self) {
        self.sequencer.invalidate();
        self.state.send_replace(SeriesState::default());
    }

    /// Fetches the series of `station` between the optional bounds.
    pub async fn select(
        &self,
        station: &Station,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> SeriesState {
        let ticket = self.sequencer.begin();
        self.state.send_replace(SeriesState {
            station_id: Some(station.id),
            loading: true,
            ..SeriesState::default()
        });

        let result = self
            .client
            .get_station_temperature(station.id, start, end)
            .await;
        if !ticket.is_current() {
            debug!(
                "Discarding series for station {} (request {} superseded)",
                station.id,
                ticket.id()
            );
            return self.state();
        }

        let state = match result {
            Ok(readings) => {
                let mut points: Vec<StationSeriesPoint> = readings
                    .into_iter()
                    .map(|r| StationSeriesPoint::from_reading(station.id, r))
                    .collect();
                points.sort_by_key(|p| p.date);
                info!("Loaded {} readings for {}", points.len(), station.name);
                SeriesState {
                    station_id: Some(station.id),
                    points: Arc::new(points),
                    loading: false,
                    error: None,
                }
            },
            Err(e) => {
                warn!("Failed to fetch temperature for station {}: {}", station.id, e);
                SeriesState {
                    station_id: Some(station.id),
                    points: Arc::new(Vec::new()),
                    loading: false,
                    error: Some(e),
                }
            },
        };
        self.state.send_replace(state.clone());
        state
    }

    /// Publishes a series produced elsewhere (demo data) for `station_id`.
    pub fn publish(&self, station_id: i64, points: Vec<StationSeriesPoint>) {
        self.sequencer.invalidate();
        self.state.send_replace(SeriesState {
            station_id: Some(station_id),
            points: Arc::new(points),
            loading: false,
            error: None,
        });
    }
}
