//! Station data provider.
//!
//! Fetches the full station set. On success the set is replaced wholesale; on error
//! the previous set is kept and the error is exposed alongside it.

use crate::api::ClimateApiClient;
use crate::error::AppError;
use crate::models::Station;
use crate::runtime::RequestSequencer;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct StationsState {
    /// A new `Arc` is published only when a fetch succeeds.
    pub stations: Arc<Vec<Station>>,
    pub loading: bool,
    pub error: Option<AppError>,
}

impl Default for StationsState {
    fn default() -> Self {
        Self {
            stations: Arc::new(Vec::new()),
            // Nothing has been fetched yet
            loading: true,
            error: None,
        }
    }
}

pub struct StationProvider {
    client: ClimateApiClient,
    city: Option<String>,
    sequencer: RequestSequencer,
    state: watch::Sender<StationsState>,
}

impl StationProvider {
    pub fn new(client: ClimateApiClient, city: Option<String>) -> Self {
        let (state, _) = watch::channel(StationsState::default());
        Self {
            client,
            city,
            sequencer: RequestSequencer::new(),
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StationsState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> StationsState {
        self.state.borrow().clone()
    }

    /// Fetches the station set and publishes the outcome.
    pub async fn load(&self) -> StationsState {
        let ticket = self.sequencer.begin();
        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });

        let result = self.client.get_stations(self.city.as_deref()).await;
        if !ticket.is_current() {
            debug!("Discarding superseded station fetch {}", ticket.id());
            return self.state();
        }

        match result {
            Ok(stations) => {
                info!("Loaded {} stations", stations.len());
                self.state.send_replace(StationsState {
                    stations: Arc::new(stations),
                    loading: false,
                    error: None,
                });
            },
            Err(e) => {
                error!("Error fetching stations: {}", e);
                self.state.send_modify(|s| {
                    s.loading = false;
                    s.error = Some(e);
                });
            },
        }
        self.state()
    }
}
