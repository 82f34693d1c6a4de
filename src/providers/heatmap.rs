//! Heatmap data provider.
//!
//! Produces the weighted points of the heatmap overlay for a (date, variable) query
//! inside a fixed bounding box. Resolution order:
//!
//! 1. the dedicated `/api/heatmap` endpoint,
//! 2. on failure or an empty result, points derived from the gridded `/api/era5` data,
//! 3. otherwise an empty set.
//!
//! Fetch errors never escape: they are stored next to the (empty) point set. A fetch
//! first publishes an empty, loading state and then the complete set, never a partial
//! one. Results of a fetch that was superseded by a newer one are discarded.

use crate::api::ClimateApiClient;
use crate::error::AppError;
use crate::models::{
    decode_grid_points, decode_heatmap_points, decode_listing, BoundingBox, HeatmapPoint,
    HeatmapVariable,
};
use crate::runtime::RequestSequencer;
use chrono::NaiveDate;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Date queried when the caller does not supply one.
pub fn default_heatmap_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatmapQuery {
    pub date: Option<NaiveDate>,
    pub variable: HeatmapVariable,
    pub enabled: bool,
}

impl Default for HeatmapQuery {
    fn default() -> Self {
        Self {
            date: None,
            variable: HeatmapVariable::Temperature,
            enabled: true,
        }
    }
}

/// Where the current point set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeatmapSource {
    #[default]
    None,
    HeatmapEndpoint,
    Grid,
}

#[derive(Debug, Clone, Default)]
pub struct HeatmapState {
    pub points: Arc<Vec<HeatmapPoint>>,
    pub source: HeatmapSource,
    pub loading: bool,
    pub error: Option<AppError>,
}

pub struct HeatmapProvider {
    client: ClimateApiClient,
    bbox: BoundingBox,
    sequencer: RequestSequencer,
    state: watch::Sender<HeatmapState>,
}

impl HeatmapProvider {
    pub fn new(client: ClimateApiClient, bbox: BoundingBox) -> Self {
        let (state, _) = watch::channel(HeatmapState::default());
        Self {
            client,
            bbox,
            sequencer: RequestSequencer::new(),
            state,
        }
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn subscribe(&self) -> watch::Receiver<HeatmapState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> HeatmapState {
        self.state.borrow().clone()
    }

    /// Fetches the point set for `query` and publishes it.
    ///
    /// Returns the state this call published, or the current state if the call was
    /// superseded while in flight.
    pub async fn fetch(&self, query: &HeatmapQuery) -> HeatmapState {
        let ticket = self.sequencer.begin();

        if !query.enabled {
            self.state.send_replace(HeatmapState::default());
            return self.state();
        }

        // Discard the previous set before the new one resolves
        self.state.send_replace(HeatmapState {
            loading: true,
            ..HeatmapState::default()
        });

        let date = query.date.unwrap_or_else(default_heatmap_date);
        let (points, source, error) = self.resolve(date, query.variable).await;

        if !ticket.is_current() {
            debug!(
                "Discarding heatmap result for {} (request {} superseded)",
                date,
                ticket.id()
            );
            return self.state();
        }

        info!(
            "Heatmap for {} / {}: {} points from {:?}",
            date,
            query.variable,
            points.len(),
            source
        );
        let state = HeatmapState {
            points: Arc::new(points),
            source,
            loading: false,
            error,
        };
        self.state.send_replace(state.clone());
        state
    }

    /// Resolves the point set for `query` without publishing it or touching the
    /// request sequence. Used for side-by-side comparisons.
    pub async fn peek(&self, query: &HeatmapQuery) -> HeatmapState {
        if !query.enabled {
            return HeatmapState::default();
        }
        let date = query.date.unwrap_or_else(default_heatmap_date);
        let (points, source, error) = self.resolve(date, query.variable).await;
        HeatmapState {
            points: Arc::new(points),
            source,
            loading: false,
            error,
        }
    }

    async fn resolve(
        &self,
        date: NaiveDate,
        variable: HeatmapVariable,
    ) -> (Vec<HeatmapPoint>, HeatmapSource, Option<AppError>) {
        let mut last_error = None;

        match self.from_heatmap_endpoint(date).await {
            Ok(points) if !points.is_empty() => {
                return (points, HeatmapSource::HeatmapEndpoint, None)
            },
            Ok(_) => debug!("Heatmap endpoint returned no points for {}", date),
            Err(e) => {
                warn!("Heatmap endpoint not available: {}", e);
                last_error = Some(e);
            },
        }

        match self.from_grid(date, variable).await {
            Ok(points) if !points.is_empty() => return (points, HeatmapSource::Grid, None),
            Ok(_) => debug!("Gridded data yielded no points for {}", date),
            Err(e) => {
                warn!("Gridded heatmap fallback failed: {}", e);
                last_error = Some(e);
            },
        }

        (Vec::new(), HeatmapSource::None, last_error)
    }

    async fn from_heatmap_endpoint(
        &self,
        date: NaiveDate,
    ) -> crate::error::Result<Vec<HeatmapPoint>> {
        let body = self.client.get_heatmap_data(date, Some(&self.bbox)).await?;
        let items: Vec<Value> = decode_listing(body, "data")?;
        Ok(decode_heatmap_points(&items, &self.bbox))
    }

    async fn from_grid(
        &self,
        date: NaiveDate,
        variable: HeatmapVariable,
    ) -> crate::error::Result<Vec<HeatmapPoint>> {
        let field = variable.grid_field();
        let body = self
            .client
            .get_era5_data(&self.bbox, date, date, Some(&[field][..]))
            .await?;
        decode_grid_points(body, field, &self.bbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};
    use rstest::rstest;
    use serde_json::json;
    use std::time::Duration;

    fn provider(server: &ServerGuard, bbox: BoundingBox) -> HeatmapProvider {
        let client = ClimateApiClient::new(&server.url(), Duration::from_secs(5)).unwrap();
        HeatmapProvider::new(client, bbox)
    }

    fn query(y: i32, m: u32, d: u32) -> HeatmapQuery {
        HeatmapQuery {
            date: NaiveDate::from_ymd_opt(y, m, d),
            ..HeatmapQuery::default()
        }
    }

    #[tokio::test]
    async fn primary_endpoint_points_are_used() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/heatmap")
            .match_query(Matcher::UrlEncoded("date".into(), "2020-07-01".into()))
            .with_status(200)
            .with_body(
                json!({ "data": [
                    { "position": [2.30, 48.85], "weight": 25.0 },
                    { "lon": 2.40, "lat": 48.90, "temperature": 26.5 }
                ]})
                .to_string(),
            )
            .create_async()
            .await;

        let provider = provider(&server, BoundingBox::paris());
        let state = provider.fetch(&query(2020, 7, 1)).await;
        assert_eq!(state.source, HeatmapSource::HeatmapEndpoint);
        assert_eq!(state.points.len(), 2);
        assert!(!state.loading);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn falls_back_to_grid_when_endpoint_fails() {
        let mut server = Server::new_async().await;
        let _h = server
            .mock("GET", "/api/heatmap")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;
        let _e = server
            .mock("GET", "/api/era5")
            .match_query(Matcher::UrlEncoded("variables".into(), "t2m".into()))
            .with_status(200)
            .with_body(
                json!([
                    { "longitude": 2.25, "latitude": 48.82, "t2m": 290.1 },
                    { "longitude": 2.45, "latitude": 48.98, "t2m": 291.4 }
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let provider = provider(&server, BoundingBox::paris());
        let state = provider.fetch(&query(2020, 7, 1)).await;
        assert_eq!(state.source, HeatmapSource::Grid);
        assert_eq!(state.points.len(), 2);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn falls_back_to_grid_when_endpoint_is_empty() {
        let mut server = Server::new_async().await;
        let _h = server
            .mock("GET", "/api/heatmap")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"data": []}"#)
            .create_async()
            .await;
        let _e = server
            .mock("GET", "/api/era5")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({ "data": [{ "lon": 2.3, "lat": 48.9, "t2m": 288.0 }] }).to_string())
            .create_async()
            .await;

        let state = provider(&server, BoundingBox::paris()).fetch(&query(2021, 1, 5)).await;
        assert_eq!(state.source, HeatmapSource::Grid);
        assert_eq!(state.points.len(), 1);
    }

    #[tokio::test]
    async fn total_failure_yields_empty_set_with_error() {
        let mut server = Server::new_async().await;
        let _h = server
            .mock("GET", "/api/heatmap")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;
        let _e = server
            .mock("GET", "/api/era5")
            .match_query(Matcher::Any)
            .with_status(502)
            .create_async()
            .await;

        let provider = provider(&server, BoundingBox::paris());
        let state = provider.fetch(&query(2020, 1, 1)).await;
        assert!(state.points.is_empty());
        assert_eq!(state.source, HeatmapSource::None);
        assert_eq!(state.error.and_then(|e| e.status()), Some(502));
    }

    #[tokio::test]
    async fn disabled_query_publishes_empty_without_fetching() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/api/heatmap")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let provider = provider(&server, BoundingBox::paris());
        let state = provider
            .fetch(&HeatmapQuery {
                enabled: false,
                ..HeatmapQuery::default()
            })
            .await;
        assert!(state.points.is_empty());
        assert!(!state.loading);
        m.assert_async().await;
    }

    #[tokio::test]
    async fn missing_date_defaults_to_start_of_2020() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/api/heatmap")
            .match_query(Matcher::UrlEncoded("date".into(), "2020-01-01".into()))
            .with_status(200)
            .with_body(json!({ "data": [{ "position": [2.3, 48.9], "weight": 3.0 }] }).to_string())
            .create_async()
            .await;

        let state = provider(&server, BoundingBox::paris())
            .fetch(&HeatmapQuery::default())
            .await;
        assert_eq!(state.points.len(), 1);
        m.assert_async().await;
    }

    #[rstest]
    #[case(BoundingBox::paris())]
    #[case(BoundingBox::new(4.7, 52.3, 5.0, 52.45).unwrap())]
    #[case(BoundingBox::new(-0.2, 51.4, 0.1, 51.6).unwrap())]
    #[tokio::test]
    async fn every_point_lies_inside_the_query_bbox(#[case] bbox: BoundingBox) {
        let (cx, cy) = bbox.center();
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/heatmap")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({ "data": [
                    { "position": [cx, cy], "weight": 1.0 },
                    { "position": [bbox.lon_min, bbox.lat_max], "weight": 2.0 },
                    { "position": [bbox.lon_max + 0.5, cy], "weight": 3.0 },
                    { "position": [cx, bbox.lat_min - 0.01], "weight": 4.0 },
                    { "position": [0.0, 0.0], "weight": 5.0 }
                ]})
                .to_string(),
            )
            .create_async()
            .await;

        let state = provider(&server, bbox).fetch(&query(2020, 6, 1)).await;
        assert_eq!(state.points.len(), 2);
        assert!(state
            .points
            .iter()
            .all(|p| bbox.contains(p.lon(), p.lat())));
    }

    #[tokio::test]
    async fn fetch_clears_previous_points_while_loading() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/heatmap")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({ "data": [{ "position": [2.3, 48.9], "weight": 3.0 }] }).to_string())
            .create_async()
            .await;

        let provider = provider(&server, BoundingBox::paris());
        provider.fetch(&query(2020, 6, 1)).await;
        assert_eq!(provider.state().points.len(), 1);

        let mut rx = provider.subscribe();
        let next_day = query(2020, 6, 2);
        let (final_state, first_seen) = tokio::join!(provider.fetch(&next_day), async {
            rx.changed().await.ok();
            rx.borrow_and_update().clone()
        });
        assert!(first_seen.loading);
        assert!(first_seen.points.is_empty());
        assert_eq!(final_state.points.len(), 1);
    }

    #[tokio::test]
    async fn peek_does_not_publish() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/heatmap")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!([{ "position": [2.3, 48.9], "weight": 3.0 }]).to_string())
            .create_async()
            .await;

        let provider = provider(&server, BoundingBox::paris());
        let rx = provider.subscribe();
        let peeked = provider.peek(&query(2021, 3, 1)).await;
        assert_eq!(peeked.points.len(), 1);
        assert_eq!(peeked.source, HeatmapSource::HeatmapEndpoint);
        assert!(!rx.has_changed().unwrap());
        assert!(provider.state().points.is_empty());
    }
}
