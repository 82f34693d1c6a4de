//! Map composition root.
//!
//! Owns all interactive state (selection, timeline, view, toggles) and wires the data
//! providers to the layer loaders. Lifecycle:
//!
//! ```text
//! Probing --probe ok--> Ready
//!    |                    |
//!    +--probe failed------+--persistent render error--> Error (terminal)
//! ```
//!
//! Layers are only handed out while `Ready`.

use crate::api::{ClimateApiClient, DemoDataProvider};
use crate::config::DashboardConfig;
use crate::dashboard::{
    DraggablePanel, ScreenPoint, Selection, SwipeDivider, Timeline, TimelineStep, Tooltip,
};
use crate::error::Result;
use crate::models::{HeatmapPoint, HeatmapVariable, Station, ViewState};
use crate::providers::{
    ConnectionMonitor, ConnectionStatus, HeatmapProvider, HeatmapQuery, HeatmapState,
    SeriesProvider, SeriesState, StationProvider, StationsState,
};
use crate::render::{
    wait_for_support, HeadlessSurface, HeatmapLayer, HeatmapStyle, MapLayer, RenderSurface,
    StationLayer, STATION_LAYER_ID,
};
use crate::runtime::{
    AsyncLayerLoader, LayerConfig, LayerState, LazyLayerSet, LazyLayersState, LoaderOptions,
    RequestSequencer, YieldPoint,
};
use chrono::NaiveDate;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Substrings (lowercase) identifying a rendering-engine error as a GPU context failure.
const WEBGL_FAILURE_MARKERS: [&str; 4] = ["webgl", "context lost", "gl context", "maxtexturesize"];

/// Layers of the comparison view load in batches of this size.
const COMPARISON_BATCH: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Probing,
    Ready,
    /// Terminal; carries the message shown to the user.
    Error(String),
}

impl Phase {
    pub fn is_ready(&self) -> bool {
        matches!(self, Phase::Ready)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Probing => f.write_str("probing"),
            Phase::Ready => f.write_str("ready"),
            Phase::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// Holds back GPU-related render errors for a grace period so transient failures do
/// not tear the map down.
#[derive(Debug, Clone)]
pub struct RenderErrorDebouncer {
    grace: Duration,
    pending: Option<(Instant, String)>,
}

impl RenderErrorDebouncer {
    pub fn new(grace: Duration) -> Self {
        Self { grace, pending: None }
    }

    pub fn is_webgl_failure(message: &str) -> bool {
        let message = message.to_lowercase();
        WEBGL_FAILURE_MARKERS.iter().any(|marker| message.contains(marker))
    }

    /// Records an error reported at `now`. Returns whether it armed (or kept armed)
    /// the pending failure; unrelated errors are ignored.
    pub fn report(&mut self, message: &str, now: Instant) -> bool {
        if !Self::is_webgl_failure(message) {
            return false;
        }
        match &mut self.pending {
            // The grace period runs from the first occurrence
            Some((_, latest)) => *latest = message.to_string(),
            None => self.pending = Some((now, message.to_string())),
        }
        true
    }

    /// Returns the failure to escalate once it has persisted for the grace period.
    pub fn tick(&mut self, now: Instant) -> Option<String> {
        match &self.pending {
            Some((first, _)) if now.saturating_duration_since(*first) >= self.grace => {
                self.pending.take().map(|(_, message)| message)
            },
            _ => None,
        }
    }

    /// Disarms a pending failure. Returns whether one was pending.
    pub fn recovered(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Slider commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineAction {
    SetPosition(u32),
    Previous,
    Next,
    Start,
    End,
}

/// Dependencies of the station layer; the station set is compared by identity.
#[derive(Debug, Clone)]
struct StationLayerDeps {
    stations: Arc<Vec<Station>>,
    selected: Option<i64>,
}

impl PartialEq for StationLayerDeps {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.stations, &other.stations) && self.selected == other.selected
    }
}

#[derive(Debug, Clone)]
struct HeatmapLayerDeps {
    points: Arc<Vec<HeatmapPoint>>,
}

impl PartialEq for HeatmapLayerDeps {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.points, &other.points)
    }
}

/// Last provider result and the station set resolved from it.
struct StationMemo {
    source: Arc<Vec<Station>>,
    resolved: Arc<Vec<Station>>,
}

struct UiState {
    selection: Selection,
    timeline: Timeline,
    view_state: ViewState,
    variable: HeatmapVariable,
    heatmap_visible: bool,
    stations_visible: bool,
    demo_mode: bool,
    series_panel: DraggablePanel,
    swipe: SwipeDivider,
}

pub struct Dashboard<S = HeadlessSurface> {
    config: DashboardConfig,
    surface: S,
    phase: watch::Sender<Phase>,
    render_errors: Mutex<RenderErrorDebouncer>,
    stations: StationProvider,
    heatmap: HeatmapProvider,
    series: SeriesProvider,
    connection: Arc<ConnectionMonitor>,
    demo: DemoDataProvider,
    station_memo: Mutex<Option<StationMemo>>,
    heatmap_refresh: RequestSequencer,
    ui: Mutex<UiState>,
    station_layer: AsyncLayerLoader<StationLayer, StationLayerDeps>,
    heatmap_layer: AsyncLayerLoader<HeatmapLayer, HeatmapLayerDeps>,
    comparison: LazyLayerSet<MapLayer>,
}

impl<S: RenderSurface> Dashboard<S> {
    pub fn new(config: DashboardConfig, surface: S) -> Result<Self> {
        let client = ClimateApiClient::new(&config.api_base_url, config.http_timeout)?;
        Self::with_client(config, client, surface)
    }

    pub fn with_client(
        config: DashboardConfig,
        client: ClimateApiClient,
        surface: S,
    ) -> Result<Self> {
        let timeline = Timeline::new(
            config.timeline_start,
            config.timeline_end,
            TimelineStep::default(),
        )?;
        let yield_point = YieldPoint::detect();
        let (phase, _) = watch::channel(Phase::Probing);

        Ok(Self {
            surface,
            phase,
            render_errors: Mutex::new(RenderErrorDebouncer::new(config.render_grace)),
            stations: StationProvider::new(client.clone(), None),
            heatmap: HeatmapProvider::new(client.clone(), config.heatmap_bbox),
            series: SeriesProvider::new(client.clone()),
            connection: Arc::new(ConnectionMonitor::new(client, config.health_interval)),
            demo: DemoDataProvider::default(),
            station_memo: Mutex::new(None),
            heatmap_refresh: RequestSequencer::new(),
            ui: Mutex::new(UiState {
                selection: Selection::default(),
                timeline,
                view_state: ViewState::default(),
                variable: HeatmapVariable::default(),
                heatmap_visible: true,
                stations_visible: true,
                demo_mode: false,
                series_panel: DraggablePanel::new(
                    "Temperature series",
                    ScreenPoint::new(100.0, 100.0),
                ),
                swipe: SwipeDivider::default(),
            }),
            station_layer: AsyncLayerLoader::new(yield_point),
            heatmap_layer: AsyncLayerLoader::new(yield_point),
            comparison: LazyLayerSet::new(COMPARISON_BATCH, yield_point),
            config,
        })
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    fn ui(&self) -> MutexGuard<'_, UiState> {
        self.ui.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ---- lifecycle -------------------------------------------------------------

    /// Probes the rendering surface and, when it is usable, loads the initial data.
    pub async fn start(&self) -> Phase {
        info!("Probing rendering surface");
        let probe = wait_for_support(
            &self.surface,
            self.config.probe_max_wait,
            self.config.probe_interval,
        )
        .await;
        if !probe.supported {
            let message = probe.error.unwrap_or_else(|| "WebGL not available".to_string());
            error!("Rendering surface unusable: {}", message);
            self.transition(Phase::Error(message));
            return self.phase();
        }

        if !self.transition(Phase::Ready) {
            // A render failure escalated while probing
            return self.phase();
        }
        self.reload_stations().await;
        self.refresh_heatmap().await;
        self.phase()
    }

    pub fn phase(&self) -> Phase {
        self.phase.borrow().clone()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Applies a phase change if it is a legal transition.
    fn transition(&self, next: Phase) -> bool {
        self.phase.send_if_modified(|current| {
            let allowed = matches!(
                (&*current, &next),
                (Phase::Probing, Phase::Ready)
                    | (Phase::Probing, Phase::Error(_))
                    | (Phase::Ready, Phase::Error(_))
            );
            if allowed {
                info!("Dashboard phase: {} -> {}", current, next);
                *current = next.clone();
            } else {
                debug!("Ignoring phase change {} -> {}", current, next);
            }
            allowed
        })
    }

    /// Feeds an error reported by the rendering engine into the debouncer.
    pub fn report_render_error(&self, message: &str) -> bool {
        self.report_render_error_at(message, Instant::now())
    }

    pub fn report_render_error_at(&self, message: &str, now: Instant) -> bool {
        let armed = self
            .render_errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .report(message, now);
        if armed {
            warn!("Render error (grace period running): {}", message);
        } else {
            debug!("Ignoring unrelated render error: {}", message);
        }
        armed
    }

    /// Clears a pending render failure after the engine recovered.
    pub fn render_recovered(&self) {
        if self.render_errors.lock().unwrap_or_else(|e| e.into_inner()).recovered() {
            info!("Renderer recovered within the grace period");
        }
    }

    /// Escalates a render failure that outlived the grace period.
    pub fn tick(&self) -> Phase {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&self, now: Instant) -> Phase {
        let due = self.render_errors.lock().unwrap_or_else(|e| e.into_inner()).tick(now);
        if let Some(message) = due {
            error!("Render error persisted past the grace period: {}", message);
            self.transition(Phase::Error(message));
        }
        self.phase()
    }

    /// Polls the backend health endpoint in the background.
    pub fn spawn_connection_monitor(&self) -> JoinHandle<()> {
        Arc::clone(&self.connection).spawn()
    }

    pub async fn check_connection(&self) -> ConnectionStatus {
        self.connection.check_once().await
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.subscribe()
    }

    // ---- stations --------------------------------------------------------------

    pub async fn reload_stations(&self) -> Arc<Vec<Station>> {
        self.stations.load().await;
        self.refresh_station_layer().await;
        self.resolved_stations()
    }

    pub fn stations_state(&self) -> StationsState {
        self.stations.state()
    }

    /// The provider's stations, or the built-in set when it has none.
    ///
    /// Recomputed only when the provider publishes a new set, so the returned `Arc`
    /// is stable between station fetches.
    pub fn resolved_stations(&self) -> Arc<Vec<Station>> {
        let source = self.stations.state().stations;
        let mut memo = self.station_memo.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(memo) = memo.as_ref() {
            if Arc::ptr_eq(&memo.source, &source) {
                return Arc::clone(&memo.resolved);
            }
        }

        let resolved = if source.is_empty() {
            debug!("No stations from the API, using the built-in set");
            Arc::new(self.config.fallback_stations.clone())
        } else {
            Arc::clone(&source)
        };
        *memo = Some(StationMemo {
            source,
            resolved: Arc::clone(&resolved),
        });
        resolved
    }

    fn find_station(&self, station_id: i64) -> Option<Station> {
        self.resolved_stations().iter().find(|s| s.id == station_id).cloned()
    }

    /// Updates the tooltip only.
    pub fn hover_station(&self, station_id: Option<i64>, pointer: ScreenPoint) -> Option<Tooltip> {
        let station = station_id.and_then(|id| self.find_station(id));
        let mut ui = self.ui();
        ui.selection.hover(station, pointer);
        ui.selection.tooltip().cloned()
    }

    /// Selects a station and fetches its full temperature series, replacing the
    /// previous one. `None` if the id is not among the shown stations.
    pub async fn select_station(&self, station_id: i64) -> Option<SeriesState> {
        let station = self.find_station(station_id)?;
        let (start, end, demo_mode) = {
            let mut ui = self.ui();
            ui.selection.select(station.clone());
            (ui.timeline.start(), ui.timeline.end(), ui.demo_mode)
        };
        info!("Selected station {} ({})", station.id, station.name);
        self.refresh_station_layer().await;

        let state = self.series.select(&station, Some(start), Some(end)).await;
        if demo_mode
            && !state.loading
            && state.points.is_empty()
            && state.station_id == Some(station.id)
        {
            debug!("Using demo series for station {}", station.id);
            self.series
                .publish(station.id, self.demo.temperature_series(&station, start, end));
            return Some(self.series.state());
        }
        Some(state)
    }

    pub async fn clear_selection(&self) {
        self.ui().selection.clear();
        self.series.clear();
        self.refresh_station_layer().await;
    }

    pub fn selection(&self) -> Selection {
        self.ui().selection.clone()
    }

    pub fn series_state(&self) -> SeriesState {
        self.series.state()
    }

    pub fn subscribe_series(&self) -> watch::Receiver<SeriesState> {
        self.series.subscribe()
    }

    // ---- time ------------------------------------------------------------------

    pub fn current_date(&self) -> NaiveDate {
        self.ui().timeline.current_date()
    }

    pub fn timeline(&self) -> Timeline {
        self.ui().timeline.clone()
    }

    /// A point of the series chart was clicked: its date becomes the current date.
    pub async fn chart_point_clicked(&self, date: NaiveDate) {
        info!("Chart date selected: {}", date);
        self.ui().timeline.sync_to(date);
        self.refresh_heatmap().await;
    }

    /// Applies a slider command; returns the newly published date, if any.
    pub async fn timeline_action(&self, action: TimelineAction) -> Option<NaiveDate> {
        let published = {
            let mut ui = self.ui();
            match action {
                TimelineAction::SetPosition(position) => Some(ui.timeline.set_position(position)),
                TimelineAction::Previous => ui.timeline.previous(),
                TimelineAction::Next => ui.timeline.next(),
                TimelineAction::Start => Some(ui.timeline.go_to_start()),
                TimelineAction::End => Some(ui.timeline.go_to_end()),
            }
        };
        if let Some(date) = published {
            debug!("Timeline {:?} -> {}", action, date);
            self.refresh_heatmap().await;
        }
        published
    }

    pub fn set_timeline_step(&self, step: TimelineStep) {
        self.ui().timeline.set_step(step);
    }

    // ---- view and toggles ------------------------------------------------------

    pub fn view_state(&self) -> ViewState {
        self.ui().view_state
    }

    pub fn set_view_state(&self, view_state: ViewState) {
        self.ui().view_state = view_state;
    }

    pub fn variable(&self) -> HeatmapVariable {
        self.ui().variable
    }

    pub async fn set_variable(&self, variable: HeatmapVariable) {
        self.ui().variable = variable;
        self.refresh_heatmap().await;
    }

    pub async fn set_heatmap_visible(&self, visible: bool) {
        self.ui().heatmap_visible = visible;
        self.refresh_heatmap().await;
    }

    pub async fn set_stations_visible(&self, visible: bool) {
        self.ui().stations_visible = visible;
        self.refresh_station_layer().await;
    }

    pub fn demo_mode(&self) -> bool {
        self.ui().demo_mode
    }

    pub async fn set_demo_mode(&self, enabled: bool) {
        info!("Demo mode {}", if enabled { "on" } else { "off" });
        self.ui().demo_mode = enabled;
        self.refresh_heatmap().await;
    }

    /// Runs `f` against the series panel.
    pub fn with_series_panel<R>(&self, f: impl FnOnce(&mut DraggablePanel) -> R) -> R {
        f(&mut self.ui().series_panel)
    }

    /// Runs `f` against the comparison divider.
    pub fn with_swipe<R>(&self, f: impl FnOnce(&mut SwipeDivider) -> R) -> R {
        f(&mut self.ui().swipe)
    }

    // ---- layers ----------------------------------------------------------------

    pub fn heatmap_state(&self) -> HeatmapState {
        self.heatmap.state()
    }

    pub fn station_layer_state(&self) -> LayerState<StationLayer> {
        self.station_layer.state()
    }

    pub fn heatmap_layer_state(&self) -> LayerState<HeatmapLayer> {
        self.heatmap_layer.state()
    }

    /// Map layers bottom to top; empty unless the renderer is ready.
    pub fn layers(&self) -> Vec<MapLayer> {
        if !self.phase().is_ready() {
            return Vec::new();
        }
        let mut layers = Vec::new();
        if let Some(heatmap) = self.heatmap_layer.layer() {
            layers.push(MapLayer::Heatmap((*heatmap).clone()));
        }
        if let Some(stations) = self.station_layer.layer() {
            layers.push(MapLayer::Stations((*stations).clone()));
        }
        layers
    }

    async fn refresh_station_layer(&self) {
        let (selected, visible) = {
            let ui = self.ui();
            (ui.selection.selected_id(), ui.stations_visible)
        };
        let deps = StationLayerDeps {
            stations: self.resolved_stations(),
            selected,
        };
        let factory_deps = deps.clone();
        self.station_layer
            .update(deps, &LoaderOptions::enabled(visible), move || async move {
                Ok(StationLayer::build(&factory_deps.stations, factory_deps.selected, true))
            })
            .await;
    }

    /// Re-queries the heatmap for the current date and variable and rebuilds the
    /// overlay.
    pub async fn refresh_heatmap(&self) -> HeatmapState {
        let ticket = self.heatmap_refresh.begin();
        let (query, demo_mode) = {
            let ui = self.ui();
            let query = HeatmapQuery {
                date: Some(ui.timeline.current_date()),
                variable: ui.variable,
                enabled: ui.heatmap_visible,
            };
            (query, ui.demo_mode)
        };

        let state = self.heatmap.fetch(&query).await;
        if !ticket.is_current() {
            debug!("Heatmap refresh {} superseded", ticket.id());
            return state;
        }

        let points = if demo_mode && query.enabled && state.points.is_empty() {
            let date = query.date.unwrap_or(self.config.timeline_start);
            info!("No heatmap data for {}, showing demo data", date);
            Arc::new(self.demo.heatmap_points(date, query.variable, &self.config.heatmap_bbox))
        } else {
            Arc::clone(&state.points)
        };

        let deps = HeatmapLayerDeps { points };
        let factory_points = Arc::clone(&deps.points);
        self.heatmap_layer
            .update(deps, &LoaderOptions::enabled(query.enabled), move || async move {
                Ok(HeatmapLayer::build(factory_points, HeatmapStyle::default(), true))
            })
            .await;
        state
    }

    /// Builds the side-by-side comparison of two dates: one heatmap per side and the
    /// stations on top of both.
    pub async fn compare(&self, left: NaiveDate, right: NaiveDate) -> LazyLayersState<MapLayer> {
        let (variable, demo_mode) = {
            let ui = self.ui();
            (ui.variable, ui.demo_mode)
        };
        let query = |date| HeatmapQuery {
            date: Some(date),
            variable,
            enabled: true,
        };
        let (left_query, right_query) = (query(left), query(right));
        let (left_state, right_state) =
            tokio::join!(self.heatmap.peek(&left_query), self.heatmap.peek(&right_query));

        let points_for = |state: HeatmapState, date: NaiveDate| {
            if demo_mode && state.points.is_empty() {
                Arc::new(self.demo.heatmap_points(date, variable, &self.config.heatmap_bbox))
            } else {
                state.points
            }
        };
        let left_points = points_for(left_state, left);
        let right_points = points_for(right_state, right);
        let stations = self.resolved_stations();

        let configs = vec![
            LayerConfig::new("left-heatmap", 10, move || {
                let style = comparison_style("left-heatmap");
                let layer = HeatmapLayer::build(Arc::clone(&left_points), style, true);
                Ok(layer.map(MapLayer::Heatmap))
            }),
            LayerConfig::new("right-heatmap", 10, move || {
                let style = comparison_style("right-heatmap");
                let layer = HeatmapLayer::build(Arc::clone(&right_points), style, true);
                Ok(layer.map(MapLayer::Heatmap))
            }),
            LayerConfig::new(STATION_LAYER_ID, 5, move || {
                Ok(StationLayer::build(&stations, None, true).map(MapLayer::Stations))
            }),
        ];
        self.comparison.load(&configs).await;
        self.comparison.state()
    }
}

fn comparison_style(id: &str) -> HeatmapStyle {
    HeatmapStyle {
        id: id.to_string(),
        radius_pixels: 50.0,
        intensity: 1.5,
        ..HeatmapStyle::default()
    }
}
