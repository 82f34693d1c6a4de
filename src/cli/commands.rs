use crate::api::ClimateApiClient;
use crate::config::DashboardConfig;
use crate::dashboard::{Dashboard, Phase, Timeline, TimelineAction, TimelineStep};
use crate::error::{AppError, Result};
use crate::models::{HeatmapVariable, RegionalIndicator, Station, StationSeriesPoint};
use crate::providers::{ConnectionStatus, HeatmapSource};
use crate::render::{HeadlessSurface, HeatmapLayer, MapLayer};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{FuzzySelect, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::time::Duration;
use tracing::{error, info};

/// Rows shown before a series table is truncated.
pub const SERIES_ROW_LIMIT: usize = 20;

/// Terminal front-end of the climate heat dashboard
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Behave as if no GPU context can be created
    #[arg(long, global = true)]
    pub no_gpu: bool,

    /// Fill empty heatmaps and series with synthetic data
    #[arg(long, global = true)]
    pub demo: bool,

    /// Run one command and exit instead of starting the interactive menu
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Check whether the backend is reachable
    Health {
        /// Keep polling at the configured interval until Ctrl-C
        #[arg(short, long)]
        watch: bool,
    },

    /// List weather stations
    Stations {
        /// Only stations of this city
        #[arg(short, long)]
        city: Option<String>,
    },

    /// Show the temperature series of a station
    Series(SeriesArgs),

    /// Summarise the heatmap overlay for a date
    Heatmap(HeatmapArgs),

    /// Move along the timeline and show the heatmap of the resulting date
    Timeline(TimelineArgs),

    /// Compare the heatmaps of two dates side by side
    Compare(CompareArgs),

    /// Show regional temperature indicators
    Indicators(IndicatorsArgs),
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct SeriesArgs {
    /// Station id (ECA&D `staid`)
    #[arg(short, long)]
    pub station: i64,

    /// First day (YYYY-MM-DD); defaults to the timeline start
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last day (YYYY-MM-DD); defaults to the timeline end
    #[arg(long)]
    pub end: Option<NaiveDate>,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct HeatmapArgs {
    /// Day to show (YYYY-MM-DD); defaults to the current timeline date
    #[arg(short, long)]
    pub date: Option<NaiveDate>,

    /// temperature, ndvi or uhi
    #[arg(short, long, default_value = "temperature")]
    pub variable: HeatmapVariable,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct TimelineArgs {
    /// day, week, month or quarter
    #[arg(short, long, default_value = "month")]
    pub step: TimelineStep,

    /// Slider position; clamped to the last step
    #[arg(short, long)]
    pub position: Option<u32>,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct CompareArgs {
    /// Left-hand date (YYYY-MM-DD)
    pub left: NaiveDate,

    /// Right-hand date (YYYY-MM-DD)
    pub right: NaiveDate,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct IndicatorsArgs {
    /// Country name or ISO code
    #[arg(short, long, default_value = "France")]
    pub country: String,

    /// GADM administrative level
    #[arg(short, long)]
    pub admin_level: Option<u8>,
}

/// CLI application
pub struct App {
    dashboard: Dashboard,
    client: ClimateApiClient,
}

impl App {
    /// Creates the dashboard and runs its start-up sequence (surface probe, initial
    /// station and heatmap loads).
    pub async fn new(
        config: DashboardConfig,
        surface: HeadlessSurface,
        demo: bool,
    ) -> Result<Self> {
        let client = ClimateApiClient::new(&config.api_base_url, config.http_timeout)?;
        let dashboard = Dashboard::with_client(config, client.clone(), surface)?;

        let phase = with_spinner("Starting dashboard...", dashboard.start()).await?;
        if demo {
            dashboard.set_demo_mode(true).await;
        }
        match &phase {
            Phase::Error(message) => {
                error!("Map unavailable: {}", message);
            },
            _ => info!("Dashboard {}", phase),
        }

        Ok(Self { dashboard, client })
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    /// Run a single command
    pub async fn run_command(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Health { watch } => {
                if watch {
                    self.watch_health().await?;
                } else {
                    let checking = self.dashboard.check_connection();
                    let status = with_spinner("Checking backend...", checking).await?;
                    println!("Backend: {}", paint_status(status));
                }
            },
            Commands::Stations { city } => {
                self.list_stations(city.as_deref()).await?;
            },
            Commands::Series(args) => {
                self.show_series(&args).await?;
            },
            Commands::Heatmap(args) => {
                self.show_heatmap(&args).await?;
            },
            Commands::Timeline(args) => {
                self.dashboard.set_timeline_step(args.step);
                let action = match args.position {
                    Some(position) => TimelineAction::SetPosition(position),
                    None => TimelineAction::Start,
                };
                self.move_timeline(action).await?;
            },
            Commands::Compare(args) => {
                self.compare(&args).await?;
            },
            Commands::Indicators(args) => {
                self.show_indicators(&args).await?;
            },
        }

        Ok(())
    }

    /// Fails with the capability error when the map cannot be rendered.
    fn require_map(&self) -> Result<()> {
        match self.dashboard.phase() {
            Phase::Error(message) => {
                println!("{}", format!("Map unavailable: {}", message).red().bold());
                Err(AppError::Capability(message))
            },
            _ => Ok(()),
        }
    }

    async fn watch_health(&self) -> Result<()> {
        let mut rx = self.dashboard.subscribe_connection();
        let monitor = self.dashboard.spawn_connection_monitor();
        println!("Polling {} (Ctrl-C to stop)", self.client.base_url());

        loop {
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = *rx.borrow_and_update();
                    println!(
                        "[{}] Backend: {}",
                        chrono::Local::now().format("%H:%M:%S"),
                        paint_status(status)
                    );
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        monitor.abort();
        Ok(())
    }

    async fn list_stations(&self, city: Option<&str>) -> Result<()> {
        let stations = match city {
            Some(city) => {
                let fetching = self.client.get_stations(Some(city));
                with_spinner("Fetching stations...", fetching).await??
            },
            None => {
                let reloading = self.dashboard.reload_stations();
                let stations = with_spinner("Fetching stations...", reloading).await?;
                if let Some(e) = self.dashboard.stations_state().error {
                    println!(
                        "{} {}",
                        "Could not reach the API, showing built-in stations:".yellow(),
                        e
                    );
                }
                stations.to_vec()
            },
        };

        if stations.is_empty() {
            println!("{}", "No stations found.".yellow());
            return Ok(());
        }
        println!("{}", stations_table(&stations));
        println!("{} stations", stations.len());
        Ok(())
    }

    async fn show_series(&self, args: &SeriesArgs) -> Result<()> {
        if args.start.is_some() || args.end.is_some() {
            let timeline = self.dashboard.timeline();
            let start = args.start.unwrap_or(timeline.start());
            let end = args.end.unwrap_or(timeline.end());
            if end < start {
                return Err(AppError::Cli(format!(
                    "end date {} is before start date {}",
                    end, start
                )));
            }
            // Narrow the selection window through the client directly
            let readings = with_spinner(
                "Fetching temperature series...",
                self.client.get_station_temperature(args.station, Some(start), Some(end)),
            )
            .await??;
            let mut points: Vec<StationSeriesPoint> = readings
                .into_iter()
                .map(|r| StationSeriesPoint::from_reading(args.station, r))
                .collect();
            points.sort_by_key(|p| p.date);
            print_series(args.station, &points);
            return Ok(());
        }

        if self.dashboard.resolved_stations().is_empty() {
            self.dashboard.reload_stations().await;
        }
        let state = with_spinner(
            "Fetching temperature series...",
            self.dashboard.select_station(args.station),
        )
        .await?
            .ok_or_else(|| AppError::Cli(format!("Unknown station id {}", args.station)))?;
        if let Some(e) = &state.error {
            println!("{} {}", "Failed to fetch series:".red(), e);
        }
        print_series(args.station, &state.points);
        Ok(())
    }

    async fn show_heatmap(&self, args: &HeatmapArgs) -> Result<()> {
        self.require_map()?;
        if self.dashboard.variable() != args.variable {
            let loading = self.dashboard.set_variable(args.variable);
            with_spinner("Loading heatmap...", loading).await?;
        }
        if let Some(date) = args.date {
            let loading = self.dashboard.chart_point_clicked(date);
            with_spinner("Loading heatmap...", loading).await?;
        }
        self.print_map();
        Ok(())
    }

    async fn move_timeline(&self, action: TimelineAction) -> Result<()> {
        self.require_map()?;
        let moving = self.dashboard.timeline_action(action);
        let published = with_spinner("Loading heatmap...", moving).await?;
        if published.is_none() {
            println!("{}", unmoved_message(action).yellow());
        }
        println!("{}", timeline_bar(&self.dashboard.timeline(), 40));
        self.print_map();
        Ok(())
    }

    async fn compare(&self, args: &CompareArgs) -> Result<()> {
        self.require_map()?;
        let state = with_spinner(
            "Loading comparison...",
            self.dashboard.compare(args.left, args.right),
        )
        .await?;

        for (id, layer) in &state.layers {
            match layer.as_ref() {
                MapLayer::Heatmap(heatmap) => {
                    println!("{:<14} {}", id.bold(), heatmap_summary(heatmap))
                },
                MapLayer::Stations(stations) => {
                    println!("{:<14} {} stations", id.bold(), stations.markers.len())
                },
            }
        }
        for (id, err) in &state.errors {
            if let Some(e) = err {
                println!("{} {}: {}", "Layer failed".red(), id, e);
            }
        }
        let divider = self.dashboard.with_swipe(|divider| divider.percentage());
        println!("Divider at {:.0}%: {} left | {} right", divider, args.left, args.right);
        Ok(())
    }

    async fn show_indicators(&self, args: &IndicatorsArgs) -> Result<()> {
        let indicators = with_spinner(
            "Fetching indicators...",
            self.client.get_gadm_indicators(&args.country, args.admin_level),
        )
        .await??;
        if indicators.is_empty() {
            println!("{}", format!("No indicators for {}.", args.country).yellow());
            return Ok(());
        }
        println!("{}", indicators_table(&indicators));
        Ok(())
    }

    /// Prints the current map: heatmap summary and station layer.
    fn print_map(&self) {
        let date = self.dashboard.current_date();
        let variable = self.dashboard.variable();
        let state = self.dashboard.heatmap_state();
        println!("{} {} ({})", "Heatmap".bold(), date, variable);

        let mut drew_heatmap = false;
        for layer in self.dashboard.layers() {
            match layer {
                MapLayer::Heatmap(heatmap) => {
                    drew_heatmap = true;
                    let source = match state.source {
                        HeatmapSource::HeatmapEndpoint => "heatmap endpoint",
                        HeatmapSource::Grid => "gridded data",
                        HeatmapSource::None => "demo data",
                    };
                    println!("  {} from {}", heatmap_summary(&heatmap), source);
                },
                MapLayer::Stations(stations) => {
                    println!("  {} stations on the map", stations.markers.len());
                },
            }
        }
        if !drew_heatmap {
            println!("  {}", "No heatmap data for this date.".dimmed());
        }
    }

    pub async fn toggle_demo_mode(&self) -> bool {
        let enabled = !self.dashboard.demo_mode();
        self.dashboard.set_demo_mode(enabled).await;
        enabled
    }

    /// Interactive station picker followed by the series view.
    pub async fn pick_station(&self) -> Result<()> {
        let stations = self.dashboard.resolved_stations();
        if let Some(station_id) = prompt_station(&stations)? {
            self.show_series(&SeriesArgs {
                station: station_id,
                start: None,
                end: None,
            })
            .await?;
        }
        Ok(())
    }

    /// Interactive timeline navigation.
    pub async fn navigate_timeline(&self) -> Result<()> {
        let actions = [
            "Start",
            "Previous step",
            "Next step",
            "End",
            "Jump to position",
            "Change step",
        ];
        let timeline = self.dashboard.timeline();
        println!("{}", timeline_bar(&timeline, 40));
        let choice = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Timeline")
            .items(&actions)
            .default(2)
            .interact_opt()?;
        let action = match choice {
            Some(0) => TimelineAction::Start,
            Some(1) => TimelineAction::Previous,
            Some(2) => TimelineAction::Next,
            Some(3) => TimelineAction::End,
            Some(4) => {
                let position: u32 = Input::with_theme(&ColorfulTheme::default())
                    .with_prompt(format!("Position (0-{})", timeline.total_steps()))
                    .default(timeline.position())
                    .interact_text()?;
                TimelineAction::SetPosition(position)
            },
            Some(5) => {
                let step = prompt_step()?;
                self.dashboard.set_timeline_step(step);
                println!("{}", timeline_bar(&self.dashboard.timeline(), 40));
                return Ok(());
            },
            _ => return Ok(()),
        };
        self.move_timeline(action).await
    }
}

/// Shows a spinner while `future` runs.
pub async fn with_spinner<F: Future>(message: &str, future: F) -> Result<F::Output> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    let output = future.await;
    spinner.finish_and_clear();
    Ok(output)
}

pub fn paint_status(status: ConnectionStatus) -> ColoredString {
    match status {
        ConnectionStatus::Checking => "checking".yellow(),
        ConnectionStatus::Online => "online".green().bold(),
        ConnectionStatus::Offline => "offline".red().bold(),
    }
}

pub fn stations_table(stations: &[Station]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["ID", "Name", "Country", "Latitude", "Longitude", "Elevation (m)"]);
    for s in stations {
        table.add_row(vec![
            s.id.to_string(),
            s.name.clone(),
            s.country.clone(),
            format!("{:.4}", s.latitude),
            format!("{:.4}", s.longitude),
            s.elevation.map(|e| format!("{:.0}", e)).unwrap_or_else(|| "-".to_string()),
        ]);
    }
    table
}

pub fn series_table(points: &[StationSeriesPoint], limit: usize) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Date", "Temperature (°C)", "Quality"]);
    for p in points.iter().take(limit) {
        table.add_row(vec![
            p.date.to_string(),
            format!("{:.1}", p.temperature),
            p.quality.to_string(),
        ]);
    }
    table
}

pub fn indicators_table(indicators: &[RegionalIndicator]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Zone", "Name", "Mean (°C)", "Min (°C)", "Max (°C)", "Std"]);
    for i in indicators {
        table.add_row(vec![
            i.zone_id.clone(),
            i.zone_name.clone(),
            format!("{:.1}", i.mean_temp),
            format!("{:.1}", i.min_temp),
            format!("{:.1}", i.max_temp),
            format!("{:.2}", i.std_temp),
        ]);
    }
    table
}

/// Minimum, maximum and mean temperature of a series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

pub fn series_stats(points: &[StationSeriesPoint]) -> Option<SeriesStats> {
    if points.is_empty() {
        return None;
    }
    let (min, max, sum) = points.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY, 0.0),
        |(min, max, sum), p| (min.min(p.temperature), max.max(p.temperature), sum + p.temperature),
    );
    Some(SeriesStats {
        count: points.len(),
        min,
        max,
        mean: sum / points.len() as f64,
    })
}

fn print_series(station_id: i64, points: &[StationSeriesPoint]) {
    let Some(stats) = series_stats(points) else {
        println!("{}", format!("No readings for station {}.", station_id).yellow());
        return;
    };
    println!("{}", series_table(points, SERIES_ROW_LIMIT));
    if points.len() > SERIES_ROW_LIMIT {
        println!(
            "... and {} more (showing first {} only)",
            points.len() - SERIES_ROW_LIMIT,
            SERIES_ROW_LIMIT
        );
    }
    println!(
        "{} readings, min {:.1} °C, max {:.1} °C, mean {:.1} °C",
        stats.count, stats.min, stats.max, stats.mean
    );
}

pub fn heatmap_summary(layer: &HeatmapLayer) -> String {
    let (lo, hi) = layer.weight_range();
    format!(
        "{} points, weight {:.2} {} to {:.2} {}",
        layer.points.len(),
        lo,
        swatch(layer, lo),
        hi,
        swatch(layer, hi)
    )
}

/// A coloured block showing where `weight` lands on the layer's colour ramp.
fn swatch(layer: &HeatmapLayer, weight: f64) -> ColoredString {
    let [r, g, b, _] = layer.color_for(weight);
    "\u{25A0}".truecolor(r, g, b)
}

/// Shown after a transport or HTTP status failure.
pub fn backend_hint(base_url: &str) -> String {
    format!("Check that the climate API at {} is reachable (CLIMATE_API_BASE_URL).", base_url)
}

/// Explains why `action` left the timeline where it was.
pub fn unmoved_message(action: TimelineAction) -> &'static str {
    match action {
        TimelineAction::Previous | TimelineAction::Start => "Already at the start of the timeline.",
        TimelineAction::Next | TimelineAction::End => "Already at the end of the timeline.",
        TimelineAction::SetPosition(_) => "Timeline position unchanged.",
    }
}

/// Text rendering of the slider: `[#####.....] 2020-06-29 (6/24, 25%)`.
pub fn timeline_bar(timeline: &Timeline, width: usize) -> String {
    let progress = timeline.progress();
    let filled = ((progress / 100.0) * width as f64).round() as usize;
    format!(
        "[{}{}] {} ({}/{} {}s, {:.0}%)",
        "#".repeat(filled.min(width)),
        ".".repeat(width - filled.min(width)),
        timeline.current_date(),
        timeline.position(),
        timeline.total_steps(),
        timeline.step(),
        progress
    )
}

/// Fuzzy station picker. `None` if the user cancelled.
pub fn prompt_station(stations: &[Station]) -> Result<Option<i64>> {
    if stations.is_empty() {
        return Err(AppError::Cli("No stations to choose from".to_string()));
    }
    let labels: Vec<String> = stations.iter().map(|s| format!("{} ({})", s.name, s.id)).collect();
    let choice = FuzzySelect::with_theme(&ColorfulTheme::default())
        .with_prompt("Station")
        .items(&labels)
        .default(0)
        .interact_opt()?;
    Ok(choice.map(|index| stations[index].id))
}

pub fn prompt_date(prompt: &str, default: NaiveDate) -> Result<NaiveDate> {
    let input: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("{} (YYYY-MM-DD)", prompt))
        .default(default.to_string())
        .interact_text()?;
    parse_date(&input)
}

pub fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|e| AppError::Cli(format!("Invalid date '{}': {}", input.trim(), e)))
}

pub fn prompt_variable() -> Result<HeatmapVariable> {
    let labels: Vec<&str> = HeatmapVariable::ALL.iter().map(|v| v.as_str()).collect();
    let index = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Variable")
        .items(&labels)
        .default(0)
        .interact()?;
    Ok(HeatmapVariable::ALL[index])
}

pub fn prompt_step() -> Result<TimelineStep> {
    let labels: Vec<&str> = TimelineStep::ALL.iter().map(|s| s.as_str()).collect();
    let index = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Step")
        .items(&labels)
        .default(2)
        .interact()?;
    Ok(TimelineStep::ALL[index])
}

pub fn prompt_country() -> Result<String> {
    let country: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Country")
        .default("France".to_string())
        .interact_text()?;
    Ok(country.trim().to_string())
}
