//! Built-in fallback data for the dashboard.
//!
//! Holds the fixed station set shown when the backend returns no stations, and a
//! `DemoDataProvider` that synthesises plausible heatmap samples and temperature series
//! so the overlay pipeline can be demonstrated while the backend is offline.

use crate::models::{BoundingBox, HeatmapPoint, HeatmapVariable, Station, StationSeriesPoint};
use chrono::{Datelike, Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// The three example stations shown when the station listing is empty.
pub fn builtin_stations() -> Vec<Station> {
    vec![
        Station::new(1, "Paris - Montsouris", "FR", 48.8217, 2.3378, Some(75.0)),
        Station::new(2, "Paris - Orly", "FR", 48.7233, 2.3794, Some(89.0)),
        Station::new(3, "Paris - Le Bourget", "FR", 48.9667, 2.4333, Some(52.0)),
    ]
}

/// Generates synthetic climate data.
///
/// Output is deterministic per query so that re-rendering the same date shows the
/// same overlay.
#[derive(Debug, Clone)]
pub struct DemoDataProvider {
    /// Number of samples per heatmap query.
    points_per_query: usize,
}

impl Default for DemoDataProvider {
    fn default() -> Self {
        Self::new(400)
    }
}

impl DemoDataProvider {
    pub fn new(points_per_query: usize) -> Self {
        debug!("Creating DemoDataProvider ({} points/query)", points_per_query);
        Self { points_per_query }
    }

    /// Synthesises heatmap samples inside `bbox` for a date and variable.
    ///
    /// Values peak at the box centre (an urban heat island) and follow the season.
    pub fn heatmap_points(
        &self,
        date: NaiveDate,
        variable: HeatmapVariable,
        bbox: &BoundingBox,
    ) -> Vec<HeatmapPoint> {
        let mut rng = StdRng::seed_from_u64(seed_for(date, variable));
        let (center_lon, center_lat) = bbox.center();
        let half_width = ((bbox.lon_max - bbox.lon_min) / 2.0).max(f64::EPSILON);
        let half_height = ((bbox.lat_max - bbox.lat_min) / 2.0).max(f64::EPSILON);
        let seasonal = seasonal_temperature(date);

        (0..self.points_per_query)
            .map(|_| {
                let lon = rng.gen_range(bbox.lon_min..=bbox.lon_max);
                let lat = rng.gen_range(bbox.lat_min..=bbox.lat_max);
                // 0 at the centre, ~1.41 at the corners
                let dx = (lon - center_lon) / half_width;
                let dy = (lat - center_lat) / half_height;
                let distance = (dx * dx + dy * dy).sqrt();
                let noise = rng.gen_range(-0.5..0.5);

                let weight = match variable {
                    HeatmapVariable::Temperature => seasonal + 3.0 * (1.0 - distance / 1.5) + noise,
                    HeatmapVariable::Ndvi => {
                        (0.15 + 0.45 * distance / 1.5 + noise * 0.1).clamp(0.0, 1.0)
                    },
                    HeatmapVariable::Uhi => (4.0 * (1.0 - distance / 1.5) + noise).max(0.0),
                };
                HeatmapPoint::new(lon, lat, weight)
            })
            .collect()
    }

    /// Synthesises a daily temperature series for a station, ordered by date.
    pub fn temperature_series(
        &self,
        station: &Station,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<StationSeriesPoint> {
        let mut rng = StdRng::seed_from_u64(station.id as u64);
        let days = (end - start).num_days().max(0);
        (0..=days)
            .map(|offset| {
                let date = start + Duration::days(offset);
                StationSeriesPoint {
                    station_id: station.id,
                    date,
                    temperature: seasonal_temperature(date) + rng.gen_range(-3.0..3.0),
                    quality: 0,
                }
            })
            .collect()
    }
}

/// Rough Paris climatology: ~4 °C in mid January, ~21 °C in mid July.
fn seasonal_temperature(date: NaiveDate) -> f64 {
    let phase = (date.ordinal0() as f64 - 15.0) / 365.25 * std::f64::consts::TAU;
    12.5 - 8.5 * phase.cos()
}

fn seed_for(date: NaiveDate, variable: HeatmapVariable) -> u64 {
    let tag = match variable {
        HeatmapVariable::Temperature => 1,
        HeatmapVariable::Ndvi => 2,
        HeatmapVariable::Uhi => 3,
    };
    (date.num_days_from_ce() as u64) << 2 | tag
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn builtin_set_has_three_distinct_stations() {
        let stations = builtin_stations();
        assert_eq!(stations.len(), 3);
        let mut ids: Vec<i64> = stations.iter().map(|s| s.id).collect();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn demo_heatmap_stays_inside_bbox() {
        let bbox = BoundingBox::new(4.7, 52.3, 5.0, 52.45).unwrap();
        let provider = DemoDataProvider::new(250);
        for variable in HeatmapVariable::ALL {
            let points = provider.heatmap_points(date(2020, 8, 1), variable, &bbox);
            assert_eq!(points.len(), 250);
            assert!(points.iter().all(|p| bbox.contains(p.lon(), p.lat())));
        }
    }

    #[test]
    fn demo_heatmap_is_deterministic_per_date() {
        let provider = DemoDataProvider::default();
        let bbox = BoundingBox::paris();
        let a = provider.heatmap_points(date(2021, 3, 3), HeatmapVariable::Temperature, &bbox);
        let b = provider.heatmap_points(date(2021, 3, 3), HeatmapVariable::Temperature, &bbox);
        let c = provider.heatmap_points(date(2021, 3, 4), HeatmapVariable::Temperature, &bbox);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn demo_series_is_ordered_and_inclusive() {
        let station = &builtin_stations()[0];
        let series = DemoDataProvider::default().temperature_series(
            station,
            date(2020, 1, 1),
            date(2020, 1, 10),
        );
        assert_eq!(series.len(), 10);
        assert!(series.windows(2).all(|w| w[0].date < w[1].date));
        assert!(series.iter().all(|p| p.station_id == station.id));
    }

    #[test]
    fn summer_is_warmer_than_winter() {
        assert!(seasonal_temperature(date(2020, 7, 15)) > seasonal_temperature(date(2020, 1, 15)));
    }
}
