//! Plain descriptors of the map layers.
//!
//! A descriptor carries everything a renderer needs to draw the layer (data plus
//! styling) and nothing renderer-specific. Builders return `None` for a hidden layer
//! or one without data, in which case the layer is simply left out of the map.

use crate::models::{HeatmapPoint, Station};
use std::sync::Arc;

pub type Rgba = [u8; 4];

pub const STATION_LAYER_ID: &str = "stations";
pub const HEATMAP_LAYER_ID: &str = "heatmap";

const STATION_RADIUS: f64 = 150.0;
const SELECTED_STATION_RADIUS: f64 = 300.0;
const STATION_FILL: Rgba = [16, 185, 129, 200];
const SELECTED_STATION_FILL: Rgba = [16, 185, 129, 255];
const STATION_STROKE: Rgba = [255, 255, 255, 150];
const SELECTED_STATION_STROKE: Rgba = [255, 255, 255, 255];

/// Cold to hot.
pub const HEATMAP_COLOR_RANGE: [Rgba; 6] = [
    [0, 0, 255, 0],
    [0, 255, 255, 128],
    [0, 255, 0, 192],
    [255, 255, 0, 255],
    [255, 128, 0, 255],
    [255, 0, 0, 255],
];

#[derive(Debug, Clone, PartialEq)]
pub struct StationMarker {
    pub station_id: i64,
    /// `[lon, lat]`
    pub position: [f64; 2],
    /// Metres.
    pub radius: f64,
    pub fill_color: Rgba,
    pub stroke_color: Rgba,
}

/// Scatterplot of the weather stations, the selected one highlighted.
#[derive(Debug, Clone, PartialEq)]
pub struct StationLayer {
    pub id: String,
    pub markers: Vec<StationMarker>,
    pub selected_station_id: Option<i64>,
    pub radius_min_pixels: f64,
    pub radius_max_pixels: f64,
    pub line_width_min_pixels: f64,
    pub stroked: bool,
    pub pickable: bool,
}

impl StationLayer {
    pub fn build(
        stations: &[Station],
        selected_station_id: Option<i64>,
        visible: bool,
    ) -> Option<Self> {
        if !visible || stations.is_empty() {
            return None;
        }

        let markers = stations
            .iter()
            .map(|station| {
                let selected = Some(station.id) == selected_station_id;
                StationMarker {
                    station_id: station.id,
                    position: station.position(),
                    radius: if selected { SELECTED_STATION_RADIUS } else { STATION_RADIUS },
                    fill_color: if selected { SELECTED_STATION_FILL } else { STATION_FILL },
                    stroke_color: if selected { SELECTED_STATION_STROKE } else { STATION_STROKE },
                }
            })
            .collect();

        Some(Self {
            id: STATION_LAYER_ID.to_string(),
            markers,
            selected_station_id,
            radius_min_pixels: 8.0,
            radius_max_pixels: 25.0,
            line_width_min_pixels: 2.0,
            stroked: true,
            pickable: true,
        })
    }

    pub fn marker(&self, station_id: i64) -> Option<&StationMarker> {
        self.markers.iter().find(|m| m.station_id == station_id)
    }
}

/// Tunables of the heatmap overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapStyle {
    pub id: String,
    pub radius_pixels: f64,
    pub intensity: f64,
    /// Fraction of the maximum weight below which nothing is drawn.
    pub threshold: f64,
    pub color_range: [Rgba; 6],
}

impl Default for HeatmapStyle {
    fn default() -> Self {
        Self {
            id: HEATMAP_LAYER_ID.to_string(),
            radius_pixels: 30.0,
            intensity: 1.0,
            threshold: 0.05,
            color_range: HEATMAP_COLOR_RANGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapLayer {
    pub points: Arc<Vec<HeatmapPoint>>,
    pub style: HeatmapStyle,
}

impl HeatmapLayer {
    pub fn build(
        points: Arc<Vec<HeatmapPoint>>,
        style: HeatmapStyle,
        visible: bool,
    ) -> Option<Self> {
        if !visible || points.is_empty() {
            return None;
        }
        Some(Self { points, style })
    }

    pub fn id(&self) -> &str {
        &self.style.id
    }

    /// Smallest and largest weight in the layer.
    pub fn weight_range(&self) -> (f64, f64) {
        self.points
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p.weight), hi.max(p.weight))
            })
    }

    /// Colour stop a weight falls into, scaled over the layer's weight range.
    pub fn color_for(&self, weight: f64) -> Rgba {
        let (lo, hi) = self.weight_range();
        let stops = self.style.color_range.len();
        let t = if hi > lo { ((weight - lo) / (hi - lo)).clamp(0.0, 1.0) } else { 1.0 };
        let index = ((t * (stops - 1) as f64).round() as usize).min(stops - 1);
        self.style.color_range[index]
    }
}

/// Any layer the dashboard can put on the map.
#[derive(Debug, Clone, PartialEq)]
pub enum MapLayer {
    Stations(StationLayer),
    Heatmap(HeatmapLayer),
}

impl MapLayer {
    pub fn id(&self) -> &str {
        match self {
            MapLayer::Stations(layer) => &layer.id,
            MapLayer::Heatmap(layer) => layer.id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stations() -> Vec<Station> {
        vec![
            Station::new(1, "Paris - Montsouris", "France", 48.8217, 2.3378, Some(75.0)),
            Station::new(2, "Paris - Orly", "France", 48.7233, 2.3794, Some(89.0)),
        ]
    }

    #[test]
    fn selected_station_is_highlighted() {
        let layer = StationLayer::build(&stations(), Some(2), true).unwrap();
        assert_eq!(layer.id, "stations");
        assert!(layer.pickable);

        let plain = layer.marker(1).unwrap();
        assert_eq!(plain.radius, 150.0);
        assert_eq!(plain.fill_color, [16, 185, 129, 200]);
        assert_eq!(plain.stroke_color, [255, 255, 255, 150]);
        assert_eq!(plain.position, [2.3378, 48.8217]);

        let selected = layer.marker(2).unwrap();
        assert_eq!(selected.radius, 300.0);
        assert_eq!(selected.fill_color, [16, 185, 129, 255]);
        assert_eq!(selected.stroke_color, [255, 255, 255, 255]);
    }

    #[test]
    fn hidden_or_empty_layers_are_omitted() {
        assert!(StationLayer::build(&stations(), None, false).is_none());
        assert!(StationLayer::build(&[], None, true).is_none());

        let points = Arc::new(vec![HeatmapPoint::new(2.3, 48.85, 12.0)]);
        assert!(HeatmapLayer::build(points, HeatmapStyle::default(), false).is_none());
        assert!(HeatmapLayer::build(Arc::new(Vec::new()), HeatmapStyle::default(), true).is_none());
    }

    #[test]
    fn heatmap_defaults_and_colour_ramp() {
        let points = Arc::new(vec![
            HeatmapPoint::new(2.3, 48.85, 10.0),
            HeatmapPoint::new(2.31, 48.86, 15.0),
            HeatmapPoint::new(2.32, 48.87, 20.0),
        ]);
        let layer = HeatmapLayer::build(points, HeatmapStyle::default(), true).unwrap();
        assert_eq!(layer.id(), "heatmap");
        assert_eq!(layer.style.radius_pixels, 30.0);
        assert_eq!(layer.style.intensity, 1.0);
        assert_eq!(layer.style.threshold, 0.05);
        assert_eq!(layer.weight_range(), (10.0, 20.0));
        assert_eq!(layer.color_for(10.0), [0, 0, 255, 0]);
        assert_eq!(layer.color_for(20.0), [255, 0, 0, 255]);
        assert_eq!(layer.color_for(99.0), [255, 0, 0, 255]);
        assert_eq!(MapLayer::Heatmap(layer).id(), "heatmap");
    }
}
