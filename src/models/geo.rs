//! Geographic primitives: bounding boxes, heatmap samples and the map camera.

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Axis-aligned longitude/latitude rectangle used to scope a data query.
///
/// Encoded on the wire as `lonMin,latMin,lonMax,latMax`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lon_min: f64,
    pub lat_min: f64,
    pub lon_max: f64,
    pub lat_max: f64,
}

impl BoundingBox {
    /// Creates a bounding box, rejecting inverted or non-finite corners.
    pub fn new(lon_min: f64, lat_min: f64, lon_max: f64, lat_max: f64) -> Result<Self> {
        let corners = [lon_min, lat_min, lon_max, lat_max];
        if corners.iter().any(|c| !c.is_finite()) {
            return Err(AppError::Config(format!(
                "Bounding box corners must be finite: {:?}",
                corners
            )));
        }
        if lon_min > lon_max || lat_min > lat_max {
            return Err(AppError::Config(format!(
                "Bounding box is inverted: {:?}",
                corners
            )));
        }
        Ok(Self {
            lon_min,
            lat_min,
            lon_max,
            lat_max,
        })
    }

    /// City-scale box around Paris, the dashboard's default heatmap region.
    pub fn paris() -> Self {
        Self {
            lon_min: 2.2,
            lat_min: 48.8,
            lon_max: 2.5,
            lat_max: 49.0,
        }
    }

    /// Inclusive containment test.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.lon_min && lon <= self.lon_max && lat >= self.lat_min && lat <= self.lat_max
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.lon_min + self.lon_max) / 2.0,
            (self.lat_min + self.lat_max) / 2.0,
        )
    }

    /// Comma-joined query parameter form.
    pub fn to_query(&self) -> String {
        format!(
            "{},{},{},{}",
            self.lon_min, self.lat_min, self.lon_max, self.lat_max
        )
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query())
    }
}

impl FromStr for BoundingBox {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Config(format!("Invalid bounding box '{}': {}", s, e)))?;
        match parts.as_slice() {
            [lon_min, lat_min, lon_max, lat_max] => {
                BoundingBox::new(*lon_min, *lat_min, *lon_max, *lat_max)
            },
            _ => Err(AppError::Config(format!(
                "Bounding box '{}' must have exactly four comma-separated values",
                s
            ))),
        }
    }
}

/// A geo-located scalar sample used to render a continuous intensity overlay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatmapPoint {
    /// `[longitude, latitude]`
    pub position: [f64; 2],
    pub weight: f64,
}

impl HeatmapPoint {
    pub fn new(lon: f64, lat: f64, weight: f64) -> Self {
        Self {
            position: [lon, lat],
            weight,
        }
    }

    pub fn lon(&self) -> f64 {
        self.position[0]
    }

    pub fn lat(&self) -> f64 {
        self.position[1]
    }
}

/// Which quantity the heatmap overlay shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeatmapVariable {
    #[default]
    Temperature,
    Ndvi,
    Uhi,
}

impl HeatmapVariable {
    pub const ALL: [HeatmapVariable; 3] = [
        HeatmapVariable::Temperature,
        HeatmapVariable::Ndvi,
        HeatmapVariable::Uhi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HeatmapVariable::Temperature => "temperature",
            HeatmapVariable::Ndvi => "ndvi",
            HeatmapVariable::Uhi => "uhi",
        }
    }

    /// Field read from each gridded (ERA5) cell when deriving points.
    ///
    /// The gridded endpoint only carries temperature; every variable falls back to
    /// the 2 metre temperature field.
    pub fn grid_field(&self) -> &'static str {
        "t2m"
    }
}

impl fmt::Display for HeatmapVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HeatmapVariable {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "temperature" => Ok(HeatmapVariable::Temperature),
            "ndvi" => Ok(HeatmapVariable::Ndvi),
            "uhi" => Ok(HeatmapVariable::Uhi),
            other => Err(AppError::Cli(format!(
                "Unknown heatmap variable '{}'. Must be one of: temperature, ndvi, uhi",
                other
            ))),
        }
    }
}

/// Camera parameters controlling the map's visible region and orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub longitude: f64,
    pub latitude: f64,
    pub zoom: f64,
    pub pitch: f64,
    pub bearing: f64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            longitude: 2.3522, // Paris
            latitude: 48.8566,
            zoom: 10.0,
            pitch: 0.0,
            bearing: 0.0,
        }
    }
}
