//! Station metadata, temperature series and regional aggregates returned by the climate API.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A fixed ground weather-observation point.
///
/// The API uses ECA&D field names (`staid`, `staname`); both those and plain
/// `id`/`name` are accepted.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Station {
    #[serde(rename = "staid", alias = "id")]
    pub id: i64,
    #[serde(rename = "staname", alias = "name")]
    pub name: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub elevation: Option<f64>,
}

impl Station {
    pub fn new(
        id: i64,
        name: &str,
        country: &str,
        latitude: f64,
        longitude: f64,
        elevation: Option<f64>,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            country: country.to_string(),
            latitude,
            longitude,
            elevation,
        }
    }

    /// `[longitude, latitude]`, the order the map renderer expects.
    pub fn position(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

/// One daily observation as returned by `/api/temperature`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TemperatureReading {
    pub date: NaiveDate,
    /// Degrees Celsius.
    pub temperature: f64,
    /// Quality flag; semantics are defined by the data source.
    #[serde(default)]
    pub quality: i32,
}

/// A temperature observation tied to the station it was measured at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationSeriesPoint {
    pub station_id: i64,
    pub date: NaiveDate,
    pub temperature: f64,
    pub quality: i32,
}

impl StationSeriesPoint {
    pub fn from_reading(station_id: i64, reading: TemperatureReading) -> Self {
        Self {
            station_id,
            date: reading.date,
            temperature: reading.temperature,
            quality: reading.quality,
        }
    }
}

/// Aggregate temperature statistics for one administrative zone (GADM).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RegionalIndicator {
    pub zone_id: String,
    pub zone_name: String,
    pub mean_temp: f64,
    pub min_temp: f64,
    pub max_temp: f64,
    pub std_temp: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn station_accepts_ecad_field_names() {
        let station: Station = serde_json::from_value(json!({
            "staid": 11249,
            "staname": "PARIS-MONTSOURIS",
            "country": "FR",
            "latitude": 48.8217,
            "longitude": 2.3378,
            "elevation": 75.0
        }))
        .unwrap();
        assert_eq!(station.id, 11249);
        assert_eq!(station.name, "PARIS-MONTSOURIS");
        assert_eq!(station.position(), [2.3378, 48.8217]);
    }

    #[test]
    fn station_elevation_is_optional() {
        let station: Station = serde_json::from_value(json!({
            "id": 1,
            "name": "Orly",
            "country": "FR",
            "latitude": 48.72,
            "longitude": 2.38
        }))
        .unwrap();
        assert_eq!(station.elevation, None);
    }

    #[test]
    fn reading_parses_iso_date() {
        let reading: TemperatureReading = serde_json::from_value(json!({
            "date": "2020-07-14",
            "temperature": 24.5,
            "quality": 0
        }))
        .unwrap();
        assert_eq!(reading.date, NaiveDate::from_ymd_opt(2020, 7, 14).unwrap());
        let point = StationSeriesPoint::from_reading(7, reading);
        assert_eq!(point.station_id, 7);
        assert!((point.temperature - 24.5).abs() < 1e-9);
    }
}
