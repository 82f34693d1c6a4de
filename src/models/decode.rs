//! Normalises the climate API's response shapes into typed sequences.
//!
//! Listing endpoints answer either with a bare JSON array or with an object wrapping
//! the array under a named field (`{"stations": [...]}`, `{"data": [...]}`). Heatmap
//! and gridded payloads are looser still: coordinates and weights can appear under
//! several field names. Everything in here turns those bodies into typed values or a
//! `AppError::Decode`.

use crate::error::{AppError, Result};
use crate::models::{BoundingBox, HeatmapPoint};
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

/// Which of the two listing shapes a body arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingShape {
    Bare,
    Wrapped,
}

/// Decodes a listing body into a flat ordered sequence.
///
/// An object that lacks `field` (or carries `null` there) is an empty listing. Any
/// other shape, or items that do not match `T`, is a decode error.
pub fn decode_listing<T: DeserializeOwned>(body: Value, field: &str) -> Result<Vec<T>> {
    let (shape, items) = match body {
        Value::Array(items) => (ListingShape::Bare, items),
        Value::Object(mut map) => match map.remove(field) {
            Some(Value::Array(items)) => (ListingShape::Wrapped, items),
            Some(Value::Null) | None => {
                warn!("Response object has no '{}' listing; treating as empty", field);
                return Ok(Vec::new());
            },
            Some(other) => {
                return Err(AppError::Decode(format!(
                    "field '{}' should be an array, found {}",
                    field,
                    kind_of(&other)
                )))
            },
        },
        other => {
            return Err(AppError::Decode(format!(
                "expected an array or an object wrapping '{}', found {}",
                field,
                kind_of(&other)
            )))
        },
    };

    debug!("Decoding {} items from {:?} listing", items.len(), shape);
    serde_json::from_value(Value::Array(items))
        .map_err(|e| AppError::Decode(format!("invalid '{}' item: {}", field, e)))
}

/// Decodes `/api/heatmap` point records, keeping only points inside `bbox`.
///
/// Each record may carry `position: [lon, lat]` or separate `lon`/`longitude` and
/// `lat`/`latitude` fields. The weight is `weight`, else `temperature`, else 0.
/// Records without usable coordinates are skipped.
pub fn decode_heatmap_points(items: &[Value], bbox: &BoundingBox) -> Vec<HeatmapPoint> {
    let points: Vec<HeatmapPoint> = items
        .par_iter()
        .filter_map(|item| {
            let (lon, lat) = coordinates_of(item)?;
            let weight = nonzero_number(item, "weight")
                .or_else(|| nonzero_number(item, "temperature"))
                .unwrap_or(0.0);
            Some(HeatmapPoint::new(lon, lat, weight))
        })
        .filter(|p| bbox.contains(p.lon(), p.lat()))
        .collect();

    if points.len() < items.len() {
        debug!(
            "Dropped {} heatmap records without coordinates or outside {}",
            items.len() - points.len(),
            bbox
        );
    }
    points
}

/// Derives heatmap points from gridded climate cells by reading `field` from each cell.
///
/// Falls back to a plain `temperature` field when `field` is absent. Cells without a
/// value or outside `bbox` are skipped.
pub fn decode_grid_points(
    body: Value,
    field: &str,
    bbox: &BoundingBox,
) -> Result<Vec<HeatmapPoint>> {
    let cells: Vec<Value> = decode_listing(body, "data")?;
    let points: Vec<HeatmapPoint> = cells
        .par_iter()
        .filter_map(|cell| {
            let (lon, lat) = coordinates_of(cell)?;
            let weight = number(cell, field).or_else(|| number(cell, "temperature"))?;
            Some(HeatmapPoint::new(lon, lat, weight))
        })
        .filter(|p| bbox.contains(p.lon(), p.lat()))
        .collect();
    debug!(
        "Derived {} heatmap points from {} grid cells (field '{}')",
        points.len(),
        cells.len(),
        field
    );
    Ok(points)
}

fn coordinates_of(item: &Value) -> Option<(f64, f64)> {
    let from_position = item.get("position").and_then(Value::as_array).and_then(|pos| {
        match (pos.first()?.as_f64(), pos.get(1)?.as_f64()) {
            (Some(lon), Some(lat)) => Some((lon, lat)),
            _ => None,
        }
    });
    let (lon, lat) = match from_position {
        Some(pair) => pair,
        None => {
            let lon = number(item, "lon").or_else(|| number(item, "longitude"))?;
            let lat = number(item, "lat").or_else(|| number(item, "latitude"))?;
            (lon, lat)
        },
    };
    (lon.is_finite() && lat.is_finite()).then_some((lon, lat))
}

fn number(item: &Value, key: &str) -> Option<f64> {
    item.get(key).and_then(Value::as_f64)
}

// A zero weight is treated like a missing value so that the next candidate field wins.
fn nonzero_number(item: &Value, key: &str) -> Option<f64> {
    number(item, key).filter(|v| *v != 0.0)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Station;
    use serde_json::json;

    fn station_json(id: i64) -> Value {
        json!({
            "staid": id,
            "staname": format!("Station {}", id),
            "country": "FR",
            "latitude": 48.85,
            "longitude": 2.35,
            "elevation": 35.0
        })
    }

    #[test]
    fn bare_and_wrapped_listings_decode_identically() {
        let bare: Vec<Station> =
            decode_listing(json!([station_json(1), station_json(2)]), "stations").unwrap();
        let wrapped: Vec<Station> = decode_listing(
            json!({ "stations": [station_json(1), station_json(2)], "count": 2 }),
            "stations",
        )
        .unwrap();
        assert_eq!(bare, wrapped);
        assert_eq!(bare.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn object_without_listing_is_empty() {
        let stations: Vec<Station> =
            decode_listing(json!({ "message": "ok" }), "stations").unwrap();
        assert!(stations.is_empty());
    }

    #[test]
    fn scalar_body_is_a_decode_error() {
        let result: Result<Vec<Station>> = decode_listing(json!("maintenance"), "stations");
        assert!(matches!(result, Err(AppError::Decode(_))));
    }

    #[test]
    fn non_array_listing_field_is_a_decode_error() {
        let result: Result<Vec<Station>> = decode_listing(json!({ "stations": 3 }), "stations");
        assert!(matches!(result, Err(AppError::Decode(_))));
    }

    #[test]
    fn malformed_item_is_a_decode_error() {
        let result: Result<Vec<Station>> = decode_listing(json!([{ "staid": "x" }]), "stations");
        assert!(matches!(result, Err(AppError::Decode(_))));
    }

    #[test]
    fn heatmap_points_accept_every_coordinate_shape() {
        let items = vec![
            json!({ "position": [2.30, 48.85], "weight": 21.0 }),
            json!({ "lon": 2.31, "lat": 48.86, "temperature": 22.0 }),
            json!({ "longitude": 2.32, "latitude": 48.87 }),
            json!({ "weight": 5.0 }),
        ];
        let points = decode_heatmap_points(&items, &BoundingBox::paris());
        assert_eq!(points.len(), 3);
        assert_eq!(points[0], HeatmapPoint::new(2.30, 48.85, 21.0));
        assert_eq!(points[1], HeatmapPoint::new(2.31, 48.86, 22.0));
        assert_eq!(points[2].weight, 0.0);
    }

    #[test]
    fn zero_coordinates_are_real_coordinates() {
        let london = BoundingBox::new(-0.2, 51.4, 0.1, 51.6).unwrap();
        let items = vec![
            json!({ "lon": 0.0, "lat": 51.5, "weight": 7.0 }),
            json!({ "lon": -0.1, "lat": 51.5, "weight": 3.0 }),
        ];
        let points = decode_heatmap_points(&items, &london);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0], HeatmapPoint::new(0.0, 51.5, 7.0));

        let equator = BoundingBox::new(10.0, -1.0, 12.0, 1.0).unwrap();
        let points = decode_heatmap_points(&[json!({ "lon": 11.0, "lat": 0 })], &equator);
        assert_eq!(points, vec![HeatmapPoint::new(11.0, 0.0, 0.0)]);
    }

    #[test]
    fn zero_weight_falls_through_to_temperature() {
        let items = vec![json!({ "position": [2.3, 48.9], "weight": 0, "temperature": 18.5 })];
        let points = decode_heatmap_points(&items, &BoundingBox::paris());
        assert_eq!(points[0].weight, 18.5);
    }

    #[test]
    fn heatmap_points_outside_bbox_are_dropped() {
        let bbox = BoundingBox::paris();
        let items = vec![
            json!({ "position": [2.3, 48.9], "weight": 1.0 }),
            json!({ "position": [13.4, 52.5], "weight": 1.0 }),
            json!({ "position": [2.3, 49.5], "weight": 1.0 }),
        ];
        let points = decode_heatmap_points(&items, &bbox);
        assert_eq!(points.len(), 1);
        assert!(points.iter().all(|p| bbox.contains(p.lon(), p.lat())));
    }

    #[test]
    fn grid_points_read_named_field() {
        let body = json!({
            "data": [
                { "lon": 2.25, "lat": 48.85, "t2m": 291.2 },
                { "lon": 2.35, "lat": 48.95, "temperature": 17.0 },
                { "lon": 2.45, "lat": 48.90 },
            ]
        });
        let points = decode_grid_points(body, "t2m", &BoundingBox::paris()).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].weight, 291.2);
        assert_eq!(points[1].weight, 17.0);
    }
}
