//! Hover and selection state for stations.
//!
//! Hovering only moves the tooltip; selecting is what triggers a series fetch, and
//! that is driven by the composition root.

use crate::dashboard::ScreenPoint;
use crate::models::Station;

/// Tooltip shown next to the hovered station.
#[derive(Debug, Clone, PartialEq)]
pub struct Tooltip {
    pub station: Station,
    pub pointer: ScreenPoint,
}

impl Tooltip {
    /// Top-left corner of the tooltip box: slightly right of and above the pointer.
    pub fn anchor(&self) -> ScreenPoint {
        ScreenPoint::new(self.pointer.x + 10.0, self.pointer.y - 10.0)
    }

    pub fn lines(&self) -> Vec<String> {
        let s = &self.station;
        let mut lines = vec![
            s.name.clone(),
            format!("{} · ID {}", s.country, s.id),
            format!("{:.4}, {:.4}", s.latitude, s.longitude),
        ];
        if let Some(elevation) = s.elevation {
            lines.push(format!("Elevation: {} m", elevation));
        }
        lines
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    hovered: Option<Tooltip>,
    selected: Option<Station>,
}

impl Selection {
    pub fn hover(&mut self, station: Option<Station>, pointer: ScreenPoint) {
        self.hovered = station.map(|station| Tooltip { station, pointer });
    }

    pub fn tooltip(&self) -> Option<&Tooltip> {
        self.hovered.as_ref()
    }

    /// Returns `false` when the station was already selected.
    pub fn select(&mut self, station: Station) -> bool {
        if self.selected_id() == Some(station.id) {
            return false;
        }
        self.selected = Some(station);
        true
    }

    pub fn clear(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<&Station> {
        self.selected.as_ref()
    }

    pub fn selected_id(&self) -> Option<i64> {
        self.selected.as_ref().map(|s| s.id)
    }
}
