//! Pointer-driven widgets: the draggable floating panel and the swipe comparison
//! divider.

use std::ops::Sub;

/// A point in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Sub for ScreenPoint {
    type Output = ScreenPoint;

    fn sub(self, rhs: ScreenPoint) -> ScreenPoint {
        ScreenPoint::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// A floating panel the user can move around and collapse.
#[derive(Debug, Clone, PartialEq)]
pub struct DraggablePanel {
    pub title: String,
    origin: ScreenPoint,
    grab_offset: ScreenPoint,
    dragging: bool,
    minimized: bool,
}

impl DraggablePanel {
    pub fn new(title: &str, origin: ScreenPoint) -> Self {
        Self {
            title: title.to_string(),
            origin,
            grab_offset: ScreenPoint::default(),
            dragging: false,
            minimized: false,
        }
    }

    pub fn origin(&self) -> ScreenPoint {
        self.origin
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    /// Pointer pressed on the panel; remembers where inside the panel it was grabbed.
    pub fn press(&mut self, pointer: ScreenPoint) {
        self.grab_offset = pointer - self.origin;
        self.dragging = true;
    }

    /// Pointer moved anywhere on screen. Returns whether the panel moved.
    pub fn pointer_moved(&mut self, pointer: ScreenPoint) -> bool {
        if !self.dragging {
            return false;
        }
        self.origin = pointer - self.grab_offset;
        true
    }

    pub fn release(&mut self) {
        self.dragging = false;
    }

    pub fn toggle_minimized(&mut self) -> bool {
        self.minimized = !self.minimized;
        self.minimized
    }
}

impl Default for DraggablePanel {
    fn default() -> Self {
        Self::new("", ScreenPoint::new(100.0, 100.0))
    }
}

/// Divider of the side-by-side comparison view, as a percentage of the container
/// width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwipeDivider {
    percentage: f64,
    dragging: bool,
}

impl Default for SwipeDivider {
    fn default() -> Self {
        Self::new(50.0)
    }
}

impl SwipeDivider {
    pub fn new(percentage: f64) -> Self {
        Self {
            percentage: percentage.clamp(0.0, 100.0),
            dragging: false,
        }
    }

    pub fn percentage(&self) -> f64 {
        self.percentage
    }

    /// Converts a pointer x relative to the container's left edge into a clamped
    /// percentage.
    pub fn percentage_for(x: f64, container_width: f64) -> f64 {
        if container_width <= 0.0 {
            return 0.0;
        }
        (x / container_width * 100.0).clamp(0.0, 100.0)
    }

    pub fn press(&mut self, x: f64, container_width: f64) {
        self.dragging = true;
        self.percentage = Self::percentage_for(x, container_width);
    }

    pub fn pointer_moved(&mut self, x: f64, container_width: f64) -> bool {
        if !self.dragging {
            return false;
        }
        self.percentage = Self::percentage_for(x, container_width);
        true
    }

    pub fn release(&mut self) {
        self.dragging = false;
    }

    /// Whether the left-hand map is drawn above the right-hand one.
    pub fn left_on_top(&self) -> bool {
        self.percentage <= 50.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panel_follows_pointer_keeping_grab_offset() {
        let mut panel = DraggablePanel::new("Series", ScreenPoint::new(100.0, 100.0));
        assert!(!panel.pointer_moved(ScreenPoint::new(500.0, 500.0)));

        panel.press(ScreenPoint::new(120.0, 110.0));
        assert!(panel.is_dragging());
        assert!(panel.pointer_moved(ScreenPoint::new(320.0, 60.0)));
        assert_eq!(panel.origin(), ScreenPoint::new(300.0, 50.0));

        panel.release();
        assert!(!panel.pointer_moved(ScreenPoint::new(0.0, 0.0)));
        assert_eq!(panel.origin(), ScreenPoint::new(300.0, 50.0));
    }

    #[test]
    fn panel_minimise_toggles() {
        let mut panel = DraggablePanel::default();
        assert!(panel.toggle_minimized());
        assert!(panel.is_minimized());
        assert!(!panel.toggle_minimized());
    }

    #[test]
    fn divider_is_clamped_to_the_container() {
        assert_eq!(SwipeDivider::percentage_for(250.0, 1000.0), 25.0);
        assert_eq!(SwipeDivider::percentage_for(-40.0, 1000.0), 0.0);
        assert_eq!(SwipeDivider::percentage_for(1400.0, 1000.0), 100.0);
        assert_eq!(SwipeDivider::percentage_for(10.0, 0.0), 0.0);

        let mut divider = SwipeDivider::default();
        assert!(divider.left_on_top());
        divider.press(800.0, 1000.0);
        assert!(divider.pointer_moved(900.0, 1000.0));
        assert_eq!(divider.percentage(), 90.0);
        assert!(!divider.left_on_top());
        divider.release();
        assert!(!divider.pointer_moved(100.0, 1000.0));
    }
}
