/// Smallest thumb length in pixels, so short views stay grabbable.
pub const THUMB_MIN: f64 = 20.0;
/// Fraction of the scrollable range moved per wheel line over the bar.
pub const WHEEL_STEP_FRACTION: f64 = 0.02;

/// Thumb layout for a scrollbar over `[0, total)` showing a `viewport`-sized window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollbarGeometry {
    track: f64,
    thumb: f64,
    max_value: f64,
    visible: bool,
}

impl ScrollbarGeometry {
    pub fn new(track: f64, viewport: f64, total: f64) -> Self {
        let track = if track.is_finite() { track.max(0.0) } else { 0.0 };
        let ratio = if total > 0.0 && viewport.is_finite() {
            (viewport / total).clamp(0.0, 1.0)
        } else {
            1.0
        };
        Self {
            track,
            thumb: (ratio * track).max(THUMB_MIN).min(track),
            max_value: (total - viewport).max(0.0),
            visible: ratio < 1.0,
        }
    }

    /// Hidden when the whole range already fits the viewport.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn thumb_length(&self) -> f64 {
        self.thumb
    }

    pub fn max_value(&self) -> f64 {
        self.max_value
    }

    pub fn thumb_position(&self, value: f64) -> f64 {
        if self.max_value <= 0.0 {
            return 0.0;
        }
        (value / self.max_value).clamp(0.0, 1.0) * self.travel()
    }

    /// Inverse of [`Self::thumb_position`], clamped to `[0, max_value]`.
    pub fn value_at(&self, thumb_position: f64) -> f64 {
        let travel = self.travel();
        if travel <= 0.0 || !thumb_position.is_finite() {
            return 0.0;
        }
        (thumb_position / travel).clamp(0.0, 1.0) * self.max_value
    }

    pub fn wheel_step(&self) -> f64 {
        self.max_value * WHEEL_STEP_FRACTION
    }

    fn travel(&self) -> f64 {
        (self.track - self.thumb).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumb_is_proportional_with_a_floor() {
        let bar = ScrollbarGeometry::new(400.0, 100.0, 1000.0);
        assert!(bar.is_visible());
        assert_eq!(bar.thumb_length(), 40.0);
        assert_eq!(bar.max_value(), 900.0);

        let tiny = ScrollbarGeometry::new(400.0, 1.0, 1e9);
        assert_eq!(tiny.thumb_length(), THUMB_MIN);
    }

    #[test]
    fn hidden_when_everything_fits() {
        let bar = ScrollbarGeometry::new(400.0, 1000.0, 500.0);
        assert!(!bar.is_visible());
        assert_eq!(bar.thumb_position(123.0), 0.0);
        assert_eq!(bar.value_at(50.0), 0.0);
    }

    #[test]
    fn position_and_value_map_onto_each_other() {
        let bar = ScrollbarGeometry::new(400.0, 100.0, 1000.0);
        assert_eq!(bar.thumb_position(0.0), 0.0);
        assert_eq!(bar.thumb_position(900.0), 360.0);
        assert_eq!(bar.value_at(180.0), 450.0);
        assert_eq!(bar.value_at(-20.0), 0.0);
        assert_eq!(bar.value_at(1e6), 900.0);
        assert_eq!(bar.wheel_step(), 18.0);
    }
}
