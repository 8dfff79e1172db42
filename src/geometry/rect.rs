//! Axis-aligned rectangles in XYWH form.

use serde::Serialize;

/// An axis-aligned rectangle: top-left corner plus width and height.
///
/// Rectangles produced by the converters in [`super`] always have
/// non-negative width and height; a degenerate input collapses to zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Creates a rectangle from its top-left corner and size.
    #[inline]
    pub fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Creates a rectangle from min and max corners.
    #[inline]
    pub fn from_xyxy(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self::from_xywh(xmin, ymin, xmax - xmin, ymax - ymin)
    }

    #[inline]
    pub fn xmin(&self) -> f64 {
        self.x
    }

    #[inline]
    pub fn ymin(&self) -> f64 {
        self.y
    }

    #[inline]
    pub fn xmax(&self) -> f64 {
        self.x + self.width
    }

    #[inline]
    pub fn ymax(&self) -> f64 {
        self.y + self.height
    }

    /// Corners rounded to the nearest integer, as `(xmin, ymin, xmax, ymax)`.
    pub fn rounded_xyxy(&self) -> (i64, i64, i64, i64) {
        (
            self.xmin().round() as i64,
            self.ymin().round() as i64,
            self.xmax().round() as i64,
            self.ymax().round() as i64,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_from_xyxy() {
        let rect = Rect::from_xyxy(10.0, 20.0, 100.0, 80.0);
        assert_eq!(rect.width, 90.0);
        assert_eq!(rect.height, 60.0);
        assert_eq!(rect.xmax(), 100.0);
        assert_eq!(rect.ymax(), 80.0);
    }

    #[test]
    fn rounded_xyxy_rounds_half_away_from_zero() {
        let rect = Rect::from_xywh(1364.303, 2638.5, 223.6, 624.2);
        assert_eq!(rect.rounded_xyxy(), (1364, 2639, 1588, 3263));
    }
}
