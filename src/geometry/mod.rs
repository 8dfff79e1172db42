//! Geometry conversion from cooler metadata shapes to bounding boxes.
//!
//! Cooler metadata describes doors and sections as free-form polygons and
//! products as four-corner boxes whose corner order varies between sources.
//! Both are reduced here to an axis-aligned [`Rect`] in pixel space.

mod point;
mod rect;

pub use point::Point;
pub use rect::Rect;

use crate::error::CoolerUploadError;

/// Bounding rectangle of a polygon.
///
/// Returns `(min x, min y, max x - min x, max y - min y)`. Fails with
/// [`CoolerUploadError::InvalidGeometry`] when the polygon is empty or any
/// point is not finite.
pub fn polygon_to_bbox(points: &[Point]) -> Result<Rect, CoolerUploadError> {
    if points.is_empty() {
        return Err(CoolerUploadError::InvalidGeometry(
            "polygon has no points".to_string(),
        ));
    }
    extent(points)
}

/// Bounding rectangle of a four-corner box given in any winding order.
///
/// Only the first four corners are considered. Fails with
/// [`CoolerUploadError::InvalidGeometry`] when fewer than four are supplied.
pub fn corners_to_bbox(corners: &[Point]) -> Result<Rect, CoolerUploadError> {
    if corners.len() < 4 {
        return Err(CoolerUploadError::InvalidGeometry(format!(
            "bounding box needs 4 corners, got {}",
            corners.len()
        )));
    }
    extent(&corners[..4])
}

fn extent(points: &[Point]) -> Result<Rect, CoolerUploadError> {
    if let Some(bad) = points.iter().find(|point| !point.is_finite()) {
        return Err(CoolerUploadError::InvalidGeometry(format!(
            "non-finite coordinate ({}, {})",
            bad.x, bad.y
        )));
    }

    let (mut xmin, mut ymin) = (f64::INFINITY, f64::INFINITY);
    let (mut xmax, mut ymax) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for point in points {
        xmin = xmin.min(point.x);
        ymin = ymin.min(point.y);
        xmax = xmax.max(point.x);
        ymax = ymax.max(point.y);
    }

    Ok(Rect::from_xyxy(xmin, ymin, xmax, ymax))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(raw: &[(f64, f64)]) -> Vec<Point> {
        raw.iter().copied().map(Point::from).collect()
    }

    #[test]
    fn polygon_bbox_spans_all_points() {
        let door = pts(&[
            (2381.0, 110.0),
            (2275.0, 931.0),
            (1964.0, 3259.0),
            (452.0, 3259.0),
            (292.0, 385.0),
            (292.0, 8.0),
            (2381.0, 8.0),
        ]);
        let rect = polygon_to_bbox(&door).expect("bbox");
        assert_eq!(rect, Rect::from_xywh(292.0, 8.0, 2089.0, 3251.0));
    }

    #[test]
    fn polygon_bbox_single_point_is_degenerate() {
        let rect = polygon_to_bbox(&pts(&[(5.0, 7.0)])).expect("bbox");
        assert_eq!(rect, Rect::from_xywh(5.0, 7.0, 0.0, 0.0));
    }

    #[test]
    fn empty_polygon_is_invalid() {
        let err = polygon_to_bbox(&[]).unwrap_err();
        assert!(matches!(err, CoolerUploadError::InvalidGeometry(_)));
    }

    #[test]
    fn corners_bbox_ignores_winding() {
        let clockwise = pts(&[(1.0, 2.0), (1.0, 9.0), (6.0, 9.0), (6.0, 2.0)]);
        let shuffled = pts(&[(6.0, 9.0), (1.0, 2.0), (6.0, 2.0), (1.0, 9.0)]);
        assert_eq!(
            corners_to_bbox(&clockwise).expect("bbox"),
            corners_to_bbox(&shuffled).expect("bbox")
        );
    }

    #[test]
    fn corners_bbox_needs_four_points() {
        let err = corners_to_bbox(&pts(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)])).unwrap_err();
        assert!(err.to_string().contains("got 3"));
    }

    #[test]
    fn non_finite_points_are_invalid() {
        let err = polygon_to_bbox(&pts(&[(0.0, 0.0), (f64::NAN, 1.0)])).unwrap_err();
        assert!(matches!(err, CoolerUploadError::InvalidGeometry(_)));
    }
}
