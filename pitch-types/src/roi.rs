use serde::{Deserialize, Serialize};

/// A region of interest in pixel coordinates, carried as a polygon.
///
/// This is the single source of truth for both consumers: the activity
/// predicate uses [`RoiPolygon::contains_point`] and the detector's crop uses
/// [`RoiPolygon::bounding_rect`], so the two representations can never drift
/// apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoiPolygon {
    /// Vertices in pixel coordinates, in order (not required to be closed;
    /// the last vertex implicitly connects back to the first).
    pub vertices: Vec<(f64, f64)>,
}

impl RoiPolygon {
    pub fn new(vertices: Vec<(f64, f64)>) -> Self {
        Self { vertices }
    }

    /// A polygon covering the entire `width`x`height` image.
    pub fn full_frame(width: u32, height: u32) -> Self {
        let (w, h) = (width as f64, height as f64);
        Self::new(vec![(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)])
    }

    /// Axis-aligned bounding rectangle as (x_min, y_min, x_max, y_max).
    pub fn bounding_rect(&self) -> (f64, f64, f64, f64) {
        let mut x_min = f64::INFINITY;
        let mut y_min = f64::INFINITY;
        let mut x_max = f64::NEG_INFINITY;
        let mut y_max = f64::NEG_INFINITY;
        for &(x, y) in &self.vertices {
            x_min = x_min.min(x);
            y_min = y_min.min(y);
            x_max = x_max.max(x);
            y_max = y_max.max(y);
        }
        (x_min, y_min, x_max, y_max)
    }

    /// Even-odd ray-casting point-in-polygon test.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.vertices[i];
            let (xj, yj) = self.vertices[j];
            if ((yi > y) != (yj > y))
                && (x < (xj - xi) * (y - yi) / (yj - yi) + xi)
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_contains_center_not_outside() {
        let roi = RoiPolygon::new(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        assert!(roi.contains_point(5.0, 5.0));
        assert!(!roi.contains_point(15.0, 5.0));
        assert_eq!(roi.bounding_rect(), (0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn full_frame_covers_corners_but_not_beyond() {
        let roi = RoiPolygon::full_frame(640, 480);
        assert!(roi.contains_point(1.0, 1.0));
        assert!(!roi.contains_point(641.0, 1.0));
    }
}
