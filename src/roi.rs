use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Regions of interest: geometric predicates over one or two dimensions
// ---------------------------------------------------------------------------

/// Axis-aligned rectangle with inclusive bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectangularRoi {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl RectangularRoi {
    pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Self {
        RectangularRoi {
            xmin,
            xmax,
            ymin,
            ymax,
        }
    }

    /// Replace the box bounds in place.
    pub fn update_limits(&mut self, xmin: f64, ymin: f64, xmax: f64, ymax: f64) {
        self.xmin = xmin;
        self.ymin = ymin;
        self.xmax = xmax;
        self.ymax = ymax;
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }
}

/// Circle described by centre and radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircularRoi {
    pub xc: f64,
    pub yc: f64,
    pub radius: f64,
}

impl CircularRoi {
    pub fn new(xc: f64, yc: f64, radius: f64) -> Self {
        CircularRoi { xc, yc, radius }
    }

    pub fn update_limits(&mut self, xc: f64, yc: f64, radius: f64) {
        self.xc = xc;
        self.yc = yc;
        self.radius = radius;
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        let dx = x - self.xc;
        let dy = y - self.yc;
        dx * dx + dy * dy <= self.radius * self.radius
    }
}

/// Simple polygon, tested with the even-odd (ray casting) rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonalRoi {
    pub vx: Vec<f64>,
    pub vy: Vec<f64>,
}

impl PolygonalRoi {
    pub fn new(vx: Vec<f64>, vy: Vec<f64>) -> Self {
        assert_eq!(vx.len(), vy.len(), "vertex arrays differ in length");
        PolygonalRoi { vx, vy }
    }

    /// Append a vertex to the boundary.
    pub fn add_point(&mut self, x: f64, y: f64) {
        self.vx.push(x);
        self.vy.push(y);
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        let n = self.vx.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = (self.vx[i], self.vy[i]);
            let (xj, yj) = (self.vx[j], self.vy[j]);
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

/// Membership in a fixed set of category labels. Matching is exact string
/// equality against the dataset's categorical encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalRoi {
    pub categories: BTreeSet<String>,
}

impl CategoricalRoi {
    pub fn new<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CategoricalRoi {
            categories: categories.into_iter().map(Into::into).collect(),
        }
    }

    pub fn update_categories<I, S>(&mut self, categories: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
    }

    pub fn contains(&self, label: &str) -> bool {
        self.categories.contains(label)
    }
}

/// A two-dimensional geometric region usable in a
/// [`crate::subset::RoiSubsetState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Roi {
    Rectangular(RectangularRoi),
    Circular(CircularRoi),
    Polygonal(PolygonalRoi),
}

impl Roi {
    /// Point-in-region test over coordinate slices of equal length.
    pub fn contains(&self, x: &[f64], y: &[f64]) -> Vec<bool> {
        debug_assert_eq!(x.len(), y.len());
        x.iter()
            .zip(y)
            .map(|(&px, &py)| match self {
                Roi::Rectangular(r) => r.contains(px, py),
                Roi::Circular(c) => c.contains(px, py),
                Roi::Polygonal(p) => p.contains(px, py),
            })
            .collect()
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Roi::Rectangular(r) => write!(
                f,
                "Rect[{}..{}, {}..{}]",
                r.xmin, r.xmax, r.ymin, r.ymax
            ),
            Roi::Circular(c) => write!(f, "Circle[({}, {}), r={}]", c.xc, c.yc, c.radius),
            Roi::Polygonal(p) => write!(f, "Polygon[{} vertices]", p.vx.len()),
        }
    }
}

impl From<RectangularRoi> for Roi {
    fn from(r: RectangularRoi) -> Self {
        Roi::Rectangular(r)
    }
}

impl From<CircularRoi> for Roi {
    fn from(c: CircularRoi) -> Self {
        Roi::Circular(c)
    }
}

impl From<PolygonalRoi> for Roi {
    fn from(p: PolygonalRoi) -> Self {
        Roi::Polygonal(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangle_bounds_are_inclusive() {
        let r = RectangularRoi::new(0.0, 1.0, 0.0, 1.0);
        assert!(r.contains(0.0, 0.0));
        assert!(r.contains(1.0, 1.0));
        assert!(r.contains(0.5, 0.5));
        assert!(!r.contains(1.0001, 0.5));
        assert!(!r.contains(0.5, -0.0001));
    }

    #[test]
    fn rectangle_update_limits() {
        let mut r = RectangularRoi::new(0.0, 1.0, 0.0, 1.0);
        r.update_limits(0.5, 0.5, 1.5, 1.5);
        assert!(!r.contains(0.0, 0.0));
        assert!(r.contains(1.0, 1.0));
    }

    #[test]
    fn circle_contains_boundary() {
        let c = CircularRoi::new(0.0, 0.0, 1.0);
        assert!(c.contains(1.0, 0.0));
        assert!(c.contains(0.0, -1.0));
        assert!(!c.contains(1.0, 1.0));
    }

    #[test]
    fn polygon_even_odd() {
        // unit square
        let p = PolygonalRoi::new(vec![0.0, 1.0, 1.0, 0.0], vec![0.0, 0.0, 1.0, 1.0]);
        assert!(p.contains(0.5, 0.5));
        assert!(!p.contains(1.5, 0.5));
        assert!(!p.contains(-0.1, 0.5));
    }

    #[test]
    fn categorical_exact_match() {
        let roi = CategoricalRoi::new(["a", "c"]);
        assert!(roi.contains("a"));
        assert!(!roi.contains("A"));
        assert!(!roi.contains("b"));
        assert!(roi.contains("c"));
    }

    #[test]
    fn roi_contains_over_arrays() {
        let roi: Roi = RectangularRoi::new(0.5, 1.5, 0.5, 1.5).into();
        let x = [1.0, 2.0, 1.0];
        let y = [1.0, 1.0, 3.0];
        assert_eq!(roi.contains(&x, &y), vec![true, false, false]);
    }
}
