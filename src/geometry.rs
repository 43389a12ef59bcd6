use nalgebra::Point2;

/// A position in image pixel space
pub type Point = Point2<f64>;

/// Four corners as emitted by contour approximation or supplied by a user,
/// in no particular order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawQuad(pub [Point; 4]);

/// Four corners in canonical order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderedQuad {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_right: Point,
    pub bottom_left: Point,
}

impl RawQuad {
    /// Classify the corners into top-left/top-right/bottom-right/bottom-left.
    ///
    /// Top-left has the smallest `x + y`, bottom-right the largest. Top-right
    /// has the smallest `y - x`, bottom-left the largest. Only meaningful for
    /// convex, non-degenerate quadrilaterals; ties resolve to the first point.
    pub fn order(&self) -> OrderedQuad {
        let pts = &self.0;
        let sum = |p: &Point| p.x + p.y;
        let diff = |p: &Point| p.y - p.x;

        OrderedQuad {
            top_left: pts[argmin(pts, sum)],
            top_right: pts[argmin(pts, diff)],
            bottom_right: pts[argmax(pts, sum)],
            bottom_left: pts[argmax(pts, diff)],
        }
    }
}

impl From<OrderedQuad> for RawQuad {
    fn from(quad: OrderedQuad) -> Self {
        RawQuad(quad.corners())
    }
}

impl OrderedQuad {
    /// Corners as `[top_left, top_right, bottom_right, bottom_left]`
    pub fn corners(&self) -> [Point; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }

    /// Divide every coordinate by `factor` (maps a downscaled result back)
    pub fn unscaled(&self, factor: f64) -> OrderedQuad {
        let f = |p: Point| Point::new(p.x / factor, p.y / factor);
        OrderedQuad {
            top_left: f(self.top_left),
            top_right: f(self.top_right),
            bottom_right: f(self.bottom_right),
            bottom_left: f(self.bottom_left),
        }
    }

    /// Width of the flattened card: the longer of the top and bottom edges
    pub fn flattened_width(&self) -> f64 {
        edge_length(&self.top_left, &self.top_right)
            .max(edge_length(&self.bottom_left, &self.bottom_right))
    }

    /// Height of the flattened card: the longer of the left and right edges
    pub fn flattened_height(&self) -> f64 {
        edge_length(&self.top_left, &self.bottom_left)
            .max(edge_length(&self.top_right, &self.bottom_right))
    }
}

fn argmin(pts: &[Point; 4], key: impl Fn(&Point) -> f64) -> usize {
    let mut best = 0;
    for i in 1..pts.len() {
        if key(&pts[i]) < key(&pts[best]) {
            best = i;
        }
    }
    best
}

fn argmax(pts: &[Point; 4], key: impl Fn(&Point) -> f64) -> usize {
    argmin(pts, |p| -key(p))
}

/// Euclidean distance between two points
pub fn edge_length(a: &Point, b: &Point) -> f64 {
    nalgebra::distance(a, b)
}

/// Simplify a closed contour with the Douglas-Peucker algorithm.
///
/// The curve is split at two mutually distant vertices and each half is
/// reduced independently, so the result does not depend on where the
/// contour tracer happened to start.
pub fn approximate_closed_polygon(contour: &[Point], epsilon: f64) -> Vec<Point> {
    let n = contour.len();
    if n < 3 {
        return contour.to_vec();
    }

    let farthest_from = |origin: usize| -> (usize, f64) {
        let mut best = (origin, 0.0);
        for (i, p) in contour.iter().enumerate() {
            let d = edge_length(&contour[origin], p);
            if d > best.1 {
                best = (i, d);
            }
        }
        best
    };

    let (anchor, _) = farthest_from(0);
    let (far, far_dist) = farthest_from(anchor);
    if far_dist <= epsilon {
        return vec![contour[anchor]];
    }

    // Walk indices relative to the anchor so both halves are contiguous
    let at = |i: usize| contour[(anchor + i) % n];
    let split = (far + n - anchor) % n;

    let mut poly = Vec::new();
    let mut stack = vec![(split, n), (0, split)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            poly.push(at(start));
            continue;
        }

        let (a, b) = (at(start), at(end));
        let mut max_dist = 0.0;
        let mut max_idx = start;
        for i in (start + 1)..end {
            let d = perpendicular_distance(&a, &b, &at(i));
            if d > max_dist {
                max_dist = d;
                max_idx = i;
            }
        }

        if max_dist > epsilon {
            stack.push((max_idx, end));
            stack.push((start, max_idx));
        } else {
            poly.push(a);
        }
    }

    poly
}

fn perpendicular_distance(a: &Point, b: &Point, p: &Point) -> f64 {
    let ab = b - a;
    let ap = p - a;
    let len = ab.norm();
    if len < f64::EPSILON {
        return ap.norm();
    }
    (ab.x * ap.y - ab.y * ap.x).abs() / len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> RawQuad {
        RawQuad([
            Point::new(412.0, 96.0),
            Point::new(118.0, 140.0),
            Point::new(160.0, 330.0),
            Point::new(455.0, 290.0),
        ])
    }

    #[test]
    fn test_order_corners() {
        let ordered = quad().order();
        assert_eq!(ordered.top_left, Point::new(118.0, 140.0));
        assert_eq!(ordered.top_right, Point::new(412.0, 96.0));
        assert_eq!(ordered.bottom_right, Point::new(455.0, 290.0));
        assert_eq!(ordered.bottom_left, Point::new(160.0, 330.0));
    }

    #[test]
    fn test_order_is_idempotent() {
        let once = quad().order();
        let twice = RawQuad::from(once).order();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_order_ignores_rotation_and_reflection() {
        let expected = quad().order();
        let mut pts = quad().0;
        for _ in 0..4 {
            pts.rotate_left(1);
            assert_eq!(RawQuad(pts).order(), expected);
            let mut reflected = pts;
            reflected.reverse();
            assert_eq!(RawQuad(reflected).order(), expected);
        }
    }

    #[test]
    fn test_edge_length() {
        let d = edge_length(&Point::new(0.0, 0.0), &Point::new(3.0, 4.0));
        assert!((d - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_approximate_dense_rectangle_outline() {
        let mut contour = Vec::new();
        for x in 0..100 {
            contour.push(Point::new(x as f64, 0.0));
        }
        for y in 0..60 {
            contour.push(Point::new(100.0, y as f64));
        }
        for x in (1..=100).rev() {
            contour.push(Point::new(x as f64, 60.0));
        }
        for y in (1..=60).rev() {
            contour.push(Point::new(0.0, y as f64));
        }
        // 2% of the 320 px outline
        let poly = approximate_closed_polygon(&contour, 6.4);
        assert_eq!(poly.len(), 4);
        for corner in [(0.0, 0.0), (100.0, 0.0), (100.0, 60.0), (0.0, 60.0)] {
            assert!(poly.contains(&Point::new(corner.0, corner.1)), "missing {:?}", corner);
        }
    }
}
