// ============================================================================
// Geometry primitives: rectangles, boundary segments, affine matrices
// ============================================================================

/// Integer rectangle in image coordinates. `width`/`height` may be zero or
/// negative for an empty rectangle; use [`Rect::is_empty`] rather than
/// comparing against zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Build from two corners, `(x2, y2)` exclusive.
    pub fn from_corners(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    pub fn x2(&self) -> i32 {
        self.x + self.width
    }

    pub fn y2(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.x2() && y >= self.y && y < self.y2()
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Overlap of two rectangles, `None` when they don't intersect.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.x2().min(other.x2());
        let y2 = self.y2().min(other.y2());
        let r = Rect::from_corners(x1, y1, x2, y2);
        if r.is_empty() { None } else { Some(r) }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.intersect(other).is_some()
    }

    /// Smallest rectangle covering both. Empty inputs are ignored.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::from_corners(
            self.x.min(other.x),
            self.y.min(other.y),
            self.x2().max(other.x2()),
            self.y2().max(other.y2()),
        )
    }
}

// ============================================================================
// BOUNDARY TRACING
// ============================================================================

/// Mask values at or above this count as selected when tracing outlines.
pub const HALF_WAY: u8 = 128;

/// One edge of a traced outline, in pixel-corner coordinates.
///
/// Segments are either horizontal (`y1 == y2`) or vertical (`x1 == x2`).
/// `open` is set when the selected side lies below (horizontal) or to the
/// right (vertical) of the segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundSeg {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub open: bool,
}

impl BoundSeg {
    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self {
            x1: self.x1 + dx,
            y1: self.y1 + dy,
            x2: self.x2 + dx,
            y2: self.y2 + dy,
            open: self.open,
        }
    }

    pub fn is_horizontal(&self) -> bool {
        self.y1 == self.y2
    }
}

/// The four outline edges of a plain rectangle.
pub fn rect_boundary(r: &Rect) -> Vec<BoundSeg> {
    if r.is_empty() {
        return Vec::new();
    }
    vec![
        BoundSeg { x1: r.x, y1: r.y, x2: r.x2(), y2: r.y, open: true },
        BoundSeg { x1: r.x, y1: r.y2(), x2: r.x2(), y2: r.y2(), open: false },
        BoundSeg { x1: r.x, y1: r.y, x2: r.x, y2: r.y2(), open: true },
        BoundSeg { x1: r.x2(), y1: r.y, x2: r.x2(), y2: r.y2(), open: false },
    ]
}

/// How pixels outside the clip rectangle are treated while tracing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundaryType {
    /// Pixels outside `clip` count as unselected, so the outline closes
    /// along the clip edges.
    WithinBounds,
    /// `clip` is ignored; only `region` limits the trace.
    IgnoreBounds,
}

/// Trace the outline of everything `value` reports at or above `threshold`
/// inside `region`.
///
/// Edges are collected as maximal horizontal and vertical runs where the
/// selected state flips between neighbouring pixels, the same scan the
/// marching-ants overlay uses. Coordinates are in the sampler's space.
pub fn find_boundary<F>(
    region: Rect,
    bound_type: BoundaryType,
    clip: Rect,
    threshold: u8,
    value: F,
) -> Vec<BoundSeg>
where
    F: Fn(i32, i32) -> u8,
{
    let mut segs = Vec::new();
    if region.is_empty() {
        return segs;
    }

    let inside = |x: i32, y: i32| -> bool {
        if !region.contains(x, y) {
            return false;
        }
        if bound_type == BoundaryType::WithinBounds && !clip.contains(x, y) {
            return false;
        }
        value(x, y) >= threshold
    };

    // Horizontal edges: between row y-1 and row y
    for y in region.y..=region.y2() {
        let mut run: Option<(i32, bool)> = None;
        for x in region.x..=region.x2() {
            let edge = if x < region.x2() {
                let above = inside(x, y - 1);
                let below = inside(x, y);
                if above != below { Some(below) } else { None }
            } else {
                None
            };
            match (run, edge) {
                (Some((_, open)), Some(e)) if open == e => {}
                (Some((start, open)), _) => {
                    segs.push(BoundSeg { x1: start, y1: y, x2: x, y2: y, open });
                    run = edge.map(|e| (x, e));
                }
                (None, Some(e)) => run = Some((x, e)),
                (None, None) => {}
            }
        }
    }

    // Vertical edges: between column x-1 and column x
    for x in region.x..=region.x2() {
        let mut run: Option<(i32, bool)> = None;
        for y in region.y..=region.y2() {
            let edge = if y < region.y2() {
                let left = inside(x - 1, y);
                let right = inside(x, y);
                if left != right { Some(right) } else { None }
            } else {
                None
            };
            match (run, edge) {
                (Some((_, open)), Some(e)) if open == e => {}
                (Some((start, open)), _) => {
                    segs.push(BoundSeg { x1: x, y1: start, x2: x, y2: y, open });
                    run = edge.map(|e| (y, e));
                }
                (None, Some(e)) => run = Some((y, e)),
                (None, None) => {}
            }
        }
    }

    segs
}

/// Bounding rectangle of a segment list.
pub fn segments_bounds(segs: &[BoundSeg]) -> Option<Rect> {
    let first = segs.first()?;
    let (mut x1, mut y1, mut x2, mut y2) = (first.x1, first.y1, first.x2, first.y2);
    for s in segs {
        x1 = x1.min(s.x1.min(s.x2));
        y1 = y1.min(s.y1.min(s.y2));
        x2 = x2.max(s.x1.max(s.x2));
        y2 = y2.max(s.y1.max(s.y2));
    }
    Some(Rect::from_corners(x1, y1, x2, y2))
}

// ============================================================================
// ORIENTATION / ROTATION
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rotation {
    Cw90,
    Rotate180,
    Ccw90,
}

impl Rotation {
    /// Rotate a point about `(cx, cy)`.
    pub fn apply(&self, x: f64, y: f64, cx: f64, cy: f64) -> (f64, f64) {
        let (dx, dy) = (x - cx, y - cy);
        match self {
            Rotation::Cw90 => (cx - dy, cy + dx),
            Rotation::Rotate180 => (cx - dx, cy - dy),
            Rotation::Ccw90 => (cx + dy, cy - dx),
        }
    }

    /// Bounding box of `r` after rotation about `(cx, cy)`.
    pub fn apply_rect(&self, r: &Rect, cx: f64, cy: f64) -> Rect {
        let (ax, ay) = self.apply(r.x as f64, r.y as f64, cx, cy);
        let (bx, by) = self.apply(r.x2() as f64, r.y2() as f64, cx, cy);
        let x1 = ax.min(bx).round() as i32;
        let y1 = ay.min(by).round() as i32;
        let (w, h) = match self {
            Rotation::Rotate180 => (r.width, r.height),
            _ => (r.height, r.width),
        };
        Rect::new(x1, y1, w, h)
    }
}

/// Whether a geometry change keeps the item's original bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ClipResult {
    #[default]
    Adjust,
    Clip,
}

// ============================================================================
// AFFINE MATRIX
// ============================================================================

/// Row-major 3×3 matrix for 2D affine/projective transforms.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix3(pub [[f64; 3]; 3]);

impl Default for Matrix3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix3 {
    pub const fn identity() -> Self {
        Self([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
    }

    pub fn translation(dx: f64, dy: f64) -> Self {
        Self([[1.0, 0.0, dx], [0.0, 1.0, dy], [0.0, 0.0, 1.0]])
    }

    pub fn scaling(sx: f64, sy: f64) -> Self {
        Self([[sx, 0.0, 0.0], [0.0, sy, 0.0], [0.0, 0.0, 1.0]])
    }

    /// Rotation by `radians` about the origin.
    pub fn rotation(radians: f64) -> Self {
        let (s, c) = radians.sin_cos();
        Self([[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]])
    }

    /// `self * other`: applies `other` first.
    pub fn multiply(&self, other: &Matrix3) -> Matrix3 {
        let mut out = [[0.0; 3]; 3];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| self.0[r][k] * other.0[k][c]).sum();
            }
        }
        Matrix3(out)
    }

    pub fn transform_point(&self, x: f64, y: f64) -> (f64, f64) {
        let m = &self.0;
        let w = m[2][0] * x + m[2][1] * y + m[2][2];
        let w = if w.abs() < 1e-12 { 1.0 } else { w };
        (
            (m[0][0] * x + m[0][1] * y + m[0][2]) / w,
            (m[1][0] * x + m[1][1] * y + m[1][2]) / w,
        )
    }

    /// Inverse, or `None` when the matrix is singular.
    pub fn invert(&self) -> Option<Matrix3> {
        let m = &self.0;
        let (a, b, c) = (m[0][0], m[0][1], m[0][2]);
        let (d, e, f) = (m[1][0], m[1][1], m[1][2]);
        let (g, h, i) = (m[2][0], m[2][1], m[2][2]);

        let det = a * (e * i - f * h) - b * (d * i - f * g) + c * (d * h - e * g);
        if det.abs() < 1e-12 {
            return None;
        }
        let inv = 1.0 / det;
        Some(Matrix3([
            [(e * i - f * h) * inv, (c * h - b * i) * inv, (b * f - c * e) * inv],
            [(f * g - d * i) * inv, (a * i - c * g) * inv, (c * d - a * f) * inv],
            [(d * h - e * g) * inv, (b * g - a * h) * inv, (a * e - b * d) * inv],
        ]))
    }

    /// Integer bounding box of `r` after transformation.
    pub fn transform_rect(&self, r: &Rect) -> Rect {
        let corners = [
            (r.x as f64, r.y as f64),
            (r.x2() as f64, r.y as f64),
            (r.x as f64, r.y2() as f64),
            (r.x2() as f64, r.y2() as f64),
        ];
        let mut min = (f64::MAX, f64::MAX);
        let mut max = (f64::MIN, f64::MIN);
        for (x, y) in corners {
            let (tx, ty) = self.transform_point(x, y);
            min = (min.0.min(tx), min.1.min(ty));
            max = (max.0.max(tx), max.1.max(ty));
        }
        Rect::from_corners(
            min.0.floor() as i32,
            min.1.floor() as i32,
            max.0.ceil() as i32,
            max.1.ceil() as i32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_intersection_and_union() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 10, 10);
        assert_eq!(a.intersect(&b), Some(Rect::new(5, 5, 5, 5)));
        assert_eq!(a.union(&b), Rect::new(0, 0, 15, 15));
        assert_eq!(a.intersect(&Rect::new(20, 20, 1, 1)), None);
    }

    #[test]
    fn boundary_of_square_is_four_segments() {
        let region = Rect::new(0, 0, 8, 8);
        let selected = Rect::new(2, 2, 3, 3);
        let segs = find_boundary(region, BoundaryType::IgnoreBounds, region, HALF_WAY, |x, y| {
            if selected.contains(x, y) { 255 } else { 0 }
        });
        assert_eq!(segs.len(), 4);
        assert_eq!(segments_bounds(&segs), Some(selected));
    }

    #[test]
    fn within_bounds_closes_outline_at_clip() {
        let region = Rect::new(0, 0, 8, 8);
        let clip = Rect::new(0, 0, 4, 8);
        let segs = find_boundary(region, BoundaryType::WithinBounds, clip, HALF_WAY, |_, _| 255);
        assert_eq!(segments_bounds(&segs), Some(clip));
    }

    #[test]
    fn below_threshold_is_unselected() {
        let region = Rect::new(0, 0, 4, 4);
        let segs = find_boundary(region, BoundaryType::IgnoreBounds, region, HALF_WAY, |_, _| 127);
        assert!(segs.is_empty());
    }

    #[test]
    fn matrix_inverse_round_trips() {
        let m = Matrix3::translation(3.0, -2.0).multiply(&Matrix3::scaling(2.0, 4.0));
        let inv = m.invert().unwrap();
        let (x, y) = m.transform_point(1.5, 2.5);
        let (bx, by) = inv.transform_point(x, y);
        assert!((bx - 1.5).abs() < 1e-9 && (by - 2.5).abs() < 1e-9);
        assert!(Matrix3::scaling(0.0, 1.0).invert().is_none());
    }

    #[test]
    fn rotate_rect_about_center() {
        let r = Rect::new(0, 0, 4, 2);
        assert_eq!(Rotation::Cw90.apply_rect(&r, 2.0, 1.0), Rect::new(1, -1, 2, 4));
        assert_eq!(Rotation::Rotate180.apply_rect(&r, 2.0, 1.0), r);
    }
}
