//! Geometry primitives shared by the layer tree, the visibility pass and the
//! render scheduler.
//!
//! Matrices are column-major and multiply column vectors, so `a.mul(&b)`
//! applies `b` first and `a` second.

use std::f32::consts::PI;

// ─────────────────────────────────────────────────────────────────────────────
// Points, Sizes, Rectangles
// ─────────────────────────────────────────────────────────────────────────────

/// 2D point
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// 2D size
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const ZERO: Size = Size {
        width: 0.0,
        height: 0.0,
    };

    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Round up to whole device pixels, never below 1x1
    pub fn to_pixels(self) -> PixelSize {
        PixelSize::new(
            self.width.ceil().max(1.0) as u32,
            self.height.ceil().max(1.0) as u32,
        )
    }
}

/// Size in whole device pixels, used to match pooled render targets exactly
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn to_size(self) -> Size {
        Size::new(self.width as f32, self.height as f32)
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// 2D rectangle
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub const ZERO: Rect = Rect {
        origin: Point::ZERO,
        size: Size::ZERO,
    };

    /// Unit rectangle, the default sampling region of a layer's contents
    pub const UNIT: Rect = Rect::new(0.0, 0.0, 1.0, 1.0);

    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    pub fn from_origin_size(origin: Point, size: Size) -> Self {
        Self { origin, size }
    }

    /// Smallest rectangle containing both points
    pub fn from_points(a: Point, b: Point) -> Self {
        let min_x = a.x.min(b.x);
        let min_y = a.y.min(b.y);
        Rect::new(min_x, min_y, a.x.max(b.x) - min_x, a.y.max(b.y) - min_y)
    }

    pub fn x(&self) -> f32 {
        self.origin.x
    }

    pub fn y(&self) -> f32 {
        self.origin.y
    }

    pub fn width(&self) -> f32 {
        self.size.width
    }

    pub fn height(&self) -> f32 {
        self.size.height
    }

    pub fn max_x(&self) -> f32 {
        self.origin.x + self.size.width
    }

    pub fn max_y(&self) -> f32 {
        self.origin.y + self.size.height
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.origin.x + self.size.width / 2.0,
            self.origin.y + self.size.height / 2.0,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_empty()
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.origin.x
            && point.x <= self.max_x()
            && point.y >= self.origin.y
            && point.y <= self.max_y()
    }

    /// Whether `other` lies entirely within this rectangle (edges inclusive)
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.origin.x >= self.origin.x
            && other.origin.y >= self.origin.y
            && other.max_x() <= self.max_x()
            && other.max_y() <= self.max_y()
    }

    /// Overlapping region, empty (zero sized at the clamped origin) when disjoint
    pub fn intersection(&self, other: &Rect) -> Rect {
        let x = self.origin.x.max(other.origin.x);
        let y = self.origin.y.max(other.origin.y);
        let max_x = self.max_x().min(other.max_x());
        let max_y = self.max_y().min(other.max_y());
        Rect::new(x, y, (max_x - x).max(0.0), (max_y - y).max(0.0))
    }

    /// Smallest rectangle with integer edges containing this one
    pub fn integral(&self) -> Rect {
        let x = self.origin.x.floor();
        let y = self.origin.y.floor();
        Rect::new(x, y, self.max_x().ceil() - x, self.max_y().ceil() - y)
    }

    pub fn offset(&self, dx: f32, dy: f32) -> Self {
        Self {
            origin: Point::new(self.origin.x + dx, self.origin.y + dy),
            size: self.size,
        }
    }

    /// The six vertices of the two triangles covering this rectangle, in the
    /// order the quad vertex layout expects
    pub fn quad_vertices(&self) -> [[f32; 2]; 6] {
        let (x0, y0, x1, y1) = (self.x(), self.y(), self.max_x(), self.max_y());
        [[x0, y0], [x0, y1], [x1, y0], [x1, y0], [x0, y1], [x1, y1]]
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Matrices
// ─────────────────────────────────────────────────────────────────────────────

/// 4x4 transformation matrix (column-major)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mat4 {
    pub cols: [[f32; 4]; 4],
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat4 {
    pub const IDENTITY: Mat4 = Mat4 {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    pub fn translation(x: f32, y: f32, z: f32) -> Self {
        Self {
            cols: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [x, y, z, 1.0],
            ],
        }
    }

    pub fn scale(x: f32, y: f32, z: f32) -> Self {
        Self {
            cols: [
                [x, 0.0, 0.0, 0.0],
                [0.0, y, 0.0, 0.0],
                [0.0, 0.0, z, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Rotation about the Z axis, the only rotation a flat layer needs
    pub fn rotation_z(angle: f32) -> Self {
        let c = angle.cos();
        let s = angle.sin();
        Self {
            cols: [
                [c, s, 0.0, 0.0],
                [-s, c, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    pub fn rotation_z_degrees(degrees: f32) -> Self {
        Self::rotation_z(degrees * PI / 180.0)
    }

    /// Orthographic projection mapping `(0,0)..(width,height)` with y down
    /// onto clip space.
    pub fn projection_for_size(size: Size) -> Self {
        let depth = size.width.max(size.height);
        Self {
            cols: [
                [2.0 / size.width, 0.0, 0.0, 0.0],
                [0.0, -2.0 / size.height, 0.0, 0.0],
                [0.0, 0.0, 2.0 / depth, 0.0],
                [-1.0, 1.0, 0.0, 1.0],
            ],
        }
    }

    /// Projection flipped vertically, for render targets whose rows are stored
    /// bottom-up relative to the default target.
    pub fn flipped_y(&self, height: f32) -> Self {
        self.mul(&Mat4::translation(0.0, height, 0.0))
            .mul(&Mat4::scale(1.0, -1.0, 1.0))
    }

    /// Multiply two matrices
    pub fn mul(&self, other: &Mat4) -> Mat4 {
        let mut result = [[0.0f32; 4]; 4];
        for i in 0..4 {
            for j in 0..4 {
                for k in 0..4 {
                    result[i][j] += self.cols[k][j] * other.cols[i][k];
                }
            }
        }
        Mat4 { cols: result }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Transform a point on the z = 0 plane, with perspective divide
    pub fn transform_point(&self, point: Point) -> Point {
        let c = &self.cols;
        let x = c[0][0] * point.x + c[1][0] * point.y + c[3][0];
        let y = c[0][1] * point.x + c[1][1] * point.y + c[3][1];
        let w = c[0][3] * point.x + c[1][3] * point.y + c[3][3];
        if w != 0.0 && w != 1.0 {
            Point::new(x / w, y / w)
        } else {
            Point::new(x, y)
        }
    }

    /// Column-major element `index` (0..16), matching GPU buffer layout
    pub fn element(&self, index: usize) -> f32 {
        self.cols[index / 4][index % 4]
    }

    pub fn to_cols_array_2d(&self) -> [[f32; 4]; 4] {
        self.cols
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Color
// ─────────────────────────────────────────────────────────────────────────────

/// RGBA color, components in 0..=1
#[derive(Clone, Copy, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_hex(hex: u32) -> Self {
        let r = ((hex >> 16) & 0xFF) as f32 / 255.0;
        let g = ((hex >> 8) & 0xFF) as f32 / 255.0;
        let b = (hex & 0xFF) as f32 / 255.0;
        Self::rgb(r, g, b)
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.a = alpha;
        self
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_rect_containment_is_inclusive() {
        let outer = Rect::new(0.0, 0.0, 100.0, 100.0);
        assert!(outer.contains_rect(&outer));
        assert!(outer.contains_rect(&Rect::new(10.0, 10.0, 90.0, 90.0)));
        assert!(!outer.contains_rect(&Rect::new(10.0, 10.0, 91.0, 10.0)));
    }

    #[test]
    fn test_rect_integral_expands_outward() {
        let r = Rect::new(0.4, 1.6, 10.2, 3.0).integral();
        assert_eq!(r, Rect::new(0.0, 1.0, 11.0, 4.0));
    }

    #[test]
    fn test_rect_intersection_disjoint_is_empty() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 20.0, 5.0, 5.0);
        assert!(a.intersection(&b).is_empty());
        assert_eq!(
            a.intersection(&Rect::new(5.0, -5.0, 10.0, 10.0)),
            Rect::new(5.0, 0.0, 5.0, 5.0)
        );
    }

    #[test]
    fn test_projection_maps_corners_to_clip_space() {
        let p = Mat4::projection_for_size(Size::new(200.0, 100.0));
        let tl = p.transform_point(Point::new(0.0, 0.0));
        let br = p.transform_point(Point::new(200.0, 100.0));
        assert!(approx(tl.x, -1.0) && approx(tl.y, 1.0));
        assert!(approx(br.x, 1.0) && approx(br.y, -1.0));
    }

    #[test]
    fn test_flipped_projection_inverts_y() {
        let size = Size::new(64.0, 32.0);
        let p = Mat4::projection_for_size(size).flipped_y(size.height);
        let tl = p.transform_point(Point::new(0.0, 0.0));
        assert!(approx(tl.x, -1.0) && approx(tl.y, -1.0));
        assert!(approx(p.element(5), 2.0 / 32.0));
    }

    #[test]
    fn test_mat4_mul_applies_right_operand_first() {
        let t = Mat4::translation(10.0, 0.0, 0.0);
        let s = Mat4::scale(2.0, 2.0, 1.0);
        let p = t.mul(&s).transform_point(Point::new(1.0, 1.0));
        assert!(approx(p.x, 12.0) && approx(p.y, 2.0));
    }

    #[test]
    fn test_color_from_hex() {
        let c = Color::from_hex(0x174EE5);
        assert!(approx(c.r, 0x17 as f32 / 255.0));
        assert!(approx(c.b, 0xE5 as f32 / 255.0));
        assert_eq!(c.a, 1.0);
    }
}
