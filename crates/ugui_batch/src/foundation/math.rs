//! Math utilities and types
//!
//! Provides the canvas-space math used by batching: rigid transforms,
//! clip rects and axis-aligned bounding boxes.

pub use nalgebra::{Quaternion, Unit, Vector2, Vector3};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Transform representing position, rotation, and scale
///
/// Points are mapped scale first, then rotation, then translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform from all three components
    pub fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self { position, rotation, scale }
    }

    /// Apply this transform to a point
    pub fn transform_point(&self, point: &Vec3) -> Vec3 {
        self.position + self.rotation * self.scale.component_mul(point)
    }

    /// Apply rotation only; used for tangent frames
    pub fn rotate_vector(&self, vector: &Vec3) -> Vec3 {
        self.rotation * vector
    }

    /// Combine this transform with another
    ///
    /// The result maps a point through `other` first and then through `self`.
    pub fn combine(&self, other: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * (self.scale.component_mul(&other.position)),
            rotation: self.rotation * other.rotation,
            scale: self.scale.component_mul(&other.scale),
        }
    }

    /// Get the inverse transform
    ///
    /// Exact for uniform scale.
    pub fn inverse(&self) -> Transform {
        let inv_scale = Vec3::new(1.0 / self.scale.x, 1.0 / self.scale.y, 1.0 / self.scale.z);
        let inv_rotation = self.rotation.inverse();
        let inv_position = inv_scale.component_mul(&(inv_rotation * (-self.position)));

        Transform {
            position: inv_position,
            rotation: inv_rotation,
            scale: inv_scale,
        }
    }
}

/// Axis-aligned rectangle stored as min/max corners
///
/// Used for clip rects and widget-local layout rects.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    /// Minimum corner
    pub min: Vec2,
    /// Maximum corner
    pub max: Vec2,
}

impl Rect {
    /// Create a rect from its min and max coordinates
    pub fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min: Vec2::new(min_x, min_y),
            max: Vec2::new(max_x, max_y),
        }
    }

    /// Clamp both corners of this rect into `bounds` on each axis
    pub fn clamped_to(&self, bounds: &Rect) -> Rect {
        let clamp = |v: f32, lo: f32, hi: f32| v.max(lo).min(hi);
        Rect::new(
            clamp(self.min.x, bounds.min.x, bounds.max.x),
            clamp(self.min.y, bounds.min.y, bounds.max.y),
            clamp(self.max.x, bounds.min.x, bounds.max.x),
            clamp(self.max.y, bounds.min.y, bounds.max.y),
        )
    }

    /// The four corners in counter-clockwise order starting at min
    pub fn corners(&self) -> [Vec3; 4] {
        [
            Vec3::new(self.min.x, self.min.y, 0.0),
            Vec3::new(self.max.x, self.min.y, 0.0),
            Vec3::new(self.max.x, self.max.y, 0.0),
            Vec3::new(self.min.x, self.max.y, 0.0),
        ]
    }
}

/// 2D axis-aligned bounding box in canvas space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Box2 {
    /// Minimum corner
    pub min: Vec2,
    /// Maximum corner
    pub max: Vec2,
}

impl Box2 {
    /// Create a box from explicit corners
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point's XY
    pub fn from_points(points: &[Vec3]) -> Self {
        let mut min = Vec2::new(f32::MAX, f32::MAX);
        let mut max = Vec2::new(f32::MIN, f32::MIN);
        for p in points {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        Self { min, max }
    }

    /// Overlap test; boxes that only touch count as intersecting
    pub fn intersects(&self, other: &Box2) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }
}

/// 3D bounding box that starts out invalid and grows as points are added
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Box3 {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
    /// Whether any point has been accumulated
    pub valid: bool,
}

impl Default for Box3 {
    fn default() -> Self {
        Self::empty()
    }
}

impl Box3 {
    /// An invalid box ready to accumulate points
    pub fn empty() -> Self {
        Self {
            min: Vec3::new(f32::MAX, f32::MAX, f32::MAX),
            max: Vec3::new(f32::MIN, f32::MIN, f32::MIN),
            valid: false,
        }
    }

    /// Grow the box to include `point`
    pub fn add_point(&mut self, point: &Vec3) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
        self.valid = true;
    }
}
