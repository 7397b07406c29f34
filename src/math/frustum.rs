//! Camera frustum used to cull chunk draws

use crate::core::types::{Mat4, Vec3, Vec4};
use super::aabb::Aabb;

/// Half-space `normal · p + offset >= 0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub offset: f32,
}

impl Plane {
    pub fn new(normal: Vec3, offset: f32) -> Self {
        Self { normal, offset }
    }

    /// Positive on the inside.
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.offset
    }

    fn from_row(row: Vec4) -> Self {
        let normal = row.truncate();
        let len = normal.length().max(f32::EPSILON);
        Self::new(normal / len, row.w / len)
    }

    /// Box corner farthest along the normal.
    fn support(&self, aabb: &Aabb) -> Vec3 {
        Vec3::select(self.normal.cmpge(Vec3::ZERO), aabb.max, aabb.min)
    }
}

/// Six inward-facing planes: left, right, bottom, top, near, far.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Planes of a combined view-projection matrix (depth range 0..1).
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let [x, y, z, w] = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];
        Self {
            planes: [
                Plane::from_row(w + x),
                Plane::from_row(w - x),
                Plane::from_row(w + y),
                Plane::from_row(w - y),
                Plane::from_row(z),
                Plane::from_row(w - z),
            ],
        }
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|p| p.signed_distance(point) >= 0.0)
    }

    /// Conservative: may accept spheres just outside a corner.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes.iter().all(|p| p.signed_distance(center) >= -radius)
    }

    /// Conservative box test against each plane's support corner.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.planes
            .iter()
            .all(|p| p.signed_distance(p.support(aabb)) >= 0.0)
    }
}
