//! Ray type and operations

use crate::core::types::{IVec3, Vec3};
use super::aabb::Aabb;

/// A ray defined by origin and direction
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    /// Precomputed 1/direction for fast AABB intersection
    pub inv_direction: Vec3,
}

impl Ray {
    /// Create a new ray (direction should be normalized)
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction,
            inv_direction: Vec3::new(
                1.0 / direction.x,
                1.0 / direction.y,
                1.0 / direction.z,
            ),
        }
    }

    /// Ray from `origin` towards `target`
    pub fn towards(origin: Vec3, target: Vec3) -> Self {
        Self::new(origin, (target - origin).normalize_or_zero())
    }

    /// Get point along ray at parameter t
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Same direction, origin shifted by `offset`
    pub fn offset(&self, offset: Vec3) -> Ray {
        Ray {
            origin: self.origin + offset,
            ..*self
        }
    }

    /// Ray-AABB intersection using slab method
    /// Returns Some((t_near, t_far)) if intersection, None otherwise
    pub fn intersects_aabb(&self, aabb: &Aabb) -> Option<(f32, f32)> {
        let t1 = (aabb.min - self.origin) * self.inv_direction;
        let t2 = (aabb.max - self.origin) * self.inv_direction;

        let t_min = t1.min(t2);
        let t_max = t1.max(t2);

        let t_near = t_min.x.max(t_min.y).max(t_min.z);
        let t_far = t_max.x.min(t_max.y).min(t_max.z);

        if t_near <= t_far && t_far >= 0.0 {
            Some((t_near.max(0.0), t_far))
        } else {
            None
        }
    }

    /// Walk the unit voxel grid along the ray (Amanatides & Woo).
    ///
    /// Yields every voxel the ray passes through, in order, starting at the
    /// voxel containing the origin, until `max_t` is exceeded.
    pub fn voxel_walk(&self, max_t: f32) -> VoxelWalk {
        let voxel = self.origin.floor().as_ivec3();
        let step = IVec3::new(
            self.direction.x.signum() as i32,
            self.direction.y.signum() as i32,
            self.direction.z.signum() as i32,
        );

        let axis_t_max = |origin: f32, dir: f32, cell: i32| -> f32 {
            if dir > 0.0 {
                ((cell + 1) as f32 - origin) / dir
            } else if dir < 0.0 {
                (cell as f32 - origin) / dir
            } else {
                f32::INFINITY
            }
        };
        let t_max = Vec3::new(
            axis_t_max(self.origin.x, self.direction.x, voxel.x),
            axis_t_max(self.origin.y, self.direction.y, voxel.y),
            axis_t_max(self.origin.z, self.direction.z, voxel.z),
        );
        let t_delta = self.inv_direction.abs();

        VoxelWalk {
            voxel,
            step: IVec3::new(
                if self.direction.x == 0.0 { 0 } else { step.x },
                if self.direction.y == 0.0 { 0 } else { step.y },
                if self.direction.z == 0.0 { 0 } else { step.z },
            ),
            t_max,
            t_delta,
            t: 0.0,
            normal: IVec3::ZERO,
            limit: max_t,
            started: false,
        }
    }
}

/// One voxel visited by [`Ray::voxel_walk`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoxelStep {
    pub voxel: IVec3,
    /// Ray parameter at which the voxel is entered
    pub t: f32,
    /// Normal of the face crossed to enter the voxel (zero for the first one)
    pub normal: IVec3,
}

pub struct VoxelWalk {
    voxel: IVec3,
    step: IVec3,
    t_max: Vec3,
    t_delta: Vec3,
    t: f32,
    normal: IVec3,
    limit: f32,
    started: bool,
}

impl Iterator for VoxelWalk {
    type Item = VoxelStep;

    fn next(&mut self) -> Option<VoxelStep> {
        if !self.started {
            self.started = true;
            return Some(VoxelStep { voxel: self.voxel, t: 0.0, normal: IVec3::ZERO });
        }
        if self.step == IVec3::ZERO {
            return None;
        }

        if self.t_max.x < self.t_max.y && self.t_max.x < self.t_max.z {
            self.voxel.x += self.step.x;
            self.t = self.t_max.x;
            self.t_max.x += self.t_delta.x;
            self.normal = IVec3::new(-self.step.x, 0, 0);
        } else if self.t_max.y < self.t_max.z {
            self.voxel.y += self.step.y;
            self.t = self.t_max.y;
            self.t_max.y += self.t_delta.y;
            self.normal = IVec3::new(0, -self.step.y, 0);
        } else {
            self.voxel.z += self.step.z;
            self.t = self.t_max.z;
            self.t_max.z += self.t_delta.z;
            self.normal = IVec3::new(0, 0, -self.step.z);
        }

        if self.t > self.limit {
            return None;
        }
        Some(VoxelStep { voxel: self.voxel, t: self.t, normal: self.normal })
    }
}
