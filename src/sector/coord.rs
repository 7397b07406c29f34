//! Sector grid coordinates.

use glam::{IVec3, Vec3};

use crate::math::Aabb;

/// Integer coordinate of a sector in the world grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SectorCoord(pub IVec3);

impl SectorCoord {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self(IVec3::new(x, y, z))
    }

    /// Sector containing a world position
    pub fn from_world(pos: Vec3, size: f32) -> Self {
        Self((pos / size).floor().as_ivec3())
    }

    /// World-space minimum corner
    pub fn origin(&self, size: f32) -> Vec3 {
        self.0.as_vec3() * size
    }

    pub fn bounds(&self, size: f32) -> Aabb {
        let origin = self.origin(size);
        Aabb::new(origin, origin + Vec3::splat(size))
    }

    pub fn offset(&self, delta: IVec3) -> Self {
        Self(self.0 + delta)
    }

    /// Neighbouring sector whose shared face lies within `margin` of `pos`,
    /// picking the closest face.
    pub fn approaching(&self, pos: Vec3, size: f32, margin: f32) -> Option<SectorCoord> {
        let local = pos - self.origin(size);
        let mut best: Option<(f32, IVec3)> = None;
        for axis in 0..3 {
            let candidates = [(local[axis], -1), (size - local[axis], 1)];
            for (distance, sign) in candidates {
                if distance <= margin && best.is_none_or(|(d, _)| distance < d) {
                    let mut step = IVec3::ZERO;
                    step[axis] = sign;
                    best = Some((distance, step));
                }
            }
        }
        best.map(|(_, step)| self.offset(step))
    }
}
