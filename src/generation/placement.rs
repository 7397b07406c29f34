//! Blue-noise structure placement
//!
//! Candidate positions come from Bridson's Poisson-disc sampler run over the
//! sector cube. Each accepted point is classified by the biome field and, if
//! the biome offers any archetype, turned into a [`PlacementRecord`]. All
//! randomness is seeded from the world seed and sector coordinate so a plan
//! can be regenerated bit for bit.

use std::f32::consts::TAU;

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::generation::archetype::ArchetypeTable;
use crate::generation::biome_gen::{Biome, BiomeField};
use crate::generation::config::GenerationConfig;
use crate::generation::hash::{combine, hash_vec3};
use crate::math::Aabb;

/// Largest background grid the sampler will allocate.
pub const MAX_GRID_CELLS: usize = 1 << 22;

/// Content-derived id of a placement: same seed and position, same id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlacementId(pub u64);

impl PlacementId {
    pub fn derive(seed: u64, position: Vec3) -> Self {
        Self(hash_vec3(seed, position))
    }
}

/// A structure that has been planned but not built.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacementRecord {
    pub id: PlacementId,
    pub position: Vec3,
    /// Approximate radius of the structure once built
    pub radius: f32,
    pub archetype: String,
    pub biome: Biome,
}

impl PlacementRecord {
    pub fn bounds(&self) -> Aabb {
        Aabb::around_sphere(self.position, self.radius)
    }
}

/// Poisson-disc points inside `bounds`, at least `min_separation` apart.
///
/// Stops after `max_points` points or when no active point has room left
/// after `max_attempts` candidates.
pub fn poisson_disc(
    rng: &mut fastrand::Rng,
    bounds: &Aabb,
    min_separation: f32,
    max_attempts: u32,
    max_points: usize,
) -> Vec<Vec3> {
    if max_points == 0 || !(min_separation > 0.0) {
        return Vec::new();
    }
    let cell = min_separation / 3f32.sqrt();
    let axes = (bounds.size() / cell).ceil().max(Vec3::ONE);
    let cells = grid_cells(axes).filter(|n| *n <= MAX_GRID_CELLS);
    let Some(cells) = cells else {
        log::error!(
            "separation {} is too small for a {:?} volume, no points sampled",
            min_separation,
            bounds.size()
        );
        return Vec::new();
    };
    let dims = axes.as_ivec3();
    let mut grid: Vec<Option<usize>> = vec![None; cells];
    let cell_of = |p: Vec3| -> IVec3 {
        ((p - bounds.min) / cell).floor().as_ivec3().clamp(IVec3::ZERO, dims - IVec3::ONE)
    };
    let slot = |c: IVec3| -> usize { (c.x + c.y * dims.x + c.z * dims.x * dims.y) as usize };

    let mut points: Vec<Vec3> = Vec::new();
    let mut active: Vec<usize> = Vec::new();

    let first = bounds.min + Vec3::new(rng.f32(), rng.f32(), rng.f32()) * bounds.size();
    grid[slot(cell_of(first))] = Some(0);
    points.push(first);
    active.push(0);

    let min_sq = min_separation * min_separation;
    while !active.is_empty() && points.len() < max_points {
        let pick = rng.usize(..active.len());
        let center = points[active[pick]];
        let mut placed = false;

        for _ in 0..max_attempts {
            let z = rng.f32() * 2.0 - 1.0;
            let phi = rng.f32() * TAU;
            let r = (1.0 - z * z).max(0.0).sqrt();
            let dir = Vec3::new(r * phi.cos(), r * phi.sin(), z);
            let candidate = center + dir * min_separation * (1.0 + rng.f32());
            if !bounds.contains_point(candidate) {
                continue;
            }

            let c = cell_of(candidate);
            let lo = (c - IVec3::splat(2)).max(IVec3::ZERO);
            let hi = (c + IVec3::splat(2)).min(dims - IVec3::ONE);
            let mut clear = true;
            'scan: for z in lo.z..=hi.z {
                for y in lo.y..=hi.y {
                    for x in lo.x..=hi.x {
                        if let Some(i) = grid[slot(IVec3::new(x, y, z))] {
                            if points[i].distance_squared(candidate) < min_sq {
                                clear = false;
                                break 'scan;
                            }
                        }
                    }
                }
            }
            if clear {
                let index = points.len();
                grid[slot(c)] = Some(index);
                points.push(candidate);
                active.push(index);
                placed = true;
                break;
            }
        }

        if !placed {
            active.swap_remove(pick);
        }
    }
    points
}

/// Cell count of a grid with `axes` cells per axis, `None` on overflow.
fn grid_cells(axes: Vec3) -> Option<usize> {
    if !axes.is_finite() || axes.max_element() > i32::MAX as f32 {
        return None;
    }
    let [x, y, z] = axes.to_array().map(|a| a as usize);
    x.checked_mul(y)?.checked_mul(z)
}

/// Plan every structure of a sector.
pub fn plan_placements(
    bounds: &Aabb,
    sector_seed: u64,
    config: &GenerationConfig,
    biomes: &BiomeField,
    archetypes: &ArchetypeTable,
) -> Vec<PlacementRecord> {
    let mut rng = fastrand::Rng::with_seed(sector_seed);
    let points = poisson_disc(
        &mut rng,
        bounds,
        config.min_separation,
        config.max_attempts,
        config.max_placements,
    );

    let mut records = Vec::with_capacity(points.len());
    for position in points {
        let biome = biomes.sample(position);
        let id = PlacementId::derive(config.seed, position);
        // Per-record stream so choices don't depend on iteration order.
        let mut pick = fastrand::Rng::with_seed(combine(id.0, 0xA5C4));
        let Some(archetype) = archetypes.choose(biome, &mut pick) else {
            continue;
        };
        let radius = archetype.min_radius + pick.f32() * (archetype.max_radius - archetype.min_radius);
        records.push(PlacementRecord {
            id,
            position,
            radius,
            archetype: archetype.name.clone(),
            biome,
        });
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube() -> Aabb {
        Aabb::new(Vec3::ZERO, Vec3::splat(1024.0))
    }

    #[test]
    fn test_poisson_separation_and_bounds() {
        let mut rng = fastrand::Rng::with_seed(11);
        let points = poisson_disc(&mut rng, &cube(), 150.0, 30, 500);
        assert!(points.len() > 20, "only {} points", points.len());
        for (i, a) in points.iter().enumerate() {
            assert!(cube().contains_point(*a));
            for b in &points[i + 1..] {
                assert!(a.distance(*b) >= 150.0 - 1e-3);
            }
        }
    }

    #[test]
    fn test_poisson_respects_cap() {
        let mut rng = fastrand::Rng::with_seed(11);
        assert_eq!(poisson_disc(&mut rng, &cube(), 50.0, 30, 12).len(), 12);
        assert!(poisson_disc(&mut rng, &cube(), 50.0, 30, 0).is_empty());
    }

    #[test]
    fn test_tiny_separation_samples_nothing() {
        let mut rng = fastrand::Rng::with_seed(11);
        assert!(poisson_disc(&mut rng, &cube(), 1.0, 30, 500).is_empty());
        assert!(poisson_disc(&mut rng, &cube(), 1e-30, 30, 500).is_empty());
        assert_eq!(grid_cells(Vec3::splat(1e12)), None);
        assert_eq!(grid_cells(Vec3::new(2.0, 3.0, 4.0)), Some(24));
    }

    #[test]
    fn test_plan_is_deterministic() {
        let config = GenerationConfig {
            biome_frequency: 0.01,
            ..Default::default()
        };
        let field = BiomeField::generate(cube(), &config);
        let table = ArchetypeTable::default();
        let a = plan_placements(&cube(), 77, &config, &field, &table);
        let b = plan_placements(&cube(), 77, &config, &field, &table);
        assert_eq!(a, b);
        assert!(!a.is_empty());
        for record in &a {
            assert_ne!(record.biome, Biome::Void);
            assert_eq!(record.biome, field.sample(record.position));
            assert_eq!(record.id, PlacementId::derive(config.seed, record.position));
            let archetype = table.get(&record.archetype).unwrap();
            assert!(archetype.biomes.contains(&record.biome));
            assert!(record.radius >= archetype.min_radius && record.radius <= archetype.max_radius);
        }

        let other = plan_placements(&cube(), 78, &config, &field, &table);
        assert_ne!(a, other);
    }
}
