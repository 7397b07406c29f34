//! Deterministic integer hashing for seeds and content-derived ids.

use glam::{IVec3, Vec3};

/// SplitMix64 finalizer.
#[inline]
pub fn mix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

#[inline]
pub fn combine(seed: u64, value: u64) -> u64 {
    mix64(seed ^ mix64(value))
}

pub fn hash_ivec3(seed: u64, v: IVec3) -> u64 {
    let h = combine(seed, v.x as u32 as u64);
    let h = combine(h, v.y as u32 as u64);
    combine(h, v.z as u32 as u64)
}

/// Hash of the exact bit pattern of a position.
pub fn hash_vec3(seed: u64, v: Vec3) -> u64 {
    let h = combine(seed, v.x.to_bits() as u64);
    let h = combine(h, v.y.to_bits() as u64);
    combine(h, v.z.to_bits() as u64)
}

/// Fold a 64-bit seed into the 32-bit seed the noise crate takes.
pub fn seed_u32(seed: u64) -> u32 {
    let h = mix64(seed);
    (h ^ (h >> 32)) as u32
}

/// Map a hash to [0, 1).
pub fn unit_f32(hash: u64) -> f32 {
    (hash >> 40) as f32 / (1u64 << 24) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_and_spread() {
        assert_eq!(hash_ivec3(1, IVec3::new(1, 2, 3)), hash_ivec3(1, IVec3::new(1, 2, 3)));
        assert_ne!(hash_ivec3(1, IVec3::new(1, 2, 3)), hash_ivec3(2, IVec3::new(1, 2, 3)));
        assert_ne!(hash_ivec3(1, IVec3::new(1, 2, 3)), hash_ivec3(1, IVec3::new(3, 2, 1)));
        assert_ne!(hash_vec3(0, Vec3::X), hash_vec3(0, Vec3::Y));
    }

    #[test]
    fn test_unit_range() {
        for i in 0..1000u64 {
            let u = unit_f32(mix64(i));
            assert!((0.0..1.0).contains(&u));
        }
    }
}
