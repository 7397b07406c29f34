//! Loose octree mapping axis-aligned volumes to opaque payloads.
//!
//! Each node's effective bounds are its geometric cube scaled by a looseness
//! factor, so an item only needs to fit the loose cube of a node, which keeps
//! small moves from migrating items between nodes. The tree is payload
//! agnostic: sectors index structures and placement records with it,
//! structures index their chunks with it.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::math::{Aabb, Ray};

/// Items a node holds before it splits.
pub const NUM_OBJECTS_ALLOWED: usize = 8;

/// Root doublings attempted before an insert is abandoned.
pub const MAX_GROW_ATTEMPTS: u32 = 20;

/// Tuning for a [`LooseOctree`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OctreeConfig {
    /// Multiplier applied to every node's cube, clamped to [1, 2].
    pub looseness: f32,
    /// Nodes are never split below this edge length.
    pub min_node_size: f32,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            looseness: 1.25,
            min_node_size: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Entry<T> {
    item: T,
    bounds: Aabb,
}

struct Node<T> {
    center: Vec3,
    /// Edge length of the geometric (tight) cube.
    base_length: f32,
    min_size: f32,
    looseness: f32,
    /// Loose bounds.
    bounds: Aabb,
    objects: Vec<Entry<T>>,
    /// Items stored in this node and all of its descendants.
    count: usize,
    /// Either empty or exactly eight children, indexed by octant bits
    /// (bit 0 = +x, bit 1 = +y, bit 2 = +z).
    children: Vec<Node<T>>,
}

impl<T: Copy + Eq + Hash> Node<T> {
    fn new(base_length: f32, min_size: f32, looseness: f32, center: Vec3) -> Self {
        let adj_length = base_length * looseness;
        Self {
            center,
            base_length,
            min_size,
            looseness,
            bounds: Aabb::from_center_half_extent(center, Vec3::splat(adj_length * 0.5)),
            objects: Vec::new(),
            count: 0,
            children: Vec::new(),
        }
    }

    fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    fn child_center(&self, index: usize) -> Vec3 {
        let quarter = self.base_length * 0.25;
        self.center + Vec3::new(
            if index & 1 != 0 { quarter } else { -quarter },
            if index & 2 != 0 { quarter } else { -quarter },
            if index & 4 != 0 { quarter } else { -quarter },
        )
    }

    fn child_loose_bounds(&self, index: usize) -> Aabb {
        let half = self.base_length * 0.5 * self.looseness * 0.5;
        Aabb::from_center_half_extent(self.child_center(index), Vec3::splat(half))
    }

    fn best_fit_child(&self, point: Vec3) -> usize {
        (if point.x >= self.center.x { 1 } else { 0 })
            | (if point.y >= self.center.y { 2 } else { 0 })
            | (if point.z >= self.center.z { 4 } else { 0 })
    }

    fn add(&mut self, entry: Entry<T>) -> bool {
        if !self.bounds.contains_aabb(&entry.bounds) {
            return false;
        }
        self.sub_add(entry);
        true
    }

    fn sub_add(&mut self, entry: Entry<T>) {
        self.count += 1;
        if !self.has_children() {
            if self.objects.len() < NUM_OBJECTS_ALLOWED || self.base_length * 0.5 < self.min_size {
                self.objects.push(entry);
                return;
            }

            self.split();
            for existing in std::mem::take(&mut self.objects) {
                let best = self.best_fit_child(existing.bounds.center());
                if self.children[best].bounds.contains_aabb(&existing.bounds) {
                    self.children[best].sub_add(existing);
                } else {
                    self.objects.push(existing);
                }
            }
        }

        let best = self.best_fit_child(entry.bounds.center());
        if self.children[best].bounds.contains_aabb(&entry.bounds) {
            self.children[best].sub_add(entry);
        } else {
            self.objects.push(entry);
        }
    }

    fn split(&mut self) {
        let child_length = self.base_length * 0.5;
        self.children = (0..8)
            .map(|i| Node::new(child_length, self.min_size, self.looseness, self.child_center(i)))
            .collect();
    }

    fn sub_remove(&mut self, item: &T, bounds: &Aabb) -> bool {
        let mut removed = false;
        if let Some(pos) = self.objects.iter().position(|e| e.item == *item) {
            self.objects.swap_remove(pos);
            removed = true;
        }

        if !removed && self.has_children() {
            let best = self.best_fit_child(bounds.center());
            // A grown root re-parents the old root whole, so items near its
            // loose edge can sit in a neighbouring octant.
            removed = self.children[best].sub_remove(item, bounds)
                || (0..8)
                    .any(|i| {
                        i != best
                            && self.children[i].count > 0
                            && self.children[i].sub_remove(item, bounds)
                    });
        }
        if removed {
            self.count -= 1;
        }

        if removed && self.has_children() && self.should_merge() {
            self.merge();
        }
        removed
    }

    fn should_merge(&self) -> bool {
        let mut total = self.objects.len();
        for child in &self.children {
            if child.has_children() {
                return false;
            }
            total += child.objects.len();
        }
        total <= NUM_OBJECTS_ALLOWED
    }

    fn merge(&mut self) {
        for mut child in std::mem::take(&mut self.children) {
            self.objects.append(&mut child.objects);
        }
    }

    fn has_any_objects(&self) -> bool {
        self.count > 0
    }

    /// Collapse one level if every item lives in a single octant.
    fn shrink_if_possible(mut self, min_length: f32) -> Node<T> {
        if self.base_length < 2.0 * min_length {
            return self;
        }
        if self.objects.is_empty() && !self.has_children() {
            return self;
        }

        let mut best_fit: Option<usize> = None;
        for entry in &self.objects {
            let candidate = self.best_fit_child(entry.bounds.center());
            if best_fit.is_some_and(|b| b != candidate) {
                return self;
            }
            if !self.child_loose_bounds(candidate).contains_aabb(&entry.bounds) {
                return self;
            }
            best_fit = Some(candidate);
        }

        if self.has_children() {
            let mut child_had_content = false;
            for (i, child) in self.children.iter().enumerate() {
                if child.has_any_objects() {
                    if child_had_content || best_fit.is_some_and(|b| b != i) {
                        return self;
                    }
                    child_had_content = true;
                    best_fit = Some(i);
                }
            }
        }

        let Some(best) = best_fit else {
            return self;
        };

        if !self.has_children() {
            // Re-centre this node on the octant that holds everything.
            let center = self.child_center(best);
            let mut shrunk = Node::new(self.base_length * 0.5, self.min_size, self.looseness, center);
            shrunk.objects = std::mem::take(&mut self.objects);
            shrunk.count = self.count;
            return shrunk;
        }

        let mut children = std::mem::take(&mut self.children);
        let mut promoted = children.swap_remove(best);
        // Root objects (if any) all fit the promoted child's loose bounds.
        promoted.count += self.objects.len();
        promoted.objects.append(&mut self.objects);
        promoted
    }

    fn find_at_point(&self, point: Vec3) -> Option<T> {
        if !self.bounds.contains_point(point) {
            return None;
        }
        if let Some(entry) = self.objects.iter().find(|e| e.bounds.contains_point(point)) {
            return Some(entry.item);
        }
        self.children.iter().find_map(|c| c.find_at_point(point))
    }

    fn find_all_at_point(&self, point: Vec3, out: &mut Vec<T>) {
        if !self.bounds.contains_point(point) {
            return;
        }
        out.extend(self.objects.iter().filter(|e| e.bounds.contains_point(point)).map(|e| e.item));
        for child in &self.children {
            child.find_all_at_point(point, out);
        }
    }

    fn find_in_radius(&self, center: Vec3, radius: f32, out: &mut HashSet<T>) {
        if !self.bounds.intersects_sphere(center, radius) {
            return;
        }
        out.extend(
            self.objects
                .iter()
                .filter(|e| e.bounds.intersects_sphere(center, radius))
                .map(|e| e.item),
        );
        for child in &self.children {
            child.find_in_radius(center, radius, out);
        }
    }

    fn find_in_box(&self, query: &Aabb, out: &mut HashSet<T>) {
        if !self.bounds.intersects(query) {
            return;
        }
        out.extend(self.objects.iter().filter(|e| e.bounds.intersects(query)).map(|e| e.item));
        for child in &self.children {
            child.find_in_box(query, out);
        }
    }

    fn find_on_ray(&self, ray: &Ray, max_distance: f32, out: &mut Vec<(T, f32)>) {
        match ray.intersects_aabb(&self.bounds) {
            Some((t_near, _)) if t_near <= max_distance => {}
            _ => return,
        }
        for entry in &self.objects {
            if let Some((t_near, _)) = ray.intersects_aabb(&entry.bounds) {
                if t_near <= max_distance {
                    out.push((entry.item, t_near));
                }
            }
        }
        for child in &self.children {
            child.find_on_ray(ray, max_distance, out);
        }
    }

    fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }

    /// Every node's `count` matches what its subtree really holds.
    #[cfg(test)]
    fn counts_consistent(&self) -> bool {
        let below: usize = self.children.iter().map(|c| c.count).sum();
        self.count == self.objects.len() + below
            && self.children.iter().all(|c| c.counts_consistent())
    }
}

/// Loose octree over items of type `T`.
pub struct LooseOctree<T> {
    root: Node<T>,
    initial_size: f32,
    /// Tight bounds of every stored item, for removal and lookups by item.
    items: HashMap<T, Aabb>,
}

impl<T: Copy + Eq + Hash + std::fmt::Debug> LooseOctree<T> {
    /// Create an empty tree whose root cube has edge `initial_size` around `center`.
    pub fn new(initial_size: f32, center: Vec3, config: OctreeConfig) -> Self {
        let looseness = config.looseness.clamp(1.0, 2.0);
        let mut min_node_size = config.min_node_size.max(f32::EPSILON);
        if min_node_size > initial_size {
            log::warn!(
                "octree min node size {} exceeds initial size {}, clamping",
                min_node_size,
                initial_size
            );
            min_node_size = initial_size;
        }

        Self {
            root: Node::new(initial_size, min_node_size, looseness, center),
            initial_size,
            items: HashMap::new(),
        }
    }

    /// Insert (or re-insert) `item` with the given bounds.
    ///
    /// Returns `false` if the tree could not grow large enough; the item is
    /// then not stored.
    pub fn add(&mut self, item: T, bounds: Aabb) -> bool {
        if self.items.contains_key(&item) {
            self.remove(&item);
        }

        let entry = Entry { item, bounds };
        let mut attempts = 0;
        while !self.root.add(entry) {
            if attempts >= MAX_GROW_ATTEMPTS {
                log::error!(
                    "octree insert of {:?} abandoned after {} grow attempts (bounds {:?})",
                    item,
                    attempts,
                    bounds
                );
                return false;
            }
            self.grow(bounds.center() - self.root.center);
            attempts += 1;
        }

        self.items.insert(item, bounds);
        true
    }

    /// Insert an item that occupies a single point.
    pub fn add_point(&mut self, item: T, point: Vec3) -> bool {
        self.add(item, Aabb::from_point(point))
    }

    /// Remove `item`; returns `false` if it was not stored.
    pub fn remove(&mut self, item: &T) -> bool {
        let Some(bounds) = self.items.remove(item) else {
            return false;
        };

        let removed = self.root.sub_remove(item, &bounds);
        if !removed {
            log::error!("octree index listed {:?} but no node held it", item);
            return false;
        }

        self.shrink();
        true
    }

    /// Move an item to new bounds.
    pub fn relocate(&mut self, item: T, bounds: Aabb) -> bool {
        self.add(item, bounds)
    }

    /// First item whose bounds contain `point`.
    pub fn find_at_point(&self, point: Vec3) -> Option<T> {
        self.root.find_at_point(point)
    }

    /// Every item whose bounds contain `point`.
    pub fn find_all_at_point(&self, point: Vec3) -> Vec<T> {
        let mut out = Vec::new();
        self.root.find_all_at_point(point, &mut out);
        out
    }

    /// Collect items whose bounds touch the sphere into `out`.
    pub fn find_in_radius(&self, center: Vec3, radius: f32, out: &mut HashSet<T>) {
        self.root.find_in_radius(center, radius, out);
    }

    /// Collect items whose bounds overlap `query` into `out`.
    pub fn find_in_box(&self, query: &Aabb, out: &mut HashSet<T>) {
        self.root.find_in_box(query, out);
    }

    /// Items whose bounds the ray enters within `max_distance`, nearest first.
    pub fn find_on_ray(&self, ray: &Ray, max_distance: f32) -> Vec<(T, f32)> {
        let mut out = Vec::new();
        self.root.find_on_ray(ray, max_distance, &mut out);
        out.sort_by(|a, b| a.1.total_cmp(&b.1));
        out
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.contains_key(item)
    }

    pub fn bounds_of(&self, item: &T) -> Option<Aabb> {
        self.items.get(item).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&T, &Aabb)> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Loose bounds of the root node.
    pub fn root_bounds(&self) -> Aabb {
        self.root.bounds
    }

    /// Edge length of the root's geometric cube.
    pub fn root_size(&self) -> f32 {
        self.root.base_length
    }

    pub fn node_count(&self) -> usize {
        self.root.node_count()
    }

    fn grow(&mut self, direction: Vec3) {
        let x = if direction.x >= 0.0 { 1.0 } else { -1.0 };
        let y = if direction.y >= 0.0 { 1.0 } else { -1.0 };
        let z = if direction.z >= 0.0 { 1.0 } else { -1.0 };

        let placeholder = Node::new(
            self.root.base_length,
            self.root.min_size,
            self.root.looseness,
            self.root.center,
        );
        let old_root = std::mem::replace(&mut self.root, placeholder);
        let half = old_root.base_length * 0.5;
        let new_length = old_root.base_length * 2.0;
        let new_center = old_root.center + Vec3::new(x, y, z) * half;

        let mut new_root = Node::new(new_length, old_root.min_size, old_root.looseness, new_center);
        if old_root.has_any_objects() {
            let root_pos = new_root.best_fit_child(old_root.center);
            new_root.split();
            new_root.count = old_root.count;
            new_root.children[root_pos] = old_root;
        }

        log::debug!("octree grew to {} around {:?}", new_length, new_center);
        self.root = new_root;
    }

    fn shrink(&mut self) {
        let placeholder = Node::new(
            self.root.base_length,
            self.root.min_size,
            self.root.looseness,
            self.root.center,
        );
        let root = std::mem::replace(&mut self.root, placeholder);
        self.root = root.shrink_if_possible(self.initial_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> LooseOctree<u32> {
        LooseOctree::new(64.0, Vec3::ZERO, OctreeConfig::default())
    }

    fn cube(center: Vec3, half: f32) -> Aabb {
        Aabb::from_center_half_extent(center, Vec3::splat(half))
    }

    #[test]
    fn test_add_and_find_at_point() {
        let mut t = tree();
        assert!(t.add(1, cube(Vec3::new(5.0, 5.0, 5.0), 1.0)));
        assert!(t.add_point(2, Vec3::new(-10.0, 0.0, 3.0)));

        assert_eq!(t.find_at_point(Vec3::new(5.5, 4.5, 5.0)), Some(1));
        assert_eq!(t.find_at_point(Vec3::new(-10.0, 0.0, 3.0)), Some(2));
        assert_eq!(t.find_at_point(Vec3::new(20.0, 20.0, 20.0)), None);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_remove() {
        let mut t = tree();
        t.add(1, cube(Vec3::ONE, 0.5));
        assert!(t.remove(&1));
        assert!(!t.remove(&1));
        assert_eq!(t.find_at_point(Vec3::ONE), None);
        assert!(t.is_empty());
    }

    #[test]
    fn test_readd_moves_item() {
        let mut t = tree();
        t.add(7, cube(Vec3::ZERO, 1.0));
        t.relocate(7, cube(Vec3::splat(10.0), 1.0));
        assert_eq!(t.len(), 1);
        assert_eq!(t.find_at_point(Vec3::ZERO), None);
        assert_eq!(t.find_at_point(Vec3::splat(10.0)), Some(7));
    }

    #[test]
    fn test_split_keeps_items_findable() {
        let mut t = tree();
        for i in 0..64u32 {
            let p = Vec3::new((i % 4) as f32 * 8.0 - 12.0, ((i / 4) % 4) as f32 * 8.0 - 12.0, (i / 16) as f32 * 8.0 - 12.0);
            assert!(t.add(i, cube(p, 0.5)));
        }
        assert!(t.node_count() > 1, "tree should have split");
        for i in 0..64u32 {
            let p = Vec3::new((i % 4) as f32 * 8.0 - 12.0, ((i / 4) % 4) as f32 * 8.0 - 12.0, (i / 16) as f32 * 8.0 - 12.0);
            assert_eq!(t.find_at_point(p), Some(i));
        }
    }

    #[test]
    fn test_growth_keeps_existing_items() {
        let mut t = tree();
        t.add(1, cube(Vec3::new(3.0, 3.0, 3.0), 1.0));
        t.add(2, cube(Vec3::new(-20.0, 4.0, 8.0), 2.0));
        let size_before = t.root_size();

        assert!(t.add(3, cube(Vec3::new(5000.0, -3000.0, 100.0), 10.0)));
        assert!(t.root_size() > size_before);

        assert_eq!(t.find_at_point(Vec3::new(3.0, 3.0, 3.0)), Some(1));
        assert_eq!(t.find_at_point(Vec3::new(-20.0, 4.0, 8.0)), Some(2));
        assert_eq!(t.find_at_point(Vec3::new(5000.0, -3000.0, 100.0)), Some(3));
    }

    #[test]
    fn test_growth_exhaustion_is_not_fatal() {
        let mut t = tree();
        t.add(1, cube(Vec3::ZERO, 1.0));
        assert!(!t.add(2, cube(Vec3::splat(1.0e30), 1.0)));
        assert!(!t.contains(&2));
        assert_eq!(t.find_at_point(Vec3::ZERO), Some(1));
    }

    #[test]
    fn test_shrink_after_removal() {
        let mut t = tree();
        t.add(1, cube(Vec3::splat(2.0), 0.5));
        t.add(2, cube(Vec3::splat(9000.0), 0.5));
        let grown = t.root_size();
        t.remove(&2);
        assert!(t.root_size() < grown);
        assert!(t.root_size() >= 64.0);
        assert_eq!(t.find_at_point(Vec3::splat(2.0)), Some(1));
        assert_eq!(t.root.count, 1);
        assert!(t.root.counts_consistent());
    }

    #[test]
    fn test_find_in_radius_and_box() {
        let mut t = tree();
        t.add_point(1, Vec3::new(0.0, 0.0, 0.0));
        t.add_point(2, Vec3::new(5.0, 0.0, 0.0));
        t.add_point(3, Vec3::new(20.0, 0.0, 0.0));

        let mut hits = HashSet::new();
        t.find_in_radius(Vec3::ZERO, 6.0, &mut hits);
        assert_eq!(hits, HashSet::from([1, 2]));

        let mut boxed = HashSet::new();
        t.find_in_box(&Aabb::new(Vec3::new(4.0, -1.0, -1.0), Vec3::new(30.0, 1.0, 1.0)), &mut boxed);
        assert_eq!(boxed, HashSet::from([2, 3]));
    }

    #[test]
    fn test_find_on_ray_sorted() {
        let mut t = tree();
        t.add(1, cube(Vec3::new(10.0, 0.0, 0.0), 1.0));
        t.add(2, cube(Vec3::new(4.0, 0.0, 0.0), 1.0));
        t.add(3, cube(Vec3::new(4.0, 10.0, 0.0), 1.0));
        let hits = t.find_on_ray(&Ray::new(Vec3::ZERO, Vec3::X), 100.0);
        let ids: Vec<_> = hits.iter().map(|h| h.0).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn test_looseness_is_clamped() {
        let t: LooseOctree<u32> = LooseOctree::new(
            10.0,
            Vec3::ZERO,
            OctreeConfig { looseness: 5.0, min_node_size: 1.0 },
        );
        // Clamped to 2.0: loose cube spans 20 units.
        assert_eq!(t.root_bounds().size(), Vec3::splat(20.0));
    }

    #[test]
    fn test_random_sequence_round_trip() {
        let mut rng = fastrand::Rng::with_seed(99);
        let mut t = tree();
        let mut live: HashMap<u32, Aabb> = HashMap::new();

        for step in 0..600u32 {
            if rng.u32(0..3) == 0 && !live.is_empty() {
                let keys: Vec<_> = live.keys().copied().collect();
                let key = keys[rng.usize(0..keys.len())];
                assert!(t.remove(&key));
                live.remove(&key);
            } else {
                let center = Vec3::new(
                    rng.f32() * 400.0 - 200.0,
                    rng.f32() * 400.0 - 200.0,
                    rng.f32() * 400.0 - 200.0,
                );
                let bounds = cube(center, 0.25);
                assert!(t.add(step, bounds));
                live.insert(step, bounds);
            }
        }

        assert_eq!(t.len(), live.len());
        assert_eq!(t.root.count, live.len());
        assert!(t.root.counts_consistent());
        for (item, bounds) in &live {
            // Items are tiny and scattered; overlaps are vanishingly unlikely.
            assert_eq!(t.find_at_point(bounds.center()), Some(*item));
        }
    }
}
