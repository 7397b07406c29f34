//! Generational arena used for owned collections with non-owning back-references.
//!
//! Chunks inside a structure and structures inside a sector are stored in an
//! [`Arena`]. Everything else refers to them through a [`Handle`], which carries
//! the slot generation so a handle to a freed (and possibly recycled) slot
//! simply resolves to `None`.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Typed, copyable reference into an [`Arena<T>`].
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Build a handle from raw parts (used when restoring from a snapshot).
    pub fn from_raw(index: u32, generation: u32) -> Self {
        Self { index, generation, _marker: PhantomData }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.index, self.generation).cmp(&(other.index, other.generation))
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with free-list reuse.
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Insert a value built from its own handle.
    ///
    /// Lets the value remember its id without a second lookup.
    pub fn insert_with(&mut self, build: impl FnOnce(Handle<T>) -> T) -> Handle<T> {
        self.insert_with_slot(|handle| Some(build(handle)))
    }

    /// Like [`Arena::insert_with`] for fallible builders. On error the slot
    /// is released and nothing is inserted.
    pub fn try_insert_with<E>(
        &mut self,
        build: impl FnOnce(Handle<T>) -> Result<T, E>,
    ) -> Result<Handle<T>, E> {
        let mut failure = None;
        let handle = self.insert_with_slot(|handle| match build(handle) {
            Ok(value) => Some(value),
            Err(e) => {
                failure = Some(e);
                None
            }
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(handle),
        }
    }

    fn insert_with_slot(&mut self, build: impl FnOnce(Handle<T>) -> Option<T>) -> Handle<T> {
        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation = slot.generation.wrapping_add(1);
                Handle::from_raw(index, slot.generation)
            }
            None => {
                self.slots.push(Slot { generation: 0, value: None });
                Handle::from_raw((self.slots.len() - 1) as u32, 0)
            }
        };
        match build(handle) {
            Some(value) => {
                self.slots[handle.index as usize].value = Some(value);
                self.len += 1;
            }
            None => self.free.push(handle.index),
        }
        handle
    }

    pub fn insert(&mut self, value: T) -> Handle<T> {
        self.insert_with(|_| value)
    }

    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        self.free.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value
                .as_ref()
                .map(|v| (Handle::from_raw(i as u32, slot.generation), v))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(|v| (Handle::from_raw(i as u32, generation), v))
        })
    }

    pub fn handles(&self) -> Vec<Handle<T>> {
        self.iter().map(|(h, _)| h).collect()
    }

    /// Borrow two distinct entries mutably at once.
    pub fn get2_mut(&mut self, a: Handle<T>, b: Handle<T>) -> Option<(&mut T, &mut T)> {
        if a.index == b.index {
            return None;
        }
        let (lo, hi, swapped) = if a.index < b.index { (a, b, false) } else { (b, a, true) };
        let (head, tail) = self.slots.split_at_mut(hi.index as usize);
        let lo_slot = &mut head[lo.index as usize];
        let hi_slot = &mut tail[0];
        if lo_slot.generation != lo.generation || hi_slot.generation != hi.generation {
            return None;
        }
        let lo_ref = lo_slot.value.as_mut()?;
        let hi_ref = hi_slot.value.as_mut()?;
        if swapped { Some((hi_ref, lo_ref)) } else { Some((lo_ref, hi_ref)) }
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut arena: Arena<&str> = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.remove(a), Some("a"));
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_recycled_slot_rejects_stale_handle() {
        let mut arena: Arena<u32> = Arena::new();
        let old = arena.insert(1);
        arena.remove(old);
        let new = arena.insert(2);
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert!(arena.get(old).is_none());
        assert_eq!(arena.get(new), Some(&2));
    }

    #[test]
    fn test_insert_with_sees_own_handle() {
        let mut arena: Arena<Handle<u8>> = Arena::new();
        // The stored type differs from the handle type here; only the index matters.
        let h = arena.insert_with(|h| Handle::from_raw(h.index(), h.generation()));
        let stored = arena.get(h).copied().unwrap();
        assert_eq!(stored.index(), h.index());
    }

    #[test]
    fn test_get2_mut() {
        let mut arena: Arena<u32> = Arena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        {
            let (x, y) = arena.get2_mut(b, a).unwrap();
            *x += 10;
            *y += 20;
        }
        assert_eq!(arena.get(a), Some(&21));
        assert_eq!(arena.get(b), Some(&12));
        assert!(arena.get2_mut(a, a).is_none());
    }
}
