//! Slot arena with a free list, used to store cells and cell interfaces.
//!
//! Parent→child ownership in the refinement tree is expressed through handles
//! into an [`Arena`] rather than through references: removing a subtree frees
//! its slots and any stale handle simply stops resolving (`get` returns `None`).
//! Insertion and removal are O(1); freed slots are reused LIFO.

use crate::topology::point::{CellId, FaceId};
use std::marker::PhantomData;

/// A handle type that addresses arena slots.
pub trait ArenaHandle: Copy + Eq + std::fmt::Debug {
    fn from_index(index: usize) -> Self;
    fn index(self) -> usize;
}

impl ArenaHandle for CellId {
    fn from_index(index: usize) -> Self {
        CellId::from_index(index)
    }
    fn index(self) -> usize {
        CellId::index(self)
    }
}

impl ArenaHandle for FaceId {
    fn from_index(index: usize) -> Self {
        FaceId::from_index(index)
    }
    fn index(self) -> usize {
        FaceId::index(self)
    }
}

#[derive(Clone, Debug)]
enum Slot<T> {
    Occupied(T),
    Vacant { next_free: Option<usize> },
}

/// Typed slot arena.
#[derive(Clone, Debug)]
pub struct Arena<T, H: ArenaHandle> {
    slots: Vec<Slot<T>>,
    free_head: Option<usize>,
    len: usize,
    _handle: PhantomData<H>,
}

impl<T, H: ArenaHandle> Default for Arena<T, H> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            len: 0,
            _handle: PhantomData,
        }
    }
}

impl<T, H: ArenaHandle> Arena<T, H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Store `value` and return its handle.
    pub fn insert(&mut self, value: T) -> H {
        self.len += 1;
        match self.free_head {
            Some(idx) => {
                let next = match &self.slots[idx] {
                    Slot::Vacant { next_free } => *next_free,
                    Slot::Occupied(_) => unreachable!("free list points at an occupied slot"),
                };
                self.free_head = next;
                self.slots[idx] = Slot::Occupied(value);
                H::from_index(idx)
            }
            None => {
                self.slots.push(Slot::Occupied(value));
                H::from_index(self.slots.len() - 1)
            }
        }
    }

    /// Remove and return the value behind `handle`, freeing its slot.
    pub fn remove(&mut self, handle: H) -> Option<T> {
        let idx = handle.index();
        match self.slots.get(idx) {
            Some(Slot::Occupied(_)) => {}
            _ => return None,
        }
        let old = std::mem::replace(
            &mut self.slots[idx],
            Slot::Vacant {
                next_free: self.free_head,
            },
        );
        self.free_head = Some(idx);
        self.len -= 1;
        match old {
            Slot::Occupied(value) => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    pub fn contains(&self, handle: H) -> bool {
        self.get(handle).is_some()
    }

    pub fn get(&self, handle: H) -> Option<&T> {
        match self.slots.get(handle.index()) {
            Some(Slot::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        match self.slots.get_mut(handle.index()) {
            Some(Slot::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    /// Iterate over `(handle, value)` in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (H, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| match slot {
            Slot::Occupied(value) => Some((H::from_index(idx), value)),
            Slot::Vacant { .. } => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (H, &mut T)> + '_ {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(idx, slot)| match slot {
                Slot::Occupied(value) => Some((H::from_index(idx), value)),
                Slot::Vacant { .. } => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_remove_reuses_slots() {
        let mut arena: Arena<i32, CellId> = Arena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.remove(a), Some(1));
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.remove(a), None);

        let c = arena.insert(3);
        assert_eq!(c.index(), a.index());
        assert_eq!(arena.get(c), Some(&3));
        assert_eq!(arena.get(b), Some(&2));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn iter_skips_vacant_slots() {
        let mut arena: Arena<&str, FaceId> = Arena::with_capacity(4);
        let ids: Vec<_> = ["a", "b", "c"].into_iter().map(|v| arena.insert(v)).collect();
        arena.remove(ids[1]);
        let live: Vec<_> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(live, vec!["a", "c"]);
    }
}
