//! Generation-checked storage for instances.
//!
//! Handles stay cheap to copy and safe to hold across tasks: once a slot is
//! vacated its generation moves on, so a stale handle simply stops resolving.

use std::fmt;

/// Non-owning reference to an instance.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceHandle {
    index: usize,
    generation: u64,
}

impl InstanceHandle {
    pub(crate) fn new(index: usize, generation: u64) -> Self {
        Self { index, generation }
    }
}

impl fmt::Debug for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceHandle({}v{})", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u64,
    value: Option<T>,
}

pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
}

impl<T> Arena<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, value: T) -> InstanceHandle {
        if let Some(index) = self.free.pop()
            && let Some(slot) = self.slots.get_mut(index)
        {
            slot.value = Some(value);
            return InstanceHandle::new(index, slot.generation);
        }
        let index = self.slots.len();
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        InstanceHandle::new(index, 0)
    }

    pub(crate) fn get(&self, handle: InstanceHandle) -> Option<&T> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub(crate) fn get_mut(&mut self, handle: InstanceHandle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub(crate) fn contains(&self, handle: InstanceHandle) -> bool {
        self.get(handle).is_some()
    }

    pub(crate) fn remove(&mut self, handle: InstanceHandle) -> Option<T> {
        let slot = self
            .slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Some(value)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (InstanceHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (InstanceHandle::new(index, slot.generation), value))
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.iter().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_handle_stops_resolving() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        assert_eq!(arena.remove(a), Some("a"));
        let b = arena.insert("b");

        // Same slot, new generation.
        assert_ne!(a, b);
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(b), Some(&"b"));
        assert!(arena.remove(a).is_none());
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_iter_skips_vacant_slots() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        let _b = arena.insert(2);
        let _c = arena.insert(3);
        arena.remove(a);
        let values: Vec<_> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![2, 3]);
        assert!(!arena.contains(a));
    }
}
