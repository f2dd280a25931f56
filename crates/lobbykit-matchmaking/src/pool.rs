//! Fixed-capacity arena with a freelist and generation-tagged keys.
//!
//! Sessions, remote connections and tasks all live in a [`SlotPool`]. A key
//! stays valid only while its slot is live and the slot's generation still
//! matches, so a freed slot can be reused immediately without stale keys
//! resolving to the new occupant.

use std::fmt;

/// Index plus generation identifying one occupancy of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    index: u32,
    generation: u32,
}

impl SlotKey {
    pub const fn index(self) -> usize {
        self.index as usize
    }

    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Bounded arena of `T` addressed by [`SlotKey`].
#[derive(Debug)]
pub struct SlotPool<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> SlotPool<T> {
    /// Create a pool with room for `capacity` live values.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = u32::try_from(capacity).unwrap_or(u32::MAX);
        let slots = (0..capacity)
            .map(|_| Slot {
                generation: 0,
                value: None,
            })
            .collect();
        // Reverse so the lowest index is handed out first.
        let free = (0..capacity).rev().collect();
        Self {
            slots,
            free,
            live: 0,
        }
    }

    /// Place `value` in a free slot.
    ///
    /// Returns the value back when every slot is occupied; the pool is left
    /// untouched in that case.
    pub fn insert(&mut self, value: T) -> Result<SlotKey, T> {
        let Some(index) = self.free.pop() else {
            return Err(value);
        };
        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.value.is_none(), "freelist held a live slot");
        slot.value = Some(value);
        self.live += 1;
        Ok(SlotKey {
            index,
            generation: slot.generation,
        })
    }

    /// Free the slot behind `key`, returning its value.
    ///
    /// Stale or already-freed keys return `None` and change nothing.
    pub fn remove(&mut self, key: SlotKey) -> Option<T> {
        let slot = self.slots.get_mut(key.index())?;
        if slot.generation != key.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.live -= 1;
        Some(value)
    }

    pub fn get(&self, key: SlotKey) -> Option<&T> {
        self.slots
            .get(key.index())
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, key: SlotKey) -> Option<&mut T> {
        self.slots
            .get_mut(key.index())
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn contains(&self, key: SlotKey) -> bool {
        self.get(key).is_some()
    }

    /// Number of live values.
    pub const fn len(&self) -> usize {
        self.live
    }

    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Keys of every live value, in slot order.
    ///
    /// Collected up front so callers can mutate the pool while walking it.
    pub fn keys(&self) -> Vec<SlotKey> {
        self.iter().map(|(key, _)| key).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotKey, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let value = slot.value.as_ref()?;
            let index = u32::try_from(index).ok()?;
            Some((
                SlotKey {
                    index,
                    generation: slot.generation,
                },
                value,
            ))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SlotKey, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            let value = slot.value.as_mut()?;
            let index = u32::try_from(index).ok()?;
            Some((SlotKey { index, generation }, value))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn insert_fails_without_side_effects_when_full() {
        let mut pool = SlotPool::with_capacity(2);
        pool.insert("a").unwrap();
        pool.insert("b").unwrap();

        assert_eq!(pool.insert("c"), Err("c"));
        assert_eq!(pool.len(), 2);
        assert!(pool.is_full());
    }

    #[test]
    fn stale_key_does_not_resolve_after_reuse() {
        let mut pool = SlotPool::with_capacity(1);
        let first = pool.insert(1).unwrap();
        assert_eq!(pool.remove(first), Some(1));

        let second = pool.insert(2).unwrap();
        assert_eq!(first.index(), second.index());
        assert_ne!(first, second);
        assert!(pool.get(first).is_none());
        assert_eq!(pool.get(second), Some(&2));
    }

    #[test]
    fn double_remove_is_noop() {
        let mut pool = SlotPool::with_capacity(3);
        let a = pool.insert('a').unwrap();
        let b = pool.insert('b').unwrap();

        assert_eq!(pool.remove(a), Some('a'));
        assert_eq!(pool.remove(a), None);
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(b));
    }

    #[test]
    fn lowest_free_index_first() {
        let mut pool = SlotPool::with_capacity(3);
        let keys: Vec<_> = (0..3).map(|v| pool.insert(v).unwrap()).collect();
        assert_eq!(
            keys.iter().map(|k| k.index()).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(pool.keys(), keys);
    }
}
