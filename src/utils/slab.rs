//! Free-list backed storage with generation-checked keys.
//!
//! Slots are recycled through a free list, so a key handed out for an entry
//! that has since been removed must not alias whatever reuses the slot. Every
//! key therefore carries the generation of the slot at insertion time and
//! lookups with a stale generation miss.

/// Handle to an entry of a [`Slab`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Key {
    index: usize,
    generation: u32,
}

enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

pub(crate) struct Slab<T> {
    items: Vec<Slot<T>>,
    free: Vec<usize>,
    len: usize,
}

impl<T> Slab<T> {
    pub(crate) fn new() -> Self {
        Self {
            items: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn insert(&mut self, value: T) -> Key {
        let index = match self.free.pop() {
            Some(i) => i,
            None => {
                self.items.push(Slot::Vacant { generation: 0 });
                self.items.len() - 1
            }
        };

        let generation = match self.items[index] {
            Slot::Vacant { generation } => generation,
            Slot::Occupied { .. } => unreachable!("free list pointed at an occupied slot"),
        };

        self.items[index] = Slot::Occupied { generation, value };
        self.len += 1;

        Key { index, generation }
    }

    pub(crate) fn get(&self, key: Key) -> Option<&T> {
        match self.items.get(key.index)? {
            Slot::Occupied { generation, value } if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        match self.items.get_mut(key.index)? {
            Slot::Occupied { generation, value } if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    pub(crate) fn contains(&self, key: Key) -> bool {
        self.get(key).is_some()
    }

    pub(crate) fn remove(&mut self, key: Key) -> Option<T> {
        if !self.contains(key) {
            return None;
        }

        let vacant = Slot::Vacant {
            generation: key.generation.wrapping_add(1),
        };

        match std::mem::replace(&mut self.items[key.index], vacant) {
            Slot::Occupied { value, .. } => {
                self.free.push(key.index);
                self.len -= 1;
                Some(value)
            }
            Slot::Vacant { .. } => None,
        }
    }
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let mut slab = Slab::new();
        let a = slab.insert("a");
        let b = slab.insert("b");

        assert_eq!(slab.len(), 2);
        assert_eq!(slab.get(a), Some(&"a"));
        assert_eq!(slab.remove(b), Some("b"));
        assert_eq!(slab.get(b), None);
        assert_eq!(slab.len(), 1);
    }

    #[test]
    fn stale_key_misses_reused_slot() {
        let mut slab = Slab::new();
        let first = slab.insert(1);
        slab.remove(first);

        let second = slab.insert(2);
        assert_eq!(first.index, second.index);
        assert_ne!(first, second);
        assert_eq!(slab.get(first), None);
        assert_eq!(slab.remove(first), None);
        assert_eq!(slab.get(second), Some(&2));
    }

    #[test]
    fn keys_stay_valid_while_growing() {
        let mut slab = Slab::new();
        let keys: Vec<_> = (0..5).map(|i| slab.insert(i)).collect();

        for (i, key) in keys.into_iter().enumerate() {
            assert_eq!(slab.get_mut(key).copied(), Some(i));
        }
    }
}
