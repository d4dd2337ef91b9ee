//! Direct-mapped lookup table
//! One slot per `key % capacity`; collisions silently overwrite

use crate::error::{Error, Result};

#[derive(Clone, Copy)]
struct CacheLine<V> {
    key: u64,
    value: V,
}

/// Best-effort O(1) key -> value table
///
/// A hit is only reported when the slot holds exactly the queried key, so a
/// lookup can miss for a key that is present elsewhere but never returns a
/// value for a key that was overwritten or removed.
pub struct DirectCache<V> {
    lines: Vec<Option<CacheLine<V>>>,
}

impl<V: Copy> DirectCache<V> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity(
                "direct cache needs at least one slot".to_string(),
            ));
        }
        Ok(Self {
            lines: vec![None; capacity],
        })
    }

    #[inline]
    fn slot(&self, key: u64) -> usize {
        (key % self.lines.len() as u64) as usize
    }

    pub fn get(&self, key: u64) -> Option<V> {
        match self.lines[self.slot(key)] {
            Some(line) if line.key == key => Some(line.value),
            _ => None,
        }
    }

    pub fn set(&mut self, key: u64, value: V) {
        let slot = self.slot(key);
        self.lines[slot] = Some(CacheLine { key, value });
    }

    /// Clear the slot only if it currently holds `key`
    pub fn remove(&mut self, key: u64) {
        let slot = self.slot(key);
        if matches!(self.lines[slot], Some(line) if line.key == key) {
            self.lines[slot] = None;
        }
    }

    pub fn capacity(&self) -> usize {
        self.lines.len()
    }

    pub fn clear(&mut self) {
        self.lines.iter_mut().for_each(|line| *line = None);
    }
}
