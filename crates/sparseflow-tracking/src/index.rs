/// Issues unique feature identifiers and recycles released ones.
///
/// Identifiers start at 1. Released identifiers are reissued most recently
/// released first, before any fresh one.
#[derive(Debug, Clone)]
pub struct IndexManager {
    free: Vec<u32>,
    next: u32,
}

impl Default for IndexManager {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexManager {
    /// Initial capacity of the free list.
    pub const RESERVE: usize = 1024;

    /// Create a manager whose first identifier is 1.
    pub fn new() -> Self {
        Self {
            free: Vec::with_capacity(Self::RESERVE),
            next: 1,
        }
    }

    /// Take an identifier out of the pool.
    pub fn get_index(&mut self) -> u32 {
        if let Some(index) = self.free.pop() {
            return index;
        }
        let index = self.next;
        self.next += 1;
        index
    }

    /// Give an identifier back to the pool.
    pub fn remove_index(&mut self, index: u32) {
        self.free.push(index);
    }

    /// Forget every issued identifier and restart numbering at 1.
    pub fn reset(&mut self) {
        self.free.clear();
        self.next = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::collections::HashSet;

    #[test]
    fn indices_start_at_one() {
        let mut manager = IndexManager::new();
        assert_eq!(manager.get_index(), 1);
        assert_eq!(manager.get_index(), 2);
        assert_eq!(manager.get_index(), 3);
    }

    #[test]
    fn released_indices_are_reused_lifo() {
        let mut manager = IndexManager::new();
        let ids = (0..4).map(|_| manager.get_index()).collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 2, 3, 4]);

        manager.remove_index(2);
        manager.remove_index(4);
        assert_eq!(manager.get_index(), 4);
        assert_eq!(manager.get_index(), 2);
        assert_eq!(manager.get_index(), 5);
    }

    #[test]
    fn reset_restarts_numbering() {
        let mut manager = IndexManager::new();
        for _ in 0..10 {
            manager.get_index();
        }
        manager.remove_index(3);
        manager.reset();
        assert_eq!(manager.get_index(), 1);
        assert_eq!(manager.get_index(), 2);
    }

    #[test]
    fn live_indices_are_unique() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut manager = IndexManager::new();
        let mut live: Vec<u32> = Vec::new();

        for _ in 0..10_000 {
            if live.is_empty() || rng.random_bool(0.6) {
                let index = manager.get_index();
                assert!(index >= 1);
                live.push(index);
            } else {
                let pos = rng.random_range(0..live.len());
                manager.remove_index(live.swap_remove(pos));
            }

            let unique = live.iter().collect::<HashSet<_>>();
            assert_eq!(unique.len(), live.len());
        }
    }
}
