//! Ordered, duplicate-free list of core ids.
//!
//! Every membership a core can have (idle pool, a process's allocated set,
//! its two provisioning sets) is one of these, so cores and processes only
//! ever refer to each other by id.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::types::CoreId;

/// Insertion-ordered list of cores
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreList {
    cores: VecDeque<CoreId>,
}

impl CoreList {
    /// Create an empty list
    pub const fn new() -> Self {
        Self {
            cores: VecDeque::new(),
        }
    }

    /// Append at the tail
    pub fn push_back(&mut self, core: CoreId) {
        debug_assert!(!self.contains(core), "core {} already listed", core);
        self.cores.push_back(core);
    }

    /// Insert at the head
    pub fn push_front(&mut self, core: CoreId) {
        debug_assert!(!self.contains(core), "core {} already listed", core);
        self.cores.push_front(core);
    }

    /// Pop the head
    pub fn pop_front(&mut self) -> Option<CoreId> {
        self.cores.pop_front()
    }

    /// Remove a core wherever it sits
    pub fn remove(&mut self, core: CoreId) -> bool {
        if let Some(pos) = self.cores.iter().position(|&c| c == core) {
            self.cores.remove(pos);
            true
        } else {
            false
        }
    }

    /// Head of the list
    pub fn front(&self) -> Option<CoreId> {
        self.cores.front().copied()
    }

    pub fn contains(&self, core: CoreId) -> bool {
        self.cores.contains(&core)
    }

    pub fn len(&self) -> usize {
        self.cores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = CoreId> + '_ {
        self.cores.iter().copied()
    }

    /// Copy out the cores in list order
    pub fn to_vec(&self) -> Vec<CoreId> {
        self.iter().collect()
    }

    /// Empty the list, returning what it held
    pub fn take(&mut self) -> CoreList {
        core::mem::take(self)
    }
}

impl FromIterator<CoreId> for CoreList {
    fn from_iter<I: IntoIterator<Item = CoreId>>(iter: I) -> Self {
        Self {
            cores: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_order() {
        let mut list = CoreList::new();
        list.push_back(3);
        list.push_back(5);
        list.push_front(1);
        assert_eq!(list.to_vec(), alloc::vec![1, 3, 5]);

        assert!(list.remove(3));
        assert!(!list.remove(3));
        assert_eq!(list.front(), Some(1));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_list_take() {
        let mut list: CoreList = [2, 4].into_iter().collect();
        let taken = list.take();
        assert!(list.is_empty());
        assert_eq!(taken.to_vec(), alloc::vec![2, 4]);
    }
}
