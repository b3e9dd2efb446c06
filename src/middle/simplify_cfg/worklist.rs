//! Block worklist with O(1) duplicate suppression and removal

use std::collections::HashMap;

use crate::middle::ir::BlockId;

/// Blocks waiting to be simplified. Removing a block nulls its slot instead
/// of shifting the list.
#[derive(Debug, Default)]
pub struct BlockWorklist {
    list: Vec<Option<BlockId>>,
    index: HashMap<BlockId, usize>,
}

impl BlockWorklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, block: BlockId) {
        if self.index.contains_key(&block) {
            return;
        }
        self.index.insert(block, self.list.len());
        self.list.push(Some(block));
    }

    pub fn remove(&mut self, block: BlockId) {
        if let Some(slot) = self.index.remove(&block) {
            self.list[slot] = None;
        }
    }

    pub fn pop(&mut self) -> Option<BlockId> {
        while let Some(slot) = self.list.pop() {
            if let Some(block) = slot {
                self.index.remove(&block);
                return Some(block);
            }
        }
        None
    }

    pub fn contains(&self, block: BlockId) -> bool {
        self.index.contains_key(&block)
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_and_removal() {
        let mut list = BlockWorklist::new();
        list.add(BlockId(0));
        list.add(BlockId(1));
        list.add(BlockId(0));
        list.add(BlockId(2));
        list.remove(BlockId(1));
        assert!(!list.contains(BlockId(1)));
        assert_eq!(list.pop(), Some(BlockId(2)));
        assert_eq!(list.pop(), Some(BlockId(0)));
        assert_eq!(list.pop(), None);
        assert!(list.is_empty());

        // a removed block can be added again
        list.add(BlockId(1));
        assert_eq!(list.pop(), Some(BlockId(1)));
    }
}
