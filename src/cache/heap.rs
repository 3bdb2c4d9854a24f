//! Expiry Heap
//!
//! Min-heap of [`HeapItem`]s keyed on expiry, with a running item count and
//! byte total maintained incrementally on insert and pop.
//!
//! `size()` counts inserts minus pops since the last clear. It is not the
//! number of live keys in the local tier: overwritten and deleted keys keep
//! their heap entries until those reach the top and are popped.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::entry::HeapItem;

/// Size- and count-tracked min-heap ordered by expiry
#[derive(Debug, Default)]
pub struct ExpiryHeap {
    items: BinaryHeap<Reverse<HeapItem>>,
    count: usize,
    total_bytes: u64,
}

impl ExpiryHeap {
    /// Create an empty heap
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an item
    pub fn insert(&mut self, item: HeapItem) {
        self.count += 1;
        self.total_bytes += item.byte_size;
        self.items.push(Reverse(item));
    }

    /// Remove and return the soonest-to-expire item
    pub fn pop(&mut self) -> Option<HeapItem> {
        let Reverse(item) = self.items.pop()?;
        self.count -= 1;
        self.total_bytes = self.total_bytes.saturating_sub(item.byte_size);
        Some(item)
    }

    /// Soonest-to-expire item without removing it
    pub fn peek(&self) -> Option<&HeapItem> {
        self.items.peek().map(|Reverse(item)| item)
    }

    /// Inserts minus pops since the last clear
    pub fn size(&self) -> usize {
        self.count
    }

    /// Check if the heap is empty
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Accumulated serialized size of the items currently held
    pub fn total_byte_size(&self) -> u64 {
        self.total_bytes
    }

    /// Drop every item and reset both accumulators
    pub fn clear(&mut self) {
        self.items.clear();
        self.count = 0;
        self.total_bytes = 0;
    }

    /// Replace the contents with `items`
    pub fn rebuild(&mut self, items: impl IntoIterator<Item = HeapItem>) {
        self.clear();
        for item in items {
            self.insert(item);
        }
    }

    /// Items in arbitrary order
    pub fn snapshot(&self) -> Vec<HeapItem> {
        self.items.iter().map(|Reverse(item)| item.clone()).collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
