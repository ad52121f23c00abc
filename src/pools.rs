//! Reusable scratch buffers for the analysis hot loops.
//!
//! Mirrors the pooled-`Vec` recycling the parse pipeline does over channels:
//! a buffer is checked out, used, and returned cleared but with its storage
//! intact, so repeated per-target traversals do not reallocate.

use std::sync::Mutex;

/// Pool of `Vec<T>` scratch buffers.
pub struct VecPool<T> {
    free: Mutex<Vec<Vec<T>>>,
}

impl<T> VecPool<T> {
    pub fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
        }
    }

    pub fn acquire(&self) -> Vec<T> {
        self.free
            .lock()
            .expect("pool lock poisoned")
            .pop()
            .unwrap_or_default()
    }

    /// Returns a buffer to the pool, clearing values but keeping storage.
    pub fn release(&self, mut buffer: Vec<T>) {
        buffer.clear();
        self.free.lock().expect("pool lock poisoned").push(buffer);
    }

    #[cfg(test)]
    fn pooled(&self) -> usize {
        self.free.lock().expect("pool lock poisoned").len()
    }
}

impl<T> Default for VecPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Growable stack of `u32` work items with pooled storage semantics.
#[derive(Debug, Default)]
pub struct IndexStack {
    items: Vec<u32>,
}

impl IndexStack {
    pub fn push(&mut self, idx: u32) {
        self.items.push(idx);
    }

    pub fn pop(&mut self) -> Option<u32> {
        self.items.pop()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.items
    }
}

/// Exact-capacity per-parent children slices, built in two passes.
///
/// The dominator engine counts children per parent first, then fills each
/// parent's slice; the result is a CSR layout with no per-node `Vec`s.
#[derive(Debug)]
pub struct ChildrenBuilder {
    offsets: Vec<u32>,
    cursors: Vec<u32>,
    children: Vec<u32>,
}

impl ChildrenBuilder {
    /// `counts[p]` = number of children of parent `p`.
    pub fn with_counts(counts: &[u32]) -> Self {
        let mut offsets = Vec::with_capacity(counts.len() + 1);
        let mut total = 0u32;
        offsets.push(0);
        for &c in counts {
            total += c;
            offsets.push(total);
        }
        let cursors = offsets[..counts.len()].to_vec();
        Self {
            children: vec![0; total as usize],
            offsets,
            cursors,
        }
    }

    pub fn push_child(&mut self, parent: usize, child: u32) {
        let at = self.cursors[parent];
        self.children[at as usize] = child;
        self.cursors[parent] = at + 1;
    }

    pub fn children_of(&self, parent: usize) -> &[u32] {
        let start = self.offsets[parent] as usize;
        let end = self.offsets[parent + 1] as usize;
        &self.children[start..end]
    }
}
