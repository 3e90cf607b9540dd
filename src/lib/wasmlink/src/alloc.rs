//! A bump allocator over the active linear memory, backing `malloc` and friends.
//!
//! Memory is never reused. `free` only forgets the recorded size of an allocation, which
//! `realloc` needs to know how much to copy.

use std::collections::HashMap;

use tracing::trace;

const ALIGN: u32 = 8;

pub struct BumpAllocator {
    base: u32,
    next: u32,
    sizes: HashMap<u32, u32>,
}

impl BumpAllocator {
    /// Create an allocator that hands out addresses starting at `base`. Everything below is
    /// left untouched for the module's own static data.
    pub fn new(base: u32) -> Self {
        Self {
            base,
            next: base,
            sizes: HashMap::new(),
        }
    }

    /// Allocate `size` bytes in a memory of `limit` bytes. Zero-sized requests and requests
    /// that do not fit return None.
    pub fn alloc(&mut self, size: u32, limit: usize) -> Option<u32> {
        if size == 0 {
            return None;
        }
        let start = self.next.checked_add(ALIGN - 1)? & !(ALIGN - 1);
        let end = start.checked_add(size)?;
        if end as usize > limit {
            trace!("alloc of {} bytes failed: heap exhausted at {:#x}", size, start);
            return None;
        }
        self.next = end;
        self.sizes.insert(start, size);
        trace!("alloc {} bytes at {:#x}", size, start);
        Some(start)
    }

    /// Size of a live allocation.
    pub fn size_of(&self, ptr: u32) -> Option<u32> {
        self.sizes.get(&ptr).copied()
    }

    /// Forget an allocation. Returns false if `ptr` was not a live allocation.
    pub fn free(&mut self, ptr: u32) -> bool {
        self.sizes.remove(&ptr).is_some()
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// Bytes handed out so far, including alignment padding.
    pub fn used(&self) -> u32 {
        self.next - self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_aligned_and_disjoint() {
        let mut heap = BumpAllocator::new(1 << 14);
        let a = heap.alloc(3, 1 << 16).unwrap();
        let b = heap.alloc(5, 1 << 16).unwrap();
        assert_eq!(a, 1 << 14);
        assert_eq!(b % ALIGN, 0);
        assert!(b >= a + 3);
        assert_eq!(heap.size_of(b), Some(5));
    }

    #[test]
    fn zero_and_oversized_requests_fail() {
        let mut heap = BumpAllocator::new(0x100);
        assert_eq!(heap.alloc(0, 0x1000), None);
        assert_eq!(heap.alloc(0x1000, 0x1000), None);
        assert_eq!(heap.alloc(u32::MAX, usize::MAX), None);
        assert_eq!(heap.used(), 0);
    }

    #[test]
    fn free_forgets_sizes() {
        let mut heap = BumpAllocator::new(0);
        let a = heap.alloc(16, 0x100).unwrap();
        assert!(heap.free(a));
        assert!(!heap.free(a));
        assert_eq!(heap.size_of(a), None);
    }
}
