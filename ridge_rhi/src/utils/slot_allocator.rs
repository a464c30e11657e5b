/// Bounded allocator of reusable `u32` slot indices.
///
/// Hands out the lowest never-used index or recycles a freed one, and
/// refuses to go past a fixed capacity. Resource tables use one per
/// binding category.
///
/// # Example
///
/// ```ignore
/// let mut slots = SlotAllocator::with_capacity(2);
/// let a = slots.alloc().unwrap(); // 0
/// let _b = slots.alloc().unwrap(); // 1
/// assert!(slots.alloc().is_none());
/// slots.free(a);
/// assert_eq!(slots.alloc(), Some(0));
/// ```
#[derive(Debug, Clone)]
pub struct SlotAllocator {
    free_list: Vec<u32>,
    next_id: u32,
    len: u32,
    capacity: u32,
}

impl SlotAllocator {
    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            free_list: Vec::new(),
            next_id: 0,
            len: 0,
            capacity,
        }
    }

    /// Next available index, `None` once `capacity` indices are live
    pub fn alloc(&mut self) -> Option<u32> {
        let id = match self.free_list.pop() {
            Some(id) => id,
            None if self.next_id < self.capacity => {
                self.next_id += 1;
                self.next_id - 1
            }
            None => return None,
        };
        self.len += 1;
        Some(id)
    }

    /// Return `id` to the pool. Returns false if `id` was not live.
    pub fn free(&mut self, id: u32) -> bool {
        if id >= self.next_id || self.free_list.contains(&id) {
            return false;
        }
        self.len -= 1;
        self.free_list.push(id);
        true
    }

    /// Highest index ever handed out + 1
    pub fn high_water_mark(&self) -> u32 {
        self.next_id
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
#[path = "slot_allocator_tests.rs"]
mod tests;
