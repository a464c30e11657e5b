use super::*;

// ============================================================================
// Allocation
// ============================================================================

#[test]
fn test_sequential_alloc() {
    let mut slots = SlotAllocator::with_capacity(8);
    assert_eq!(slots.alloc(), Some(0));
    assert_eq!(slots.alloc(), Some(1));
    assert_eq!(slots.alloc(), Some(2));
    assert_eq!(slots.len(), 3);
    assert_eq!(slots.high_water_mark(), 3);
}

#[test]
fn test_new_is_empty() {
    let slots = SlotAllocator::with_capacity(4);
    assert!(slots.is_empty());
    assert_eq!(slots.capacity(), 4);
    assert_eq!(slots.high_water_mark(), 0);
}

#[test]
fn test_capacity_is_a_hard_limit() {
    let mut slots = SlotAllocator::with_capacity(2);
    assert_eq!(slots.alloc(), Some(0));
    assert_eq!(slots.alloc(), Some(1));
    assert_eq!(slots.alloc(), None);
    assert_eq!(slots.len(), 2);
}

#[test]
fn test_zero_capacity() {
    let mut slots = SlotAllocator::with_capacity(0);
    assert_eq!(slots.alloc(), None);
}

// ============================================================================
// Free and recycle
// ============================================================================

#[test]
fn test_free_and_recycle() {
    let mut slots = SlotAllocator::with_capacity(8);
    let a = slots.alloc().unwrap();
    let _b = slots.alloc().unwrap();
    assert!(slots.free(a));
    assert_eq!(slots.alloc(), Some(a));
    assert_eq!(slots.high_water_mark(), 2);
}

#[test]
fn test_free_makes_room_when_full() {
    let mut slots = SlotAllocator::with_capacity(1);
    let a = slots.alloc().unwrap();
    assert_eq!(slots.alloc(), None);
    slots.free(a);
    assert_eq!(slots.alloc(), Some(0));
}

#[test]
fn test_double_free_is_rejected() {
    let mut slots = SlotAllocator::with_capacity(4);
    let a = slots.alloc().unwrap();
    assert!(slots.free(a));
    assert!(!slots.free(a));
    assert!(!slots.free(3));
    assert!(slots.is_empty());
}
