pub mod event_dispatcher;
pub mod slot_allocator;
