//! Owned reference to a native Metal object
//!
//! On Apple targets a `MetalHandle<T>` holds a retained Objective-C object.
//! Elsewhere it is a zero-sized placeholder so types embedding handles keep
//! the same shape on every platform.

#[cfg(target_vendor = "apple")]
mod native {
    use objc2::rc::Retained;
    use objc2::Message;
    use std::ops::Deref;

    /// Retained Metal object
    pub struct MetalHandle<T: ?Sized + Message>(Retained<T>);

    impl<T: ?Sized + Message> MetalHandle<T> {
        pub fn new(object: Retained<T>) -> Self {
            Self(object)
        }

        /// Another strong reference to the same object
        pub fn retain(&self) -> Retained<T> {
            Retained::clone(&self.0)
        }
    }

    impl<T: ?Sized + Message> Clone for MetalHandle<T> {
        fn clone(&self) -> Self {
            Self(Retained::clone(&self.0))
        }
    }

    impl<T: ?Sized + Message> Deref for MetalHandle<T> {
        type Target = T;

        fn deref(&self) -> &T {
            &self.0
        }
    }

    // SAFETY: handles only wrap Metal objects Apple documents as thread safe
    // (devices, queues, resources, states, events). Command buffers and
    // encoders stay behind `&mut` access of their owner.
    unsafe impl<T: ?Sized + Message> Send for MetalHandle<T> {}
    unsafe impl<T: ?Sized + Message> Sync for MetalHandle<T> {}
}

#[cfg(not(target_vendor = "apple"))]
mod native {
    use std::marker::PhantomData;

    /// Placeholder for a Metal object on targets without Metal
    pub struct MetalHandle<T: ?Sized>(PhantomData<fn() -> *const T>);

    impl<T: ?Sized> MetalHandle<T> {
        pub const fn placeholder() -> Self {
            Self(PhantomData)
        }
    }

    impl<T: ?Sized> Clone for MetalHandle<T> {
        fn clone(&self) -> Self {
            Self::placeholder()
        }
    }

    // SAFETY: the placeholder holds no data
    unsafe impl<T: ?Sized> Send for MetalHandle<T> {}
    unsafe impl<T: ?Sized> Sync for MetalHandle<T> {}
}

pub use native::MetalHandle;
