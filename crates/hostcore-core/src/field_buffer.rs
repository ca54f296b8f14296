//! Growable field buffer shared between the host and native code.
//!
//! A `FieldBuffer` is a fixed-layout array of numeric slots. Every clone
//! refers to the same storage, so a counter bumped through one handle is
//! visible through all of them. Slots are addressed by index constants
//! owned by the component that lays out the buffer.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// Shared, resizable array of `Copy` fields.
pub struct FieldBuffer<T> {
    inner: Arc<RwLock<Vec<T>>>,
}

impl<T> Clone for FieldBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Copy + Default> FieldBuffer<T> {
    /// Create a buffer with `len` default-initialized slots.
    pub fn new(len: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(vec![T::default(); len])),
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the buffer has no slots.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Read one slot.
    ///
    /// Panics when `index` is out of range; layouts are fixed at construction.
    pub fn get(&self, index: usize) -> T {
        self.inner.read()[index]
    }

    /// Write one slot.
    pub fn set(&self, index: usize, value: T) {
        self.inner.write()[index] = value;
    }

    /// Replace a slot with `f(old)` and return the new value.
    pub fn update(&self, index: usize, f: impl FnOnce(T) -> T) -> T {
        let mut fields = self.inner.write();
        let value = f(fields[index]);
        fields[index] = value;
        value
    }

    /// Grow to at least `len` slots. Existing values are kept, new slots
    /// are default-initialized. Never shrinks.
    pub fn grow_to(&self, len: usize) {
        let mut fields = self.inner.write();
        if len > fields.len() {
            fields.resize(len, T::default());
        }
    }

    /// Copy of every slot.
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.read().clone()
    }

    /// Whether two handles refer to the same storage.
    pub fn shares_storage_with(&self, other: &FieldBuffer<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Copy + Default + fmt::Debug> fmt::Debug for FieldBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.inner.read().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let buffer: FieldBuffer<u32> = FieldBuffer::new(3);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.snapshot(), vec![0, 0, 0]);
    }

    #[test]
    fn test_clones_share_storage() {
        let buffer: FieldBuffer<f64> = FieldBuffer::new(2);
        let alias = buffer.clone();

        alias.set(1, 4.5);
        assert_eq!(buffer.get(1), 4.5);
        assert!(buffer.shares_storage_with(&alias));
        assert!(!buffer.shares_storage_with(&FieldBuffer::new(2)));
    }

    #[test]
    fn test_update_returns_new_value() {
        let buffer: FieldBuffer<u32> = FieldBuffer::new(1);
        assert_eq!(buffer.update(0, |v| v + 5), 5);
        assert_eq!(buffer.update(0, |v| v * 2), 10);
    }

    #[test]
    fn test_grow_keeps_values() {
        let buffer: FieldBuffer<u8> = FieldBuffer::new(2);
        buffer.set(0, 7);
        buffer.grow_to(4);
        assert_eq!(buffer.snapshot(), vec![7, 0, 0, 0]);

        buffer.grow_to(1);
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    #[should_panic]
    fn test_out_of_range_panics() {
        let buffer: FieldBuffer<u32> = FieldBuffer::new(1);
        buffer.get(1);
    }
}
