//! External vector storage.
//!
//! A contiguous arena of `capacity * stride` bytes where `stride` is the
//! vector byte width rounded up to a cache line, so every slot load starts
//! aligned. Owned mode copies vector bytes in on insertion; view mode
//! serves slots straight out of a read-only file mapping.

use std::cell::UnsafeCell;
use std::sync::Arc;

use memmap2::Mmap;

use crate::config::VECTOR_ALIGN;

/// Word-aligned arena written through raw pointers.
///
/// Slot `id` is written exactly once, by the single inserter that reserved
/// `id`, before the node is published through any neighbor link; readers
/// only reach a slot after that publication, so no two threads ever touch
/// the same slot concurrently and no reference to the whole buffer is ever
/// formed.
struct Arena {
    words: Box<[UnsafeCell<u64>]>,
}

unsafe impl Sync for Arena {}

impl Arena {
    fn zeroed(words: usize) -> Self {
        Self {
            words: std::iter::repeat_with(|| UnsafeCell::new(0))
                .take(words)
                .collect(),
        }
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        self.words.as_ptr() as *mut u8
    }
}

enum Backing {
    Owned(Arena),
    Mapped { map: Arc<Mmap>, offset: usize },
}

/// Vector arena, either mutable in memory or read-only over a file mapping.
pub struct VectorStore {
    backing: Backing,
    dims_bytes: usize,
    stride: usize,
    capacity: usize,
}

impl VectorStore {
    /// Stride for a vector of `dims_bytes` bytes: padded to [`VECTOR_ALIGN`].
    pub fn stride_for(dims_bytes: usize) -> usize {
        dims_bytes.next_multiple_of(VECTOR_ALIGN).max(VECTOR_ALIGN)
    }

    /// Allocates an owned zeroed arena for `capacity` vectors.
    pub fn with_capacity(dims_bytes: usize, capacity: usize) -> Self {
        let stride = Self::stride_for(dims_bytes);
        Self {
            backing: Backing::Owned(Arena::zeroed(capacity * stride / 8)),
            dims_bytes,
            stride,
            capacity,
        }
    }

    /// Wraps the vector arena region of a mapped file image. The region
    /// was bounds-checked when the view was opened.
    pub(crate) fn mapped(map: Arc<Mmap>, offset: usize, dims_bytes: usize, capacity: usize) -> Self {
        Self {
            backing: Backing::Mapped { map, offset },
            dims_bytes,
            stride: Self::stride_for(dims_bytes),
            capacity,
        }
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.backing, Backing::Mapped { .. })
    }

    /// Grows the owned arena to `capacity` slots. Requires exclusive access.
    pub fn grow(&mut self, capacity: usize) {
        match &mut self.backing {
            Backing::Owned(arena) => {
                if capacity <= self.capacity {
                    return;
                }
                let grown = Arena::zeroed(capacity * self.stride / 8);
                // Exclusive access: plain copy of the live prefix.
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        arena.base(),
                        grown.base(),
                        self.capacity * self.stride,
                    );
                }
                *arena = grown;
                self.capacity = capacity;
            }
            Backing::Mapped { .. } => unreachable!("growth is rejected on mapped indexes"),
        }
    }

    /// Copies vector bytes into slot `id`.
    ///
    /// The caller is the unique inserter of `id` and publishes the node
    /// only afterwards; see [`Arena`].
    pub(crate) fn write(&self, id: u32, bytes: &[u8]) {
        debug_assert!(bytes.len() <= self.dims_bytes);
        debug_assert!((id as usize) < self.capacity);
        match &self.backing {
            Backing::Owned(arena) => unsafe {
                let dst = arena.base().add(id as usize * self.stride);
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
            },
            Backing::Mapped { .. } => unreachable!("mutation is rejected on mapped indexes"),
        }
    }

    /// The stored bytes of vector `id`.
    #[inline]
    pub fn get(&self, id: u32) -> &[u8] {
        let at = id as usize * self.stride;
        match &self.backing {
            Backing::Owned(arena) => unsafe {
                std::slice::from_raw_parts(arena.base().add(at), self.dims_bytes)
            },
            Backing::Mapped { map, offset } => &map[offset + at..offset + at + self.dims_bytes],
        }
    }

    /// Bulk-copies a saved arena prefix into the owned arena. Requires
    /// exclusive access.
    pub(crate) fn fill_from(&mut self, bytes: &[u8]) {
        match &mut self.backing {
            Backing::Owned(arena) => {
                debug_assert!(bytes.len() <= self.capacity * self.stride);
                unsafe {
                    std::ptr::copy_nonoverlapping(bytes.as_ptr(), arena.base(), bytes.len());
                }
            }
            Backing::Mapped { .. } => unreachable!("mutation is rejected on mapped indexes"),
        }
    }

    /// The raw arena prefix covering the first `count` slots, including
    /// their zero padding. Requires exclusive access in owned mode.
    pub(crate) fn raw(&self, count: usize) -> &[u8] {
        let len = count * self.stride;
        match &self.backing {
            Backing::Owned(arena) => unsafe { std::slice::from_raw_parts(arena.base(), len) },
            Backing::Mapped { map, offset } => &map[*offset..offset + len],
        }
    }
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = if self.is_mapped() { "mapped" } else { "owned" };
        f.debug_struct("VectorStore")
            .field("mode", &mode)
            .field("dims_bytes", &self.dims_bytes)
            .field("stride", &self.stride)
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride_is_cache_line_padded() {
        assert_eq!(VectorStore::stride_for(1), 64);
        assert_eq!(VectorStore::stride_for(64), 64);
        assert_eq!(VectorStore::stride_for(65), 128);
        assert_eq!(VectorStore::stride_for(512), 512);
    }

    #[test]
    fn test_write_and_get() {
        let store = VectorStore::with_capacity(12, 4);
        store.write(0, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        store.write(3, &[9; 12]);
        assert_eq!(store.get(0), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        assert_eq!(store.get(3), &[9; 12]);
        assert_eq!(store.get(1), &[0; 12], "untouched slots stay zeroed");
    }

    #[test]
    fn test_slot_alignment() {
        let store = VectorStore::with_capacity(16, 8);
        for id in 0..8u32 {
            assert_eq!(store.get(id).as_ptr() as usize % 8, 0);
        }
    }

    #[test]
    fn test_grow_preserves_and_zeroes() {
        let mut store = VectorStore::with_capacity(8, 1);
        store.write(0, &[7; 8]);
        store.grow(4);
        assert_eq!(store.capacity(), 4);
        assert_eq!(store.get(0), &[7; 8]);
        assert_eq!(store.get(2), &[0; 8]);
    }

    #[test]
    fn test_raw_covers_padding() {
        let store = VectorStore::with_capacity(4, 2);
        store.write(1, &[1, 2, 3, 4]);
        let raw = store.raw(2);
        assert_eq!(raw.len(), 2 * store.stride());
        assert_eq!(&raw[store.stride()..store.stride() + 4], &[1, 2, 3, 4]);
    }
}
