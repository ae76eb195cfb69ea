//! Owned, SIMD-aligned sample buffers.
//!
//! Every numerical payload in the pipeline is an [`AlignedVec`]: an
//! exclusively owned, contiguous, zero-initialized array whose start
//! address is aligned (64 bytes by default) so the lane-batched kernels
//! can use aligned loads and stores. Ownership moves across ports; a
//! deep copy is explicit via [`Clone`].

use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::ptr::NonNull;

use crate::{Error, Result};

/// Default alignment for sample buffers, in bytes.
pub const ALIGNMENT: usize = 64;

/// Owned aligned array of `T`.
pub struct AlignedVec<T> {
    ptr: NonNull<T>,
    len: usize,
    alignment: usize,
}

// SAFETY: AlignedVec exclusively owns its allocation, so it is as
// thread-safe as the element type.
unsafe impl<T: Send> Send for AlignedVec<T> {}
// SAFETY: shared references only hand out &T.
unsafe impl<T: Sync> Sync for AlignedVec<T> {}

impl<T: Copy> AlignedVec<T> {
    /// Allocate a zero-initialized buffer of `len` elements aligned to
    /// `alignment` bytes.
    ///
    /// `alignment` must be a power of two no smaller than the element's
    /// natural alignment. Allocation failure is an [`Error::Alloc`],
    /// which is fatal for the owning component.
    pub fn new(alignment: usize, len: usize) -> Result<Self> {
        if !alignment.is_power_of_two() || alignment < std::mem::align_of::<T>() {
            return Err(Error::config(format!(
                "bad alignment {alignment} for element size {}",
                std::mem::size_of::<T>()
            )));
        }
        let bytes = len * std::mem::size_of::<T>();
        // Zero-length buffers still get a real allocation so the pointer
        // honors the alignment invariant.
        let layout = Layout::from_size_align(bytes.max(1), alignment)
            .map_err(|e| Error::config(format!("bad layout: {e}")))?;
        // SAFETY: layout has nonzero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw as *mut T).ok_or(Error::Alloc(bytes))?;
        Ok(Self {
            ptr,
            len,
            alignment,
        })
    }

    /// Allocate with the default 64-byte [`ALIGNMENT`].
    pub fn with_default_alignment(len: usize) -> Result<Self> {
        Self::new(ALIGNMENT, len)
    }

    /// The raw bytes of the buffer, in element order.
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: len * size_of::<T>() bytes are owned and initialized.
        unsafe {
            std::slice::from_raw_parts(
                self.ptr.as_ptr() as *const u8,
                self.len * std::mem::size_of::<T>(),
            )
        }
    }
}

impl<T> AlignedVec<T> {
    /// Pointer to the first element.
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the buffer contents in bytes.
    pub fn size_bytes(&self) -> usize {
        self.len * std::mem::size_of::<T>()
    }

    /// Alignment of the allocation, in bytes.
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Bounds-checked element access.
    pub fn at(&self, index: usize) -> Result<&T> {
        self.as_slice().get(index).ok_or(Error::OutOfRange {
            index,
            len: self.len,
        })
    }

    /// Bounds-checked mutable element access.
    pub fn at_mut(&mut self, index: usize) -> Result<&mut T> {
        let len = self.len;
        self.as_mut_slice()
            .get_mut(index)
            .ok_or(Error::OutOfRange { index, len })
    }

    /// The elements as a slice.
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: ptr is valid for len initialized elements.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// The elements as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: ptr is valid for len initialized elements, exclusively
        // owned.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    fn layout(&self) -> Layout {
        let bytes = self.len * std::mem::size_of::<T>();
        // The layout was validated at construction.
        Layout::from_size_align(bytes.max(1), self.alignment).unwrap()
    }
}

impl<T> Drop for AlignedVec<T> {
    fn drop(&mut self) {
        // SAFETY: allocated in new() with the same layout.
        unsafe { dealloc(self.ptr.as_ptr() as *mut u8, self.layout()) }
    }
}

impl<T: Copy> Clone for AlignedVec<T> {
    /// Deep copy, preserving alignment.
    fn clone(&self) -> Self {
        let mut copy = Self::new(self.alignment, self.len)
            .expect("allocation failed while copying a buffer");
        copy.as_mut_slice().copy_from_slice(self.as_slice());
        copy
    }
}

impl<T> std::ops::Deref for AlignedVec<T> {
    type Target = [T];
    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> std::ops::DerefMut for AlignedVec<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for AlignedVec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice().iter()).finish()
    }
}

/* vim: textwidth=80
 */
