//! The growable aligned byte vector backing column blocks and delta buffers.

use std::collections::TryReserveError;

use crate::align::{is_aligned, round_down, round_up};

/// A growable, type-erased byte vector whose payload is aligned to a 128-byte
/// boundary and whose capacity is managed in 64-byte blocks.
///
/// The vector holds raw bytes; callers view them as arrays of a concrete
/// element type through [`typed_data`](Self::typed_data) and
/// [`typed_data_mut`](Self::typed_data_mut). Those views perform no copy and
/// trust the caller's element-size bookkeeping, which is why the rest of the
/// store funnels every reinterpretation through this type.
///
/// A vector distinguishes "no backing memory at all" from "an allocation that
/// happens to be full of zeros": [`is_allocated`](Self::is_allocated) reports
/// the former. Code that treats an absent buffer as meaningful (for example
/// "no row in this block is null") relies on that distinction.
///
/// Allocation comes in two flavors. The `try_*` constructors and growth
/// methods surface out-of-memory conditions as [`TryReserveError`]; the rest
/// follow the usual `Vec` policy of panicking. Paths that must report
/// allocation failure to their callers use the `try_*` family exclusively.
pub struct AlignedByteVec {
    /// Backing storage; the first `pad` bytes exist only to align the payload.
    inner: Vec<u8>,
    /// Number of padding bytes preceding the aligned payload.
    pad: u32,
    /// Payload alignment, fixed at construction.
    alignment: u32,
}

impl AlignedByteVec {
    /// Payload alignment in bytes. Large enough for every fixed-width element
    /// type the store materializes, including 16-byte integers.
    pub const ALIGNMENT: usize = 128;

    /// Granularity of capacity bookkeeping.
    const BLOCK_SIZE: usize = 64;

    /// Creates a new empty vector with no backing allocation.
    pub fn new() -> AlignedByteVec {
        AlignedByteVec {
            inner: Vec::new(),
            pad: 0,
            alignment: Self::ALIGNMENT as u32,
        }
    }

    /// Creates an empty vector able to hold at least `capacity` bytes without
    /// reallocating.
    pub fn with_capacity(capacity: usize) -> AlignedByteVec {
        Self::try_with_capacity(capacity).expect("buffer allocation")
    }

    /// Fallible variant of [`with_capacity`](Self::with_capacity).
    pub fn try_with_capacity(capacity: usize) -> Result<AlignedByteVec, TryReserveError> {
        Self::try_make(capacity, Self::ALIGNMENT)
    }

    /// Creates a vector of `len` zero bytes.
    pub fn zeroed(len: usize) -> AlignedByteVec {
        Self::try_zeroed(len).expect("buffer allocation")
    }

    /// Fallible variant of [`zeroed`](Self::zeroed).
    pub fn try_zeroed(len: usize) -> Result<AlignedByteVec, TryReserveError> {
        let mut v = Self::try_make(len, Self::ALIGNMENT)?;
        v.resize(len, 0);
        Ok(v)
    }

    /// Creates a vector containing a copy of `data`.
    pub fn copy_from_slice(data: &[u8]) -> AlignedByteVec {
        let mut v = Self::with_capacity(data.len());
        v.extend_from_slice(data);
        v
    }

    /// Returns the payload length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len() - self.pad()
    }

    /// Returns `true` if the payload is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of payload bytes the vector can hold without
    /// reallocating.
    #[inline]
    pub fn capacity(&self) -> usize {
        round_down(self.inner.capacity() - self.pad(), Self::BLOCK_SIZE)
    }

    /// Returns `true` if the vector owns any backing memory.
    ///
    /// An unallocated vector and a vector of zeros are different states; only
    /// the latter occupies heap space.
    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.inner.capacity() != 0
    }

    /// Returns a raw pointer to the payload.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        unsafe { self.inner.as_ptr().add(self.pad()) }
    }

    /// Returns a mutable raw pointer to the payload.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        unsafe { self.inner.as_mut_ptr().add(self.pad()) }
    }

    /// Returns the payload as a byte slice.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len()) }
    }

    /// Returns the payload as a mutable byte slice.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.as_mut_ptr(), self.len()) }
    }

    /// Reserves room for at least `additional` more payload bytes.
    #[inline]
    pub fn reserve(&mut self, additional: usize) {
        if self.capacity() - self.len() >= additional {
            return;
        }
        self.grow(additional).expect("buffer allocation");
    }

    /// Fallible variant of [`reserve`](Self::reserve).
    #[inline]
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        if self.capacity() - self.len() >= additional {
            return Ok(());
        }
        self.grow(additional)
    }

    /// Appends a byte slice to the payload.
    #[inline]
    pub fn extend_from_slice(&mut self, s: &[u8]) {
        self.reserve(s.len());
        self.inner.extend_from_slice(s);
    }

    /// Resizes the payload to `new_len` bytes, filling new space with `value`.
    pub fn resize(&mut self, new_len: usize, value: u8) {
        let len = self.len();
        if new_len > len {
            self.reserve(new_len - len);
            unsafe {
                self.as_mut_ptr().add(len).write_bytes(value, new_len - len);
                self.inner.set_len(self.pad() + new_len);
            }
        } else {
            self.inner.truncate(self.pad() + new_len);
        }
    }

    /// Resizes the payload to `new_len` bytes, zero-filling new space and
    /// reporting allocation failure instead of panicking.
    pub fn try_resize_zeroed(&mut self, new_len: usize) -> Result<(), TryReserveError> {
        let len = self.len();
        if new_len > len {
            self.try_reserve(new_len - len)?;
            unsafe {
                self.as_mut_ptr().add(len).write_bytes(0, new_len - len);
                self.inner.set_len(self.pad() + new_len);
            }
        } else {
            self.inner.truncate(self.pad() + new_len);
        }
        Ok(())
    }

    /// Truncates the payload to `new_len` bytes; longer requests are no-ops.
    pub fn truncate(&mut self, new_len: usize) {
        self.inner.truncate(self.pad() + new_len);
    }

    /// Clears the payload, keeping the allocation.
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Returns the total allocated byte count, padding included. This is the
    /// figure memory accounting wants: resident heap, not logical length.
    pub fn heap_size(&self) -> usize {
        self.inner.capacity()
    }

    /// Returns `true` if the payload start is aligned to `alignment` bytes.
    pub fn is_aligned_to(&self, alignment: usize) -> bool {
        is_aligned(self.as_ptr(), alignment)
    }
}

/// Typed views. These are the reinterpretation trust boundary: the casts are
/// checked for size and alignment by `bytemuck`, but whether the bytes
/// *mean* values of `T` is the caller's contract.
impl AlignedByteVec {
    /// Views the payload as a slice of `T`.
    ///
    /// # Panics
    ///
    /// Panics if the payload length is not a multiple of `size_of::<T>()`.
    #[inline]
    pub fn typed_data<T>(&self) -> &[T]
    where
        T: bytemuck::AnyBitPattern,
    {
        bytemuck::cast_slice(self.as_slice())
    }

    /// Views the payload as a mutable slice of `T`.
    ///
    /// # Panics
    ///
    /// Panics if the payload length is not a multiple of `size_of::<T>()`.
    #[inline]
    pub fn typed_data_mut<T>(&mut self) -> &mut [T]
    where
        T: bytemuck::AnyBitPattern + bytemuck::NoUninit,
    {
        bytemuck::cast_slice_mut(self.as_mut_slice())
    }

    /// Appends a single value of `T` by copying its bytes.
    #[inline]
    pub fn push_typed<T>(&mut self, value: T)
    where
        T: bytemuck::NoUninit,
    {
        self.extend_from_slice(bytemuck::bytes_of(&value));
    }

    /// Appends a slice of `T` values by copying their bytes.
    #[inline]
    pub fn extend_from_typed_slice<T>(&mut self, values: &[T])
    where
        T: bytemuck::NoUninit,
    {
        self.extend_from_slice(bytemuck::cast_slice(values));
    }
}

impl AlignedByteVec {
    #[inline]
    fn pad(&self) -> usize {
        self.pad as usize
    }

    fn try_make(capacity: usize, alignment: usize) -> Result<AlignedByteVec, TryReserveError> {
        assert!(alignment.is_power_of_two());

        if capacity == 0 {
            return Ok(AlignedByteVec {
                inner: Vec::new(),
                pad: 0,
                alignment: alignment as u32,
            });
        }

        let raw_capacity = capacity
            .checked_next_multiple_of(Self::BLOCK_SIZE)
            .and_then(|c| c.checked_add(alignment))
            .expect("capacity overflow");

        let mut vec = Vec::<u8>::new();
        vec.try_reserve_exact(raw_capacity)?;

        let p = vec.as_ptr() as usize;
        let pad = round_up(p, alignment) - p;
        if pad != 0 {
            unsafe {
                vec.as_mut_ptr().write_bytes(0, pad);
                vec.set_len(pad);
            }
        }

        let res = AlignedByteVec {
            inner: vec,
            pad: pad as u32,
            alignment: alignment as u32,
        };
        debug_assert!(res.capacity() >= capacity);
        Ok(res)
    }

    #[cold]
    fn grow(&mut self, additional: usize) -> Result<(), TryReserveError> {
        let needed = self
            .len()
            .checked_add(additional)
            .expect("capacity overflow");
        let new_cap = std::cmp::max(self.capacity() * 2, round_up(needed, Self::BLOCK_SIZE));
        let mut v = Self::try_make(new_cap, self.alignment as usize)?;
        if !self.is_empty() {
            v.inner.extend_from_slice(self.as_slice());
        }
        *self = v;
        Ok(())
    }
}

impl std::ops::Deref for AlignedByteVec {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl std::ops::DerefMut for AlignedByteVec {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl Clone for AlignedByteVec {
    fn clone(&self) -> AlignedByteVec {
        let mut v = AlignedByteVec::with_capacity(self.len());
        if !self.is_empty() {
            v.extend_from_slice(self.as_slice());
        }
        v
    }
}

impl Default for AlignedByteVec {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AlignedByteVec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedByteVec")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("allocated", &self.is_allocated())
            .finish_non_exhaustive()
    }
}
