//! Borrowed `(pointer, length)` views that cross the boundary by value.
//!
//! A slice never allocates or frees. Its validity is bounded by the call that
//! produced it; materializing (`to_vec`, `to_bytes`, `to_text`) always copies.

use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::str::Utf8Error;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SliceError {
    #[error("slice index is out of range: index is {index} but len is {len}")]
    OutOfRange { index: usize, len: usize },
    #[error("slice is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] Utf8Error),
}

/// Read-only view over contiguous memory owned by the other side.
#[repr(C)]
pub struct Slice<'a, T> {
    ptr: *const T,
    len: usize,
    _marker: PhantomData<&'a [T]>,
}

impl<T> Clone for Slice<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Slice<'_, T> {}

impl<'a, T> Slice<'a, T> {
    pub const fn empty() -> Self {
        Self {
            ptr: NonNull::<T>::dangling().as_ptr(),
            len: 0,
            _marker: PhantomData,
        }
    }

    pub const fn from_slice(slice: &'a [T]) -> Self {
        Self {
            ptr: slice.as_ptr(),
            len: slice.len(),
            _marker: PhantomData,
        }
    }

    /// # Safety
    /// `ptr` must be valid for reads of `len` elements for `'a`, or `len`
    /// must be zero.
    pub const unsafe fn from_raw_parts(ptr: *const T, len: usize) -> Self {
        Self {
            ptr,
            len,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub const fn as_ptr(&self) -> *const T {
        self.ptr
    }

    pub fn as_slice(&self) -> &'a [T] {
        if self.ptr.is_null() || self.len == 0 {
            return &[];
        }
        // SAFETY: upheld by the constructors
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// Bounds-checked element access.
    pub fn get(&self, index: usize) -> Result<&'a T, SliceError> {
        self.as_slice().get(index).ok_or(SliceError::OutOfRange {
            index,
            len: self.len,
        })
    }

    pub fn iter(&self) -> std::slice::Iter<'a, T> {
        self.as_slice().iter()
    }

    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.as_slice().to_vec()
    }
}

impl<'a> Slice<'a, u8> {
    pub const fn text(text: &'a str) -> Self {
        Self::from_slice(text.as_bytes())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_vec()
    }

    pub fn as_str(&self) -> Result<&'a str, SliceError> {
        Ok(std::str::from_utf8(self.as_slice())?)
    }

    pub fn to_text(&self) -> Result<String, SliceError> {
        self.as_str().map(str::to_owned)
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_slice()).into_owned()
    }
}

impl<T> Default for Slice<'_, T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<'a, T> From<&'a [T]> for Slice<'a, T> {
    fn from(slice: &'a [T]) -> Self {
        Self::from_slice(slice)
    }
}

impl<'a, T> From<&'a Vec<T>> for Slice<'a, T> {
    fn from(vec: &'a Vec<T>) -> Self {
        Self::from_slice(vec)
    }
}

impl<'a> From<&'a str> for Slice<'a, u8> {
    fn from(text: &'a str) -> Self {
        Self::text(text)
    }
}

impl<'a, T> IntoIterator for Slice<'a, T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for Slice<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

/// Writable view over a caller-owned buffer.
#[repr(C)]
pub struct SliceMut<'a, T> {
    ptr: *mut T,
    len: usize,
    _marker: PhantomData<&'a mut [T]>,
}

impl<'a, T> SliceMut<'a, T> {
    pub fn empty() -> Self {
        Self {
            ptr: NonNull::<T>::dangling().as_ptr(),
            len: 0,
            _marker: PhantomData,
        }
    }

    pub fn from_slice_mut(slice: &'a mut [T]) -> Self {
        Self {
            ptr: slice.as_mut_ptr(),
            len: slice.len(),
            _marker: PhantomData,
        }
    }

    /// # Safety
    /// `ptr` must be valid for reads and writes of `len` elements for `'a`
    /// and must not be aliased, or `len` must be zero.
    pub unsafe fn from_raw_parts(ptr: *mut T, len: usize) -> Self {
        Self {
            ptr,
            len,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[T] {
        if self.ptr.is_null() || self.len == 0 {
            return &[];
        }
        // SAFETY: upheld by the constructors
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        if self.ptr.is_null() || self.len == 0 {
            return &mut [];
        }
        // SAFETY: upheld by the constructors
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    pub fn get(&self, index: usize) -> Result<&T, SliceError> {
        let len = self.len;
        self.as_slice()
            .get(index)
            .ok_or(SliceError::OutOfRange { index, len })
    }

    pub fn set(&mut self, index: usize, value: T) -> Result<(), SliceError> {
        let len = self.len;
        let slot = self
            .as_mut_slice()
            .get_mut(index)
            .ok_or(SliceError::OutOfRange { index, len })?;
        *slot = value;
        Ok(())
    }

    /// Copies as much of `source` as fits and returns the number of
    /// elements written.
    pub fn copy_from(&mut self, source: &[T]) -> usize
    where
        T: Copy,
    {
        let count = source.len().min(self.len);
        self.as_mut_slice()[..count].copy_from_slice(&source[..count]);
        count
    }

    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.as_slice().to_vec()
    }
}

impl<T> Default for SliceMut<'_, T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: fmt::Debug> fmt::Debug for SliceMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_checked_get() {
        let data = [10_u64, 20, 30];
        let slice = Slice::from_slice(&data);

        for (index, expected) in data.iter().enumerate() {
            assert_eq!(slice.get(index), Ok(expected));
        }
        assert_eq!(
            slice.get(3),
            Err(SliceError::OutOfRange { index: 3, len: 3 })
        );
        assert!(slice.get(usize::MAX).is_err());
    }

    #[test]
    fn test_null_pointer_is_empty() {
        let slice: Slice<'_, u32> = unsafe { Slice::from_raw_parts(std::ptr::null(), 0) };
        assert!(slice.is_empty());
        assert!(slice.as_slice().is_empty());
        assert!(slice.get(0).is_err());
    }

    #[test]
    fn test_to_vec_is_stable_when_rewrapped() {
        let data = vec![1_i32, -2, 3, 5, 8];
        let first = Slice::from(&data).to_vec();
        let second = Slice::from(&first).to_vec();
        assert_eq!(first, data);
        assert_eq!(second, first);
    }

    #[test]
    fn test_text_round_trip() {
        let text = "仙狐さん rotates";
        let slice = Slice::text(text);
        assert_eq!(slice.len(), text.len());
        assert_eq!(slice.as_str().unwrap(), text);
        assert_eq!(slice.to_text().unwrap(), text);
        assert_eq!(slice.to_bytes(), text.as_bytes());
    }

    #[test]
    fn test_invalid_utf8() {
        let bytes = [0xff_u8, 0xfe, b'a'];
        let slice = Slice::from_slice(&bytes[..]);
        assert!(matches!(slice.to_text(), Err(SliceError::InvalidUtf8(_))));
        assert_eq!(slice.to_string_lossy(), "\u{fffd}\u{fffd}a");
    }

    #[test]
    fn test_slice_mut_set_and_copy() {
        let mut buffer = [0_u8; 4];
        let mut view = SliceMut::from_slice_mut(&mut buffer);
        view.set(1, 7).unwrap();
        assert_eq!(
            view.set(4, 1),
            Err(SliceError::OutOfRange { index: 4, len: 4 })
        );
        assert_eq!(view.get(1), Ok(&7));

        let written = view.copy_from(b"hello");
        assert_eq!(written, 4);
        assert_eq!(&buffer, b"hell");
    }
}
