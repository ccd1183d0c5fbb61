#![deny(missing_docs)]

//! Immutable byte buffers for Tessera.
//!
//! Every index region of a segment is read through a [`ByteBuffer`], which is either an owned
//! heap allocation or a read-only memory map of the segment file. Cloning and slicing never copy.

use std::fmt::{Debug, Formatter};
use std::ops::{Deref, Range};
use std::path::Path;
use std::{fmt, fs};

use bytes::Bytes;
use tessera_error::{TesseraResult, tessera_bail, tessera_err};

#[cfg(feature = "memmap2")]
mod memmap2;

/// An owned, cheaply cloneable and sliceable byte array.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ByteBuffer(Bytes);

impl ByteBuffer {
    /// Create an empty buffer.
    pub fn empty() -> Self {
        Self(Bytes::new())
    }

    /// Copy the given bytes into a new buffer.
    pub fn copy_from(bytes: impl AsRef<[u8]>) -> Self {
        Self(Bytes::copy_from_slice(bytes.as_ref()))
    }

    /// Read the whole file at `path` onto the heap.
    pub fn read_file(path: impl AsRef<Path>) -> TesseraResult<Self> {
        Ok(Self::from(fs::read(path.as_ref())?))
    }

    /// Length of the buffer in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the buffer holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return a view over the buffer as a byte slice.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Zero-copy slice of the buffer, failing if the range does not lie within it.
    pub fn slice(&self, range: Range<usize>) -> TesseraResult<Self> {
        if range.start > range.end || range.end > self.len() {
            tessera_bail!(
                InvalidSerde: "range {}..{} exceeds buffer of {} bytes",
                range.start,
                range.end,
                self.len()
            );
        }
        Ok(Self(self.0.slice(range)))
    }

    /// Split the buffer into the first `len` bytes and the remainder.
    pub fn split_at(&self, len: usize) -> TesseraResult<(Self, Self)> {
        Ok((self.slice(0..len)?, self.slice(len..self.len())?))
    }

    /// Read a little-endian `u32` at byte `offset`.
    #[inline]
    pub fn u32_le(&self, offset: usize) -> TesseraResult<u32> {
        self.array_at::<4>(offset).map(u32::from_le_bytes)
    }

    /// Read a little-endian `u64` at byte `offset`.
    #[inline]
    pub fn u64_le(&self, offset: usize) -> TesseraResult<u64> {
        self.array_at::<8>(offset).map(u64::from_le_bytes)
    }

    /// Read a little-endian `i32` at byte `offset`.
    #[inline]
    pub fn i32_le(&self, offset: usize) -> TesseraResult<i32> {
        self.array_at::<4>(offset).map(i32::from_le_bytes)
    }

    /// Read a little-endian `f64` at byte `offset`.
    #[inline]
    pub fn f64_le(&self, offset: usize) -> TesseraResult<f64> {
        self.array_at::<8>(offset).map(f64::from_le_bytes)
    }

    /// Read `N` bytes starting at `offset`.
    #[inline]
    pub fn array_at<const N: usize>(&self, offset: usize) -> TesseraResult<[u8; N]> {
        self.0
            .get(offset..offset + N)
            .and_then(|s| <[u8; N]>::try_from(s).ok())
            .ok_or_else(|| tessera_err!(OutOfBounds: offset + N, 0, self.len()))
    }

    /// Unwrap the underlying [`Bytes`].
    pub fn into_inner(self) -> Bytes {
        self.0
    }
}

impl Deref for ByteBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Debug for ByteBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("len", &self.len())
            .finish()
    }
}

impl From<Bytes> for ByteBuffer {
    fn from(value: Bytes) -> Self {
        Self(value)
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<&'static [u8]> for ByteBuffer {
    fn from(value: &'static [u8]) -> Self {
        Self(Bytes::from_static(value))
    }
}
