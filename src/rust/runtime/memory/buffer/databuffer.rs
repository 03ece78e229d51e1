// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use crate::runtime::fail::Fail;
use ::libc::EINVAL;
use ::std::{
    fmt::Debug,
    ops::Deref,
    sync::Arc,
};

//==============================================================================
// Structures
//==============================================================================

/// Data Buffer
///
/// A reference-counted view into an immutable byte array. Cloning a buffer shares the underlying storage, so the
/// pointer-adjustment operations below never copy payload bytes.
#[derive(Clone, Debug)]
pub struct DataBuffer {
    /// Underlying data.
    data: Option<Arc<[u8]>>,

    /// Data offset.
    offset: usize,

    /// Data length.
    len: usize,
}

//==============================================================================
// Associated Functions
//==============================================================================

/// Associated Functions for Data Buffers
impl DataBuffer {
    /// Removes bytes from the front of the target data buffer.
    pub fn adjust(&mut self, nbytes: usize) -> Result<(), Fail> {
        if nbytes > self.len {
            return Err(Fail::new(EINVAL, "tried to remove more bytes than are present"));
        }
        self.offset += nbytes;
        self.len -= nbytes;
        Ok(())
    }

    /// Removes bytes from the end of the target data buffer.
    pub fn trim(&mut self, nbytes: usize) -> Result<(), Fail> {
        if nbytes > self.len {
            return Err(Fail::new(EINVAL, "tried to remove more bytes than are present"));
        }
        self.len -= nbytes;
        Ok(())
    }

    /// Splits the target buffer at `offset`, returning the bytes in `[0, offset)` and keeping the rest.
    pub fn split_front(&mut self, offset: usize) -> Result<Self, Fail> {
        if offset > self.len {
            return Err(Fail::new(EINVAL, "split offset past end of buffer"));
        }
        let front: Self = Self {
            data: self.data.clone(),
            offset: self.offset,
            len: offset,
        };
        self.adjust(offset)?;
        Ok(front)
    }

    /// Creates an empty buffer.
    pub fn empty() -> Self {
        Self {
            data: None,
            offset: 0,
            len: 0,
        }
    }

    /// Creates a data buffer from a slice.
    pub fn from_slice(src: &[u8]) -> Self {
        src.into()
    }

    /// Returns the number of bytes visible through the target buffer.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

//==============================================================================
// Standard-Library Trait Implementations
//==============================================================================

/// De-Reference Trait Implementation for Data Buffers
impl Deref for DataBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self.data {
            None => &[],
            Some(ref buf) => &buf[self.offset..(self.offset + self.len)],
        }
    }
}

/// Conversion Trait Implementation for Data Buffers
impl From<&[u8]> for DataBuffer {
    fn from(src: &[u8]) -> Self {
        if src.is_empty() {
            return Self::empty();
        }
        let buf: Arc<[u8]> = src.into();
        Self {
            data: Some(buf),
            offset: 0,
            len: src.len(),
        }
    }
}

/// Conversion Trait Implementation for Data Buffers
impl From<Vec<u8>> for DataBuffer {
    fn from(src: Vec<u8>) -> Self {
        if src.is_empty() {
            return Self::empty();
        }
        let len: usize = src.len();
        Self {
            data: Some(src.into()),
            offset: 0,
            len,
        }
    }
}

//==============================================================================
// Unit Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::DataBuffer;
    use ::anyhow::Result;

    #[test]
    fn adjust_and_trim() -> Result<()> {
        let mut buf: DataBuffer = DataBuffer::from_slice(&[1, 2, 3, 4, 5]);
        buf.adjust(1)?;
        buf.trim(1)?;
        crate::ensure_eq!(&buf[..], &[2, 3, 4][..]);
        crate::ensure_eq!(buf.adjust(4).is_err(), true);
        crate::ensure_eq!(buf.trim(4).is_err(), true);
        Ok(())
    }

    #[test]
    fn split_front_shares_storage() -> Result<()> {
        let mut buf: DataBuffer = DataBuffer::from_slice(&[1, 2, 3, 4]);
        let front: DataBuffer = buf.split_front(3)?;
        crate::ensure_eq!(&front[..], &[1, 2, 3][..]);
        crate::ensure_eq!(&buf[..], &[4][..]);
        Ok(())
    }
}
