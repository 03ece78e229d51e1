// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use super::databuffer::DataBuffer;
use crate::runtime::fail::Fail;
use ::libc::EINVAL;
use ::std::collections::VecDeque;

//==============================================================================
// Structures
//==============================================================================

/// Buffer Chain
///
/// An ordered sequence of [DataBuffer] links that is read as one contiguous byte stream. Trimming works across link
/// boundaries and concatenation moves links without copying their bytes. Empty links are never stored.
#[derive(Clone, Debug, Default)]
pub struct BufferChain {
    links: VecDeque<DataBuffer>,
    len: usize,
}

//==============================================================================
// Associated Functions
//==============================================================================

impl BufferChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of bytes over all links.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of links in the chain.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Appends a single link to the end of the chain.
    pub fn push(&mut self, buf: DataBuffer) {
        if !buf.is_empty() {
            self.len += buf.len();
            self.links.push_back(buf);
        }
    }

    /// Moves every link of `other` onto the end of the target chain.
    pub fn cat(&mut self, mut other: BufferChain) {
        self.len += other.len;
        self.links.append(&mut other.links);
    }

    /// Removes `nbytes` from the front of the chain, releasing links that become empty.
    pub fn adjust(&mut self, mut nbytes: usize) -> Result<(), Fail> {
        if nbytes > self.len {
            return Err(Fail::new(EINVAL, "tried to remove more bytes than are present"));
        }
        self.len -= nbytes;
        while nbytes > 0 {
            let front: &mut DataBuffer = match self.links.front_mut() {
                Some(front) => front,
                None => break,
            };
            if front.len() <= nbytes {
                nbytes -= front.len();
                self.links.pop_front();
            } else {
                front.adjust(nbytes)?;
                nbytes = 0;
            }
        }
        Ok(())
    }

    /// Removes `nbytes` from the end of the chain, releasing links that become empty.
    pub fn trim(&mut self, mut nbytes: usize) -> Result<(), Fail> {
        if nbytes > self.len {
            return Err(Fail::new(EINVAL, "tried to remove more bytes than are present"));
        }
        self.len -= nbytes;
        while nbytes > 0 {
            let back: &mut DataBuffer = match self.links.back_mut() {
                Some(back) => back,
                None => break,
            };
            if back.len() <= nbytes {
                nbytes -= back.len();
                self.links.pop_back();
            } else {
                back.trim(nbytes)?;
                nbytes = 0;
            }
        }
        Ok(())
    }

    /// Shrinks the chain to `new_len` bytes. Does nothing if the chain is already shorter.
    pub fn truncate(&mut self, new_len: usize) -> Result<(), Fail> {
        if new_len < self.len {
            self.trim(self.len - new_len)?;
        }
        Ok(())
    }

    /// Detaches the first `nbytes` of the chain into a new chain.
    pub fn split_front(&mut self, mut nbytes: usize) -> Result<BufferChain, Fail> {
        if nbytes > self.len {
            return Err(Fail::new(EINVAL, "split offset past end of chain"));
        }
        let mut front: BufferChain = BufferChain::new();
        while nbytes > 0 {
            let link: &mut DataBuffer = match self.links.front_mut() {
                Some(link) => link,
                None => break,
            };
            if link.len() <= nbytes {
                nbytes -= link.len();
                if let Some(link) = self.links.pop_front() {
                    self.len -= link.len();
                    front.push(link);
                }
            } else {
                let head: DataBuffer = link.split_front(nbytes)?;
                self.len -= head.len();
                front.push(head);
                nbytes = 0;
            }
        }
        Ok(front)
    }

    /// Iterates over the links as byte slices.
    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> {
        self.links.iter().map(|link| &link[..])
    }

    /// Copies the chain into one contiguous vector.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::with_capacity(self.len);
        for chunk in self.chunks() {
            out.extend_from_slice(chunk);
        }
        out
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl From<DataBuffer> for BufferChain {
    fn from(buf: DataBuffer) -> Self {
        let mut chain: BufferChain = BufferChain::new();
        chain.push(buf);
        chain
    }
}

impl From<&[u8]> for BufferChain {
    fn from(src: &[u8]) -> Self {
        DataBuffer::from_slice(src).into()
    }
}

//==============================================================================
// Unit Tests
//==============================================================================
