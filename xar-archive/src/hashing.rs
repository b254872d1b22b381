// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Digesting of bytes as they are consumed from a reader.

use {
    digest::DynDigest,
    std::io::{Read, Result},
};

/// A [Read] adapter feeding every byte it yields into a hasher.
///
/// Bytes are digested exactly once, at the moment the consumer reads them.
/// Nothing is buffered, so wrapping a decompressor's source in this yields
/// the digest of the compressed stream without a second pass over it.
pub struct DigestingReader<R> {
    inner: R,
    hasher: Option<Box<dyn DynDigest>>,
    bytes_read: u64,
}

impl<R: Read> DigestingReader<R> {
    /// Construct an instance digesting with `hasher`.
    ///
    /// A `None` hasher turns this into a byte counting passthrough.
    pub fn new(inner: R, hasher: Option<Box<dyn DynDigest>>) -> Self {
        Self {
            inner,
            hasher,
            bytes_read: 0,
        }
    }

    /// Number of bytes that have passed through this reader.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Finish digesting, returning the inner reader and the digest, if any.
    pub fn finalize(self) -> (R, Option<Vec<u8>>) {
        let digest = self.hasher.map(|h| h.finalize().into_vec());

        (self.inner, digest)
    }
}

impl<R: Read> Read for DigestingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let count = self.inner.read(buf)?;

        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(&buf[..count]);
        }
        self.bytes_read += count as u64;

        Ok(count)
    }
}
