// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Detection of embedded signatures.
//!
//! A XAR archive is signed when its table of contents has a `<signature>`
//! (RSA) and/or `<x-signature>` (CMS) element. The signature covers the
//! digest of the compressed table of contents. Nothing here validates the
//! signature or its certificate chain.

use {
    crate::{reader::XarReader, Error, XarResult},
    log::debug,
    std::io::{Cursor, Read},
};

/// Determine whether the archive read from `reader` is signed.
///
/// The entire stream is buffered since the table of contents must be
/// read from a seekable source.
///
/// Returns [Error::NotSigned] if no signature is present.
pub fn check_signed(mut reader: impl Read) -> XarResult<()> {
    let mut data = vec![];
    reader.read_to_end(&mut data)?;

    check_signed_bytes(&data)
}

/// Determine whether the archive in `data` is signed.
pub fn check_signed_bytes(data: &[u8]) -> XarResult<()> {
    // Read the table of contents the same way a verifier would, digest included.
    let reader = XarReader::new_with_toc_digest(Cursor::new(data))?;

    if let Some(digest) = reader.toc_digest() {
        debug!(
            "computed {} byte {} table of contents digest",
            digest.len(),
            reader.header().checksum()
        );
    }

    let signatures = reader.signatures();

    if signatures.is_empty() {
        Err(Error::NotSigned)
    } else {
        debug!(
            "found signature styles: {}",
            signatures
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(())
    }
}
