// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Read-only XAR archive inspection.

XAR is the container format behind Apple flat packages (`.pkg` installers).
An archive consists of:

1. A fixed 28 byte big-endian header (see [format::XarHeader]).
2. A zlib compressed XML *table of contents* describing every entry.
3. A *heap* holding entry data, each entry possibly compressed with its
   own codec.

This crate decodes enough of the format to locate and decode individual
entries and to detect whether the archive carries an embedded signature.
It never validates signatures and never mutates archives.
*/

pub mod format;
pub mod hashing;
pub mod lenient_xml;
pub mod reader;
pub mod signature;
pub mod table_of_contents;
#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

pub use {
    reader::XarReader,
    signature::{check_signed, check_signed_bytes},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a XAR archive: {0}")]
    InvalidFormat(&'static str),

    #[error("unsupported checksum algorithm: {0}")]
    UnsupportedHashAlgorithm(u32),

    #[error("table of contents is corrupted: {0}")]
    CorruptTableOfContents(&'static str, #[source] Option<std::io::Error>),

    #[error("malformed {0} XML: {1}")]
    MalformedXml(&'static str, serde_xml_rs::Error),

    #[error("heap range out of bounds: {length} bytes at offset {offset} exceeds {available} available")]
    TruncatedArchive {
        offset: u64,
        length: u64,
        available: u64,
    },

    #[error("unable to decode {style} file data: {source}")]
    UnsupportedEncoding {
        style: String,
        source: std::io::Error,
    },

    #[error("file has no data: {0}")]
    FileNoData(String),

    #[error("archive is not signed")]
    NotSigned,
}

pub type XarResult<T> = std::result::Result<T, Error>;
