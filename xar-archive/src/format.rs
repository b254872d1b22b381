// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    crate::{Error, XarResult},
    digest::DynDigest,
    scroll::{IOread, IOwrite, Pread, Pwrite, SizeWith},
    std::{
        fmt::{Display, Formatter},
        io::Read,
    },
};

/// File magic. `xar!` read as a big-endian integer.
pub const XAR_MAGIC: u32 = 0x7861_7221;

/// Size in bytes of the fixed portion of the header.
pub const XAR_HEADER_SIZE: u16 = 28;

/// A XAR archive header.
///
/// The header effectively defines a table of contents, which
/// holds information about the content of the archive.
#[derive(Clone, Copy, Debug, IOread, IOwrite, Pread, Pwrite, SizeWith)]
pub struct XarHeader {
    /// File magic. `xar!`.
    pub magic: u32,

    /// Size of this header + magic.
    pub size: u16,

    /// Format version number.
    pub version: u16,

    /// Size in bytes of zlib compressed table of contents.
    pub toc_length_compressed: u64,

    /// Size in bytes of uncompressed table of contents.
    pub toc_length_uncompressed: u64,

    /// Checksum algorithm used.
    pub checksum_algorithm_id: u32,
}

impl XarHeader {
    /// Decode and validate a header from the start of a reader.
    ///
    /// Fewer than 28 available bytes surface as an I/O error.
    pub fn from_reader(reader: &mut impl Read) -> XarResult<Self> {
        let header = reader.ioread_with::<XarHeader>(scroll::BE)?;
        header.validate()?;

        Ok(header)
    }

    /// Decode and validate a header from raw archive bytes.
    pub fn from_bytes(data: &[u8]) -> XarResult<Self> {
        let mut data = data;
        Self::from_reader(&mut data)
    }

    fn validate(&self) -> XarResult<()> {
        if self.magic != XAR_MAGIC {
            return Err(Error::InvalidFormat("bad magic"));
        }

        if self.size < XAR_HEADER_SIZE {
            return Err(Error::InvalidFormat("header size smaller than fixed header"));
        }

        if let XarChecksum::Other(id) = self.checksum() {
            return Err(Error::UnsupportedHashAlgorithm(id));
        }

        Ok(())
    }

    /// The checksum algorithm declared by this header.
    pub fn checksum(&self) -> XarChecksum {
        XarChecksum::from(self.checksum_algorithm_id)
    }

    /// Absolute offset of the first byte of the heap.
    pub fn heap_start_offset(&self) -> u64 {
        (self.size as u64).saturating_add(self.toc_length_compressed)
    }
}

/// Checksum format used in file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum XarChecksum {
    None,
    Sha1,
    Md5,
    Sha256,
    Sha512,
    Other(u32),
}

impl From<u32> for XarChecksum {
    fn from(i: u32) -> Self {
        match i {
            0 => Self::None,
            1 => Self::Sha1,
            2 => Self::Md5,
            3 => Self::Sha256,
            4 => Self::Sha512,
            _ => Self::Other(i),
        }
    }
}

impl From<XarChecksum> for u32 {
    fn from(checksum: XarChecksum) -> Self {
        match checksum {
            XarChecksum::None => 0,
            XarChecksum::Sha1 => 1,
            XarChecksum::Md5 => 2,
            XarChecksum::Sha256 => 3,
            XarChecksum::Sha512 => 4,
            XarChecksum::Other(i) => i,
        }
    }
}

impl Display for XarChecksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Sha1 => f.write_str("SHA-1"),
            Self::Md5 => f.write_str("MD5"),
            Self::Sha256 => f.write_str("SHA-256"),
            Self::Sha512 => f.write_str("SHA-512"),
            Self::Other(i) => write!(f, "unknown ({})", i),
        }
    }
}

impl XarChecksum {
    /// Obtain a fresh hasher for this algorithm.
    ///
    /// `None` means the archive declares no checksum.
    pub fn digester(&self) -> XarResult<Option<Box<dyn DynDigest>>> {
        Ok(match self {
            Self::None => None,
            Self::Sha1 => Some(Box::new(sha1::Sha1::default())),
            Self::Md5 => Some(Box::new(md5::Md5::default())),
            Self::Sha256 => Some(Box::new(sha2::Sha256::default())),
            Self::Sha512 => Some(Box::new(sha2::Sha512::default())),
            Self::Other(i) => return Err(Error::UnsupportedHashAlgorithm(*i)),
        })
    }
}

#[cfg(test)]
mod tests {
    use {super::*, scroll::IOwrite};

    fn header_bytes(magic: u32, size: u16, checksum: u32) -> Vec<u8> {
        let header = XarHeader {
            magic,
            size,
            version: 1,
            toc_length_compressed: 100,
            toc_length_uncompressed: 400,
            checksum_algorithm_id: checksum,
        };

        let mut buf = Vec::new();
        buf.iowrite_with(header, scroll::BE)
            .expect("header should serialize");
        assert_eq!(buf.len(), XAR_HEADER_SIZE as usize);

        buf
    }

    #[test]
    fn decode_big_endian_layout() -> XarResult<()> {
        let data = header_bytes(XAR_MAGIC, 28, 3);
        assert_eq!(&data[0..4], b"xar!");

        let header = XarHeader::from_bytes(&data)?;
        assert_eq!(header.size, 28);
        assert_eq!(header.version, 1);
        assert_eq!(header.toc_length_compressed, 100);
        assert_eq!(header.toc_length_uncompressed, 400);
        assert_eq!(header.checksum(), XarChecksum::Sha256);
        assert_eq!(header.heap_start_offset(), 128);

        Ok(())
    }

    #[test]
    fn every_known_algorithm_accepted() -> XarResult<()> {
        for id in 0..=4 {
            let header = XarHeader::from_bytes(&header_bytes(XAR_MAGIC, 28, id))?;
            assert_eq!(u32::from(header.checksum()), id);
            assert_eq!(header.checksum().digester()?.is_none(), id == 0);
        }

        Ok(())
    }

    #[test]
    fn bad_magic() {
        let res = XarHeader::from_bytes(&header_bytes(0x504b_0304, 28, 1));
        assert!(matches!(res, Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn unknown_algorithm() {
        let res = XarHeader::from_bytes(&header_bytes(XAR_MAGIC, 28, 7));
        assert!(matches!(res, Err(Error::UnsupportedHashAlgorithm(7))));
    }

    #[test]
    fn undersized_header_field() {
        let res = XarHeader::from_bytes(&header_bytes(XAR_MAGIC, 12, 1));
        assert!(matches!(res, Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn short_input() {
        for len in [0, 3, 4, 27] {
            let data = header_bytes(XAR_MAGIC, 28, 1);
            let res = XarHeader::from_bytes(&data[0..len]);
            assert!(matches!(res, Err(Error::Io(_))), "length {}", len);
        }
    }
}
