// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Synthesis of small XAR archives for tests.

use {
    crate::format::{XarChecksum, XarHeader, XAR_HEADER_SIZE, XAR_MAGIC},
    flate2::{write::ZlibEncoder, Compression},
    scroll::IOwrite,
    std::{fmt::Write as _, io::Write},
};

/// Size of the zeroed placeholder written to the heap for a signature.
pub const SIGNATURE_SIZE: usize = 256;

/// Compress data with zlib, as done for the table of contents and `x-gzip` entries.
pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("zlib write should succeed");
    encoder.finish().expect("zlib finish should succeed")
}

/// Compress data with bzip2.
pub fn bzip2(data: &[u8]) -> Vec<u8> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(data).expect("bzip2 write should succeed");
    encoder.finish().expect("bzip2 finish should succeed")
}

/// Serialize a header followed by table of contents and heap bytes.
pub fn assemble(header: XarHeader, toc: &[u8], heap: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.iowrite_with(header, scroll::BE)
        .expect("header write should succeed");
    out.extend_from_slice(toc);
    out.extend_from_slice(heap);

    out
}

struct Entry {
    name: String,
    stored: Vec<u8>,
    size: u64,
    style: Option<String>,
}

/// Builds a XAR archive with a flat list of files.
///
/// Heap layout is: table of contents checksum (unless the checksum
/// algorithm is none), signature placeholder (if requested), then file data
/// in insertion order.
pub struct ArchiveBuilder {
    checksum: XarChecksum,
    signature_element: Option<&'static str>,
    entries: Vec<Entry>,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self {
            checksum: XarChecksum::Sha1,
            signature_element: None,
            entries: vec![],
        }
    }
}

impl ArchiveBuilder {
    pub fn checksum(mut self, checksum: XarChecksum) -> Self {
        self.checksum = checksum;
        self
    }

    /// Declare a signature using the given element name (`signature` or `x-signature`).
    pub fn signature(mut self, element: &'static str) -> Self {
        self.signature_element = Some(element);
        self
    }

    /// Add a file with explicit stored bytes and encoding style.
    pub fn file_raw(
        mut self,
        name: &str,
        stored: Vec<u8>,
        size: u64,
        style: Option<&str>,
    ) -> Self {
        self.entries.push(Entry {
            name: name.to_string(),
            stored,
            size,
            style: style.map(|s| s.to_string()),
        });
        self
    }

    pub fn file_stored(self, name: &str, data: &[u8]) -> Self {
        self.file_raw(
            name,
            data.to_vec(),
            data.len() as _,
            Some("application/octet-stream"),
        )
    }

    pub fn file_zlib(self, name: &str, data: &[u8]) -> Self {
        self.file_raw(name, zlib(data), data.len() as _, Some("application/x-gzip"))
    }

    pub fn file_bzip2(self, name: &str, data: &[u8]) -> Self {
        self.file_raw(
            name,
            bzip2(data),
            data.len() as _,
            Some("application/x-bzip2"),
        )
    }

    fn checksum_size(&self) -> usize {
        self.checksum
            .digester()
            .expect("checksum algorithm should be known")
            .map(|d| d.output_size())
            .unwrap_or(0)
    }

    /// Render the XML table of contents.
    pub fn toc_xml(&self) -> String {
        let checksum_size = self.checksum_size();
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<xar>\n<toc>\n");
        xml.push_str("<creation-time>2023-05-01T10:00:00</creation-time>\n");

        let mut offset = 0;
        if checksum_size > 0 {
            let style = match self.checksum {
                XarChecksum::Md5 => "md5",
                XarChecksum::Sha256 => "sha256",
                XarChecksum::Sha512 => "sha512",
                _ => "sha1",
            };
            writeln!(
                xml,
                "<checksum style=\"{}\"><offset>0</offset><size>{}</size></checksum>",
                style, checksum_size
            )
            .expect("string write should succeed");
            offset += checksum_size;
        }

        if let Some(element) = self.signature_element {
            writeln!(
                xml,
                "<{el} style=\"RSA\"><offset>{}</offset><size>{}</size>\
                 <KeyInfo xmlns=\"http://www.w3.org/2000/09/xmldsig#\"><X509Data>\
                 <X509Certificate>MIIB</X509Certificate></X509Data></KeyInfo></{el}>",
                offset,
                SIGNATURE_SIZE,
                el = element
            )
            .expect("string write should succeed");
            offset += SIGNATURE_SIZE;
        }

        for (i, entry) in self.entries.iter().enumerate() {
            let encoding = entry
                .style
                .as_ref()
                .map(|s| format!("<encoding style=\"{}\"/>", s))
                .unwrap_or_default();

            writeln!(
                xml,
                "<file id=\"{}\"><name>{}</name><type>file</type><data>\
                 <length>{}</length><offset>{}</offset><size>{}</size>{}</data></file>",
                i + 1,
                entry.name,
                entry.stored.len(),
                offset,
                entry.size,
                encoding
            )
            .expect("string write should succeed");
            offset += entry.stored.len();
        }

        xml.push_str("</toc>\n</xar>\n");

        xml
    }

    /// Produce the header, compressed table of contents, and heap.
    pub fn parts(&self) -> (XarHeader, Vec<u8>, Vec<u8>) {
        let xml = self.toc_xml();
        let toc = zlib(xml.as_bytes());

        let mut heap = vec![];
        if let Some(mut digester) = self
            .checksum
            .digester()
            .expect("checksum algorithm should be known")
        {
            digester.update(&toc);
            heap.extend_from_slice(&digester.finalize());
        }
        if self.signature_element.is_some() {
            heap.extend_from_slice(&[0u8; SIGNATURE_SIZE]);
        }
        for entry in &self.entries {
            heap.extend_from_slice(&entry.stored);
        }

        let header = XarHeader {
            magic: XAR_MAGIC,
            size: XAR_HEADER_SIZE,
            version: 1,
            toc_length_compressed: toc.len() as _,
            toc_length_uncompressed: xml.len() as _,
            checksum_algorithm_id: self.checksum.into(),
        };

        (header, toc, heap)
    }

    /// Produce the complete archive.
    pub fn build(&self) -> Vec<u8> {
        let (header, toc, heap) = self.parts();

        assemble(header, &toc, &heap)
    }
}
