// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    crate::{
        format::XarHeader,
        hashing::DigestingReader,
        table_of_contents::{File, HeapEncoding, Signature, TableOfContents},
        Error, XarResult,
    },
    log::{debug, warn},
    std::{
        cmp::min,
        fmt::Debug,
        io::{Read, Seek, SeekFrom},
    },
};

/// Upper bound for buffer preallocation driven by sizes declared in the archive.
const MAX_PREALLOCATION: u64 = 16 * 1024 * 1024;

/// Read-only interface to a single XAR archive.
#[derive(Debug)]
pub struct XarReader<R: Read + Seek + Sized + Debug> {
    /// Reader of raw XAR archive content.
    reader: R,

    /// Parsed file header.
    header: XarHeader,

    /// Parsed table of contents.
    toc: TableOfContents,

    /// Absolute offset within the reader where the heap begins.
    heap_start_offset: u64,

    /// Total length of the archive.
    archive_length: u64,

    /// Digest of the compressed table of contents, if computed.
    toc_digest: Option<Vec<u8>>,
}

impl<R: Read + Seek + Sized + Debug> XarReader<R> {
    /// Construct a new XAR reader from a stream reader.
    pub fn new(reader: R) -> XarResult<Self> {
        Self::open(reader, false)
    }

    /// Construct a new XAR reader, digesting the compressed table of contents.
    ///
    /// The digest uses the algorithm declared in the header and covers exactly
    /// the compressed table of contents bytes, which is what a signer signs.
    pub fn new_with_toc_digest(reader: R) -> XarResult<Self> {
        Self::open(reader, true)
    }

    fn open(mut reader: R, digest_toc: bool) -> XarResult<Self> {
        let archive_length = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let header = XarHeader::from_reader(&mut reader)?;
        debug!(
            "XAR version {}; header {} bytes; table of contents {} bytes compressed, {} bytes decompressed; checksum {}",
            header.version,
            header.size,
            header.toc_length_compressed,
            header.toc_length_uncompressed,
            header.checksum()
        );

        // Newer header versions may carry fields beyond the ones we decode.
        reader.seek(SeekFrom::Start(header.size as u64))?;

        let hasher = if digest_toc {
            header.checksum().digester()?
        } else {
            None
        };

        // The zlib compressed table of contents follows the header. It is
        // decompressed into memory since the XML deserializer consumes its
        // source and we still need the archive reader afterwards.
        let toc_reader = DigestingReader::new(reader.take(header.toc_length_compressed), hasher);
        let mut toc_reader = flate2::read::ZlibDecoder::new(toc_reader);

        let mut toc_data = Vec::with_capacity(min(header.toc_length_uncompressed, MAX_PREALLOCATION) as _);
        toc_reader
            .read_to_end(&mut toc_data)
            .map_err(|e| Error::CorruptTableOfContents("zlib decompression failed", Some(e)))?;

        // The decompressor may stop short of the declared length. Consume the
        // remainder so the digest covers the full region.
        let mut toc_reader = toc_reader.into_inner();
        std::io::copy(&mut toc_reader, &mut std::io::sink())?;

        if toc_reader.bytes_read() < header.toc_length_compressed {
            return Err(Error::CorruptTableOfContents(
                "archive ends inside table of contents",
                None,
            ));
        }
        if toc_data.is_empty() {
            return Err(Error::CorruptTableOfContents("empty table of contents", None));
        }
        if toc_data.len() as u64 != header.toc_length_uncompressed {
            warn!(
                "table of contents decompressed to {} bytes; header declares {}",
                toc_data.len(),
                header.toc_length_uncompressed
            );
        }

        let (toc_reader, toc_digest) = toc_reader.finalize();
        let reader = toc_reader.into_inner();

        let toc = TableOfContents::from_reader(toc_data.as_slice())?;

        Ok(Self {
            reader,
            header,
            toc,
            heap_start_offset: header.heap_start_offset(),
            archive_length,
            toc_digest,
        })
    }

    /// Obtain the inner reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Obtain the parsed [XarHeader] file header.
    pub fn header(&self) -> &XarHeader {
        &self.header
    }

    /// The start offset of the heap.
    pub fn heap_start_offset(&self) -> u64 {
        self.heap_start_offset
    }

    /// Number of bytes available in the heap.
    pub fn heap_length(&self) -> u64 {
        self.archive_length.saturating_sub(self.heap_start_offset)
    }

    /// Obtain the table of contents for this archive.
    pub fn table_of_contents(&self) -> &TableOfContents {
        &self.toc
    }

    /// Digest of the compressed table of contents.
    ///
    /// Only available when constructed via [Self::new_with_toc_digest] and the
    /// archive declares a checksum algorithm.
    pub fn toc_digest(&self) -> Option<&[u8]> {
        self.toc_digest.as_deref()
    }

    /// Whether the table of contents declares a signature.
    pub fn is_signed(&self) -> bool {
        self.toc.is_signed()
    }

    /// Signature entries declared by the table of contents, RSA first.
    pub fn signatures(&self) -> Vec<&Signature> {
        self.toc.signatures()
    }

    /// Obtain the file entries in this archive.
    pub fn files(&self) -> Vec<(String, File)> {
        self.toc.files()
    }

    /// Attempt to find the [File] entry for a given path in the archive.
    ///
    /// Paths are matched case-sensitively.
    pub fn find_file(&self, filename: &str) -> Option<File> {
        self.toc
            .files()
            .into_iter()
            .find_map(|(path, file)| if path == filename { Some(file) } else { None })
    }

    /// Read a slice of the heap.
    fn heap_slice(&mut self, offset: u64, length: u64) -> XarResult<Vec<u8>> {
        let available = self.heap_length();

        match offset.checked_add(length) {
            Some(end) if end <= available => {}
            _ => {
                return Err(Error::TruncatedArchive {
                    offset,
                    length,
                    available,
                });
            }
        }

        self.reader
            .seek(SeekFrom::Start(self.heap_start_offset + offset))?;

        let mut buffer = Vec::with_capacity(length as _);
        (&mut self.reader).take(length).read_to_end(&mut buffer)?;

        if buffer.len() as u64 != length {
            return Err(Error::TruncatedArchive {
                offset,
                length,
                available: buffer.len() as _,
            });
        }

        Ok(buffer)
    }

    /// Obtain heap file data for a given file record.
    ///
    /// This is the raw data backing a file as stored in the heap.
    /// There's a good chance the raw data is encoded/compressed.
    pub fn file_data_heap(&mut self, file: &File) -> XarResult<Vec<u8>> {
        let data = file
            .data
            .as_ref()
            .ok_or_else(|| Error::FileNoData(file.name().unwrap_or_default().to_string()))?;

        self.heap_slice(data.offset, data.length)
    }

    /// Obtain decoded file data for a given file record.
    ///
    /// The heap data is decoded according to the file's encoding style.
    /// Unrecognized styles are passed through as if they were stored.
    pub fn file_data_decoded(&mut self, file: &File) -> XarResult<Vec<u8>> {
        let data = file
            .data
            .as_ref()
            .ok_or_else(|| Error::FileNoData(file.name().unwrap_or_default().to_string()))?;

        let stored = self.heap_slice(data.offset, data.length)?;
        let encoding = data.heap_encoding();

        debug!(
            "decoding {} with {} codec ({} bytes stored, {} bytes expected)",
            file.name().unwrap_or_default(),
            encoding,
            data.length,
            data.size
        );

        let mut decoder: Box<dyn Read + '_> = match &encoding {
            HeapEncoding::None => return Ok(stored),
            HeapEncoding::Unknown(style) => {
                warn!(
                    "unrecognized encoding {} for {}; treating data as stored",
                    style,
                    file.name().unwrap_or_default()
                );
                return Ok(stored);
            }
            // The media type is arguably wrong, as there is no gzip header.
            HeapEncoding::Zlib => Box::new(flate2::read::ZlibDecoder::new(stored.as_slice())),
            HeapEncoding::Bzip2 => Box::new(bzip2::read::BzDecoder::new(stored.as_slice())),
        };

        let mut decoded = Vec::with_capacity(min(data.size, MAX_PREALLOCATION) as _);
        decoder.read_to_end(&mut decoded).map_err(|source| Error::UnsupportedEncoding {
            style: data.encoding_style().to_string(),
            source,
        })?;

        if decoded.len() as u64 != data.size {
            warn!(
                "{} decoded to {} bytes; table of contents declares {}",
                file.name().unwrap_or_default(),
                decoded.len(),
                data.size
            );
        }

        Ok(decoded)
    }

    /// Resolve decoded data for a given path.
    pub fn get_file_data_from_path(&mut self, path: &str) -> XarResult<Option<Vec<u8>>> {
        if let Some(file) = self.find_file(path) {
            Ok(Some(self.file_data_decoded(&file)?))
        } else {
            Ok(None)
        }
    }

    /// Compare the checksum stored in the heap against the computed digest.
    ///
    /// Returns `None` when no digest was computed or the table of contents
    /// declares no checksum. This says nothing about signature validity.
    pub fn verify_toc_checksum(&mut self) -> XarResult<Option<bool>> {
        let (offset, size) = match (&self.toc_digest, &self.toc.checksum) {
            (Some(_), Some(checksum)) => (checksum.offset, checksum.size),
            _ => return Ok(None),
        };

        let stored = self.heap_slice(offset, size)?;

        Ok(Some(self.toc_digest.as_deref() == Some(stored.as_slice())))
    }
}
