// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! XAR XML table of contents data structure.
//!
//! Only the subset of the table of contents needed to locate file data and
//! detect signatures is modeled. Everything else is skipped during parsing.

use {
    crate::{lenient_xml, Error, XarResult},
    log::warn,
    serde::Deserialize,
    std::{
        fmt::{Display, Formatter},
        io::Read,
        ops::Deref,
    },
};

/// An XML table of contents in a XAR file.
#[derive(Clone, Debug, Deserialize)]
pub struct TableOfContents {
    toc: XarToC,
}

impl Deref for TableOfContents {
    type Target = XarToC;

    fn deref(&self) -> &Self::Target {
        &self.toc
    }
}

impl TableOfContents {
    /// Parse XML table of contents from a reader.
    pub fn from_reader(reader: impl Read) -> XarResult<Self> {
        lenient_xml::from_reader(reader).map_err(|e| Error::MalformedXml("table of contents", e))
    }

    /// Resolve the complete list of files.
    ///
    /// Files are sorted by their numerical ID, which should hopefully also
    /// be the order that file data occurs in the heap. Each elements consists of
    /// the full filename and the <file> record. Entries without a name, and
    /// everything beneath them, are left out since no path can address them.
    pub fn files(&self) -> Vec<(String, File)> {
        let mut files = self
            .toc
            .files
            .iter()
            .flat_map(|f| f.files(None))
            .collect::<Vec<_>>();

        files.sort_by(|a, b| a.1.id.cmp(&b.1.id));

        files
    }
}

/// The main data structure inside a table of contents.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct XarToC {
    pub creation_time: Option<String>,
    pub checksum: Option<Checksum>,
    #[serde(default, rename = "file")]
    pub files: Vec<File>,
    pub signature: Option<Signature>,
    pub x_signature: Option<Signature>,
}

impl XarToC {
    /// Signatures present in the table of contents.
    pub fn signatures(&self) -> Vec<&Signature> {
        let mut res = vec![];
        if let Some(sig) = &self.signature {
            res.push(sig);
        }
        if let Some(sig) = &self.x_signature {
            res.push(sig);
        }

        res
    }

    /// Whether a `<signature>` or `<x-signature>` element is present.
    pub fn is_signed(&self) -> bool {
        self.signature.is_some() || self.x_signature.is_some()
    }
}

/// Location within the heap of the table of contents digest.
#[derive(Clone, Debug, Deserialize)]
pub struct Checksum {
    /// The digest format used.
    pub style: Option<String>,

    /// Offset within heap of the checksum data.
    #[serde(default)]
    pub offset: u64,

    /// Size of checksum data.
    #[serde(default)]
    pub size: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct File {
    #[serde(default)]
    pub id: u64,
    /// Filename.
    ///
    /// There should only be a single element. However, some Apple tools can
    /// emit multiple <name> elements.
    #[serde(default, rename = "name")]
    pub names: Vec<String>,
    #[serde(rename = "type")]
    pub file_type: Option<String>,
    pub size: Option<u64>,
    pub data: Option<FileData>,
    #[serde(default, rename = "file")]
    pub files: Vec<File>,
}

impl File {
    /// The name of this entry, without any parent directories.
    pub fn name(&self) -> Option<&str> {
        self.names
            .last()
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn files(&self, directory: Option<&str>) -> Vec<(String, File)> {
        let name = if let Some(name) = self.name() {
            name
        } else {
            warn!("ignoring file {} without a name", self.id);
            return vec![];
        };

        let full_path = if let Some(d) = directory {
            format!("{}/{}", d, name)
        } else {
            name.to_string()
        };

        let mut files = vec![(full_path.clone(), self.clone())];

        for f in &self.files {
            files.extend(f.files(Some(&full_path)));
        }

        files
    }
}

/// Describes where a file's data lives in the heap.
#[derive(Clone, Debug, Deserialize)]
pub struct FileData {
    /// Offset relative to the start of the heap.
    #[serde(default)]
    pub offset: u64,
    /// Size of the data once decoded.
    #[serde(default)]
    pub size: u64,
    /// Size of the data as stored in the heap.
    #[serde(default)]
    pub length: u64,
    pub encoding: Option<FileEncoding>,
}

impl FileData {
    /// The encoding style string, or an empty string if absent.
    pub fn encoding_style(&self) -> &str {
        self.encoding
            .as_ref()
            .map(|e| e.style.as_str())
            .unwrap_or_default()
    }

    /// Resolve the codec to apply to stored bytes.
    pub fn heap_encoding(&self) -> HeapEncoding {
        HeapEncoding::from_style(self.encoding_style())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct FileEncoding {
    #[serde(default)]
    pub style: String,
}

/// Codec applied to file data stored in the heap.
///
/// Derived from the free-form encoding style (normally a MIME type) by
/// substring matching.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HeapEncoding {
    /// Stored as-is (`application/octet-stream` or no encoding element).
    None,
    /// zlib. Labeled `application/x-gzip` even though no gzip header is present.
    Zlib,
    /// bzip2.
    Bzip2,
    /// Unrecognized style. Data is passed through untouched.
    Unknown(String),
}

impl HeapEncoding {
    pub fn from_style(style: &str) -> Self {
        if style.contains("x-gzip") {
            Self::Zlib
        } else if style.contains("x-bzip2") {
            Self::Bzip2
        } else if style.is_empty() || style.contains("octet-stream") {
            Self::None
        } else {
            Self::Unknown(style.to_string())
        }
    }
}

impl Display for HeapEncoding {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("stored"),
            Self::Zlib => f.write_str("zlib"),
            Self::Bzip2 => f.write_str("bzip2"),
            Self::Unknown(style) => write!(f, "unknown ({})", style),
        }
    }
}

/// A signature element. Only its presence and declared style are retained.
#[derive(Clone, Debug, Deserialize)]
pub struct Signature {
    pub style: Option<String>,
}

impl Display for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.style.as_deref().unwrap_or("unspecified"))
    }
}
