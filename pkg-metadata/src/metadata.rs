// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Extraction of installer metadata for cataloging.

use {
    crate::{distribution::Distribution, PkgResult},
    log::debug,
    serde::{Serialize, Serializer},
    sha2::Sha256,
    std::io::{Cursor, Read},
    xar_archive::{hashing::DigestingReader, XarReader},
};

/// Name of the XAR entry describing a product installer.
pub const DISTRIBUTION_FILENAME: &str = "Distribution";

/// Identifying metadata of an installer package.
///
/// Fields that could not be determined are empty strings.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct InstallerMetadata {
    name: String,
    version: String,
    bundle_identifier: String,
    #[serde(serialize_with = "serialize_hex")]
    sha256: Vec<u8>,
}

fn serialize_hex<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(value))
}

impl InstallerMetadata {
    /// Construct an instance from a parsed `Distribution` file.
    pub fn from_distribution(distribution: &Distribution, sha256: Vec<u8>) -> Self {
        Self {
            name: distribution.installer_name(),
            version: distribution.installer_version(),
            bundle_identifier: distribution.bundle_identifier(),
            sha256,
        }
    }

    /// Installer name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Installer version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Bundle identifier of the installed software.
    pub fn bundle_identifier(&self) -> &str {
        &self.bundle_identifier
    }

    /// SHA-256 digest of the entire package.
    pub fn sha256(&self) -> &[u8] {
        &self.sha256
    }

    /// SHA-256 digest of the entire package, as lowercase hex.
    pub fn sha256_hex(&self) -> String {
        hex::encode(&self.sha256)
    }
}

/// Extract installer metadata from a flat package.
///
/// The whole stream is consumed and digested. Archives lacking a
/// `Distribution` file are not an error: they yield empty fields alongside
/// the digest.
pub fn extract_metadata(reader: impl Read) -> PkgResult<InstallerMetadata> {
    let mut reader = DigestingReader::new(reader, Some(Box::new(Sha256::default())));

    // The heap is addressed relative to the end of the table of contents, so
    // the archive must be seekable.
    let mut data = vec![];
    reader.read_to_end(&mut data)?;
    let (_, sha256) = reader.finalize();
    let sha256 = sha256.unwrap_or_default();

    let mut xar = XarReader::new(Cursor::new(data))?;

    let file = match xar.find_file(DISTRIBUTION_FILENAME) {
        Some(file) => file,
        None => {
            debug!("no {} file; returning digest only", DISTRIBUTION_FILENAME);
            return Ok(InstallerMetadata {
                sha256,
                ..Default::default()
            });
        }
    };

    let xml = xar.file_data_decoded(&file)?;
    let distribution = Distribution::from_reader(xml.as_slice())?;

    let metadata = InstallerMetadata::from_distribution(&distribution, sha256);
    debug!(
        "resolved name={:?} version={:?} bundle_identifier={:?}",
        metadata.name, metadata.version, metadata.bundle_identifier
    );

    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::Error,
        sha2::Digest,
        xar_archive::{format::XarChecksum, testutil::ArchiveBuilder},
    };

    const DISTRIBUTION: &str = indoc::indoc! {r#"
        <?xml version="1.0" encoding="utf-8"?>
        <installer-gui-script minSpecVersion="1">
            <title>Example App</title>
            <pkg-ref id="com.example.app.pkg" version="2.4.0">#app.pkg</pkg-ref>
            <product id="com.example.app.product" version="2.4.1"/>
            <must-close>
                <app id="com.example.app"/>
            </must-close>
        </installer-gui-script>
    "#};

    fn sha256(data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }

    #[test]
    fn component_package_digest_only() -> PkgResult<()> {
        let data = ArchiveBuilder::default()
            .file_bzip2("Payload", b"cpio data")
            .file_stored("PackageInfo", b"<pkg-info/>")
            .build();

        let metadata = extract_metadata(data.as_slice())?;
        assert_eq!(metadata.name(), "");
        assert_eq!(metadata.version(), "");
        assert_eq!(metadata.bundle_identifier(), "");
        assert_eq!(metadata.sha256(), sha256(&data));
        assert_eq!(metadata.sha256().len(), 32);

        Ok(())
    }

    #[test]
    fn product_package_each_codec() -> PkgResult<()> {
        let builders = [
            ArchiveBuilder::default().file_zlib(DISTRIBUTION_FILENAME, DISTRIBUTION.as_bytes()),
            ArchiveBuilder::default()
                .checksum(XarChecksum::Sha256)
                .signature("x-signature")
                .file_bzip2(DISTRIBUTION_FILENAME, DISTRIBUTION.as_bytes()),
            ArchiveBuilder::default()
                .checksum(XarChecksum::None)
                .file_stored("Resources/en.lproj/License.rtf", b"{\\rtf1}")
                .file_stored(DISTRIBUTION_FILENAME, DISTRIBUTION.as_bytes()),
        ];

        for builder in builders {
            let data = builder.build();
            let metadata = extract_metadata(data.as_slice())?;

            assert_eq!(metadata.name(), "Example App");
            assert_eq!(metadata.version(), "2.4.1");
            assert_eq!(metadata.bundle_identifier(), "com.example.app");
            assert_eq!(metadata.sha256(), sha256(&data));
        }

        Ok(())
    }

    #[test]
    fn distribution_name_is_case_sensitive() -> PkgResult<()> {
        let data = ArchiveBuilder::default()
            .file_zlib("distribution", DISTRIBUTION.as_bytes())
            .build();

        assert_eq!(extract_metadata(data.as_slice())?.name(), "");

        Ok(())
    }

    #[test]
    fn repeated_extraction_identical() -> PkgResult<()> {
        let data = ArchiveBuilder::default()
            .file_zlib(DISTRIBUTION_FILENAME, DISTRIBUTION.as_bytes())
            .build();

        assert_eq!(
            extract_metadata(data.as_slice())?,
            extract_metadata(data.as_slice())?
        );

        Ok(())
    }

    #[test]
    fn serialize_json() -> PkgResult<()> {
        let data = ArchiveBuilder::default()
            .file_zlib(DISTRIBUTION_FILENAME, DISTRIBUTION.as_bytes())
            .build();
        let metadata = extract_metadata(data.as_slice())?;

        let value = serde_json::to_value(&metadata).expect("serialization should succeed");
        assert_eq!(value["name"], "Example App");
        assert_eq!(value["bundle_identifier"], "com.example.app");
        assert_eq!(value["sha256"], hex::encode(sha256(&data)));
        assert_eq!(metadata.sha256_hex(), hex::encode(sha256(&data)));

        Ok(())
    }

    #[test]
    fn not_xar() {
        let data = b"\x1f\x8b\x08\x00 this is a tarball, honest".repeat(4);

        assert!(matches!(
            extract_metadata(data.as_slice()),
            Err(Error::Xar(xar_archive::Error::InvalidFormat(_)))
        ));
    }

    #[test]
    fn shorter_than_header() {
        let data = ArchiveBuilder::default().build();

        for len in [0, 10, 27] {
            assert!(matches!(
                extract_metadata(&data[0..len]),
                Err(Error::Xar(xar_archive::Error::Io(_)))
            ));
        }
    }

    #[test]
    fn malformed_distribution() {
        let data = ArchiveBuilder::default()
            .file_zlib(DISTRIBUTION_FILENAME, b"<installer-gui-script><title>")
            .build();

        assert!(matches!(
            extract_metadata(data.as_slice()),
            Err(Error::MalformedDistribution(_))
        ));
    }

    #[test]
    fn distribution_beyond_heap() {
        let mut data = ArchiveBuilder::default()
            .file_stored(DISTRIBUTION_FILENAME, DISTRIBUTION.as_bytes())
            .build();
        data.truncate(data.len() - 10);

        assert!(matches!(
            extract_metadata(data.as_slice()),
            Err(Error::Xar(xar_archive::Error::TruncatedArchive { .. }))
        ));
    }

    #[test]
    fn distribution_broken_codec() {
        let data = ArchiveBuilder::default()
            .file_raw(
                DISTRIBUTION_FILENAME,
                b"garbage".to_vec(),
                500,
                Some("application/x-bzip2"),
            )
            .build();

        assert!(matches!(
            extract_metadata(data.as_slice()),
            Err(Error::Xar(xar_archive::Error::UnsupportedEncoding { .. }))
        ));
    }

    #[test]
    fn corrupt_table_of_contents() {
        let data = ArchiveBuilder::default()
            .file_zlib(DISTRIBUTION_FILENAME, DISTRIBUTION.as_bytes())
            .build();

        let res = extract_metadata(&data[0..50]);
        assert!(matches!(
            res,
            Err(Error::Xar(xar_archive::Error::CorruptTableOfContents(..)))
        ));
    }

    #[test]
    fn undeclared_entities_in_distribution() -> PkgResult<()> {
        let xml = indoc::indoc! {r#"
            <installer-gui-script minSpecVersion="1">
                <title>Example&trade; App &amp; Tools</title>
                <product id="com.example.app" version="3.0&nbsp;beta"/>
            </installer-gui-script>
        "#};
        let data = ArchiveBuilder::default()
            .file_zlib(DISTRIBUTION_FILENAME, xml.as_bytes())
            .build();

        let metadata = extract_metadata(data.as_slice())?;
        assert_eq!(metadata.name(), "Example\u{fffd} App & Tools");
        assert_eq!(metadata.version(), "3.0\u{fffd}beta");
        assert_eq!(metadata.bundle_identifier(), "com.example.app");

        Ok(())
    }

    #[test]
    fn nameless_entry_alongside_distribution() -> PkgResult<()> {
        let data = ArchiveBuilder::default()
            .file_stored("", b"anonymous")
            .file_zlib(DISTRIBUTION_FILENAME, DISTRIBUTION.as_bytes())
            .build();

        assert_eq!(extract_metadata(data.as_slice())?.name(), "Example App");

        Ok(())
    }
}
