// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Installer metadata from Apple flat packages.
//!
//! Apple flat packages - often existing as `.pkg` files - are an installer
//! file format used by macOS. They are Apple-flavored XAR archives. See the
//! `xar-archive` crate for more on the container format.
//!
//! A *product* flat package has a `Distribution` XML file in the root of the
//! archive describing the installer: its title, product identifier and version,
//! the component packages it references, and the applications that must be
//! closed before installing. See [Distribution] for the Rust type modeling the
//! parts of this file we care about. See also
//! [Apple's XML documentation](https://developer.apple.com/library/archive/documentation/DeveloperTools/Reference/DistributionDefinitionRef/Chapters/Distribution_XML_Ref.html).
//!
//! [extract_metadata] derives a name, version, and bundle identifier from
//! that file without unpacking any payloads, plus a SHA-256 digest of the
//! whole package for content identity. *Component* packages have no
//! `Distribution` file and yield only the digest.

pub mod distribution;
pub use distribution::Distribution;
pub mod metadata;
pub use metadata::{extract_metadata, InstallerMetadata};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("xar error: {0}")]
    Xar(#[from] xar_archive::Error),

    #[error("malformed Distribution XML: {0}")]
    MalformedDistribution(serde_xml_rs::Error),
}

/// Result type for this crate.
pub type PkgResult<T> = std::result::Result<T, Error>;
