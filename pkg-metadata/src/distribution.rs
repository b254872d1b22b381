// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Distribution XML file format.
//!
//! See https://developer.apple.com/library/archive/documentation/DeveloperTools/Reference/DistributionDefinitionRef/Chapters/Distribution_XML_Ref.html
//! for Apple's documentation of this file format.
//!
//! Only the elements used to identify an installer are modeled. The root
//! element name is not checked.

use {
    crate::{Error, PkgResult},
    serde::Deserialize,
    std::io::Read,
    xar_archive::lenient_xml,
};

/// Represents a distribution XML file.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Distribution {
    pub title: Option<Title>,
    pub product: Option<Product>,
    #[serde(default)]
    pub pkg_ref: Vec<PkgRef>,
    /// `<bundle-version>` elements directly under the root.
    #[serde(default)]
    pub bundle_version: Vec<BundleVersion>,
    /// `<must-close>` elements directly under the root.
    #[serde(default)]
    pub must_close: Vec<MustClose>,
}

impl Distribution {
    /// Parse Distribution XML from a reader.
    pub fn from_reader(reader: impl Read) -> PkgResult<Self> {
        lenient_xml::from_reader(reader).map_err(Error::MalformedDistribution)
    }

    /// Parse Distribution XML from a string.
    pub fn from_xml(s: &str) -> PkgResult<Self> {
        Self::from_reader(s.as_bytes())
    }

    /// Human readable installer name.
    ///
    /// Resolved from, in order: the path of the first bundle of the first
    /// top-level `<bundle-version>`, `<title>`, the `<product>` id, the first
    /// `<pkg-ref>` id.
    pub fn installer_name(&self) -> String {
        first_non_empty(self, NAME_RULES)
    }

    /// Installer version.
    ///
    /// Resolved from the `<product>` version, then the first `<pkg-ref>` version.
    pub fn installer_version(&self) -> String {
        first_non_empty(self, VERSION_RULES)
    }

    /// Bundle identifier of the installed software.
    ///
    /// Resolved from, in order: the first app of the first top-level
    /// `<must-close>`, the `<product>` id, the first `<pkg-ref>` id.
    pub fn bundle_identifier(&self) -> String {
        first_non_empty(self, BUNDLE_IDENTIFIER_RULES)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct App {
    #[serde(default)]
    pub id: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Bundle {
    #[serde(default)]
    pub path: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct BundleVersion {
    #[serde(default)]
    pub bundle: Vec<Bundle>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MustClose {
    #[serde(default)]
    pub app: Vec<App>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PkgRef {
    #[serde(default)]
    pub id: String,
    pub version: Option<String>,
    #[serde(default, rename = "bundle-version")]
    pub bundle_version: Vec<BundleVersion>,
    #[serde(rename = "must-close")]
    pub must_close: Option<MustClose>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Title {
    #[serde(default, rename = "$value")]
    pub title: String,
}

/// Extracts a candidate value from a document, if the source node exists.
type Rule = fn(&Distribution) -> Option<&str>;

// Nested <pkg-ref> bundle-version and must-close elements are deliberately
// not consulted.
const NAME_RULES: &[Rule] = &[
    top_level_bundle_path,
    title,
    product_id,
    first_pkg_ref_id,
];
const VERSION_RULES: &[Rule] = &[product_version, first_pkg_ref_version];
const BUNDLE_IDENTIFIER_RULES: &[Rule] = &[top_level_must_close_app, product_id, first_pkg_ref_id];

fn top_level_bundle_path(d: &Distribution) -> Option<&str> {
    d.bundle_version
        .first()?
        .bundle
        .first()
        .map(|b| b.path.as_str())
}

fn top_level_must_close_app(d: &Distribution) -> Option<&str> {
    d.must_close.first()?.app.first().map(|a| a.id.as_str())
}

fn title(d: &Distribution) -> Option<&str> {
    d.title.as_ref().map(|t| t.title.as_str())
}

fn product_id(d: &Distribution) -> Option<&str> {
    d.product.as_ref().map(|p| p.id.as_str())
}

fn product_version(d: &Distribution) -> Option<&str> {
    d.product.as_ref().map(|p| p.version.as_str())
}

fn first_pkg_ref_id(d: &Distribution) -> Option<&str> {
    d.pkg_ref.first().map(|p| p.id.as_str())
}

fn first_pkg_ref_version(d: &Distribution) -> Option<&str> {
    d.pkg_ref.first()?.version.as_deref()
}

/// Evaluate rules in order, returning the first trimmed, non-empty value.
fn first_non_empty(d: &Distribution, rules: &[Rule]) -> String {
    rules
        .iter()
        .filter_map(|rule| rule(d))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .unwrap_or_default()
        .to_string()
}
