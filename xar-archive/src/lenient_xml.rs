// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Forgiving XML deserialization.
//!
//! Archives in the wild are produced by a variety of tools, not all of which
//! emit pristine XML. Unknown elements and attributes are skipped. Entity
//! references the document never declares are registered with the parser as
//! [UNKNOWN_ENTITY_REPLACEMENT] and the document is parsed again, so they
//! never abort parsing.

use {
    log::debug,
    serde::de::DeserializeOwned,
    std::io::Read,
    xml::reader::{EventReader, ParserConfig},
};

/// Text substituted for entity references the parser does not know.
pub const UNKNOWN_ENTITY_REPLACEMENT: &str = "\u{fffd}";

/// Upper bound on distinct undeclared entities tolerated in one document.
const MAX_UNKNOWN_ENTITIES: usize = 64;

/// Message xml-rs reports for an entity reference it cannot resolve.
const UNKNOWN_ENTITY_MESSAGE: &str = "Unexpected entity: ";

/// Obtain the parser configuration used for all archive XML documents.
pub fn parser_config() -> ParserConfig {
    ParserConfig::new()
        .trim_whitespace(true)
        .whitespace_to_characters(true)
        .cdata_to_characters(true)
        .ignore_comments(true)
        .coalesce_characters(true)
        .replace_unknown_entity_references(true)
}

/// Construct a deserializer over a reader using the given parser configuration.
///
/// Repeated elements need not be adjacent to be collected into a `Vec`.
pub fn deserializer<R: Read>(reader: R, config: ParserConfig) -> serde_xml_rs::Deserializer<R> {
    serde_xml_rs::Deserializer::new(EventReader::new_with_config(reader, config))
        .non_contiguous_seq_elements(true)
}

/// The name of the undeclared entity a parse failed on, if that is why it failed.
fn unknown_entity(err: &serde_xml_rs::Error) -> Option<String> {
    let message = err.to_string();
    let (_, name) = message.rsplit_once(UNKNOWN_ENTITY_MESSAGE)?;
    let name = name.trim();

    if name.is_empty()
        || name.contains(|c: char| c.is_whitespace() || matches!(c, '&' | ';' | '<' | '>'))
    {
        None
    } else {
        Some(name.to_string())
    }
}

/// Deserialize a value from in-memory XML data.
pub fn from_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, serde_xml_rs::Error> {
    let mut entities: Vec<String> = vec![];

    loop {
        let config = entities.iter().fold(parser_config(), |config, name| {
            config.add_entity(name.as_str(), UNKNOWN_ENTITY_REPLACEMENT)
        });

        let err = match T::deserialize(&mut deserializer(data, config)) {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        match unknown_entity(&err) {
            Some(name)
                if entities.len() < MAX_UNKNOWN_ENTITIES && !entities.contains(&name) =>
            {
                debug!("substituting undeclared entity &{};", name);
                entities.push(name);
            }
            _ => return Err(err),
        }
    }
}

/// Deserialize a value from XML data.
///
/// The reader is consumed in full before parsing.
pub fn from_reader<T: DeserializeOwned>(mut reader: impl Read) -> Result<T, serde_xml_rs::Error> {
    let mut data = vec![];
    reader.read_to_end(&mut data)?;

    from_slice(&data)
}

#[cfg(test)]
mod tests {
    use {super::*, serde::Deserialize};

    #[derive(Debug, Deserialize)]
    struct Doc {
        #[serde(default)]
        item: Vec<Item>,
        #[serde(default)]
        label: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    struct Item {
        id: String,
    }

    #[test]
    fn unknown_entity_tolerated() -> Result<(), serde_xml_rs::Error> {
        let doc: Doc = from_reader(
            br#"<doc><label>Fish &amp; Chips &trade;</label><item id="a"/></doc>"#.as_ref(),
        )?;

        assert_eq!(doc.item.len(), 1);
        let label = doc.label.unwrap_or_default();
        assert!(label.starts_with("Fish & Chips"));
        assert!(label.ends_with(UNKNOWN_ENTITY_REPLACEMENT));

        Ok(())
    }

    #[test]
    fn unknown_entities_everywhere() -> Result<(), serde_xml_rs::Error> {
        let doc: Doc = from_slice(
            indoc::indoc! {r#"
                <doc>
                    <label>&copy; 2023 &foo; &foo; &lt;b&gt;</label>
                    <item id="a&nbsp;b"/>
                    <item id="&#x41;"/>
                </doc>
            "#}
            .as_bytes(),
        )?;

        assert_eq!(
            doc.label.as_deref(),
            Some("\u{fffd} 2023 \u{fffd} \u{fffd} <b>")
        );
        assert_eq!(
            doc.item.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
            vec!["a\u{fffd}b", "A"]
        );

        Ok(())
    }

    #[test]
    fn unknown_entity_limit() {
        let label = (0..=MAX_UNKNOWN_ENTITIES)
            .map(|i| format!("&e{};", i))
            .collect::<String>();
        let xml = format!("<doc><label>{}</label></doc>", label);

        assert!(from_slice::<Doc>(xml.as_bytes()).is_err());
    }

    #[test]
    fn interleaved_sequences_and_unknown_elements() -> Result<(), serde_xml_rs::Error> {
        let doc: Doc = from_reader(
            indoc::indoc! {r#"
                <doc>
                    <item id="a"/>
                    <other><item id="nested"/></other>
                    <!-- comment -->
                    <item id="b"/>
                </doc>
            "#}
            .as_bytes(),
        )?;

        assert_eq!(
            doc.item.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert!(doc.label.is_none());

        Ok(())
    }

    #[test]
    fn mismatched_tags_rejected() {
        let res = from_reader::<Doc>(b"<doc><item id=\"a\"></doc>".as_ref());
        assert!(res.is_err());
    }
}
