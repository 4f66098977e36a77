//! Metadata extraction from the package `<metadata>` block.
//!
//! Never fails. Absent or blank fields fall back to defaults.

use crate::xml::{first_text, XmlElement};

pub const DEFAULT_TITLE: &str = "Untitled";
pub const DEFAULT_AUTHOR: &str = "Unknown Author";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMetadata {
    pub title: String,
    pub author: String,
    /// Manifest id (or, from loose producers, an href) named by
    /// `<meta name="cover" content="...">`.
    pub cover_id: Option<String>,
}

pub fn extract_metadata(metadata: &XmlElement) -> ExtractedMetadata {
    let title = first_text(metadata.children_named("title")).unwrap_or_else(|| {
        tracing::warn!("No title in package metadata, using \"{}\"", DEFAULT_TITLE);
        DEFAULT_TITLE.to_string()
    });
    let author = first_text(metadata.children_named("creator")).unwrap_or_else(|| {
        tracing::warn!("No creator in package metadata, using \"{}\"", DEFAULT_AUTHOR);
        DEFAULT_AUTHOR.to_string()
    });
    let cover_id = find_cover_id(metadata);

    ExtractedMetadata {
        title,
        author,
        cover_id,
    }
}

/// Scan every `<meta>` for `name="cover"` and return its `content`.
pub fn find_cover_id(metadata: &XmlElement) -> Option<String> {
    metadata
        .children_named("meta")
        .filter(|m| m.attr("name") == Some("cover"))
        .filter_map(|m| m.attr("content"))
        .map(str::trim)
        .find(|c| !c.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::SecurityLimits;

    fn meta(xml: &str) -> XmlElement {
        XmlElement::parse(xml, &SecurityLimits::default()).unwrap()
    }

    #[test]
    fn plain_fields() {
        let m = extract_metadata(&meta(
            r#"<metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
                 <dc:title>  Moby-Dick  </dc:title>
                 <dc:creator opf:role="aut">Herman Melville</dc:creator>
                 <meta name="cover" content="cover-img"/>
               </metadata>"#,
        ));
        assert_eq!(m.title, "Moby-Dick");
        assert_eq!(m.author, "Herman Melville");
        assert_eq!(m.cover_id.as_deref(), Some("cover-img"));
    }

    #[test]
    fn repeated_creators_take_first() {
        let m = extract_metadata(&meta(
            "<metadata><dc:title>T</dc:title><dc:creator>First</dc:creator><dc:creator>Second</dc:creator></metadata>",
        ));
        assert_eq!(m.author, "First");
    }

    #[test]
    fn unprefixed_fields() {
        let m = extract_metadata(&meta("<metadata><title>Bare</title><creator>Someone</creator></metadata>"));
        assert_eq!(m.title, "Bare");
        assert_eq!(m.author, "Someone");
    }

    #[test]
    fn falls_back_to_defaults() {
        let m = extract_metadata(&meta(r#"<metadata><dc:language>en</dc:language><dc:title> </dc:title></metadata>"#));
        assert_eq!(m.title, DEFAULT_TITLE);
        assert_eq!(m.author, DEFAULT_AUTHOR);
        assert_eq!(m.cover_id, None);
    }

    #[test]
    fn cover_meta_among_others() {
        let m = meta(
            r#"<metadata>
                 <meta property="dcterms:modified">2020-01-01</meta>
                 <meta name="generator" content="x"/>
                 <meta name="cover" content=" img1 "/>
               </metadata>"#,
        );
        assert_eq!(find_cover_id(&m).as_deref(), Some("img1"));
    }
}
