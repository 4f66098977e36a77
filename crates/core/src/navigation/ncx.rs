//! EPUB 2 NCX reader.

use super::{within_depth, ChapterCollector, TocOptions};
use crate::document::ChapterEntry;
use crate::security::SecurityLimits;
use crate::xml::{XmlElement, XmlTreeError};

/// Walk `ncx/navMap/navPoint` in document order. A point without
/// `content/@src` is skipped; a point without `navLabel/text` gets an empty
/// title.
pub fn parse_ncx(
    content: &str,
    base_dir: &str,
    options: &TocOptions,
    limits: &SecurityLimits,
) -> Result<Vec<ChapterEntry>, XmlTreeError> {
    let root = XmlElement::parse(content, limits)?;
    let mut collector = ChapterCollector::new(base_dir);

    match root.child("navMap") {
        Some(nav_map) if root.name == "ncx" => {
            walk_points(nav_map, &mut collector, options, limits, 1);
        }
        _ => tracing::warn!("NCX has no <ncx>/<navMap>, treating as empty"),
    }

    Ok(collector.finish())
}

fn walk_points(
    parent: &XmlElement,
    collector: &mut ChapterCollector<'_>,
    options: &TocOptions,
    limits: &SecurityLimits,
    depth: u32,
) {
    if !within_depth(depth, limits) {
        return;
    }
    for point in parent.children_named("navPoint") {
        let label = point
            .path(&["navLabel", "text"])
            .map(XmlElement::own_text)
            .unwrap_or_default();
        let src = point
            .child("content")
            .and_then(|c| c.attr("src"))
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match src {
            Some(src) => collector.push(&label, src),
            None => collector.skip(&format!("navPoint {:?} has no content src", point.attr("id"))),
        }

        if options.include_nested {
            walk_points(point, collector, options, limits, depth + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(xml: &str, nested: bool) -> Vec<ChapterEntry> {
        parse_ncx(
            xml,
            "OEBPS/",
            &TocOptions {
                include_nested: nested,
            },
            &SecurityLimits::default(),
        )
        .unwrap()
    }

    const NCX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head><meta name="dtb:uid" content="x"/></head>
  <docTitle><text>Book</text></docTitle>
  <navMap>
    <navPoint id="p1" playOrder="1">
      <navLabel><text> Chapter One </text></navLabel>
      <content src="text/ch1.xhtml"/>
      <navPoint id="p1a" playOrder="2">
        <navLabel><text>Section 1.1</text></navLabel>
        <content src="text/ch1.xhtml#s1"/>
      </navPoint>
    </navPoint>
    <navPoint id="p2" playOrder="3">
      <navLabel><text>Chapter Two</text></navLabel>
    </navPoint>
    <navPoint id="p3" playOrder="4">
      <navLabel><text>Chapter Three</text></navLabel>
      <content src="text/ch3.html.html"/>
    </navPoint>
    <navPoint id="p4" playOrder="5">
      <content src="text/ch4.xhtml"/>
    </navPoint>
  </navMap>
</ncx>"#;

    #[test]
    fn top_level_walk() {
        let entries = parse(NCX, false);
        let expected = vec![
            ChapterEntry {
                title: "Chapter One".into(),
                href: "OEBPS/text/ch1.xhtml".into(),
                order: 0,
            },
            ChapterEntry {
                title: "Chapter Three".into(),
                href: "OEBPS/text/ch3.html".into(),
                order: 1,
            },
            ChapterEntry {
                title: "".into(),
                href: "OEBPS/text/ch4.xhtml".into(),
                order: 2,
            },
        ];
        assert_eq!(entries, expected);
    }

    #[test]
    fn nested_walk_is_depth_first() {
        let titles: Vec<String> = parse(NCX, true).into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["Chapter One", "Section 1.1", "Chapter Three", ""]);
    }

    #[test]
    fn prefixed_ncx() {
        let entries = parse(
            r#"<ncx:ncx xmlns:ncx="http://www.daisy.org/z3986/2005/ncx/">
                 <ncx:navMap><ncx:navPoint><ncx:navLabel><ncx:text>A</ncx:text></ncx:navLabel>
                 <ncx:content src="a.xhtml"/></ncx:navPoint></ncx:navMap></ncx:ncx>"#,
            false,
        );
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].href, "OEBPS/a.xhtml");
    }

    #[test]
    fn missing_nav_map_is_empty() {
        assert!(parse("<ncx><head/></ncx>", false).is_empty());
        assert!(parse("<html><navMap/></html>", false).is_empty());
    }

    #[test]
    fn broken_xml_is_an_error() {
        let err = parse_ncx("<ncx><navMap>", "", &TocOptions::default(), &SecurityLimits::default());
        assert!(err.is_err());
    }
}
