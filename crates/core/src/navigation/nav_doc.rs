//! EPUB 3 navigation document reader.
//!
//! Nav documents are XHTML, so they are read as XML first. Only content that
//! is not well-formed XML goes through the HTML parser, which keeps sloppy
//! hand-written markup from losing the whole TOC.

use scraper::{ElementRef, Html, Selector};

use super::{within_depth, ChapterCollector, TocOptions};
use crate::document::ChapterEntry;
use crate::security::SecurityLimits;
use crate::xml::{XmlElement, XmlTreeError};

/// Walk the `li` items of the TOC `nav`. The TOC nav is the first one whose
/// `epub:type` includes `toc`, otherwise the first `nav` in the document. An
/// item without a direct `a` child, or whose anchor has no href, is skipped.
pub fn parse_nav_document(
    content: &str,
    base_dir: &str,
    options: &TocOptions,
    limits: &SecurityLimits,
) -> Vec<ChapterEntry> {
    let mut collector = ChapterCollector::new(base_dir);

    let found = match XmlElement::parse(content, limits) {
        Ok(root) => walk_xhtml(&root, &mut collector, options, limits),
        Err(XmlTreeError::Security(e)) => {
            tracing::warn!("Navigation document rejected: {}", e);
            return collector.finish();
        }
        Err(e) => {
            tracing::debug!("Navigation document is not well-formed XML ({}), reading as HTML", e);
            walk_html(content, &mut collector, options, limits)
        }
    };

    if !found {
        tracing::warn!("Navigation document has no <nav><ol>, treating as empty");
    }
    collector.finish()
}

fn is_toc_type(value: Option<&str>) -> bool {
    value.is_some_and(|t| t.split_whitespace().any(|v| v == "toc"))
}

// XHTML

fn walk_xhtml(
    root: &XmlElement,
    collector: &mut ChapterCollector<'_>,
    options: &TocOptions,
    limits: &SecurityLimits,
) -> bool {
    let mut navs = Vec::new();
    collect_named(root, "nav", &mut navs);
    // `epub:type` is stored under its local name.
    let Some(nav) = navs
        .iter()
        .find(|nav| is_toc_type(nav.attr("type")))
        .or(navs.first())
    else {
        return false;
    };

    let list = nav.child("ol").or_else(|| {
        let mut lists = Vec::new();
        collect_named(nav, "ol", &mut lists);
        lists.first().copied()
    });
    let Some(ol) = list else {
        return false;
    };

    walk_xhtml_list(ol, collector, options, limits, 1);
    true
}

/// Descendants named `name`, document order.
fn collect_named<'a>(el: &'a XmlElement, name: &str, out: &mut Vec<&'a XmlElement>) {
    for child in el.elements() {
        if child.name == name {
            out.push(child);
        }
        collect_named(child, name, out);
    }
}

fn walk_xhtml_list(
    ol: &XmlElement,
    collector: &mut ChapterCollector<'_>,
    options: &TocOptions,
    limits: &SecurityLimits,
    depth: u32,
) {
    if !within_depth(depth, limits) {
        return;
    }
    for li in ol.children_named("li") {
        match li.child("a") {
            Some(anchor) => match anchor.attr("href").map(str::trim) {
                Some(href) if !href.is_empty() => collector.push(&xhtml_anchor_title(anchor), href),
                _ => collector.skip("anchor without href"),
            },
            None => collector.skip("list item without anchor"),
        }

        if options.include_nested {
            for nested in li.children_named("ol") {
                walk_xhtml_list(nested, collector, options, limits, depth + 1);
            }
        }
    }
}

fn xhtml_anchor_title(anchor: &XmlElement) -> String {
    anchor
        .text_segments()
        .map(str::trim)
        .find(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| anchor.deep_text().trim().to_string())
}

// HTML fallback

fn walk_html(
    content: &str,
    collector: &mut ChapterCollector<'_>,
    options: &TocOptions,
    limits: &SecurityLimits,
) -> bool {
    let document = Html::parse_document(content);
    match toc_nav(&document).and_then(|nav| first_list(&nav)) {
        Some(ol) => {
            walk_list(ol, collector, options, limits, 1);
            true
        }
        None => false,
    }
}

fn toc_nav(document: &Html) -> Option<ElementRef<'_>> {
    let selector = Selector::parse("nav").ok()?;
    let mut navs = document.select(&selector).peekable();
    let first = *navs.peek()?;
    let toc = navs.find(|nav| is_toc_type(nav.value().attr("epub:type")));
    Some(toc.unwrap_or(first))
}

/// The nav's direct `ol` child, or failing that its first nested `ol`.
fn first_list<'a>(nav: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    if let Some(ol) = child_elements(nav, "ol").next() {
        return Some(ol);
    }
    let selector = Selector::parse("ol").ok()?;
    nav.select(&selector).next()
}

fn child_elements<'a, 'b>(
    parent: &'b ElementRef<'a>,
    name: &'b str,
) -> impl Iterator<Item = ElementRef<'a>> + 'b {
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .filter(move |e| e.value().name() == name)
}

fn walk_list(
    ol: ElementRef<'_>,
    collector: &mut ChapterCollector<'_>,
    options: &TocOptions,
    limits: &SecurityLimits,
    depth: u32,
) {
    if !within_depth(depth, limits) {
        return;
    }
    for li in child_elements(&ol, "li") {
        match child_elements(&li, "a").next() {
            Some(anchor) => match anchor.value().attr("href").map(str::trim) {
                Some(href) if !href.is_empty() => collector.push(&anchor_title(&anchor), href),
                _ => collector.skip("anchor without href"),
            },
            None => collector.skip("list item without anchor"),
        }

        if options.include_nested {
            for nested in child_elements(&li, "ol") {
                walk_list(nested, collector, options, limits, depth + 1);
            }
        }
    }
}

/// First non-blank direct text of the anchor, else all of its text.
fn anchor_title(anchor: &ElementRef<'_>) -> String {
    let direct = anchor
        .children()
        .filter_map(|n| n.value().as_text().map(|t| t.trim().to_string()))
        .find(|t| !t.is_empty());
    match direct {
        Some(t) => t,
        None => anchor.text().collect::<String>().trim().to_string(),
    }
}
