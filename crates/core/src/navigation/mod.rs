//! Navigation resolver: locate the table-of-contents document in the
//! manifest and turn it into an ordered chapter list.
//!
//! Locating runs a fixed chain of tiers, first match wins:
//!
//! 1. an item with the `nav` property (EPUB 3),
//! 2. an item with the NCX media type (EPUB 2),
//! 3. an item whose file name is `nav` or `toc` with an `xhtml`, `xml` or
//!    `ncx` extension.
//!
//! The format is chosen by media type alone: NCX items go through the NCX
//! reader, everything else through the nav-document reader. No match, an
//! unreadable document and an empty list all yield zero chapters.

pub mod nav_doc;
pub mod ncx;

use crate::archive::ArchiveHandle;
use crate::document::ChapterEntry;
use crate::href::resolve_href;
use crate::package::ManifestItem;
use crate::security::SecurityLimits;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorTier {
    NavProperty,
    NcxMediaType,
    FilenamePattern,
}

impl LocatorTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocatorTier::NavProperty => "nav-property",
            LocatorTier::NcxMediaType => "ncx-media-type",
            LocatorTier::FilenamePattern => "filename-pattern",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TocOptions {
    /// Also emit nested entries, depth-first in document order. When off only
    /// the top level of the TOC is walked.
    pub include_nested: bool,
}

pub fn find_by_nav_property(manifest: &[ManifestItem]) -> Option<&ManifestItem> {
    manifest.iter().find(|i| i.has_property("nav"))
}

pub fn find_by_ncx_media_type(manifest: &[ManifestItem]) -> Option<&ManifestItem> {
    manifest.iter().find(|i| i.is_ncx())
}

pub fn find_by_filename_pattern(manifest: &[ManifestItem]) -> Option<&ManifestItem> {
    manifest.iter().find(|i| is_toc_filename(&i.href))
}

/// `nav.xhtml`, `TOC.ncx`, `text/toc.xml`, ignoring case.
fn is_toc_filename(href: &str) -> bool {
    let path = href.split(['#', '?']).next().unwrap_or_default();
    let file = path.rsplit('/').next().unwrap_or_default();
    let Some((stem, ext)) = file.rsplit_once('.') else {
        return false;
    };
    let stem_ok = stem.eq_ignore_ascii_case("nav") || stem.eq_ignore_ascii_case("toc");
    let ext_ok = ["xhtml", "xml", "ncx"]
        .iter()
        .any(|e| ext.eq_ignore_ascii_case(e));
    stem_ok && ext_ok
}

/// Run the locator tiers in order and report which one matched.
pub fn locate_navigation_document(
    manifest: &[ManifestItem],
) -> Option<(&ManifestItem, LocatorTier)> {
    let found = find_by_nav_property(manifest)
        .map(|i| (i, LocatorTier::NavProperty))
        .or_else(|| find_by_ncx_media_type(manifest).map(|i| (i, LocatorTier::NcxMediaType)))
        .or_else(|| {
            find_by_filename_pattern(manifest).map(|i| (i, LocatorTier::FilenamePattern))
        });

    match found {
        Some((item, tier)) => {
            tracing::debug!("Navigation document {} located by {}", item.path, tier.as_str());
        }
        None => tracing::warn!("No navigation document in manifest; book has no TOC"),
    }
    found
}

/// Locate, read and parse the navigation document. Never fails: every
/// problem degrades to an empty list.
pub fn resolve_navigation(
    archive: &ArchiveHandle<'_>,
    manifest: &[ManifestItem],
    base_dir: &str,
    options: &TocOptions,
) -> Vec<ChapterEntry> {
    let Some((item, _)) = locate_navigation_document(manifest) else {
        return Vec::new();
    };

    let content = match archive.read_text(&item.path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("Could not read navigation document {}: {}", item.path, e);
            return Vec::new();
        }
    };

    let chapters = if item.is_ncx() {
        match ncx::parse_ncx(&content, base_dir, options, archive.limits()) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Could not parse NCX {}: {}", item.path, e);
                Vec::new()
            }
        }
    } else {
        nav_doc::parse_nav_document(&content, base_dir, options, archive.limits())
    };

    tracing::debug!("Resolved {} chapter entries from {}", chapters.len(), item.path);
    chapters
}

/// Accumulates chapter entries, numbering only what is actually emitted.
pub(crate) struct ChapterCollector<'a> {
    base_dir: &'a str,
    entries: Vec<ChapterEntry>,
    skipped: usize,
}

impl<'a> ChapterCollector<'a> {
    pub(crate) fn new(base_dir: &'a str) -> Self {
        Self {
            base_dir,
            entries: Vec::new(),
            skipped: 0,
        }
    }

    pub(crate) fn push(&mut self, title: &str, href: &str) {
        self.entries.push(ChapterEntry {
            title: title.trim().to_string(),
            href: resolve_href(self.base_dir, href.trim()),
            order: self.entries.len() as u32,
        });
    }

    pub(crate) fn skip(&mut self, reason: &str) {
        tracing::debug!("Skipping TOC entry: {}", reason);
        self.skipped += 1;
    }

    pub(crate) fn finish(self) -> Vec<ChapterEntry> {
        if self.skipped > 0 {
            tracing::warn!("Skipped {} TOC entries without a target", self.skipped);
        }
        self.entries
    }
}

/// Depth guard shared by both readers for nested walks.
pub(crate) fn within_depth(depth: u32, limits: &SecurityLimits) -> bool {
    if depth > limits.max_nesting_depth {
        tracing::warn!("TOC nesting deeper than {}, ignoring the rest", limits.max_nesting_depth);
        return false;
    }
    true
}
