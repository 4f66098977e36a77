use serde::{Deserialize, Serialize};

/// Normalized bibliographic data for one parsed book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
    /// Durable location of the extracted cover, empty when the book has none.
    pub cover_local_path: String,
}

impl BookMetadata {
    pub fn has_cover(&self) -> bool {
        !self.cover_local_path.is_empty()
    }
}

/// One entry of the table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterEntry {
    pub title: String,
    /// Archive path, already resolved against the package directory.
    pub href: String,
    /// 0-based position among emitted entries, in document order.
    pub order: u32,
}

/// Everything a single parse produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedBook {
    pub metadata: BookMetadata,
    pub chapters: Vec<ChapterEntry>,
    pub package_path: String,
    pub base_dir: String,
}
