pub mod archive;
pub mod config;
pub mod container;
pub mod cover;
pub mod document;
pub mod error;
pub mod href;
pub mod import;
pub mod library;
pub mod metadata;
pub mod navigation;
pub mod package;
pub mod parser;
pub mod progress;
pub mod security;
pub mod xml;

pub mod prelude {
    pub use crate::cover::{CoverSink, DirCoverSink, MemoryCoverSink};
    pub use crate::document::*;
    pub use crate::error::*;
    pub use crate::import::{ImportedBook, Importer};
    pub use crate::library::{BookRecord, BookStore, ChapterRecord, DirStore, MemoryStore};
    pub use crate::parser::{EpubParser, ImportOptions};
}
