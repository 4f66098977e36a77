//! EPUB parser: bytes → metadata, cover and chapter list.
//!
//! Stages run in order: archive, container, package, then metadata, cover and
//! navigation. The last three only read the parsed manifest and the immutable
//! archive handle and do not depend on each other.

use crate::archive::ArchiveHandle;
use crate::container::resolve_container;
use crate::cover::{resolve_cover, CoverSink};
use crate::document::{BookMetadata, ParsedBook};
use crate::error::ImportError;
use crate::metadata::extract_metadata;
use crate::navigation::{resolve_navigation, TocOptions};
use crate::package::parse_package;
use crate::progress::{emit_progress, ImportStage, ProgressHandler};
use crate::security::SecurityLimits;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub security: SecurityLimits,
    pub toc: TocOptions,
    /// Skip cover extraction entirely when false.
    pub extract_cover: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            security: SecurityLimits::default(),
            toc: TocOptions::default(),
            extract_cover: true,
        }
    }
}

pub struct EpubParser;

impl EpubParser {
    /// Parse an in-memory EPUB. The only side effect is at most one write to
    /// `covers`.
    pub fn parse(
        bytes: &[u8],
        opts: &ImportOptions,
        covers: &dyn CoverSink,
        progress: Option<&dyn ProgressHandler>,
    ) -> Result<ParsedBook, ImportError> {
        emit_progress(progress, ImportStage::Archive, None);
        let archive = ArchiveHandle::open(bytes, &opts.security)?;

        emit_progress(progress, ImportStage::Container, None);
        let container = resolve_container(&archive)?;

        emit_progress(progress, ImportStage::Package, Some(&container.package_document_path));
        let package = parse_package(&archive, &container)?;

        emit_progress(progress, ImportStage::Metadata, None);
        let fields = extract_metadata(&package.metadata);

        emit_progress(progress, ImportStage::Cover, fields.cover_id.as_deref());
        let cover_local_path = if opts.extract_cover {
            resolve_cover(&archive, fields.cover_id.as_deref(), &package.manifest, covers)?
        } else {
            String::new()
        };

        emit_progress(progress, ImportStage::Navigation, None);
        let chapters = resolve_navigation(
            &archive,
            &package.manifest,
            &container.base_directory,
            &opts.toc,
        );
        if chapters.is_empty() {
            tracing::info!("'{}' has no browsable table of contents", fields.title);
        }

        Ok(ParsedBook {
            metadata: BookMetadata {
                title: fields.title,
                author: fields.author,
                cover_local_path,
            },
            chapters,
            package_path: container.package_document_path,
            base_dir: container.base_directory,
        })
    }
}
