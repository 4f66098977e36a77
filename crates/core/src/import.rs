//! Import: parse an EPUB and record it in a book store.

use std::path::Path;
use std::sync::Arc;

use crate::cover::{epoch_millis, CoverSink};
use crate::document::ParsedBook;
use crate::error::{ImportError, ShelfError};
use crate::library::{BookRecord, BookStore, ChapterRecord, NewBook};
use crate::parser::{EpubParser, ImportOptions};
use crate::progress::{emit_progress, ImportStage, ProgressHandler};

/// Outcome of a successful import.
#[derive(Debug, Clone)]
pub struct ImportedBook {
    pub book: BookRecord,
    pub chapters: Vec<ChapterRecord>,
}

pub struct Importer {
    store: Arc<dyn BookStore>,
    covers: Arc<dyn CoverSink>,
    options: ImportOptions,
    progress: Option<Arc<dyn ProgressHandler>>,
}

impl Importer {
    pub fn new(store: Arc<dyn BookStore>, covers: Arc<dyn CoverSink>, options: ImportOptions) -> Self {
        Self {
            store,
            covers,
            options,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn store(&self) -> &Arc<dyn BookStore> {
        &self.store
    }

    /// Parse `bytes` and store the result under `file_path`. Nothing is
    /// written to the store when parsing fails.
    pub fn import_bytes(&self, file_path: &str, bytes: &[u8]) -> Result<ImportedBook, ShelfError> {
        let parsed = EpubParser::parse(
            bytes,
            &self.options,
            self.covers.as_ref(),
            self.progress.as_deref(),
        )?;
        self.record(file_path, parsed)
    }

    pub fn import_path(&self, path: impl AsRef<Path>) -> Result<ImportedBook, ShelfError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(ImportError::from)?;
        self.import_bytes(&path.to_string_lossy(), &bytes)
    }

    /// Async variant of [`Importer::import_path`]: the file is read with
    /// `tokio::fs` and parsing runs on the blocking pool.
    pub async fn import_file(self: Arc<Self>, path: impl AsRef<Path>) -> Result<ImportedBook, ShelfError> {
        let path = path.as_ref().to_path_buf();
        let bytes = tokio::fs::read(&path).await.map_err(ImportError::from)?;
        let file_path = path.to_string_lossy().into_owned();
        tokio::task::spawn_blocking(move || self.import_bytes(&file_path, &bytes))
            .await
            .map_err(|e| ShelfError::Io(std::io::Error::other(e.to_string())))?
    }

    fn record(&self, file_path: &str, parsed: ParsedBook) -> Result<ImportedBook, ShelfError> {
        emit_progress(self.progress.as_deref(), ImportStage::Store, Some(self.store.name()));
        let new_book = NewBook {
            title: parsed.metadata.title,
            author: parsed.metadata.author,
            file_path: file_path.to_string(),
            cover_url: parsed.metadata.cover_local_path,
            imported_at: epoch_millis(),
        };
        let book = self.store.insert_book(new_book, &parsed.chapters)?;
        let chapters = self.store.chapters(&book.id)?;
        tracing::info!(
            "Imported '{}' by {} ({} chapters) as {}",
            book.title,
            book.author,
            chapters.len(),
            book.id
        );
        Ok(ImportedBook { book, chapters })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::{build_zip, corrupt_entry_data};
    use crate::cover::{DirCoverSink, MemoryCoverSink};
    use crate::library::{DirStore, MemoryStore};
    use crate::parser::tests::{epub2_bytes, epub3_bytes};
    use crate::progress::tests::Recorder;

    fn memory_importer() -> (Importer, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let importer = Importer::new(
            store.clone(),
            Arc::new(MemoryCoverSink::new()),
            ImportOptions::default(),
        );
        (importer, store)
    }

    #[test]
    fn import_creates_book_and_chapters() {
        let (importer, store) = memory_importer();
        let imported = importer.import_bytes("/books/test.epub", &epub3_bytes()).unwrap();

        assert_eq!(imported.book.title, "The Test Book");
        assert_eq!(imported.book.file_path, "/books/test.epub");
        assert_eq!(imported.book.description, "");
        assert_eq!(imported.book.last_read_position, "");
        assert!(imported.book.imported_at > 0);
        assert!(imported.book.cover_url.ends_with(".jpg"));
        assert_eq!(imported.chapters.len(), 2);
        assert_eq!(imported.chapters[1].book_id, imported.book.id);
        assert_eq!(store.all_books().unwrap().len(), 1);
    }

    #[test]
    fn fatal_error_leaves_no_records() {
        let (importer, store) = memory_importer();
        let bytes = build_zip(&[("mimetype", b"application/epub+zip")]);
        let err = importer.import_bytes("/books/bad.epub", &bytes).unwrap_err();
        assert!(matches!(err, ShelfError::Import(ImportError::MissingContainer)));
        assert!(store.all_books().unwrap().is_empty());
    }

    #[test]
    fn unreadable_cover_aborts_import() {
        let (importer, store) = memory_importer();
        let mut bytes = epub3_bytes();
        corrupt_entry_data(&mut bytes, b"JPEGDATA");

        let err = importer.import_bytes("/books/broken-cover.epub", &bytes).unwrap_err();
        assert!(matches!(
            err,
            ShelfError::Import(ImportError::CoverRead { .. })
        ));
        assert!(store.all_books().unwrap().is_empty());
    }

    #[test]
    fn import_path_with_dir_backends() {
        let dir = tempfile::tempdir().unwrap();
        let epub_path = dir.path().join("old.epub");
        std::fs::write(&epub_path, epub2_bytes()).unwrap();

        let store = Arc::new(DirStore::open(dir.path().join("library")).unwrap());
        let importer = Importer::new(
            store.clone(),
            Arc::new(DirCoverSink::new(dir.path().join("covers"))),
            ImportOptions::default(),
        );
        let imported = importer.import_path(&epub_path).unwrap();
        assert_eq!(imported.book.author, "Old Author");
        assert_eq!(imported.chapters.len(), 3);
        assert_eq!(store.get_book(&imported.book.id).unwrap().title, "Old Book");
        // EPUB 2 fixture has no cover, so nothing is written.
        assert!(!dir.path().join("covers").exists());
    }

    #[test]
    fn progress_follows_pipeline_stages() {
        let recorder = Arc::new(Recorder::default());
        let (importer, _) = memory_importer();
        let importer = importer.with_progress(recorder.clone());
        importer.import_bytes("/books/test.epub", &epub3_bytes()).unwrap();

        assert_eq!(
            recorder.stages(),
            vec![
                ImportStage::Archive,
                ImportStage::Container,
                ImportStage::Package,
                ImportStage::Metadata,
                ImportStage::Cover,
                ImportStage::Navigation,
                ImportStage::Store,
            ]
        );
        let events = recorder.0.lock().unwrap();
        let positions: Vec<u64> = events.iter().map(|e| e.current).collect();
        assert_eq!(positions, (1..=ImportStage::COUNT).collect::<Vec<_>>());
        assert_eq!(events[2].message.as_deref(), Some("OEBPS/content.opf"));
        assert_eq!(events[6].message.as_deref(), Some("memory"));
    }

    #[test]
    fn progress_stops_at_failing_stage() {
        let recorder = Arc::new(Recorder::default());
        let (importer, _) = memory_importer();
        let importer = importer.with_progress(recorder.clone());
        let bytes = build_zip(&[("mimetype", b"application/epub+zip")]);
        importer.import_bytes("/books/bad.epub", &bytes).unwrap_err();

        assert_eq!(
            recorder.stages(),
            vec![ImportStage::Archive, ImportStage::Container]
        );
    }

    #[test]
    fn missing_file_is_io_error() {
        let (importer, _) = memory_importer();
        let err = importer.import_path("/definitely/not/here.epub").unwrap_err();
        assert!(matches!(err, ShelfError::Import(ImportError::Io(_))));
    }

    #[tokio::test]
    async fn async_import() {
        let dir = tempfile::tempdir().unwrap();
        let epub_path = dir.path().join("new.epub");
        std::fs::write(&epub_path, epub3_bytes()).unwrap();

        let (importer, store) = memory_importer();
        let importer = Arc::new(importer);
        let imported = importer.clone().import_file(&epub_path).await.unwrap();
        assert_eq!(imported.book.author, "Jane Writer");
        assert_eq!(store.chapters(&imported.book.id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn concurrent_imports_share_cover_dir() {
        let dir = tempfile::tempdir().unwrap();
        let covers = dir.path().join("covers");
        let store = Arc::new(MemoryStore::new());
        let importer = Arc::new(Importer::new(
            store.clone(),
            Arc::new(DirCoverSink::new(&covers)),
            ImportOptions::default(),
        ));

        let mut handles = Vec::new();
        for i in 0..4 {
            let path = dir.path().join(format!("b{i}.epub"));
            std::fs::write(&path, epub3_bytes()).unwrap();
            handles.push(tokio::spawn(importer.clone().import_file(path)));
        }
        let mut cover_urls = Vec::new();
        for h in handles {
            cover_urls.push(h.await.unwrap().unwrap().book.cover_url);
        }
        cover_urls.sort();
        cover_urls.dedup();
        assert_eq!(cover_urls.len(), 4);
        assert_eq!(std::fs::read_dir(&covers).unwrap().count(), 4);
        assert_eq!(store.all_books().unwrap().len(), 4);
    }
}
