//! Book store: where parsed books and their chapter lists are kept.
//!
//! The parser never talks to storage. [`crate::import::Importer`] hands each
//! parsed book to a [`BookStore`], which writes the book and all of its
//! chapters as one unit: either both land or neither does.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::document::ChapterEntry;
use crate::error::StoreError;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRecord {
    pub id: String,
    pub title: String,
    pub author: String,
    pub file_path: String,
    pub cover_url: String,
    pub description: String,
    /// Epoch milliseconds.
    pub imported_at: i64,
    pub last_read_position: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub book_id: String,
    pub title: String,
    pub href: String,
    pub order: u32,
}

/// Fields of a book that the store has not assigned an id to yet.
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub file_path: String,
    pub cover_url: String,
    pub imported_at: i64,
}

impl NewBook {
    fn into_record(self, id: String) -> BookRecord {
        BookRecord {
            id,
            title: self.title,
            author: self.author,
            file_path: self.file_path,
            cover_url: self.cover_url,
            description: String::new(),
            imported_at: self.imported_at,
            last_read_position: String::new(),
        }
    }
}

/// A book with its chapters; the unit both backends persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredBook {
    book: BookRecord,
    chapters: Vec<ChapterRecord>,
}

impl StoredBook {
    fn new(book: NewBook, chapters: &[ChapterEntry]) -> Self {
        let book = book.into_record(uuid::Uuid::new_v4().to_string());
        let chapters = chapters
            .iter()
            .map(|c| ChapterRecord {
                book_id: book.id.clone(),
                title: c.title.clone(),
                href: c.href.clone(),
                order: c.order,
            })
            .collect();
        Self { book, chapters }
    }
}

// ---------------------------------------------------------------------------
// Listing: sort, search, pagination
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Title,
    Author,
    /// Import time.
    Date,
    LastRead,
}

impl FromStr for SortKey {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "title" => Ok(SortKey::Title),
            "author" => Ok(SortKey::Author),
            "date" | "imported" | "imported_at" => Ok(SortKey::Date),
            "last_read" | "lastread" | "last-read" => Ok(SortKey::LastRead),
            other => Err(StoreError::Failed(format!("unknown sort key: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortMethod {
    pub key: SortKey,
    pub descending: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Same matching as [`BookStore::search`].
    pub query: Option<String>,
    pub sort: Option<SortMethod>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub entries: Vec<BookRecord>,
    /// Matches before pagination.
    pub total: u64,
}

/// Case-insensitive substring match on title; when no title matches, the
/// same match on author. Empty when neither matches.
pub fn search_books(books: Vec<BookRecord>, query: &str) -> Vec<BookRecord> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return books;
    }
    let by_title: Vec<BookRecord> = books
        .iter()
        .filter(|b| b.title.to_lowercase().contains(&needle))
        .cloned()
        .collect();
    if !by_title.is_empty() {
        return by_title;
    }
    books
        .into_iter()
        .filter(|b| b.author.to_lowercase().contains(&needle))
        .collect()
}

/// Sort a copy of the records; the stored data is untouched.
pub fn sort_books(books: &mut [BookRecord], sort: SortMethod) {
    books.sort_by(|a, b| {
        let ord = match sort.key {
            SortKey::Title => cmp_text(&a.title, &b.title),
            SortKey::Author => cmp_text(&a.author, &b.author),
            SortKey::Date => a.imported_at.cmp(&b.imported_at),
            SortKey::LastRead => a.last_read_position.cmp(&b.last_read_position),
        };
        if sort.descending {
            ord.reverse()
        } else {
            ord
        }
    });
}

fn cmp_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

fn apply_list_options(books: Vec<BookRecord>, opts: &ListOptions) -> ListResult {
    let mut books = match &opts.query {
        Some(q) => search_books(books, q),
        None => books,
    };
    if let Some(sort) = opts.sort {
        sort_books(&mut books, sort);
    }
    let total = books.len() as u64;
    let offset = opts.offset.unwrap_or(0) as usize;
    let limit = opts.limit.map(|l| l as usize).unwrap_or(usize::MAX);
    ListResult {
        entries: books.into_iter().skip(offset).take(limit).collect(),
        total,
    }
}

/// Stable base order for listings: oldest import first.
fn base_order(books: &mut [BookRecord]) {
    books.sort_by(|a, b| a.imported_at.cmp(&b.imported_at).then_with(|| a.id.cmp(&b.id)));
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

pub trait BookStore: Send + Sync {
    /// Human-readable name (e.g. "memory", a directory path).
    fn name(&self) -> &str;

    /// Persist a book and its chapters atomically and return the stored
    /// record with its assigned id.
    fn insert_book(&self, book: NewBook, chapters: &[ChapterEntry]) -> Result<BookRecord, StoreError>;

    fn get_book(&self, id: &str) -> Result<BookRecord, StoreError>;

    /// Chapters of a book in TOC order.
    fn chapters(&self, book_id: &str) -> Result<Vec<ChapterRecord>, StoreError>;

    /// Every stored book, oldest import first.
    fn all_books(&self) -> Result<Vec<BookRecord>, StoreError>;

    fn list(&self, opts: &ListOptions) -> Result<ListResult, StoreError> {
        Ok(apply_list_options(self.all_books()?, opts))
    }

    fn search(&self, query: &str) -> Result<Vec<BookRecord>, StoreError> {
        Ok(search_books(self.all_books()?, query))
    }

    fn set_last_read_position(&self, id: &str, position: &str) -> Result<(), StoreError>;

    /// Remove a book together with its chapters.
    fn delete_book(&self, id: &str) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStore {
    books: RwLock<BTreeMap<String, StoredBook>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Failed("store lock poisoned".into())
}

impl BookStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn insert_book(&self, book: NewBook, chapters: &[ChapterEntry]) -> Result<BookRecord, StoreError> {
        let stored = StoredBook::new(book, chapters);
        let record = stored.book.clone();
        self.books
            .write()
            .map_err(poisoned)?
            .insert(record.id.clone(), stored);
        Ok(record)
    }

    fn get_book(&self, id: &str) -> Result<BookRecord, StoreError> {
        self.books
            .read()
            .map_err(poisoned)?
            .get(id)
            .map(|s| s.book.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn chapters(&self, book_id: &str) -> Result<Vec<ChapterRecord>, StoreError> {
        let books = self.books.read().map_err(poisoned)?;
        let stored = books
            .get(book_id)
            .ok_or_else(|| StoreError::NotFound(book_id.to_string()))?;
        let mut chapters = stored.chapters.clone();
        chapters.sort_by_key(|c| c.order);
        Ok(chapters)
    }

    fn all_books(&self) -> Result<Vec<BookRecord>, StoreError> {
        let mut books: Vec<BookRecord> = self
            .books
            .read()
            .map_err(poisoned)?
            .values()
            .map(|s| s.book.clone())
            .collect();
        base_order(&mut books);
        Ok(books)
    }

    fn set_last_read_position(&self, id: &str, position: &str) -> Result<(), StoreError> {
        let mut books = self.books.write().map_err(poisoned)?;
        let stored = books
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        stored.book.last_read_position = position.to_string();
        Ok(())
    }

    fn delete_book(&self, id: &str) -> Result<(), StoreError> {
        self.books
            .write()
            .map_err(poisoned)?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Directory backend: one JSON document per book
// ---------------------------------------------------------------------------

/// Keeps each book and its chapters in `<root>/<id>.json`. Writes go to a
/// temporary file that is renamed over the target, so a reader sees either
/// the old document or the new one.
pub struct DirStore {
    root: PathBuf,
    name: String,
    write_lock: Mutex<()>,
}

impl DirStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            name: root.to_string_lossy().into_owned(),
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(self.root.join(format!("{id}.json")))
    }

    fn read_stored(&self, id: &str) -> Result<StoredBook, StoreError> {
        let path = self.record_path(id)?;
        let data = match std::fs::read(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&data)?)
    }

    fn write_stored(&self, stored: &StoredBook) -> Result<(), StoreError> {
        let path = self.record_path(&stored.book.id)?;
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(stored)?;
        std::fs::write(&tmp, data)?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

impl BookStore for DirStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn insert_book(&self, book: NewBook, chapters: &[ChapterEntry]) -> Result<BookRecord, StoreError> {
        let stored = StoredBook::new(book, chapters);
        let _guard = self.write_lock.lock().map_err(poisoned)?;
        self.write_stored(&stored)?;
        tracing::debug!(
            "Stored book {} with {} chapters in {}",
            stored.book.id,
            stored.chapters.len(),
            self.name
        );
        Ok(stored.book)
    }

    fn get_book(&self, id: &str) -> Result<BookRecord, StoreError> {
        Ok(self.read_stored(id)?.book)
    }

    fn chapters(&self, book_id: &str) -> Result<Vec<ChapterRecord>, StoreError> {
        let mut chapters = self.read_stored(book_id)?.chapters;
        chapters.sort_by_key(|c| c.order);
        Ok(chapters)
    }

    fn all_books(&self) -> Result<Vec<BookRecord>, StoreError> {
        let mut books = Vec::new();
        for entry in std::fs::read_dir(&self.root)?.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = std::fs::read(&path)
                .map_err(StoreError::from)
                .and_then(|d| serde_json::from_slice::<StoredBook>(&d).map_err(StoreError::from));
            match parsed {
                Ok(stored) => books.push(stored.book),
                Err(e) => tracing::warn!("Skipping unreadable record {}: {}", path.display(), e),
            }
        }
        base_order(&mut books);
        Ok(books)
    }

    fn set_last_read_position(&self, id: &str, position: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().map_err(poisoned)?;
        let mut stored = self.read_stored(id)?;
        stored.book.last_read_position = position.to_string();
        self.write_stored(&stored)
    }

    fn delete_book(&self, id: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().map_err(poisoned)?;
        let path = self.record_path(id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
