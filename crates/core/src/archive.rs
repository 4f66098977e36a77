//! Archive loader: an EPUB byte buffer opened as a ZIP archive.
//!
//! The handle borrows the caller's buffer and never mutates it, so every read
//! works through `&self` and one handle can serve several independent lookups.

use std::io::{Cursor, Read};

use crate::error::ImportError;
use crate::security::{self, SecurityLimits};

pub struct ArchiveHandle<'a> {
    archive: zip::ZipArchive<Cursor<&'a [u8]>>,
    limits: SecurityLimits,
}

impl<'a> ArchiveHandle<'a> {
    /// Open `bytes` as a ZIP archive. Fails with `ArchiveCorrupt` when the
    /// buffer is not a readable ZIP, or with a security error when the
    /// archive exceeds the configured limits.
    pub fn open(bytes: &'a [u8], limits: &SecurityLimits) -> Result<Self, ImportError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| ImportError::ArchiveCorrupt(e.to_string()))?;

        security::check_file_count(archive.len() as u64, limits)?;

        let mut total: u64 = 0;
        for i in 0..archive.len() {
            let entry = archive
                .by_index_raw(i)
                .map_err(|e| ImportError::ArchiveCorrupt(e.to_string()))?;
            total = total.saturating_add(entry.size());
        }
        security::check_total_size(total, limits)?;

        tracing::debug!("Opened archive with {} entries ({} bytes uncompressed)", archive.len(), total);

        Ok(Self {
            archive,
            limits: limits.clone(),
        })
    }

    /// Does an entry exist at `path`? Paths are case-sensitive and
    /// forward-slash separated.
    pub fn exists(&self, path: &str) -> bool {
        self.resolve_entry(path).is_some()
    }

    /// Map a requested path onto the stored entry name. Producers sometimes
    /// percent-encode hrefs that point at plainly named entries, so a miss on
    /// the literal path retries with the decoded form.
    pub fn resolve_entry(&self, path: &str) -> Option<String> {
        if self.has_name(path) {
            return Some(path.to_string());
        }
        let decoded = percent_encoding::percent_decode_str(path).decode_utf8().ok()?;
        if decoded != path && self.has_name(&decoded) {
            return Some(decoded.into_owned());
        }
        None
    }

    fn has_name(&self, name: &str) -> bool {
        self.archive.index_for_name(name).is_some()
    }

    pub fn read_binary(&self, path: &str) -> Result<Vec<u8>, ImportError> {
        let name = self.resolve_entry(path).ok_or_else(|| {
            ImportError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Missing archive entry: {path}"),
            ))
        })?;

        security::check_path_traversal(&name)?;

        // ZipArchive needs `&mut` to read; clones share the parsed central
        // directory and only copy the cursor.
        let mut archive = self.archive.clone();
        let mut file = archive
            .by_name(&name)
            .map_err(|e| ImportError::ArchiveCorrupt(format!("{name}: {e}")))?;

        security::check_resource_size(&name, file.size(), &self.limits)?;
        security::check_compression_ratio(file.compressed_size(), file.size(), &self.limits)?;

        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Read an entry as text. A UTF-8 byte order mark is dropped and invalid
    /// sequences are replaced rather than rejected.
    pub fn read_text(&self, path: &str) -> Result<String, ImportError> {
        let bytes = self.read_binary(path)?;
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes);
        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(s.to_string()),
            Err(e) => {
                tracing::debug!("Invalid UTF-8 in {}: {}, decoding lossily", path, e);
                Ok(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }

    pub fn limits(&self) -> &SecurityLimits {
        &self.limits
    }
}
