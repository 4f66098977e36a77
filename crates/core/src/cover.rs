//! Cover resolution: find the cover manifest item, extract it and hand the
//! bytes to a durable sink.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::archive::ArchiveHandle;
use crate::error::ImportError;
use crate::package::ManifestItem;

pub const DEFAULT_COVER_EXTENSION: &str = "jpg";

/// Destination for extracted cover images.
pub trait CoverSink: Send + Sync {
    /// Persist `data` under a new, unique name ending in `.{extension}` and
    /// return the durable location. Existing covers are never overwritten.
    fn store(&self, data: &[u8], extension: &str) -> std::io::Result<String>;
}

/// Writes covers as `cover_<epoch-millis>.<ext>` into one directory, created
/// on first use.
#[derive(Debug, Clone)]
pub struct DirCoverSink {
    dir: PathBuf,
}

impl DirCoverSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl CoverSink for DirCoverSink {
    fn store(&self, data: &[u8], extension: &str) -> std::io::Result<String> {
        // Safe to race: create_dir_all succeeds if another import created it.
        std::fs::create_dir_all(&self.dir)?;

        let stamp = epoch_millis();
        let mut attempt: u32 = 0;
        loop {
            let name = if attempt == 0 {
                format!("cover_{stamp}.{extension}")
            } else {
                format!("cover_{stamp}_{attempt}.{extension}")
            };
            let path = self.dir.join(&name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(data)?;
                    return Ok(path.to_string_lossy().into_owned());
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Keeps covers in memory. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryCoverSink {
    covers: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryCoverSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored covers as `(location, bytes)`, oldest first.
    pub fn stored(&self) -> Vec<(String, Vec<u8>)> {
        self.covers.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl CoverSink for MemoryCoverSink {
    fn store(&self, data: &[u8], extension: &str) -> std::io::Result<String> {
        let mut covers = self
            .covers
            .lock()
            .map_err(|_| std::io::Error::other("cover sink lock poisoned"))?;
        let location = format!("memory://cover_{}.{extension}", covers.len());
        covers.push((location.clone(), data.to_vec()));
        Ok(location)
    }
}

/// How a cover manifest item was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverMatch {
    Id,
    Href,
    CoverImageProperty,
}

impl CoverMatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverMatch::Id => "id",
            CoverMatch::Href => "href",
            CoverMatch::CoverImageProperty => "cover-image",
        }
    }
}

/// Pick the cover manifest item. Strict priority: an item whose id equals
/// `cover_id`, then one whose href equals it, then the first item carrying
/// the `cover-image` property.
pub fn resolve_cover_item<'a>(
    cover_id: Option<&str>,
    manifest: &'a [ManifestItem],
) -> Option<(&'a ManifestItem, CoverMatch)> {
    if let Some(id) = cover_id {
        if let Some(item) = manifest.iter().find(|i| i.id == id) {
            return Some((item, CoverMatch::Id));
        }
        if let Some(item) = manifest.iter().find(|i| i.href == id) {
            return Some((item, CoverMatch::Href));
        }
    }
    manifest
        .iter()
        .find(|i| i.has_property("cover-image"))
        .map(|i| (i, CoverMatch::CoverImageProperty))
}

/// Extension of the cover file taken from its href, `jpg` when there is none.
pub fn cover_extension(href: &str) -> String {
    let path = href.split(['#', '?']).next().unwrap_or_default();
    let file = path.rsplit('/').next().unwrap_or_default();
    match file.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_string()
        }
        _ => DEFAULT_COVER_EXTENSION.to_string(),
    }
}

/// Resolve, extract and persist the cover. Returns the sink location, or an
/// empty string when the book declares no cover or the declared entry is not
/// in the archive. A cover entry that exists but cannot be read is an error.
pub fn resolve_cover(
    archive: &ArchiveHandle<'_>,
    cover_id: Option<&str>,
    manifest: &[ManifestItem],
    sink: &dyn CoverSink,
) -> Result<String, ImportError> {
    let Some((item, matched)) = resolve_cover_item(cover_id, manifest) else {
        tracing::debug!("No cover declared (cover meta: {:?})", cover_id);
        return Ok(String::new());
    };
    tracing::debug!("Cover item '{}' matched by {}", item.id, matched.as_str());

    if !archive.exists(&item.path) {
        tracing::warn!("Cover {} is declared but not in the archive", item.path);
        return Ok(String::new());
    }

    let data = archive.read_binary(&item.path).map_err(|e| match e {
        ImportError::Security(s) => ImportError::Security(s),
        other => ImportError::CoverRead {
            path: item.path.clone(),
            detail: other.to_string(),
        },
    })?;

    let location = sink.store(&data, &cover_extension(&item.href))?;
    tracing::info!("Stored cover ({} bytes) at {}", data.len(), location);
    Ok(location)
}

pub(crate) fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::{build_zip, corrupt_entry_data};
    use crate::security::SecurityLimits;

    fn item(id: &str, href: &str, props: &[&str]) -> ManifestItem {
        ManifestItem {
            id: id.into(),
            href: href.into(),
            path: format!("OEBPS/{href}"),
            media_type: "image/jpeg".into(),
            properties: props.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn id_match_beats_cover_image_property() {
        let manifest = vec![
            item("prop-cover", "images/prop.png", &["cover-image"]),
            item("meta-cover", "images/meta.jpg", &[]),
        ];
        let (found, how) = resolve_cover_item(Some("meta-cover"), &manifest).unwrap();
        assert_eq!(found.href, "images/meta.jpg");
        assert_eq!(how, CoverMatch::Id);
    }

    #[test]
    fn href_match_then_property() {
        let manifest = vec![
            item("a", "images/cover.jpg", &[]),
            item("b", "images/other.png", &["cover-image"]),
        ];
        let (found, how) = resolve_cover_item(Some("images/cover.jpg"), &manifest).unwrap();
        assert_eq!((found.id.as_str(), how), ("a", CoverMatch::Href));

        let (found, how) = resolve_cover_item(Some("nope"), &manifest).unwrap();
        assert_eq!((found.id.as_str(), how), ("b", CoverMatch::CoverImageProperty));

        let (found, _) = resolve_cover_item(None, &manifest).unwrap();
        assert_eq!(found.id, "b");
    }

    #[test]
    fn no_cover_at_all() {
        let manifest = vec![item("a", "a.jpg", &[])];
        assert!(resolve_cover_item(None, &manifest).is_none());
        assert!(resolve_cover_item(Some("zzz"), &manifest).is_none());
    }

    #[test]
    fn extensions() {
        assert_eq!(cover_extension("images/cover.png"), "png");
        assert_eq!(cover_extension("images/cover.JPEG"), "JPEG");
        assert_eq!(cover_extension("images/cover"), "jpg");
        assert_eq!(cover_extension("img.v2/cover"), "jpg");
        assert_eq!(cover_extension(".hidden"), "jpg");
        assert_eq!(cover_extension("cover.gif#x"), "gif");
    }

    #[test]
    fn dir_sink_never_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirCoverSink::new(tmp.path().join("covers"));
        let a = sink.store(b"one", "jpg").unwrap();
        let b = sink.store(b"two", "jpg").unwrap();
        assert_ne!(a, b);
        assert_eq!(std::fs::read(&a).unwrap(), b"one");
        assert_eq!(std::fs::read(&b).unwrap(), b"two");
        assert!(a.ends_with(".jpg"));
        let name = Path::new(&a).file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("cover_"));
    }

    #[test]
    fn resolve_cover_writes_to_sink() {
        let bytes = build_zip(&[("OEBPS/images/c.png", b"PNGDATA")]);
        let archive = ArchiveHandle::open(&bytes, &SecurityLimits::default()).unwrap();
        let mut cover = item("c", "images/c.png", &[]);
        cover.media_type = "image/png".into();
        let sink = MemoryCoverSink::new();

        let loc = resolve_cover(&archive, Some("c"), &[cover], &sink).unwrap();
        assert!(loc.ends_with(".png"));
        let stored = sink.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].1, b"PNGDATA");
    }

    #[test]
    fn declared_but_absent_cover_is_empty() {
        let bytes = build_zip(&[("OEBPS/other.xhtml", b"<html/>")]);
        let archive = ArchiveHandle::open(&bytes, &SecurityLimits::default()).unwrap();
        let sink = MemoryCoverSink::new();
        let loc = resolve_cover(&archive, Some("c"), &[item("c", "images/c.jpg", &[])], &sink).unwrap();
        assert_eq!(loc, "");
        assert!(sink.stored().is_empty());
    }

    #[test]
    fn unreadable_cover_entry_is_fatal() {
        let mut bytes = build_zip(&[("OEBPS/images/c.jpg", b"JPEGDATA")]);
        corrupt_entry_data(&mut bytes, b"JPEGDATA");
        let archive = ArchiveHandle::open(&bytes, &SecurityLimits::default()).unwrap();
        let sink = MemoryCoverSink::new();

        let err = resolve_cover(&archive, Some("c"), &[item("c", "images/c.jpg", &[])], &sink).unwrap_err();
        match err {
            ImportError::CoverRead { path, .. } => assert_eq!(path, "OEBPS/images/c.jpg"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(sink.stored().is_empty());
    }

    #[test]
    fn sink_failure_is_reported() {
        struct FailingSink;
        impl CoverSink for FailingSink {
            fn store(&self, _: &[u8], _: &str) -> std::io::Result<String> {
                Err(std::io::Error::other("disk full"))
            }
        }
        let bytes = build_zip(&[("OEBPS/c.jpg", b"JPG")]);
        let archive = ArchiveHandle::open(&bytes, &SecurityLimits::default()).unwrap();
        let err = resolve_cover(&archive, Some("c"), &[item("c", "c.jpg", &[])], &FailingSink).unwrap_err();
        assert!(matches!(err, ImportError::Io(_)));
    }
}
