//! OPF package document parser.

use crate::archive::ArchiveHandle;
use crate::container::ContainerDescriptor;
use crate::error::ImportError;
use crate::href::resolve_href;
use crate::xml::{XmlElement, XmlTreeError};

pub const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    /// The href exactly as declared, relative to the package directory.
    pub href: String,
    /// `href` resolved against the package directory: the archive path.
    pub path: String,
    pub media_type: String,
    pub properties: Vec<String>,
}

impl ManifestItem {
    pub fn has_property(&self, property: &str) -> bool {
        self.properties.iter().any(|p| p == property)
    }

    pub fn is_ncx(&self) -> bool {
        self.media_type == NCX_MEDIA_TYPE
    }
}

#[derive(Debug, Clone)]
pub struct PackageDocument {
    pub version: Option<String>,
    /// The `<metadata>` element, prefixes stripped.
    pub metadata: XmlElement,
    /// Manifest items in document order.
    pub manifest: Vec<ManifestItem>,
}

impl PackageDocument {
    pub fn item_by_id(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|i| i.id == id)
    }
}

/// Read and parse the package document named by `container`.
pub fn parse_package(
    archive: &ArchiveHandle<'_>,
    container: &ContainerDescriptor,
) -> Result<PackageDocument, ImportError> {
    let path = &container.package_document_path;
    if !archive.exists(path) {
        return Err(ImportError::MissingPackageDocument(path.clone()));
    }
    let content = archive.read_text(path)?;
    let package = parse_package_str(&content, &container.base_directory, archive)?;
    tracing::debug!(
        "Package {} (version {}): {} manifest items",
        path,
        package.version.as_deref().unwrap_or("unknown"),
        package.manifest.len()
    );
    Ok(package)
}

fn parse_package_str(
    content: &str,
    base_dir: &str,
    archive: &ArchiveHandle<'_>,
) -> Result<PackageDocument, ImportError> {
    let root = XmlElement::parse(content, archive.limits()).map_err(|e| match e {
        XmlTreeError::Security(s) => ImportError::Security(s),
        other => ImportError::MalformedPackage(other.to_string()),
    })?;

    if root.name != "package" {
        return Err(ImportError::MalformedPackage(format!(
            "expected <package> root, found <{}>",
            root.name
        )));
    }

    let metadata = root
        .child("metadata")
        .cloned()
        .ok_or_else(|| ImportError::MalformedPackage("no <metadata> element".into()))?;

    let manifest = match root.child("manifest") {
        Some(m) => read_manifest(m, base_dir),
        None => {
            tracing::warn!("Package document has no <manifest>");
            Vec::new()
        }
    };

    Ok(PackageDocument {
        version: root.attr("version").map(str::to_string),
        metadata,
        manifest,
    })
}

fn read_manifest(manifest: &XmlElement, base_dir: &str) -> Vec<ManifestItem> {
    manifest
        .children_named("item")
        .filter_map(|item| {
            let href = item.attr("href").map(str::trim).filter(|h| !h.is_empty());
            let Some(href) = href else {
                tracing::debug!("Skipping manifest item {:?} without href", item.attr("id"));
                return None;
            };
            Some(ManifestItem {
                id: item.attr("id").unwrap_or_default().to_string(),
                href: href.to_string(),
                path: resolve_href(base_dir, href),
                media_type: item.attr("media-type").unwrap_or_default().trim().to_string(),
                properties: item
                    .attr("properties")
                    .map(|p| p.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default(),
            })
        })
        .collect()
}
