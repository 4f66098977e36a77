//! OCF container resolver: `META-INF/container.xml` to the package document.

use crate::archive::ArchiveHandle;
use crate::error::ImportError;
use crate::href::base_dir_of;
use crate::xml::{XmlElement, XmlTreeError};

pub const CONTAINER_PATH: &str = "META-INF/container.xml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDescriptor {
    /// Archive path of the OPF package document.
    pub package_document_path: String,
    /// Directory of the package document with a trailing slash, or empty.
    /// Every manifest and TOC href is resolved against it.
    pub base_directory: String,
}

impl ContainerDescriptor {
    pub fn new(package_document_path: impl Into<String>) -> Self {
        let package_document_path = package_document_path.into();
        let base_directory = base_dir_of(&package_document_path);
        Self {
            package_document_path,
            base_directory,
        }
    }
}

/// Read the container descriptor and return the first declared rootfile.
/// Later rootfiles (alternate renditions) are ignored.
pub fn resolve_container(archive: &ArchiveHandle<'_>) -> Result<ContainerDescriptor, ImportError> {
    if !archive.exists(CONTAINER_PATH) {
        return Err(ImportError::MissingContainer);
    }
    let content = archive.read_text(CONTAINER_PATH)?;
    parse_container(&content, archive)
}

fn parse_container(
    content: &str,
    archive: &ArchiveHandle<'_>,
) -> Result<ContainerDescriptor, ImportError> {
    let root = XmlElement::parse(content, archive.limits()).map_err(|e| match e {
        XmlTreeError::Security(s) => ImportError::Security(s),
        other => ImportError::MalformedContainer(other.to_string()),
    })?;

    if root.name != "container" {
        return Err(ImportError::MalformedContainer(format!(
            "unexpected root element <{}>",
            root.name
        )));
    }

    let rootfile = root
        .path(&["rootfiles", "rootfile"])
        .ok_or_else(|| ImportError::MalformedContainer("no rootfile declared".into()))?;

    let full_path = rootfile
        .attr("full-path")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ImportError::MalformedContainer("rootfile has no full-path".into()))?;

    let descriptor = ContainerDescriptor::new(full_path.trim_start_matches('/'));
    tracing::debug!(
        "Package document at {} (base '{}')",
        descriptor.package_document_path,
        descriptor.base_directory
    );
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::build_zip;
    use crate::security::SecurityLimits;

    fn resolve(container: &str) -> Result<ContainerDescriptor, ImportError> {
        let bytes = build_zip(&[(CONTAINER_PATH, container.as_bytes())]);
        let archive = ArchiveHandle::open(&bytes, &SecurityLimits::default()).unwrap();
        resolve_container(&archive)
    }

    #[test]
    fn first_rootfile_wins() {
        let d = resolve(
            r#"<?xml version="1.0"?>
            <container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
              <rootfiles>
                <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
                <rootfile full-path="alt/other.opf" media-type="application/oebps-package+xml"/>
              </rootfiles>
            </container>"#,
        )
        .unwrap();
        assert_eq!(d.package_document_path, "OEBPS/content.opf");
        assert_eq!(d.base_directory, "OEBPS/");
    }

    #[test]
    fn root_level_package_has_empty_base() {
        let d = resolve(
            r#"<container><rootfiles><rootfile full-path="content.opf"/></rootfiles></container>"#,
        )
        .unwrap();
        assert_eq!(d.base_directory, "");
    }

    #[test]
    fn prefixed_attribute_is_accepted() {
        let d = resolve(
            r#"<ocf:container xmlns:ocf="urn:oasis:names:tc:opendocument:xmlns:container">
                 <ocf:rootfiles><ocf:rootfile ocf:full-path="book/package.opf"/></ocf:rootfiles>
               </ocf:container>"#,
        )
        .unwrap();
        assert_eq!(d.package_document_path, "book/package.opf");
    }

    #[test]
    fn missing_container() {
        let bytes = build_zip(&[("mimetype", b"application/epub+zip")]);
        let archive = ArchiveHandle::open(&bytes, &SecurityLimits::default()).unwrap();
        assert!(matches!(
            resolve_container(&archive).unwrap_err(),
            ImportError::MissingContainer
        ));
    }

    #[test]
    fn malformed_containers() {
        for xml in [
            "<container><rootfiles/></container>",
            "<container><rootfiles><rootfile/></rootfiles></container>",
            r#"<container><rootfiles><rootfile full-path="  "/></rootfiles></container>"#,
            "<container><rootfiles>",
            "<other/>",
        ] {
            let err = resolve(xml).unwrap_err();
            assert!(
                matches!(err, ImportError::MalformedContainer(_)),
                "{xml}: {err}"
            );
        }
    }
}
