/// Top-level error type. All public API functions return this.
#[derive(Debug, thiserror::Error)]
pub enum ShelfError {
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal conditions while parsing one EPUB. Anything that only degrades the
/// result (missing title, no cover, no TOC) is not represented here.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Not a valid ZIP archive: {0}")]
    ArchiveCorrupt(String),

    #[error("Missing META-INF/container.xml")]
    MissingContainer,

    #[error("Malformed container.xml: {0}")]
    MalformedContainer(String),

    #[error("Package document not found at {0}")]
    MissingPackageDocument(String),

    #[error("Malformed package document: {0}")]
    MalformedPackage(String),

    #[error("Failed to read cover image {path}: {detail}")]
    CoverRead { path: String, detail: String },

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("ZIP bomb detected: decompression ratio {ratio}:1 exceeds limit {limit}:1")]
    ZipBomb { ratio: u64, limit: u64 },

    #[error("Path traversal detected in archive entry: {path}")]
    PathTraversal { path: String },

    #[error("Archive contains {count} files, exceeding limit of {limit}")]
    TooManyFiles { count: u64, limit: u64 },

    #[error("Resource {name} is {size_mb}MB, exceeding limit of {limit_mb}MB")]
    OversizedResource {
        name: String,
        size_mb: u64,
        limit_mb: u64,
    },

    #[error("Archive decompresses to {size_mb}MB, exceeding limit of {limit_mb}MB")]
    OversizedArchive { size_mb: u64, limit_mb: u64 },

    #[error("XML nesting depth {depth} exceeds limit of {limit}")]
    ExcessiveNesting { depth: u32, limit: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Book not found: {0}")]
    NotFound(String),

    #[error("Could not encode or decode record: {0}")]
    Serialization(String),

    #[error("Store operation failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not parse config file {path}: {detail}")]
    Parse { path: String, detail: String },

    #[error("Unknown config key: {0}")]
    UnknownKey(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
