//! Resource limits for loading untrusted archives: ZIP bomb protection,
//! path traversal guards, entry count and size caps.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

use crate::error::SecurityError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityLimits {
    /// Maximum decompression ratio before flagging as ZIP bomb.
    pub max_compression_ratio: u64,
    /// Maximum number of entries allowed in an archive.
    pub max_file_count: u64,
    /// Maximum size of a single entry in bytes.
    pub max_resource_size_bytes: u64,
    /// Maximum total decompressed size in bytes.
    pub max_total_size_bytes: u64,
    /// Maximum XML nesting depth when building element trees.
    pub max_nesting_depth: u32,
}

impl Default for SecurityLimits {
    fn default() -> Self {
        Self {
            max_compression_ratio: 100,
            max_file_count: 10_000,
            max_resource_size_bytes: 200 * 1024 * 1024, // 200 MB
            max_total_size_bytes: 1024 * 1024 * 1024,   // 1 GB
            max_nesting_depth: 200,
        }
    }
}

/// Reject entry paths that are absolute or climb out of the archive root.
pub fn check_path_traversal(entry_path: &str) -> Result<(), SecurityError> {
    if entry_path.starts_with('/') || entry_path.starts_with('\\') {
        return Err(SecurityError::PathTraversal {
            path: entry_path.to_string(),
        });
    }

    // Windows drive prefix (e.g. C:\)
    if entry_path.len() >= 2 && entry_path.as_bytes()[1] == b':' {
        return Err(SecurityError::PathTraversal {
            path: entry_path.to_string(),
        });
    }

    if Path::new(entry_path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(SecurityError::PathTraversal {
            path: entry_path.to_string(),
        });
    }

    Ok(())
}

/// Check if a decompression ratio exceeds the configured limit (ZIP bomb detection).
pub fn check_compression_ratio(
    compressed_size: u64,
    uncompressed_size: u64,
    limits: &SecurityLimits,
) -> Result<(), SecurityError> {
    if compressed_size == 0 {
        if uncompressed_size > 0 {
            return Err(SecurityError::ZipBomb {
                ratio: u64::MAX,
                limit: limits.max_compression_ratio,
            });
        }
        return Ok(());
    }

    let ratio = uncompressed_size / compressed_size;
    if ratio > limits.max_compression_ratio {
        return Err(SecurityError::ZipBomb {
            ratio,
            limit: limits.max_compression_ratio,
        });
    }

    Ok(())
}

pub fn check_file_count(count: u64, limits: &SecurityLimits) -> Result<(), SecurityError> {
    if count > limits.max_file_count {
        return Err(SecurityError::TooManyFiles {
            count,
            limit: limits.max_file_count,
        });
    }
    Ok(())
}

pub fn check_resource_size(
    name: &str,
    size_bytes: u64,
    limits: &SecurityLimits,
) -> Result<(), SecurityError> {
    if size_bytes > limits.max_resource_size_bytes {
        return Err(SecurityError::OversizedResource {
            name: name.to_string(),
            size_mb: size_bytes / (1024 * 1024),
            limit_mb: limits.max_resource_size_bytes / (1024 * 1024),
        });
    }
    Ok(())
}

pub fn check_total_size(total_bytes: u64, limits: &SecurityLimits) -> Result<(), SecurityError> {
    if total_bytes > limits.max_total_size_bytes {
        return Err(SecurityError::OversizedArchive {
            size_mb: total_bytes / (1024 * 1024),
            limit_mb: limits.max_total_size_bytes / (1024 * 1024),
        });
    }
    Ok(())
}

pub fn check_nesting_depth(depth: u32, limits: &SecurityLimits) -> Result<(), SecurityError> {
    if depth > limits.max_nesting_depth {
        return Err(SecurityError::ExcessiveNesting {
            depth,
            limit: limits.max_nesting_depth,
        });
    }
    Ok(())
}
