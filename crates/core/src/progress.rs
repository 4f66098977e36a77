//! Progress reporting for imports.

/// Pipeline stage an import has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    Archive,
    Container,
    Package,
    Metadata,
    Cover,
    Navigation,
    Store,
}

impl ImportStage {
    pub const COUNT: u64 = 7;

    pub fn index(&self) -> u64 {
        match self {
            ImportStage::Archive => 1,
            ImportStage::Container => 2,
            ImportStage::Package => 3,
            ImportStage::Metadata => 4,
            ImportStage::Cover => 5,
            ImportStage::Navigation => 6,
            ImportStage::Store => 7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStage::Archive => "archive",
            ImportStage::Container => "container",
            ImportStage::Package => "package",
            ImportStage::Metadata => "metadata",
            ImportStage::Cover => "cover",
            ImportStage::Navigation => "navigation",
            ImportStage::Store => "store",
        }
    }
}

/// Event emitted when an import enters a stage.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub stage: ImportStage,
    pub current: u64,
    pub total: u64,
    pub message: Option<String>,
}

/// Receives progress updates. Implement this to drive a status line or a
/// progress bar.
pub trait ProgressHandler: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

/// Emit a progress event if a handler is provided.
pub fn emit_progress(handler: Option<&dyn ProgressHandler>, stage: ImportStage, message: Option<&str>) {
    if let Some(h) = handler {
        h.on_progress(ProgressEvent {
            stage,
            current: stage.index(),
            total: ImportStage::COUNT,
            message: message.map(|s| s.to_string()),
        });
    }
}
