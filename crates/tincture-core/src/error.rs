use crate::envelope::ObjectKind;
use crate::registry::ProviderCategory;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("allocation of {bytes} bytes failed")]
    OutOfMemory { bytes: usize },
    #[error("expected {expected} object, found {found}")]
    WrongType {
        expected: ObjectKind,
        found: ObjectKind,
    },
    #[error("provider \"{registration}\" is a {found} provider, expected {expected}")]
    CategoryMismatch {
        registration: String,
        expected: ProviderCategory,
        found: ProviderCategory,
    },
    #[error("incompatible connectors: {0}")]
    IncompatibleConnector(String),
    #[error("connecting stage {downstream} to stage {upstream} would close a cycle")]
    CycleDetected { downstream: u32, upstream: u32 },
    #[error("no {category} provider matches \"{pattern}\"")]
    ProviderNotFound {
        pattern: String,
        category: ProviderCategory,
    },
    #[error("stage {stage} has no {port} at index {index}")]
    PortOutOfRange {
        stage: u32,
        port: &'static str,
        index: usize,
    },
    #[error("invalid region of interest: {0}")]
    InvalidRegion(String),
    #[error("no pixel available at ({x}, {y})")]
    PixelUnavailable { x: u32, y: u32 },
    #[error("conversion has no {0} stage")]
    MissingStage(&'static str),
    #[error("invalid option \"{key}\": {reason}")]
    InvalidOption { key: String, reason: String },
    #[error("codec error: {0}")]
    Codec(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
}
