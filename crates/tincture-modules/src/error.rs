use tincture_core::PipelineError;

#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("not an ICC profile: {0}")]
    InvalidProfile(String),
    #[error("truncated data: need {needed} bytes, found {found}")]
    Truncated { needed: usize, found: usize },
    #[error("unsupported tag type {0:#010x}")]
    UnsupportedTagType(u32),
    #[error("tag type {tag_type:#010x} cannot hold {records} record(s)")]
    RecordMismatch { tag_type: u32, records: usize },
}

impl From<ModuleError> for PipelineError {
    fn from(err: ModuleError) -> Self {
        match err {
            ModuleError::Pipeline(inner) => inner,
            other => PipelineError::Codec(other.to_string()),
        }
    }
}
