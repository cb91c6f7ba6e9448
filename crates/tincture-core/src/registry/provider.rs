//! Provider records and the capability traits each provider category
//! implements.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::RuntimeConfig;
use crate::envelope::{Envelope, Object, ObjectKind};
use crate::error::PipelineError;
use crate::graph::{Conversion, ConnectorDescriptor, RunContext};
use crate::options::Options;
use crate::policy::{CorrectReport, DefaultsSource};
use crate::ticket::{PixelAccess, Progress};

use super::pattern::RegistrationPath;

/// The four kinds of provider the registry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderCategory {
    Policy,
    DataCodec,
    TagCodec,
    Filter,
}

impl fmt::Display for ProviderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Policy => write!(f, "policy"),
            Self::DataCodec => write!(f, "data codec"),
            Self::TagCodec => write!(f, "tag codec"),
            Self::Filter => write!(f, "filter"),
        }
    }
}

/// Severity attached to messages a provider routes to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Host callback receiving provider messages.
pub type MessageSink = Arc<dyn Fn(MessageLevel, &str) + Send + Sync>;

/// Capability query answered by codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecQuery {
    /// Returns the interface version the codec implements.
    Compatibility,
    /// Non-zero when the codec loads the profile format `value`.
    ProfileFormat,
    /// Non-zero when the codec reads tag type `value`.
    TagTypeRead,
    /// Non-zero when the codec writes tag type `value`.
    TagTypeWrite,
}

/// Short description produced by a data codec scan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanSummary {
    pub summary: String,
    pub source_name: Option<String>,
}

/// A raw tag payload handed to a tag codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagBlock {
    /// Tag signature, e.g. `desc`.
    pub signature: u32,
    /// Full tag body including the type signature.
    pub data: Vec<u8>,
}

impl TagBlock {
    /// Type signature stored in the first four bytes of the body.
    pub fn tag_type(&self) -> Option<u32> {
        let bytes: [u8; 4] = self.data.get(..4)?.try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }
}

/// A decoded tag value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagRecord {
    Text(String),
    Signature(u32),
}

/// Policy provider: owns defaults and the correction pass over a pipeline.
pub trait PolicyApi: Send + Sync {
    fn init(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    fn set_message_sink(&self, sink: MessageSink);

    /// Reject option sets the policy cannot honour.
    fn validate_options(&self, options: &Options) -> Result<(), PipelineError>;

    /// Defaults the policy declares for the stages it governs.
    fn default_options(&self) -> Options;

    /// Human-readable description of the policy options.
    fn ui_text(&self, options: &Options) -> String;

    /// Harmonize the options of the governed stage in `conversion`. The walk
    /// follows `config.data_category`; `config.verbose` raises the log level
    /// of the decisions.
    fn correct_graph(
        &self,
        conversion: &Conversion,
        options: &Options,
        defaults: &dyn DefaultsSource,
        config: &RuntimeConfig,
    ) -> Result<CorrectReport, PipelineError>;
}

/// Data codec: loads and summarizes in-memory payloads.
pub trait DataCodecApi: Send + Sync {
    fn can_handle(&self, query: CodecQuery, value: u32) -> i32;

    fn load_from_memory(&self, bytes: &[u8], flags: u32)
    -> Result<Arc<dyn Object>, PipelineError>;

    fn scan(&self, bytes: &[u8]) -> Result<ScanSummary, PipelineError>;
}

/// Tag codec: reads and writes profile tag payloads.
pub trait TagCodecApi: Send + Sync {
    fn can_handle(&self, query: CodecQuery, value: u32) -> i32;

    fn get_values(&self, tag: &TagBlock) -> Result<Vec<TagRecord>, PipelineError>;

    fn create(&self, tag_type: u32, records: &[TagRecord]) -> Result<Vec<u8>, PipelineError>;
}

/// Filter: the behaviour behind a pipeline stage.
pub trait FilterApi: Send + Sync {
    /// Input connectors, in plug order.
    fn plugs(&self) -> Vec<ConnectorDescriptor>;

    /// Output connectors, in socket order.
    fn sockets(&self) -> Vec<ConnectorDescriptor>;

    fn default_options(&self) -> Options {
        Options::new()
    }

    /// Service one pull request arriving at `ctx.socket`.
    fn run(&self, ctx: &mut RunContext<'_>, ticket: &mut PixelAccess)
    -> Result<Progress, PipelineError>;

    /// Called once when stage `stage` is dropped. Filters keeping per-stage
    /// state drop it here.
    fn release_stage(&self, _stage: u32) {}
}

/// Category-specific entry points of a provider.
#[derive(Clone)]
pub enum ProviderApi {
    Policy(Arc<dyn PolicyApi>),
    DataCodec(Arc<dyn DataCodecApi>),
    TagCodec(Arc<dyn TagCodecApi>),
    Filter(Arc<dyn FilterApi>),
}

impl ProviderApi {
    pub fn category(&self) -> ProviderCategory {
        match self {
            Self::Policy(_) => ProviderCategory::Policy,
            Self::DataCodec(_) => ProviderCategory::DataCodec,
            Self::TagCodec(_) => ProviderCategory::TagCodec,
            Self::Filter(_) => ProviderCategory::Filter,
        }
    }
}

/// A registered provider: registration path, version and entry points.
pub struct Provider {
    envelope: Envelope,
    registration: RegistrationPath,
    version: [u32; 3],
    api: ProviderApi,
}

impl Provider {
    pub fn new(registration: &str, version: [u32; 3], api: ProviderApi) -> Self {
        Self {
            envelope: Envelope::new(ObjectKind::Provider),
            registration: RegistrationPath::parse(registration),
            version,
            api,
        }
    }

    pub fn registration(&self) -> &RegistrationPath {
        &self.registration
    }

    pub fn version(&self) -> [u32; 3] {
        self.version
    }

    pub fn category(&self) -> ProviderCategory {
        self.api.category()
    }

    pub fn api(&self) -> &ProviderApi {
        &self.api
    }

    pub fn as_policy(&self) -> Result<&Arc<dyn PolicyApi>, PipelineError> {
        match &self.api {
            ProviderApi::Policy(api) => Ok(api),
            other => Err(self.mismatch(ProviderCategory::Policy, other)),
        }
    }

    pub fn as_data_codec(&self) -> Result<&Arc<dyn DataCodecApi>, PipelineError> {
        match &self.api {
            ProviderApi::DataCodec(api) => Ok(api),
            other => Err(self.mismatch(ProviderCategory::DataCodec, other)),
        }
    }

    pub fn as_tag_codec(&self) -> Result<&Arc<dyn TagCodecApi>, PipelineError> {
        match &self.api {
            ProviderApi::TagCodec(api) => Ok(api),
            other => Err(self.mismatch(ProviderCategory::TagCodec, other)),
        }
    }

    pub fn as_filter(&self) -> Result<&Arc<dyn FilterApi>, PipelineError> {
        match &self.api {
            ProviderApi::Filter(api) => Ok(api),
            other => Err(self.mismatch(ProviderCategory::Filter, other)),
        }
    }

    fn mismatch(&self, expected: ProviderCategory, found: &ProviderApi) -> PipelineError {
        PipelineError::CategoryMismatch {
            registration: self.registration.to_string(),
            expected,
            found: found.category(),
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("registration", &self.registration.as_str())
            .field("category", &self.category())
            .field("version", &self.version)
            .finish()
    }
}

impl Object for Provider {
    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
