//! Tincture Core: runtime for colour-management pipelines.
//!
//! Provides the shared entity envelope, a content-addressed object cache, the
//! provider registry with its pattern matcher, the pipeline graph model, the
//! pull-ticket protocol and the policy correction pass. Concrete providers
//! live in `tincture-modules`.

pub mod cache;
pub mod config;
pub mod context;
pub mod envelope;
pub mod error;
pub mod graph;
pub mod image;
pub mod options;
pub mod policy;
pub mod registry;
pub mod ticket;

#[cfg(test)]
mod testing;

// Re-exports for convenience.
pub use cache::{CacheKey, CacheSlot, ObjectCache};
pub use config::RuntimeConfig;
pub use context::Context;
pub use envelope::{Envelope, NameKind, Object, ObjectKind};
pub use error::PipelineError;
pub use graph::{Conversion, ConnectorDescriptor, RunContext, Stage};
pub use image::{BitDepth, Image, ImageDescriptor, PixelLayout};
pub use options::{OptionEntry, OptionSource, OptionValue, Options};
pub use policy::{CorrectReport, DefaultsSource};
pub use registry::{Provider, ProviderApi, ProviderCategory, Registry, RegistryBuilder};
pub use ticket::{Array2d, PixelAccess, Progress, Rectangle};
