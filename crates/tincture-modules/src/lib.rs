//! Tincture Modules: built-in providers for the pipeline runtime.
//!
//! Registers an ICC policy, three filters (image root, ICC transform and
//! output), a data codec for in-memory ICC blobs and a codec for the `text`
//! and `sig ` tag types.

pub mod error;
pub mod icc_blob;
pub mod output;
pub mod policy;
pub mod root;
pub mod text_tag;
pub mod transform;

use std::sync::Arc;

use tincture_core::registry::{Provider, ProviderApi, Registry, RegistryBuilder};

pub use error::ModuleError;
pub use icc_blob::{IccBlobCodec, ProfileBlob};
pub use output::OutputFilter;
pub use policy::IccPolicy;
pub use root::ImageRootFilter;
pub use text_tag::TextTagCodec;
pub use transform::{GainTransform, IccTransformFilter};

pub const POLICY_REGISTRATION: &str = "org/tincture/colour/icc.policy";
pub const ROOT_REGISTRATION: &str = "org/tincture/colour/image.root";
pub const TRANSFORM_REGISTRATION: &str = "org/tincture/colour/icc.transform";
pub const OUTPUT_REGISTRATION: &str = "org/tincture/colour/image.output";
pub const ICC_BLOB_REGISTRATION: &str = "org/tincture/colour/icc.blob";
pub const TEXT_TAG_REGISTRATION: &str = "org/tincture/colour/tag.text";

const VERSION: [u32; 3] = [0, 1, 0];

/// Register every built-in provider with `builder`.
pub fn register_builtin(builder: &mut RegistryBuilder) -> Result<(), ModuleError> {
    builder.register(Provider::new(
        POLICY_REGISTRATION,
        VERSION,
        ProviderApi::Policy(Arc::new(IccPolicy::new())),
    ))?;
    builder.register(Provider::new(
        ROOT_REGISTRATION,
        VERSION,
        ProviderApi::Filter(Arc::new(ImageRootFilter)),
    ))?;
    builder.register(Provider::new(
        TRANSFORM_REGISTRATION,
        VERSION,
        ProviderApi::Filter(Arc::new(IccTransformFilter::new())),
    ))?;
    builder.register(Provider::new(
        OUTPUT_REGISTRATION,
        VERSION,
        ProviderApi::Filter(Arc::new(OutputFilter)),
    ))?;
    builder.register(Provider::new(
        ICC_BLOB_REGISTRATION,
        VERSION,
        ProviderApi::DataCodec(Arc::new(IccBlobCodec)),
    ))?;
    builder.register(Provider::new(
        TEXT_TAG_REGISTRATION,
        VERSION,
        ProviderApi::TagCodec(Arc::new(TextTagCodec)),
    ))?;
    Ok(())
}

/// A registry holding only the built-in providers.
pub fn builtin_registry() -> Result<Arc<Registry>, ModuleError> {
    let mut builder = Registry::builder();
    register_builtin(&mut builder)?;
    Ok(builder.build())
}
