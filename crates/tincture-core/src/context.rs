//! Runtime context tying the registry, cache, defaults and configuration
//! together.

use std::sync::Arc;

use crate::cache::{ObjectCache, sha256, to_hex};
use crate::config::RuntimeConfig;
use crate::envelope::Object;
use crate::error::PipelineError;
use crate::graph::{Conversion, RenderSummary, Stage};
use crate::options::Options;
use crate::policy::{CorrectReport, DefaultsSource, LayeredDefaults};
use crate::registry::{CodecQuery, Provider, ProviderCategory, Registry, ScanSummary};
use crate::ticket::{PixelAccess, Progress};

pub struct Context {
    registry: Arc<Registry>,
    cache: ObjectCache,
    defaults: Arc<dyn DefaultsSource>,
    config: RuntimeConfig,
}

impl Context {
    /// Context with defaults layers loaded from the configured paths.
    pub fn new(registry: Arc<Registry>, config: RuntimeConfig) -> Result<Self, PipelineError> {
        let defaults = LayeredDefaults::from_config(&config)?;
        Ok(Self::with_defaults(registry, Arc::new(defaults), config))
    }

    pub fn with_defaults(
        registry: Arc<Registry>,
        defaults: Arc<dyn DefaultsSource>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            registry,
            cache: ObjectCache::new(),
            defaults,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ObjectCache {
        &mut self.cache
    }

    pub fn defaults(&self) -> &dyn DefaultsSource {
        self.defaults.as_ref()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Instantiate the first filter matching `pattern`.
    pub fn create_stage(&self, pattern: &str) -> Result<Arc<Stage>, PipelineError> {
        Stage::from_registry(&self.registry, pattern)
    }

    /// The configured policy provider.
    pub fn policy(&self) -> Result<Arc<Provider>, PipelineError> {
        self.registry
            .first(&self.config.policy_pattern, ProviderCategory::Policy)
    }

    /// Validate `options` with the policy provider, then run its correction
    /// pass over `conversion`.
    pub fn correct(
        &self,
        conversion: &Conversion,
        options: &Options,
    ) -> Result<CorrectReport, PipelineError> {
        let provider = self.policy()?;
        let policy = provider.as_policy()?;
        policy.validate_options(options)?;
        policy.correct_graph(conversion, options, self.defaults.as_ref(), &self.config)
    }

    pub fn run_pixels(
        &mut self,
        conversion: &Conversion,
        ticket: &mut PixelAccess,
    ) -> Result<Progress, PipelineError> {
        conversion.run_pixels(&mut self.cache, ticket)
    }

    /// Render until the ticket is exhausted, bounded by the configured pass
    /// limit.
    pub fn render(
        &mut self,
        conversion: &Conversion,
        ticket: &mut PixelAccess,
        on_batch: impl FnMut(&PixelAccess),
    ) -> Result<RenderSummary, PipelineError> {
        conversion.render(
            &mut self.cache,
            ticket,
            self.config.max_render_passes,
            on_batch,
        )
    }

    /// Load `bytes` with the first data codec matching `pattern`. Identical
    /// payloads resolve to the same cached entity.
    pub fn load_data(
        &mut self,
        pattern: &str,
        bytes: &[u8],
        flags: u32,
    ) -> Result<Arc<dyn Object>, PipelineError> {
        let provider = self.registry.first(pattern, ProviderCategory::DataCodec)?;
        let key = format!(
            "{}:{}",
            provider.registration(),
            to_hex(&sha256(bytes))
        );
        let slot = self.cache.get_or_create(&key);
        if let Some(cached) = slot.entry() {
            return Ok(cached);
        }

        let loaded = provider.as_data_codec()?.load_from_memory(bytes, flags)?;
        slot.set(&loaded);
        slot.entry().ok_or_else(|| {
            PipelineError::Codec(format!("cache slot {} lost its entry", slot.key()))
        })
    }

    pub fn scan_data(&self, pattern: &str, bytes: &[u8]) -> Result<ScanSummary, PipelineError> {
        let provider = self.registry.first(pattern, ProviderCategory::DataCodec)?;
        provider.as_data_codec()?.scan(bytes)
    }

    /// First tag codec that reads (or writes) tag type `tag_type`.
    pub fn tag_codec(&self, tag_type: u32, write: bool) -> Result<Arc<Provider>, PipelineError> {
        let query = if write {
            CodecQuery::TagTypeWrite
        } else {
            CodecQuery::TagTypeRead
        };
        let candidates = self.registry.find("", ProviderCategory::TagCodec)?;
        for provider in candidates {
            if provider.as_tag_codec()?.can_handle(query, tag_type) > 0 {
                return Ok(provider);
            }
        }
        Err(PipelineError::ProviderNotFound {
            pattern: format!("tag type {tag_type:#010x}"),
            category: ProviderCategory::TagCodec,
        })
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("providers", &self.registry.len())
            .field("cached", &self.cache.len())
            .field("config", &self.config)
            .finish()
    }
}
