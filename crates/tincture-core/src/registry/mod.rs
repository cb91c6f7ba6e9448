//! Registration directory of transform providers.
//!
//! Providers are registered once through a [`RegistryBuilder`] and the
//! finished [`Registry`] is shared read-only behind an `Arc`. Lookups take a
//! registration pattern plus a category and return matches in registration
//! order; callers that want a single provider take the first match.

pub mod pattern;
pub mod provider;

use std::sync::Arc;

pub use pattern::{RegistrationPath, Segment, matches};
pub use provider::{
    CodecQuery, DataCodecApi, FilterApi, MessageLevel, MessageSink, PolicyApi, Provider,
    ProviderApi, ProviderCategory, ScanSummary, TagBlock, TagCodecApi, TagRecord,
};

use crate::error::PipelineError;

/// Collects providers before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    providers: Vec<Arc<Provider>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider. Policy providers are initialized here and rejected if
    /// initialization fails.
    pub fn register(&mut self, provider: Provider) -> Result<&mut Self, PipelineError> {
        if let ProviderApi::Policy(policy) = provider.api() {
            policy.init()?;
        }
        tracing::debug!(
            registration = provider.registration().as_str(),
            category = %provider.category(),
            "registered provider"
        );
        self.providers.push(Arc::new(provider));
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn build(self) -> Arc<Registry> {
        tracing::info!(providers = self.providers.len(), "provider registry ready");
        Arc::new(Registry {
            providers: self.providers,
        })
    }
}

/// Read-only directory of providers.
#[derive(Debug, Default)]
pub struct Registry {
    providers: Vec<Arc<Provider>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Provider>> {
        self.providers.iter()
    }

    /// All providers of `category` whose registration matches `pattern`.
    pub fn find(
        &self,
        pattern: &str,
        category: ProviderCategory,
    ) -> Result<Vec<Arc<Provider>>, PipelineError> {
        let pattern_path = RegistrationPath::parse(pattern);
        let found: Vec<Arc<Provider>> = self
            .providers
            .iter()
            .filter(|p| p.category() == category && pattern_path.matches(p.registration()))
            .cloned()
            .collect();
        if found.is_empty() {
            return Err(PipelineError::ProviderNotFound {
                pattern: pattern.to_owned(),
                category,
            });
        }
        Ok(found)
    }

    /// First provider of `category` matching `pattern`.
    pub fn first(
        &self,
        pattern: &str,
        category: ProviderCategory,
    ) -> Result<Arc<Provider>, PipelineError> {
        let pattern_path = RegistrationPath::parse(pattern);
        self.providers
            .iter()
            .find(|p| p.category() == category && pattern_path.matches(p.registration()))
            .cloned()
            .ok_or_else(|| PipelineError::ProviderNotFound {
                pattern: pattern.to_owned(),
                category,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{PassFilter, TestPolicy};

    fn registry() -> Arc<Registry> {
        let mut builder = Registry::builder();
        builder
            .register(Provider::new(
                "org/test/colour/icc.providerA",
                [1, 0, 0],
                ProviderApi::Filter(Arc::new(PassFilter::data())),
            ))
            .expect("register icc filter");
        builder
            .register(Provider::new(
                "org/test/colour/lut.providerB",
                [1, 0, 0],
                ProviderApi::Filter(Arc::new(PassFilter::data())),
            ))
            .expect("register lut filter");
        builder
            .register(Provider::new(
                "org/test/colour/icc.policy",
                [0, 1, 0],
                ProviderApi::Policy(Arc::new(TestPolicy::default())),
            ))
            .expect("register policy");
        builder.build()
    }

    #[test]
    fn test_find_filters_by_category_and_pattern() {
        let registry = registry();
        let filters = registry
            .find("//colour/icc", ProviderCategory::Filter)
            .expect("icc filter");
        assert_eq!(filters.len(), 1);
        assert_eq!(
            filters[0].registration().as_str(),
            "org/test/colour/icc.providerA"
        );

        let policy = registry
            .first("//colour/icc", ProviderCategory::Policy)
            .expect("policy");
        assert_eq!(policy.version(), [0, 1, 0]);
        assert!(policy.as_policy().is_ok());
        assert!(policy.as_filter().is_err());
    }

    #[test]
    fn test_first_preserves_registration_order() {
        let registry = registry();
        let first = registry
            .first("//colour", ProviderCategory::Filter)
            .expect("any filter");
        assert_eq!(first.registration().as_str(), "org/test/colour/icc.providerA");
        assert_eq!(registry.find("*", ProviderCategory::Filter).map(|v| v.len()).ok(), Some(2));
    }

    #[test]
    fn test_missing_provider_reports_pattern() {
        let registry = registry();
        let err = registry
            .first("//colour/cube", ProviderCategory::Filter)
            .expect_err("no cube provider");
        assert!(matches!(
            err,
            PipelineError::ProviderNotFound { ref pattern, category: ProviderCategory::Filter }
                if pattern == "//colour/cube"
        ));
        assert!(registry.find("//colour/icc", ProviderCategory::TagCodec).is_err());
    }
}
