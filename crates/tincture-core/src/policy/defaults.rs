//! Sources of default option values consulted by the policy pass.
//!
//! Defaults come in layers. Each layer maps registration patterns to
//! key/value pairs; later layers override earlier ones key by key. A layer is
//! a JSON document such as
//!
//! ```json
//! {
//!   "//colour/icc": {
//!     "rendering_intent": 1,
//!     "rendering_gamut_warning": { "value": 0, "advanced": true }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::RuntimeConfig;
use crate::error::PipelineError;
use crate::options::{AttributeFilter, OptionEntry, OptionFlags, OptionSource, OptionValue, Options};
use crate::registry::RegistrationPath;

/// Answers "which defaults apply to a stage with this registration".
pub trait DefaultsSource: Send + Sync {
    fn query(&self, registration: &RegistrationPath, filter: AttributeFilter) -> Options;
}

/// A fixed option set answers every query with itself.
impl DefaultsSource for Options {
    fn query(&self, _registration: &RegistrationPath, filter: AttributeFilter) -> Options {
        self.filtered(filter)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultSpec {
    Detailed {
        value: serde_json::Value,
        #[serde(default)]
        advanced: bool,
        #[serde(default)]
        front: bool,
        #[serde(default)]
        locked: bool,
    },
    Plain(serde_json::Value),
}

impl DefaultSpec {
    fn to_entry(&self, registration: &RegistrationPath, key: &str) -> Option<OptionEntry> {
        let (value, flags) = match self {
            Self::Detailed {
                value,
                advanced,
                front,
                locked,
            } => (
                value,
                OptionFlags {
                    advanced: *advanced,
                    front: *front,
                    locked: *locked,
                    automatic: false,
                },
            ),
            Self::Plain(value) => (value, OptionFlags::default()),
        };
        let value = json_to_option(value)?;
        Some(
            OptionEntry::new(registration.join(key).as_str(), value)
                .with_source(OptionSource::Defaults)
                .with_flags(flags),
        )
    }
}

fn json_to_option(value: &serde_json::Value) -> Option<OptionValue> {
    match value {
        serde_json::Value::Bool(b) => Some(OptionValue::from(*b)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(OptionValue::Int)
            .or_else(|| n.as_f64().map(OptionValue::Double)),
        serde_json::Value::String(s) => Some(OptionValue::Text(s.clone())),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_owned))
            .collect::<Option<Vec<_>>>()
            .map(OptionValue::Profiles),
        _ => None,
    }
}

/// One layer of defaults: registration pattern -> key -> value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DefaultsLayer {
    entries: BTreeMap<String, BTreeMap<String, DefaultSpec>>,
}

impl DefaultsLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self, PipelineError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn insert(&mut self, pattern: &str, key: &str, value: impl Into<serde_json::Value>) {
        self.entries
            .entry(pattern.to_owned())
            .or_default()
            .insert(key.to_owned(), DefaultSpec::Plain(value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ordered stack of defaults layers; later layers win.
#[derive(Debug, Clone, Default)]
pub struct LayeredDefaults {
    layers: Vec<(String, DefaultsLayer)>,
}

impl LayeredDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &str, layer: DefaultsLayer) -> &mut Self {
        self.layers.push((name.to_owned(), layer));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// System layer, then user layer, from the configured paths. A configured
    /// file that does not exist is skipped with a warning.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, PipelineError> {
        let mut defaults = Self::new();
        for (name, path) in [
            ("system", config.system_policy.as_deref()),
            ("user", config.user_policy.as_deref()),
        ] {
            let Some(path) = path else {
                continue;
            };
            match DefaultsLayer::load(path) {
                Ok(layer) => {
                    tracing::info!(layer = name, path = %path.display(), "loaded policy defaults");
                    defaults.push(name, layer);
                }
                Err(PipelineError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                    tracing::warn!(layer = name, path = %path.display(), "policy defaults file not found");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(defaults)
    }
}

impl DefaultsSource for LayeredDefaults {
    fn query(&self, registration: &RegistrationPath, filter: AttributeFilter) -> Options {
        let mut options = Options::new();
        for (name, layer) in &self.layers {
            for (pattern, keys) in &layer.entries {
                if !RegistrationPath::parse(pattern).matches(registration) {
                    continue;
                }
                for (key, spec) in keys {
                    let Some(entry) = spec.to_entry(registration, key) else {
                        tracing::warn!(layer = %name, key = %key, "unsupported default value");
                        continue;
                    };
                    if filter.admits(&entry.flags) {
                        options.move_in(entry);
                    }
                }
            }
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYSTEM: &str = r#"{
        "//colour/icc": {
            "rendering_intent": 0,
            "rendering_bpc": true,
            "rendering_gamut_warning": { "value": 0, "advanced": true },
            "profile_proof": "coated_FOGRA39L_argl.icc"
        },
        "//colour/lut": { "rendering_intent": 2 }
    }"#;

    fn icc() -> RegistrationPath {
        RegistrationPath::parse("org/tincture/colour/icc.transform")
    }

    #[test]
    fn test_query_selects_matching_patterns() {
        let mut defaults = LayeredDefaults::new();
        defaults.push("system", DefaultsLayer::from_json(SYSTEM).expect("parse"));
        let options = defaults.query(&icc(), AttributeFilter::default());
        assert_eq!(options.int("rendering_intent"), Some(0));
        assert_eq!(options.int("rendering_bpc"), Some(1));
        assert_eq!(options.text("profile_proof"), Some("coated_FOGRA39L_argl.icc"));
        assert!(options.find("rendering_gamut_warning").is_none());
        let entry = options.find("rendering_intent").expect("entry");
        assert_eq!(entry.source, OptionSource::Defaults);
        assert_eq!(
            entry.registration,
            "org/tincture/colour/icc.transform/rendering_intent"
        );
    }

    #[test]
    fn test_advanced_filter_admits_tagged_entries() {
        let mut defaults = LayeredDefaults::new();
        defaults.push("system", DefaultsLayer::from_json(SYSTEM).expect("parse"));
        let options = defaults.query(&icc(), AttributeFilter::ALL);
        let warning = options.find("rendering_gamut_warning").expect("advanced entry");
        assert!(warning.flags.advanced);
    }

    #[test]
    fn test_later_layer_wins() {
        let mut user = DefaultsLayer::new();
        user.insert("//colour/icc", "rendering_intent", 3);
        let mut defaults = LayeredDefaults::new();
        defaults
            .push("system", DefaultsLayer::from_json(SYSTEM).expect("parse"))
            .push("user", user);
        let options = defaults.query(&icc(), AttributeFilter::ALL);
        assert_eq!(options.int("rendering_intent"), Some(3));
        assert_eq!(options.int("rendering_bpc"), Some(1));
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let config = RuntimeConfig {
            system_policy: Some("/nonexistent/tincture/system.json".into()),
            user_policy: None,
            ..RuntimeConfig::builtin()
        };
        let defaults = LayeredDefaults::from_config(&config).expect("missing file tolerated");
        assert!(defaults.is_empty());
    }

    #[test]
    fn test_malformed_layer_rejected() {
        assert!(matches!(
            DefaultsLayer::from_json("{ \"//colour/icc\": 3 }"),
            Err(PipelineError::Json(_))
        ));
    }
}
