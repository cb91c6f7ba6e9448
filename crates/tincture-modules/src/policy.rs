//! ICC policy provider.
//!
//! Declares the default profile and rendering options and runs the
//! correction pass over the first ICC transform stage upstream of a
//! conversion's output.

use std::fmt::Write as _;

use parking_lot::RwLock;
use tincture_core::graph::Conversion;
use tincture_core::options::{OptionEntry, OptionFlags, OptionSource, OptionValue, Options};
use tincture_core::policy::{
    CorrectReport, CorrectSettings, DefaultsSource, POLICY_KEYS, PROOF_PROFILE_KEY, SIMULATION_KEY,
    correct_conversion,
};
use tincture_core::registry::{MessageLevel, MessageSink, PolicyApi};
use tincture_core::{PipelineError, RuntimeConfig};

/// Stages this policy governs.
pub const STAGE_PATTERN: &str = "//colour/icc";

const OPTION_ROOT: &str = "org/tincture/colour/icc";

const PROFILE_DEFAULTS: [(&str, &str); 10] = [
    ("editing_rgb", "eciRGB_v2.icc"),
    ("editing_cmyk", "coated_FOGRA39L_argl.icc"),
    ("editing_gray", "Gray.icc"),
    ("editing_lab", "Lab.icc"),
    ("editing_xyz", "XYZ.icc"),
    ("assumed_rgb", "eciRGB_v2.icc"),
    ("assumed_cmyk", "coated_FOGRA39L_argl.icc"),
    ("assumed_gray", "Gray.icc"),
    ("assumed_lab", "Lab.icc"),
    ("assumed_xyz", "XYZ.icc"),
];

/// (key, value, advanced, front)
const BEHAVIOUR_DEFAULTS: [(&str, i64, bool, bool); 12] = [
    ("action_untagged_assign", 1, false, true),
    ("action_mismatch_cmyk", 1, false, true),
    ("action_mismatch_rgb", 1, false, true),
    ("mixed_colour_spaces_print_doc_convert", 1, false, true),
    ("mixed_colour_spaces_screen_doc_convert", 2, false, true),
    ("proof_hard", 0, true, true),
    ("proof_soft", 0, true, true),
    ("rendering_intent", 0, false, false),
    ("rendering_bpc", 1, false, false),
    ("rendering_intent_proof", 0, false, false),
    ("rendering_gamut_warning", 0, true, false),
    ("rendering_high_precision", 0, true, false),
];

const DEFAULT_PROOF_PROFILE: &str = "coated_FOGRA39L_argl.icc";

const INTENT_NAMES: [&str; 4] = [
    "perceptual",
    "relative colorimetric",
    "saturation",
    "absolute colorimetric",
];

fn declared_defaults() -> Options {
    let profiles = PROFILE_DEFAULTS.iter().map(|(key, profile)| {
        OptionEntry::new(format!("{OPTION_ROOT}/profile/{key}"), *profile)
            .with_source(OptionSource::Filter)
            .with_flags(OptionFlags {
                front: true,
                ..OptionFlags::default()
            })
    });
    let behaviour = BEHAVIOUR_DEFAULTS
        .iter()
        .map(|(key, value, advanced, front)| {
            OptionEntry::new(format!("{OPTION_ROOT}/behaviour/{key}"), *value)
                .with_source(OptionSource::Filter)
                .with_flags(OptionFlags {
                    advanced: *advanced,
                    front: *front,
                    ..OptionFlags::default()
                })
        });
    let proof = OptionEntry::new(
        format!("{OPTION_ROOT}/profile/{PROOF_PROFILE_KEY}"),
        DEFAULT_PROOF_PROFILE,
    )
    .with_source(OptionSource::Filter);
    profiles.chain(behaviour).chain(std::iter::once(proof)).collect()
}

pub struct IccPolicy {
    declared: Options,
    stage_pattern: String,
    sink: RwLock<Option<MessageSink>>,
}

impl IccPolicy {
    pub fn new() -> Self {
        Self {
            declared: declared_defaults(),
            stage_pattern: STAGE_PATTERN.to_owned(),
            sink: RwLock::new(None),
        }
    }

    /// Govern stages matching `pattern` instead of [`STAGE_PATTERN`].
    pub fn with_stage_pattern(mut self, pattern: &str) -> Self {
        self.stage_pattern = pattern.to_owned();
        self
    }

    fn message(&self, level: MessageLevel, text: &str) {
        match level {
            MessageLevel::Debug => tracing::debug!("{text}"),
            MessageLevel::Info => tracing::info!("{text}"),
            MessageLevel::Warning => tracing::warn!("{text}"),
            MessageLevel::Error => tracing::error!("{text}"),
        }
        if let Some(sink) = self.sink.read().as_ref() {
            sink(level, text);
        }
    }

    fn reject(&self, key: &str, reason: String) -> PipelineError {
        self.message(MessageLevel::Warning, &format!("option {key}: {reason}"));
        PipelineError::InvalidOption {
            key: key.to_owned(),
            reason,
        }
    }
}

impl Default for IccPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyApi for IccPolicy {
    fn set_message_sink(&self, sink: MessageSink) {
        *self.sink.write() = Some(sink);
    }

    fn validate_options(&self, options: &Options) -> Result<(), PipelineError> {
        for key in ["rendering_intent", "rendering_intent_proof"] {
            let Some(value) = options.value(key) else {
                continue;
            };
            match value.as_int() {
                Some(intent) if (0..=3).contains(&intent) => {}
                _ => return Err(self.reject(key, format!("{value} is not an intent in 0..=3"))),
            }
        }
        for key in POLICY_KEYS
            .iter()
            .filter(|k| !k.starts_with("rendering_intent"))
        {
            let Some(value) = options.value(key) else {
                continue;
            };
            if !matches!(value, OptionValue::Int(0 | 1)) {
                return Err(self.reject(key, format!("{value} is not a 0/1 switch")));
            }
        }
        match options.value(SIMULATION_KEY) {
            Some(OptionValue::Profiles(_) | OptionValue::Text(_)) | None => Ok(()),
            Some(_) => Err(self.reject(SIMULATION_KEY, "expected a profile list".into())),
        }
    }

    fn default_options(&self) -> Options {
        self.declared.clone()
    }

    fn ui_text(&self, options: &Options) -> String {
        let lookup = |key: &str| {
            options
                .value(key)
                .or_else(|| self.declared.value(key))
                .map(ToString::to_string)
                .unwrap_or_default()
        };

        let mut text = String::from("Default Profiles:\n");
        for (key, _) in PROFILE_DEFAULTS {
            let _ = writeln!(text, "  {key}: {}", lookup(key));
        }
        text.push_str("Behaviour:\n");
        for (key, ..) in BEHAVIOUR_DEFAULTS {
            let value = lookup(key);
            let label = key
                .starts_with("rendering_intent")
                .then(|| value.parse::<usize>().ok())
                .flatten()
                .and_then(|i| INTENT_NAMES.get(i));
            match label {
                Some(name) => {
                    let _ = writeln!(text, "  {key}: {value} ({name})");
                }
                None => {
                    let _ = writeln!(text, "  {key}: {value}");
                }
            }
        }
        text
    }

    fn correct_graph(
        &self,
        conversion: &Conversion,
        options: &Options,
        defaults: &dyn DefaultsSource,
        config: &RuntimeConfig,
    ) -> Result<CorrectReport, PipelineError> {
        let settings = CorrectSettings::for_config(&self.stage_pattern, config);
        let report = correct_conversion(conversion, options, &self.declared, defaults, &settings)?;
        if report.stage.is_some() && !report.missing.is_empty() {
            self.message(
                MessageLevel::Warning,
                &format!("no defaults for {}", report.missing.join(", ")),
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn test_declared_defaults() {
        let policy = IccPolicy::new();
        let defaults = policy.default_options();
        assert_eq!(defaults.int("rendering_intent"), Some(0));
        assert_eq!(defaults.int("rendering_bpc"), Some(1));
        assert_eq!(defaults.text("editing_rgb"), Some("eciRGB_v2.icc"));
        assert_eq!(defaults.text(PROOF_PROFILE_KEY), Some(DEFAULT_PROOF_PROFILE));
        let warning = defaults.find("rendering_gamut_warning").expect("declared");
        assert!(warning.flags.advanced);
        for key in POLICY_KEYS {
            assert!(defaults.find(key).is_some(), "{key} has no declared default");
        }
    }

    #[test]
    fn test_validate_ranges() {
        let policy = IccPolicy::new();
        let mut options = Options::new();
        options.set_user("x/rendering_intent", 3).set_user("x/rendering_bpc", 0);
        assert!(policy.validate_options(&options).is_ok());

        options.set_user("x/rendering_intent", 4);
        assert!(matches!(
            policy.validate_options(&options),
            Err(PipelineError::InvalidOption { ref key, .. }) if key == "rendering_intent"
        ));

        let mut switches = Options::new();
        switches.set_user("x/proof_soft", 2);
        assert!(policy.validate_options(&switches).is_err());

        let mut simulation = Options::new();
        simulation.set_user("x/profiles_simulation", 1);
        assert!(policy.validate_options(&simulation).is_err());
    }

    #[test]
    fn test_rejections_reach_message_sink() {
        let policy = IccPolicy::new();
        let seen: Arc<Mutex<Vec<(MessageLevel, String)>>> = Arc::default();
        let sink_seen = Arc::clone(&seen);
        policy.set_message_sink(Arc::new(move |level, text| {
            sink_seen.lock().push((level, text.to_owned()));
        }));

        let mut options = Options::new();
        options.set_user("x/rendering_intent_proof", -1);
        assert!(policy.validate_options(&options).is_err());
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, MessageLevel::Warning);
        assert!(seen[0].1.contains("rendering_intent_proof"));
    }

    #[test]
    fn test_ui_text_prefers_given_options() {
        let policy = IccPolicy::new();
        let mut options = Options::new();
        options.set_user("x/rendering_intent", 1);
        let text = policy.ui_text(&options);
        assert!(text.starts_with("Default Profiles:\n"));
        assert!(text.contains("editing_cmyk: coated_FOGRA39L_argl.icc"));
        assert!(text.contains("rendering_intent: 1 (relative colorimetric)"));
        assert!(text.contains("rendering_bpc: 1\n"));
    }
}
