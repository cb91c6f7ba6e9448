//! Policy correction pass.
//!
//! Walks upstream from a conversion's output along data connectors to the
//! first stage governed by the policy, then harmonizes that stage's
//! rendering options with the effective defaults. Options set by the user or
//! derived from data are never overwritten, so repeating the pass changes
//! nothing.

mod defaults;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

pub use defaults::{DefaultSpec, DefaultsLayer, DefaultsSource, LayeredDefaults};

use crate::config::RuntimeConfig;
use crate::error::PipelineError;
use crate::graph::{Conversion, Stage};
use crate::options::{AttributeFilter, OptionEntry, OptionSource, OptionValue, Options};
use crate::registry::RegistrationPath;

/// Options the pass harmonizes, in the order they are applied.
pub const POLICY_KEYS: [&str; 7] = [
    "proof_soft",
    "proof_hard",
    "rendering_intent",
    "rendering_bpc",
    "rendering_intent_proof",
    "rendering_gamut_warning",
    "rendering_high_precision",
];

/// Key of the proofing profile list derived from the defaults.
pub const SIMULATION_KEY: &str = "profiles_simulation";
/// Key of the default proofing profile.
pub const PROOF_PROFILE_KEY: &str = "profile_proof";

/// Result of locating the governed stage.
#[derive(Debug, Clone)]
pub enum PolicyHit {
    Found(Arc<Stage>),
    NotFound,
}

/// Patterns steering a correction pass.
#[derive(Debug, Clone, Copy)]
pub struct CorrectSettings<'a> {
    /// Registration pattern of the governed stage.
    pub stage_pattern: &'a str,
    /// Connector category the walk may follow.
    pub data_category: &'a str,
    pub verbose: bool,
}

impl<'a> CorrectSettings<'a> {
    /// Settings for a policy governing `stage_pattern`, with the walk category
    /// and verbosity taken from `config`.
    pub fn for_config(stage_pattern: &'a str, config: &'a RuntimeConfig) -> Self {
        Self {
            stage_pattern,
            data_category: &config.data_category,
            verbose: config.verbose,
        }
    }
}

/// What a correction pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrectReport {
    /// Id of the corrected stage, if one was found.
    pub stage: Option<u32>,
    /// Keys whose value changed.
    pub changed: Vec<String>,
    /// Keys left alone because they were protected.
    pub kept: Vec<String>,
    /// Keys with no default to apply.
    pub missing: Vec<String>,
    /// Set when the pass hit a hard failure. Missing defaults are not one.
    pub error: bool,
}

/// Outcome of applying one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionChange {
    Changed,
    Unchanged,
    Kept,
    Missing,
}

/// Walk upstream from the conversion's output (or its input when it has no
/// output) to the first stage matching `stage_pattern`. Only edges whose
/// plug and socket are both in `data_category` are followed. The start stage
/// itself is not a candidate.
pub fn find_policy_stage(conversion: &Conversion, settings: &CorrectSettings<'_>) -> PolicyHit {
    let Some(start) = conversion.output().or(conversion.input()) else {
        return PolicyHit::NotFound;
    };
    let pattern = RegistrationPath::parse(settings.stage_pattern);

    let mut visited = HashSet::from([start.id()]);
    let mut queue = VecDeque::from([Arc::clone(start)]);
    while let Some(stage) = queue.pop_front() {
        for plug in stage.plugs() {
            let Some(socket) = plug.remote() else {
                continue;
            };
            if !plug.descriptor().is_category(settings.data_category)
                || !socket.descriptor().is_category(settings.data_category)
            {
                continue;
            }
            let upstream = socket.stage();
            if !visited.insert(upstream.id()) {
                continue;
            }
            if pattern.matches(upstream.registration()) {
                return PolicyHit::Found(Arc::clone(upstream));
            }
            queue.push_back(Arc::clone(upstream));
        }
    }
    PolicyHit::NotFound
}

/// Defaults in effect for `stage`: the policy's declared defaults, then the
/// stage filter's declared defaults, then the layered source.
pub fn effective_defaults(
    stage: &Stage,
    declared: &Options,
    source: &dyn DefaultsSource,
    filter: AttributeFilter,
) -> Options {
    let registration = stage.registration();
    let mut options = Options::new();
    for entry in declared.filtered(filter).iter() {
        let key = entry.key().to_owned();
        options.move_in(OptionEntry {
            registration: registration.join(&key).to_string(),
            source: OptionSource::Defaults,
            ..entry.clone()
        });
    }
    options.merge(&stage.filter().default_options().filtered(filter));
    options.merge(&source.query(registration, filter));
    options
}

/// Apply the default for `key` to `options` unless the current value is
/// protected.
pub fn change_stage_option(options: &mut Options, defaults: &Options, key: &str) -> OptionChange {
    let current = options.find(key);
    if current.is_some_and(OptionEntry::is_protected) {
        tracing::debug!(key, "already set");
        return OptionChange::Kept;
    }
    let Some(default) = defaults.find(key) else {
        tracing::warn!(key, "no default found");
        return OptionChange::Missing;
    };

    let same = current.is_some_and(|c| c.value == default.value);
    let mut entry = default.clone();
    entry.flags.automatic = true;
    options.move_in(entry);
    if same {
        OptionChange::Unchanged
    } else {
        OptionChange::Changed
    }
}

/// Run the correction pass over `conversion`.
///
/// `options` is the option set the caller already applied; a `verbose`
/// entry there raises the pass's log level. `declared` holds the policy's
/// own defaults.
pub fn correct_conversion(
    conversion: &Conversion,
    options: &Options,
    declared: &Options,
    source: &dyn DefaultsSource,
    settings: &CorrectSettings<'_>,
) -> Result<CorrectReport, PipelineError> {
    let verbose = settings.verbose || options.int("verbose").is_some_and(|v| v > 0);
    let stage = match find_policy_stage(conversion, settings) {
        PolicyHit::Found(stage) => stage,
        PolicyHit::NotFound => {
            tracing::debug!(
                conversion = conversion.id(),
                pattern = settings.stage_pattern,
                "no stage governed by the policy"
            );
            return Ok(CorrectReport::default());
        }
    };

    let defaults = effective_defaults(&stage, declared, source, AttributeFilter::ALL);
    if defaults.is_empty() {
        tracing::warn!(stage = stage.id(), "no defaults found for the governed stage");
    }

    let mut report = CorrectReport {
        stage: Some(stage.id()),
        ..CorrectReport::default()
    };
    stage.with_options(|stage_options| {
        for key in POLICY_KEYS {
            match change_stage_option(stage_options, &defaults, key) {
                OptionChange::Changed => report.changed.push(key.to_owned()),
                OptionChange::Unchanged => {}
                OptionChange::Kept => report.kept.push(key.to_owned()),
                OptionChange::Missing => report.missing.push(key.to_owned()),
            }
        }

        if stage_options.find(SIMULATION_KEY).is_none() {
            match defaults.text(PROOF_PROFILE_KEY) {
                Some(profile) => {
                    let mut entry = OptionEntry::new(
                        stage.registration().join(SIMULATION_KEY).as_str(),
                        OptionValue::Profiles(vec![profile.to_owned()]),
                    )
                    .with_source(OptionSource::Defaults);
                    entry.flags.automatic = true;
                    stage_options.move_in(entry);
                    report.changed.push(SIMULATION_KEY.to_owned());
                }
                None => {
                    tracing::warn!(stage = stage.id(), "no default proofing profile");
                    report.missing.push(SIMULATION_KEY.to_owned());
                }
            }
        }
    });

    if verbose {
        tracing::info!(
            stage = stage.id(),
            changed = ?report.changed,
            kept = ?report.kept,
            missing = ?report.missing,
            "policy pass finished"
        );
    } else {
        tracing::debug!(
            stage = stage.id(),
            changed = report.changed.len(),
            kept = report.kept.len(),
            "policy pass finished"
        );
    }
    Ok(report)
}
