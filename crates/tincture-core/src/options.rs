//! Ordered option sets attached to stages and consulted by policies.
//!
//! An option is addressed by the last segment of its registration, so
//! `org/tincture/colour/icc/rendering_intent` is found under the key
//! `rendering_intent`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionValue {
    Int(i64),
    Double(f64),
    Text(String),
    /// A list of profile names.
    Profiles(Vec<String>),
}

impl OptionValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_profiles(&self) -> Option<&[String]> {
        match self {
            Self::Profiles(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Profiles(v) => f.write_str(&v.join(", ")),
        }
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Where an option value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionSource {
    #[default]
    None,
    /// Set explicitly by the user; never overwritten by policy.
    User,
    /// Derived from the processed data; never overwritten by policy.
    Data,
    /// Declared by a filter.
    Filter,
    /// Taken from a defaults layer.
    Defaults,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionFlags {
    /// Protected from policy edits.
    pub locked: bool,
    /// Inserted automatically by a policy pass.
    pub automatic: bool,
    /// Only shown to advanced users.
    pub advanced: bool,
    /// Shown in front-end dialogs.
    pub front: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionEntry {
    pub registration: String,
    pub value: OptionValue,
    #[serde(default)]
    pub source: OptionSource,
    #[serde(default)]
    pub flags: OptionFlags,
}

impl OptionEntry {
    pub fn new(registration: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        Self {
            registration: registration.into(),
            value: value.into(),
            source: OptionSource::None,
            flags: OptionFlags::default(),
        }
    }

    pub fn with_source(mut self, source: OptionSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_flags(mut self, flags: OptionFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Lookup key: the last registration segment up to its first `.`.
    pub fn key(&self) -> &str {
        option_key(&self.registration)
    }

    /// User- or data-sourced and locked options are left alone by policy.
    pub fn is_protected(&self) -> bool {
        matches!(self.source, OptionSource::User | OptionSource::Data) || self.flags.locked
    }
}

fn option_key(registration: &str) -> &str {
    let last = registration
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or_default();
    last.split('.').next().unwrap_or_default()
}

/// Which attribute-tagged options a query admits. Untagged options always
/// pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttributeFilter {
    pub advanced: bool,
    pub front: bool,
}

impl AttributeFilter {
    pub const ALL: Self = Self {
        advanced: true,
        front: true,
    };

    pub fn admits(&self, flags: &OptionFlags) -> bool {
        (!flags.advanced || self.advanced) && (!flags.front || self.front)
    }
}

/// Ordered collection of options, unique by key. Deserialized lists go
/// through [`Options::move_in`], so a repeated key keeps its first position
/// and its last value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<OptionEntry>", into = "Vec<OptionEntry>")]
pub struct Options {
    entries: Vec<OptionEntry>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OptionEntry> {
        self.entries.iter()
    }

    pub fn find(&self, key: &str) -> Option<&OptionEntry> {
        self.entries.iter().find(|e| e.key() == key)
    }

    pub fn find_mut(&mut self, key: &str) -> Option<&mut OptionEntry> {
        self.entries.iter_mut().find(|e| e.key() == key)
    }

    pub fn value(&self, key: &str) -> Option<&OptionValue> {
        self.find(key).map(|e| &e.value)
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.value(key).and_then(OptionValue::as_int)
    }

    pub fn double(&self, key: &str) -> Option<f64> {
        self.value(key).and_then(OptionValue::as_double)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.value(key).and_then(OptionValue::as_text)
    }

    /// Insert `entry`, replacing any entry with the same key in place.
    /// Returns the replaced entry.
    pub fn move_in(&mut self, entry: OptionEntry) -> Option<OptionEntry> {
        match self.entries.iter().position(|e| e.key() == entry.key()) {
            Some(index) => Some(std::mem::replace(&mut self.entries[index], entry)),
            None => {
                self.entries.push(entry);
                None
            }
        }
    }

    /// Shorthand for a user-sourced [`Options::move_in`].
    pub fn set_user(&mut self, registration: &str, value: impl Into<OptionValue>) -> &mut Self {
        self.move_in(OptionEntry::new(registration, value).with_source(OptionSource::User));
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<OptionEntry> {
        let index = self.entries.iter().position(|e| e.key() == key)?;
        Some(self.entries.remove(index))
    }

    /// Overlay `other` on top of `self`, key by key.
    pub fn merge(&mut self, other: &Options) {
        for entry in &other.entries {
            self.move_in(entry.clone());
        }
    }

    pub fn filtered(&self, filter: AttributeFilter) -> Options {
        Options {
            entries: self
                .entries
                .iter()
                .filter(|e| filter.admits(&e.flags))
                .cloned()
                .collect(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, PipelineError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, PipelineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl FromIterator<OptionEntry> for Options {
    fn from_iter<I: IntoIterator<Item = OptionEntry>>(iter: I) -> Self {
        let mut options = Options::new();
        for entry in iter {
            options.move_in(entry);
        }
        options
    }
}

impl From<Vec<OptionEntry>> for Options {
    fn from(entries: Vec<OptionEntry>) -> Self {
        entries.into_iter().collect()
    }
}

impl From<Options> for Vec<OptionEntry> {
    fn from(options: Options) -> Self {
        options.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_last_segment_head() {
        let entry = OptionEntry::new("org/tincture/colour/icc/rendering_intent", 1);
        assert_eq!(entry.key(), "rendering_intent");
        let dotted = OptionEntry::new("org/tincture/colour/icc/proof_soft.advanced", 0);
        assert_eq!(dotted.key(), "proof_soft");
        assert_eq!(OptionEntry::new("gain", 2.0).key(), "gain");
    }

    #[test]
    fn test_move_in_replaces_in_place() {
        let mut options = Options::new();
        options.move_in(OptionEntry::new("a/rendering_intent", 0));
        options.move_in(OptionEntry::new("a/rendering_bpc", 1));
        let old = options.move_in(OptionEntry::new("b/rendering_intent", 3));
        assert_eq!(old.map(|e| e.value), Some(OptionValue::Int(0)));
        assert_eq!(options.len(), 2);
        assert_eq!(options.iter().next().map(OptionEntry::key), Some("rendering_intent"));
        assert_eq!(options.int("rendering_intent"), Some(3));
    }

    #[test]
    fn test_protection_rules() {
        let user = OptionEntry::new("x/a", 1).with_source(OptionSource::User);
        let data = OptionEntry::new("x/b", 1).with_source(OptionSource::Data);
        let locked = OptionEntry::new("x/c", 1).with_flags(OptionFlags {
            locked: true,
            ..OptionFlags::default()
        });
        let loose = OptionEntry::new("x/d", 1).with_source(OptionSource::Defaults);
        assert!(user.is_protected());
        assert!(data.is_protected());
        assert!(locked.is_protected());
        assert!(!loose.is_protected());
    }

    #[test]
    fn test_attribute_filter() {
        let advanced = OptionFlags {
            advanced: true,
            ..OptionFlags::default()
        };
        let options: Options = [
            OptionEntry::new("x/plain", 0),
            OptionEntry::new("x/hidden", 0).with_flags(advanced),
        ]
        .into_iter()
        .collect();
        assert_eq!(options.filtered(AttributeFilter::default()).len(), 1);
        assert_eq!(options.filtered(AttributeFilter::ALL).len(), 2);
    }

    #[test]
    fn test_json_with_repeated_key_stays_unique() {
        let listed = vec![
            OptionEntry::new("x/rendering_intent", 1),
            OptionEntry::new("x/rendering_bpc", 0),
            OptionEntry::new("y/rendering_intent", 3).with_source(OptionSource::User),
        ];
        let text = serde_json::to_string(&listed).expect("serialize");
        let options = Options::from_json(&text).expect("parse");
        assert_eq!(options.len(), 2);
        assert_eq!(options.int("rendering_intent"), Some(3));
        assert_eq!(options.iter().next().map(OptionEntry::key), Some("rendering_intent"));
        assert_eq!(options.find("rendering_intent").map(|e| e.source), Some(OptionSource::User));
    }

    #[test]
    fn test_json_round_trip_keeps_order_and_source() {
        let mut options = Options::new();
        options
            .set_user("x/rendering_intent", 2)
            .set_user("x/profiles_simulation", OptionValue::Profiles(vec!["proof.icc".into()]));
        let text = options.to_json().expect("serialize");
        let back = Options::from_json(&text).expect("parse");
        assert_eq!(back, options);
        assert_eq!(back.find("rendering_intent").map(|e| e.source), Some(OptionSource::User));
    }
}
