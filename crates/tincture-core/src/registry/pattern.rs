//! Registration paths and the pattern matcher used to select providers,
//! stages and connector categories.
//!
//! A registration is a `/`-separated list of segments, each segment a
//! `.`-separated set of keys, for example `org/tincture/colour/icc.transform`.
//! A pattern matches a registration when every pattern segment finds a
//! candidate segment holding all of its keys, at consecutive positions.
//!
//! Patterns starting with `//`, and single-segment patterns, float: they may
//! match at any position. Other patterns are anchored at the first segment.
//! A `*` segment matches any single segment, and the empty pattern matches
//! everything.

use std::fmt;

use serde::{Deserialize, Serialize};

const WILDCARD: &str = "*";

/// One `/`-separated segment of a registration path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    keys: Vec<String>,
}

impl Segment {
    fn parse(text: &str) -> Self {
        Self {
            keys: text
                .split('.')
                .filter(|k| !k.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// First key of the segment, e.g. `icc` for `icc.transform`.
    pub fn head(&self) -> &str {
        self.keys.first().map(String::as_str).unwrap_or_default()
    }

    pub fn is_wildcard(&self) -> bool {
        self.keys.len() == 1 && self.keys[0] == WILDCARD
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    fn admits(&self, candidate: &Segment) -> bool {
        self.is_wildcard() || self.keys.iter().all(|k| candidate.contains(k))
    }
}

/// A parsed registration path or pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistrationPath {
    raw: String,
    segments: Vec<Segment>,
    floating: bool,
}

impl RegistrationPath {
    pub fn parse(text: &str) -> Self {
        let raw = text.trim();
        let segments: Vec<Segment> = raw
            .split('/')
            .filter(|s| !s.is_empty())
            .map(Segment::parse)
            .filter(|s| !s.keys.is_empty())
            .collect();
        let floating = raw.starts_with("//") || (!raw.contains('/') && segments.len() == 1);
        Self {
            raw: raw.to_owned(),
            segments,
            floating,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn last_segment(&self) -> Option<&Segment> {
        self.segments.last()
    }

    pub fn is_floating(&self) -> bool {
        self.floating
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append a segment, returning a new path. Used to derive option
    /// registrations from a stage registration.
    pub fn join(&self, tail: &str) -> Self {
        let base = self.raw.trim_end_matches('/');
        Self::parse(&format!("{base}/{}", tail.trim_start_matches('/')))
    }

    /// Whether `self`, read as a pattern, selects `candidate`.
    pub fn matches(&self, candidate: &RegistrationPath) -> bool {
        let pattern = &self.segments;
        let target = &candidate.segments;
        if pattern.is_empty() {
            return true;
        }
        if pattern.len() > target.len() {
            return false;
        }

        let fits_at = |start: usize| {
            pattern
                .iter()
                .zip(&target[start..])
                .all(|(p, c)| p.admits(c))
        };

        if self.floating {
            (0..=target.len() - pattern.len()).any(fits_at)
        } else {
            fits_at(0)
        }
    }
}

impl From<&str> for RegistrationPath {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl fmt::Display for RegistrationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for RegistrationPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for RegistrationPath {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Match a pattern string against a registration string.
pub fn matches(pattern: &str, registration: &str) -> bool {
    RegistrationPath::parse(pattern).matches(&RegistrationPath::parse(registration))
}
