//! Stage options.
//!
//! Configuration arrives as a flat [`OptionMap`] of strings. Each stage
//! publishes an [`OptionSchema`]; resolving the map against the schema
//! parses every value into a typed [`OptionValue`], applies defaults and
//! range checks, and rejects unknown keys unless the caller opts out with
//! [`UnknownOptionPolicy::Ignore`].
//!
//! # Example
//!
//! ```ignore
//! let schema = OptionSchema::new()
//!     .int("queue_size", 4, 1, 64, "maximum buffered units")
//!     .pixel_format("pix_fmt", None, "output pixel format");
//!
//! let map = OptionMap::parse("queue_size=2:pix_fmt=nv12")?;
//! let opts = schema.resolve(&map, UnknownOptionPolicy::Reject)?;
//! assert_eq!(opts.int("queue_size")?, 2);
//! ```

use crate::error::{Error, Result};
use crate::frame::{parse_image_size, PixelFormat};
use crate::rational::Rational;
use crate::sample::{ChannelLayout, SampleFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Flat string-keyed configuration map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionMap(BTreeMap<String, String>);

impl OptionMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `key=value` pairs separated by `:`.
    ///
    /// An empty string yields an empty map.
    pub fn parse(s: &str) -> Result<Self> {
        let mut map = Self::new();
        for pair in s.split(':').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                Error::invalid_config(format!("expected key=value, got '{pair}'"))
            })?;
            map.set(key.trim(), value.trim());
        }
        Ok(map)
    }

    /// Set an option, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) -> &mut Self {
        self.0.insert(key.into(), value.to_string());
        self
    }

    /// Builder-style [`OptionMap::set`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    /// Get a raw value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Remove a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Check if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for OptionMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.set(k, v);
        }
        map
    }
}

impl fmt::Display for OptionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

/// What to do with keys the schema does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownOptionPolicy {
    /// Fail with [`Error::UnknownOption`].
    #[default]
    Reject,
    /// Silently skip.
    Ignore,
}

/// Kind of value an option holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// Signed integer.
    Int,
    /// Floating point.
    Float,
    /// Boolean.
    Bool,
    /// Free-form or enumerated string.
    Str,
    /// Rational number.
    Rational,
    /// Pixel format name.
    PixelFormat,
    /// Sample format name.
    SampleFormat,
    /// Channel layout name.
    ChannelLayout,
    /// `WIDTHxHEIGHT`.
    ImageSize,
}

/// A typed option value.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    /// Signed integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// String.
    Str(String),
    /// Rational number.
    Rational(Rational),
    /// Pixel format.
    PixelFormat(PixelFormat),
    /// Sample format.
    SampleFormat(SampleFormat),
    /// Channel layout.
    ChannelLayout(ChannelLayout),
    /// Picture dimensions.
    ImageSize(u32, u32),
}

impl OptionValue {
    /// Get the kind of this value.
    pub fn kind(&self) -> OptionKind {
        match self {
            Self::Int(_) => OptionKind::Int,
            Self::Float(_) => OptionKind::Float,
            Self::Bool(_) => OptionKind::Bool,
            Self::Str(_) => OptionKind::Str,
            Self::Rational(_) => OptionKind::Rational,
            Self::PixelFormat(_) => OptionKind::PixelFormat,
            Self::SampleFormat(_) => OptionKind::SampleFormat,
            Self::ChannelLayout(_) => OptionKind::ChannelLayout,
            Self::ImageSize(..) => OptionKind::ImageSize,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
            Self::Rational(v) => write!(f, "{v}"),
            Self::PixelFormat(v) => write!(f, "{v}"),
            Self::SampleFormat(v) => write!(f, "{v}"),
            Self::ChannelLayout(v) => write!(f, "{v}"),
            Self::ImageSize(w, h) => write!(f, "{w}x{h}"),
        }
    }
}

/// Declaration of one option.
#[derive(Debug, Clone)]
pub struct OptionSpec {
    /// Option name.
    pub name: &'static str,
    /// Value kind.
    pub kind: OptionKind,
    /// Value used when the option is not given.
    pub default: Option<OptionValue>,
    /// Inclusive lower bound for numeric kinds.
    pub min: f64,
    /// Inclusive upper bound for numeric kinds.
    pub max: f64,
    /// Allowed values for string kinds (empty = any).
    pub choices: &'static [&'static str],
    /// One-line description.
    pub help: &'static str,
}

impl OptionSpec {
    fn new(name: &'static str, kind: OptionKind, help: &'static str) -> Self {
        Self {
            name,
            kind,
            default: None,
            min: f64::MIN,
            max: f64::MAX,
            choices: &[],
            help,
        }
    }

    /// Parse a raw string according to this spec.
    pub fn parse(&self, raw: &str) -> Result<OptionValue> {
        let raw = raw.trim();
        let invalid = |reason: String| Error::invalid_option(self.name, reason);
        let value = match self.kind {
            OptionKind::Int => {
                let v = raw
                    .parse::<i64>()
                    .map_err(|_| invalid(format!("'{raw}' is not an integer")))?;
                self.check_range(v as f64)?;
                OptionValue::Int(v)
            }
            OptionKind::Float => {
                let v = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| invalid(format!("'{raw}' is not a number")))?;
                self.check_range(v)?;
                OptionValue::Float(v)
            }
            OptionKind::Bool => OptionValue::Bool(match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(invalid(format!("'{raw}' is not a boolean"))),
            }),
            OptionKind::Str => {
                if !self.choices.is_empty() && !self.choices.contains(&raw) {
                    return Err(invalid(format!(
                        "'{raw}' is not one of {}",
                        self.choices.join("|")
                    )));
                }
                OptionValue::Str(raw.to_string())
            }
            OptionKind::Rational => {
                let v: Rational = raw.parse().map_err(|e: Error| invalid(e.to_string()))?;
                self.check_range(v.to_f64())?;
                OptionValue::Rational(v)
            }
            OptionKind::PixelFormat => {
                OptionValue::PixelFormat(raw.parse().map_err(|e: Error| invalid(e.to_string()))?)
            }
            OptionKind::SampleFormat => {
                OptionValue::SampleFormat(raw.parse().map_err(|e: Error| invalid(e.to_string()))?)
            }
            OptionKind::ChannelLayout => {
                OptionValue::ChannelLayout(raw.parse().map_err(|e: Error| invalid(e.to_string()))?)
            }
            OptionKind::ImageSize => {
                let (w, h) = parse_image_size(raw).map_err(|e| invalid(e.to_string()))?;
                OptionValue::ImageSize(w, h)
            }
        };
        Ok(value)
    }

    fn check_range(&self, v: f64) -> Result<()> {
        if v < self.min || v > self.max {
            return Err(Error::invalid_option(
                self.name,
                format!("{v} outside [{}, {}]", self.min, self.max),
            ));
        }
        Ok(())
    }
}

/// Ordered set of option declarations for one stage.
#[derive(Debug, Clone, Default)]
pub struct OptionSchema {
    specs: Vec<OptionSpec>,
}

impl OptionSchema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a declaration.
    #[must_use]
    pub fn with(mut self, spec: OptionSpec) -> Self {
        self.specs.retain(|s| s.name != spec.name);
        self.specs.push(spec);
        self
    }

    /// Declare an integer option.
    #[must_use]
    pub fn int(self, name: &'static str, default: i64, min: i64, max: i64, help: &'static str) -> Self {
        let mut spec = OptionSpec::new(name, OptionKind::Int, help);
        spec.default = Some(OptionValue::Int(default));
        spec.min = min as f64;
        spec.max = max as f64;
        self.with(spec)
    }

    /// Declare an integer option with no default.
    #[must_use]
    pub fn optional_int(self, name: &'static str, min: i64, max: i64, help: &'static str) -> Self {
        let mut spec = OptionSpec::new(name, OptionKind::Int, help);
        spec.min = min as f64;
        spec.max = max as f64;
        self.with(spec)
    }

    /// Declare a floating point option.
    #[must_use]
    pub fn float(self, name: &'static str, default: f64, min: f64, max: f64, help: &'static str) -> Self {
        let mut spec = OptionSpec::new(name, OptionKind::Float, help);
        spec.default = Some(OptionValue::Float(default));
        spec.min = min;
        spec.max = max;
        self.with(spec)
    }

    /// Declare a boolean option.
    #[must_use]
    pub fn flag(self, name: &'static str, default: bool, help: &'static str) -> Self {
        let mut spec = OptionSpec::new(name, OptionKind::Bool, help);
        spec.default = Some(OptionValue::Bool(default));
        self.with(spec)
    }

    /// Declare a string option restricted to `choices`.
    #[must_use]
    pub fn choice(
        self,
        name: &'static str,
        default: &'static str,
        choices: &'static [&'static str],
        help: &'static str,
    ) -> Self {
        let mut spec = OptionSpec::new(name, OptionKind::Str, help);
        spec.default = Some(OptionValue::Str(default.to_string()));
        spec.choices = choices;
        self.with(spec)
    }

    /// Declare a free-form string option with no default.
    #[must_use]
    pub fn string(self, name: &'static str, help: &'static str) -> Self {
        self.with(OptionSpec::new(name, OptionKind::Str, help))
    }

    /// Declare a rational option.
    #[must_use]
    pub fn rational(self, name: &'static str, default: Option<Rational>, help: &'static str) -> Self {
        let mut spec = OptionSpec::new(name, OptionKind::Rational, help);
        spec.default = default.map(OptionValue::Rational);
        self.with(spec)
    }

    /// Declare a pixel format option.
    #[must_use]
    pub fn pixel_format(self, name: &'static str, default: Option<PixelFormat>, help: &'static str) -> Self {
        let mut spec = OptionSpec::new(name, OptionKind::PixelFormat, help);
        spec.default = default.map(OptionValue::PixelFormat);
        self.with(spec)
    }

    /// Declare a sample format option.
    #[must_use]
    pub fn sample_format(self, name: &'static str, default: Option<SampleFormat>, help: &'static str) -> Self {
        let mut spec = OptionSpec::new(name, OptionKind::SampleFormat, help);
        spec.default = default.map(OptionValue::SampleFormat);
        self.with(spec)
    }

    /// Declare a channel layout option.
    #[must_use]
    pub fn channel_layout(self, name: &'static str, default: Option<ChannelLayout>, help: &'static str) -> Self {
        let mut spec = OptionSpec::new(name, OptionKind::ChannelLayout, help);
        spec.default = default.map(OptionValue::ChannelLayout);
        self.with(spec)
    }

    /// Declare an image size option.
    #[must_use]
    pub fn image_size(self, name: &'static str, help: &'static str) -> Self {
        self.with(OptionSpec::new(name, OptionKind::ImageSize, help))
    }

    /// Append every declaration of `other`.
    #[must_use]
    pub fn merge(mut self, other: OptionSchema) -> Self {
        for spec in other.specs {
            self = self.with(spec);
        }
        self
    }

    /// Look up a declaration.
    pub fn spec(&self, name: &str) -> Option<&OptionSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    /// Iterate over declarations.
    pub fn specs(&self) -> impl Iterator<Item = &OptionSpec> {
        self.specs.iter()
    }

    /// Parse `map` into typed options.
    pub fn resolve(&self, map: &OptionMap, policy: UnknownOptionPolicy) -> Result<Options> {
        let mut values = BTreeMap::new();
        for spec in &self.specs {
            if let Some(default) = &spec.default {
                values.insert(spec.name, default.clone());
            }
        }
        for (key, raw) in map.iter() {
            match self.spec(key) {
                Some(spec) => {
                    values.insert(spec.name, spec.parse(raw)?);
                }
                None if policy == UnknownOptionPolicy::Ignore => {}
                None => return Err(Error::UnknownOption(key.to_string())),
            }
        }
        Ok(Options { values })
    }
}

/// Options resolved against a schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    values: BTreeMap<&'static str, OptionValue>,
}

macro_rules! typed_accessor {
    ($(#[$doc:meta])* $fn:ident, $variant:ident, $ty:ty) => {
        $(#[$doc])*
        pub fn $fn(&self, name: &str) -> Result<$ty> {
            match self.lookup(name)? {
                OptionValue::$variant(v) => Ok(v.clone()),
                other => Err(Error::invalid_option(
                    name,
                    format!("holds a {:?} value, not {}", other.kind(), stringify!($variant)),
                )),
            }
        }
    };
}

impl Options {
    fn lookup(&self, name: &str) -> Result<&OptionValue> {
        self.values
            .get(name)
            .ok_or_else(|| Error::invalid_option(name, "not set"))
    }

    /// Check if the option has a value (given or defaulted).
    pub fn is_set(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Get the raw typed value.
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    typed_accessor!(
        /// Get an integer option.
        int, Int, i64
    );
    typed_accessor!(
        /// Get a floating point option.
        float, Float, f64
    );
    typed_accessor!(
        /// Get a boolean option.
        flag, Bool, bool
    );
    typed_accessor!(
        /// Get a string option.
        string, Str, String
    );
    typed_accessor!(
        /// Get a rational option.
        rational, Rational, Rational
    );
    typed_accessor!(
        /// Get a pixel format option.
        pixel_format, PixelFormat, PixelFormat
    );
    typed_accessor!(
        /// Get a sample format option.
        sample_format, SampleFormat, SampleFormat
    );
    typed_accessor!(
        /// Get a channel layout option.
        channel_layout, ChannelLayout, ChannelLayout
    );

    /// Get an image size option.
    pub fn image_size(&self, name: &str) -> Result<(u32, u32)> {
        match self.lookup(name)? {
            OptionValue::ImageSize(w, h) => Ok((*w, *h)),
            other => Err(Error::invalid_option(
                name,
                format!("holds a {:?} value, not ImageSize", other.kind()),
            )),
        }
    }

    /// Get an integer option as `usize`.
    pub fn usize(&self, name: &str) -> Result<usize> {
        let v = self.int(name)?;
        usize::try_from(v).map_err(|_| Error::invalid_option(name, format!("{v} is negative")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> OptionSchema {
        OptionSchema::new()
            .int("queue_size", 4, 1, 64, "maximum buffered units")
            .float("volume", 1.0, 0.0, 10.0, "gain")
            .flag("remove", false, "strip parameter sets")
            .choice("freq", "keyframe", &["keyframe", "all"], "when to insert")
            .pixel_format("pix_fmt", None, "output pixel format")
            .rational("time_base", None, "output time base")
            .image_size("size", "picture size")
    }

    #[test]
    fn test_parse_map() {
        let map = OptionMap::parse("queue_size=2: pix_fmt=nv12").unwrap();
        assert_eq!(map.get("queue_size"), Some("2"));
        assert_eq!(map.get("pix_fmt"), Some("nv12"));
        assert!(OptionMap::parse("").unwrap().is_empty());
        assert!(OptionMap::parse("novalue").is_err());
        assert_eq!(map.to_string(), "pix_fmt=nv12:queue_size=2");
    }

    #[test]
    fn test_defaults_and_overrides() {
        let map = OptionMap::new().with("queue_size", 8).with("size", "64x48");
        let opts = schema().resolve(&map, UnknownOptionPolicy::Reject).unwrap();
        assert_eq!(opts.int("queue_size").unwrap(), 8);
        assert_eq!(opts.float("volume").unwrap(), 1.0);
        assert!(!opts.flag("remove").unwrap());
        assert_eq!(opts.string("freq").unwrap(), "keyframe");
        assert_eq!(opts.image_size("size").unwrap(), (64, 48));
        assert!(!opts.is_set("pix_fmt"));
        assert!(opts.pixel_format("pix_fmt").is_err());
    }

    #[test]
    fn test_unknown_option_policy() {
        let map = OptionMap::new().with("bogus", 1);
        let err = schema().resolve(&map, UnknownOptionPolicy::Reject).unwrap_err();
        assert!(matches!(err, Error::UnknownOption(name) if name == "bogus"));
        assert!(schema().resolve(&map, UnknownOptionPolicy::Ignore).is_ok());
    }

    #[test]
    fn test_range_and_type_errors() {
        let map = OptionMap::new().with("queue_size", 0);
        assert!(matches!(
            schema().resolve(&map, UnknownOptionPolicy::Reject),
            Err(Error::InvalidOption { .. })
        ));
        let map = OptionMap::new().with("freq", "sometimes");
        assert!(schema().resolve(&map, UnknownOptionPolicy::Reject).is_err());
        let map = OptionMap::new().with("remove", "maybe");
        assert!(schema().resolve(&map, UnknownOptionPolicy::Reject).is_err());

        let opts = schema()
            .resolve(&OptionMap::new(), UnknownOptionPolicy::Reject)
            .unwrap();
        assert!(matches!(opts.float("queue_size"), Err(Error::InvalidOption { .. })));
    }

    #[test]
    fn test_serde_round_trip() {
        let map = OptionMap::new().with("a", 1).with("b", "x");
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"a":"1","b":"x"}"#);
        let back: OptionMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
