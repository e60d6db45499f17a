//! Core types for consentd

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A consent category value. On the wire it is the XDM single-letter code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConsentValue {
    Yes,
    No,
    Pending,
}

impl ConsentValue {
    pub fn code(&self) -> &'static str {
        match self {
            ConsentValue::Yes => "y",
            ConsentValue::No => "n",
            ConsentValue::Pending => "p",
        }
    }

    /// Parse an XDM value code. Anything outside `y`/`n`/`p` is rejected.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "y" => Some(ConsentValue::Yes),
            "n" => Some(ConsentValue::No),
            "p" => Some(ConsentValue::Pending),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConsentValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Consent category key - cheaply cloneable.
///
/// Top-level categories use their XDM key (`collect`, `adID`). Categories
/// nested one level deeper use a dotted path (`personalize.content`).
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Category(Arc<str>);

impl Category {
    pub const COLLECT: &'static str = "collect";
    pub const AD_ID: &'static str = "adID";
    pub const PERSONALIZE_CONTENT: &'static str = "personalize.content";

    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    pub fn nested(parent: &str, child: &str) -> Self {
        Self::new(format!("{}.{}", parent, child))
    }

    pub fn collect() -> Self {
        Self::new(Self::COLLECT)
    }

    pub fn ad_id() -> Self {
        Self::new(Self::AD_ID)
    }

    pub fn personalize_content() -> Self {
        Self::new(Self::PERSONALIZE_CONTENT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `(parent, Some(child))` for nested categories, `(key, None)` otherwise.
    pub fn path(&self) -> (&str, Option<&str>) {
        match self.0.split_once('.') {
            Some((parent, child)) => (parent, Some(child)),
            None => (&self.0, None),
        }
    }
}

impl Borrow<str> for Category {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Category {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Freshness stamp (`metadata.time`). Opaque: compared by string equality only.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct MetadataTime(Arc<str>);

impl MetadataTime {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MetadataTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MetadataTime {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A consent record: category values plus the `metadata.time` stamp.
///
/// An empty record is a valid value; "no record" is modelled as `Option::None`
/// by whoever holds one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Consents {
    fields: BTreeMap<Category, ConsentValue>,
    metadata_time: Option<MetadataTime>,
}

impl Consents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style category insert.
    pub fn with(mut self, category: impl Into<Category>, value: ConsentValue) -> Self {
        self.set(category, value);
        self
    }

    /// Builder-style `metadata.time`.
    pub fn with_time(mut self, time: impl Into<MetadataTime>) -> Self {
        self.metadata_time = Some(time.into());
        self
    }

    pub fn get(&self, category: &str) -> Option<ConsentValue> {
        self.fields.get(category).copied()
    }

    pub fn contains(&self, category: &str) -> bool {
        self.fields.contains_key(category)
    }

    pub fn set(&mut self, category: impl Into<Category>, value: ConsentValue) {
        self.fields.insert(category.into(), value);
    }

    pub fn fields(&self) -> &BTreeMap<Category, ConsentValue> {
        &self.fields
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Category, ConsentValue)> {
        self.fields.iter().map(|(k, v)| (k, *v))
    }

    pub fn metadata_time(&self) -> Option<&MetadataTime> {
        self.metadata_time.as_ref()
    }

    pub fn set_metadata_time(&mut self, time: Option<MetadataTime>) {
        self.metadata_time = time;
    }

    /// True when the record carries no consent categories. `metadata.time` is not a category.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Field-for-field category comparison, ignoring `metadata.time`.
    pub fn same_categories(&self, other: &Consents) -> bool {
        self.fields == other.fields
    }
}
