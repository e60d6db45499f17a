//! Merge engine: field-level last-writer-wins with freshness stamping

use crate::types::{Consents, MetadataTime};
use chrono::{SecondsFormat, Utc};

/// Wall-clock source for `metadata.time` stamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> MetadataTime;
}

/// RFC 3339 UTC with millisecond precision, e.g. `2024-05-01T09:30:00.123Z`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> MetadataTime {
        MetadataTime::new(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

/// Clock that always returns the same instant.
#[derive(Debug, Clone)]
pub struct FixedClock(pub MetadataTime);

impl FixedClock {
    pub fn new(time: impl Into<MetadataTime>) -> Self {
        Self(time.into())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> MetadataTime {
        self.0.clone()
    }
}

/// Merge `incoming` over `current`.
///
/// Every category in `incoming` overwrites the one in `current`; the rest are
/// kept. If the categories end up identical to `current`, `current` is returned
/// as-is, including its `metadata.time`. Otherwise the result is stamped with
/// `incoming`'s time, or `clock.now()` when `incoming` has none.
pub fn merge(current: &Consents, incoming: &Consents, clock: &dyn Clock) -> Consents {
    let mut merged = current.clone();
    for (category, value) in incoming.iter() {
        merged.set(category.clone(), value);
    }

    if merged.same_categories(current) {
        return current.clone();
    }

    let time = incoming.metadata_time().cloned().unwrap_or_else(|| clock.now());
    merged.set_metadata_time(Some(time));
    merged
}
