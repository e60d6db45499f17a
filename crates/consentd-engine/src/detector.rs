//! Change detection: decides what an update makes the service do
//!
//! Comparison is always between undefaulted records. A changed `metadata.time`
//! alone is not a change.

use consentd_core::{apply_defaults, merge, Clock, Consents};

/// Where an update came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Application called update; the delta is forwarded to the edge.
    Explicit,
    /// Edge consent preference response; never forwarded back.
    Remote,
}

/// Side effects owed for a changed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Undefaulted record: the new state and what gets persisted.
    pub stored: Consents,
    /// Defaulted view: published and carried by the changed signal.
    pub view: Consents,
    /// Delta for the edge, explicit updates only.
    pub forward: Option<Consents>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    NoOp,
    Changed(Reconciliation),
}

impl Outcome {
    pub fn is_changed(&self) -> bool {
        matches!(self, Outcome::Changed(_))
    }
}

/// Compare `before` and `after` and work out the signals.
pub fn detect(
    before: &Consents,
    after: &Consents,
    incoming: &Consents,
    defaults: &Consents,
    origin: Origin,
) -> Outcome {
    if after.same_categories(before) {
        return Outcome::NoOp;
    }

    let forward = match origin {
        Origin::Explicit => Some(delta(before, after, incoming)),
        Origin::Remote => None,
    };

    Outcome::Changed(Reconciliation {
        stored: after.clone(),
        view: apply_defaults(after, defaults),
        forward,
    })
}

/// Merge `incoming` into `before` and detect. Records without categories are ignored.
pub fn reconcile(
    before: &Consents,
    incoming: &Consents,
    defaults: &Consents,
    origin: Origin,
    clock: &dyn Clock,
) -> Outcome {
    if incoming.is_empty() {
        return Outcome::NoOp;
    }
    let after = merge(before, incoming, clock);
    detect(before, &after, incoming, defaults, origin)
}

/// Categories of `incoming` that actually moved, stamped with `after`'s time.
fn delta(before: &Consents, after: &Consents, incoming: &Consents) -> Consents {
    let mut delta = Consents::new();
    for (category, value) in incoming.iter() {
        if before.get(category.as_str()) != Some(value) {
            delta.set(category.clone(), value);
        }
    }
    delta.set_metadata_time(after.metadata_time().cloned());
    delta
}
