//! Default overlay

use crate::types::Consents;

/// Overlay `defaults` onto `record` for every category `record` does not have.
///
/// Existing values (including pending) always win. The result keeps
/// `record`'s `metadata.time`; any time carried by `defaults` is ignored.
/// The returned view is for publication only and must never be persisted.
pub fn apply_defaults(record: &Consents, defaults: &Consents) -> Consents {
    let mut view = record.clone();
    for (category, value) in defaults.iter() {
        if !view.contains(category.as_str()) {
            view.set(category.clone(), value);
        }
    }
    view
}
