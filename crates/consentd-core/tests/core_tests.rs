//! Tests for consentd-core: merge, default overlay, XDM codec

use consentd_core::*;
use serde_json::json;

const SAMPLE_TIME: &str = "2019-09-23T18:15:45Z";
const NOW: &str = "2024-05-01T09:30:00.000Z";

fn clock() -> FixedClock {
    FixedClock::new(NOW)
}

// ===========================================================================
// Merge
// ===========================================================================

#[test]
fn merge_is_a_field_level_union() {
    let current = Consents::new()
        .with(Category::COLLECT, ConsentValue::Yes)
        .with(Category::AD_ID, ConsentValue::No);
    let incoming = Consents::new().with(Category::COLLECT, ConsentValue::No);

    let merged = merge(&current, &incoming, &clock());
    assert_eq!(
        merged,
        Consents::new()
            .with(Category::COLLECT, ConsentValue::No)
            .with(Category::AD_ID, ConsentValue::No)
            .with_time(NOW)
    );
}

#[test]
fn merge_with_itself_is_a_noop() {
    let record = Consents::new()
        .with(Category::COLLECT, ConsentValue::Pending)
        .with(Category::PERSONALIZE_CONTENT, ConsentValue::Yes)
        .with_time(SAMPLE_TIME);
    assert_eq!(merge(&record, &record, &clock()), record);
}

#[test]
fn merge_freezes_time_when_categories_are_unchanged() {
    let current = Consents::new()
        .with(Category::COLLECT, ConsentValue::Yes)
        .with_time(SAMPLE_TIME);
    let confirmation = Consents::new()
        .with(Category::COLLECT, ConsentValue::Yes)
        .with_time("2031-01-01T00:00:00Z");

    let merged = merge(&current, &confirmation, &clock());
    assert_eq!(merged.metadata_time(), Some(&MetadataTime::new(SAMPLE_TIME)));
}

#[test]
fn merge_keeps_open_ended_categories() {
    let current = Consents::new().with("share", ConsentValue::Yes);
    let incoming = Consents::new().with("marketing.email", ConsentValue::No);
    let merged = merge(&current, &incoming, &clock());
    assert_eq!(merged.len(), 2);
    assert_eq!(merged.get("share"), Some(ConsentValue::Yes));
    assert_eq!(merged.get("marketing.email"), Some(ConsentValue::No));
}

// ===========================================================================
// Default overlay
// ===========================================================================

#[test]
fn defaults_never_override_explicit_pending() {
    let record = Consents::new().with(Category::COLLECT, ConsentValue::Pending);
    let defaults = Consents::new().with(Category::COLLECT, ConsentValue::Yes);
    assert_eq!(
        apply_defaults(&record, &defaults),
        Consents::new().with(Category::COLLECT, ConsentValue::Pending)
    );
}

#[test]
fn defaults_rederive_from_the_same_record() {
    let record = Consents::new().with(Category::COLLECT, ConsentValue::No);
    let first = apply_defaults(
        &record,
        &Consents::new().with(Category::AD_ID, ConsentValue::Yes),
    );
    let second = apply_defaults(
        &record,
        &Consents::new().with(Category::PERSONALIZE_CONTENT, ConsentValue::No),
    );
    assert!(first.contains("adID"));
    assert!(!second.contains("adID"));
    assert_eq!(second.get("personalize.content"), Some(ConsentValue::No));
    assert_eq!(record.len(), 1);
}

// ===========================================================================
// XDM codec
// ===========================================================================

#[test]
fn xdm_decode_encode_preserves_published_shape() {
    let data = json!({
        "consents": {
            "collect": { "val": "p" },
            "adID": { "val": "n" },
            "personalize": { "content": { "val": "y" } },
            "metadata": { "time": SAMPLE_TIME }
        }
    });
    assert_eq!(xdm::to_event_data(&xdm::from_event_data(&data)), data);
}

#[test]
fn xdm_persisted_blob_roundtrip() {
    let record = Consents::new()
        .with(Category::COLLECT, ConsentValue::No)
        .with_time(NOW);
    let blob = xdm::to_json_string(&record).unwrap();
    assert_eq!(xdm::from_json_str(&blob).unwrap(), record);
}

#[test]
fn xdm_persisted_blob_keeps_parent_and_nested_category() {
    let current = xdm::from_event_data(&json!({ "consents": { "personalize": { "val": "y" } } }));
    let incoming = xdm::from_event_data(&json!({
        "consents": { "personalize": { "content": { "val": "n" } } }
    }));
    let merged = merge(&current, &incoming, &clock());
    assert_eq!(merged.len(), 2);

    let blob = xdm::to_json_string(&merged).unwrap();
    let back = xdm::from_json_str(&blob).unwrap();
    assert_eq!(back, merged);
    assert_eq!(back.get("personalize"), Some(ConsentValue::Yes));
    assert_eq!(back.get("personalize.content"), Some(ConsentValue::No));
}

#[test]
fn xdm_dotted_top_level_key_is_dropped() {
    let data = json!({ "consents": { "a.b": { "val": "y" } } });
    let record = xdm::from_event_data(&data);
    assert!(record.is_empty());
    assert_eq!(xdm::to_event_data(&record), json!({ "consents": {} }));
}

#[test]
fn xdm_unknown_values_drop_single_category() {
    let data = json!({
        "consents": {
            "collect": { "val": "y" },
            "adID": { "val": "dy" }
        }
    });
    let record = xdm::from_event_data(&data);
    assert_eq!(record, Consents::new().with(Category::COLLECT, ConsentValue::Yes));
}

// ===========================================================================
// Errors
// ===========================================================================

#[test]
fn error_display() {
    let e = Error::store("com.adobe.edge.consent", "consent:preferences", "disk full");
    assert_eq!(
        e.to_string(),
        "store error: com.adobe.edge.consent/consent:preferences - disk full"
    );
    assert_eq!(Error::ServiceClosed.to_string(), "consent service closed");
}

#[test]
fn error_from_json() {
    let err: Error = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
    assert!(matches!(err, Error::JsonError(_)));
}
