use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use quotegate_license::{
    Binding, CodeRegistry, DeviceId, MemoryStorage, Storage, SubscriptionRecord,
    CODE_DEVICE_MAP_KEY, DISABLED_CODES_KEY, SUBSCRIPTION_KEY,
};
use std::sync::Arc;

fn registry() -> (CodeRegistry, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    (CodeRegistry::new(Arc::clone(&storage) as Arc<dyn Storage>), storage)
}

fn record(code: &str, device: &str) -> SubscriptionRecord {
    SubscriptionRecord {
        code: code.to_string(),
        user_name: "Sara".to_string(),
        user: None,
        device_id: DeviceId::new(device),
        verified: true,
        granted_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        expiry: None,
        duration: None,
    }
}

#[test]
fn is_disabled_is_case_and_whitespace_insensitive() {
    let (registry, _) = registry();
    registry.disable(" abcd ").unwrap();
    assert!(registry.is_disabled("ABCD").unwrap());
    assert!(registry.is_disabled("abcd").unwrap());
    assert!(registry.is_disabled("  AbCd").unwrap());
    assert!(!registry.is_disabled("").unwrap());
}

#[test]
fn disable_is_idempotent() {
    let (registry, _) = registry();
    registry.disable("ABCD").unwrap();
    registry.disable("abcd").unwrap();
    assert_eq!(registry.disabled_codes().unwrap(), vec!["ABCD".to_string()]);
}

#[test]
fn disable_drops_binding_and_matching_record() {
    let (registry, _) = registry();
    let device = DeviceId::new("device_1");
    registry.claim_or_verify_binding("ABCD", &device).unwrap();
    registry.set_record(&record("ABCD", "device_1")).unwrap();

    assert!(registry.disable("abcd").unwrap());
    assert_eq!(registry.binding("ABCD").unwrap(), None);
    assert_eq!(registry.record().unwrap(), None);
}

#[test]
fn disable_keeps_record_for_other_code() {
    let (registry, _) = registry();
    registry.set_record(&record("WXYZ", "device_1")).unwrap();
    assert!(!registry.disable("ABCD").unwrap());
    assert!(registry.record().unwrap().is_some());
}

#[test]
fn re_enable_reports_presence_and_does_not_restore_binding() {
    let (registry, _) = registry();
    let device = DeviceId::new("device_1");
    registry.claim_or_verify_binding("ABCD", &device).unwrap();
    registry.disable("ABCD").unwrap();

    assert!(registry.re_enable("abcd").unwrap());
    assert!(!registry.re_enable("ABCD").unwrap());
    assert!(!registry.is_disabled("ABCD").unwrap());
    assert_eq!(registry.binding("ABCD").unwrap(), None);
}

#[test]
fn claim_verify_and_violation() {
    let (registry, _) = registry();
    let d1 = DeviceId::new("device_1");
    let d2 = DeviceId::new("device_2");

    assert_eq!(registry.claim_or_verify_binding("abcd", &d1).unwrap(), Binding::Claimed);
    assert_eq!(registry.claim_or_verify_binding("ABCD", &d1).unwrap(), Binding::Verified);

    let outcome = registry.claim_or_verify_binding("ABCD", &d2).unwrap();
    assert_eq!(outcome, Binding::Violation { bound_to: d1.clone() });
    assert!(!outcome.is_ok());
    // The map is left for the caller to clean up via disable.
    assert_eq!(registry.binding("ABCD").unwrap(), Some(d1));
}

#[test]
fn release_binding_reports_presence() {
    let (registry, _) = registry();
    registry
        .claim_or_verify_binding("ABCD", &DeviceId::new("device_1"))
        .unwrap();
    assert!(registry.release_binding("abcd").unwrap());
    assert!(!registry.release_binding("ABCD").unwrap());
}

#[test]
fn record_round_trips_through_storage() {
    let (registry, _) = registry();
    let rec = record("ABCD", "device_1");
    registry.set_record(&rec).unwrap();
    assert_eq!(registry.record().unwrap(), Some(rec));
    registry.clear_record().unwrap();
    assert_eq!(registry.record().unwrap(), None);
}

#[test]
fn stored_shapes_match_key_contract() {
    let (registry, storage) = registry();
    registry
        .claim_or_verify_binding("ABCD", &DeviceId::new("device_1"))
        .unwrap();
    registry.disable("WXYZ").unwrap();

    let map: serde_json::Value =
        serde_json::from_str(&storage.get(CODE_DEVICE_MAP_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(map, serde_json::json!({"ABCD": "device_1"}));

    let disabled: serde_json::Value =
        serde_json::from_str(&storage.get(DISABLED_CODES_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(disabled, serde_json::json!(["WXYZ"]));
}

#[test]
fn corrupt_values_read_as_empty() {
    let (registry, storage) = registry();
    storage.set(DISABLED_CODES_KEY, "{not json").unwrap();
    storage.set(CODE_DEVICE_MAP_KEY, "[1,2,3]").unwrap();
    assert!(!registry.is_disabled("ABCD").unwrap());
    assert_eq!(registry.binding("ABCD").unwrap(), None);
}

#[test]
fn unreadable_record_is_removed() {
    let (registry, storage) = registry();
    storage.set(SUBSCRIPTION_KEY, "{not json").unwrap();
    assert_eq!(registry.record().unwrap(), None);
    assert_eq!(storage.get(SUBSCRIPTION_KEY).unwrap(), None);
}

#[test]
fn reads_records_written_by_other_clients() {
    let (registry, storage) = registry();
    storage
        .set(
            "subscription_verified",
            r#"{
                "code": "ABCD",
                "userName": "Sara",
                "user": {"id": 7, "code": "ABCD", "name": "Sara"},
                "deviceId": "device_1x2y3z",
                "verified": true,
                "timestamp": "2024-03-01T12:00:00.000Z",
                "expiry": "2024-03-01T13:00:00.000Z",
                "duration": {"value": 1, "unit": "hours"}
            }"#,
        )
        .unwrap();

    let rec = registry.record().unwrap().unwrap();
    assert_eq!(rec.user.unwrap().id, 7);
    assert_eq!(rec.device_id.as_str(), "device_1x2y3z");
    assert_eq!(rec.expiry, Some(Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap()));
}
