use quotegate_license::{LicenseError, LockReason, Reason};

#[test]
fn error_display_invalid_input() {
    let err = LicenseError::InvalidInput("code");
    assert_eq!(format!("{err}"), "invalid input: code is required");
}

#[test]
fn error_display_violation() {
    let err = LicenseError::Violation {
        code: "ABCD".into(),
        bound_to: "device_1".into(),
    };
    let msg = format!("{err}");
    assert!(msg.contains("ABCD"));
    assert!(msg.contains("device_1"));
}

#[test]
fn error_display_directory_unavailable() {
    let err = LicenseError::DirectoryUnavailable("timeout".into());
    assert!(format!("{err}").contains("directory unavailable"));
}

#[test]
fn error_from_serde_json() {
    let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
    let err: LicenseError = json_err.into();
    assert!(matches!(err, LicenseError::Serialization(_)));
    assert_eq!(err.reason(), Reason::Storage);
}

#[test]
fn reason_codes() {
    let cases = [
        (LicenseError::InvalidInput("user name"), "invalid_input"),
        (LicenseError::Conflict("dup".into()), "invalid_input"),
        (LicenseError::InvalidCredentials, "invalid_credentials"),
        (LicenseError::Disabled("A".into()), "disabled"),
        (
            LicenseError::Violation {
                code: "A".into(),
                bound_to: "d".into(),
            },
            "violation",
        ),
        (LicenseError::DirectoryUnavailable("x".into()), "directory_unavailable"),
        (LicenseError::Storage("x".into()), "storage"),
    ];
    for (err, code) in cases {
        assert_eq!(err.reason().as_str(), code);
        assert_eq!(serde_json::to_value(err.reason()).unwrap(), code);
    }
}

#[test]
fn only_disabled_and_violation_are_terminal() {
    assert!(!LicenseError::Disabled("A".into()).is_recoverable());
    assert!(
        !LicenseError::Violation {
            code: "A".into(),
            bound_to: "d".into()
        }
        .is_recoverable()
    );
    assert!(LicenseError::InvalidCredentials.is_recoverable());
    assert!(LicenseError::Conflict("dup".into()).is_recoverable());
    assert!(LicenseError::DirectoryUnavailable("x".into()).is_recoverable());
}

#[test]
fn only_invalid_credentials_are_overridable() {
    assert!(LicenseError::InvalidCredentials.is_overridable());
    assert!(!LicenseError::Disabled("A".into()).is_overridable());
}

#[test]
fn lock_reasons_map_to_reason_codes() {
    assert_eq!(LockReason::Expired.reason(), Some(Reason::Expired));
    assert_eq!(LockReason::SettingsDrifted.reason(), Some(Reason::SettingsDrifted));
    assert_eq!(LockReason::Violation.reason(), Some(Reason::Violation));
    assert_eq!(LockReason::ManuallyCleared.reason(), None);
    assert_eq!(LockReason::SettingsDrifted.to_string(), "settings_drifted");
}
