//! Environment and connection establishment tests

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use crate::env::validate_param;
use crate::error::Error;
use crate::tests::test_utils::{memory_env, Vendor};

#[test]
fn connect_returns_the_completed_string() {
    let (env, _) = memory_env(Vendor::Mysql);
    let (_, completed) = env.connect("DSN=memory;UID=tester;").unwrap();
    assert_eq!(completed, "DSN=memory;UID=tester;");
}

#[test]
fn connect_with_joins_validated_pairs() {
    let (env, _) = memory_env(Vendor::Mysql);
    let (_, completed) = env
        .connect_with(&[("DSN", "memory"), ("UID", "tester")])
        .unwrap();
    assert_eq!(completed, "DSN=memory;UID=tester;");
}

#[test]
fn every_reserved_character_is_rejected() {
    for c in r"[]{}(),;?*=!@\".chars() {
        let value = format!("ab{c}cd");
        assert!(
            matches!(
                validate_param(&value),
                Err(Error::InvalidConnectionParameter { .. })
            ),
            "expected rejection for {c:?}"
        );
    }
    assert!(validate_param("plain value 123").is_ok());
}

#[test]
fn connect_with_validates_before_any_io() {
    let (env, _) = memory_env(Vendor::Mysql);
    let err = env.connect_with(&[("DSN", "a;b")]).unwrap_err();
    assert!(matches!(err, Error::InvalidConnectionParameter { .. }));
}

#[test]
fn failed_connect_carries_driver_diagnostics() {
    let (env, _) = memory_env(Vendor::Mysql);
    let err = env.connect("BAD=YES").unwrap_err();
    assert!(err.is("08001"), "unexpected error: {err}");
}

#[test]
fn handles_format_for_debugging() {
    let (env, _) = memory_env(Vendor::Mysql);
    let (conn, _) = env.connect("DSN=memory").unwrap();
    assert!(format!("{conn:?}").contains("connected: true"));
    let stmt = conn.prepare("SELECT 1").unwrap();
    assert!(format!("{stmt:?}").starts_with("Statement"));
}

#[test]
fn login_timeout_set_and_clear() {
    let (env, _) = memory_env(Vendor::Mysql);
    env.set_login_timeout(Duration::from_secs(5)).unwrap();
    env.clear_login_timeout().unwrap();
    env.connect("DSN=memory").unwrap();
}
