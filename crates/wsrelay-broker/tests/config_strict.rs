#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use wsrelay_broker::config;
use wsrelay_core::RelayError;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
broker:
  listen: "0.0.0.0:8080"
  max_mesage_bytes: 123 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(matches!(err, RelayError::BadConfig(_)));
}

#[test]
fn ok_minimal_config() {
    let ok = r#"
version: 1
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.broker.listen, "0.0.0.0:8080");
    assert_eq!(cfg.broker.max_message_bytes, 1024 * 1024);
    assert_eq!(cfg.broker.session_queue_depth, 256);
}

#[test]
fn rejects_unsupported_version() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert!(matches!(err, RelayError::BadConfig(_)));
}

#[test]
fn rejects_out_of_range_limits() {
    let bad = r#"
version: 1
broker:
  max_message_bytes: 16
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(matches!(err, RelayError::BadConfig(_)));

    let bad = r#"
version: 1
broker:
  session_queue_depth: 0
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(matches!(err, RelayError::BadConfig(_)));
}
