//! End-to-end handler tests over the file backends.

use skald_audit::{
    verify_chain, Action, ActionRequest, AuditError, AuditEvent, AuditEventHandler,
    Blake3Signer,
};
use skald_core::HandlerConfig;
use std::path::Path;

fn config(dir: &Path, extra: &str) -> HandlerConfig {
    HandlerConfig::from_yaml(&format!(
        r#"
        name: json
        topics: [access]
        log_directory: {}
        {extra}
        "#,
        dir.display()
    ))
    .unwrap()
}

fn event(id: &str, status: &str) -> AuditEvent {
    AuditEvent::builder()
        .id(id)
        .field("eventName", "AM-ACCESS-ATTEMPT")
        .field("status", status)
        .build()
}

#[tokio::test]
async fn rejects_beyond_capacity_and_recovers_after_flush() {
    let dir = tempfile::tempdir().unwrap();
    // interval long enough that only the explicit flush action drains
    let handler = AuditEventHandler::new(config(
        dir.path(),
        r#"buffering:
          max_size: 5
          write_interval_millis: 3600000"#,
    ))
    .unwrap();
    handler.startup().await.unwrap();

    for i in 0..5 {
        handler
            .publish("access", event(&format!("e{i}"), "SUCCESSFUL"))
            .await
            .unwrap();
    }
    let err = handler
        .publish("access", event("e5", "SUCCESSFUL"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuditError::QueueFull { .. }));

    handler
        .handle_action("access", ActionRequest::new(Action::Flush))
        .await
        .unwrap();

    // buffer drained, publishing works again and everything is readable
    handler
        .publish("access", event("e5", "FAILED"))
        .await
        .unwrap();
    handler
        .handle_action("access", ActionRequest::new(Action::Flush))
        .await
        .unwrap();
    for i in 0..6 {
        let stored = handler
            .read_event("access", &format!("e{i}"))
            .await
            .unwrap();
        assert_eq!(stored.id, format!("e{i}"));
    }
    handler.shutdown().await.unwrap();
}

#[tokio::test]
async fn flushed_events_preserve_publish_order() {
    let dir = tempfile::tempdir().unwrap();
    let handler = AuditEventHandler::new(config(
        dir.path(),
        "buffering:\n          write_interval_millis: 3600000",
    ))
    .unwrap();
    handler.startup().await.unwrap();

    for i in 0..20 {
        handler
            .publish("access", event(&format!("{i:03}"), "SUCCESSFUL"))
            .await
            .unwrap();
    }
    handler
        .handle_action("access", ActionRequest::new(Action::Flush))
        .await
        .unwrap();

    let mut seen = Vec::new();
    let result = handler
        .query_events(
            "access",
            |_| true,
            |e| {
                seen.push(e.id.clone());
                true
            },
        )
        .await
        .unwrap();
    assert_eq!(result.matches, 20);
    assert!(result.exact);
    let expected: Vec<_> = (0..20).map(|i| format!("{i:03}")).collect();
    assert_eq!(seen, expected);
    handler.shutdown().await.unwrap();
}

#[tokio::test]
async fn interval_flush_makes_events_readable_without_actions() {
    let dir = tempfile::tempdir().unwrap();
    let handler = AuditEventHandler::new(config(
        dir.path(),
        "buffering:\n          write_interval_millis: 10",
    ))
    .unwrap();
    handler.startup().await.unwrap();

    let id = handler
        .publish("access", event("tick", "SUCCESSFUL"))
        .await
        .unwrap();

    let mut found = false;
    for _ in 0..100 {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        if handler.read_event("access", &id).await.is_ok() {
            found = true;
            break;
        }
    }
    assert!(found, "event never reached the file via the interval flush");
    handler.shutdown().await.unwrap();
}

#[tokio::test]
async fn rotate_action_archives_and_queries_see_only_the_current_file() {
    let dir = tempfile::tempdir().unwrap();
    let handler = AuditEventHandler::new(config(
        dir.path(),
        r#"buffering:
          write_interval_millis: 3600000
        file_rotation:
          enabled: true
          max_file_size: 0"#,
    ))
    .unwrap();
    handler.startup().await.unwrap();

    for i in 0..3 {
        handler
            .publish("access", event(&format!("old{i}"), "SUCCESSFUL"))
            .await
            .unwrap();
    }
    handler
        .handle_action("access", ActionRequest::new(Action::Rotate))
        .await
        .unwrap();

    handler
        .publish("access", event("new0", "SUCCESSFUL"))
        .await
        .unwrap();
    handler
        .handle_action("access", ActionRequest::new(Action::Flush))
        .await
        .unwrap();

    // the archive carries the pre-rotation records under a new name
    let archives: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("access.audit.json."))
        .collect();
    assert_eq!(archives.len(), 1);
    let archived = std::fs::read_to_string(dir.path().join(&archives[0])).unwrap();
    assert!(archived.contains(r#""_id":"old0""#));
    assert!(archived.contains(r#""_id":"old2""#));

    // reads address the current file only
    let result = handler
        .query_events("access", |_| true, |_| true)
        .await
        .unwrap();
    assert_eq!(result.matches, 1);
    assert!(matches!(
        handler.read_event("access", "old0").await,
        Err(AuditError::NotFound(_))
    ));
    handler.read_event("access", "new0").await.unwrap();
    handler.shutdown().await.unwrap();
}

#[tokio::test]
async fn signed_archives_verify_with_a_closed_chain() {
    let dir = tempfile::tempdir().unwrap();
    let key = "42".repeat(32);
    let handler = AuditEventHandler::new(config(
        dir.path(),
        &format!(
            r#"buffering:
          write_interval_millis: 3600000
        file_rotation:
          enabled: true
          max_file_size: 0
        signing:
          enabled: true
          key: "{key}""#
        ),
    ))
    .unwrap();
    handler.startup().await.unwrap();

    for i in 0..4 {
        handler
            .publish("access", event(&format!("s{i}"), "SUCCESSFUL"))
            .await
            .unwrap();
    }
    handler
        .handle_action("access", ActionRequest::new(Action::Rotate))
        .await
        .unwrap();
    handler.shutdown().await.unwrap();

    let archive = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().starts_with("access.audit.json."))
                .unwrap_or(false)
        })
        .expect("rotation must leave an archive");

    let signer = Blake3Signer::new([0x42u8; 32]);
    let outcome = verify_chain(&archive, skald_audit::format::RecordFormat::Json, &signer).unwrap();
    assert!(outcome.signatures >= 1);
    assert!(outcome.is_closed());

    // tampering with a record breaks verification
    let tampered = std::fs::read_to_string(&archive)
        .unwrap()
        .replace("SUCCESSFUL", "SUCCESSFUL!");
    std::fs::write(&archive, tampered).unwrap();
    assert!(matches!(
        verify_chain(&archive, skald_audit::format::RecordFormat::Json, &signer),
        Err(AuditError::SignatureMismatch { .. })
    ));
}

#[tokio::test]
async fn signing_interval_appends_signatures_without_actions() {
    let dir = tempfile::tempdir().unwrap();
    let key = "ab".repeat(32);
    let handler = AuditEventHandler::new(config(
        dir.path(),
        &format!(
            r#"buffering:
          write_interval_millis: 10
        signing:
          enabled: true
          signature_interval_millis: 50
          key: "{key}""#
        ),
    ))
    .unwrap();
    handler.startup().await.unwrap();

    handler
        .publish("access", event("signed", "SUCCESSFUL"))
        .await
        .unwrap();

    // no rotate, flush or shutdown: only the signing tick can add this
    let path = dir.path().join("access.audit.json");
    let format = skald_audit::format::RecordFormat::Json;
    let mut signed = false;
    for _ in 0..100 {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let contents = std::fs::read_to_string(&path).unwrap_or_default();
        if contents.lines().any(|l| format.is_signature_line(l)) {
            signed = true;
            break;
        }
    }
    assert!(signed, "no signature record appeared from the interval tick");

    handler.shutdown().await.unwrap();
    let outcome = verify_chain(&path, format, &Blake3Signer::new([0xab; 32])).unwrap();
    assert!(outcome.signatures >= 1);
    assert!(outcome.is_closed());
}

#[tokio::test]
async fn shutdown_flushes_pending_events() {
    let dir = tempfile::tempdir().unwrap();
    let handler = AuditEventHandler::new(config(
        dir.path(),
        "buffering:\n          write_interval_millis: 3600000",
    ))
    .unwrap();
    handler.startup().await.unwrap();

    handler
        .publish("access", event("pending", "SUCCESSFUL"))
        .await
        .unwrap();
    handler.shutdown().await.unwrap();

    let contents =
        std::fs::read_to_string(dir.path().join("access.audit.json")).unwrap();
    assert!(contents.contains(r#""_id":"pending""#));

    // the handler is unusable after shutdown
    assert!(matches!(
        handler.publish("access", event("late", "FAILED")).await,
        Err(AuditError::NotStarted)
    ));
}

#[tokio::test]
async fn unbuffered_publish_is_immediately_readable() {
    let dir = tempfile::tempdir().unwrap();
    let handler = AuditEventHandler::new(config(
        dir.path(),
        r#"buffering:
          enabled: false
          write_interval_millis: 3600000"#,
    ))
    .unwrap();
    handler.startup().await.unwrap();

    let id = handler
        .publish("access", event("sync", "SUCCESSFUL"))
        .await
        .unwrap();
    let stored = handler.read_event("access", &id).await.unwrap();
    assert_eq!(stored.field("status"), Some("SUCCESSFUL".into()));
    handler.shutdown().await.unwrap();
}

#[tokio::test]
async fn csv_backend_round_trips_events() {
    let dir = tempfile::tempdir().unwrap();
    let handler = AuditEventHandler::new(config(
        dir.path(),
        r#"backend: csv
        buffering:
          write_interval_millis: 3600000"#,
    ))
    .unwrap();
    handler.startup().await.unwrap();

    handler
        .publish("access", event("row1", "SUCCESSFUL"))
        .await
        .unwrap();
    handler
        .handle_action("access", ActionRequest::new(Action::Flush))
        .await
        .unwrap();

    let stored = handler.read_event("access", "row1").await.unwrap();
    assert_eq!(stored.field("eventName"), Some("AM-ACCESS-ATTEMPT".into()));
    assert!(dir.path().join("access.audit.csv").exists());
    handler.shutdown().await.unwrap();
}
