//! Integration tests for the kollektiv-web crate.
//!
//! Full HTTP endpoint testing requires a running Postgres/Redis/Qdrant
//! stack, so these focus on the wire-shape contracts the frontend depends
//! on: request deserialization and webhook payload parsing.

use kollektiv_web::webhooks::FirecrawlWebhook;

#[test]
fn firecrawl_webhook_parses_started_event() {
    let payload = serde_json::json!({
        "type": "crawl.started",
        "id": "fc_123",
        "success": true,
    });
    let webhook: FirecrawlWebhook = serde_json::from_value(payload).unwrap();
    assert_eq!(webhook.event_type, "crawl.started");
    assert_eq!(webhook.id, "fc_123");
    assert!(webhook.data.is_empty());
}

#[test]
fn firecrawl_webhook_parses_failed_event_with_reason() {
    let payload = serde_json::json!({
        "type": "crawl.failed",
        "id": "fc_456",
        "success": false,
        "error": "rate limited",
    });
    let webhook: FirecrawlWebhook = serde_json::from_value(payload).unwrap();
    assert_eq!(webhook.error.as_deref(), Some("rate limited"));
    assert!(!webhook.success);
}
