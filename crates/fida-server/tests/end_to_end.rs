//! End-to-end router tests covering the concrete scenarios and testable
//! properties of the ledger specification: issue/verify round trips, chain
//! linkage, idempotency, checkpoint/proof binding, tamper detection,
//! cross-tenant authorization, body-size capping, and rate limiting.

mod support;

use axum::http::StatusCode;
use support::TestServer;

#[tokio::test]
async fn s1_issue_then_verify() {
    let server = TestServer::new(5000);
    let (_admin, issuer, verifier, _exporter) = server.setup_tenant("acme").await;

    let (status, receipt) = server.issue_event(&issuer, "acme", serde_json::json!({"a": 1})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["seq"], 1);
    assert!(receipt["prev_event_hash"].is_null());
    assert_eq!(receipt["event_hash"].as_str().unwrap().len(), 64);

    let (status, result) = server.send("POST", "/verify", Some(&verifier), Some(receipt)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["valid"], true);
    assert_eq!(result["signature_valid"], true);
    assert_eq!(result["hash_valid"], true);
}

#[tokio::test]
async fn s2_chain_links_prev_event_hash() {
    let server = TestServer::new(5000);
    let (_admin, issuer, _verifier, _exporter) = server.setup_tenant("acme").await;

    let (_, receipt1) = server.issue_event(&issuer, "acme", serde_json::json!({"a": 1})).await;
    let (_, receipt2) = server.issue_event(&issuer, "acme", serde_json::json!({"a": 2})).await;

    assert_eq!(receipt2["seq"], 2);
    assert_eq!(receipt2["prev_event_hash"], receipt1["event_hash"]);
}

#[tokio::test]
async fn s3_idempotency_key_short_circuits() {
    let server = TestServer::new(5000);
    let (admin, issuer, _verifier, exporter) = server.setup_tenant("acme").await;

    let (status1, first) = server
        .issue_event_with_idempotency_key(&issuer, "acme", serde_json::json!({"x": 7}), "k1")
        .await;
    let (status2, second) = server
        .issue_event_with_idempotency_key(&issuer, "acme", serde_json::json!({"x": 7}), "k1")
        .await;
    assert_eq!(status1, StatusCode::OK);
    assert_eq!(status2, StatusCode::OK);
    assert_eq!(first, second, "idempotent replay must return a byte-identical receipt");

    let (status, export) = server.send("GET", "/export/acme?limit=100", Some(&exporter), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(export["events"].as_array().unwrap().len(), 1, "only one event was actually written");
    let _ = admin;
}

#[tokio::test]
async fn s4_checkpoint_batch_and_proofs() {
    let server = TestServer::new(4);
    let (_admin, issuer, _verifier, exporter) = server.setup_tenant("acme").await;

    let mut event_ids = Vec::new();
    for i in 0..4 {
        let (status, receipt) = server.issue_event(&issuer, "acme", serde_json::json!({"i": i})).await;
        assert_eq!(status, StatusCode::OK);
        event_ids.push(receipt["event_id"].as_str().unwrap().to_string());
    }

    let (status, export) = server.send("GET", "/export/acme?limit=10", Some(&exporter), None).await;
    assert_eq!(status, StatusCode::OK);
    let checkpoint = &export["latest_checkpoint"];
    assert_eq!(checkpoint["from_seq"], 1);
    assert_eq!(checkpoint["to_seq"], 4);
    assert_eq!(checkpoint["leaf_count"], 4);

    for event_id in &event_ids {
        let (status, proof) = server
            .send("GET", &format!("/proof/acme/{event_id}"), Some(&exporter), None)
            .await;
        assert_eq!(status, StatusCode::OK, "proof for {event_id}: {proof:?}");
        assert_eq!(proof["root"], checkpoint["root_hash"]);
    }
}

#[tokio::test]
async fn s5_tampered_receipt_fails_verification() {
    let server = TestServer::new(5000);
    let (_admin, issuer, verifier, _exporter) = server.setup_tenant("acme").await;

    let (_, mut receipt) = server.issue_event(&issuer, "acme", serde_json::json!({"a": 1})).await;
    receipt["payload_hash"] = serde_json::json!("0".repeat(64));

    let (status, result) = server.send("POST", "/verify", Some(&verifier), Some(receipt)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["valid"], false);
    assert_eq!(result["hash_valid"], false);
    assert!(result["reason_codes"]
        .as_array()
        .unwrap()
        .iter()
        .any(|c| c == "hash_invalid"));
}

#[tokio::test]
async fn verify_with_absent_field_reports_missing_not_400() {
    let server = TestServer::new(5000);
    let (_admin, issuer, verifier, _exporter) = server.setup_tenant("acme").await;

    let (_, mut receipt) = server.issue_event(&issuer, "acme", serde_json::json!({"a": 1})).await;
    receipt.as_object_mut().unwrap().remove("seq");
    receipt.as_object_mut().unwrap().remove("kid");

    let (status, result) = server.send("POST", "/verify", Some(&verifier), Some(receipt)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["valid"], false);
    let reason_codes = result["reason_codes"].as_array().unwrap();
    assert_eq!(reason_codes.len(), 1);
    let missing = reason_codes[0].as_str().unwrap().strip_prefix("missing:").unwrap();
    assert!(missing.contains("seq"));
    assert!(missing.contains("kid"));
}

#[tokio::test]
async fn s6_wrong_tenant_issue_is_forbidden() {
    let server = TestServer::new(5000);
    let admin = server.bootstrap().await;
    server.create_tenant(&admin, "tenant-a").await;
    server.create_tenant(&admin, "tenant-b").await;
    let issuer_a = server.issue_api_key(&admin, "issuer", Some("tenant-a")).await;

    let (status, _) = server.issue_event(&issuer_a, "tenant-b", serde_json::json!({"a": 1})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, export) = server.send("GET", "/export/tenant-b?limit=10", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(export["events"].as_array().unwrap().len(), 0, "no event was written for tenant-b");
}

#[tokio::test]
async fn verifier_key_cannot_issue() {
    let server = TestServer::new(5000);
    let (_admin, _issuer, verifier, _exporter) = server.setup_tenant("acme").await;
    let (status, _) = server.issue_event(&verifier, "acme", serde_json::json!({"a": 1})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn issuer_for_tenant_a_cannot_read_proofs_for_tenant_b() {
    let server = TestServer::new(1);
    let admin = server.bootstrap().await;
    server.create_tenant(&admin, "tenant-a").await;
    server.create_tenant(&admin, "tenant-b").await;
    let issuer_a = server.issue_api_key(&admin, "issuer", Some("tenant-a")).await;
    let issuer_b = server.issue_api_key(&admin, "issuer", Some("tenant-b")).await;

    let (_, receipt_b) = server.issue_event(&issuer_b, "tenant-b", serde_json::json!({"a": 1})).await;
    let event_id = receipt_b["event_id"].as_str().unwrap();

    let (status, _) = server
        .send("GET", &format!("/proof/tenant-b/{event_id}"), Some(&issuer_a), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn body_over_cap_is_rejected_and_writes_nothing() {
    let server = TestServer::with_body_cap(5000, 1024);
    let (_admin, issuer, _verifier, exporter) = server.setup_tenant("acme").await;

    let oversized_payload = serde_json::json!({ "blob": "x".repeat(4096) });
    let body = serde_json::to_vec(&serde_json::json!({
        "tenant_id": "acme",
        "payload": oversized_payload,
        "profile_id": "HUMAN-MSP-01",
        "event_type": "CHANGE",
        "actor_role": "agent",
        "object_ref": "",
    }))
    .unwrap();
    assert!(body.len() > 1024);

    let status = server.send_raw_body("POST", "/issue", Some(&issuer), body).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let (status, export) = server.send("GET", "/export/acme?limit=10", Some(&exporter), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(export["events"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn burst_plus_one_requests_hit_rate_limit() {
    // Burst sized so the admin key's setup calls (create_tenant + 3 key
    // mints) never themselves trip the limiter; the issuer key below has
    // its own independent token bucket keyed by key id.
    let server = TestServer::with_rate_limit(5000, 5);
    let (_admin, issuer, _verifier, _exporter) = server.setup_tenant("acme").await;

    let mut saw_429 = false;
    for _ in 0..6 {
        let (status, _) = server.issue_event(&issuer, "acme", serde_json::json!({"a": 1})).await;
        if status == StatusCode::TOO_MANY_REQUESTS {
            saw_429 = true;
        }
    }
    assert!(saw_429, "expected at least one 429 within burst+1 requests");
}

#[tokio::test]
async fn jwks_and_status_endpoints_are_public() {
    let server = TestServer::new(5000);
    let (_admin, _issuer, _verifier, _exporter) = server.setup_tenant("acme").await;

    let (status, _) = server.send("GET", "/.well-known/platform.jwks.json", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, keys) = server.send("GET", "/tenants/acme/.well-known/jwks.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(keys["keys"].as_array().unwrap().len(), 1);

    let (status, _) = server.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, ready) = server.send("GET", "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK, "ready body: {ready:?}");
}

#[tokio::test]
async fn bootstrap_cannot_run_twice() {
    let server = TestServer::new(5000);
    let _first = server.bootstrap().await;
    let (status, _) = server
        .send_with_headers(
            "POST",
            "/admin/bootstrap",
            None,
            &[("x-bootstrap-token", support::BOOTSTRAP_TOKEN)],
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn missing_api_key_is_unauthorized() {
    let server = TestServer::new(5000);
    let (status, _) = server
        .send(
            "POST",
            "/issue",
            None,
            Some(serde_json::json!({
                "tenant_id": "acme",
                "payload": {"a": 1},
                "profile_id": "HUMAN-MSP-01",
                "event_type": "CHANGE",
                "actor_role": "agent",
                "object_ref": "",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
