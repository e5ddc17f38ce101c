// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use log_shipper::{
    ContextStack, Encoding, Level, LogEvent, LogShipper, ShipperConfig, Submission, WorkerStatus,
};
use mockito::{Matcher, Server};
use serde_json::json;
use std::time::Duration;

fn config_for(server: &Server) -> ShipperConfig {
    ShipperConfig {
        destination: server.url(),
        flush_interval: Duration::from_millis(200),
        check_interval: Duration::from_millis(10),
        retry_schedule: vec![Duration::from_millis(10), Duration::from_millis(20)],
        ..ShipperConfig::new("source-token")
    }
}

#[test]
fn ships_msgpack_batches_with_credential() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/")
        .match_header("authorization", "Bearer source-token")
        .match_header("content-type", "application/msgpack")
        .match_header("user-agent", Matcher::Regex("^log-shipper/".to_string()))
        .with_status(202)
        .expect(1)
        .create();

    let shipper = LogShipper::new(config_for(&server)).expect("valid config");
    let contexts = ContextStack::new();
    for n in 0..3 {
        let event = LogEvent::new(Level::Info, format!("event {n}"));
        assert_eq!(
            shipper.submit_event(&event, &contexts).expect("submit"),
            Submission::Queued
        );
    }
    shipper.flush();

    mock.assert();
    let stats = shipper.stats();
    assert_eq!(stats.documents_delivered, 3);
    assert_eq!(stats.batches_delivered, 1);
}

#[test]
fn ships_json_documents_with_context() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/")
        .match_header("content-type", "application/json")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#""message":"order placed""#.to_string()),
            Matcher::Regex(r#""request":\{"id":"r-42"\}"#.to_string()),
            Matcher::Regex(r#""level":"warning""#.to_string()),
            Matcher::Regex(r#""severity":3"#.to_string()),
        ]))
        .with_status(200)
        .expect(1)
        .create();

    let config = ShipperConfig {
        encoding: Encoding::Json,
        ..config_for(&server)
    };
    let shipper = LogShipper::new(config).expect("valid config");
    let contexts = ContextStack::new();
    let _request = contexts
        .push([("request", json!({"id": "r-42"}))])
        .expect("mapping context");

    let event = LogEvent::new(Level::Warning, "order placed").with_field("total", 200);
    shipper.submit_event(&event, &contexts).expect("submit");
    shipper.flush();

    mock.assert();
}

#[test]
fn compressed_batches_carry_content_encoding() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/")
        .match_header("content-encoding", "zstd")
        .with_status(202)
        .expect(1)
        .create();

    let config = ShipperConfig {
        use_compression: true,
        ..config_for(&server)
    };
    let shipper = LogShipper::new(config).expect("valid config");
    shipper
        .submit_event(&LogEvent::new(Level::Debug, "compressed"), &ContextStack::new())
        .expect("submit");
    shipper.flush();

    mock.assert();
}

#[test]
fn server_errors_are_retried_then_dropped() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/")
        .with_status(503)
        .expect(3)
        .create();

    let shipper = LogShipper::new(config_for(&server)).expect("valid config");
    shipper
        .submit_event(&LogEvent::new(Level::Error, "unlucky"), &ContextStack::new())
        .expect("submit");
    shipper.flush();

    mock.assert();
    let stats = shipper.stats();
    assert_eq!(stats.delivery_attempts, 3);
    assert_eq!(stats.batches_dropped, 1);
    assert_eq!(shipper.pending(), 0);
}

#[test]
fn rejected_credential_is_not_retried() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/")
        .with_status(401)
        .with_body("invalid source token")
        .expect(1)
        .create();

    let shipper = LogShipper::new(config_for(&server)).expect("valid config");
    shipper
        .submit_event(&LogEvent::new(Level::Info, "denied"), &ContextStack::new())
        .expect("submit");
    shipper.flush();

    mock.assert();
    assert_eq!(shipper.stats().delivery_attempts, 1);
    assert_eq!(shipper.stats().batches_dropped, 1);
}

#[test]
fn dropping_the_shipper_delivers_pending_documents() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/")
        .with_status(202)
        .expect(1)
        .create();

    {
        let config = ShipperConfig {
            flush_interval: Duration::from_secs(60),
            ..config_for(&server)
        };
        let shipper = LogShipper::new(config).expect("valid config");
        shipper
            .submit_event(&LogEvent::new(Level::Critical, "last words"), &ContextStack::new())
            .expect("submit");
    }

    mock.assert();
}

#[test]
fn shutdown_stops_the_worker() {
    let mut server = Server::new();
    let _mock = server.mock("POST", "/").with_status(202).create();

    let shipper = LogShipper::new(config_for(&server)).expect("valid config");
    shipper
        .submit_event(&LogEvent::new(Level::Info, "hello"), &ContextStack::new())
        .expect("submit");
    shipper.shutdown();

    assert_eq!(shipper.worker_status(), WorkerStatus::Stopped);
    assert_eq!(shipper.stats().documents_delivered, 1);
}
