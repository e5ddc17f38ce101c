// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of document batches to the ingestion service.
//!
//! ```text
//!   Batch ──> encode (msgpack | json) ──> compress (zstd, optional) ──> POST
//!                                                                        │
//!                     2xx: success  <────────────────────────────────────┤
//!                     5xx, network: retryable  <─────────────────────────┤
//!                     anything else: fatal  <────────────────────────────┘
//! ```
//!
//! The worker only sees a [`DeliveryOutcome`]; how often a retryable batch is
//! attempted again is decided by the worker's retry schedule.

use crate::config::{Encoding, ShipperConfig};
use crate::document::Document;
use crate::error::ShipperError;
use crate::http::get_client;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use std::io::Write;
use std::time::Instant;
use tracing::debug;
use zstd::stream::write::Encoder;

/// Longest response body kept in a [`DeliveryError::Status`].
const MAX_ERROR_BODY_LEN: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    Network(String),

    #[error("failed to encode batch: {0}")]
    Encode(String),
}

/// Result of one delivery attempt.
#[derive(Debug)]
pub enum DeliveryOutcome {
    Success,
    /// The batch may be attempted again.
    RetryableFailure(DeliveryError),
    /// Attempting the same batch again cannot succeed.
    FatalFailure(DeliveryError),
}

impl DeliveryOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Success)
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryOutcome::RetryableFailure(_))
    }

    /// Maps a response status to an outcome.
    #[must_use]
    pub fn from_status(status: StatusCode, body: String) -> Self {
        if status.is_success() {
            return DeliveryOutcome::Success;
        }
        let error = DeliveryError::Status { status, body };
        if status.is_server_error() {
            DeliveryOutcome::RetryableFailure(error)
        } else {
            DeliveryOutcome::FatalFailure(error)
        }
    }
}

/// Sends one batch, once. Implementations must not retry on their own.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, batch: &[Document]) -> DeliveryOutcome;
}

/// Authenticated HTTP POST of encoded batches.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    headers: HeaderMap,
    encoding: Encoding,
    compression_level: Option<i32>,
}

impl HttpTransport {
    pub fn new(config: &ShipperConfig) -> Result<Self, ShipperError> {
        Ok(Self {
            client: get_client(config)?,
            endpoint: config.endpoint(),
            headers: build_headers(config)?,
            encoding: config.encoding,
            compression_level: config.use_compression.then_some(config.compression_level),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Serializes the batch as an array of documents, compressed if enabled.
    pub fn encode(&self, batch: &[Document]) -> Result<Vec<u8>, DeliveryError> {
        let body = match self.encoding {
            Encoding::MessagePack => {
                rmp_serde::to_vec_named(batch).map_err(|e| DeliveryError::Encode(e.to_string()))?
            }
            Encoding::Json => {
                serde_json::to_vec(batch).map_err(|e| DeliveryError::Encode(e.to_string()))?
            }
        };

        match self.compression_level {
            Some(level) => compress(&body, level).map_err(|e| DeliveryError::Encode(e.to_string())),
            None => Ok(body),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn deliver(&self, batch: &[Document]) -> DeliveryOutcome {
        let body = match self.encode(batch) {
            Ok(body) => body,
            Err(e) => return DeliveryOutcome::FatalFailure(e),
        };

        let time = Instant::now();
        let resp = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await;
        let elapsed = time.elapsed();

        match resp {
            Ok(resp) => {
                let status = resp.status();
                debug!(
                    "LOGS | Sent {} documents in {} ms, status {}",
                    batch.len(),
                    elapsed.as_millis(),
                    status
                );
                // Don't read the response body unless it goes into an error
                if status.is_success() {
                    return DeliveryOutcome::Success;
                }
                let mut body = resp.text().await.unwrap_or_default();
                truncate_at_char_boundary(&mut body, MAX_ERROR_BODY_LEN);
                DeliveryOutcome::from_status(status, body)
            }
            Err(e) => {
                debug!(
                    "LOGS | Request failed after {} ms: {:?}",
                    elapsed.as_millis(),
                    e
                );
                DeliveryOutcome::RetryableFailure(DeliveryError::Network(e.to_string()))
            }
        }
    }
}

fn build_headers(config: &ShipperConfig) -> Result<HeaderMap, ShipperError> {
    let mut headers = HeaderMap::new();

    let mut authorization = HeaderValue::from_str(&format!("Bearer {}", config.credential))
        .map_err(|_| ShipperError::InvalidConfig("credential is not a valid header value".to_string()))?;
    authorization.set_sensitive(true);
    headers.insert(AUTHORIZATION, authorization);

    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(config.encoding.content_type()),
    );
    if config.use_compression {
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("zstd"));
    }
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(concat!("log-shipper/", env!("CARGO_PKG_VERSION"))),
    );

    Ok(headers)
}

fn compress(data: &[u8], level: i32) -> std::io::Result<Vec<u8>> {
    let mut encoder = Encoder::new(Vec::new(), level)?;
    encoder.write_all(data)?;
    encoder.finish()
}

fn truncate_at_char_boundary(text: &mut String, max_len: usize) {
    if text.len() <= max_len {
        return;
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Encoding;
    use mockito::Matcher;
    use serde_json::{json, Value};

    fn document(message: &str) -> Document {
        match json!({"level": "info", "message": message}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn config_for(server: &mockito::ServerGuard) -> ShipperConfig {
        ShipperConfig {
            destination: server.url(),
            ..ShipperConfig::new("secret-token")
        }
    }

    #[test]
    fn test_outcome_from_status() {
        assert!(DeliveryOutcome::from_status(StatusCode::ACCEPTED, String::new()).is_success());
        assert!(DeliveryOutcome::from_status(StatusCode::BAD_GATEWAY, String::new()).is_retryable());
        assert!(matches!(
            DeliveryOutcome::from_status(StatusCode::UNAUTHORIZED, String::new()),
            DeliveryOutcome::FatalFailure(DeliveryError::Status { status, .. }) if status == StatusCode::UNAUTHORIZED
        ));
        assert!(matches!(
            DeliveryOutcome::from_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            DeliveryOutcome::FatalFailure(_)
        ));
    }

    #[test]
    fn test_encode_msgpack_round_trips_field_names() {
        let transport = HttpTransport::new(&ShipperConfig::new("token")).unwrap();
        let batch = vec![document("hello")];

        let body = transport.encode(&batch).unwrap();
        let decoded: Vec<Document> = rmp_serde::from_slice(&body).unwrap();
        assert_eq!(decoded, batch);
    }

    #[test]
    fn test_encode_json_with_compression() {
        let config = ShipperConfig {
            encoding: Encoding::Json,
            use_compression: true,
            ..ShipperConfig::new("token")
        };
        let transport = HttpTransport::new(&config).unwrap();
        let batch = vec![document("one"), document("two")];

        let body = transport.encode(&batch).unwrap();
        let decompressed = zstd::decode_all(body.as_slice()).unwrap();
        let decoded: Vec<Document> = serde_json::from_slice(&decompressed).unwrap();
        assert_eq!(decoded, batch);
    }

    #[test]
    fn test_headers() {
        let config = ShipperConfig {
            use_compression: true,
            ..ShipperConfig::new("secret-token")
        };
        let headers = build_headers(&config).unwrap();

        assert_eq!(headers[AUTHORIZATION], "Bearer secret-token");
        assert!(headers[AUTHORIZATION].is_sensitive());
        assert_eq!(headers[CONTENT_TYPE], "application/msgpack");
        assert_eq!(headers[CONTENT_ENCODING], "zstd");
        assert!(headers[USER_AGENT]
            .to_str()
            .unwrap()
            .starts_with("log-shipper/"));
    }

    #[test]
    fn test_credential_with_newline_is_rejected() {
        let config = ShipperConfig::new("bad\ntoken");
        assert!(matches!(
            build_headers(&config),
            Err(ShipperError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_truncate_at_char_boundary() {
        let mut text = "héllo".to_string();
        truncate_at_char_boundary(&mut text, 2);
        assert_eq!(text, "h");

        let mut short = "ok".to_string();
        truncate_at_char_boundary(&mut short, 10);
        assert_eq!(short, "ok");
    }

    #[tokio::test]
    async fn test_deliver_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("authorization", "Bearer secret-token")
            .match_header("content-type", "application/msgpack")
            .with_status(202)
            .expect(1)
            .create_async()
            .await;

        let transport = HttpTransport::new(&config_for(&server)).unwrap();
        let outcome = transport.deliver(&[document("hello")]).await;

        assert!(outcome.is_success());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_deliver_json_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!([{"level": "info", "message": "hello"}])))
            .with_status(200)
            .create_async()
            .await;

        let config = ShipperConfig {
            encoding: Encoding::Json,
            ..config_for(&server)
        };
        let transport = HttpTransport::new(&config).unwrap();

        assert!(transport.deliver(&[document("hello")]).await.is_success());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_deliver_server_error_is_retryable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(503)
            .with_body("try later")
            .create_async()
            .await;

        let transport = HttpTransport::new(&config_for(&server)).unwrap();
        match transport.deliver(&[document("hello")]).await {
            DeliveryOutcome::RetryableFailure(DeliveryError::Status { status, body }) => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, "try later");
            }
            other => panic!("expected a retryable failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deliver_client_error_is_fatal() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(403)
            .with_body("Access denied")
            .create_async()
            .await;

        let transport = HttpTransport::new(&config_for(&server)).unwrap();
        let outcome = transport.deliver(&[document("hello")]).await;
        assert!(matches!(outcome, DeliveryOutcome::FatalFailure(_)));
    }

    #[tokio::test]
    async fn test_deliver_network_error_is_retryable() {
        // Nothing listens on port 9 (discard) on test machines.
        let config = ShipperConfig {
            destination: "http://127.0.0.1:9".to_string(),
            ..ShipperConfig::new("token")
        };
        let transport = HttpTransport::new(&config).unwrap();

        match transport.deliver(&[document("hello")]).await {
            DeliveryOutcome::RetryableFailure(DeliveryError::Network(_)) => {}
            other => panic!("expected a network failure, got {other:?}"),
        }
    }
}
