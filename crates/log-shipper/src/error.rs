// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors surfaced by the shipper's construction and enqueue paths.
///
/// Delivery failures never show up here: they are handled (and logged) by the
/// background worker, see [`crate::transport::DeliveryError`].
#[derive(Debug, thiserror::Error)]
pub enum ShipperError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid context '{0}': all contexts must be mappings")]
    InvalidContext(String),

    #[error("Log queue is full, document dropped")]
    QueueFull,

    #[error("Log shipper has been shut down")]
    ShutDown,

    #[error("Failed to start flush worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ShipperError::InvalidConfig("missing credential".to_string());
        assert_eq!(error.to_string(), "Invalid configuration: missing credential");

        let error = ShipperError::InvalidContext("user".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid context 'user': all contexts must be mappings"
        );
    }

    #[test]
    fn test_worker_spawn_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "no threads left");
        let error: ShipperError = io.into();
        assert!(matches!(error, ShipperError::WorkerSpawn(_)));
        assert!(error.to_string().contains("no threads left"));
    }
}
