// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Defaults for the shipping pipeline.
//!
//! # Batching
//!
//! A batch closes when it holds [`DEFAULT_BUFFER_CAPACITY`] documents or when
//! [`DEFAULT_FLUSH_INTERVAL`] has elapsed since the fill phase started, whichever
//! comes first. The worker polls the queue every [`DEFAULT_CHECK_INTERVAL`] so it
//! notices shutdown and flush requests promptly.

use std::time::Duration;

/// Ingestion endpoint used when no destination is configured.
pub const DEFAULT_DESTINATION: &str = "https://in.logs.betterstack.com";

/// Maximum number of documents buffered in the queue, and per batch.
///
/// # Value: 1,000 documents
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// Upper bound on how long a document waits in the queue before its batch is sent.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Poll granularity of the fill phase.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Per-request timeout of the HTTP transport.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// zstd level used when compression is enabled.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Waits between delivery attempts of one batch.
///
/// # Value: 1s, 10s, 60s
///
/// A batch is attempted `RETRY_SCHEDULE.len() + 1` times in total before it
/// is dropped.
pub const RETRY_SCHEDULE: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(10),
    Duration::from_secs(60),
];

/// Placeholder written in place of a reference back to one of its ancestors.
pub const CIRCULAR_REFERENCE_PLACEHOLDER: &str = "<omitted circular reference>";
