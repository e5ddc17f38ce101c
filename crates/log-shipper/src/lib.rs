// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Log Shipper
//!
//! Client-side shipping of structured log documents to an HTTP ingestion
//! service.
//!
//! ## Overview
//!
//! Producers hand documents to a [`LogShipper`] and return immediately. A
//! background worker drains the bounded queue into batches and uploads them:
//!
//! ```text
//!   producers ──submit──> BoundedQueue ──fill──> BatchWorker ──deliver──> Transport
//!       │                      ^                       │
//!       └───────flush()────────┴───── settled ─────────┘
//! ```
//!
//! - [`queue`]: bounded FIFO with blocking and non-blocking producers
//! - [`worker`]: fill/send cycle, retry schedule, shutdown drain
//! - [`transport`]: encoding, compression and outcome classification
//! - [`shipper`]: the facade, flush barrier and lifecycle
//! - [`document`] and [`context`]: building documents from events
//!
//! ## Example
//!
//! ```rust,no_run
//! use log_shipper::{ContextStack, Level, LogEvent, LogShipper, ShipperConfig};
//! use serde_json::json;
//!
//! let shipper = LogShipper::new(ShipperConfig::new("my-source-token"))?;
//! let contexts = ContextStack::new();
//!
//! let _request = contexts.push([("request", json!({"id": "r-42"}))])?;
//! let event = LogEvent::new(Level::Info, "order placed").with_field("total", 200);
//! shipper.submit_event(&event, &contexts)?;
//!
//! shipper.flush();
//! # Ok::<(), log_shipper::ShipperError>(())
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_copy_implementations)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod context;
pub mod document;
pub mod error;
pub mod http;
pub mod queue;
pub mod shipper;
pub mod transport;
pub mod worker;

pub use config::{Encoding, ShipperConfig};
pub use context::{ContextGuard, ContextStack};
pub use document::value::{FieldValue, SharedMap};
pub use document::{Document, DocumentBuilder, Level, LogEvent};
pub use error::ShipperError;
pub use shipper::{LogShipper, Submission};
pub use transport::{DeliveryError, DeliveryOutcome, HttpTransport, Transport};
pub use worker::{ShipperStats, WorkerStatus};
