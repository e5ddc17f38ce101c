// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod logger;

use log_shipper::{
    ContextStack, FieldValue, Level, LogEvent, LogShipper, SharedMap, ShipperConfig,
    ShipperError,
};
use serde_json::json;
use std::env;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(90);

pub fn main() -> ExitCode {
    let log_level = env::var("LOG_SHIPPER_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    let env_filter = format!("h2=off,hyper=off,rustls=off,{log_level}");

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .event_format(logger::Formatter)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Unable to install log subscriber: {e}");
    }
    debug!("Logging subsystem enabled");

    // A token on the command line wins over LOG_SHIPPER_TOKEN
    let config = match env::args().nth(1) {
        Some(token) => ShipperConfig::new(token),
        None => match ShipperConfig::from_env() {
            Ok(config) => config,
            Err(e) => {
                error!("{e}. Pass a source token as the first argument or set LOG_SHIPPER_TOKEN");
                return ExitCode::FAILURE;
            }
        },
    };

    let shipper = match LogShipper::new(config) {
        Ok(shipper) => shipper,
        Err(e) => {
            error!("Unable to start log shipper: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = send_samples(&shipper) {
        error!("Unable to submit sample events: {e}");
        return ExitCode::FAILURE;
    }

    if !shipper.flush_timeout(FLUSH_TIMEOUT) {
        warn!(
            "{} documents still pending after {:?}",
            shipper.pending(),
            FLUSH_TIMEOUT
        );
    }

    let stats = shipper.stats();
    info!(
        "Delivered {} documents in {} batches ({} attempts), dropped {} batches, {} queue-full drops",
        stats.documents_delivered,
        stats.batches_delivered,
        stats.delivery_attempts,
        stats.batches_dropped,
        stats.queue_full_drops
    );

    shipper.shutdown();
    if stats.batches_dropped > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn send_samples(shipper: &LogShipper) -> Result<(), ShipperError> {
    let contexts = ContextStack::new();

    for level in [
        Level::Debug,
        Level::Info,
        Level::Warning,
        Level::Error,
        Level::Critical,
    ] {
        let event = LogEvent::new(level, format!("sample {level} event"))
            .with_logger("log-shipper-example")
            .with_function("send_samples");
        shipper.submit_event(&event, &contexts)?;
    }

    let _order = contexts.push([("order", json!({"id": "1234", "currency": "EUR"}))])?;
    let event = LogEvent::new(Level::Info, "order placed")
        .with_logger("log-shipper-example")
        .with_field("amount", 200)
        .with_field("customer", json!({"tier": "gold"}));
    shipper.submit_event(&event, &contexts)?;

    // Cyclic data is cut at the back reference instead of failing the document
    let parent = SharedMap::new();
    let child = SharedMap::new();
    child.insert("parent", parent.clone());
    parent.insert("child", child);
    let event = LogEvent::new(Level::Debug, "cyclic payload")
        .with_logger("log-shipper-example")
        .with_field("tree", parent)
        .with_field("handle", FieldValue::opaque(std::thread::current().id()));
    shipper.submit_event(&event, &contexts)?;

    info!("Submitted sample events");
    Ok(())
}
