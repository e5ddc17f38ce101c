// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants;
use crate::error::ShipperError;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Body encoding of an uploaded batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// MessagePack array of maps.
    #[default]
    MessagePack,
    /// JSON array of objects.
    Json,
}

impl Encoding {
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Encoding::MessagePack => "application/msgpack",
            Encoding::Json => "application/json",
        }
    }
}

impl FromStr for Encoding {
    type Err = ShipperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "msgpack" | "messagepack" => Ok(Encoding::MessagePack),
            "json" => Ok(Encoding::Json),
            other => Err(ShipperError::InvalidConfig(format!(
                "Unknown encoding '{other}'. Must be one of: msgpack, json"
            ))),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::MessagePack => write!(f, "msgpack"),
            Encoding::Json => write!(f, "json"),
        }
    }
}

/// Configuration of a [`crate::LogShipper`].
#[derive(Clone)]
pub struct ShipperConfig {
    /// Ingestion endpoint. A bare host is reached over https.
    pub destination: String,
    /// Bearer token sent with every upload
    pub credential: String,
    /// Queue capacity, and the largest batch the worker assembles
    pub buffer_capacity: usize,
    /// Longest time a fill phase stays open
    pub flush_interval: Duration,
    /// Poll granularity of the fill phase
    pub check_interval: Duration,
    /// Return enqueue-path errors to the caller instead of swallowing them
    pub raise_on_error: bool,
    /// Drop new documents when the queue is full instead of blocking the producer
    pub drop_when_full: bool,
    /// Embed non-mapping extra fields of an event in its document
    pub include_extra_fields: bool,
    /// Waits between delivery attempts of one batch
    pub retry_schedule: Vec<Duration>,
    pub encoding: Encoding,
    /// zstd-compress request bodies
    pub use_compression: bool,
    pub compression_level: i32,
    /// Timeout of a single upload request
    pub request_timeout: Duration,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
    /// Start the flush worker at construction rather than on first submit
    pub eager_start: bool,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            destination: constants::DEFAULT_DESTINATION.to_string(),
            credential: String::new(),
            buffer_capacity: constants::DEFAULT_BUFFER_CAPACITY,
            flush_interval: constants::DEFAULT_FLUSH_INTERVAL,
            check_interval: constants::DEFAULT_CHECK_INTERVAL,
            raise_on_error: false,
            drop_when_full: true,
            include_extra_fields: true,
            retry_schedule: constants::RETRY_SCHEDULE.to_vec(),
            encoding: Encoding::default(),
            use_compression: false,
            compression_level: constants::DEFAULT_COMPRESSION_LEVEL,
            request_timeout: constants::DEFAULT_REQUEST_TIMEOUT,
            https_proxy: None,
            eager_start: false,
        }
    }
}

impl fmt::Debug for ShipperConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShipperConfig")
            .field("destination", &self.destination)
            .field("credential", &"<redacted>")
            .field("buffer_capacity", &self.buffer_capacity)
            .field("flush_interval", &self.flush_interval)
            .field("check_interval", &self.check_interval)
            .field("raise_on_error", &self.raise_on_error)
            .field("drop_when_full", &self.drop_when_full)
            .field("include_extra_fields", &self.include_extra_fields)
            .field("retry_schedule", &self.retry_schedule)
            .field("encoding", &self.encoding)
            .field("use_compression", &self.use_compression)
            .field("compression_level", &self.compression_level)
            .field("request_timeout", &self.request_timeout)
            .field("https_proxy", &self.https_proxy)
            .field("eager_start", &self.eager_start)
            .finish()
    }
}

impl ShipperConfig {
    /// Configuration with default settings for the given credential.
    #[must_use]
    pub fn new(credential: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
            ..Default::default()
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ShipperError> {
        let defaults = Self::default();

        let destination =
            env::var("LOG_SHIPPER_DESTINATION").unwrap_or_else(|_| defaults.destination.clone());
        let credential = env::var("LOG_SHIPPER_TOKEN").unwrap_or_default();
        let buffer_capacity = env::var("LOG_SHIPPER_BUFFER_CAPACITY")
            .ok()
            .and_then(|val| val.trim().parse::<usize>().ok())
            .unwrap_or(defaults.buffer_capacity);
        let flush_interval =
            env_seconds("LOG_SHIPPER_FLUSH_INTERVAL").unwrap_or(defaults.flush_interval);
        let check_interval =
            env_seconds("LOG_SHIPPER_CHECK_INTERVAL").unwrap_or(defaults.check_interval);
        let request_timeout =
            env_seconds("LOG_SHIPPER_REQUEST_TIMEOUT").unwrap_or(defaults.request_timeout);
        let raise_on_error = env_flag("LOG_SHIPPER_RAISE_ON_ERROR").unwrap_or(false);
        let drop_when_full = env_flag("LOG_SHIPPER_DROP_WHEN_FULL").unwrap_or(true);
        let include_extra_fields = env_flag("LOG_SHIPPER_INCLUDE_EXTRA_FIELDS").unwrap_or(true);
        let use_compression = env_flag("LOG_SHIPPER_USE_COMPRESSION").unwrap_or(false);
        let compression_level = env::var("LOG_SHIPPER_COMPRESSION_LEVEL")
            .ok()
            .and_then(|val| val.trim().parse::<i32>().ok())
            .unwrap_or(defaults.compression_level);
        let encoding = match env::var("LOG_SHIPPER_ENCODING") {
            Ok(val) => val.parse::<Encoding>()?,
            Err(_) => defaults.encoding,
        };
        let https_proxy = env::var("LOG_SHIPPER_PROXY_HTTPS")
            .or_else(|_| env::var("HTTPS_PROXY"))
            .ok();

        let config = Self {
            destination,
            credential,
            buffer_capacity,
            flush_interval,
            check_interval,
            raise_on_error,
            drop_when_full,
            include_extra_fields,
            encoding,
            use_compression,
            compression_level,
            request_timeout,
            https_proxy,
            ..defaults
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ShipperError> {
        if self.credential.trim().is_empty() {
            return Err(ShipperError::InvalidConfig(
                "credential cannot be empty".to_string(),
            ));
        }

        if self.buffer_capacity == 0 {
            return Err(ShipperError::InvalidConfig(
                "buffer capacity must be greater than 0".to_string(),
            ));
        }

        if self.flush_interval.is_zero() || self.check_interval.is_zero() {
            return Err(ShipperError::InvalidConfig(
                "flush and check intervals must be greater than 0".to_string(),
            ));
        }

        if reqwest::Url::parse(&self.endpoint()).is_err() {
            return Err(ShipperError::InvalidConfig(format!(
                "invalid destination '{}'",
                self.destination
            )));
        }

        if !(1..=22).contains(&self.compression_level) {
            return Err(ShipperError::InvalidConfig(format!(
                "invalid compression level {}. Must be between 1 and 22",
                self.compression_level
            )));
        }

        Ok(())
    }

    /// Destination with an explicit scheme.
    #[must_use]
    pub fn endpoint(&self) -> String {
        let destination = self.destination.trim();
        if destination.starts_with("https://") || destination.starts_with("http://") {
            destination.to_string()
        } else {
            format!("https://{destination}")
        }
    }
}

fn env_flag(key: &str) -> Option<bool> {
    env::var(key).ok().map(|val| {
        let val = val.trim().to_lowercase();
        !(val == "false" || val == "0" || val == "no")
    })
}

fn env_seconds(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|val| val.trim().parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}
