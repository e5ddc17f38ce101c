// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client construction.
//!
//! The client carries the request timeout, connection pooling settings and,
//! when configured, an HTTPS proxy. An unusable proxy URL is logged and the
//! client is built for a direct connection instead.

use crate::config::ShipperConfig;
use crate::error::ShipperError;
use std::error::Error;
use std::time::Duration;
use tracing::error;

/// Builds the client used by [`crate::transport::HttpTransport`].
pub fn get_client(config: &ShipperConfig) -> Result<reqwest::Client, ShipperError> {
    match build_client(config, true) {
        Ok(client) => Ok(client),
        Err(e) => {
            error!(
                "LOGS | Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            build_client(config, false).map_err(|e| ShipperError::HttpClient(e.to_string()))
        }
    }
}

fn build_client(
    config: &ShipperConfig,
    allow_proxy: bool,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if allow_proxy {
        if let Some(https_uri) = &config.https_proxy {
            let proxy = reqwest::Proxy::https(https_uri.as_str())?;
            client = client.proxy(proxy);
        }
    }

    Ok(client.build()?)
}
