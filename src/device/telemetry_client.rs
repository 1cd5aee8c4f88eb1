#![cfg_attr(feature = "mock", allow(dead_code, unused_imports))]

use crate::http_client::json_client;
use anyhow::Result;
use log::debug;
#[cfg(feature = "mock")]
use mockall::automock;
use reqwest::{Client, header::ACCEPT};
use serde::{Deserialize, Serialize};
use std::{fmt, net::Ipv4Addr, time::Duration};
use trait_variant::make;

/// One telemetry sample from the wearable. Produced per successful fetch and
/// handed straight to the status model; never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub voltage: f64,
    pub alert: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

/// The device reports either epoch milliseconds or an ISO-8601 string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Millis(i64),
    Iso(String),
}

/// Transient fetch failure. Fully absorbed by the failure accumulator;
/// `Display` is the user-visible reason once the offline threshold is crossed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchError {
    Timeout,
    HttpStatus(u16),
    Decode,
    Network(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Timeout => write!(f, "timeout"),
            FetchError::HttpStatus(code) => write!(f, "HTTP {code}"),
            FetchError::Decode => write!(f, "malformed readings payload"),
            FetchError::Network(msg) => write!(f, "network error: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

#[make(Send)]
#[cfg_attr(feature = "mock", automock)]
pub trait TelemetryClient {
    async fn fetch_readings(&self, addr: Ipv4Addr) -> Result<Reading, FetchError>;
}

/// Production telemetry client: one bounded-timeout GET per poll tick.
#[derive(Clone)]
pub struct HttpTelemetryClient {
    client: Client,
}

impl HttpTelemetryClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: json_client(timeout)?,
        })
    }

    fn readings_url(addr: Ipv4Addr) -> String {
        format!("http://{addr}/readings")
    }
}

impl TelemetryClient for HttpTelemetryClient {
    async fn fetch_readings(&self, addr: Ipv4Addr) -> Result<Reading, FetchError> {
        let url = Self::readings_url(addr);
        debug!("GET {url}");

        let res = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Network(e.to_string())
                }
            })?;

        let status = res.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        res.json::<Reading>().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Decode
            }
        })
    }
}
