//! HTTP probe implementation.

use serde::Serialize;
use std::time::{Duration, Instant};

use super::{error_chain, ProbeError};

/// Outcome of a single HTTP GET.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HttpOutcome {
    /// The server answered; `body_time_ms` covers the full body transfer.
    Response { status_code: u16, body_time_ms: f64 },
    TimedOut,
    TransportError { message: String },
}

/// HTTP prober holding one reusable client.
///
/// Certificates are not validated here: trust problems are the certificate
/// inspector's business, and an endpoint with a bad certificate is still up.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .user_agent(concat!("beacon/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProbeError::Config(error_chain(&e)))?;
        Ok(Self { client })
    }

    /// GET `url`, bounded by `timeout` from connect until the body is read.
    pub async fn probe(&self, url: &str, timeout: Duration) -> HttpOutcome {
        let start = Instant::now();

        let response = match self.client.get(url).timeout(timeout).send().await {
            Ok(r) => r,
            Err(e) => return transport_outcome(e),
        };
        let status_code = response.status().as_u16();

        // Read the full body to measure complete transfer time
        if let Err(e) = response.bytes().await {
            return transport_outcome(e);
        }

        HttpOutcome::Response {
            status_code,
            body_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        }
    }
}

fn transport_outcome(e: reqwest::Error) -> HttpOutcome {
    if e.is_timeout() {
        HttpOutcome::TimedOut
    } else {
        HttpOutcome::TransportError {
            message: error_chain(&e),
        }
    }
}
