//! HTTP transport abstraction for dependency injection.
//!
//! Provides the [`HttpClient`] trait so that catalog lookups and downloads
//! can be unit-tested without touching the network.  Production code uses
//! [`UreqClient`], which applies one global timeout to every request.

use std::fs::File;
use std::io::{self, BufWriter, Write as _};
use std::path::Path;
use std::time::Duration;

use crate::error::HttpError;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// `Accept` header understood by the gallery query endpoint.
const GALLERY_ACCEPT: &str = "application/json;api-version=6.0-preview.1";

/// Abstraction over the three request shapes the engine needs.
#[cfg_attr(test, mockall::automock)]
pub trait HttpClient: Send + Sync {
    /// POST a JSON body and return the response text.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout, transport failure, or a non-2xx status.
    fn post_json(&self, url: &str, body: &str) -> Result<String, HttpError>;

    /// Send a HEAD request and return the status code (any status).
    ///
    /// # Errors
    ///
    /// Returns an error on timeout or transport failure.
    fn head(&self, url: &str) -> Result<u16, HttpError>;

    /// GET `url` and stream the body into `dest`, returning the byte count.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout, transport failure, a non-2xx status, or
    /// when `dest` cannot be written.
    fn download_to(&self, url: &str, dest: &Path) -> Result<u64, HttpError>;
}

/// Production [`HttpClient`] backed by a shared [`ureq::Agent`].
pub struct UreqClient {
    agent: ureq::Agent,
    user_agent: String,
    timeout: Duration,
}

impl std::fmt::Debug for UreqClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UreqClient")
            .field("agent", &"<ureq::Agent>")
            .field("user_agent", &self.user_agent)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl UreqClient {
    /// Create a client whose every request is bounded by `timeout`.
    #[must_use]
    pub fn new(timeout: Duration, user_agent: &str) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: config.into(),
            user_agent: user_agent.to_string(),
            timeout,
        }
    }
}

impl Default for UreqClient {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, concat!("extpack/", env!("CARGO_PKG_VERSION")))
    }
}

impl HttpClient for UreqClient {
    fn post_json(&self, url: &str, body: &str) -> Result<String, HttpError> {
        let mut response = self
            .agent
            .post(url)
            .header("User-Agent", self.user_agent.as_str())
            .header("Content-Type", "application/json")
            .header("Accept", GALLERY_ACCEPT)
            .send(body)
            .map_err(|e| map_ureq_error(url, e))?;
        check_status(url, response.status().as_u16())?;
        response
            .body_mut()
            .read_to_string()
            .map_err(|e| map_ureq_error(url, e))
    }

    fn head(&self, url: &str) -> Result<u16, HttpError> {
        let response = self
            .agent
            .head(url)
            .header("User-Agent", self.user_agent.as_str())
            .call()
            .map_err(|e| map_ureq_error(url, e))?;
        Ok(response.status().as_u16())
    }

    fn download_to(&self, url: &str, dest: &Path) -> Result<u64, HttpError> {
        let mut response = self
            .agent
            .get(url)
            .header("User-Agent", self.user_agent.as_str())
            .call()
            .map_err(|e| map_ureq_error(url, e))?;
        check_status(url, response.status().as_u16())?;

        let io_err = |source: io::Error| HttpError::Io {
            url: url.to_string(),
            source,
        };
        let mut file = BufWriter::new(File::create(dest).map_err(io_err)?);
        let mut reader = response.body_mut().as_reader();
        let written = io::copy(&mut reader, &mut file).map_err(|e| {
            if e.kind() == io::ErrorKind::TimedOut {
                HttpError::Timeout {
                    url: url.to_string(),
                }
            } else {
                io_err(e)
            }
        })?;
        file.flush().map_err(io_err)?;
        Ok(written)
    }
}

/// Whether `status` is in the 2xx range.
#[must_use]
pub const fn is_success(status: u16) -> bool {
    matches!(status, 200..=299)
}

fn check_status(url: &str, status: u16) -> Result<(), HttpError> {
    if is_success(status) {
        Ok(())
    } else {
        Err(HttpError::Status {
            url: url.to_string(),
            status,
        })
    }
}

fn map_ureq_error(url: &str, error: ureq::Error) -> HttpError {
    match error {
        ureq::Error::Timeout(_) => HttpError::Timeout {
            url: url.to_string(),
        },
        ureq::Error::Io(e) if e.kind() == io::ErrorKind::TimedOut => HttpError::Timeout {
            url: url.to_string(),
        },
        ureq::Error::StatusCode(status) => HttpError::Status {
            url: url.to_string(),
            status,
        },
        other => HttpError::Transport {
            url: url.to_string(),
            reason: other.to_string(),
        },
    }
}
