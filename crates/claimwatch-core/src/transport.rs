//! Payload transport.
//!
//! The cycle asks a [`Transport`] for a JSON document by URL and never sees
//! how it was obtained. The engine binary supplies an HTTP implementation;
//! [`StaticTransport`] serves canned documents.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;
use tokio::sync::Mutex;

/// Errors a transport can report.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request could not be sent or timed out.
    #[error("request to {url} failed: {message}")]
    Request {
        /// Requested URL.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("{url} answered with status {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The body was not valid JSON.
    #[error("{url} returned a body that is not JSON: {message}")]
    Decode {
        /// Requested URL.
        url: String,
        /// Decoder message.
        message: String,
    },

    /// Every attempt failed.
    #[error("giving up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        /// Requested URL.
        url: String,
        /// Attempts made.
        attempts: u32,
        /// The last attempt's error.
        last: Box<Self>,
    },
}

/// Fetches one JSON document.
pub trait Transport: Send + Sync {
    /// Fetch and decode the document at `url`.
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Value, FetchError>> + Send;
}

/// A transport that serves documents registered ahead of time.
///
/// Unknown URLs answer with status 404.
#[derive(Debug, Default)]
pub struct StaticTransport {
    documents: Mutex<HashMap<String, Value>>,
    calls: AtomicUsize,
}

impl StaticTransport {
    /// Create a transport with no documents.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the document served for `url`.
    pub async fn serve(&self, url: &str, document: Value) {
        self.documents.lock().await.insert(url.to_owned(), document);
    }

    /// Stop serving `url`.
    pub async fn withdraw(&self, url: &str) {
        self.documents.lock().await.remove(url);
    }

    /// Number of fetches made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Transport for StaticTransport {
    async fn fetch(&self, url: &str) -> Result<Value, FetchError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.documents
            .lock()
            .await
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_owned(),
                status: 404,
            })
    }
}
