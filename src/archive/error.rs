//! Shared error type for searching and downloading.

use std::path::PathBuf;
use thiserror::Error;

/// Archive error covering the search page, the resolve API, and the file fetch.
#[derive(Debug, Error)]
pub enum ArchiveError {
    // Input
    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("Search query is empty.")]
    EmptyQuery,

    #[error("Book '{title}' has no content hash and cannot be downloaded.")]
    MissingHash { title: String },

    #[error("No search result with hash {hash}.")]
    BookNotFound { hash: String },

    // HTTP and network
    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus {
        status: u16,
        url: String,
        /// Optional context (e.g. "search page") for programmatic use.
        context: Option<String>,
    },

    #[error("Failed to read response body: {source}")]
    BodyRead { source: reqwest::Error },

    #[error("Connection failed while receiving the file: {source}")]
    BodyStream {
        #[source]
        source: std::io::Error,
    },

    // Resolve API
    #[error("Could not decode download API response: {source}")]
    Decode { source: serde_json::Error },

    /// Error message returned verbatim by the resolve endpoint.
    #[error("{0}")]
    Api(String),

    #[error("failed to get download URL")]
    NoDownloadUrl,

    #[error("failed to download file (HTTP {status})")]
    DownloadFailed { status: u16 },

    // Filesystem
    #[error("Cannot create {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Parsing
    #[error("Invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },
}
