//! Anna's Archive access: shared transport, search extraction, and downloads.

mod client;
mod download;
mod error;

pub mod extract;
pub mod meta;

pub use client::{IpFamily, Transport, TransportBuilder};
pub use download::{DownloadOptions, Downloaded};
pub use error::ArchiveError;

use crate::model::Book;
use reqwest::Url;
use std::path::Path;
use tracing::{error, info};

/// Default archive origin.
pub const ANNAS_BASE_URL: &str = "https://annas-archive.org";

/// Check response status and read body as text.
pub(crate) fn check_response(
    response: reqwest::blocking::Response,
    url: &str,
    context: Option<&str>,
) -> Result<String, ArchiveError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ArchiveError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
            context: context.map(String::from),
        });
    }
    response
        .text()
        .map_err(|e| ArchiveError::BodyRead { source: e })
}

/// Search and download client for one archive origin.
#[derive(Debug, Clone)]
pub struct Archive {
    transport: Transport,
    base: Url,
}

impl Archive {
    /// Archive at [ANNAS_BASE_URL].
    pub fn new(transport: Transport) -> Result<Self, ArchiveError> {
        Self::with_base_url(transport, ANNAS_BASE_URL)
    }

    /// Archive at a mirror or test origin.
    pub fn with_base_url(transport: Transport, base_url: &str) -> Result<Self, ArchiveError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base = Url::parse(&normalized).map_err(|e| ArchiveError::InvalidUrl {
            input: base_url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { transport, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub(crate) fn transport(&self) -> &Transport {
        &self.transport
    }

    /// `<base>/search?q=<query>`, query form-encoded.
    pub fn search_url(&self, query: &str) -> Result<Url, ArchiveError> {
        if query.trim().is_empty() {
            return Err(ArchiveError::EmptyQuery);
        }
        let mut url = self
            .base
            .join("search")
            .map_err(|e| ArchiveError::InvalidUrl {
                input: self.base.to_string(),
                reason: e.to_string(),
            })?;
        url.query_pairs_mut().append_pair("q", query);
        Ok(url)
    }

    /// Search the archive and return the books found on the first results page.
    ///
    /// Fetch failures are errors; malformed entries only drop or blank that entry.
    pub fn find_book(&self, query: &str) -> Result<Vec<Book>, ArchiveError> {
        let url = self.search_url(query)?;
        info!(query, url = %url, "Searching for books");

        let response = self.transport.get(url.as_str()).map_err(|e| {
            error!(error = %e, url = %url, "Search request failed");
            ArchiveError::Network {
                url: url.to_string(),
                source: e,
            }
        })?;
        // Relative links resolve against the final URL, after redirects.
        let page_url = response.url().clone();
        let html = check_response(response, url.as_str(), Some("search page")).map_err(|e| {
            error!(error = %e, url = %url, "Search page unavailable");
            e
        })?;

        let extraction = extract::extract_books(&html, page_url)?;
        let strategy = extraction.strategy.map(|s| s.name()).unwrap_or("none");
        info!(
            strategy,
            count = extraction.books.len(),
            "Returning parsed results"
        );
        Ok(extraction.books)
    }

    /// Search and pick the result with content hash `hash`.
    pub fn find_book_by_hash(&self, query: &str, hash: &str) -> Result<Book, ArchiveError> {
        self.find_book(query)?
            .into_iter()
            .find(|b| b.hash.eq_ignore_ascii_case(hash))
            .ok_or_else(|| ArchiveError::BookNotFound {
                hash: hash.to_string(),
            })
    }

    /// A downloadable record for a known content hash, built without searching.
    /// An empty `title` falls back to the hash.
    pub fn book_for_hash(&self, hash: &str, title: &str, format: &str) -> Result<Book, ArchiveError> {
        let hash = hash.trim();
        if hash.is_empty() {
            return Err(ArchiveError::MissingHash {
                title: title.to_string(),
            });
        }
        let url = self
            .base
            .join(&format!("md5/{}", hash))
            .map_err(|e| ArchiveError::InvalidUrl {
                input: hash.to_string(),
                reason: e.to_string(),
            })?;
        let title = title.trim();
        Ok(Book {
            title: (if title.is_empty() { hash } else { title }).to_string(),
            format: format.trim().trim_start_matches('.').to_string(),
            url: url.to_string(),
            hash: hash.to_string(),
            ..Book::default()
        })
    }

    /// Resolve a direct URL for `book` with `secret_key` and stream it to
    /// `<folder>/<title>.<format>`.
    pub fn download(
        &self,
        book: &Book,
        secret_key: &str,
        folder: &Path,
        options: &DownloadOptions<'_>,
    ) -> Result<Downloaded, ArchiveError> {
        download::download(self, book, secret_key, folder, options)
    }
}
