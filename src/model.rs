//! Book record produced by search and consumed by download and rendering.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One archive entry found by a search.
///
/// Built by the extraction strategies; read-only afterwards. `hash` is the content
/// identifier used as the download key. An empty hash marks an entry whose
/// extraction failed; such entries are shown but cannot be downloaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub title: String,
    pub authors: String,
    pub publisher: String,
    pub language: String,
    /// File extension without leading separator, e.g. `epub`.
    pub format: String,
    pub size: String,
    /// Absolute URL of the detail page.
    pub url: String,
    pub hash: String,
}

impl Book {
    /// True when the entry carries a content hash.
    pub fn is_downloadable(&self) -> bool {
        !self.hash.trim().is_empty()
    }

    /// File name for a download: `<title>.<format>` with path separators replaced by `_`.
    pub fn download_filename(&self) -> String {
        format!("{}.{}", self.title, self.format).replace(['/', '\\'], "_")
    }

    /// Indented JSON rendering of the record.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Title: {}\nAuthors: {}\nPublisher: {}\nLanguage: {}\nFormat: {}\nSize: {}\nURL: {}\nHash: {}",
            self.title,
            self.authors,
            self.publisher,
            self.language,
            self.format,
            self.size,
            self.url,
            self.hash
        )
    }
}
