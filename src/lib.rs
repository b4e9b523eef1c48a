//! annadl: search Anna's Archive and download books through its fast-download API.

pub mod archive;
pub mod cli;
pub mod config;
pub mod formats;
pub mod model;

// Re-exports for CLI and consumers.
pub use archive::{
    Archive, ArchiveError, DownloadOptions, Downloaded, IpFamily, Transport, TransportBuilder,
};
pub use formats::{render_books, write_books, FormatError, OutputFormat};
pub use model::Book;
