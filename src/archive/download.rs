//! Two-stage download: exchange hash and secret key for a direct URL, then stream the file.

use crate::archive::error::ArchiveError;
use crate::archive::{Archive, Transport};
use crate::model::Book;
use reqwest::Url;
use serde::Deserialize;
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const RESOLVE_PATH: &str = "dyn/api/fast_download.json";
const CHUNK_SIZE: usize = 8192;

/// Body of the fast-download endpoint.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct FastDownloadResponse {
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    account_fast_download_info: Option<AccountInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct AccountInfo {
    #[serde(default)]
    downloads_left: Option<i64>,
}

impl FastDownloadResponse {
    fn downloads_left(&self) -> Option<i64> {
        self.account_fast_download_info
            .as_ref()
            .and_then(|a| a.downloads_left)
    }

    /// The direct URL, or the endpoint's own error message, or a generic failure.
    fn into_download_url(self) -> Result<String, ArchiveError> {
        match self.download_url.filter(|u| !u.is_empty()) {
            Some(url) => Ok(url),
            None => match self.error.filter(|e| !e.is_empty()) {
                Some(message) => Err(ArchiveError::Api(message)),
                None => Err(ArchiveError::NoDownloadUrl),
            },
        }
    }
}

/// Callbacks for a download. `progress` receives bytes written so far and the
/// announced content length, if any.
#[derive(Default)]
pub struct DownloadOptions<'a> {
    pub progress: Option<&'a dyn Fn(u64, Option<u64>)>,
}

/// Result of a completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub path: PathBuf,
    pub bytes: u64,
    /// Remaining fast downloads on the account, when the API reports it.
    pub downloads_left: Option<i64>,
}

/// `<base>/dyn/api/fast_download.json?md5=<hash>&key=<secret_key>`
pub(crate) fn resolve_url(base: &Url, hash: &str, secret_key: &str) -> Result<Url, ArchiveError> {
    let mut url = base.join(RESOLVE_PATH).map_err(|e| ArchiveError::InvalidUrl {
        input: base.to_string(),
        reason: e.to_string(),
    })?;
    url.query_pairs_mut()
        .append_pair("md5", hash)
        .append_pair("key", secret_key);
    Ok(url)
}

/// The URL minus its query, so the secret key stays out of messages.
fn without_query(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}

fn fetch_download_response(
    transport: &Transport,
    url: &Url,
) -> Result<FastDownloadResponse, ArchiveError> {
    // reqwest errors embed the request URL, query and key included.
    let response = transport
        .get(url.as_str())
        .map_err(|e| ArchiveError::Network {
            url: without_query(url),
            source: e.without_url(),
        })?;
    let body = response.text().map_err(|e| ArchiveError::BodyRead {
        source: e.without_url(),
    })?;
    serde_json::from_str(&body).map_err(|e| ArchiveError::Decode { source: e })
}

/// Copy `reader` into a new file at `path`, reporting progress per chunk.
/// An interrupted copy leaves the partial file in place.
fn stream_to_file(
    reader: &mut impl Read,
    path: &Path,
    content_length: Option<u64>,
    progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<u64, ArchiveError> {
    let mut file = File::create(path).map_err(|e| ArchiveError::CreateFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let write_err = |e| ArchiveError::Write {
        path: path.to_path_buf(),
        source: e,
    };
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ArchiveError::BodyStream { source: e }),
        };
        file.write_all(&buf[..n]).map_err(write_err)?;
        written += n as u64;
        if let Some(p) = progress {
            p(written, content_length);
        }
    }
    file.flush().map_err(write_err)?;
    Ok(written)
}

pub(crate) fn download(
    archive: &Archive,
    book: &Book,
    secret_key: &str,
    folder: &Path,
    options: &DownloadOptions<'_>,
) -> Result<Downloaded, ArchiveError> {
    if !book.is_downloadable() {
        return Err(ArchiveError::MissingHash {
            title: book.title.clone(),
        });
    }

    let api_url = resolve_url(archive.base_url(), &book.hash, secret_key)?;
    debug!(hash = %book.hash, "Resolving download URL");
    let api_response = fetch_download_response(archive.transport(), &api_url)?;
    let downloads_left = api_response.downloads_left();
    if let Some(left) = downloads_left {
        info!(downloads_left = left, "Fast downloads remaining");
    }
    let download_url = api_response.into_download_url()?;

    let mut response = archive
        .transport()
        .get(&download_url)
        .map_err(|e| ArchiveError::Network {
            url: download_url.clone(),
            source: e,
        })?;
    let status = response.status();
    if !status.is_success() {
        return Err(ArchiveError::DownloadFailed {
            status: status.as_u16(),
        });
    }
    let content_length = response.content_length();

    let path = folder.join(book.download_filename());
    info!(path = %path.display(), "Saving download");
    let bytes = stream_to_file(&mut response, &path, content_length, options.progress)?;
    info!(path = %path.display(), bytes, "Download complete");

    Ok(Downloaded {
        path,
        bytes,
        downloads_left,
    })
}

impl Book {
    /// Download this book into `folder` through `archive`. See [Archive::download].
    pub fn download(
        &self,
        archive: &Archive,
        secret_key: &str,
        folder: &Path,
    ) -> Result<Downloaded, ArchiveError> {
        archive.download(self, secret_key, folder, &DownloadOptions::default())
    }
}
