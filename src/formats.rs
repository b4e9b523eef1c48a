//! Rendering of search results as text or JSON, to a string or a file.

use crate::model::Book;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Output format selector for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Errors from rendering or writing results.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Failed to serialize results: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to write output: {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Numbered text blocks separated by blank lines.
fn render_text(books: &[Book]) -> String {
    books
        .iter()
        .enumerate()
        .map(|(i, book)| format!("[{}]\n{}", i + 1, book))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Render `books` in `format`. Text output for an empty list is empty.
pub fn render_books(books: &[Book], format: OutputFormat) -> Result<String, FormatError> {
    match format {
        OutputFormat::Text => Ok(render_text(books)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(books)?),
    }
}

/// Write the rendering of `books` to `path`, replacing any existing file.
pub fn write_books(books: &[Book], format: OutputFormat, path: &Path) -> Result<(), FormatError> {
    let rendered = render_books(books, format)?;
    let io_err = |e| FormatError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    let mut f = File::create(path).map_err(io_err)?;
    f.write_all(rendered.as_bytes()).map_err(io_err)?;
    writeln!(f).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn books() -> Vec<Book> {
        vec![
            Book {
                title: "Foundation".to_string(),
                format: "epub".to_string(),
                hash: "aaaa".to_string(),
                url: "https://annas-archive.org/md5/aaaa".to_string(),
                ..Book::default()
            },
            Book {
                title: "Second Foundation".to_string(),
                format: "pdf".to_string(),
                hash: "bbbb".to_string(),
                url: "https://annas-archive.org/md5/bbbb".to_string(),
                ..Book::default()
            },
        ]
    }

    #[test]
    fn text_numbers_each_book() {
        let out = render_books(&books(), OutputFormat::Text).unwrap();
        assert!(out.starts_with("[1]\nTitle: Foundation\n"));
        assert!(out.contains("\n\n[2]\nTitle: Second Foundation\n"));
        assert!(out.ends_with("Hash: bbbb"));
    }

    #[test]
    fn text_of_empty_list_is_empty() {
        assert_eq!(render_books(&[], OutputFormat::Text).unwrap(), "");
    }

    #[test]
    fn json_is_array_of_records() {
        let out = render_books(&books(), OutputFormat::Json).unwrap();
        let parsed: Vec<Book> = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, books());
        assert!(out.starts_with("[\n  {"));
    }

    #[test]
    fn write_books_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        write_books(&books(), OutputFormat::Json, &path).unwrap();
        let s = std::fs::read_to_string(&path).unwrap();
        assert!(s.contains("\"title\": \"Second Foundation\""));
    }

    #[test]
    fn write_books_missing_parent_is_io_error() {
        let path = Path::new("/nonexistent_dir_annadl_xyz/results.txt");
        let result = write_books(&books(), OutputFormat::Text, path);
        assert!(matches!(result, Err(FormatError::Io { .. })));
    }
}
