//! Metadata line normalizer.
//!
//! Search results carry one comma-separated line such as
//! `English [en], .epub, 🚀/lgli/zlib, 0.6MB, 📘 Book (fiction)`. Only the
//! language, format and size positions are used. The layout follows the site's
//! current markup; when it changes, update the indices below.

const SEPARATOR: &str = ", ";
const MIN_SEGMENTS: usize = 5;
const LANGUAGE_INDEX: usize = 0;
const FORMAT_INDEX: usize = 1;
const SIZE_INDEX: usize = 3;

/// Language, format and size taken from a metadata line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaInfo {
    pub language: String,
    pub format: String,
    pub size: String,
}

/// Split a metadata line into its positional fields.
///
/// Lines with fewer than five segments yield all-empty fields rather than an error,
/// so one odd entry never fails a whole search.
pub fn extract_meta_information(meta: &str) -> MetaInfo {
    let parts: Vec<&str> = meta.split(SEPARATOR).collect();
    if parts.len() < MIN_SEGMENTS {
        return MetaInfo::default();
    }
    MetaInfo {
        language: parts[LANGUAGE_INDEX].to_string(),
        format: parts[FORMAT_INDEX].to_string(),
        size: parts[SIZE_INDEX].to_string(),
    }
}

/// Drop one leading separator (e.g. the dot in `.epub`) from a format string.
pub(crate) fn strip_format_separator(format: &str) -> String {
    let format = format.trim();
    match format.chars().next() {
        Some(c) if !c.is_alphanumeric() => format[c.len_utf8()..].to_string(),
        _ => format.to_string(),
    }
}
