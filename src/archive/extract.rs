//! Search-result extraction.
//!
//! The results page has gone through several layouts, so extraction is an ordered
//! list of independent strategies over one parsed document. [resolve] returns the
//! first strategy output that is not empty.

use crate::archive::error::ArchiveError;
use crate::archive::meta::{extract_meta_information, strip_format_separator};
use crate::model::Book;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::debug;

/// Path prefix of book detail links; the content hash is the next segment.
pub const DETAIL_PREFIX: &str = "/md5/";

const RESULT_CONTAINER: &str = "div.js-vim-focus";
const RESULT_TITLE_ANCHOR: &str = "h3 a";
const RESULT_META: &str = ".text-sm.text-gray-500";
const DETAIL_ANCHOR: &str = "a[href^='/md5/']";
const CARD_FIELDS: &str = r"div.relative.top-\[-1\].pl-4.grow.overflow-hidden > div";
const CARD_TITLE: &str = r"div.relative.top-\[-1\].pl-4.grow.overflow-hidden > h3";

// Positions of the description blocks inside a result card.
const CARD_META_INDEX: usize = 0;
const CARD_PUBLISHER_INDEX: usize = 1;
const CARD_AUTHORS_INDEX: usize = 2;

fn parse_selector(sel: &str) -> Result<Selector, ArchiveError> {
    Selector::parse(sel).map_err(|e| ArchiveError::Selector {
        selector: sel.to_string(),
        reason: e.to_string(),
    })
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>()
}

/// Content hash of a detail link: the first path segment after [DETAIL_PREFIX].
/// Returns None when the link does not start with the prefix.
pub fn hash_from_href(href: &str) -> Option<String> {
    let rest = href.strip_prefix(DETAIL_PREFIX)?;
    let hash = rest.split(['/', '?', '#']).next().unwrap_or_default();
    Some(hash.to_string())
}

/// Parsed search-results document plus the URL relative links resolve against.
pub struct SearchPage {
    doc: Html,
    base: Url,
}

impl SearchPage {
    pub fn parse(html: &str, base: Url) -> Self {
        Self {
            doc: Html::parse_document(html),
            base,
        }
    }

    fn absolute_url(&self, href: &str) -> Option<String> {
        self.base.join(href).ok().map(|u| u.to_string())
    }

    /// Every detail-link anchor in document order, regardless of container structure.
    fn detail_anchors(&self) -> Result<Vec<ElementRef<'_>>, ArchiveError> {
        let sel = parse_selector(DETAIL_ANCHOR)?;
        Ok(self.doc.select(&sel).collect())
    }
}

/// Description blocks laid out next to a detail anchor.
///
/// Fields are found by position under the anchor's parent; each accessor owns one
/// position so a markup change touches one place.
struct ResultCard<'a> {
    scope: Option<ElementRef<'a>>,
    fields: &'a Selector,
    title: &'a Selector,
}

impl<'a> ResultCard<'a> {
    fn for_anchor(anchor: ElementRef<'a>, fields: &'a Selector, title: &'a Selector) -> Self {
        Self {
            scope: anchor.parent().and_then(ElementRef::wrap),
            fields,
            title,
        }
    }

    fn field(&self, index: usize) -> String {
        self.scope
            .and_then(|s| s.select(self.fields).nth(index))
            .map(text_of)
            .unwrap_or_default()
    }

    fn metadata(&self) -> String {
        self.field(CARD_META_INDEX)
    }

    fn publisher(&self) -> String {
        self.field(CARD_PUBLISHER_INDEX)
    }

    fn authors(&self) -> String {
        self.field(CARD_AUTHORS_INDEX)
    }

    fn title(&self) -> String {
        self.scope
            .and_then(|s| s.select(self.title).next())
            .map(text_of)
            .unwrap_or_default()
    }
}

/// One way of turning a results page into books.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Result rows marked as focus targets, each with a title anchor and a metadata line.
    Primary,
    /// Every detail anchor, with fields read from the card next to it.
    StructuralFallback,
    /// Every detail anchor reduced to title and hash.
    LegacyReduction,
}

/// Order in which [resolve] tries the strategies.
///
/// The structural fallback yields one entry per distinct anchor hash, so the legacy
/// reduction only matters for callers that resolve it on its own.
pub const STRATEGY_ORDER: [Strategy; 3] = [
    Strategy::Primary,
    Strategy::StructuralFallback,
    Strategy::LegacyReduction,
];

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Strategy::Primary => "primary",
            Strategy::StructuralFallback => "structural fallback",
            Strategy::LegacyReduction => "legacy reduction",
        }
    }

    pub fn extract(self, page: &SearchPage) -> Result<Vec<Book>, ArchiveError> {
        match self {
            Strategy::Primary => extract_primary(page),
            Strategy::StructuralFallback => extract_structural(page),
            Strategy::LegacyReduction => extract_legacy(page),
        }
    }
}

fn extract_primary(page: &SearchPage) -> Result<Vec<Book>, ArchiveError> {
    let container_sel = parse_selector(RESULT_CONTAINER)?;
    let anchor_sel = parse_selector(RESULT_TITLE_ANCHOR)?;
    let meta_sel = parse_selector(RESULT_META)?;

    let mut books = Vec::new();
    for container in page.doc.select(&container_sel) {
        let Some(anchor) = container.select(&anchor_sel).next() else {
            continue;
        };
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(hash) = hash_from_href(href) else {
            continue;
        };
        let Some(url) = page.absolute_url(href) else {
            continue;
        };
        let meta_line = container
            .select(&meta_sel)
            .next()
            .map(text_of)
            .unwrap_or_default();
        let meta = extract_meta_information(meta_line.trim());
        let book = Book {
            title: text_of(anchor).trim().to_string(),
            language: meta.language.trim().to_string(),
            format: strip_format_separator(&meta.format),
            size: meta.size.trim().to_string(),
            url,
            hash,
            ..Book::default()
        };
        debug!(title = %book.title, hash = %book.hash, "Found book");
        books.push(book);
    }
    Ok(books)
}

fn extract_structural(page: &SearchPage) -> Result<Vec<Book>, ArchiveError> {
    let fields_sel = parse_selector(CARD_FIELDS)?;
    let title_sel = parse_selector(CARD_TITLE)?;

    let mut seen = HashSet::new();
    let mut books = Vec::new();
    for anchor in page.detail_anchors()? {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let hash = hash_from_href(href).unwrap_or_default();
        // Cover and title links of one card point at the same hash.
        if !hash.is_empty() && !seen.insert(hash.clone()) {
            continue;
        }
        let Some(url) = page.absolute_url(href) else {
            continue;
        };
        let card = ResultCard::for_anchor(anchor, &fields_sel, &title_sel);
        let meta_line = card.metadata();
        let meta = extract_meta_information(meta_line.trim());
        let book = Book {
            title: card.title().trim().to_string(),
            authors: card.authors().trim().to_string(),
            publisher: card.publisher().trim().to_string(),
            language: meta.language.trim().to_string(),
            format: strip_format_separator(&meta.format),
            size: meta.size.trim().to_string(),
            url,
            hash,
        };
        debug!(title = %book.title, hash = %book.hash, "Found book");
        books.push(book);
    }
    Ok(books)
}

fn extract_legacy(page: &SearchPage) -> Result<Vec<Book>, ArchiveError> {
    let mut books = Vec::new();
    for anchor in page.detail_anchors()? {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(hash) = hash_from_href(href) else {
            continue;
        };
        books.push(Book {
            title: text_of(anchor).trim().to_string(),
            url: page.absolute_url(href).unwrap_or_default(),
            hash,
            ..Book::default()
        });
    }
    Ok(books)
}

/// Books chosen from a page and the strategy that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// The first strategy with output; `None` when every strategy came back empty.
    pub strategy: Option<Strategy>,
    pub books: Vec<Book>,
}

/// Run `strategies` in order and keep the first non-empty result.
/// Later strategies are not evaluated once one has produced books.
pub fn resolve(page: &SearchPage, strategies: &[Strategy]) -> Result<Extraction, ArchiveError> {
    for &strategy in strategies {
        let books = strategy.extract(page)?;
        if !books.is_empty() {
            return Ok(Extraction {
                strategy: Some(strategy),
                books,
            });
        }
    }
    Ok(Extraction {
        strategy: None,
        books: Vec::new(),
    })
}

/// Parse `html` and extract books with the default [STRATEGY_ORDER].
pub fn extract_books(html: &str, base: Url) -> Result<Extraction, ArchiveError> {
    let page = SearchPage::parse(html, base);
    resolve(&page, &STRATEGY_ORDER)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://annas-archive.org/search?q=foundation+asimov";

    fn base() -> Url {
        Url::parse(BASE).unwrap()
    }

    fn page(html: &str) -> SearchPage {
        SearchPage::parse(html, base())
    }

    /// Current layout: the focus marker sits on the anchor itself, so only the
    /// structural fallback finds these entries.
    const CARD_PAGE: &str = r#"<html><body><div class="mb-4">
<div class="h-[125] flex flex-col justify-center">
  <a href="/md5/3a4f1c2b9d8e7f6a5b4c3d2e1f0a9b8c" class="js-vim-focus custom-a flex items-center">
    <div class="flex-none"><img src="cover.jpg"/></div>
    <div class="relative top-[-1] pl-4 grow overflow-hidden">
      <div class="line-clamp-[2] text-xs text-gray-500">English [en], .epub, 🚀/lgli/zlib, 0.6MB, 📘 Book (fiction), Foundation.epub</div>
      <h3 class="text-xl font-bold"> Foundation </h3>
      <div class="truncate italic">Bantam Spectra, 1991</div>
      <div class="truncate italic"> Isaac Asimov </div>
    </div>
  </a>
</div>
<div class="h-[125] flex flex-col justify-center">
  <a href="/md5/9f8e7d6c5b4a39281706f5e4d3c2b1a0/foundation-and-empire" class="js-vim-focus custom-a flex items-center">
    <div class="relative top-[-1] pl-4 grow overflow-hidden">
      <div class="text-xs text-gray-500">English [en], .pdf, 🚀/lgli, 12.1MB, 📘 Book (fiction)</div>
      <h3>Foundation and Empire</h3>
      <div>Gnome Press</div>
      <div>Isaac Asimov</div>
    </div>
  </a>
</div>
</div></body></html>"#;

    /// Older layout with focus rows wrapping a title anchor and a metadata line.
    const ROW_PAGE: &str = r#"<html><body>
<div class="js-vim-focus">
  <h3><a href="/md5/aaaa1111/foundation">  Foundation  </a></h3>
  <div class="text-sm text-gray-500">English [en], .epub, lgli, 0.6MB, Book</div>
</div>
<div class="js-vim-focus">
  <h3><a href="/md5/bbbb2222">Second Foundation</a></h3>
  <div class="text-sm text-gray-500">English [en], .mobi, zlib, 1.1MB, Book</div>
</div>
<div class="sidebar"><a href="/md5/cccc3333">Unrelated sidebar link</a></div>
</body></html>"#;

    #[test]
    fn hash_from_href_with_and_without_rest() {
        assert_eq!(hash_from_href("/md5/abc123/some-title").as_deref(), Some("abc123"));
        assert_eq!(hash_from_href("/md5/abc123").as_deref(), Some("abc123"));
        assert_eq!(hash_from_href("/md5/abc123?x=1").as_deref(), Some("abc123"));
        assert_eq!(hash_from_href("/isbn/123"), None);
    }

    #[test]
    fn primary_strategy_reads_focus_rows() -> Result<(), ArchiveError> {
        let books = Strategy::Primary.extract(&page(ROW_PAGE))?;
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].title, "Foundation");
        assert_eq!(books[0].hash, "aaaa1111");
        assert_eq!(books[0].language, "English [en]");
        assert_eq!(books[0].format, "epub");
        assert_eq!(books[0].size, "0.6MB");
        assert_eq!(books[0].url, "https://annas-archive.org/md5/aaaa1111/foundation");
        assert_eq!(books[1].hash, "bbbb2222");
        assert!(books[0].authors.is_empty());
        assert!(books[0].publisher.is_empty());
        Ok(())
    }

    #[test]
    fn primary_results_win_over_fallback() -> Result<(), ArchiveError> {
        let p = page(ROW_PAGE);
        let primary = Strategy::Primary.extract(&p)?;
        let fallback = Strategy::StructuralFallback.extract(&p)?;
        assert_eq!(fallback.len(), 3);
        let extraction = resolve(&p, &STRATEGY_ORDER)?;
        assert_eq!(extraction.strategy, Some(Strategy::Primary));
        assert_eq!(extraction.books, primary);
        assert!(extraction.books.iter().all(|b| b.hash != "cccc3333"));
        Ok(())
    }

    #[test]
    fn structural_fallback_reads_card_fields() -> Result<(), ArchiveError> {
        let extraction = extract_books(CARD_PAGE, base())?;
        assert_eq!(extraction.strategy, Some(Strategy::StructuralFallback));
        let books = extraction.books;
        assert_eq!(books.len(), 2);
        let first = &books[0];
        assert_eq!(first.title, "Foundation");
        assert_eq!(first.publisher, "Bantam Spectra, 1991");
        assert_eq!(first.authors, "Isaac Asimov");
        assert_eq!(first.language, "English [en]");
        assert_eq!(first.format, "epub");
        assert_eq!(first.size, "0.6MB");
        assert_eq!(first.hash, "3a4f1c2b9d8e7f6a5b4c3d2e1f0a9b8c");
        assert_eq!(books[1].hash, "9f8e7d6c5b4a39281706f5e4d3c2b1a0");
        assert_eq!(books[1].format, "pdf");
        Ok(())
    }

    #[test]
    fn fallback_result_equals_fallback_strategy_output() -> Result<(), ArchiveError> {
        let p = page(CARD_PAGE);
        assert!(Strategy::Primary.extract(&p)?.is_empty());
        let fallback = Strategy::StructuralFallback.extract(&p)?;
        assert_eq!(resolve(&p, &STRATEGY_ORDER)?.books, fallback);
        Ok(())
    }

    #[test]
    fn foundation_query_fixture_finds_hashed_titles() -> Result<(), ArchiveError> {
        let books = extract_books(CARD_PAGE, base())?.books;
        assert!(!books.is_empty());
        assert!(books
            .iter()
            .any(|b| !b.hash.is_empty() && b.title.to_lowercase().contains("foundation")));
        Ok(())
    }

    #[test]
    fn every_url_is_absolute() -> Result<(), ArchiveError> {
        for html in [CARD_PAGE, ROW_PAGE] {
            for book in extract_books(html, base())?.books {
                let parsed = Url::parse(&book.url).map_err(|e| ArchiveError::InvalidUrl {
                    input: book.url.clone(),
                    reason: e.to_string(),
                })?;
                assert_eq!(parsed.host_str(), Some("annas-archive.org"));
            }
        }
        Ok(())
    }

    #[test]
    fn duplicate_anchors_collapse_to_one_entry() -> Result<(), ArchiveError> {
        let html = r#"<div>
  <a href="/md5/dup1"><img src="c.jpg"/></a>
  <a href="/md5/dup1">Title link</a>
  <div class="relative top-[-1] pl-4 grow overflow-hidden"><h3>Dup</h3></div>
</div>"#;
        let books = Strategy::StructuralFallback.extract(&page(html))?;
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "Dup");
        Ok(())
    }

    #[test]
    fn empty_page_yields_empty_list() -> Result<(), ArchiveError> {
        let extraction = extract_books("<html><body><p>No results</p></body></html>", base())?;
        assert!(extraction.books.is_empty());
        assert_eq!(extraction.strategy, Some(Strategy::LegacyReduction));
        Ok(())
    }

    #[test]
    fn missing_metadata_node_keeps_other_entries() -> Result<(), ArchiveError> {
        let html = r#"<body>
<div class="js-vim-focus"><h3><a href="/md5/one">One</a></h3>
  <div class="text-sm text-gray-500">English [en], .epub, x, 1MB, Book</div></div>
<div class="js-vim-focus"><h3><a href="/md5/two">Two</a></h3></div>
<div class="js-vim-focus"><h3><a href="/md5/three">Three</a></h3>
  <div class="text-sm text-gray-500">English [en], .pdf, x, 3MB, Book</div></div>
</body>"#;
        let books = extract_books(html, base())?.books;
        assert!(books.len() >= 2);
        assert_eq!(books.len(), 3);
        assert_eq!(books[1].title, "Two");
        assert!(books[1].format.is_empty());
        assert_eq!(books[2].size, "3MB");
        Ok(())
    }

    #[test]
    fn row_without_detail_anchor_is_skipped() -> Result<(), ArchiveError> {
        let html = r#"<div class="js-vim-focus"><h3><a href="/search?q=x">Not a book</a></h3></div>
<div class="js-vim-focus"><h3><a href="/md5/ok">Book</a></h3></div>"#;
        let books = Strategy::Primary.extract(&page(html))?;
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].hash, "ok");
        Ok(())
    }

    #[test]
    fn legacy_reduction_keeps_title_and_hash_only() -> Result<(), ArchiveError> {
        let extraction = resolve(&page(ROW_PAGE), &[Strategy::LegacyReduction])?;
        assert_eq!(extraction.strategy, Some(Strategy::LegacyReduction));
        let books = extraction.books;
        assert_eq!(books.len(), 3);
        assert_eq!(books[0].title, "Foundation");
        assert_eq!(books[0].hash, "aaaa1111");
        assert!(books[0].language.is_empty());
        assert!(books[0].format.is_empty());
        assert!(books[0].size.is_empty());
        assert!(books[0].url.starts_with("https://annas-archive.org/md5/"));
        Ok(())
    }

    #[test]
    fn resolve_reports_no_strategy_when_all_are_empty() -> Result<(), ArchiveError> {
        let extraction = resolve(
            &page("<html><body>No files found.</body></html>"),
            &STRATEGY_ORDER,
        )?;
        assert_eq!(extraction.strategy, None);
        assert!(extraction.books.is_empty());
        Ok(())
    }

    #[test]
    fn resolve_with_no_strategies_is_empty() -> Result<(), ArchiveError> {
        let extraction = resolve(&page(ROW_PAGE), &[])?;
        assert_eq!(extraction.strategy, None);
        assert!(extraction.books.is_empty());
        Ok(())
    }
}
