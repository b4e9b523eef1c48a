//! CLI parsing and orchestration. Parses args, runs search or search -> download. Maps errors to exit codes.

use crate::archive::{
    Archive, ArchiveError, DownloadOptions, IpFamily, Transport, ANNAS_BASE_URL,
};
use crate::config::{self, Config};
use crate::formats::{render_books, write_books, FormatError, OutputFormat};
use crate::model::Book;
use clap::{ArgAction, Parser, Subcommand};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Archive(#[from] ArchiveError),

    #[error("{0}")]
    Format(#[from] FormatError),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_)
            | CliRunError::Archive(ArchiveError::EmptyQuery)
            | CliRunError::Archive(ArchiveError::InvalidUrl { .. }) => 1,
            CliRunError::Archive(_) => 2,
            CliRunError::Format(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "annadl")]
#[command(about = "Search Anna's Archive and download books with a fast-download key")]
#[command(
    after_help = "Config file keys (secret_key, download_dir, base_url, user_agent, timeout_secs, connect_timeout_secs, prefer_ipv6) are read from ./annadl.toml or the user config dir. ANNAS_SECRET_KEY, ANNAS_DOWNLOAD_PATH and ANNAS_BASE_URL override the file. CLI flags override both."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// More log output (-v info, -vv debug, -vvv trace) and the full error chain.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Errors only.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Archive origin (overrides config; default https://annas-archive.org).
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// HTTP User-Agent (overrides config).
    #[arg(long, global = true)]
    pub user_agent: Option<String>,

    /// Request timeout in seconds (overrides config; default 60).
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Connect timeout in seconds (overrides config; default 30).
    #[arg(long, global = true)]
    pub connect_timeout: Option<u64>,

    /// Try IPv6 before IPv4 when connecting.
    #[arg(long, global = true)]
    pub ipv6: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search the archive and print the results.
    Search {
        /// Search terms.
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Output format: text or json.
        #[arg(long, default_value = "text", value_parser = parse_format)]
        output_format: OutputFormat,

        /// Show at most this many results.
        #[arg(long)]
        limit: Option<usize>,

        /// Also write the results to this file.
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Search, pick one result, and download it. With --hash and no search
    /// terms the file is fetched directly, without searching.
    Download {
        /// Search terms (optional with --hash).
        #[arg(num_args = 0.., required_unless_present = "hash")]
        query: Vec<String>,

        /// 1-based position of the result to download (default 1).
        #[arg(long, value_parser = parse_pick, conflicts_with = "hash")]
        pick: Option<usize>,

        /// Download the result with this content hash.
        #[arg(long)]
        hash: Option<String>,

        /// File name stem for a direct hash download (default: the hash).
        #[arg(long, requires = "hash")]
        title: Option<String>,

        /// File extension for a direct hash download, e.g. epub or pdf.
        #[arg(long, requires = "hash")]
        format: Option<String>,

        /// Destination folder (overrides config; default current directory).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fast-download key (overrides config and ANNAS_SECRET_KEY).
        #[arg(long)]
        secret_key: Option<String>,
    },
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    match s.to_lowercase().as_str() {
        "text" | "txt" => Ok(OutputFormat::Text),
        "json" => Ok(OutputFormat::Json),
        _ => Err(format!(
            "Invalid --output-format value: '{}'. Use text or json.",
            s
        )),
    }
}

fn parse_pick(s: &str) -> Result<usize, String> {
    let n: usize = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid --pick: '{}' is not a number", s))?;
    if n == 0 {
        return Err("Invalid --pick: positions start at 1".to_string());
    }
    Ok(n)
}

/// Default tracing filter for the given flags. RUST_LOG takes precedence in main.
pub fn log_level(quiet: bool, verbose: u8) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Ensure the download folder exists and is a directory.
fn validate_download_dir(path: &Path) -> Result<(), CliRunError> {
    if !path.is_dir() {
        return Err(CliRunError::InvalidInput(format!(
            "Cannot download into {}: not an existing directory.",
            path.display()
        )));
    }
    Ok(())
}

/// Entry `pick` (1-based) of `books`.
fn select_book(books: Vec<Book>, pick: usize) -> Result<Book, CliRunError> {
    let count = books.len();
    books.into_iter().nth(pick - 1).ok_or_else(|| {
        CliRunError::InvalidInput(if count == 0 {
            "No books found.".to_string()
        } else {
            format!(
                "Result {} out of range: the search returned {} book(s).",
                pick, count
            )
        })
    })
}

fn build_archive(args: &Args, config: &Config) -> Result<Archive, CliRunError> {
    let timeout_secs = args.timeout.or(config.timeout_secs);
    let connect_timeout_secs = args.connect_timeout.or(config.connect_timeout_secs);
    let family = if args.ipv6 || config.prefer_ipv6.unwrap_or(false) {
        IpFamily::V6
    } else {
        IpFamily::V4
    };
    let user_agent = args
        .user_agent
        .clone()
        .or_else(|| config.user_agent.clone());

    let mut builder = Transport::builder().preferred_family(family);
    if let Some(secs) = timeout_secs {
        builder = builder.timeout_secs(secs);
    }
    if let Some(secs) = connect_timeout_secs {
        builder = builder.connect_timeout_secs(secs);
    }
    if let Some(ua) = user_agent {
        builder = builder.user_agent(ua);
    }
    let transport = builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

    let base_url = args
        .base_url
        .clone()
        .or_else(|| config.base_url.clone())
        .unwrap_or_else(|| ANNAS_BASE_URL.to_string());
    Ok(Archive::with_base_url(transport, &base_url)?)
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let config = config::load_effective_config().map_err(CliRunError::InvalidInput)?;
    let archive = build_archive(args, &config)?;

    match &args.command {
        Command::Search {
            query,
            output_format,
            limit,
            save,
        } => {
            let query = query.join(" ");
            let mut books = archive.find_book(&query)?;
            if let Some(n) = limit {
                books.truncate(*n);
            }
            if let Some(path) = save {
                write_books(&books, *output_format, path)?;
                debug!(path = %path.display(), "Saved search results");
            }
            if books.is_empty() {
                if !args.quiet {
                    eprintln!("No books found.");
                }
                return Ok(());
            }
            println!("{}", render_books(&books, *output_format)?);
        }
        Command::Download {
            query,
            pick,
            hash,
            title,
            format,
            output,
            secret_key,
        } => {
            let secret_key = secret_key
                .clone()
                .or_else(|| config.secret_key.clone())
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| {
                    CliRunError::InvalidInput(format!(
                        "No secret key. Pass --secret-key, set {}, or add secret_key to the config file.",
                        config::ENV_SECRET_KEY
                    ))
                })?;
            let folder: PathBuf = output
                .clone()
                .or_else(|| config.download_dir.clone())
                .unwrap_or_else(|| PathBuf::from("."));
            validate_download_dir(&folder)?;

            let query = query.join(" ");
            let book = match hash {
                Some(h) if query.trim().is_empty() => {
                    let format = format.as_deref().ok_or_else(|| {
                        CliRunError::InvalidInput(
                            "--format is required to download by hash without search terms."
                                .to_string(),
                        )
                    })?;
                    archive.book_for_hash(h, title.as_deref().unwrap_or(""), format)?
                }
                Some(h) => archive.find_book_by_hash(&query, h)?,
                None => select_book(archive.find_book(&query)?, pick.unwrap_or(1))?,
            };
            if !args.quiet {
                eprintln!("Downloading: {} ({})", book.title, book.hash);
            }

            let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
            let progress_cb = |written: u64, total: Option<u64>| {
                let mut state = progress_state.borrow_mut();
                let pb = state.get_or_insert_with(|| new_progress_bar(total));
                pb.set_position(written);
            };
            let progress: Option<&dyn Fn(u64, Option<u64>)> =
                if args.quiet { None } else { Some(&progress_cb) };
            let options = DownloadOptions { progress };
            let result = archive.download(&book, &secret_key, &folder, &options);

            if let Some(pb) = progress_state.borrow_mut().take() {
                pb.disable_steady_tick();
                pb.finish_and_clear();
            }
            let downloaded = result?;

            if !args.quiet {
                eprintln!("Wrote {}", downloaded.path.display());
                if let Some(left) = downloaded.downloads_left {
                    eprintln!("Fast downloads left: {}", left);
                }
            }
        }
    }
    Ok(())
}

fn new_progress_bar(total: Option<u64>) -> indicatif::ProgressBar {
    let (bar, template) = match total {
        Some(len) => (
            indicatif::ProgressBar::new(len),
            "{spinner} [{bar:40}] {bytes}/{total_bytes} ({elapsed})",
        ),
        None => (
            indicatif::ProgressBar::new_spinner(),
            "{spinner} {bytes} ({elapsed})",
        ),
    };
    let style = indicatif::ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .progress_chars("█▉▊▋▌▍▎▏ ");
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}
