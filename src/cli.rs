//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use coursefetch_core::{DEFAULT_CONCURRENCY, DEFAULT_RATE_PER_SEC};

/// Crawl an authenticated course library into a manifest and download its
/// media.
///
/// `crawl` walks the library catalog and writes a JSON manifest to stdout;
/// `download` reads a manifest back and fetches every file it references.
/// The manifest is the only state shared between the two phases, so it
/// can be inspected or edited before downloading.
#[derive(Parser, Debug)]
#[command(name = "coursefetch")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Site username
    #[arg(long, env = "COURSEFETCH_USERNAME", global = true)]
    pub username: Option<String>,

    /// Site password
    #[arg(long, env = "COURSEFETCH_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// Site hostname or origin (e.g. courses.example.com)
    #[arg(long, env = "COURSEFETCH_HOST", global = true)]
    pub host: Option<String>,

    /// Request rate in requests per second (1-100)
    #[arg(long, default_value_t = DEFAULT_RATE_PER_SEC, value_parser = clap::value_parser!(u32).range(1..=100), global = true)]
    pub rate: u32,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Crawl a library's catalog and write the manifest to stdout
    Crawl {
        /// Library identifier to crawl
        library: String,
    },

    /// Download every file a manifest references
    Download {
        /// Path to a manifest produced by `crawl`
        manifest: PathBuf,

        /// Directory to download into
        destination: PathBuf,

        /// Maximum concurrent downloads (1-100)
        #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=100))]
        concurrency: u8,
    },
}
