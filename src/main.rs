//! CLI entry point for coursefetch.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use coursefetch_core::session::DASHBOARD_PATH;
use coursefetch_core::{
    Credentials, HtmlExtractor, RateLimiter, RunReport, Session, crawl, decode_manifest,
    encode_manifest, execute, plan,
};
use tracing::{debug, info};

mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Logs go to stderr: crawl writes the manifest to stdout.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let credentials = credentials_from(&args)?;
    let limiter = Arc::new(RateLimiter::new(args.rate));

    match args.command {
        Command::Crawl { library } => {
            let redirect_target = format!("/library/{library}");
            let session = Session::login(&credentials, Arc::clone(&limiter), &redirect_target)
                .await
                .context("login failed")?;

            let manifest = crawl(&library, &session, &HtmlExtractor::new())
                .await
                .context("crawl failed")?;

            println!("{}", encode_manifest(&manifest)?);
            info!(tracks = manifest.len(), "manifest written");
        }
        Command::Download {
            manifest,
            destination,
            concurrency,
        } => {
            let text = std::fs::read_to_string(&manifest)
                .with_context(|| format!("cannot read manifest {}", manifest.display()))?;
            let tracks = decode_manifest(&text)
                .with_context(|| format!("malformed manifest {}", manifest.display()))?;

            // Login against the dashboard purely to establish cookies;
            // the response body is discarded.
            let session = Session::login(&credentials, limiter, DASHBOARD_PATH)
                .await
                .context("login failed")?;

            let tasks = plan(&tracks, &destination);
            info!(
                tracks = tracks.len(),
                tasks = tasks.len(),
                destination = %destination.display(),
                "download plan ready"
            );

            let outcomes = execute(&session, &tasks, usize::from(concurrency)).await;
            let report = RunReport::from_outcomes(&outcomes);
            info!("{report}");

            if report.exit_code() != 0 {
                std::process::exit(report.exit_code());
            }
        }
    }

    Ok(())
}

/// Assembles credentials from flags/environment, failing before any
/// network work when one is missing.
fn credentials_from(args: &Args) -> Result<Credentials> {
    let Some(username) = args.username.as_deref() else {
        bail!("missing username: pass --username or set COURSEFETCH_USERNAME");
    };
    let Some(password) = args.password.as_deref() else {
        bail!("missing password: pass --password or set COURSEFETCH_PASSWORD");
    };
    let Some(host) = args.host.as_deref() else {
        bail!("missing host: pass --host or set COURSEFETCH_HOST");
    };
    Ok(Credentials::new(username, password, host))
}
