/// # sitesnap CLI Interface (Module)
///
/// This module implements the command-line surface of sitesnap: argument
/// parsing, layering of config file and flags, and wiring of the HTTP client
/// into the core pipeline.
///
/// All snapshot logic (scanning, resource identity, the remote session and
/// uploads) lives in the [`sitesnap-core`] crate. This module is CLI glue only.
///
/// ## Option layering
/// 1. [`SnapshotOptions`] defaults
/// 2. the `snapshot:` section of `--config <FILE>` (if given)
/// 3. explicit command-line flags
/// 4. repo fallback: `SITESNAP_REPO`, then the git `origin` remote
///
/// ## Exit status
/// [`run`] returns `Err` (exit 1) on any fatal error, when no root resources
/// are found, and on a partial failure when `--fail-on-partial` is set.
///
/// [`sitesnap-core`]: ../../sitesnap_core/
use crate::client::{ApiClient, ClientConfig, HttpFetcher};
use crate::load_config::load_config;
use crate::repo::resolve_repo;
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use sitesnap_core::config::SnapshotOptions;
use sitesnap_core::contract::ResourceFetcher;
use sitesnap_core::pool::ProgressSink;
use sitesnap_core::synchronise::{run_snapshot, SnapshotReport};
use std::path::PathBuf;

/// CLI for sitesnap: snapshot a folder of static files for visual review.
#[derive(Parser)]
#[clap(
    name = "sitesnap",
    version,
    about = "Snapshot a folder of static files for visual review"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Snapshot a folder of static files
    Snapshot(SnapshotArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct SnapshotArgs {
    /// Root folder of the static site
    pub root_dir: PathBuf,

    /// YAML config file with a `snapshot:` section
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Full repo slug (owner/repo-name). Defaults to SITESNAP_REPO or the git origin remote
    #[clap(long)]
    pub repo: Option<String>,

    /// Directory path to strip from generated URLs. Defaults to the root folder
    #[clap(long)]
    pub strip_prefix: Option<PathBuf>,

    /// Regular expression for the files to snapshot. Defaults to "\.(html|htm)$"
    #[clap(long)]
    pub snapshots_regex: Option<String>,

    /// Max number of snapshots to upload (at least 1)
    #[clap(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    pub snapshot_limit: Option<usize>,

    /// URL path prefix for every resource. Must start with '/'. Defaults to "/"
    #[clap(long)]
    pub baseurl: Option<String>,

    /// Concurrent uploads per pool. Defaults to 10, max 50
    #[clap(long)]
    pub threads: Option<usize>,

    /// Render snapshots with JavaScript enabled
    #[clap(long)]
    pub enable_javascript: bool,

    /// Comma-separated rendering widths
    #[clap(long, value_delimiter = ',')]
    pub widths: Vec<u32>,

    /// Treat every non-root file as a supporting resource
    #[clap(long)]
    pub include_all: bool,

    /// Fetch remote resources referenced from HTML and CSS
    #[clap(long)]
    pub autoload_remote_resources: bool,

    /// Exit non-zero if a service failure cut the run short
    #[clap(long)]
    pub fail_on_partial: bool,
}

impl SnapshotArgs {
    /// Overrides `options` with every flag given on the command line.
    pub fn apply(&self, options: &mut SnapshotOptions) {
        if let Some(repo) = &self.repo {
            options.repo = Some(repo.clone());
        }
        if let Some(strip_prefix) = &self.strip_prefix {
            options.strip_prefix = Some(strip_prefix.clone());
        }
        if let Some(regex) = &self.snapshots_regex {
            options.snapshots_regex = Some(regex.clone());
        }
        if let Some(limit) = self.snapshot_limit {
            options.snapshot_limit = Some(limit);
        }
        if let Some(baseurl) = &self.baseurl {
            options.baseurl = baseurl.clone();
        }
        if let Some(threads) = self.threads {
            options.threads = threads;
        }
        if !self.widths.is_empty() {
            options.widths = self.widths.clone();
        }
        options.enable_javascript |= self.enable_javascript;
        options.include_all |= self.include_all;
        options.autoload_remote_resources |= self.autoload_remote_resources;
        options.fail_on_partial |= self.fail_on_partial;
    }

    /// Config file (if any) with flags layered on top.
    pub fn resolve_options(&self) -> Result<SnapshotOptions> {
        let mut options = match &self.config {
            Some(path) => load_config(path)?.snapshot,
            None => SnapshotOptions::default(),
        };
        self.apply(&mut options);
        if options.snapshot_limit == Some(0) {
            bail!("snapshot_limit must be a positive integer");
        }
        options.repo = resolve_repo(options.repo.take(), &self.root_dir);
        Ok(options)
    }
}

/// Prints one line per dispatched snapshot.
struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn on_progress(&self, completed: usize, total: usize, label: &str) {
        tracing::debug!(completed, total, resource_url = label, "[UPLOAD] Progress");
    }

    fn on_snapshot(&self, index: usize, total: usize, url: &str) {
        println!("Uploading snapshot ({index}/{total}): {url}");
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Snapshot(args) => snapshot(args).await,
    }
}

async fn snapshot(args: SnapshotArgs) -> Result<()> {
    let options = args.resolve_options()?;
    tracing::info!(command = "snapshot", root_dir = ?args.root_dir, "Starting snapshot run");

    let client_config = ClientConfig::from_env()?;
    let client = ApiClient::new(&client_config)?;
    let fetcher = if options.autoload_remote_resources {
        Some(HttpFetcher::new(
            client_config.timeout,
            &client_config.user_agent,
        )?)
    } else {
        None
    };
    let fetcher = fetcher.as_ref().map(|f| f as &dyn ResourceFetcher);

    let report = run_snapshot(&args.root_dir, &options, &client, fetcher, &ConsoleProgress)
        .await
        .map_err(|e| {
            tracing::error!(command = "snapshot", error = %e, "Snapshot run failed");
            e
        })
        .context("Snapshot run failed")?;
    tracing::info!(command = "snapshot", ?report, "Snapshot run complete");

    print_summary(&report);
    if !report.is_success(options.fail_on_partial) {
        bail!(
            "snapshot run ended early after a service failure: {}",
            report.failures.join("; ")
        );
    }
    Ok(())
}

fn print_summary(report: &SnapshotReport) {
    if let Some(web_url) = &report.web_url {
        println!("Build: {web_url}");
    }
    if report.failed {
        eprintln!(
            "Snapshot run did not complete ({} failure(s)): {}",
            report.failures.len(),
            report.failures.join("; ")
        );
    } else {
        println!(
            "Done! {} snapshot(s), {} resource(s) uploaded.",
            report.snapshots.len(),
            report.resources_uploaded
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_values() {
        let mut options = SnapshotOptions {
            repo: Some("from/config".into()),
            baseurl: "/docs/".into(),
            threads: 20,
            widths: vec![1024],
            ..SnapshotOptions::default()
        };
        let args = SnapshotArgs {
            repo: Some("from/flag".into()),
            threads: Some(5),
            include_all: true,
            ..SnapshotArgs::default()
        };
        args.apply(&mut options);

        assert_eq!(options.repo.as_deref(), Some("from/flag"));
        assert_eq!(options.threads, 5);
        assert_eq!(options.baseurl, "/docs/");
        assert_eq!(options.widths, vec![1024]);
        assert!(options.include_all);
        assert!(!options.fail_on_partial);
    }

    #[test]
    fn parses_snapshot_flags() {
        let cli = Cli::parse_from([
            "sitesnap",
            "snapshot",
            "./site",
            "--widths",
            "375,1280",
            "--snapshot-limit",
            "3",
            "--baseurl",
            "/blog/",
            "--fail-on-partial",
        ]);
        let Commands::Snapshot(args) = cli.command;
        assert_eq!(args.root_dir, PathBuf::from("./site"));
        assert_eq!(args.widths, vec![375, 1280]);
        assert_eq!(args.snapshot_limit, Some(3));
        assert_eq!(args.baseurl.as_deref(), Some("/blog/"));
        assert!(args.fail_on_partial);
        assert!(!args.autoload_remote_resources);
    }

    #[test]
    fn zero_snapshot_limit_is_rejected() {
        assert!(
            Cli::try_parse_from(["sitesnap", "snapshot", "./site", "--snapshot-limit", "0"])
                .is_err()
        );
        assert!(
            Cli::try_parse_from(["sitesnap", "snapshot", "./site", "--snapshot-limit", "1"])
                .is_ok()
        );
    }

    #[test]
    fn zero_snapshot_limit_from_config_is_rejected() {
        let config = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(config.path(), "snapshot:\n  snapshot_limit: 0\n").unwrap();
        let args = SnapshotArgs {
            root_dir: PathBuf::from("."),
            config: Some(config.path().to_path_buf()),
            repo: Some("acme/site".into()),
            ..SnapshotArgs::default()
        };
        let err = args.resolve_options().unwrap_err();
        assert!(err.to_string().contains("positive integer"), "{err}");
    }

    #[test]
    fn root_dir_is_required() {
        assert!(Cli::try_parse_from(["sitesnap", "snapshot"]).is_err());
    }
}
