//! revocation-archive command-line entry point.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use revocation_archive::{PageSource, Pipeline};
use revocation_archive_cli::config::{AGENTS_ENV, NAMES_ENV, OUTDIR_ENV};
use revocation_archive_cli::{
    load_archive_config, load_identities, load_roster, logging, resolve_path, write_tables,
};

#[derive(Parser)]
#[command(
    name = "revocation-archive",
    about = "Fetch the revocations page, archive every linked record, and reconcile against the roster",
    version
)]
struct Cli {
    /// Page listing the records.
    #[arg(long, required_unless_present = "html_file", conflicts_with = "html_file")]
    url: Option<String>,

    /// Read already rendered page HTML from disk instead of fetching.
    #[arg(long)]
    html_file: Option<PathBuf>,

    /// Prefix joined with each record link to form its download URL.
    #[arg(long)]
    domain: String,

    /// YAML list of client identities. Falls back to REVOCATION_AGENTS.
    #[arg(long)]
    agents: Option<PathBuf>,

    /// YAML roster of expected cases. Falls back to REVOCATION_NAMES.
    #[arg(long)]
    names: Option<PathBuf>,

    /// Archive directory for downloaded files. Falls back to REVOCATION_OUTDIR.
    #[arg(long)]
    outdir: Option<PathBuf>,

    /// Output CSV for the per-record table.
    #[arg(long)]
    ref_out: PathBuf,

    /// Output CSV for the reconciled table.
    #[arg(long)]
    rev_out: PathBuf,

    /// YAML overrides for archive settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Concurrent downloads (overrides the config file).
    #[arg(long)]
    concurrency: Option<usize>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also append log events to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print a JSON run summary to stdout.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    logging::init(&cli.log_level, cli.log_file.as_deref())?;

    let agents = resolve_path(cli.agents.as_deref(), AGENTS_ENV).context("--agents")?;
    let names = resolve_path(cli.names.as_deref(), NAMES_ENV).context("--names")?;
    let outdir = resolve_path(cli.outdir.as_deref(), OUTDIR_ENV).context("--outdir")?;

    let mut config = load_archive_config(cli.config.as_deref())?;
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }

    let identities = load_identities(&agents)?;
    let roster = load_roster(&names)?;
    tracing::info!(
        "{} identities, {} roster entries, archiving into {}",
        identities.len(),
        roster.len(),
        outdir.display()
    );

    let source = match (cli.url, cli.html_file) {
        (_, Some(path)) => PageSource::Html(
            std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?,
        ),
        (Some(url), None) => PageSource::Url(url),
        (None, None) => anyhow::bail!("either --url or --html-file is required"),
    };

    let pipeline = Pipeline::new(config, identities, cli.domain, outdir)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            on_signal.cancel();
        }
    });

    let run = pipeline.run(source, &roster, &cancel).await?;
    write_tables(&cli.ref_out, &cli.rev_out, &run.descriptors, &run.reconciled)?;

    if cli.json {
        let summary = serde_json::json!({
            "title": run.title,
            "summary": run.summary,
            "ref_out": cli.ref_out.display().to_string(),
            "rev_out": cli.rev_out.display().to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    tracing::info!("done.");
    Ok(())
}
