use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use url::Url;

use assetsync_core::audit::audit_store;
use assetsync_core::catalog::Catalog;
use assetsync_core::config::SyncConfig;
use assetsync_core::fetch::{Fetcher, SharedTransport};
use assetsync_core::hash::ObjectHash;
use assetsync_core::manifest::Manifest;
use assetsync_core::populate::Populator;
use assetsync_core::reconcile::{ReconcileReport, Reconciler};
use assetsync_core::remote::{object_url, HttpTransport};
use assetsync_core::retry::CancelToken;
use assetsync_core::store::LocalStore;
use assetsync_core::version::{load_local, sync_version};

/// Exit status when the run finished but some entries stayed unresolved.
const EXIT_DEFICIENT: u8 = 2;

#[derive(Parser)]
#[command(name = "assetsync", version, about = "Materialise content-addressed game assets under their logical names")]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Args, Debug)]
struct Opts {
    /// JSON config file; flags override its values
    #[arg(long, env = "ASSETSYNC_CONFIG")]
    config: Option<PathBuf>,
    /// Local object store root (holds objects/ and indexes/)
    #[arg(long, env = "ASSETSYNC_LOCAL_ROOT")]
    local_root: Option<PathBuf>,
    /// Destination tree root
    #[arg(long, env = "ASSETSYNC_DEST")]
    dest: Option<PathBuf>,
    #[arg(long, env = "ASSETSYNC_REMOTE_BASE")]
    remote_base: Option<Url>,
    #[arg(long, env = "ASSETSYNC_CATALOG_URL")]
    catalog_url: Option<Url>,
    #[arg(long)]
    timeout_ms: Option<u64>,
    #[arg(long)]
    max_retries: Option<u32>,
    #[arg(long)]
    cooldown_ms: Option<u64>,
    #[arg(long)]
    max_backoff_ms: Option<u64>,
    /// Worker threads (1 = sequential)
    #[arg(long)]
    jobs: Option<usize>,
    /// Skip SHA-1 verification of cached and downloaded objects
    #[arg(long, default_value_t = false)]
    no_verify: bool,
    /// Directory for missing_assets.json
    #[arg(long)]
    report_dir: Option<PathBuf>,
    #[arg(long)]
    include: Vec<String>,
    #[arg(long)]
    exclude: Vec<String>,
    #[arg(long, default_value_t = false)]
    follow_symlinks: bool,
    /// Log progress every N seconds (0 = off)
    #[arg(long)]
    progress_secs: Option<u64>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Materialise a manifest into the destination tree
    Reconcile {
        #[command(flatten)]
        opts: Opts,
        /// Version (index id); also the label in the deficiency report
        game_version: String,
        /// Manifest file; defaults to <local-root>/indexes/<version>.json
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Seed the local object store from a remote manifest
    Populate {
        #[command(flatten)]
        opts: Opts,
        /// Version to resolve through the catalog (substring match)
        #[arg(required_unless_present = "manifest")]
        game_version: Option<String>,
        /// Manifest file instead of a catalog lookup
        #[arg(long, conflicts_with = "game_version")]
        manifest: Option<PathBuf>,
    },
    /// Reconcile a version, populating from the catalog if it is not installed
    Sync {
        #[command(flatten)]
        opts: Opts,
        game_version: String,
    },
    /// Re-hash every object in the local store
    Audit {
        #[command(flatten)]
        opts: Opts,
    },
    /// Print the local path and remote URL of an object
    Locate {
        #[command(flatten)]
        opts: Opts,
        hash: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli.cmd) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cmd: Cmd) -> Result<ExitCode> {
    match cmd {
        Cmd::Reconcile { opts, game_version, manifest } => reconcile(&opts, manifest.as_deref(), &game_version),
        Cmd::Populate { opts, game_version, manifest } => populate(&opts, manifest.as_deref(), game_version.as_deref()),
        Cmd::Sync { opts, game_version } => sync(&opts, &game_version),
        Cmd::Audit { opts } => audit(&opts),
        Cmd::Locate { opts, hash } => locate(&opts, &hash),
    }
}

fn build_config(opts: &Opts) -> Result<SyncConfig> {
    let mut cfg = match &opts.config {
        Some(p) => SyncConfig::load(p)?,
        None => SyncConfig::default(),
    };
    if let Some(v) = &opts.local_root {
        cfg.local_root = v.clone();
    }
    if let Some(v) = &opts.dest {
        cfg.dest_root = v.clone();
    }
    if let Some(v) = &opts.remote_base {
        cfg.remote_base = v.clone();
    }
    if let Some(v) = &opts.catalog_url {
        cfg.catalog_url = v.clone();
    }
    if let Some(v) = opts.timeout_ms {
        cfg.network_timeout = Duration::from_millis(v);
    }
    if let Some(v) = opts.max_retries {
        cfg.max_retries = v;
    }
    if let Some(v) = opts.cooldown_ms {
        cfg.retry_cooldown = Duration::from_millis(v);
    }
    if let Some(v) = opts.max_backoff_ms {
        cfg.max_backoff = Duration::from_millis(v);
    }
    if let Some(v) = opts.jobs {
        cfg.jobs = v.max(1);
    }
    if opts.no_verify {
        cfg.verify_hashes = false;
    }
    if let Some(v) = &opts.report_dir {
        cfg.report_dir = v.clone();
    }
    if !opts.include.is_empty() {
        cfg.include = opts.include.clone();
    }
    if !opts.exclude.is_empty() {
        cfg.exclude = opts.exclude.clone();
    }
    if opts.follow_symlinks {
        cfg.follow_symlinks = true;
    }
    if let Some(v) = opts.progress_secs {
        cfg.progress_interval = Duration::from_secs(v);
    }
    Ok(cfg)
}

fn transport(cfg: &SyncConfig) -> Result<SharedTransport> {
    Ok(Arc::new(HttpTransport::new(cfg.network_timeout).context("build HTTP client")?))
}

/// Ctrl-C flips the token; in-flight fetches stop at their next attempt boundary.
fn cancel_on_interrupt() -> CancelToken {
    let cancel = CancelToken::new();
    let c = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || c.cancel()) {
        tracing::warn!("cannot install interrupt handler: {e}");
    }
    cancel
}

fn print_report(rep: &ReconcileReport) -> ExitCode {
    println!(
        "placed={} existing={} fetched={} filtered={} unresolved={}",
        rep.placed,
        rep.existing,
        rep.fetched,
        rep.filtered,
        rep.deficiency.len()
    );
    match &rep.report_path {
        Some(p) => {
            println!("Deficiency report: {}", p.display());
            ExitCode::from(EXIT_DEFICIENT)
        }
        None => {
            println!("OK");
            ExitCode::SUCCESS
        }
    }
}

fn reconcile(opts: &Opts, manifest_path: Option<&Path>, version: &str) -> Result<ExitCode> {
    let cfg = build_config(opts)?;
    let store = LocalStore::new(&cfg.local_root);
    let (label, manifest) = match manifest_path {
        Some(p) => (version.to_owned(), Manifest::load(p)?),
        None => load_local(&store, version)?.ok_or_else(|| {
            let dir = store.root().join("indexes");
            anyhow!("no local asset index for {version:?} under {}", dir.display())
        })?,
    };
    let fetcher = Fetcher::from_config(&cfg, transport(&cfg)?).with_cancel(cancel_on_interrupt());
    let rep = Reconciler::new(&cfg, fetcher)?.run(&manifest, &label)?;
    Ok(print_report(&rep))
}

fn populate(opts: &Opts, manifest_path: Option<&Path>, version: Option<&str>) -> Result<ExitCode> {
    let cfg = build_config(opts)?;
    let transport = transport(&cfg)?;
    let manifest = match (manifest_path, version) {
        (Some(p), _) => Manifest::load(p)?,
        (None, Some(v)) => {
            let catalog = Catalog::new(cfg.catalog_url.clone(), transport.clone());
            let index = catalog.resolve(v)?;
            catalog.fetch_manifest(&index)?.0
        }
        (None, None) => bail!("either --manifest or a game version is required"),
    };
    let fetcher = Fetcher::from_config(&cfg, transport).with_cancel(cancel_on_interrupt());
    let rep = Populator::new(fetcher, cfg.jobs)
        .with_progress(cfg.progress_interval)
        .populate(&manifest)?;
    println!("fetched={} failed={}", rep.fetched, rep.failed.len());
    for h in &rep.failed {
        println!("  FAILED {h}");
    }
    Ok(ExitCode::SUCCESS)
}

fn sync(opts: &Opts, version: &str) -> Result<ExitCode> {
    let cfg = build_config(opts)?;
    let out = sync_version(&cfg, transport(&cfg)?, cancel_on_interrupt(), version)?;
    if let Some(p) = &out.populated {
        println!("Populated index {}: fetched={} failed={}", out.index_id, p.fetched, p.failed.len());
    }
    Ok(print_report(&out.report))
}

fn audit(opts: &Opts) -> Result<ExitCode> {
    let cfg = build_config(opts)?;
    let rep = audit_store(&LocalStore::new(&cfg.local_root))?;
    println!("Objects ok={}, corrupt={}, stray={}", rep.ok, rep.corrupt.len(), rep.stray.len());
    for p in &rep.corrupt {
        println!("  CORRUPT {}", p.display());
    }
    for p in &rep.stray {
        println!("  STRAY {}", p.display());
    }
    if rep.corrupt.is_empty() {
        println!("OK");
    } else {
        println!("BAD");
    }
    Ok(ExitCode::SUCCESS)
}

fn locate(opts: &Opts, hash: &str) -> Result<ExitCode> {
    let cfg = build_config(opts)?;
    let h = ObjectHash::parse(hash).with_context(|| format!("bad hash {hash:?}"))?;
    let store = LocalStore::new(&cfg.local_root);
    let path = store.locate(&h);
    println!("local  {}{}", path.display(), if path.is_file() { "" } else { " (absent)" });
    println!("remote {}", object_url(&cfg.remote_base, &h));
    Ok(ExitCode::SUCCESS)
}
