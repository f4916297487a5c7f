mod export;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{TimeDelta, Utc};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use jobsift_client::{ReqwestSender, SourcesFile, default_identities};
use jobsift_core::models::{EmploymentType, PipelineOutput};
use jobsift_core::pipeline::prune_store;
use jobsift_core::registry::SourceRegistry;
use jobsift_core::traits::{Fetcher, JobStore};
use jobsift_core::{
    EscalationController, JsonFileStore, Pipeline, PipelineConfig, RecencyFilter,
    ResilientFetcher, RunRequest, SearchQuery, TracingPipelineReporter,
};
use jobsift_db::{Database, DatabaseConfig, PgJobStore};

#[derive(Parser)]
#[command(
    name = "jobsift",
    version,
    about = "Resilient job-posting ingestion and deduplication"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every enabled source, merge into the corpus and emit the filtered jobs
    Run(RunArgs),

    /// Remove corpus entries older than the retention horizon
    Prune {
        #[command(flatten)]
        store: StoreArgs,

        /// Retention horizon in days (defaults to JOBSIFT_RETENTION_DAYS or 30)
        #[arg(long)]
        retention_days: Option<u32>,
    },

    /// List the sources and strategies a definitions file declares
    Sources {
        /// Path to the source definitions file
        #[arg(short, long, env = "JOBSIFT_SOURCES")]
        sources: PathBuf,
    },
}

#[derive(Args)]
struct StoreArgs {
    /// JSON file holding the merged corpus
    #[arg(long, default_value = "corpus.json", conflicts_with = "db")]
    corpus: PathBuf,

    /// Use the PostgreSQL corpus instead (requires DATABASE_URL)
    #[arg(long, default_value_t = false)]
    db: bool,
}

#[derive(Args)]
struct RunArgs {
    /// Path to the source definitions file
    #[arg(short, long, env = "JOBSIFT_SOURCES")]
    sources: PathBuf,

    /// Search keywords
    #[arg(short, long, required = true, num_args = 1..)]
    keywords: Vec<String>,

    /// Location filter passed to the sources
    #[arg(short, long)]
    location: Option<String>,

    /// Only emit jobs posted within this window (any, hour, day, week, month)
    #[arg(long, default_value = "any")]
    recency: RecencyFilter,

    /// Only emit jobs of this type (full-time, part-time, contract, internship, seasonal)
    #[arg(long)]
    employment_type: Option<EmploymentType>,

    #[command(flatten)]
    store: StoreArgs,

    /// Write the run output here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also export the emitted jobs as CSV
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Keep escalating after a strategy succeeds and merge every result
    #[arg(long, default_value_t = false)]
    exhaustive: bool,

    /// Sources processed at once (defaults to JOBSIFT_CONCURRENCY or 4)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Proxy URL to rotate through; repeatable (overrides JOBSIFT_PROXIES)
    #[arg(long = "proxy")]
    proxies: Vec<String>,

    /// Never launch a headless browser
    #[arg(long, default_value_t = false)]
    no_browser: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("jobsift=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Prune {
            store,
            retention_days,
        } => cmd_prune(&store, retention_days).await,
        Commands::Sources { sources } => cmd_sources(&sources).await,
    }
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let mut config = PipelineConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    if let Some(concurrency) = args.concurrency {
        config = config.with_max_concurrency(concurrency);
    }

    let mut fetch = config.fetch.clone().with_identities(default_identities());
    if !args.proxies.is_empty() {
        fetch = fetch.with_proxies(args.proxies.clone());
    }

    let registry = load_registry(&args.sources).await?;
    if registry.is_empty() {
        anyhow::bail!("No enabled sources in {}", args.sources.display());
    }

    let sender = ReqwestSender::with_proxies(&fetch.proxies).context("Failed to build HTTP client")?;
    tracing::info!(
        sources = registry.len(),
        proxies = fetch.proxies.len(),
        identities = fetch.identities.len(),
        "Starting run"
    );
    let fetcher = ResilientFetcher::new(sender, fetch);

    #[cfg(feature = "browser")]
    let renderer = if args.no_browser {
        None
    } else {
        let detected = jobsift_client::BrowserRenderer::detect(config.browser_timeout);
        if detected.is_none() {
            tracing::warn!("No Chrome/Chromium binary found; rendered-browser strategy disabled");
        }
        detected
    };
    #[cfg(not(feature = "browser"))]
    let renderer = {
        if !args.no_browser {
            tracing::debug!("Built without the browser feature; rendered-browser strategy disabled");
        }
        None::<jobsift_core::traits::NoRenderer>
    };

    let controller = EscalationController::new(fetcher).with_renderer(renderer);

    let mut query = SearchQuery::new(args.keywords);
    if let Some(location) = args.location {
        query = query.with_location(location);
    }
    let request = RunRequest::new(query)
        .with_recency(args.recency)
        .with_employment_type(args.employment_type)
        .exhaustive(args.exhaustive);

    let cancel = cancel_on_ctrl_c();
    let output = if args.store.db {
        let store = open_database().await?;
        execute(controller, registry, store, &request, config.max_concurrency, &cancel).await?
    } else {
        let store = open_corpus(&args.store.corpus).await?;
        execute(controller, registry, store, &request, config.max_concurrency, &cancel).await?
    };

    export::write_output(&output, args.output.as_deref()).await?;
    if let Some(path) = &args.csv {
        export::write_csv(&output.jobs, path)?;
    }

    Ok(())
}

async fn execute<F, R, S>(
    controller: EscalationController<F, R>,
    registry: SourceRegistry,
    store: S,
    request: &RunRequest,
    max_concurrency: usize,
    cancel: &CancellationToken,
) -> Result<PipelineOutput>
where
    F: Fetcher,
    R: Fetcher,
    S: JobStore,
{
    let pipeline = Pipeline::new(controller, registry, store).with_max_concurrency(max_concurrency);
    pipeline.run(request, cancel).await.context("Run failed")
}

async fn cmd_prune(store: &StoreArgs, retention_days: Option<u32>) -> Result<()> {
    let mut config = PipelineConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    if let Some(days) = retention_days {
        config = config.with_retention_days(days);
    }
    let retention = config.retention();

    let removed = if store.db {
        prune_with(&open_database().await?, retention).await?
    } else {
        prune_with(&open_corpus(&store.corpus).await?, retention).await?
    };

    println!("Removed {removed} entries older than {} days", retention.num_days());
    Ok(())
}

async fn prune_with<S: JobStore>(store: &S, retention: TimeDelta) -> Result<usize> {
    let removed = prune_store(store, retention, Utc::now(), &TracingPipelineReporter)
        .await
        .context("Prune failed")?;
    let remaining = store.len().await.map_err(|e| anyhow::anyhow!(e))?;
    tracing::info!(remaining, "Corpus size after prune");
    Ok(removed)
}

async fn cmd_sources(path: &Path) -> Result<()> {
    let registry = load_registry(path).await?;

    if registry.is_empty() {
        println!("No enabled sources in {}", path.display());
        return Ok(());
    }

    for source in registry.iter() {
        println!("{}", source.name);
        for strategy in source.strategies() {
            let template = source
                .plan(strategy)
                .map(|plan| plan.url_template.as_str())
                .unwrap_or_default();
            println!("  {strategy:<17} {template}");
        }
    }
    println!("\nTotal: {} sources", registry.len());

    Ok(())
}

async fn load_registry(path: &Path) -> Result<SourceRegistry> {
    SourcesFile::load(path)
        .await
        .and_then(SourcesFile::into_registry)
        .with_context(|| format!("Failed to load sources from {}", path.display()))
}

async fn open_corpus(path: &Path) -> Result<JsonFileStore> {
    JsonFileStore::open(path)
        .await
        .with_context(|| format!("Failed to open corpus {}", path.display()))
}

async fn open_database() -> Result<PgJobStore> {
    let config = DatabaseConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let db = Database::connect(&config)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    db.migrate().await.map_err(|e| anyhow::anyhow!(e))?;
    Ok(db.job_store())
}

/// A token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling in-flight sources");
            token.cancel();
        }
    });
    cancel
}
