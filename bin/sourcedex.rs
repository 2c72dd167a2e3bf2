use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use sourcedex::api::{create_router, AppState};
use sourcedex::metrics::SourcedexMetrics;
use sourcedex::scheduler::{compact_fully, spawn_compactor};
use sourcedex::segment::TieredMergePolicy;
use sourcedex::{CancelToken, Catalog, CatalogConfig, IndexScheduler, IndexingProfile};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "sourcedex")]
#[command(about = "Source code indexing and cross-reference search", long_about = None)]
struct Cli {
    /// Catalog configuration (JSON)
    #[arg(long, env = "SOURCEDEX_CONFIG", default_value = "./sourcedex.json", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index projects once and exit
    Index(IndexArgs),
    /// Serve the HTTP API, indexing in the background
    Serve(ServeArgs),
    /// Merge every segment of each project into one
    Compact(ProjectArgs),
}

#[derive(Args)]
struct ProjectArgs {
    /// Projects or groups to act on; all projects when omitted
    #[arg(long = "project", value_delimiter = ',')]
    projects: Vec<String>,
}

#[derive(Args)]
struct IndexArgs {
    #[command(flatten)]
    projects: ProjectArgs,

    /// Indexing profile (interactive, balanced, bulk)
    #[arg(long, env = "SOURCEDEX_PROFILE")]
    profile: Option<String>,
}

#[derive(Args)]
struct ServeArgs {
    /// HTTP API port
    #[arg(long, env = "SOURCEDEX_HTTP_PORT", default_value = "8080")]
    http_port: u16,

    /// Seconds between re-index passes; 0 indexes only at startup
    #[arg(long, env = "SOURCEDEX_REINDEX_INTERVAL", default_value = "0")]
    reindex_interval_secs: u64,

    /// Skip the startup index pass
    #[arg(long)]
    no_initial_index: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    info!("Starting sourcedex v{}", sourcedex::VERSION);

    let mut config = CatalogConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let metrics = Arc::new(SourcedexMetrics::new()?);

    match cli.command {
        Command::Index(args) => {
            if let Some(profile) = &args.profile {
                let profile: IndexingProfile = profile.parse()?;
                config.settings = config.settings.clone().with_profile(profile);
            }
            let catalog = Arc::new(Catalog::open(&config)?);
            let cancel = CancelToken::new();
            let watcher = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Received interrupt, cancelling indexing");
                    watcher.cancel();
                }
            });
            let failed = tokio::task::spawn_blocking(move || {
                index_all(&catalog, &config, &metrics, &args.projects.projects, &cancel)
            })
            .await??;
            if failed > 0 {
                bail!("{} project(s) failed to index", failed);
            }
        }
        Command::Serve(args) => serve(config, metrics, args).await?,
        Command::Compact(args) => {
            let catalog = Catalog::open(&config)?;
            let policy = TieredMergePolicy::new(config.settings.merge.clone());
            for target in catalog.targets(&args.projects)? {
                let index = catalog.index(&target.project)?;
                match compact_fully(&index, &policy)? {
                    Some(segment) => info!(project = %target.project, segment = %segment, "compacted"),
                    None => info!(project = %target.project, "nothing to compact"),
                }
                index.collect_garbage();
            }
        }
    }
    Ok(())
}

/// Index the selected projects; returns how many failed
fn index_all(
    catalog: &Catalog,
    config: &CatalogConfig,
    metrics: &Arc<SourcedexMetrics>,
    selected: &[String],
    cancel: &CancelToken,
) -> Result<usize> {
    let scheduler = IndexScheduler::new(&config.settings).with_metrics(Arc::clone(metrics));
    let mut failed = 0;
    for target in catalog.targets(selected)? {
        let Some(project) = catalog.project(&target.project) else {
            continue;
        };
        let index = match catalog.index(&project.name) {
            Ok(index) => index,
            Err(e) => {
                error!(project = %project.name, error = %e, "skipping unavailable project");
                failed += 1;
                continue;
            }
        };
        match scheduler.index_project(&index, &project.source_root, cancel) {
            Ok(report) => {
                for warning in &report.warnings {
                    warn!(project = %project.name, path = %warning.path, "{}", warning.message);
                }
                println!("{}", serde_json::to_string(&report)?);
            }
            Err(e) if e.is_corruption() => {
                error!(project = %project.name, error = %e, "index corrupt, taking project offline");
                catalog.mark_failed(&project.name, e.to_string())?;
                failed += 1;
            }
            Err(e) => {
                error!(project = %project.name, error = %e, "indexing failed");
                failed += 1;
            }
        }
        if cancel.is_cancelled() {
            break;
        }
    }
    Ok(failed)
}

async fn serve(config: CatalogConfig, metrics: Arc<SourcedexMetrics>, args: ServeArgs) -> Result<()> {
    let catalog = Arc::new(Catalog::open(&config)?);
    info!(projects = catalog.project_names().count(), "Catalog loaded");

    let indexes: Vec<_> = catalog
        .project_names()
        .filter_map(|name| catalog.index(name).ok())
        .collect();
    let compactor = spawn_compactor(
        indexes,
        config.settings.merge.clone(),
        Duration::from_secs(config.settings.scheduler.compaction_interval_secs.max(1)),
        Some(Arc::clone(&metrics)),
    );

    let shutdown = CancelToken::new();
    if !args.no_initial_index || args.reindex_interval_secs > 0 {
        let catalog = Arc::clone(&catalog);
        let config = config.clone();
        let metrics = Arc::clone(&metrics);
        let cancel = shutdown.clone();
        let initial = !args.no_initial_index;
        let interval = args.reindex_interval_secs;
        tokio::spawn(async move {
            let mut first = true;
            loop {
                if !first || initial {
                    let (catalog, config, metrics, cancel) =
                        (Arc::clone(&catalog), config.clone(), Arc::clone(&metrics), cancel.clone());
                    let pass = tokio::task::spawn_blocking(move || {
                        index_all(&catalog, &config, &metrics, &[], &cancel)
                    })
                    .await;
                    match pass {
                        Ok(Ok(0)) => info!("Index pass complete"),
                        Ok(Ok(failed)) => warn!(failed, "Index pass finished with failures"),
                        Ok(Err(e)) => error!(error = %e, "Index pass failed"),
                        Err(e) => error!(error = %e, "Index task panicked"),
                    }
                }
                first = false;
                if interval == 0 || shutdown_requested(&cancel, interval).await {
                    break;
                }
            }
        });
    }

    let state = AppState::new(Arc::clone(&catalog), &config.settings, metrics);
    let app = create_router(state);
    let http_addr = format!("0.0.0.0:{}", args.http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    info!("HTTP API server listening on {}", http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Received shutdown signal, gracefully shutting down");
            shutdown.cancel();
        })
        .await?;

    compactor.stop();
    Ok(())
}

/// Sleep until the next pass; true when shutdown arrived meanwhile
async fn shutdown_requested(cancel: &CancelToken, interval_secs: u64) -> bool {
    for _ in 0..interval_secs {
        if cancel.is_cancelled() {
            return true;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    cancel.is_cancelled()
}
