use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use moussem_core::catalog::{candidates, Catalog};
use moussem_core::domain::EventStatus;

use moussem_engine::config::Config;
use moussem_engine::editorial::EditorialHandler;
use moussem_engine::observability::logging;
use moussem_engine::pipeline::scheduler::Scheduler;
use moussem_engine::pipeline::PipelineOrchestrator;
use moussem_engine::search::{
    HttpSearchClient, ProjectionSynchronizer, SearchClient,
};
use moussem_engine::sources::manual::{ManualImportPayload, ManualImporter};
use moussem_engine::sources::{AdapterRegistry, NormalizerContext};

#[derive(Parser)]
#[command(name = "moussem")]
#[command(about = "Ingestion and search projection pipeline for the Moussem events catalog")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one ingestion pass over the registered sources
    Ingest {
        /// Restrict to a single source by registry name
        #[arg(long)]
        source: Option<String>,
    },
    /// Resolve candidates waiting in the staging queue (manual imports)
    ProcessQueue,
    /// Validate and stage a manual import payload
    ImportFile {
        /// Path to the JSON payload
        path: String,
    },
    /// Create the search collection if it is missing
    EnsureSchema,
    /// Drop and rebuild the search collection from the catalog
    Rebuild,
    /// Re-project a single event into the search collection
    SyncEvent {
        event_id: i64,
    },
    /// List candidates waiting for an editorial decision
    ReviewQueue,
    /// Sweep unprocessed candidates older than the retention window
    Gc,
    /// Rewrite every live event's fingerprint set (after reference fixes)
    RecomputeFingerprints,
    /// Run the daily maintenance tasks once
    Maintenance,
    /// Run the long-lived schedule loop
    Schedule,
    /// Editorial commands (audited)
    Editorial {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        password: Option<String>,
        #[command(subcommand)]
        command: EditorialCommands,
    },
}

#[derive(Subcommand)]
enum EditorialCommands {
    /// Set or clear the verified flag
    Verify {
        event_id: i64,
        #[arg(long, default_value_t = true)]
        flag: bool,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Set or clear the pinned flag
    Pin {
        event_id: i64,
        #[arg(long, default_value_t = true)]
        flag: bool,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Set cultural significance (0-10)
    Significance {
        event_id: i64,
        score: u8,
    },
    /// Update lifecycle status
    Status {
        event_id: i64,
        status: String,
        #[arg(long)]
        source_url: Option<String>,
    },
    /// Merge the losing event into the kept one
    Merge {
        keep_id: i64,
        lose_id: i64,
    },
    /// Archive an event (terminal for visibility)
    Archive {
        event_id: i64,
        #[arg(long)]
        reason: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration")?;
    let _logging = logging::init(&config);

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let catalog = Arc::new(Catalog::open(&config.database_path).context("opening catalog")?);
    let registry = match AdapterRegistry::load_from_directory(&config.registry_dir, config.data_dir.clone())
    {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            warn!(error = %e, "no source registry loaded");
            Arc::new(AdapterRegistry::empty(config.data_dir.clone()))
        }
    };
    let search: Arc<dyn SearchClient> = Arc::new(
        HttpSearchClient::new(
            config.search.base_url(),
            config.search.api_key.clone(),
            config.search.connection_timeout,
        )
        .context("building search client")?,
    );
    let sync = Arc::new(ProjectionSynchronizer::new(catalog.clone(), search));
    let fetch_concurrency = config
        .fetch_concurrency
        .unwrap_or_else(|| registry.enabled_specs().len().max(1));
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        catalog.clone(),
        registry.clone(),
        sync.clone(),
        fetch_concurrency,
        config.data_dir.clone(),
    ));

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing current work");
            signal_cancel.cancel();
        }
    });

    match cli.command {
        Commands::Ingest { source } => {
            sync.ensure_schema().await?;
            let report = orchestrator.run_ingestion(&cancel, source.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.has_errors() {
                warn!("ingestion finished with per-source errors");
            }
        }
        Commands::ProcessQueue => {
            let report = orchestrator.process_pending_candidates(&cancel).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::ImportFile { path } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {path}"))?;
            let payload: ManualImportPayload =
                serde_json::from_str(&content).context("parsing import payload")?;
            let context = Arc::new(NormalizerContext::load(&catalog)?);
            let importer = ManualImporter::new(catalog.clone(), context);
            let summary = importer.import(&payload)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::EnsureSchema => {
            sync.ensure_schema().await?;
            println!("search schema ensured");
        }
        Commands::Rebuild => {
            let outcome = sync.full_rebuild(&cancel).await?;
            println!("indexed: {}, errors: {}", outcome.indexed, outcome.errors);
        }
        Commands::SyncEvent { event_id } => {
            sync.upsert_event(event_id).await?;
            println!("event {event_id} projected");
        }
        Commands::ReviewQueue => {
            let pending = catalog.with_conn(candidates::list_review_pending)?;
            println!("{}", serde_json::to_string_pretty(&pending)?);
        }
        Commands::Gc => {
            let removed = orchestrator.garbage_collect_candidates()?;
            println!("removed {removed} stale candidates");
        }
        Commands::RecomputeFingerprints => {
            let rewritten = orchestrator.recompute_fingerprints()?;
            println!("rewrote fingerprints for {rewritten} events");
        }
        Commands::Maintenance => {
            orchestrator.run_daily_maintenance(&cancel).await?;
            println!("maintenance done");
        }
        Commands::Schedule => {
            sync.ensure_schema().await?;
            let scheduler = Scheduler::new(orchestrator, sync.clone());
            scheduler.run(cancel).await;
        }
        Commands::Editorial {
            actor,
            password,
            command,
        } => {
            if !config.admin.verify_password(password.as_deref().unwrap_or("")) {
                anyhow::bail!("editorial password rejected");
            }
            let handler =
                EditorialHandler::new(catalog.clone(), sync.clone(), config.admin.allowlist.clone());
            run_editorial(&handler, &actor, command).await?;
        }
    }
    Ok(())
}

async fn run_editorial(
    handler: &EditorialHandler,
    actor: &str,
    command: EditorialCommands,
) -> anyhow::Result<()> {
    match command {
        EditorialCommands::Verify {
            event_id,
            flag,
            notes,
        } => {
            handler.verify(event_id, flag, actor, notes).await?;
            println!("event {event_id} verified={flag}");
        }
        EditorialCommands::Pin {
            event_id,
            flag,
            reason,
        } => {
            handler.pin(event_id, flag, actor, reason).await?;
            println!("event {event_id} pinned={flag}");
        }
        EditorialCommands::Significance { event_id, score } => {
            handler.set_significance(event_id, score, actor).await?;
            println!("event {event_id} significance={score}");
        }
        EditorialCommands::Status {
            event_id,
            status,
            source_url,
        } => {
            let status: EventStatus = status.parse()?;
            handler
                .update_status(event_id, status, actor, source_url)
                .await?;
            println!("event {event_id} status={}", status.as_str());
        }
        EditorialCommands::Merge { keep_id, lose_id } => {
            handler.merge(keep_id, lose_id, actor).await?;
            println!("event {lose_id} merged into {keep_id}");
        }
        EditorialCommands::Archive { event_id, reason } => {
            handler.archive(event_id, actor, reason).await?;
            println!("event {event_id} archived");
        }
    }
    Ok(())
}
