//! Pipeline orchestrator: drives full ingestion runs, the pending-candidate
//! queue, and scheduled maintenance.
//!
//! Sources fetch in bounded-parallel fashion; candidates within one source
//! process strictly in fetch order so the merge decision is deterministic
//! under the fingerprint view it reads. Each candidate's resolve + apply +
//! fingerprint + confidence cycle commits in a single catalog transaction;
//! the projection upsert runs post-commit and parks itself for retry on
//! failure.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use moussem_core::catalog::{candidates, events, sources as source_rows, Catalog};
use moussem_core::domain::{Candidate, CandidateOutcome, EventStatus};

use super::report::{IngestionReport, SourceReport};
use super::retry;
use crate::common::error::{PipelineError, Result};
use crate::confidence::ConfidenceScorer;
use crate::merge::{ApplyOutcome, MergeWriter};
use crate::observability::metrics;
use crate::resolver::{ResolutionAction, Resolver};
use crate::search::ProjectionSynchronizer;
use crate::sources::{AdapterRegistry, NormalizerContext, SourceAdapter};

/// Unprocessed candidates older than this are swept by the weekly GC.
pub const CANDIDATE_RETENTION_DAYS: i64 = 30;

/// Events not verified for this long get their confidence refreshed daily.
pub const STALE_CONFIDENCE_DAYS: i64 = 30;

pub struct PipelineOrchestrator {
    catalog: Arc<Catalog>,
    registry: Arc<AdapterRegistry>,
    sync: Arc<ProjectionSynchronizer>,
    fetch_concurrency: usize,
    data_dir: PathBuf,
}

impl PipelineOrchestrator {
    pub fn new(
        catalog: Arc<Catalog>,
        registry: Arc<AdapterRegistry>,
        sync: Arc<ProjectionSynchronizer>,
        fetch_concurrency: usize,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            catalog,
            registry,
            sync,
            fetch_concurrency: fetch_concurrency.max(1),
            data_dir,
        }
    }

    /// One full ingestion run over every enabled polled source (optionally
    /// narrowed to a single source by name).
    pub async fn run_ingestion(
        &self,
        cancel: &CancellationToken,
        only_source: Option<&str>,
    ) -> Result<IngestionReport> {
        let mut report = IngestionReport::new();
        info!(run_id = %report.run_id, "starting ingestion run");

        // Reference matchers are rebuilt per run: the pipeline always reads
        // fresh reference rows, caching belongs to the query layer.
        let context = Arc::new(NormalizerContext::load(&self.catalog)?);
        let source_ids = self.registry.sync_catalog(&self.catalog)?;

        let specs: Vec<_> = self
            .registry
            .enabled_specs()
            .into_iter()
            .filter(|spec| spec.source_type != moussem_core::domain::SourceType::Manual)
            .filter(|spec| only_source.map_or(true, |name| spec.name == name))
            .cloned()
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.fetch_concurrency));
        let mut handles = Vec::with_capacity(specs.len());
        for spec in specs {
            let Some(&source_id) = source_ids.get(&spec.name) else {
                continue;
            };
            let semaphore = semaphore.clone();
            let catalog = self.catalog.clone();
            let registry = self.registry.clone();
            let sync = self.sync.clone();
            let context = context.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                ingest_source(catalog, registry, sync, context, spec, source_id, cancel).await
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(source_report) => report.sources.push(source_report),
                Err(e) => {
                    error!(error = %e, "source task panicked");
                    let mut failed = SourceReport::new("unknown");
                    failed.errors.push(format!("task failure: {e}"));
                    report.sources.push(failed);
                }
            }
        }

        report.finish();
        self.persist_report(&report);
        info!(
            run_id = %report.run_id,
            fetched = report.total_fetched(),
            created = report.total_created(),
            merged = report.total_merged(),
            review_needed = report.total_review_needed(),
            "ingestion run finished"
        );
        Ok(report)
    }

    /// Resolve everything waiting in the candidate store — the hourly
    /// manual-import queue run.
    pub async fn process_pending_candidates(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SourceReport> {
        let context = Arc::new(NormalizerContext::load(&self.catalog)?);
        let resolver = Resolver::new();
        let writer = MergeWriter::new(context);
        let mut report = SourceReport::new("pending-queue");

        let pending = self
            .catalog
            .with_conn(|conn| candidates::list_unprocessed(conn, None))?;
        report.fetched = pending.len();
        for candidate in pending {
            if cancel.is_cancelled() {
                info!("pending-queue processing cancelled");
                break;
            }
            match resolve_and_apply(&self.catalog, &resolver, &writer, &candidate).await {
                Ok(outcome) => {
                    tally(&mut report, &outcome);
                    if let Some(event_id) = outcome.event_id {
                        if outcome.outcome != CandidateOutcome::Review {
                            self.sync.project_event(event_id).await;
                        }
                    }
                }
                Err(e) => handle_record_error(&self.catalog, &mut report, &candidate, e)?,
            }
        }
        Ok(report)
    }

    /// Daily 02:00 UTC maintenance: archive finished events, refresh stale
    /// confidence, rebuild the projection, fire the sitemap hook.
    pub async fn run_daily_maintenance(&self, cancel: &CancellationToken) -> Result<()> {
        let now = Utc::now();

        let archived = self.catalog.with_tx(|tx| {
            let ids = events::list_past_unarchived(tx, now.date_naive())?;
            for &id in &ids {
                events::set_status(tx, id, EventStatus::Archived, now)?;
            }
            Ok::<_, PipelineError>(ids)
        })?;
        for id in &archived {
            self.sync.project_delete(*id).await;
        }
        info!(count = archived.len(), "archived past events");

        let cutoff = now - ChronoDuration::days(STALE_CONFIDENCE_DAYS);
        let stale = self
            .catalog
            .with_conn(|conn| events::list_stale_verified(conn, cutoff))?;
        let scorer = ConfidenceScorer::new();
        for id in &stale {
            if cancel.is_cancelled() {
                break;
            }
            self.catalog
                .with_tx(|tx| scorer.recompute(tx, *id, Utc::now()))?;
            self.sync.project_event(*id).await;
        }
        info!(count = stale.len(), "refreshed stale confidence scores");

        let rebuild = self.sync.full_rebuild(cancel).await?;
        info!(
            indexed = rebuild.indexed,
            errors = rebuild.errors,
            "scheduled search rebuild done"
        );

        // Page generation lives outside the core; this is the trigger only.
        info!("sitemap regeneration triggered");
        Ok(())
    }

    /// Rewrite the fingerprint set of every live event from its current
    /// canonical attributes. Run after a reference-row fix (e.g. a city
    /// rename) so stale hashes cannot shadow the dedup lookup.
    pub fn recompute_fingerprints(&self) -> Result<usize> {
        use moussem_core::catalog::fingerprints as fingerprint_index;
        use crate::fingerprint::{generate, FingerprintInput};
        use crate::normalize::normalize;

        let ids = self.catalog.with_conn(|conn| {
            events::list_ids_with_status(
                conn,
                &[
                    EventStatus::Announced,
                    EventStatus::Confirmed,
                    EventStatus::Cancelled,
                    EventStatus::Postponed,
                ],
            )
        })?;
        let mut rewritten = 0;
        for id in &ids {
            self.catalog.with_tx(|tx| {
                let Some(event) = events::get(tx, *id)? else {
                    return Ok::<_, PipelineError>(());
                };
                let prints = generate(FingerprintInput {
                    normalized_name: &normalize(&event.name),
                    start_date: Some(event.start_date),
                    city_id: Some(event.city_id),
                });
                fingerprint_index::replace_for_event(tx, *id, &prints)?;
                Ok(())
            })?;
            rewritten += 1;
        }
        info!(rewritten, "fingerprint sets rewritten");
        Ok(rewritten)
    }

    /// Weekly sweep of unprocessed candidates nobody will come back for.
    pub fn garbage_collect_candidates(&self) -> Result<usize> {
        let cutoff = Utc::now() - ChronoDuration::days(CANDIDATE_RETENTION_DAYS);
        let removed = self
            .catalog
            .with_conn(|conn| candidates::garbage_collect_older_than(conn, cutoff))?;
        info!(removed, "garbage-collected stale candidates");
        Ok(removed)
    }

    fn persist_report(&self, report: &IngestionReport) {
        let dir = self.data_dir.join("reports");
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!(error = %e, "cannot create report directory");
            return;
        }
        let path = dir.join(format!("run-{}.json", report.run_id));
        match serde_json::to_string_pretty(report) {
            Ok(json) => {
                if let Err(e) = fs::write(&path, json) {
                    warn!(error = %e, "cannot persist run report");
                }
            }
            Err(e) => warn!(error = %e, "cannot serialize run report"),
        }
    }
}

async fn ingest_source(
    catalog: Arc<Catalog>,
    registry: Arc<AdapterRegistry>,
    sync: Arc<ProjectionSynchronizer>,
    context: Arc<NormalizerContext>,
    spec: crate::sources::SourceSpec,
    source_id: i64,
    cancel: CancellationToken,
) -> SourceReport {
    let mut report = SourceReport::new(spec.name.clone());
    let adapter = match registry.build_adapter(&spec, context.clone()) {
        Ok(adapter) => adapter,
        Err(e) => {
            report.errors.push(format!("{}: {e}", e.kind()));
            return report;
        }
    };

    let since = catalog
        .with_conn(|conn| source_rows::get(conn, source_id))
        .ok()
        .flatten()
        .and_then(|source| source.last_fetch_at);

    let fetch_started = Utc::now();
    let timer = Instant::now();
    let raw_records = match retry::with_backoff(&spec.name, &cancel, || adapter.fetch(since)).await
    {
        Ok(records) => {
            metrics::sources::fetch_success(&spec.name);
            metrics::sources::fetch_duration(timer.elapsed().as_secs_f64());
            metrics::sources::records_fetched(records.len() as u64);
            records
        }
        Err(e) => {
            metrics::sources::fetch_error(&spec.name, e.kind());
            report.errors.push(format!("{}: {e}", e.kind()));
            // Retriable fetch failure: the cursor stays put.
            return report;
        }
    };
    report.fetched = raw_records.len();

    let resolver = Resolver::new();
    let writer = MergeWriter::new(context);
    let mut cancelled = false;
    for raw in &raw_records {
        if cancel.is_cancelled() {
            info!(source = %spec.name, "ingestion cancelled between candidates");
            cancelled = true;
            break;
        }
        match process_record(&catalog, &resolver, &writer, adapter.as_ref(), source_id, raw).await {
            Ok(outcome) => {
                tally(&mut report, &outcome);
                if let Some(event_id) = outcome.event_id {
                    if outcome.outcome != CandidateOutcome::Review {
                        sync.project_event(event_id).await;
                    }
                }
            }
            Err(e) if e.is_record_error() => {
                metrics::ingest::record_skipped(e.kind());
                report.skipped += 1;
                report.errors.push(format!("{}: {e}", e.kind()));
            }
            Err(e) => {
                // System error: halt this source, leave the run alive.
                error!(source = %spec.name, error = %e, "system failure, halting source");
                report.errors.push(format!("{}: {e}", e.kind()));
                return report;
            }
        }
    }

    if !cancelled {
        match catalog.with_conn(|conn| source_rows::set_last_fetch_at(conn, source_id, fetch_started))
        {
            Ok(()) => report.cursor_advanced = true,
            Err(e) => report.errors.push(format!("cursor update failed: {e}")),
        }
    }
    report
}

/// Normalize, stage, resolve and apply one raw record. Staging commits on
/// its own; the resolve/apply cycle is a second, atomic transaction.
async fn process_record(
    catalog: &Catalog,
    resolver: &Resolver,
    writer: &MergeWriter,
    adapter: &dyn SourceAdapter,
    source_id: i64,
    raw: &crate::sources::RawRecord,
) -> Result<ApplyOutcome> {
    let draft = adapter.normalize(raw)?;
    let now = Utc::now();
    let mut candidate = draft.into_candidate(source_id, now);
    let candidate_id = catalog.with_conn(|conn| candidates::insert(conn, &candidate))?;
    candidate.id = Some(candidate_id);
    metrics::ingest::candidate_staged();

    resolve_and_apply(catalog, resolver, writer, &candidate).await
}

/// The per-candidate transaction: resolve against the current fingerprint
/// view and apply the decision. A merge conflict rolls the transaction back
/// and parks the candidate for review.
async fn resolve_and_apply(
    catalog: &Catalog,
    resolver: &Resolver,
    writer: &MergeWriter,
    candidate: &Candidate,
) -> Result<ApplyOutcome> {
    let now = Utc::now();
    let applied = catalog.with_tx(|tx| {
        let resolution = resolver.resolve(tx, candidate)?;
        metrics::resolver::decision(resolution.match_type.as_str());
        metrics::resolver::confidence(resolution.confidence);
        match resolution.action {
            ResolutionAction::Create => metrics::resolver::create_decided(),
            ResolutionAction::Merge => metrics::resolver::merge_decided(),
            ResolutionAction::Review => metrics::resolver::review_decided(),
        }
        writer.apply(tx, candidate, &resolution, now)
    });

    match applied {
        Ok(outcome) => Ok(outcome),
        Err(PipelineError::MergeConflict { message }) => {
            warn!(%message, "merge conflict, parking candidate for review");
            if let Some(candidate_id) = candidate.id {
                catalog.with_conn(|conn| {
                    candidates::mark_processed(
                        conn,
                        candidate_id,
                        CandidateOutcome::Review,
                        None,
                        None,
                        Utc::now(),
                    )
                })?;
            }
            Ok(ApplyOutcome {
                event_id: None,
                outcome: CandidateOutcome::Review,
                warning: Some(message),
            })
        }
        Err(e) => Err(e),
    }
}

fn tally(report: &mut SourceReport, outcome: &ApplyOutcome) {
    match outcome.outcome {
        CandidateOutcome::Created => report.created += 1,
        CandidateOutcome::Merged => report.merged += 1,
        CandidateOutcome::Review => report.review_needed += 1,
        CandidateOutcome::Error => report.skipped += 1,
    }
    if let Some(warning) = &outcome.warning {
        report.warnings.push(warning.clone());
    }
}

fn handle_record_error(
    catalog: &Catalog,
    report: &mut SourceReport,
    candidate: &Candidate,
    e: PipelineError,
) -> Result<()> {
    if !e.is_record_error() {
        report.errors.push(format!("{}: {e}", e.kind()));
        return Err(e);
    }
    metrics::ingest::record_skipped(e.kind());
    report.skipped += 1;
    report.errors.push(format!("{}: {e}", e.kind()));
    if let Some(candidate_id) = candidate.id {
        catalog.with_conn(|conn| {
            candidates::mark_processed(
                conn,
                candidate_id,
                CandidateOutcome::Error,
                None,
                None,
                Utc::now(),
            )
        })?;
    }
    Ok(())
}
