//! Metrics catalog for the ingestion and projection pipeline, following
//! standard Prometheus naming conventions.

use std::fmt;

/// All metric names used in the system; no magic strings at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Source fetching
    SourcesFetchSuccess,
    SourcesFetchError,
    SourcesFetchDuration,
    SourcesFetchRetries,
    SourcesRecordsFetched,

    // Candidate staging
    IngestCandidatesStaged,
    IngestRecordsSkipped,

    // Resolver
    ResolverDecisions,
    ResolverCreates,
    ResolverMerges,
    ResolverReviews,
    ResolverConfidence,

    // Merge writer
    MergeEventsCreated,
    MergeEventsMerged,
    MergeOverwrites,
    MergeTieWarnings,

    // Confidence scorer
    ConfidenceRecomputes,
    ConfidenceScore,

    // Search projection
    ProjectionUpserts,
    ProjectionDeletes,
    ProjectionRetriesEnqueued,
    ProjectionRebuildIndexed,
    ProjectionRebuildErrors,

    // Editorial
    EditorialActions,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::SourcesFetchSuccess => "moussem_sources_fetch_success_total",
            MetricName::SourcesFetchError => "moussem_sources_fetch_error_total",
            MetricName::SourcesFetchDuration => "moussem_sources_fetch_duration_seconds",
            MetricName::SourcesFetchRetries => "moussem_sources_fetch_retries_total",
            MetricName::SourcesRecordsFetched => "moussem_sources_records_fetched_total",
            MetricName::IngestCandidatesStaged => "moussem_ingest_candidates_staged_total",
            MetricName::IngestRecordsSkipped => "moussem_ingest_records_skipped_total",
            MetricName::ResolverDecisions => "moussem_resolver_decisions_total",
            MetricName::ResolverCreates => "moussem_resolver_creates_total",
            MetricName::ResolverMerges => "moussem_resolver_merges_total",
            MetricName::ResolverReviews => "moussem_resolver_reviews_total",
            MetricName::ResolverConfidence => "moussem_resolver_confidence",
            MetricName::MergeEventsCreated => "moussem_merge_events_created_total",
            MetricName::MergeEventsMerged => "moussem_merge_events_merged_total",
            MetricName::MergeOverwrites => "moussem_merge_overwrites_total",
            MetricName::MergeTieWarnings => "moussem_merge_tie_warnings_total",
            MetricName::ConfidenceRecomputes => "moussem_confidence_recomputes_total",
            MetricName::ConfidenceScore => "moussem_confidence_score",
            MetricName::ProjectionUpserts => "moussem_projection_upserts_total",
            MetricName::ProjectionDeletes => "moussem_projection_deletes_total",
            MetricName::ProjectionRetriesEnqueued => "moussem_projection_retries_enqueued_total",
            MetricName::ProjectionRebuildIndexed => "moussem_projection_rebuild_indexed_total",
            MetricName::ProjectionRebuildErrors => "moussem_projection_rebuild_errors_total",
            MetricName::EditorialActions => "moussem_editorial_actions_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Install the Prometheus recorder and expose a scrape endpoint on the
/// given port.
pub fn init(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    use metrics_exporter_prometheus::PrometheusBuilder;
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()?;
    Ok(())
}

pub mod sources {
    use super::MetricName;

    pub fn fetch_success(source_name: &str) {
        ::metrics::counter!(MetricName::SourcesFetchSuccess.as_str(), "source" => source_name.to_string())
            .increment(1);
    }

    pub fn fetch_error(source_name: &str, kind: &'static str) {
        ::metrics::counter!(MetricName::SourcesFetchError.as_str(),
            "source" => source_name.to_string(), "kind" => kind)
        .increment(1);
    }

    pub fn fetch_duration(secs: f64) {
        ::metrics::histogram!(MetricName::SourcesFetchDuration.as_str()).record(secs);
    }

    pub fn fetch_retry(source_name: &str) {
        ::metrics::counter!(MetricName::SourcesFetchRetries.as_str(), "source" => source_name.to_string())
            .increment(1);
    }

    pub fn records_fetched(count: u64) {
        ::metrics::counter!(MetricName::SourcesRecordsFetched.as_str()).increment(count);
    }
}

pub mod ingest {
    use super::MetricName;

    pub fn candidate_staged() {
        ::metrics::counter!(MetricName::IngestCandidatesStaged.as_str()).increment(1);
    }

    pub fn record_skipped(kind: &'static str) {
        ::metrics::counter!(MetricName::IngestRecordsSkipped.as_str(), "kind" => kind).increment(1);
    }
}

pub mod resolver {
    use super::MetricName;

    pub fn decision(match_type: &'static str) {
        ::metrics::counter!(MetricName::ResolverDecisions.as_str(), "match_type" => match_type)
            .increment(1);
    }

    pub fn create_decided() {
        ::metrics::counter!(MetricName::ResolverCreates.as_str()).increment(1);
    }

    pub fn merge_decided() {
        ::metrics::counter!(MetricName::ResolverMerges.as_str()).increment(1);
    }

    pub fn review_decided() {
        ::metrics::counter!(MetricName::ResolverReviews.as_str()).increment(1);
    }

    pub fn confidence(value: f64) {
        ::metrics::histogram!(MetricName::ResolverConfidence.as_str()).record(value);
    }
}

pub mod merge {
    use super::MetricName;

    pub fn event_created() {
        ::metrics::counter!(MetricName::MergeEventsCreated.as_str()).increment(1);
    }

    pub fn event_merged() {
        ::metrics::counter!(MetricName::MergeEventsMerged.as_str()).increment(1);
    }

    pub fn overwrite_applied() {
        ::metrics::counter!(MetricName::MergeOverwrites.as_str()).increment(1);
    }

    pub fn tie_warning() {
        ::metrics::counter!(MetricName::MergeTieWarnings.as_str()).increment(1);
    }
}

pub mod confidence {
    use super::MetricName;

    pub fn recomputed(score: f64) {
        ::metrics::counter!(MetricName::ConfidenceRecomputes.as_str()).increment(1);
        ::metrics::histogram!(MetricName::ConfidenceScore.as_str()).record(score);
    }
}

pub mod projection {
    use super::MetricName;

    pub fn document_upserted() {
        ::metrics::counter!(MetricName::ProjectionUpserts.as_str()).increment(1);
    }

    pub fn document_deleted() {
        ::metrics::counter!(MetricName::ProjectionDeletes.as_str()).increment(1);
    }

    pub fn retry_enqueued() {
        ::metrics::counter!(MetricName::ProjectionRetriesEnqueued.as_str()).increment(1);
    }

    pub fn rebuild_finished(indexed: usize, errors: usize) {
        ::metrics::counter!(MetricName::ProjectionRebuildIndexed.as_str())
            .increment(indexed as u64);
        ::metrics::counter!(MetricName::ProjectionRebuildErrors.as_str())
            .increment(errors as u64);
    }
}

pub mod editorial {
    use super::MetricName;

    pub fn action(action_type: &str) {
        ::metrics::counter!(MetricName::EditorialActions.as_str(), "action" => action_type.to_string())
            .increment(1);
    }
}
