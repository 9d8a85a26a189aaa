//! End-to-end pipeline scenarios over an in-memory catalog and an in-memory
//! search collection: staged imports flow through resolve/apply/confidence
//! and into the projection, editorial commands included.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use moussem_core::catalog::{
    audit, candidates, events, fingerprints, sources as source_rows, Catalog,
};
use moussem_core::domain::{CandidateOutcome, EventStatus, FingerprintKind};

use moussem_engine::editorial::EditorialHandler;
use moussem_engine::fingerprint::{generate, FingerprintInput};
use moussem_engine::normalize::normalize;
use moussem_engine::pipeline::{PipelineOrchestrator, SourceReport};
use moussem_engine::search::{
    InMemorySearchClient, ProjectionSynchronizer, SearchClient, COLLECTION_NAME,
};
use moussem_engine::sources::manual::{
    ManualEventRecord, ManualImportPayload, ManualImporter, ManualSourceBlock,
};
use moussem_engine::sources::{AdapterRegistry, NormalizerContext};

struct Stack {
    catalog: Arc<Catalog>,
    memory: Arc<InMemorySearchClient>,
    sync: Arc<ProjectionSynchronizer>,
    orchestrator: PipelineOrchestrator,
    _tmp: tempfile::TempDir,
}

fn stack() -> Stack {
    let tmp = tempfile::tempdir().unwrap();
    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let memory = Arc::new(InMemorySearchClient::new());
    let client: Arc<dyn SearchClient> = memory.clone();
    let sync = Arc::new(ProjectionSynchronizer::new(catalog.clone(), client));
    let registry = Arc::new(AdapterRegistry::empty(tmp.path().to_path_buf()));
    let orchestrator = PipelineOrchestrator::new(
        catalog.clone(),
        registry,
        sync.clone(),
        2,
        tmp.path().to_path_buf(),
    );
    Stack {
        catalog,
        memory,
        sync,
        orchestrator,
        _tmp: tmp,
    }
}

fn record(external_id: &str, name: &str, start_date: &str, city: &str) -> ManualEventRecord {
    ManualEventRecord {
        external_id: Some(external_id.to_string()),
        name: name.to_string(),
        event_type: "festival".to_string(),
        start_date: start_date.to_string(),
        end_date: None,
        city: city.to_string(),
        venue: None,
        organizer: None,
        description: None,
        official_website: None,
        ticket_url: None,
        source_url: Some(format!("https://example.com/{external_id}")),
        genres: vec![],
        artists: vec![],
    }
}

fn payload(
    source_name: &str,
    source_type: &str,
    reliability: f64,
    records: Vec<ManualEventRecord>,
) -> ManualImportPayload {
    ManualImportPayload {
        source: ManualSourceBlock {
            source_type: serde_json::from_value(serde_json::json!(source_type)).unwrap(),
            name: source_name.to_string(),
            reliability,
        },
        events: records,
    }
}

async fn import_and_process(stack: &Stack, payload: ManualImportPayload) -> SourceReport {
    let context = Arc::new(NormalizerContext::load(&stack.catalog).unwrap());
    let importer = ManualImporter::new(stack.catalog.clone(), context);
    importer.import(&payload).unwrap();
    stack
        .orchestrator
        .process_pending_candidates(&CancellationToken::new())
        .await
        .unwrap()
}

fn all_event_ids(catalog: &Catalog) -> Vec<i64> {
    catalog
        .with_conn(|conn| {
            events::list_ids_with_status(
                conn,
                &[
                    EventStatus::Announced,
                    EventStatus::Confirmed,
                    EventStatus::Cancelled,
                    EventStatus::Postponed,
                    EventStatus::Archived,
                ],
            )
        })
        .unwrap()
}

#[tokio::test]
async fn s1_exact_duplicate_from_same_source_creates_once() {
    let s = stack();
    let gnaoua = || {
        record(
            "EB-123",
            "Festival Gnaoua et Musiques du Monde",
            "2025-06-26",
            "Essaouira",
        )
    };

    let first = import_and_process(&s, payload("eventbrite-ma", "api", 0.8, vec![gnaoua()])).await;
    assert_eq!(first.created, 1);

    let second = import_and_process(&s, payload("eventbrite-ma", "api", 0.8, vec![gnaoua()])).await;
    assert_eq!(second.merged, 1);
    assert_eq!(second.created, 0);

    let ids = all_event_ids(&s.catalog);
    assert_eq!(ids.len(), 1, "ingesting the same record twice must create one event");
    let event_id = ids[0];

    let links = s
        .catalog
        .with_conn(|conn| source_rows::for_event(conn, event_id))
        .unwrap();
    assert_eq!(links.len(), 2);
    for (link, _) in &links {
        assert_eq!(link.external_id.as_deref(), Some("EB-123"));
    }
    assert_eq!(
        s.catalog
            .with_conn(|conn| source_rows::count_for_event(conn, event_id))
            .unwrap(),
        2
    );

    // Both candidates processed and pointing at the same event.
    let processed: Vec<_> = s
        .catalog
        .with_conn(|conn| candidates::list_unprocessed(conn, None))
        .unwrap();
    assert!(processed.is_empty());

    let event = s
        .catalog
        .with_conn(|conn| events::get(conn, event_id))
        .unwrap()
        .unwrap();
    // 0.35*0.8 + 0.25*0.7 + 0.20*0.5 + 0.10*1.0 + 0.10*0.5
    assert!(
        (event.confidence_score - 0.705).abs() < 1e-9,
        "confidence was {}",
        event.confidence_score
    );
}

#[tokio::test]
async fn s2_fuzzy_merge_overwrites_from_the_more_reliable_source() {
    let s = stack();
    let report_a = import_and_process(
        &s,
        payload(
            "agenda-api",
            "api",
            0.8,
            vec![record(
                "A-1",
                "Festival Gnaoua et Musiques du Monde 2025",
                "2025-06-26",
                "Essaouira",
            )],
        ),
    )
    .await;
    assert_eq!(report_a.created, 1);
    let event_id = all_event_ids(&s.catalog)[0];
    let before = s
        .catalog
        .with_conn(|conn| events::get(conn, event_id))
        .unwrap()
        .unwrap();

    let official_name = "Festival Gnaoua 2025 — 27e édition";
    let report_b = import_and_process(
        &s,
        payload(
            "festival-gnaoua-official",
            "manual",
            1.0,
            vec![record("OFF-9", official_name, "2025-06-26", "Essaouira")],
        ),
    )
    .await;
    assert_eq!(report_b.merged, 1, "errors: {:?}", report_b.errors);

    let ids = all_event_ids(&s.catalog);
    assert_eq!(ids.len(), 1);
    let after = s
        .catalog
        .with_conn(|conn| events::get(conn, event_id))
        .unwrap()
        .unwrap();
    assert_eq!(after.name, official_name, "higher-reliability source wins the overwrite");
    assert!(after.confidence_score > before.confidence_score);

    let links = s
        .catalog
        .with_conn(|conn| source_rows::for_event(conn, event_id))
        .unwrap();
    assert_eq!(links.len(), 2);

    // Fingerprints were recomputed for the new canonical name.
    let prints = generate(FingerprintInput {
        normalized_name: &normalize(official_name),
        start_date: NaiveDate::from_ymd_opt(2025, 6, 26),
        city_id: Some(after.city_id),
    });
    let exact = prints
        .iter()
        .find(|(kind, _)| *kind == FingerprintKind::Exact)
        .unwrap();
    let owners = s
        .catalog
        .with_conn(|conn| fingerprints::lookup(conn, FingerprintKind::Exact, &exact.1))
        .unwrap();
    assert_eq!(owners, vec![event_id]);
    let stored = s
        .catalog
        .with_conn(|conn| fingerprints::list_for_event(conn, event_id))
        .unwrap();
    assert_eq!(stored.len(), 4, "one row per fingerprint kind");
}

#[tokio::test]
async fn s3_date_disagreement_parks_the_candidate_for_review() {
    let s = stack();
    import_and_process(
        &s,
        payload(
            "agenda-api",
            "api",
            0.8,
            vec![record(
                "A-1",
                "Festival Gnaoua et Musiques du Monde",
                "2025-06-26",
                "Essaouira",
            )],
        ),
    )
    .await;
    let event_id = all_event_ids(&s.catalog)[0];

    let report = import_and_process(
        &s,
        payload(
            "autre-agenda",
            "api",
            0.8,
            vec![record(
                "C-7",
                "Festival Gnaoua et Musiques du Monde",
                "2025-06-27",
                "Essaouira",
            )],
        ),
    )
    .await;
    assert_eq!(report.review_needed, 1);
    assert_eq!(report.merged, 0);

    // No event mutation happened.
    let event = s
        .catalog
        .with_conn(|conn| events::get(conn, event_id))
        .unwrap()
        .unwrap();
    assert_eq!(event.start_date, NaiveDate::from_ymd_opt(2025, 6, 26).unwrap());
    let links = s
        .catalog
        .with_conn(|conn| source_rows::for_event(conn, event_id))
        .unwrap();
    assert_eq!(links.len(), 1);

    let review = s
        .catalog
        .with_conn(candidates::list_review_pending)
        .unwrap();
    assert_eq!(review.len(), 1);
    assert_eq!(review[0].matched_event_id, Some(event_id));
    assert_eq!(review[0].outcome, Some(CandidateOutcome::Review));
}

#[tokio::test]
async fn s4_editorial_merge_moves_provenance_and_snapshots_the_loser() {
    let s = stack();
    import_and_process(
        &s,
        payload(
            "agenda-api",
            "api",
            0.8,
            vec![
                record("K-1", "Timitar Signes et Cultures", "2025-07-03", "Agadir"),
                record("L-2", "Festival Timitar Agadir", "2025-07-17", "Agadir"),
            ],
        ),
    )
    .await;
    let ids = all_event_ids(&s.catalog);
    assert_eq!(ids.len(), 2);
    let (keep_id, lose_id) = (ids[0], ids[1]);

    let handler = EditorialHandler::new(s.catalog.clone(), s.sync.clone(), vec![]);
    handler.merge(keep_id, lose_id, "admin@moussem.ma").await.unwrap();

    assert_eq!(
        s.catalog
            .with_conn(|conn| audit::snapshot_count_for_event(conn, lose_id))
            .unwrap(),
        1
    );
    assert!(s
        .catalog
        .with_conn(|conn| events::get(conn, lose_id))
        .unwrap()
        .is_none());
    let links = s
        .catalog
        .with_conn(|conn| source_rows::for_event(conn, keep_id))
        .unwrap();
    assert_eq!(links.len(), 2, "loser's provenance re-attached to keeper");

    assert!(s.memory.contains(COLLECTION_NAME, &keep_id.to_string()));
    assert!(!s.memory.contains(COLLECTION_NAME, &lose_id.to_string()));

    let actions = s
        .catalog
        .with_conn(|conn| audit::list_actions_for_event(conn, keep_id))
        .unwrap();
    assert!(actions.iter().any(|a| a.action_type == "merge"));
}

#[tokio::test]
async fn s5_cancelling_removes_the_search_document_but_keeps_the_event() {
    let s = stack();
    import_and_process(
        &s,
        payload(
            "agenda-api",
            "api",
            0.8,
            vec![record("V-1", "Jazzablanca", "2025-09-12", "Casablanca")],
        ),
    )
    .await;
    let event_id = all_event_ids(&s.catalog)[0];
    assert!(s.memory.contains(COLLECTION_NAME, &event_id.to_string()));

    let handler = EditorialHandler::new(s.catalog.clone(), s.sync.clone(), vec![]);
    handler
        .update_status(event_id, EventStatus::Cancelled, "admin@moussem.ma", None)
        .await
        .unwrap();

    let event = s
        .catalog
        .with_conn(|conn| events::get(conn, event_id))
        .unwrap()
        .unwrap();
    assert_eq!(event.status, EventStatus::Cancelled);
    assert!(
        !s.memory.contains(COLLECTION_NAME, &event_id.to_string()),
        "cancelled events are not indexable"
    );
}

#[tokio::test]
async fn s6_full_rebuild_restores_projection_parity_after_drift() {
    let s = stack();
    import_and_process(
        &s,
        payload(
            "agenda-api",
            "api",
            0.8,
            vec![
                record("R-1", "Festival Gnaoua", "2025-06-26", "Essaouira"),
                record("R-2", "Timitar", "2025-07-03", "Agadir"),
                record("R-3", "Jazzablanca", "2025-09-12", "Casablanca"),
                record("R-4", "Tanjazz", "2025-09-19", "Tanger"),
            ],
        ),
    )
    .await;
    let ids = all_event_ids(&s.catalog);
    assert_eq!(ids.len(), 4);

    // Corrupt the collection: half the documents vanish.
    for id in ids.iter().take(2) {
        s.memory
            .delete_document(COLLECTION_NAME, &id.to_string())
            .await
            .unwrap();
    }
    assert_eq!(s.memory.document_count(COLLECTION_NAME), 2);

    let outcome = s.sync.full_rebuild(&CancellationToken::new()).await.unwrap();
    let indexable = s
        .catalog
        .with_conn(|conn| {
            events::count_with_status(conn, &[EventStatus::Announced, EventStatus::Confirmed])
        })
        .unwrap();
    assert_eq!((outcome.indexed + outcome.errors) as u64, indexable);
    assert_eq!(s.memory.document_count(COLLECTION_NAME), ids.len());
    for id in &ids {
        assert!(s.memory.contains(COLLECTION_NAME, &id.to_string()));
    }
}

#[tokio::test]
async fn rebuild_counts_per_document_failures_and_continues() {
    let s = stack();
    import_and_process(
        &s,
        payload(
            "agenda-api",
            "api",
            0.8,
            vec![
                record("F-1", "Festival des Roses", "2025-05-02", "Ouarzazate"),
                record("F-2", "Moussem de Tan-Tan", "2025-05-14", "Guelmim"),
            ],
        ),
    )
    .await;
    let ids = all_event_ids(&s.catalog);
    s.memory.fail_document(&ids[0].to_string());

    let outcome = s.sync.full_rebuild(&CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.indexed, 1);
    assert_eq!(outcome.errors, 1);
}

#[tokio::test]
async fn deleting_a_missing_search_document_is_idempotent() {
    let s = stack();
    s.sync.delete_event(999_999).await.unwrap();
    s.sync.delete_event(999_999).await.unwrap();
}

#[tokio::test]
async fn archive_removes_the_event_from_search_for_good() {
    let s = stack();
    import_and_process(
        &s,
        payload(
            "agenda-api",
            "api",
            0.8,
            vec![record("AR-3", "Moussem Culturel", "2025-08-09", "Asilah")],
        ),
    )
    .await;
    let event_id = *all_event_ids(&s.catalog).last().unwrap();
    assert!(s.memory.contains(COLLECTION_NAME, &event_id.to_string()));

    let handler = EditorialHandler::new(s.catalog.clone(), s.sync.clone(), vec![]);
    handler
        .archive(event_id, "admin@moussem.ma", Some("past edition".to_string()))
        .await
        .unwrap();

    assert!(!s.memory.contains(COLLECTION_NAME, &event_id.to_string()));
    let event = s
        .catalog
        .with_conn(|conn| events::get(conn, event_id))
        .unwrap()
        .unwrap();
    assert_eq!(event.status, EventStatus::Archived);

    // A later rebuild keeps it out too.
    let _ = s.sync.full_rebuild(&CancellationToken::new()).await.unwrap();
    assert!(!s.memory.contains(COLLECTION_NAME, &event_id.to_string()));
}

#[tokio::test]
async fn unknown_city_is_rejected_on_import_and_reviewed_in_the_pipeline() {
    let s = stack();
    let context = Arc::new(NormalizerContext::load(&s.catalog).unwrap());
    let importer = ManualImporter::new(s.catalog.clone(), context);
    let summary = importer
        .import(&payload(
            "agenda-api",
            "api",
            0.8,
            vec![record("U-1", "Festival Inconnu", "2025-03-01", "Atlantis")],
        ))
        .unwrap();
    // Manual import rejects the record outright with its error.
    assert_eq!(summary.staged, 0);
    assert_eq!(summary.rejected.len(), 1);
    assert!(summary.rejected[0].error.contains("Atlantis"));

    // A polled source keeps the candidate with a null city; it parks in the
    // review queue instead of creating an event.
    let source_id = s
        .catalog
        .with_conn(|conn| {
            source_rows::upsert(
                conn,
                &moussem_core::domain::Source {
                    id: None,
                    name: "scraped-page".to_string(),
                    source_type: serde_json::from_value(serde_json::json!("scrape")).unwrap(),
                    reliability_score: 0.5,
                    is_active: true,
                    last_fetch_at: None,
                    accuracy_score: None,
                },
            )
        })
        .unwrap();
    s.catalog
        .with_conn(|conn| {
            candidates::insert(
                conn,
                &moussem_core::domain::Candidate {
                    id: None,
                    source_id,
                    external_id: Some("SC-1".to_string()),
                    source_url: None,
                    raw_payload: serde_json::json!({}),
                    raw_name: "Festival Inconnu".to_string(),
                    normalized_name: normalize("Festival Inconnu"),
                    event_type: serde_json::from_value(serde_json::json!("festival")).unwrap(),
                    start_date: NaiveDate::from_ymd_opt(2025, 3, 1),
                    end_date: None,
                    raw_city: Some("Atlantis".to_string()),
                    city_id: None,
                    venue_name: None,
                    organizer_name: None,
                    description: None,
                    official_website: None,
                    ticket_url: None,
                    genres: vec![],
                    artists: vec![],
                    processed: false,
                    outcome: None,
                    matched_event_id: None,
                    match_confidence: None,
                    ingested_at: chrono::Utc::now(),
                    processed_at: None,
                },
            )
        })
        .unwrap();
    let report = s
        .orchestrator
        .process_pending_candidates(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.review_needed, 1);
    assert!(all_event_ids(&s.catalog).is_empty());
    let review = s
        .catalog
        .with_conn(candidates::list_review_pending)
        .unwrap();
    assert_eq!(review.len(), 1);
}

#[tokio::test]
async fn admin_allowlist_gates_editorial_commands() {
    let s = stack();
    import_and_process(
        &s,
        payload(
            "agenda-api",
            "api",
            0.8,
            vec![record("P-1", "Tanjazz", "2025-09-19", "Tanger")],
        ),
    )
    .await;
    let event_id = all_event_ids(&s.catalog)[0];

    let handler = EditorialHandler::new(
        s.catalog.clone(),
        s.sync.clone(),
        vec!["admin@moussem.ma".to_string()],
    );
    assert!(handler
        .pin(event_id, true, "intruder@example.com", None)
        .await
        .is_err());
    handler
        .pin(event_id, true, "admin@moussem.ma", None)
        .await
        .unwrap();
    let event = s
        .catalog
        .with_conn(|conn| events::get(conn, event_id))
        .unwrap()
        .unwrap();
    assert!(event.is_pinned);
}
