//! End-to-end workflow tests over the in-memory pipeline.

mod common;

use std::sync::atomic::Ordering;

use fitcheck_core::{MetadataFilter, SourceRow};
use fitcheck_server::report::REPORT_FILENAME;
use fitcheck_server::sessions::SessionRegistry;
use fitcheck_server::workflow::{Question, Session, SessionState, WorkflowError};

// ===========================================================================
// TEST 1: two identical rows → two records, two embeds, one upsert, one report
// ===========================================================================
#[tokio::test]
async fn test_two_row_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let fx = common::fixture(dir.path());
    let mut session = Session::new(fx.pipeline.clone());

    let state = session
        .ingest_rows(vec![common::engineer_row(), common::engineer_row()])
        .await
        .unwrap();
    assert_eq!(state, &SessionState::AwaitingQuery { records: 2 });
    assert_eq!(fx.embedder.calls.load(Ordering::SeqCst), 2);
    assert_eq!(fx.store.upsert_batches(), vec![2]);

    session
        .submit_question(Question::new("Is this candidate qualified?"))
        .await
        .unwrap();

    let (answer, sources, report_path) = match session.state() {
        SessionState::Reported {
            answer,
            sources,
            report_path,
            ..
        } => (answer.clone(), sources.clone(), report_path.clone()),
        other => panic!("expected reported, got {:?}", other),
    };
    assert_eq!(sources.len(), 2);
    assert!(sources.iter().all(|hit| hit.metadata.category == "Engineer"));
    assert!(sources.iter().all(|hit| hit.metadata.acceptance == "Pass"));
    assert_eq!(fx.synthesizer.calls.load(Ordering::SeqCst), 1);

    assert!(report_path.ends_with(REPORT_FILENAME));
    assert!(report_path.starts_with(dir.path().join(session.id().to_string())));
    let on_disk = std::fs::read(&report_path).unwrap();
    let report = session.report().unwrap();
    assert_eq!(on_disk, report.bytes);
    assert_eq!(report.body_text(), answer.answer);
}

// ===========================================================================
// TEST 2: the closest record ranks first
// ===========================================================================
#[tokio::test]
async fn test_matching_record_ranks_first() {
    let dir = tempfile::tempdir().unwrap();
    let fx = common::fixture(dir.path());
    let mut session = Session::new(fx.pipeline.clone());

    let nurse = SourceRow {
        jd_name: Some("Nurse".into()),
        tag: Some("Fail".into()),
        ..Default::default()
    };
    session
        .ingest_rows(vec![nurse, common::engineer_row()])
        .await
        .unwrap();

    session
        .submit_question(Question::new("engineer who can build systems"))
        .await
        .unwrap();

    match session.state() {
        SessionState::Reported { sources, .. } => {
            assert_eq!(sources[0].metadata.category, "Engineer");
            assert!(sources[0].score >= sources[1].score);
        }
        other => panic!("expected reported, got {:?}", other),
    }
}

// ===========================================================================
// TEST 3: limit and metadata filter narrow the hits
// ===========================================================================
#[tokio::test]
async fn test_limit_and_filter() {
    let dir = tempfile::tempdir().unwrap();
    let fx = common::fixture(dir.path());
    let mut session = Session::new(fx.pipeline.clone());

    let nurse = SourceRow {
        jd_name: Some("Nurse".into()),
        tag: Some("Fail".into()),
        ..Default::default()
    };
    session
        .ingest_rows(vec![
            common::engineer_row(),
            nurse,
            common::engineer_row(),
        ])
        .await
        .unwrap();

    session
        .submit_question(Question {
            text: "who is qualified?".into(),
            limit: Some(1),
            filter: MetadataFilter::default(),
        })
        .await
        .unwrap();
    match session.state() {
        SessionState::Reported { sources, .. } => assert_eq!(sources.len(), 1),
        other => panic!("expected reported, got {:?}", other),
    }

    session
        .submit_question(Question {
            text: "who is qualified?".into(),
            limit: Some(10),
            filter: MetadataFilter {
                category: Some("Nurse".into()),
                ..Default::default()
            },
        })
        .await
        .unwrap();
    match session.state() {
        SessionState::Reported { sources, .. } => {
            assert_eq!(sources.len(), 1);
            assert_eq!(sources[0].metadata.acceptance, "Fail");
        }
        other => panic!("expected reported, got {:?}", other),
    }
}

// ===========================================================================
// TEST 4: empty store → no results, synthesizer untouched
// ===========================================================================
#[tokio::test]
async fn test_empty_store_skips_synthesis() {
    let dir = tempfile::tempdir().unwrap();
    let fx = common::fixture(dir.path());
    let mut session = Session::new(fx.pipeline.clone());
    session.ingest_rows(Vec::new()).await.unwrap();

    let state = session
        .submit_question(Question::new("Is this candidate qualified?"))
        .await
        .unwrap();

    assert_eq!(state.name(), "no_results");
    assert_eq!(fx.synthesizer.calls.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join(session.id().to_string()).exists());
}

// ===========================================================================
// TEST 5: unsupported upload fails ingestion without touching the store
// ===========================================================================
#[tokio::test]
async fn test_pdf_upload_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let fx = common::fixture(dir.path());
    let mut session = Session::new(fx.pipeline.clone());

    let err = session
        .upload(b"%PDF-1.5 not a spreadsheet".to_vec(), "candidates.pdf")
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Ingestion(_)));
    match session.state() {
        SessionState::IngestFailed { reason } => assert!(reason.contains("pdf")),
        other => panic!("expected ingest_failed, got {:?}", other),
    }
    assert!(fx.store.upsert_batches().is_empty());
    assert_eq!(fx.embedder.calls.load(Ordering::SeqCst), 0);
}

// ===========================================================================
// TEST 6: sessions keep separate report files
// ===========================================================================
#[tokio::test]
async fn test_sessions_do_not_share_reports() {
    let dir = tempfile::tempdir().unwrap();
    let fx = common::fixture(dir.path());
    let registry = SessionRegistry::new(fx.pipeline.clone());

    let (a_id, a) = registry.create().await;
    let (b_id, b) = registry.create().await;
    assert_ne!(a_id, b_id);

    a.lock()
        .await
        .ingest_rows(vec![common::engineer_row()])
        .await
        .unwrap();
    b.lock()
        .await
        .ingest_rows(vec![common::engineer_row()])
        .await
        .unwrap();

    a.lock()
        .await
        .submit_question(Question::new("first question"))
        .await
        .unwrap();
    b.lock()
        .await
        .submit_question(Question::new("second question"))
        .await
        .unwrap();

    let a_path = a.lock().await.report().unwrap().path.clone();
    let b_path = b.lock().await.report().unwrap().path.clone();
    assert_ne!(a_path, b_path);
    assert!(a_path.exists() && b_path.exists());

    assert!(registry.remove(a_id).await);
    assert!(!a_path.exists());
    assert!(b_path.exists());
    assert!(registry.get(a_id).await.is_none());
}

// ===========================================================================
// TEST 7: a real two-row .xlsx upload → two records in one upsert
// ===========================================================================
#[tokio::test]
async fn test_xlsx_upload_indexes_every_row() {
    let dir = tempfile::tempdir().unwrap();
    let fx = common::fixture(dir.path());
    let mut session = Session::new(fx.pipeline.clone());

    let state = session
        .upload(common::two_candidate_xlsx(), "candidates.xlsx")
        .await
        .unwrap();

    assert_eq!(state, &SessionState::AwaitingQuery { records: 2 });
    assert_eq!(fx.embedder.calls.load(Ordering::SeqCst), 2);
    assert_eq!(fx.store.upsert_batches(), vec![2]);

    session
        .submit_question(Question {
            text: "who did not pass?".into(),
            limit: Some(5),
            filter: MetadataFilter {
                acceptance: Some("Fail".into()),
                ..Default::default()
            },
        })
        .await
        .unwrap();
    match session.state() {
        SessionState::Reported { sources, .. } => {
            assert_eq!(sources.len(), 1);
            assert_eq!(sources[0].metadata.category, "Nurse");
            assert!(sources[0].content.starts_with("JD NAME: Nurse\nJob Description: Patient care"));
        }
        other => panic!("expected reported, got {:?}", other),
    }
}

// ===========================================================================
// TEST 8: a session never retrieves another session's records
// ===========================================================================
#[tokio::test]
async fn test_sessions_do_not_share_records() {
    let dir = tempfile::tempdir().unwrap();
    let fx = common::fixture(dir.path());
    let mut a = Session::new(fx.pipeline.clone());
    let mut b = Session::new(fx.pipeline.clone());

    a.ingest_rows(vec![common::engineer_row()]).await.unwrap();
    b.ingest_rows(Vec::new()).await.unwrap();

    let state = b
        .submit_question(Question::new("engineer build systems"))
        .await
        .unwrap();
    assert_eq!(state.name(), "no_results");
    assert_eq!(fx.synthesizer.calls.load(Ordering::SeqCst), 0);

    a.submit_question(Question::new("engineer build systems"))
        .await
        .unwrap();
    match a.state() {
        SessionState::Reported { sources, .. } => {
            assert_eq!(sources.len(), 1);
            assert_eq!(sources[0].metadata.session_id, Some(a.id()));
        }
        other => panic!("expected reported, got {:?}", other),
    }
}

// ===========================================================================
// TEST 9: a re-upload replaces the session's earlier records
// ===========================================================================
#[tokio::test]
async fn test_reupload_hides_earlier_upload() {
    let dir = tempfile::tempdir().unwrap();
    let fx = common::fixture(dir.path());
    let mut session = Session::new(fx.pipeline.clone());

    session
        .ingest_rows(vec![common::engineer_row()])
        .await
        .unwrap();
    let nurse = SourceRow {
        jd_name: Some("Nurse".into()),
        job_description: Some("Patient care".into()),
        tag: Some("Fail".into()),
        ..Default::default()
    };
    session.ingest_rows(vec![nurse]).await.unwrap();

    session
        .submit_question(Question {
            text: "engineer build systems".into(),
            limit: Some(10),
            filter: MetadataFilter::default(),
        })
        .await
        .unwrap();
    match session.state() {
        SessionState::Reported { sources, .. } => {
            assert_eq!(sources.len(), 1);
            assert_eq!(sources[0].metadata.category, "Nurse");
        }
        other => panic!("expected reported, got {:?}", other),
    }
}
