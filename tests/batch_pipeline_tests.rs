//! End-to-end batch runs over fake fetchers and real sinks

mod common;

use common::{
    CannedGenerator, FakeShop, Reply, TestServer, candidate, detail_page, fast_batch_config, fast_fetch_config, ranked,
};
use shelf_scout::application::{BatchOrchestrator, EnrichmentGenerator, RunParameters, StopReason, TaskStatus};
use shelf_scout::domain::{CandidateProduct, ContentOrigin, Locale, ProductSink, ProgressLedger, RankBonusConfig};
use shelf_scout::infrastructure::config::FetchConfig;
use shelf_scout::infrastructure::{
    DatabaseConnection, DetailPageExtractor, FileBundleSink, HttpClient, LedgerStore, MemorySink, SqliteProductSink,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

fn orchestrator(shop: Arc<FakeShop>, generator: Arc<CannedGenerator>, sink: Arc<dyn ProductSink>) -> BatchOrchestrator {
    BatchOrchestrator::new(
        shop,
        Arc::new(DetailPageExtractor::new().unwrap()),
        Arc::new(EnrichmentGenerator::new(generator, 200)),
        sink,
        fast_batch_config(),
    )
    .with_affiliate_tag(Some("scout-21".to_string()))
}

fn params(workers: usize) -> RunParameters {
    RunParameters {
        start: 0,
        max_items: None,
        threshold: 0.0,
        workers,
    }
}

#[tokio::test]
async fn failed_fetch_is_recorded_and_the_batch_continues() {
    let shop = Arc::new(FakeShop::with_broken(&["B000000001"]));
    let generator = Arc::new(CannedGenerator::default());
    let sink = Arc::new(MemorySink::new());
    let orchestrator = orchestrator(shop, generator.clone(), sink.clone());
    let mut ledger = ProgressLedger::new();

    let report = orchestrator.run(&ranked(3), &mut ledger, &params(1)).await.unwrap();

    assert_eq!(report.stop_reason, StopReason::Finished);
    assert_eq!(report.summary.processed, 2);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.ai_calls, 4);
    assert_eq!(generator.calls(), 4);
    assert_eq!(report.count(|s| *s == TaskStatus::Completed), 2);

    let failure = &ledger.failed_ids["B000000001"];
    assert!(failure.error.contains("HTTP 500"), "error was {}", failure.error);
    assert_eq!(failure.url, "https://shop.example/dp/B000000001");
    assert!(!ledger.is_processed("B000000001"));
    assert_eq!(ledger.last_index, 2);

    let records = sink.records().await;
    assert_eq!(records.len(), 2);
    let first = &records[0];
    assert_eq!(first.affiliate_link, "https://shop.example/dp/B000000000?tag=scout-21");
    assert_eq!(first.overall_score, 85);
    let locales: Vec<Locale> = first.content.iter().map(|c| c.locale).collect();
    assert_eq!(locales, vec![Locale::En, Locale::Ar]);
    assert!(first.content.iter().all(|c| c.origin == ContentOrigin::Generated));
    assert_eq!(first.content[0].sections.pros, vec!["Reliable", "Easy to clean"]);
}

#[tokio::test]
async fn timed_out_fetch_fails_the_candidate_after_its_retries() {
    let server = TestServer::start(vec![
        ("/dp/FASTITEM01", vec![Reply::html(200, detail_page("Fast kettle"))]),
        ("/dp/SLOWITEM01", vec![Reply::stalled(Duration::from_secs(10))]),
        ("/dp/FASTITEM02", vec![Reply::html(200, detail_page("Fast toaster"))]),
    ])
    .await;
    let list: Vec<CandidateProduct> = ["FASTITEM01", "SLOWITEM01", "FASTITEM02"]
        .iter()
        .enumerate()
        .map(|(i, id)| {
            CandidateProduct::observed(
                *id,
                server.url(&format!("/dp/{id}")),
                "bestsellers",
                100.0 - i as f64,
                Some(1),
                &RankBonusConfig::default(),
            )
        })
        .collect();
    let fetcher = HttpClient::new(FetchConfig {
        timeout_seconds: 1,
        max_attempts: 3,
        ..fast_fetch_config()
    })
    .unwrap();
    let sink = Arc::new(MemorySink::new());
    let orchestrator = BatchOrchestrator::new(
        Arc::new(fetcher),
        Arc::new(DetailPageExtractor::new().unwrap()),
        Arc::new(EnrichmentGenerator::new(Arc::new(CannedGenerator::default()), 200)),
        sink.clone(),
        fast_batch_config(),
    );
    let mut ledger = ProgressLedger::new();

    let report = orchestrator.run(&list, &mut ledger, &params(1)).await.unwrap();

    assert_eq!(report.stop_reason, StopReason::Finished);
    assert_eq!(report.summary.processed, 2);
    assert_eq!(report.summary.failed, 1);
    let failure = &ledger.failed_ids["SLOWITEM01"];
    assert!(failure.error.contains("after 3 attempt(s)"), "error was {}", failure.error);
    assert!(!ledger.is_processed("SLOWITEM01"));
    assert_eq!(server.hits("/dp/SLOWITEM01"), 3);

    let mut stored = sink.stored_ids().await;
    stored.sort();
    assert_eq!(stored, vec!["FASTITEM01", "FASTITEM02"]);
}

#[tokio::test]
async fn persisted_ledger_prevents_reprocessing() {
    let dir = tempfile::tempdir().unwrap();
    let store = LedgerStore::new(dir.path().join("batch_progress.json"));
    let list = ranked(5);

    // first run stops after two candidates
    let first_shop = Arc::new(FakeShop::default());
    let first = orchestrator(first_shop.clone(), Arc::new(CannedGenerator::default()), Arc::new(MemorySink::new()))
        .with_ledger_store(store.clone());
    let mut ledger = store.load().await.unwrap();
    let limited = RunParameters {
        max_items: Some(2),
        ..params(1)
    };
    first.run(&list, &mut ledger, &limited).await.unwrap();
    assert_eq!(first_shop.fetched().len(), 2);

    // second run starts from the saved ledger with a fresh sink
    let second_shop = Arc::new(FakeShop::default());
    let second = orchestrator(second_shop.clone(), Arc::new(CannedGenerator::default()), Arc::new(MemorySink::new()))
        .with_ledger_store(store.clone());
    let mut ledger = store.load().await.unwrap();
    assert_eq!(ledger.processed_count(), 2);
    let report = second.run(&list, &mut ledger, &params(1)).await.unwrap();

    assert_eq!(report.summary.skipped, 2);
    assert_eq!(report.summary.processed, 3);
    let refetched: BTreeSet<String> = second_shop.fetched().into_iter().collect();
    for done in ["B000000000", "B000000001"] {
        assert!(!refetched.iter().any(|url| url.ends_with(done)));
    }

    // a third run has nothing left to do
    let third_shop = Arc::new(FakeShop::default());
    let third = orchestrator(third_shop.clone(), Arc::new(CannedGenerator::default()), Arc::new(MemorySink::new()));
    let mut ledger = store.load().await.unwrap();
    let report = third.run(&list, &mut ledger, &params(1)).await.unwrap();
    assert_eq!(report.selected, 0);
    assert!(third_shop.fetched().is_empty());
    assert!(ledger.saved_at.is_some());
}

#[tokio::test]
async fn worker_count_does_not_change_the_outcome() {
    let list = ranked(7);
    let mut outcomes = Vec::new();

    for workers in [1, 3] {
        let shop = Arc::new(FakeShop::with_broken(&["B000000002", "B000000005"]));
        let sink = Arc::new(MemorySink::new());
        let orchestrator = orchestrator(shop, Arc::new(CannedGenerator::default()), sink.clone());
        let mut ledger = ProgressLedger::new();

        let report = orchestrator.run(&list, &mut ledger, &params(workers)).await.unwrap();

        let mut stored = sink.stored_ids().await;
        stored.sort();
        let failed: Vec<String> = ledger.failed_ids.keys().cloned().collect();
        outcomes.push((ledger.processed_ids.clone(), failed, stored, ledger.last_index, report.summary.processed));
    }

    assert_eq!(outcomes[0], outcomes[1]);
    assert_eq!(outcomes[0].4, 5);
}

#[tokio::test]
async fn ids_already_in_the_sink_are_skipped_without_fetching() {
    let shop = Arc::new(FakeShop::default());
    let sink = Arc::new(MemorySink::with_existing(["B000000001"]));
    let orchestrator = orchestrator(shop.clone(), Arc::new(CannedGenerator::default()), sink);
    let mut ledger = ProgressLedger::new();

    let report = orchestrator.run(&ranked(3), &mut ledger, &params(2)).await.unwrap();

    assert_eq!(report.summary.skipped, 1);
    assert_eq!(report.summary.processed, 2);
    assert!(ledger.is_processed("B000000001"));
    assert!(!shop.fetched().iter().any(|url| url.ends_with("B000000001")));
}

#[tokio::test]
async fn candidates_below_threshold_are_left_alone() {
    let list: Vec<CandidateProduct> = vec![
        candidate("HIGH000001", 100.0, 1), // 150
        candidate("MID0000001", 80.0, 11), // 84.875
        candidate("LOW0000001", 20.0, 60), // 20
    ];
    let shop = Arc::new(FakeShop::default());
    let orchestrator = orchestrator(shop.clone(), Arc::new(CannedGenerator::default()), Arc::new(MemorySink::new()));
    let mut ledger = ProgressLedger::new();
    let params = RunParameters {
        threshold: 100.0,
        ..params(1)
    };

    let report = orchestrator.run(&list, &mut ledger, &params).await.unwrap();

    assert_eq!(report.selected, 1);
    assert_eq!(report.summary.below_threshold, 2);
    assert_eq!(shop.fetched(), vec!["https://shop.example/dp/HIGH000001".to_string()]);
    assert!(!ledger.is_processed("MID0000001"));
    assert!(!ledger.failed_ids.contains_key("LOW0000001"));
}

#[tokio::test]
async fn sqlite_sink_keeps_one_row_per_product() {
    let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
    db.migrate().await.unwrap();
    let sink = Arc::new(SqliteProductSink::new(Arc::new(db.pool().clone())));
    let list = ranked(3);

    let first = orchestrator(Arc::new(FakeShop::default()), Arc::new(CannedGenerator::default()), sink.clone());
    let mut ledger = ProgressLedger::new();
    first.run(&list, &mut ledger, &params(2)).await.unwrap();
    assert_eq!(sink.count().await.unwrap(), 3);

    // a lost ledger falls back to the sink's existence check
    let shop = Arc::new(FakeShop::default());
    let second = orchestrator(shop.clone(), Arc::new(CannedGenerator::default()), sink.clone());
    let mut fresh = ProgressLedger::new();
    let report = second.run(&list, &mut fresh, &params(2)).await.unwrap();

    assert_eq!(report.summary.skipped, 3);
    assert!(shop.fetched().is_empty());
    assert_eq!(fresh.processed_count(), 3);
    assert_eq!(sink.count().await.unwrap(), 3);
}

#[tokio::test]
async fn file_sink_writes_one_bundle_per_product() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(FileBundleSink::new(dir.path()));
    let orchestrator = orchestrator(Arc::new(FakeShop::default()), Arc::new(CannedGenerator::default()), sink);
    let mut ledger = ProgressLedger::new();

    orchestrator.run(&ranked(2), &mut ledger, &params(1)).await.unwrap();

    for id in ["B000000000", "B000000001"] {
        let bundle = dir.path().join(id);
        assert!(bundle.join("data.json").exists());
        assert!(bundle.join("review.json").exists());
    }
    let data: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("B000000000").join("data.json")).unwrap()).unwrap();
    assert_eq!(data["product"]["title"], "Product B000000000");
}
