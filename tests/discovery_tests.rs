//! Discovery over HTTP, then the candidate file, then a batch run

mod common;

use common::{CannedGenerator, Reply, TestServer, detail_page, fast_batch_config, fast_fetch_config};
use shelf_scout::application::{BatchOrchestrator, DiscoveryCrawler, EnrichmentGenerator, RunParameters};
use shelf_scout::domain::{PageFetcher, ProgressLedger};
use shelf_scout::infrastructure::config::{DiscoveryConfig, SiteConfig, SourceConfig};
use shelf_scout::infrastructure::{CandidateStore, DetailPageExtractor, HttpClient, ListingParser, MemorySink};
use std::sync::Arc;

fn listing(ids: &[&str], nav: &[(&str, &str)]) -> String {
    let nav: String = nav.iter().map(|(href, text)| format!(r#"<a href="{href}">{text}</a>"#)).collect();
    let items: String = ids
        .iter()
        .map(|id| {
            format!(r#"<div data-asin="{id}"><a href="/item/dp/{id}/ref=zg_bs_1"><span>{id} name</span></a></div>"#)
        })
        .collect();
    format!("<html><body><nav>{nav}</nav>{items}</body></html>")
}

fn source(name: &str, path: &str, weight: f64, nav_pattern: &str, max_pages: u32) -> SourceConfig {
    SourceConfig {
        name: name.to_string(),
        path: path.to_string(),
        weight,
        nav_pattern: nav_pattern.to_string(),
        max_pages,
    }
}

fn discovery_config() -> DiscoveryConfig {
    DiscoveryConfig {
        target_count: 100,
        shuffle_categories: false,
        rate_limit_cooldown_min_ms: 0,
        rate_limit_cooldown_max_ms: 0,
        ..DiscoveryConfig::default()
    }
}

async fn shop_server() -> TestServer {
    let kitchen_nav = [("/gp/bestsellers/kitchen/ref=zg_bs_nav_kitchen_0", "Kitchen")];
    let mut routes = vec![
        ("/bestsellers", vec![Reply::html(200, listing(&["ROOTITEM01", "SHAREDITEM"], &kitchen_nav))]),
        ("/gp/bestsellers/kitchen", vec![Reply::html(200, listing(&["KITCHEN001"], &[]))]),
        ("/gp/bestsellers/kitchen?pg=2", vec![Reply::html(200, listing(&["KITCHEN002"], &[]))]),
        ("/movers", vec![Reply::html(200, listing(&["SHAREDITEM"], &[]))]),
    ];
    let details: Vec<(String, String)> = ["ROOTITEM01", "SHAREDITEM", "KITCHEN001", "KITCHEN002"]
        .iter()
        .map(|id| (format!("/item/dp/{id}"), detail_page(&format!("Item {id}"))))
        .collect();
    for (path, body) in &details {
        routes.push((path.as_str(), vec![Reply::html(200, body.clone())]));
    }
    TestServer::start(routes).await
}

#[tokio::test]
async fn discovered_candidates_flow_into_a_batch_run() {
    let server = shop_server().await;
    let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpClient::new(fast_fetch_config()).unwrap());
    let site = SiteConfig {
        base_url: server.base_url.clone(),
        sources: vec![
            source("movers", "/movers", 50.0, "zg_mv_nav", 1),
            source("bestsellers", "/bestsellers", 100.0, "zg_bs_nav", 2),
        ],
        affiliate_tag: None,
    };
    let crawler = DiscoveryCrawler::new(fetcher.clone(), ListingParser::new().unwrap(), site, discovery_config());

    let report = crawler.discover().await;

    assert_eq!(report.candidates.len(), 4);
    let shared = report.candidates.iter().find(|c| c.id == "SHAREDITEM").unwrap();
    assert_eq!(shared.discovery_source, "bestsellers");
    assert!((shared.priority_score - 145.0).abs() < 1e-9);
    assert_eq!(report.candidates[3].id, "SHAREDITEM");
    let kitchen = report.candidates.iter().find(|c| c.id == "KITCHEN002").unwrap();
    assert_eq!(kitchen.category, "Kitchen");
    assert_eq!(kitchen.rank_in_source, Some(1));
    assert_eq!(kitchen.canonical_url, server.url("/item/dp/KITCHEN002"));
    assert_eq!(server.hits("/gp/bestsellers/kitchen?pg=2"), 1);

    // the candidate file is what a later `run` starts from
    let dir = tempfile::tempdir().unwrap();
    let store = CandidateStore::new(dir.path().join("links.csv"), dir.path().join("links.json"));
    store.write_all(&report.candidates).await.unwrap();
    let loaded = store.load().await.unwrap();
    let loaded_ids: Vec<&str> = loaded.iter().map(|c| c.id.as_str()).collect();
    let discovered_ids: Vec<&str> = report.candidates.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(loaded_ids, discovered_ids);

    let sink = Arc::new(MemorySink::new());
    let orchestrator = BatchOrchestrator::new(
        fetcher,
        Arc::new(DetailPageExtractor::new().unwrap()),
        Arc::new(EnrichmentGenerator::new(Arc::new(CannedGenerator::default()), 200)),
        sink.clone(),
        fast_batch_config(),
    );
    let mut ledger = ProgressLedger::new();
    let params = RunParameters {
        start: 0,
        max_items: None,
        threshold: 100.0,
        workers: 2,
    };

    let run = orchestrator.run(&loaded, &mut ledger, &params).await.unwrap();

    assert_eq!(run.summary.processed, 4);
    assert_eq!(ledger.processed_count(), 4);
    let mut stored = sink.stored_ids().await;
    stored.sort();
    assert_eq!(stored, vec!["KITCHEN001", "KITCHEN002", "ROOTITEM01", "SHAREDITEM"]);
    let record = sink.records().await.into_iter().find(|r| r.id == "KITCHEN001").unwrap();
    assert_eq!(record.product.title, "Item KITCHEN001");
}

#[tokio::test]
async fn throttled_source_is_skipped_and_counted() {
    let server = TestServer::start(vec![
        ("/busy", vec![Reply::html(503, "slow down")]),
        ("/calm", vec![Reply::html(200, listing(&["CALMITEM01"], &[]))]),
    ])
    .await;
    let site = SiteConfig {
        base_url: server.base_url.clone(),
        sources: vec![source("busy", "/busy", 100.0, "", 1), source("calm", "/calm", 10.0, "", 1)],
        affiliate_tag: None,
    };
    let crawler = DiscoveryCrawler::new(
        Arc::new(HttpClient::new(fast_fetch_config()).unwrap()),
        ListingParser::new().unwrap(),
        site,
        discovery_config(),
    );

    let report = crawler.discover().await;

    assert_eq!(report.candidates.len(), 1);
    assert_eq!(report.candidates[0].discovery_source, "calm");
    assert_eq!(report.stats.rate_limited, 1);
    assert_eq!(server.hits("/busy"), 3);
}
