//! Batch orchestrator
//!
//! Selects candidates from the ranked list, then runs each through
//! fetch → extract → enrich → persist on a small pool of workers that pull
//! from one shared queue, highest priority first. Candidates dropped during
//! selection are only counted; selected ones move through
//! `pending → processing → completed | failed`.
//!
//! The progress ledger, the run statistics and the task table are shared
//! behind `tokio::sync::Mutex`. The ledger is checkpointed every
//! `batch_size` finished candidates and once more when the run ends.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::enrichment::EnrichmentGenerator;
use crate::domain::{
    CandidateProduct, ExtractionFailure, FetchFailure, InsertOutcome, Locale, PageFetcher, PersistenceFailure,
    ProductExtractor, ProductRecord, ProductSink, ProgressLedger, RunStatistics, RunSummary, Stage,
};
use crate::infrastructure::config::BatchConfig;
use crate::infrastructure::ledger_store::{LedgerError, LedgerStore};
use crate::infrastructure::retry_policy::DelayRange;

/// Per-run inputs
#[derive(Debug, Clone, PartialEq)]
pub struct RunParameters {
    /// Position in the ranked list where scanning starts
    pub start: usize,
    /// Stop selecting after this many candidates; `None` selects all
    pub max_items: Option<usize>,
    pub threshold: f64,
    pub workers: usize,
}

impl RunParameters {
    #[must_use]
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            start: 0,
            max_items: None,
            threshold: config.priority_threshold,
            workers: config.max_workers.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed(String),
}

/// A selected candidate and what happened to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    /// Position in the ranked candidate list
    pub index: usize,
    pub id: String,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Finished,
    RateLimited,
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub selected: usize,
    pub stop_reason: StopReason,
    pub summary: RunSummary,
    pub tasks: Vec<TaskRecord>,
}

impl RunReport {
    #[must_use]
    pub fn count(&self, wanted: impl Fn(&TaskStatus) -> bool) -> usize {
        self.tasks.iter().filter(|t| wanted(&t.status)).count()
    }
}

/// Why a single candidate failed
#[derive(Error, Debug)]
pub enum CandidateError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchFailure),

    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractionFailure),

    #[error("persistence failed: {0}")]
    Persist(#[from] PersistenceFailure),
}

impl CandidateError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Fetch(failure) if failure.is_rate_limited())
    }
}

/// Shared state of one run
struct RunState {
    queue: Mutex<VecDeque<(usize, CandidateProduct)>>,
    ledger: Mutex<ProgressLedger>,
    stats: Mutex<RunStatistics>,
    tasks: Mutex<Vec<TaskRecord>>,
    progress: Mutex<Progress>,
    stop: CancellationToken,
}

#[derive(Debug, Default)]
struct Progress {
    finished: usize,
    consecutive_rate_limited: u32,
    aborted_for_rate_limit: bool,
}

pub struct BatchOrchestrator {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn ProductExtractor>,
    enricher: Arc<EnrichmentGenerator>,
    sink: Arc<dyn ProductSink>,
    ledger_store: Option<LedgerStore>,
    config: BatchConfig,
    locales: Vec<Locale>,
    affiliate_tag: Option<String>,
    cancel: CancellationToken,
}

impl BatchOrchestrator {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn ProductExtractor>,
        enricher: Arc<EnrichmentGenerator>,
        sink: Arc<dyn ProductSink>,
        config: BatchConfig,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            enricher,
            sink,
            ledger_store: None,
            config,
            locales: vec![Locale::En, Locale::Ar],
            affiliate_tag: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Persist the ledger through `store`; without one the ledger stays in memory
    #[must_use]
    pub fn with_ledger_store(mut self, store: LedgerStore) -> Self {
        self.ledger_store = Some(store);
        self
    }

    #[must_use]
    pub fn with_locales(mut self, locales: Vec<Locale>) -> Self {
        self.locales = locales;
        self
    }

    #[must_use]
    pub fn with_affiliate_tag(mut self, tag: Option<String>) -> Self {
        self.affiliate_tag = tag;
        self
    }

    /// Token that stops scheduling new candidates when cancelled
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Process `candidates` (ranked, highest first) against `ledger`.
    ///
    /// The ledger is updated in place even when the final save fails.
    pub async fn run(
        &self,
        candidates: &[CandidateProduct],
        ledger: &mut ProgressLedger,
        params: &RunParameters,
    ) -> Result<RunReport, LedgerError> {
        let run_id = Uuid::new_v4();
        let mut stats = RunStatistics::new();
        let selected = self.select(candidates, ledger, params, &mut stats).await;

        info!("📊 Run {}: {} candidates to process", run_id, selected.len());
        info!("   Skipped (stored or processed): {}", stats.skipped);
        info!("   Below threshold {}: {}", params.threshold, stats.below_threshold);

        let tasks = selected
            .iter()
            .map(|(index, c)| TaskRecord {
                index: *index,
                id: c.id.clone(),
                status: TaskStatus::Pending,
            })
            .collect();

        let state = RunState {
            queue: Mutex::new(selected.iter().cloned().enumerate().map(|(slot, (_, c))| (slot, c)).collect()),
            ledger: Mutex::new(std::mem::take(ledger)),
            stats: Mutex::new(stats),
            tasks: Mutex::new(tasks),
            progress: Mutex::new(Progress::default()),
            stop: self.cancel.child_token(),
        };

        if !selected.is_empty() {
            let workers = params.workers.max(1).min(selected.len());
            info!("🚀 Starting {} worker(s)", workers);
            let futures = (0..workers).map(|worker| self.worker(worker, &state, &selected));
            futures::future::join_all(futures).await;
        }

        let saved = self.save_ledger(&state).await;

        let progress = state.progress.into_inner();
        let unscheduled = state.queue.into_inner().len();
        let stop_reason = if progress.aborted_for_rate_limit {
            StopReason::RateLimited
        } else if unscheduled > 0 && self.cancel.is_cancelled() {
            StopReason::Interrupted
        } else {
            StopReason::Finished
        };

        *ledger = state.ledger.into_inner();
        saved?;

        let summary = state.stats.into_inner().summary();
        log_summary(&summary, stop_reason);

        Ok(RunReport {
            run_id,
            selected: selected.len(),
            stop_reason,
            summary,
            tasks: state.tasks.into_inner(),
        })
    }

    /// Scan from `params.start` and pick candidates to process
    async fn select(
        &self,
        candidates: &[CandidateProduct],
        ledger: &mut ProgressLedger,
        params: &RunParameters,
        stats: &mut RunStatistics,
    ) -> Vec<(usize, CandidateProduct)> {
        let limit = params.max_items.unwrap_or(usize::MAX);
        let chunk_size = self.config.existence_check_chunk.max(1);
        let mut selected = Vec::new();
        let mut seen = HashSet::new();

        if params.start >= candidates.len() {
            return selected;
        }

        let indexed: Vec<(usize, &CandidateProduct)> = candidates.iter().enumerate().skip(params.start).collect();
        for chunk in indexed.chunks(chunk_size) {
            if selected.len() >= limit {
                break;
            }

            let ids: Vec<String> = chunk
                .iter()
                .filter(|(_, c)| !ledger.is_processed(&c.id))
                .map(|(_, c)| c.id.clone())
                .collect();
            let stored = if ids.is_empty() {
                HashSet::new()
            } else {
                self.sink.existing_ids(&ids).await.unwrap_or_else(|e| {
                    warn!("⚠️ Existence check failed, assuming none stored: {}", e);
                    HashSet::new()
                })
            };

            for &(index, candidate) in chunk {
                if selected.len() >= limit {
                    break;
                }
                if !seen.insert(candidate.id.as_str()) {
                    continue;
                }
                if stored.contains(&candidate.id) {
                    ledger.mark_processed(&candidate.id);
                    stats.skipped += 1;
                } else if ledger.is_processed(&candidate.id) {
                    stats.skipped += 1;
                } else if candidate.priority_score < params.threshold {
                    stats.below_threshold += 1;
                } else {
                    selected.push((index, candidate.clone()));
                }
            }
        }

        selected
    }

    async fn worker(&self, worker: usize, state: &RunState, selected: &[(usize, CandidateProduct)]) {
        let pacing = DelayRange::new(self.config.min_delay_ms, self.config.max_delay_ms);

        loop {
            if state.stop.is_cancelled() {
                break;
            }
            let Some((slot, candidate)) = state.queue.lock().await.pop_front() else {
                break;
            };

            tokio::select! {
                () = tokio::time::sleep(pacing.sample()) => {}
                () = state.stop.cancelled() => {
                    state.queue.lock().await.push_front((slot, candidate));
                    break;
                }
            }

            let index = selected[slot].0;
            state.tasks.lock().await[slot].status = TaskStatus::Processing;
            info!(
                "📦 [worker {}] [{:.0}] {} - {}",
                worker,
                candidate.priority_score,
                candidate.id,
                candidate.title.chars().take(40).collect::<String>()
            );

            let result = self.process(&candidate, state).await;
            self.finish(state, slot, index, &candidate, result).await;
        }
    }

    /// fetch → extract → enrich → persist for one candidate
    async fn process(&self, candidate: &CandidateProduct, state: &RunState) -> Result<InsertOutcome, CandidateError> {
        let started = Instant::now();
        let page = self.fetcher.fetch(&candidate.canonical_url).await;
        state.stats.lock().await.record(Stage::Fetch, started.elapsed());
        let page = page?;

        let started = Instant::now();
        let product = self.extractor.extract(&page, &candidate.id);
        state.stats.lock().await.record(Stage::Extract, started.elapsed());
        let product = product?;
        info!("     ✓ Scraped: {}", product.title.chars().take(40).collect::<String>());

        let started = Instant::now();
        let mut contents = Vec::with_capacity(self.locales.len());
        for locale in &self.locales {
            contents.push(self.enricher.generate(&product, *locale).await);
            state.stats.lock().await.ai_calls += 1;
        }
        state.stats.lock().await.record(Stage::Enrich, started.elapsed());
        if let Some(first) = contents.first() {
            info!("     ✓ Enriched: score {}/100 ({:?})", first.overall_score, first.origin);
        }

        let record = ProductRecord::assemble(
            product,
            contents,
            self.affiliate_tag.as_deref(),
            candidate.priority_score,
        );

        let started = Instant::now();
        let outcome = self.sink.insert_if_absent(&record).await;
        state.stats.lock().await.record(Stage::Persist, started.elapsed());
        Ok(outcome?)
    }

    async fn finish(
        &self,
        state: &RunState,
        slot: usize,
        index: usize,
        candidate: &CandidateProduct,
        result: Result<InsertOutcome, CandidateError>,
    ) {
        let rate_limited = matches!(&result, Err(e) if e.is_rate_limited());
        let status = {
            let mut ledger = state.ledger.lock().await;
            let mut stats = state.stats.lock().await;
            let status = match result {
                Ok(outcome) => {
                    ledger.mark_processed(&candidate.id);
                    stats.processed += 1;
                    match outcome {
                        InsertOutcome::Inserted => stats.uploads += 1,
                        InsertOutcome::AlreadyPresent => stats.already_present += 1,
                    }
                    info!("     ✓ Stored {} ({:?})", candidate.id, outcome);
                    TaskStatus::Completed
                }
                Err(e) => {
                    let message = e.to_string();
                    error!("     ❌ {} failed: {}", candidate.id, message);
                    ledger.mark_failed(&candidate.id, message.clone(), candidate.canonical_url.clone());
                    stats.failed += 1;
                    TaskStatus::Failed(message)
                }
            };
            ledger.update_index(index);
            status
        };
        state.tasks.lock().await[slot].status = status;

        let checkpoint = {
            let mut progress = state.progress.lock().await;
            progress.finished += 1;
            if rate_limited {
                progress.consecutive_rate_limited += 1;
            } else {
                progress.consecutive_rate_limited = 0;
            }

            let limit = self.config.abort_after_rate_limited;
            if limit > 0 && progress.consecutive_rate_limited >= limit && !progress.aborted_for_rate_limit {
                warn!("🛑 {} consecutive rate-limited fetches, stopping the run", progress.consecutive_rate_limited);
                progress.aborted_for_rate_limit = true;
                state.stop.cancel();
            }

            let batch_size = self.config.batch_size.max(1);
            (progress.finished % batch_size == 0).then_some(progress.finished)
        };

        if let Some(finished) = checkpoint {
            if let Err(e) = self.save_ledger(state).await {
                error!("Checkpoint save failed: {}", e);
            }
            let summary = state.stats.lock().await.summary();
            info!(
                "📊 Progress: {} finished | {:.0}/hour | success {:.1}%",
                finished, summary.products_per_hour, summary.success_rate
            );
        }
    }

    async fn save_ledger(&self, state: &RunState) -> Result<(), LedgerError> {
        match &self.ledger_store {
            Some(store) => store.save(&mut *state.ledger.lock().await).await,
            None => Ok(()),
        }
    }
}

fn log_summary(summary: &RunSummary, stop_reason: StopReason) {
    match stop_reason {
        StopReason::Finished => info!("🎉 Batch complete"),
        StopReason::RateLimited => warn!("🛑 Batch stopped: rate limited"),
        StopReason::Interrupted => warn!("🛑 Batch stopped: interrupted"),
    }
    info!("   ✅ Processed: {}", summary.processed);
    info!("   ⏭️ Skipped:   {}", summary.skipped);
    info!("   ❌ Failed:    {}", summary.failed);
    info!("   Uploads: {} (already present {})", summary.uploads, summary.already_present);
    info!("   Generator calls: {}", summary.ai_calls);
    info!(
        "   Time {:.1}s | {:.0}/hour | success {:.1}%",
        summary.elapsed_seconds, summary.products_per_hour, summary.success_rate
    );
    info!(
        "   Avg fetch {:.2}s | extract {:.2}s | enrich {:.2}s | persist {:.2}s",
        summary.avg_fetch_seconds, summary.avg_extract_seconds, summary.avg_enrich_seconds, summary.avg_persist_seconds
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EnrichmentFailure, FetchedPage, RankBonusConfig, TextGenerator};
    use crate::infrastructure::memory_sink::MemorySink;
    use crate::infrastructure::parsing::DetailPageExtractor;
    use async_trait::async_trait;

    struct Pages {
        rate_limited: bool,
    }

    #[async_trait]
    impl PageFetcher for Pages {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchFailure> {
            if self.rate_limited {
                return Err(FetchFailure::RateLimited {
                    url: url.to_string(),
                    status: 503,
                    attempts: 3,
                });
            }
            Ok(FetchedPage::new(url, r#"<html><span id="productTitle">Kettle</span></html>"#))
        }

        async fn fetch_bytes(&self, _url: &str) -> Result<Vec<u8>, FetchFailure> {
            Ok(Vec::new())
        }
    }

    struct Silent;

    #[async_trait]
    impl TextGenerator for Silent {
        async fn complete(&self, _prompt: &str) -> Result<String, EnrichmentFailure> {
            Err(EnrichmentFailure::Unreachable("offline".into()))
        }
    }

    fn config() -> BatchConfig {
        BatchConfig {
            batch_size: 2,
            min_delay_ms: 0,
            max_delay_ms: 0,
            abort_after_rate_limited: 2,
            existence_check_chunk: 2,
            ..BatchConfig::default()
        }
    }

    fn orchestrator(fetcher: Pages, sink: Arc<MemorySink>) -> BatchOrchestrator {
        BatchOrchestrator::new(
            Arc::new(fetcher),
            Arc::new(DetailPageExtractor::new().unwrap()),
            Arc::new(EnrichmentGenerator::new(Arc::new(Silent), 200)),
            sink,
            config(),
        )
    }

    fn candidates(n: usize) -> Vec<CandidateProduct> {
        (0..n)
            .map(|i| {
                let id = format!("B00000000{i}");
                CandidateProduct::observed(
                    &id,
                    format!("https://shop.example/dp/{id}"),
                    "bestsellers",
                    100.0 - i as f64,
                    Some(1),
                    &RankBonusConfig::default(),
                )
            })
            .collect()
    }

    fn params(threshold: f64) -> RunParameters {
        RunParameters {
            start: 0,
            max_items: None,
            threshold,
            workers: 1,
        }
    }

    #[tokio::test]
    async fn test_selection_order_of_skip_rules() {
        let sink = Arc::new(MemorySink::with_existing(["B000000000"]));
        let orchestrator = orchestrator(Pages { rate_limited: false }, sink.clone());
        let list = candidates(4);
        let mut ledger = ProgressLedger::new();
        ledger.mark_processed("B000000001");

        // B000000003 scores 147 with the rank bonus; threshold drops it
        let report = orchestrator.run(&list, &mut ledger, &params(147.5)).await.unwrap();

        assert_eq!(report.selected, 1);
        assert_eq!(report.summary.skipped, 2);
        assert_eq!(report.summary.below_threshold, 1);
        assert_eq!(report.summary.processed, 1);
        assert_eq!(report.summary.ai_calls, 2);
        assert!(ledger.is_processed("B000000000"));
        assert!(ledger.is_processed("B000000002"));
        assert_eq!(ledger.last_index, 2);
        assert_eq!(sink.stored_ids().await, vec!["B000000002"]);
    }

    #[tokio::test]
    async fn test_max_items_and_start_offset() {
        let orchestrator = orchestrator(Pages { rate_limited: false }, Arc::new(MemorySink::new()));
        let list = candidates(6);
        let mut ledger = ProgressLedger::new();
        let params = RunParameters {
            start: 2,
            max_items: Some(3),
            ..params(0.0)
        };

        let report = orchestrator.run(&list, &mut ledger, &params).await.unwrap();

        let ids: Vec<_> = report.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["B000000002", "B000000003", "B000000004"]);
        assert_eq!(ledger.last_index, 4);
    }

    #[tokio::test]
    async fn test_consecutive_rate_limits_abort_the_run() {
        let orchestrator = orchestrator(Pages { rate_limited: true }, Arc::new(MemorySink::new()));
        let list = candidates(5);
        let mut ledger = ProgressLedger::new();

        let report = orchestrator.run(&list, &mut ledger, &params(0.0)).await.unwrap();

        assert_eq!(report.stop_reason, StopReason::RateLimited);
        assert_eq!(report.summary.failed, 2);
        assert_eq!(report.count(|s| *s == TaskStatus::Pending), 3);
        assert_eq!(ledger.failed_count(), 2);
        assert!(ledger.failed_ids["B000000000"].error.contains("rate limited"));
    }

    #[tokio::test]
    async fn test_cancelled_run_schedules_nothing() {
        let orchestrator = orchestrator(Pages { rate_limited: false }, Arc::new(MemorySink::new()));
        orchestrator.cancellation_token().cancel();
        let mut ledger = ProgressLedger::new();

        let report = orchestrator.run(&candidates(3), &mut ledger, &params(0.0)).await.unwrap();

        assert_eq!(report.stop_reason, StopReason::Interrupted);
        assert_eq!(report.summary.processed, 0);
        assert_eq!(ledger.processed_count(), 0);
    }

    #[tokio::test]
    async fn test_ledger_is_saved_at_end() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("progress.json"));
        let orchestrator =
            orchestrator(Pages { rate_limited: false }, Arc::new(MemorySink::new())).with_ledger_store(store.clone());
        let mut ledger = ProgressLedger::new();

        orchestrator.run(&candidates(3), &mut ledger, &params(0.0)).await.unwrap();

        let saved = store.load().await.unwrap();
        assert_eq!(saved.processed_ids, ledger.processed_ids);
        assert_eq!(saved.processed_count(), 3);
    }
}
