//! Per-run counters and stage timers. Rebuilt on every run, never persisted.

use serde::Serialize;
use std::time::{Duration, Instant};

/// Pipeline stage a timer belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Extract,
    Enrich,
    Persist,
}

/// Accumulated time for one stage and how many times it ran
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTiming {
    pub total: Duration,
    pub samples: u64,
}

impl StageTiming {
    fn add(&mut self, elapsed: Duration) {
        self.total += elapsed;
        self.samples += 1;
    }

    /// Mean seconds per run of the stage
    #[must_use]
    pub fn average_seconds(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.total.as_secs_f64() / self.samples as f64
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunStatistics {
    pub processed: u64,
    pub skipped: u64,
    pub below_threshold: u64,
    pub failed: u64,
    pub ai_calls: u64,
    pub uploads: u64,
    pub already_present: u64,
    pub fetch: StageTiming,
    pub extract: StageTiming,
    pub enrich: StageTiming,
    pub persist: StageTiming,
    started: Instant,
}

impl Default for RunStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStatistics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            processed: 0,
            skipped: 0,
            below_threshold: 0,
            failed: 0,
            ai_calls: 0,
            uploads: 0,
            already_present: 0,
            fetch: StageTiming::default(),
            extract: StageTiming::default(),
            enrich: StageTiming::default(),
            persist: StageTiming::default(),
            started: Instant::now(),
        }
    }

    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        match stage {
            Stage::Fetch => self.fetch.add(elapsed),
            Stage::Extract => self.extract.add(elapsed),
            Stage::Enrich => self.enrich.add(elapsed),
            Stage::Persist => self.persist.add(elapsed),
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Share of attempted candidates that completed, in percent
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let attempted = self.processed + self.failed;
        if attempted == 0 {
            0.0
        } else {
            self.processed as f64 / attempted as f64 * 100.0
        }
    }

    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let elapsed = self.elapsed().as_secs_f64();
        let per_hour = if elapsed > 0.0 {
            self.processed as f64 / elapsed * 3600.0
        } else {
            0.0
        };
        RunSummary {
            processed: self.processed,
            skipped: self.skipped,
            below_threshold: self.below_threshold,
            failed: self.failed,
            ai_calls: self.ai_calls,
            uploads: self.uploads,
            already_present: self.already_present,
            elapsed_seconds: elapsed,
            success_rate: self.success_rate(),
            products_per_hour: per_hour,
            avg_fetch_seconds: self.fetch.average_seconds(),
            avg_extract_seconds: self.extract.average_seconds(),
            avg_enrich_seconds: self.enrich.average_seconds(),
            avg_persist_seconds: self.persist.average_seconds(),
        }
    }
}

/// Serializable snapshot of [`RunStatistics`]
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub processed: u64,
    pub skipped: u64,
    pub below_threshold: u64,
    pub failed: u64,
    pub ai_calls: u64,
    pub uploads: u64,
    pub already_present: u64,
    pub elapsed_seconds: f64,
    pub success_rate: f64,
    pub products_per_hour: f64,
    pub avg_fetch_seconds: f64,
    pub avg_extract_seconds: f64,
    pub avg_enrich_seconds: f64,
    pub avg_persist_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        let mut stats = RunStatistics::new();
        assert!(stats.success_rate().abs() < f64::EPSILON);
        stats.processed = 3;
        stats.failed = 1;
        assert!((stats.success_rate() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_stage_timers_accumulate() {
        let mut stats = RunStatistics::new();
        stats.record(Stage::Fetch, Duration::from_millis(300));
        stats.record(Stage::Fetch, Duration::from_millis(200));
        stats.record(Stage::Enrich, Duration::from_secs(2));
        stats.record(Stage::Enrich, Duration::ZERO);
        stats.processed = 2;

        let summary = stats.summary();
        assert!((summary.avg_fetch_seconds - 0.25).abs() < 1e-9);
        assert!((summary.avg_enrich_seconds - 1.0).abs() < 1e-9);
        assert!(summary.avg_persist_seconds.abs() < f64::EPSILON);
    }

    #[test]
    fn test_failed_fetches_count_toward_fetch_average() {
        let mut stats = RunStatistics::new();
        // two candidates fetched fine, one failed at fetch after a slow timeout
        stats.record(Stage::Fetch, Duration::from_secs(1));
        stats.record(Stage::Fetch, Duration::from_secs(1));
        stats.record(Stage::Fetch, Duration::from_secs(4));
        stats.record(Stage::Extract, Duration::from_millis(100));
        stats.record(Stage::Extract, Duration::from_millis(300));
        stats.processed = 2;
        stats.failed = 1;

        let summary = stats.summary();
        assert!((summary.avg_fetch_seconds - 2.0).abs() < 1e-9);
        assert!((summary.avg_extract_seconds - 0.2).abs() < 1e-9);
        assert_eq!(stats.fetch.samples, 3);
    }
}
