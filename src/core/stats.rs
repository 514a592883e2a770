use chrono::{DateTime, Utc};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Fire-and-forget telemetry hooks called by the ingestion loop.
pub trait StatsSink: Send + Sync {
    fn on_cycle_complete(&self, at: DateTime<Utc>);
    fn on_item_processed(&self);
    fn on_error(&self);
}

/// Process-wide counters, advisory only. Reset on restart.
pub struct BotStats {
    started: Instant,
    last_scrape: RwLock<Option<DateTime<Utc>>>,
    scrape_count: AtomicU64,
    items_processed: AtomicU64,
    error_count: AtomicU64,
}

/// Point-in-time copy of [`BotStats`] for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub last_scrape: Option<DateTime<Utc>>,
    pub scrape_count: u64,
    pub items_processed: u64,
    pub error_count: u64,
}

impl BotStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            last_scrape: RwLock::new(None),
            scrape_count: AtomicU64::new(0),
            items_processed: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let last_scrape = self.last_scrape.read().map(|g| *g).unwrap_or(None);
        StatsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            last_scrape,
            scrape_count: self.scrape_count.load(Ordering::Relaxed),
            items_processed: self.items_processed.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for BotStats {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsSink for BotStats {
    fn on_cycle_complete(&self, at: DateTime<Utc>) {
        if let Ok(mut last) = self.last_scrape.write() {
            *last = Some(at);
        }
        self.scrape_count.fetch_add(1, Ordering::Relaxed);
    }

    fn on_item_processed(&self) {
        self.items_processed.fetch_add(1, Ordering::Relaxed);
    }

    fn on_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_stats_are_empty() {
        let snap = BotStats::new().snapshot();
        assert_eq!(snap.last_scrape, None);
        assert_eq!(snap.scrape_count, 0);
        assert_eq!(snap.items_processed, 0);
        assert_eq!(snap.error_count, 0);
    }

    #[test]
    fn callbacks_update_counters() {
        let stats = BotStats::new();
        let at = Utc::now();
        stats.on_cycle_complete(at);
        stats.on_cycle_complete(at);
        stats.on_item_processed();
        stats.on_error();

        let snap = stats.snapshot();
        assert_eq!(snap.last_scrape, Some(at));
        assert_eq!(snap.scrape_count, 2);
        assert_eq!(snap.items_processed, 1);
        assert_eq!(snap.error_count, 1);
    }
}
