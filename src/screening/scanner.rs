use crate::config::FetchConfig;
use crate::errors::{MonitorError, Result};
use crate::market_data::PriceProvider;
use crate::models::{PriceBar, ScanOutcome, ScreenEntry, Security, SkipReason};
use crate::screening::annual_line;
use crate::screening::detector::BandFilter;
use crate::storage::PriceCache;
use chrono::{Duration as ChronoDuration, NaiveDate};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const MAX_BACKOFF_SHIFT: u32 = 6;

/// Spaces out provider calls across all workers
pub struct RequestGate {
    min_gap: Duration,
    last: Mutex<Option<Instant>>,
}

impl RequestGate {
    pub fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            last: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        if self.min_gap.is_zero() {
            return;
        }
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_gap {
                tokio::time::sleep(self.min_gap - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

pub struct Scanner {
    provider: Arc<dyn PriceProvider>,
    cache: Option<Arc<PriceCache>>,
    filter: BandFilter,
    window: usize,
    history_days: i64,
    max_workers: usize,
    max_retries: u32,
    retry_delay: Duration,
    gate: RequestGate,
    today: NaiveDate,
}

impl Scanner {
    pub fn new(
        provider: Arc<dyn PriceProvider>,
        filter: BandFilter,
        window: usize,
        history_days: i64,
        fetch: &FetchConfig,
        today: NaiveDate,
    ) -> Self {
        Self {
            provider,
            cache: None,
            filter,
            window,
            history_days,
            max_workers: fetch.max_workers.max(1),
            max_retries: fetch.max_retries,
            retry_delay: Duration::from_millis(fetch.retry_delay_ms),
            gate: RequestGate::new(Duration::from_millis(fetch.request_interval_ms)),
            today,
        }
    }

    pub fn with_cache(mut self, cache: Arc<PriceCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Screen every security on a bounded worker pool; entries keep input order
    pub async fn scan(&self, securities: Vec<Security>) -> ScanOutcome {
        let total = securities.len();
        info!(
            "Screening {} securities with {} workers via {}",
            total,
            self.max_workers,
            self.provider.id()
        );

        let mut results: Vec<(usize, ScreenEntry)> = stream::iter(securities.into_iter().enumerate())
            .map(|(idx, security)| async move {
                debug!("Checking {}/{}: {}", idx + 1, total, security.code);
                (idx, self.screen_one(security).await)
            })
            .buffer_unordered(self.max_workers)
            .collect()
            .await;

        results.sort_by_key(|(idx, _)| *idx);

        ScanOutcome {
            entries: results.into_iter().map(|(_, entry)| entry).collect(),
        }
    }

    async fn screen_one(&self, security: Security) -> ScreenEntry {
        let bars = match self.load_bars(&security).await {
            Ok(bars) => bars,
            Err(MonitorError::NoData(_)) => {
                warn!("No price data for {}", security.code);
                return ScreenEntry::Skipped {
                    security,
                    reason: SkipReason::NoData,
                };
            }
            Err(e) => {
                warn!("Failed to fetch {}: {}", security.code, e);
                return ScreenEntry::Skipped {
                    security,
                    reason: SkipReason::FetchFailed(e.to_string()),
                };
            }
        };

        let Some(snapshot) = annual_line::snapshot(&bars, self.window) else {
            debug!(
                "{} has {} bars, needs {}",
                security.code,
                bars.len(),
                self.window
            );
            return ScreenEntry::Skipped {
                security,
                reason: SkipReason::InsufficientHistory {
                    bars: bars.len(),
                    required: self.window,
                },
            };
        };

        let signal = self.filter.classify(&snapshot);
        if let Some(kind) = signal {
            info!(
                "  {} {} ({}): close {}, line {}",
                kind,
                security.name,
                security.code,
                snapshot.close.round_dp(2),
                snapshot.average.round_dp(2)
            );
        }

        ScreenEntry::Evaluated {
            security,
            snapshot,
            signal,
        }
    }

    async fn load_bars(&self, security: &Security) -> Result<Vec<PriceBar>> {
        if let Some(ref cache) = self.cache {
            match cache.load_history(&security.code) {
                Ok(Some(bars)) if !bars.is_empty() => return Ok(bars),
                Ok(_) => {}
                Err(e) => warn!("Ignoring cached history for {}: {}", security.code, e),
            }
        }

        let bars = self.fetch_with_retry(security).await?;

        if let Some(ref cache) = self.cache {
            if let Err(e) = cache.store_history(&security.code, &bars) {
                warn!("Failed to cache history for {}: {}", security.code, e);
            }
        }

        Ok(bars)
    }

    async fn fetch_with_retry(&self, security: &Security) -> Result<Vec<PriceBar>> {
        let end = self.today;
        let start = ChronoDuration::try_days(self.history_days)
            .and_then(|span| end.checked_sub_signed(span))
            .ok_or_else(|| {
                MonitorError::ConfigError(format!(
                    "history window of {} days is out of range",
                    self.history_days
                ))
            })?;
        let mut attempts = 0;

        loop {
            self.gate.wait().await;
            match self.provider.fetch_history(security, start, end).await {
                Ok(bars) => return Ok(bars),
                Err(e) if e.is_retryable() && attempts < self.max_retries => {
                    let delay = self.retry_delay * (1u32 << attempts.min(MAX_BACKOFF_SHIFT));
                    attempts += 1;
                    warn!(
                        "Fetch for {} failed (attempt {}/{}): {}; retrying in {:?}",
                        security.code,
                        attempts,
                        self.max_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
