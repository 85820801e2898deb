//! Price history providers.
//!
//! A provider turns a `Security` and a date range into ascending daily bars.
//! Concrete sources live in sibling modules and are selected from `[data]`.

use crate::config::DataConfig;
use crate::errors::{MonitorError, Result};
use crate::market_data::csv_provider::CsvPriceProvider;
use crate::market_data::http_provider::HttpPriceProvider;
use crate::models::{PriceBar, Security};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Short identifier used in logs
    fn id(&self) -> &'static str;

    /// Daily bars for `security` between `start` and `end`, inclusive
    async fn fetch_history(
        &self,
        security: &Security,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>>;
}

/// Build the provider named by `data.source`
pub fn build_provider(config: &DataConfig, timeout: Duration) -> Result<Arc<dyn PriceProvider>> {
    match config.source.as_str() {
        "http" => {
            let template = config.history_url.clone().ok_or_else(|| {
                MonitorError::ConfigError("data.history_url is not set".to_string())
            })?;
            Ok(Arc::new(HttpPriceProvider::new(
                template,
                config.symbol_style,
                config.api_token.clone(),
                timeout,
            )?))
        }
        "csv" => {
            let dir = config
                .csv_dir
                .clone()
                .ok_or_else(|| MonitorError::ConfigError("data.csv_dir is not set".to_string()))?;
            Ok(Arc::new(CsvPriceProvider::new(dir)))
        }
        other => Err(MonitorError::ConfigError(format!(
            "Unknown data source: {}",
            other
        ))),
    }
}

/// Sort ascending, keep the last bar per date and drop anything outside the range
pub fn normalize_bars(bars: Vec<PriceBar>, start: NaiveDate, end: NaiveDate) -> Vec<PriceBar> {
    let mut by_date = BTreeMap::new();
    for bar in bars {
        if bar.date >= start && bar.date <= end {
            by_date.insert(bar.date, bar);
        }
    }
    by_date.into_values().collect()
}
