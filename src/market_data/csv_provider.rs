use crate::errors::{MonitorError, Result};
use crate::market_data::provider::{normalize_bars, PriceProvider};
use crate::models::{PriceBar, Security};
use async_trait::async_trait;
use chrono::NaiveDate;
use csv::ReaderBuilder;
use std::path::{Path, PathBuf};

/// Reads `{dir}/{code}.csv` files with a `date,open,high,low,close,volume` header
pub struct CsvPriceProvider {
    dir: PathBuf,
}

impl CsvPriceProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, security: &Security) -> PathBuf {
        self.dir.join(format!("{}.csv", security.code))
    }
}

pub fn read_bars(path: &Path) -> Result<Vec<PriceBar>> {
    let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let mut bars = Vec::new();
    for record in reader.deserialize() {
        bars.push(record?);
    }
    Ok(bars)
}

#[async_trait]
impl PriceProvider for CsvPriceProvider {
    fn id(&self) -> &'static str {
        "csv"
    }

    async fn fetch_history(
        &self,
        security: &Security,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>> {
        let path = self.path_for(security);
        if !path.exists() {
            return Err(MonitorError::NoData(security.code.clone()));
        }

        let bars = tokio::task::spawn_blocking(move || read_bars(&path))
            .await
            .map_err(|e| MonitorError::Unknown(format!("CSV reader task failed: {}", e)))??;

        let bars = normalize_bars(bars, start, end);
        if bars.is_empty() {
            return Err(MonitorError::NoData(security.code.clone()));
        }
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::fs;

    #[tokio::test]
    async fn test_reads_history_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("601288.csv"),
            "date,open,high,low,close,volume\n\
             2024-06-19,4.40,4.45,4.38,4.42,1000\n\
             2024-06-20,4.42,4.50,4.41,4.48,1200\n\
             2024-06-21,4.48,4.52,4.44,4.46,900\n",
        )
        .unwrap();

        let provider = CsvPriceProvider::new(dir.path());
        let security = Security::new("601288", "Agricultural Bank");
        let bars = provider
            .fetch_history(
                &security,
                NaiveDate::from_ymd_opt(2024, 6, 20).unwrap(),
                NaiveDate::from_ymd_opt(2024, 6, 21).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, dec!(4.48));
        assert_eq!(bars[1].close, dec!(4.46));
    }

    #[tokio::test]
    async fn test_missing_file_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CsvPriceProvider::new(dir.path());
        let security = Security::new("600019", "Baosteel");

        let result = provider
            .fetch_history(
                &security,
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 6, 21).unwrap(),
            )
            .await;

        assert!(matches!(result, Err(MonitorError::NoData(code)) if code == "600019"));
    }
}
