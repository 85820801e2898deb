//! Index constituent resolution.
//!
//! Each configured index is resolved through the configured source. A failed or
//! empty lookup falls back to the index's own `fallback` list, so a flaky
//! upstream never leaves a run with nothing to screen.

use crate::config::{ConstituentsSourceKind, DataConfig, IndexConfig};
use crate::errors::{MonitorError, Result};
use crate::models::Security;
use crate::storage::PriceCache;
use csv::ReaderBuilder;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::{info, warn};

/// Constituent as returned by a remote or file source
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConstituentRecord {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
}

pub struct ConstituentSource {
    kind: ConstituentsSourceKind,
    url_template: Option<String>,
    dir: Option<PathBuf>,
    names: HashMap<String, String>,
    http_client: Client,
}

impl ConstituentSource {
    pub fn new(config: &DataConfig, names: HashMap<String, String>, http_client: Client) -> Self {
        Self {
            kind: config.constituents_source,
            url_template: config.constituents_url.clone(),
            dir: config.constituents_dir.as_ref().map(PathBuf::from),
            names,
            http_client,
        }
    }

    /// Resolve every index, merged in order and deduplicated by code
    pub async fn resolve_all(
        &self,
        indices: &[IndexConfig],
        cache: Option<&PriceCache>,
        max_symbols: Option<usize>,
    ) -> Vec<Security> {
        let mut seen = HashSet::new();
        let mut securities = Vec::new();

        for index in indices {
            let records = self.resolve_index(index, cache).await;
            info!(
                "Index {} resolved to {} constituents",
                index.name.as_deref().unwrap_or(&index.code),
                records.len()
            );
            for record in records {
                if seen.insert(record.code.clone()) {
                    securities.push(self.to_security(record));
                }
            }
        }

        if let Some(limit) = max_symbols {
            if securities.len() > limit {
                info!("Capping screen at {} of {} securities", limit, securities.len());
                securities.truncate(limit);
            }
        }

        securities
    }

    /// Build securities from explicit codes, bypassing index lookup
    pub fn from_codes(&self, codes: &[String]) -> Vec<Security> {
        let mut seen = HashSet::new();
        codes
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty() && seen.insert(c.to_string()))
            .map(|code| {
                self.to_security(ConstituentRecord {
                    code: code.to_string(),
                    name: None,
                })
            })
            .collect()
    }

    async fn resolve_index(
        &self,
        index: &IndexConfig,
        cache: Option<&PriceCache>,
    ) -> Vec<ConstituentRecord> {
        if self.kind == ConstituentsSourceKind::Static {
            return fallback_records(index);
        }

        if let Some(cache) = cache {
            match cache.load_constituents(&index.code) {
                Ok(Some(records)) if !records.is_empty() => return records,
                Ok(_) => {}
                Err(e) => warn!("Ignoring unreadable constituents cache for {}: {}", index.code, e),
            }
        }

        match self.fetch(index).await {
            Ok(records) if !records.is_empty() => {
                if let Some(cache) = cache {
                    if let Err(e) = cache.store_constituents(&index.code, &records) {
                        warn!("Failed to cache constituents for {}: {}", index.code, e);
                    }
                }
                records
            }
            Ok(_) => {
                warn!(
                    "Constituents source returned nothing for {}, using fallback list",
                    index.code
                );
                fallback_records(index)
            }
            Err(e) => {
                warn!(
                    "Failed to fetch constituents for {}, using fallback list: {}",
                    index.code, e
                );
                fallback_records(index)
            }
        }
    }

    async fn fetch(&self, index: &IndexConfig) -> Result<Vec<ConstituentRecord>> {
        match self.kind {
            ConstituentsSourceKind::Static => Ok(fallback_records(index)),
            ConstituentsSourceKind::Http => {
                let template = self.url_template.as_deref().ok_or_else(|| {
                    MonitorError::ConfigError("data.constituents_url is not set".to_string())
                })?;
                let url = template.replace("{index}", &index.code);
                let response = self.http_client.get(&url).send().await?;
                if !response.status().is_success() {
                    return Err(MonitorError::ConstituentsError(format!(
                        "{} returned {}",
                        url,
                        response.status()
                    )));
                }
                let records: Vec<ConstituentRecord> = response.json().await?;
                Ok(records)
            }
            ConstituentsSourceKind::Csv => {
                let dir = self.dir.clone().ok_or_else(|| {
                    MonitorError::ConfigError("data.constituents_dir is not set".to_string())
                })?;
                let path = dir.join(format!("{}.csv", index.code));
                tokio::task::spawn_blocking(move || read_constituents(&path))
                    .await
                    .map_err(|e| MonitorError::Unknown(format!("CSV reader task failed: {}", e)))?
            }
        }
    }

    fn to_security(&self, record: ConstituentRecord) -> Security {
        let name = record
            .name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| self.names.get(&record.code).cloned())
            .unwrap_or_else(|| record.code.clone());
        Security::new(record.code, name)
    }
}

fn fallback_records(index: &IndexConfig) -> Vec<ConstituentRecord> {
    index
        .fallback
        .iter()
        .map(|code| ConstituentRecord {
            code: code.clone(),
            name: None,
        })
        .collect()
}

fn read_constituents(path: &std::path::Path) -> Result<Vec<ConstituentRecord>> {
    let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let mut records = Vec::new();
    for record in reader.deserialize() {
        let record: ConstituentRecord = record?;
        if !record.code.is_empty() {
            records.push(record);
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::symbols::SymbolStyle;
    use crate::models::Exchange;
    use std::fs;

    fn data_config(kind: ConstituentsSourceKind, dir: Option<String>) -> DataConfig {
        DataConfig {
            source: "csv".to_string(),
            constituents_source: kind,
            constituents_url: None,
            constituents_dir: dir,
            history_url: None,
            csv_dir: Some("data".to_string()),
            symbol_style: SymbolStyle::Prefix,
            api_token: None,
            history_days: 400,
        }
    }

    fn index(code: &str, fallback: &[&str]) -> IndexConfig {
        IndexConfig {
            code: code.to_string(),
            name: None,
            fallback: fallback.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_static_merge_dedup_and_names() {
        let mut names = HashMap::new();
        names.insert("601288".to_string(), "Agricultural Bank".to_string());
        let source = ConstituentSource::new(
            &data_config(ConstituentsSourceKind::Static, None),
            names,
            Client::new(),
        );

        let securities = source
            .resolve_all(
                &[
                    index("000922", &["601288", "600028"]),
                    index("000015", &["600028", "000651"]),
                ],
                None,
                None,
            )
            .await;

        let codes: Vec<&str> = securities.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(codes, vec!["601288", "600028", "000651"]);
        assert_eq!(securities[0].name, "Agricultural Bank");
        assert_eq!(securities[1].name, "600028");
        assert_eq!(securities[2].exchange, Exchange::Shenzhen);
    }

    #[tokio::test]
    async fn test_max_symbols_caps_list() {
        let source = ConstituentSource::new(
            &data_config(ConstituentsSourceKind::Static, None),
            HashMap::new(),
            Client::new(),
        );
        let securities = source
            .resolve_all(&[index("000922", &["601288", "600028", "601398"])], None, Some(2))
            .await;
        assert_eq!(securities.len(), 2);
    }

    #[tokio::test]
    async fn test_csv_source_with_fallback() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("000922.csv"),
            "code,name\n601288,Agricultural Bank\n601398,\n",
        )
        .unwrap();

        let source = ConstituentSource::new(
            &data_config(
                ConstituentsSourceKind::Csv,
                Some(dir.path().to_string_lossy().to_string()),
            ),
            HashMap::new(),
            Client::new(),
        );

        let securities = source
            .resolve_all(
                &[index("000922", &["600000"]), index("999999", &["600019"])],
                None,
                None,
            )
            .await;

        let codes: Vec<&str> = securities.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(codes, vec!["601288", "601398", "600019"]);
        assert_eq!(securities[0].name, "Agricultural Bank");
        assert_eq!(securities[1].name, "601398");
    }

    #[test]
    fn test_from_codes() {
        let source = ConstituentSource::new(
            &data_config(ConstituentsSourceKind::Static, None),
            HashMap::new(),
            Client::new(),
        );
        let securities = source.from_codes(&[
            "601288".to_string(),
            " 601288 ".to_string(),
            "".to_string(),
            "000651".to_string(),
        ]);
        assert_eq!(securities.len(), 2);
    }
}
