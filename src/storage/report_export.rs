use crate::errors::Result;
use crate::models::{ScanOutcome, ScreenEntry};
use csv::Writer;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    code: &'a str,
    name: &'a str,
    exchange: String,
    as_of: Option<String>,
    close: Option<Decimal>,
    average: Option<Decimal>,
    deviation_pct: Option<Decimal>,
    matched: bool,
    signal: Option<String>,
    skip_reason: Option<String>,
}

/// Write one CSV row per scanned security
pub fn write_csv_report(path: &Path, outcome: &ScanOutcome) -> Result<usize> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = Writer::from_path(path)?;
    for entry in &outcome.entries {
        let security = entry.security();
        let row = match entry {
            ScreenEntry::Evaluated {
                snapshot, signal, ..
            } => ReportRow {
                code: &security.code,
                name: &security.name,
                exchange: security.exchange.to_string(),
                as_of: Some(snapshot.as_of.to_string()),
                close: Some(snapshot.close),
                average: Some(snapshot.average.round_dp(4)),
                deviation_pct: Some((snapshot.deviation * Decimal::from(100)).round_dp(2)),
                matched: signal.is_some(),
                signal: signal.map(|s| s.to_string()),
                skip_reason: None,
            },
            ScreenEntry::Skipped { reason, .. } => ReportRow {
                code: &security.code,
                name: &security.name,
                exchange: security.exchange.to_string(),
                as_of: None,
                close: None,
                average: None,
                deviation_pct: None,
                matched: false,
                signal: None,
                skip_reason: Some(reason.to_string()),
            },
        };
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(outcome.entries.len())
}
