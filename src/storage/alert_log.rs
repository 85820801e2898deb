use crate::errors::Result;
use crate::models::{MatchedSecurity, RunSummary};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::warn;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlertLogEntry {
    pub timestamp: String,
    pub run_id: String,
    pub label: String,
    pub checked: usize,
    pub skipped: usize,
    pub matches: Vec<MatchedSecurity>,
    pub notified: usize,
    pub success: bool,
    pub error: Option<String>,
}

pub struct AlertLog {
    log_path: String,
}

impl AlertLog {
    pub fn new(log_path: String) -> Self {
        Self { log_path }
    }

    /// Log a completed run
    pub fn log_run(&self, summary: &RunSummary) -> Result<()> {
        let entry = AlertLogEntry {
            timestamp: Utc::now().to_rfc3339(),
            run_id: summary.run_id.clone(),
            label: summary.label.clone(),
            checked: summary.checked,
            skipped: summary.skipped,
            matches: summary.matches.clone(),
            notified: summary.notified,
            success: true,
            error: None,
        };

        self.write_entry(&entry)
    }

    /// Log a run that aborted before producing a summary
    pub fn log_failed_run(&self, label: &str, error: &str) -> Result<()> {
        let entry = AlertLogEntry {
            timestamp: Utc::now().to_rfc3339(),
            run_id: uuid::Uuid::new_v4().to_string(),
            label: label.to_string(),
            checked: 0,
            skipped: 0,
            matches: Vec::new(),
            notified: 0,
            success: false,
            error: Some(error.to_string()),
        };

        self.write_entry(&entry)
    }

    fn write_entry(&self, entry: &AlertLogEntry) -> Result<()> {
        if let Some(parent) = Path::new(&self.log_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;

        let mut writer = BufWriter::new(file);
        let json = serde_json::to_string(entry)?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;

        Ok(())
    }

    /// Read all log entries, skipping lines that no longer parse
    pub fn read_logs(&self) -> Result<Vec<AlertLogEntry>> {
        if !Path::new(&self.log_path).exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.log_path)?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            match serde_json::from_str::<AlertLogEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping malformed alert log line {}: {}", line_no + 1, e),
            }
        }

        Ok(entries)
    }

    pub fn statistics(&self) -> Result<AlertStatistics> {
        let entries = self.read_logs()?;

        let total_runs = entries.len();
        let failed_runs = entries.iter().filter(|e| !e.success).count();
        let total_matches = entries.iter().map(|e| e.matches.len()).sum();

        Ok(AlertStatistics {
            total_runs,
            failed_runs,
            total_matches,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertStatistics {
    pub total_runs: usize,
    pub failed_runs: usize,
    pub total_matches: usize,
}
