use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Listing venue, inferred from the security code
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    Shanghai,
    Shenzhen,
    Other,
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Exchange::Shanghai => write!(f, "SH"),
            Exchange::Shenzhen => write!(f, "SZ"),
            Exchange::Other => write!(f, "--"),
        }
    }
}

/// Index constituent to be screened
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Security {
    pub code: String,
    pub name: String,
    pub exchange: Exchange,
}

impl Security {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        let code = code.into();
        let exchange = crate::market_data::symbols::infer_exchange(&code);
        Self {
            name: name.into(),
            code,
            exchange,
        }
    }
}

/// One daily bar of price history
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default)]
    pub volume: Decimal,
}

/// Latest close measured against its moving average
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AnnualLineSnapshot {
    pub as_of: NaiveDate,
    pub close: Decimal,
    pub average: Decimal,
    pub deviation: Decimal,
    pub prev_close: Option<Decimal>,
    pub prev_average: Option<Decimal>,
}

impl AnnualLineSnapshot {
    pub fn is_below(&self) -> bool {
        self.close < self.average
    }
}

/// How a matched security sits relative to its line
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    FreshBreak,
    BelowLine,
    NearAbove,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::FreshBreak => write!(f, "fresh break"),
            SignalKind::BelowLine => write!(f, "below line"),
            SignalKind::NearAbove => write!(f, "near line"),
        }
    }
}

/// Why a security produced no snapshot
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    NoData,
    InsufficientHistory { bars: usize, required: usize },
    FetchFailed(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoData => write!(f, "no data"),
            SkipReason::InsufficientHistory { bars, required } => {
                write!(f, "insufficient history ({}/{} bars)", bars, required)
            }
            SkipReason::FetchFailed(msg) => write!(f, "fetch failed: {}", msg),
        }
    }
}

/// Per-security outcome of a scan
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScreenEntry {
    Evaluated {
        security: Security,
        snapshot: AnnualLineSnapshot,
        signal: Option<SignalKind>,
    },
    Skipped {
        security: Security,
        reason: SkipReason,
    },
}

impl ScreenEntry {
    pub fn security(&self) -> &Security {
        match self {
            ScreenEntry::Evaluated { security, .. } | ScreenEntry::Skipped { security, .. } => {
                security
            }
        }
    }
}

/// Security that fell inside the alert band
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchedSecurity {
    pub security: Security,
    pub snapshot: AnnualLineSnapshot,
    pub signal: SignalKind,
}

/// Everything a single scan produced, in input order
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub entries: Vec<ScreenEntry>,
}

impl ScanOutcome {
    pub fn checked(&self) -> usize {
        self.entries.len()
    }

    pub fn evaluated(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, ScreenEntry::Evaluated { .. }))
            .count()
    }

    pub fn skipped(&self) -> Vec<(&Security, &SkipReason)> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                ScreenEntry::Skipped { security, reason } => Some((security, reason)),
                _ => None,
            })
            .collect()
    }

    /// Matches ordered by deviation, deepest below the line first
    pub fn matches(&self) -> Vec<MatchedSecurity> {
        let mut matched: Vec<MatchedSecurity> = self
            .entries
            .iter()
            .filter_map(|e| match e {
                ScreenEntry::Evaluated {
                    security,
                    snapshot,
                    signal: Some(signal),
                } => Some(MatchedSecurity {
                    security: security.clone(),
                    snapshot: snapshot.clone(),
                    signal: *signal,
                }),
                _ => None,
            })
            .collect();
        matched.sort_by(|a, b| a.snapshot.deviation.cmp(&b.snapshot.deviation));
        matched
    }
}

/// Summary of one monitor run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub label: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub checked: usize,
    pub evaluated: usize,
    pub skipped: usize,
    pub matches: Vec<MatchedSecurity>,
    pub notified: usize,
}

impl RunSummary {
    pub fn from_outcome(
        label: &str,
        started_at: DateTime<Utc>,
        outcome: &ScanOutcome,
        notified: usize,
    ) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            label: label.to_string(),
            started_at,
            finished_at: Utc::now(),
            checked: outcome.checked(),
            evaluated: outcome.evaluated(),
            skipped: outcome.skipped().len(),
            matches: outcome.matches(),
            notified,
        }
    }

    pub fn format_report(&self) -> String {
        let mut report = format!(
            r#"
╔══════════════════════════════════════════════════════════════╗
║              ANNUAL LINE SCREEN                              ║
╠══════════════════════════════════════════════════════════════╣
║ Run:                 {:>40} ║
║ Finished:            {:>40} ║
║ Securities Checked:  {:>40} ║
║ Evaluated:           {:>40} ║
║ Skipped:             {:>40} ║
║ Matches:             {:>40} ║
║ Notifications Sent:  {:>40} ║
╚══════════════════════════════════════════════════════════════╝
"#,
            self.label,
            self.finished_at.format("%Y-%m-%d %H:%M:%S"),
            self.checked,
            self.evaluated,
            self.skipped,
            self.matches.len(),
            self.notified,
        );

        for m in &self.matches {
            report.push_str(&format!(
                "{}({}): close {}, line {}, deviation {}% [{}]\n",
                m.security.name,
                m.security.code,
                m.snapshot.close.round_dp(2),
                m.snapshot.average.round_dp(2),
                (m.snapshot.deviation * Decimal::from(100)).round_dp(2),
                m.signal,
            ));
        }

        report
    }
}
