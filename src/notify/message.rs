use crate::models::{MatchedSecurity, SignalKind};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub title: String,
    pub content: String,
}

impl Message {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

fn pct(value: Decimal) -> String {
    format!("{}%", (value * Decimal::from(100)).round_dp(2))
}

/// Alert listing every matched security, fresh breaks first
pub fn format_alert(label: &str, as_of: NaiveDate, matches: &[MatchedSecurity]) -> Message {
    let fresh = matches
        .iter()
        .filter(|m| m.signal == SignalKind::FreshBreak)
        .count();

    let title = if fresh > 0 {
        format!(
            "{}: {} near the annual line ({} fresh {})",
            label,
            matches.len(),
            fresh,
            if fresh == 1 { "break" } else { "breaks" }
        )
    } else {
        format!("{}: {} near the annual line", label, matches.len())
    };

    let mut ordered: Vec<&MatchedSecurity> = matches.iter().collect();
    ordered.sort_by_key(|m| m.signal != SignalKind::FreshBreak);

    let mut content = format!("## {} ({})\n\n", label, as_of);
    content.push_str("| Security | Close | Line | Deviation | Signal |\n");
    content.push_str("|---|---|---|---|---|\n");
    for m in ordered {
        content.push_str(&format!(
            "| {} ({}) | {} | {} | {} | {} |\n",
            m.security.name,
            m.security.code,
            m.snapshot.close.round_dp(2),
            m.snapshot.average.round_dp(2),
            pct(m.snapshot.deviation),
            m.signal,
        ));
    }

    Message::new(title, content)
}

/// Heartbeat sent when nothing matched and empty runs are configured to notify
pub fn format_empty(label: &str, as_of: NaiveDate, checked: usize) -> Message {
    Message::new(
        format!("{}: no matches", label),
        format!(
            "## {} ({})\n\nChecked {} securities, none inside the alert band.\n",
            label, as_of, checked
        ),
    )
}

/// Notification for a run that failed outright
pub fn format_failure(label: &str, error: &str) -> Message {
    Message::new(
        format!("{}: run failed", label),
        format!("The {} run stopped with an error:\n\n```\n{}\n```\n", label, error),
    )
}
