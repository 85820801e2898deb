use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Weekday};

/// Next wall-clock time strictly after `now` at `run_at`, optionally skipping weekends
pub fn next_run_after(now: NaiveDateTime, run_at: NaiveTime, weekdays_only: bool) -> NaiveDateTime {
    let mut candidate = now.date().and_time(run_at);
    if candidate <= now {
        candidate += Duration::days(1);
    }
    if weekdays_only {
        while matches!(candidate.weekday(), Weekday::Sat | Weekday::Sun) {
            candidate += Duration::days(1);
        }
    }
    candidate
}

/// Time left until `next`, zero if it has already passed
pub fn until(now: NaiveDateTime, next: NaiveDateTime) -> std::time::Duration {
    (next - now).to_std().unwrap_or_default()
}
