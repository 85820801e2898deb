use crate::config::Config;
use crate::errors::{MonitorError, Result};
use crate::market_data::{build_provider, ConstituentSource, PriceProvider};
use crate::models::{RunSummary, Security};
use crate::notify::{build_notifiers, message, NotifierSet};
use crate::schedule;
use crate::screening::{BandFilter, Scanner};
use crate::storage::{write_csv_report, AlertLog, PriceCache};
use chrono::{Local, NaiveDate, Utc};
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct Monitor {
    config: Config,
    provider: Arc<dyn PriceProvider>,
    constituents: ConstituentSource,
    notifiers: NotifierSet,
    alert_log: AlertLog,
    filter: BandFilter,
    dry_run: bool,
    symbols: Vec<String>,
}

impl Monitor {
    pub fn new(config: Config, dry_run: bool, symbols: Vec<String>) -> Result<Self> {
        let timeout = Duration::from_secs(config.fetch.request_timeout_secs);
        let provider = build_provider(&config.data, timeout)?;
        let http_client = Client::builder().timeout(timeout).build()?;
        let constituents =
            ConstituentSource::new(&config.data, config.names.clone(), http_client);
        let notifiers = build_notifiers(&config.notifications, timeout)?;
        let alert_log = AlertLog::new(config.storage.alert_log.clone());
        let filter = BandFilter::from_config(&config.screening);
        filter.validate()?;

        Ok(Self {
            config,
            provider,
            constituents,
            notifiers,
            alert_log,
            filter,
            dry_run,
            symbols,
        })
    }

    fn label(&self) -> &str {
        &self.config.general.label
    }

    async fn resolve_securities(&self, cache: Option<&PriceCache>) -> Vec<Security> {
        if !self.symbols.is_empty() {
            return self.constituents.from_codes(&self.symbols);
        }
        self.constituents
            .resolve_all(&self.config.indices, cache, self.config.fetch.max_symbols)
            .await
    }

    /// Run one screen for `today` and notify on matches
    pub async fn run_once(&self, today: NaiveDate) -> Result<RunSummary> {
        let started_at = Utc::now();
        info!("Starting {} for {}", self.label(), today);

        let cache = if self.config.cache.enabled {
            let cache = Arc::new(PriceCache::for_day(&self.config.cache.dir, today));
            if let Err(e) = cache.prune(self.config.cache.retention_days) {
                warn!("Failed to prune cache: {}", e);
            }
            Some(cache)
        } else {
            None
        };

        let securities = self.resolve_securities(cache.as_deref()).await;
        if securities.is_empty() {
            return Err(MonitorError::ConstituentsError(
                "No securities to screen".to_string(),
            ));
        }
        info!("Resolved {} securities", securities.len());

        let mut scanner = Scanner::new(
            self.provider.clone(),
            self.filter.clone(),
            self.config.screening.window,
            self.config.data.history_days,
            &self.config.fetch,
            today,
        );
        if let Some(cache) = cache {
            scanner = scanner.with_cache(cache);
        }

        let outcome = scanner.scan(securities).await;

        if outcome.evaluated() == 0 {
            return Err(MonitorError::NoData(format!(
                "none of {} securities produced a usable history",
                outcome.checked()
            )));
        }

        if let Some(ref path) = self.config.storage.csv_report {
            match write_csv_report(Path::new(path), &outcome) {
                Ok(rows) => info!("Wrote {} rows to {}", rows, path),
                Err(e) => warn!("Failed to write CSV report {}: {}", path, e),
            }
        }

        let matches = outcome.matches();
        let as_of = matches
            .iter()
            .map(|m| m.snapshot.as_of)
            .max()
            .unwrap_or(today);
        let notifications = &self.config.notifications;

        let message = if !matches.is_empty() {
            info!("{} securities inside the alert band", matches.len());
            notifications
                .notify_on_match
                .then(|| message::format_alert(self.label(), as_of, &matches))
        } else {
            info!("No securities inside the alert band");
            notifications
                .notify_when_empty
                .then(|| message::format_empty(self.label(), as_of, outcome.checked()))
        };

        let notified = match message {
            Some(message) if self.dry_run => {
                info!("Dry run, not sending: {}", message.title);
                0
            }
            Some(message) => self.notifiers.broadcast(&message).await,
            None => 0,
        };

        let summary = RunSummary::from_outcome(self.label(), started_at, &outcome, notified);
        if let Err(e) = self.alert_log.log_run(&summary) {
            error!("Failed to record run: {}", e);
        }

        Ok(summary)
    }

    /// Run once, print the report, and raise the failure notification on error
    pub async fn run_and_report(&self) -> Result<RunSummary> {
        match self.run_once(Local::now().date_naive()).await {
            Ok(summary) => {
                println!("{}", summary.format_report());
                Ok(summary)
            }
            Err(e) => {
                error!("Run failed: {}", e);
                if let Err(log_err) = self.alert_log.log_failed_run(self.label(), &e.to_string()) {
                    error!("Failed to record failed run: {}", log_err);
                }
                if self.config.notifications.notify_on_error && !self.dry_run {
                    let message = message::format_failure(self.label(), &e.to_string());
                    self.notifiers.broadcast(&message).await;
                }
                Err(e)
            }
        }
    }

    /// Run on the configured daily schedule until interrupted
    pub async fn watch(&self) -> Result<()> {
        let run_at = self.config.schedule.run_at_time()?;

        loop {
            let now = Local::now().naive_local();
            let next = schedule::next_run_after(now, run_at, self.config.schedule.weekdays_only);
            info!("Next run at {}", next);

            tokio::select! {
                _ = tokio::time::sleep(schedule::until(now, next)) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, shutting down");
                    return Ok(());
                }
            }

            // Failures are already logged and notified; keep the schedule alive
            let _ = self.run_and_report().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::message::Message;
    use crate::notify::notifier::Notifier;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::fmt::Write as _;
    use std::fs;
    use std::sync::Mutex;

    /// Keeps the title of every message it receives
    struct RecordingNotifier {
        titles: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, message: &Message) -> Result<()> {
            self.titles.lock().unwrap().push(message.title.clone());
            Ok(())
        }
    }

    fn monitor_with_recorder(
        config: Config,
        dry_run: bool,
        symbols: Vec<String>,
    ) -> (Monitor, Arc<Mutex<Vec<String>>>) {
        let titles = Arc::new(Mutex::new(Vec::new()));
        let mut monitor = Monitor::new(config, dry_run, symbols).unwrap();
        monitor.notifiers.register(Box::new(RecordingNotifier {
            titles: titles.clone(),
        }));
        (monitor, titles)
    }

    fn prices_dir(root: &Path) -> std::path::PathBuf {
        let prices = root.join("prices");
        fs::create_dir_all(&prices).unwrap();
        prices
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 21).unwrap()
    }

    fn write_history(dir: &Path, code: &str, count: usize, base: f64, last: f64) {
        let mut csv = String::from("date,open,high,low,close,volume\n");
        for i in 0..count {
            let date = today() - ChronoDuration::days((count - 1 - i) as i64);
            let close = if i + 1 == count { last } else { base };
            writeln!(csv, "{},{},{},{},{},1000", date, close, close, close, close).unwrap();
        }
        fs::write(dir.join(format!("{}.csv", code)), csv).unwrap();
    }

    fn config_for(root: &Path) -> Config {
        let toml = format!(
            r#"
[general]
mode = "once"
label = "Dividend index"

[[indices]]
code = "000922"
fallback = ["601288", "601398", "600019"]

[names]
"601288" = "Agricultural Bank"

[data]
source = "csv"
csv_dir = "{root}/prices"

[fetch]
max_workers = 2
max_retries = 0
retry_delay_ms = 1
request_interval_ms = 0
request_timeout_secs = 5

[cache]
enabled = true
dir = "{root}/cache"
retention_days = 7

[storage]
alert_log = "{root}/alerts.jsonl"
csv_report = "{root}/report.csv"
"#,
            root = root.display()
        );
        Config::from_toml_str(&toml).unwrap()
    }

    #[tokio::test]
    async fn test_run_once_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let prices = dir.path().join("prices");
        fs::create_dir_all(&prices).unwrap();
        write_history(&prices, "601288", 300, 10.0, 9.7);
        write_history(&prices, "601398", 300, 10.0, 11.0);

        let monitor = Monitor::new(config_for(dir.path()), false, Vec::new()).unwrap();
        let summary = monitor.run_once(today()).await.unwrap();

        assert_eq!(summary.checked, 3);
        assert_eq!(summary.evaluated, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.matches.len(), 1);
        assert_eq!(summary.matches[0].security.name, "Agricultural Bank");
        // Log notifier only
        assert_eq!(summary.notified, 1);

        let logged = AlertLog::new(dir.path().join("alerts.jsonl").to_string_lossy().to_string())
            .read_logs()
            .unwrap();
        assert_eq!(logged.len(), 1);
        assert!(dir.path().join("report.csv").exists());
        assert!(dir.path().join("cache").join("2024-06-21").join("601288.json").exists());
    }

    #[tokio::test]
    async fn test_dry_run_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let prices = dir.path().join("prices");
        fs::create_dir_all(&prices).unwrap();
        write_history(&prices, "601288", 260, 10.0, 9.7);

        let monitor = Monitor::new(config_for(dir.path()), true, vec!["601288".to_string()]).unwrap();
        let summary = monitor.run_once(today()).await.unwrap();

        assert_eq!(summary.checked, 1);
        assert_eq!(summary.matches.len(), 1);
        assert_eq!(summary.notified, 0);
    }

    #[tokio::test]
    async fn test_run_fails_without_any_history() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("prices")).unwrap();

        let monitor = Monitor::new(config_for(dir.path()), true, Vec::new()).unwrap();
        let result = monitor.run_once(today()).await;

        assert!(matches!(result, Err(MonitorError::NoData(_))));
    }

    #[tokio::test]
    async fn test_heartbeat_sent_when_nothing_matches() {
        let dir = tempfile::tempdir().unwrap();
        write_history(&prices_dir(dir.path()), "601398", 260, 10.0, 11.0);
        let mut config = config_for(dir.path());
        config.notifications.notify_when_empty = true;

        let (monitor, titles) = monitor_with_recorder(config, false, vec!["601398".to_string()]);
        let summary = monitor.run_once(today()).await.unwrap();

        assert!(summary.matches.is_empty());
        assert_eq!(summary.notified, 2);
        assert_eq!(*titles.lock().unwrap(), vec!["Dividend index: no matches".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_run_stays_quiet_by_default() {
        let dir = tempfile::tempdir().unwrap();
        write_history(&prices_dir(dir.path()), "601398", 260, 10.0, 11.0);

        let (monitor, titles) =
            monitor_with_recorder(config_for(dir.path()), false, vec!["601398".to_string()]);
        let summary = monitor.run_once(today()).await.unwrap();

        assert_eq!(summary.notified, 0);
        assert!(titles.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_match_alert_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        write_history(&prices_dir(dir.path()), "601288", 260, 10.0, 9.7);
        let mut config = config_for(dir.path());
        config.notifications.notify_on_match = false;

        let (monitor, titles) = monitor_with_recorder(config, false, vec!["601288".to_string()]);
        let summary = monitor.run_once(today()).await.unwrap();

        assert_eq!(summary.matches.len(), 1);
        assert_eq!(summary.notified, 0);
        assert!(titles.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_match_alert_reaches_every_notifier() {
        let dir = tempfile::tempdir().unwrap();
        write_history(&prices_dir(dir.path()), "601288", 260, 10.0, 9.7);

        let (monitor, titles) =
            monitor_with_recorder(config_for(dir.path()), false, vec!["601288".to_string()]);
        let summary = monitor.run_once(today()).await.unwrap();

        assert_eq!(summary.notified, 2);
        let titles = titles.lock().unwrap();
        assert_eq!(titles.len(), 1);
        assert!(titles[0].starts_with("Dividend index: 1 near the annual line"));
    }

    #[tokio::test]
    async fn test_failed_run_is_logged_and_notified() {
        let dir = tempfile::tempdir().unwrap();
        prices_dir(dir.path());

        let (monitor, titles) = monitor_with_recorder(config_for(dir.path()), false, Vec::new());
        let result = monitor.run_and_report().await;

        assert!(matches!(result, Err(MonitorError::NoData(_))));
        assert_eq!(
            *titles.lock().unwrap(),
            vec!["Dividend index: run failed".to_string()]
        );

        let logged = AlertLog::new(dir.path().join("alerts.jsonl").to_string_lossy().to_string())
            .read_logs()
            .unwrap();
        assert_eq!(logged.len(), 1);
        assert!(!logged[0].success);
        assert!(logged[0].error.as_deref().unwrap().contains("usable history"));
    }

    #[tokio::test]
    async fn test_failure_notification_respects_flags() {
        let dir = tempfile::tempdir().unwrap();
        prices_dir(dir.path());

        let (monitor, titles) = monitor_with_recorder(config_for(dir.path()), true, Vec::new());
        assert!(monitor.run_and_report().await.is_err());
        assert!(titles.lock().unwrap().is_empty());

        let mut config = config_for(dir.path());
        config.notifications.notify_on_error = false;
        let (monitor, titles) = monitor_with_recorder(config, false, Vec::new());
        assert!(monitor.run_and_report().await.is_err());
        assert!(titles.lock().unwrap().is_empty());

        // Both failures are still recorded
        let stats = AlertLog::new(dir.path().join("alerts.jsonl").to_string_lossy().to_string())
            .statistics()
            .unwrap();
        assert_eq!(stats.failed_runs, 2);
    }
}
