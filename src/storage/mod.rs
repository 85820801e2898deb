pub mod alert_log;
pub mod price_cache;
pub mod report_export;

pub use alert_log::AlertLog;
pub use price_cache::PriceCache;
pub use report_export::write_csv_report;
