pub mod constituents;
pub mod csv_provider;
pub mod http_provider;
pub mod provider;
pub mod symbols;

pub use constituents::ConstituentSource;
pub use provider::{build_provider, PriceProvider};
