use crate::models::{Exchange, Security};
use serde::{Deserialize, Serialize};

/// How a provider expects exchange information in its symbols
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SymbolStyle {
    /// `sh600000`, `sz000001`
    #[default]
    Prefix,
    /// `600000.SS`, `000001.SZ`
    Suffix,
    /// `600000`
    Plain,
}

/// Infer the listing venue from an A-share style code
pub fn infer_exchange(code: &str) -> Exchange {
    match code.chars().next() {
        Some('6') => Exchange::Shanghai,
        Some('0') | Some('3') => Exchange::Shenzhen,
        _ => Exchange::Other,
    }
}

/// Render a security code the way a provider expects it
pub fn provider_symbol(security: &Security, style: SymbolStyle) -> String {
    match (style, security.exchange) {
        (SymbolStyle::Prefix, Exchange::Shanghai) => format!("sh{}", security.code),
        (SymbolStyle::Prefix, Exchange::Shenzhen) => format!("sz{}", security.code),
        (SymbolStyle::Suffix, Exchange::Shanghai) => format!("{}.SS", security.code),
        (SymbolStyle::Suffix, Exchange::Shenzhen) => format!("{}.SZ", security.code),
        _ => security.code.clone(),
    }
}
