use crate::config::ScreeningConfig;
use crate::errors::{MonitorError, Result};
use crate::models::{AnnualLineSnapshot, SignalKind};
use rust_decimal::Decimal;

/// Deviation band around the annual line that triggers an alert
#[derive(Clone, Debug)]
pub struct BandFilter {
    pub lower: Decimal,
    pub upper: Decimal,
    pub upper_inclusive: bool,
}

impl BandFilter {
    pub fn new(lower: Decimal, upper: Decimal) -> Self {
        Self {
            lower,
            upper,
            upper_inclusive: false,
        }
    }

    pub fn from_config(config: &ScreeningConfig) -> Self {
        Self::new(config.lower_band, config.upper_band).with_upper_inclusive(config.upper_inclusive)
    }

    pub fn with_upper_inclusive(mut self, inclusive: bool) -> Self {
        self.upper_inclusive = inclusive;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.lower > self.upper {
            return Err(MonitorError::ConfigError(format!(
                "Band lower bound {} exceeds upper bound {}",
                self.lower, self.upper
            )));
        }
        Ok(())
    }

    /// Check if a snapshot's deviation falls inside the band
    pub fn matches(&self, snapshot: &AnnualLineSnapshot) -> bool {
        let d = snapshot.deviation;
        if d < self.lower {
            return false;
        }
        if self.upper_inclusive {
            d <= self.upper
        } else {
            d < self.upper
        }
    }

    /// Signal for a snapshot inside the band, `None` otherwise
    pub fn classify(&self, snapshot: &AnnualLineSnapshot) -> Option<SignalKind> {
        if !self.matches(snapshot) {
            return None;
        }

        if !snapshot.is_below() {
            return Some(SignalKind::NearAbove);
        }

        match (snapshot.prev_close, snapshot.prev_average) {
            (Some(prev_close), Some(prev_average)) if prev_close >= prev_average => {
                Some(SignalKind::FreshBreak)
            }
            _ => Some(SignalKind::BelowLine),
        }
    }
}

impl Default for BandFilter {
    fn default() -> Self {
        Self::from_config(&ScreeningConfig::default())
    }
}
