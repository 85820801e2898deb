use crate::models::{AnnualLineSnapshot, PriceBar};
use rust_decimal::Decimal;

/// Sessions in the classic "annual line"
pub const DEFAULT_WINDOW: usize = 250;

/// Mean of the last `window` values, or `None` when there are not enough
pub fn simple_moving_average(closes: &[Decimal], window: usize) -> Option<Decimal> {
    if window == 0 || closes.len() < window {
        return None;
    }
    let sum: Decimal = closes[closes.len() - window..].iter().sum();
    Some(sum / Decimal::from(window))
}

/// Relative distance of `close` from `average`; zero when the average is zero
pub fn deviation(close: Decimal, average: Decimal) -> Decimal {
    if average.is_zero() {
        Decimal::ZERO
    } else {
        (close - average) / average
    }
}

/// Measure the latest bar against the moving average of the trailing `window` closes.
///
/// `bars` must be ascending by date. The previous-session fields are only filled
/// when the history is long enough to compute the window ending one bar earlier.
pub fn snapshot(bars: &[PriceBar], window: usize) -> Option<AnnualLineSnapshot> {
    let closes: Vec<Decimal> = bars.iter().map(|b| b.close).collect();
    let average = simple_moving_average(&closes, window)?;
    let latest = bars.last()?;

    let prev_average = if closes.len() > window {
        simple_moving_average(&closes[..closes.len() - 1], window)
    } else {
        None
    };
    let prev_close = if closes.len() > 1 {
        Some(closes[closes.len() - 2])
    } else {
        None
    };

    Some(AnnualLineSnapshot {
        as_of: latest.date,
        close: latest.close,
        average,
        deviation: deviation(latest.close, average),
        prev_close,
        prev_average,
    })
}
