/// Validates ORB breakout conditions every 30s within the collection
/// window (§4.3, C5).
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::types::{Bar, FeatureBundle, OpeningRange, RawSignal, Side, Symbol};

/// 10bp buffer above the opening-range high required for a breakout.
const BREAKOUT_BUFFER: f64 = 1.001;

/// Checks the three bullish breakout conditions (§4.3). Symmetric SHORT
/// rules are the mirror image but are never called in the baseline
/// configuration (§9 open question: no call-site enables them).
pub fn breaks_out_long(current_price: f64, orb: &OpeningRange, previous_bar: &Bar) -> bool {
    let above_orb_high = current_price >= orb.high * BREAKOUT_BUFFER;
    let prior_bar_confirmed = previous_bar.close > orb.high;
    let prior_bar_green = previous_bar.close > previous_bar.open;
    above_orb_high && prior_bar_confirmed && prior_bar_green
}

pub fn breaks_out_short(current_price: f64, orb: &OpeningRange, previous_bar: &Bar) -> bool {
    let below_orb_low = current_price <= orb.low / BREAKOUT_BUFFER;
    let prior_bar_confirmed = previous_bar.close < orb.low;
    let prior_bar_red = previous_bar.close < previous_bar.open;
    below_orb_low && prior_bar_confirmed && prior_bar_red
}

/// Tracks the most recent signal per symbol so a later scan updates the
/// feature bundle on an already-emitted signal rather than creating a
/// duplicate (§4.3 "at most one signal per symbol per day").
#[derive(Default)]
pub struct SignalGenerator {
    emitted: HashMap<Symbol, RawSignal>,
}

impl SignalGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates one symbol for this scan. Returns the (possibly updated)
    /// signal if the breakout conditions hold or were already met earlier
    /// in the day; `None` if no signal exists yet and none is generated now.
    pub fn scan_symbol(
        &mut self,
        symbol: &str,
        current_price: f64,
        orb: &OpeningRange,
        previous_bar: &Bar,
        features: FeatureBundle,
        now: DateTime<Utc>,
        allow_short: bool,
    ) -> Option<&RawSignal> {
        if let Some(existing) = self.emitted.get_mut(symbol) {
            existing.current_price = current_price;
            existing.features = features;
            return self.emitted.get(symbol);
        }

        let side = if breaks_out_long(current_price, orb, previous_bar) {
            Some(Side::Long)
        } else if allow_short && breaks_out_short(current_price, orb, previous_bar) {
            Some(Side::Short)
        } else {
            None
        };

        if let Some(side) = side {
            let signal = RawSignal {
                symbol: symbol.to_string(),
                side,
                current_price,
                features,
                generated_at: now,
            };
            self.emitted.insert(symbol.to_string(), signal);
            return self.emitted.get(symbol);
        }

        None
    }

    pub fn signals(&self) -> impl Iterator<Item = &RawSignal> {
        self.emitted.values()
    }

    pub fn reset(&mut self) {
        self.emitted.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn orb() -> OpeningRange {
        OpeningRange::new(110.0, 95.0, 100.0, 108.0, 500_000)
    }

    fn confirming_bar() -> Bar {
        let now = Utc::now();
        Bar { open: 108.0, high: 111.0, low: 107.5, close: 110.5, volume: 100_000, start: now, end: now }
    }

    fn features() -> FeatureBundle {
        FeatureBundle {
            rsi: 60.0,
            macd_histogram: 0.5,
            vwap_distance_pct: 0.3,
            rs_vs_spy_pct: 1.0,
            volume_ratio: 1.2,
            orb_volume_ratio: 1.1,
            entry_bar_volatility_pct: 2.0,
            confidence: 0.7,
        }
    }

    #[test]
    fn emits_long_signal_on_confirmed_breakout() {
        assert!(breaks_out_long(110.2, &orb(), &confirming_bar()));
    }

    #[test]
    fn rejects_breakout_without_green_prior_bar() {
        let mut bar = confirming_bar();
        bar.open = 111.0;
        bar.close = 110.5;
        assert!(!breaks_out_long(110.2, &orb(), &bar));
    }

    #[test]
    fn second_scan_updates_rather_than_duplicates() {
        let mut gen = SignalGenerator::new();
        let now = Utc::now();
        gen.scan_symbol("AAPL", 110.2, &orb(), &confirming_bar(), features(), now, false);
        assert_eq!(gen.signals().count(), 1);

        let mut updated = features();
        updated.rsi = 65.0;
        gen.scan_symbol("AAPL", 110.5, &orb(), &confirming_bar(), updated, now, false);
        assert_eq!(gen.signals().count(), 1);
        assert_eq!(gen.emitted.get("AAPL").unwrap().features.rsi, 65.0);
    }
}
