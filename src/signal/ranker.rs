/// Multi-factor priority ranking over the current signal cohort (§4.4, C6).
use crate::types::{RankedSignal, RawSignal};

/// Rank-based percentile normalization (§9 open question, resolved in
/// DESIGN.md: rank-based chosen over min-max for stability against
/// outliers in a small cohort). A value's percentile is its position in
/// the sorted cohort, 0 for the lowest and 1 for the highest; a
/// single-element cohort normalizes to 1.0.
fn rank_percentiles(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n <= 1 {
        return vec![1.0; n];
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap());

    let mut percentiles = vec![0.0; n];
    for (rank, &idx) in order.iter().enumerate() {
        percentiles[idx] = rank as f64 / (n - 1) as f64;
    }
    percentiles
}

/// Ranks the cohort descending by the weighted priority score (§4.4),
/// breaking ties by `symbol` ascending (§9 open question resolution).
pub fn rank(cohort: &[RawSignal]) -> Vec<RankedSignal> {
    if cohort.is_empty() {
        return Vec::new();
    }

    let vwap: Vec<f64> = cohort.iter().map(|s| -s.features.vwap_distance_pct.abs()).collect();
    let rs: Vec<f64> = cohort.iter().map(|s| s.features.rs_vs_spy_pct).collect();
    let orb_vol: Vec<f64> = cohort.iter().map(|s| s.features.orb_volume_ratio).collect();
    let confidence: Vec<f64> = cohort.iter().map(|s| s.features.confidence).collect();
    let rsi_ctx: Vec<f64> = cohort.iter().map(|s| -(s.features.rsi - 50.0).abs()).collect();
    let orb_range: Vec<f64> = cohort.iter().map(|s| s.features.entry_bar_volatility_pct).collect();

    let vwap_pct = rank_percentiles(&vwap);
    let rs_pct = rank_percentiles(&rs);
    let orb_vol_pct = rank_percentiles(&orb_vol);
    let confidence_pct = rank_percentiles(&confidence);
    let rsi_ctx_pct = rank_percentiles(&rsi_ctx);
    let orb_range_pct = rank_percentiles(&orb_range);

    let mut scored: Vec<(f64, RawSignal)> = cohort
        .iter()
        .enumerate()
        .map(|(i, signal)| {
            let score = 0.27 * vwap_pct[i]
                + 0.25 * rs_pct[i]
                + 0.22 * orb_vol_pct[i]
                + 0.13 * confidence_pct[i]
                + 0.10 * rsi_ctx_pct[i]
                + 0.03 * orb_range_pct[i];
            (score, signal.clone())
        })
        .collect();

    scored.sort_by(|(score_a, sig_a), (score_b, sig_b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap()
            .then_with(|| sig_a.symbol.cmp(&sig_b.symbol))
    });

    scored
        .into_iter()
        .enumerate()
        .map(|(i, (score, raw))| RankedSignal { raw, priority_score: score, rank: (i + 1) as u32 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeatureBundle;
    use chrono::Utc;

    fn signal(symbol: &str, confidence: f64) -> RawSignal {
        RawSignal {
            symbol: symbol.to_string(),
            side: crate::types::Side::Long,
            current_price: 100.0,
            features: FeatureBundle {
                rsi: 55.0,
                macd_histogram: 0.2,
                vwap_distance_pct: 0.5,
                rs_vs_spy_pct: 1.0,
                volume_ratio: 1.1,
                orb_volume_ratio: 1.2,
                entry_bar_volatility_pct: 2.0,
                confidence,
            },
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn higher_confidence_ranks_first() {
        let cohort = vec![signal("AAA", 0.3), signal("BBB", 0.9)];
        let ranked = rank(&cohort);
        assert_eq!(ranked[0].raw.symbol, "BBB");
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].rank, 2);
    }

    #[test]
    fn ties_break_by_symbol_ascending() {
        let cohort = vec![signal("ZETA", 0.5), signal("ALPHA", 0.5)];
        let ranked = rank(&cohort);
        assert_eq!(ranked[0].raw.symbol, "ALPHA");
        assert_eq!(ranked[1].raw.symbol, "ZETA");
    }

    #[test]
    fn output_count_matches_input() {
        let cohort: Vec<RawSignal> = (0..5).map(|i| signal(&format!("S{i}"), i as f64 / 5.0)).collect();
        assert_eq!(rank(&cohort).len(), 5);
    }
}
