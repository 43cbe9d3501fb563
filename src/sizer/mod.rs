/// Batch Position Sizer (§4.6, C8). Pure and synchronous: no I/O, no
/// async, no wall-clock reads. Each step is a free function so the
/// pipeline composes and is independently unit-testable, per the staged
/// immutable pipeline redesign flag (§9).
use crate::types::{Dollars, Price, Symbol, Volume};

#[derive(Debug, Clone)]
pub struct SizerInput {
    pub symbol: Symbol,
    pub rank: u32,
    pub price: Price,
    pub adv: Volume,
}

#[derive(Debug, Clone, Copy)]
pub struct SizerConfig {
    /// T, default 0.90.
    pub target_deployment_fraction: f64,
    /// M, default 0.35.
    pub max_position_fraction: f64,
    /// Default 0.01.
    pub adv_cap_fraction: f64,
    pub slip_guard_enabled: bool,
}

impl Default for SizerConfig {
    fn default() -> Self {
        SizerConfig {
            target_deployment_fraction: 0.90,
            max_position_fraction: 0.35,
            adv_cap_fraction: 0.01,
            slip_guard_enabled: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SizedLine {
    pub symbol: Symbol,
    pub rank: u32,
    pub price: Price,
    pub quantity: i64,
}

impl SizedLine {
    pub fn notional(&self) -> Dollars {
        self.quantity as f64 * self.price
    }
}

/// Rank allocation multiplier (§4.6 step 1).
pub fn rank_multiplier(rank: u32) -> f64 {
    match rank {
        1 => 3.0,
        2 => 2.5,
        3 => 2.0,
        4 | 5 => 1.71,
        6..=10 => 1.5,
        11..=15 => 1.2,
        _ => 1.0,
    }
}

/// Step 1: fair share times rank multiplier.
pub fn step1_rank_multipliers(inputs: &[SizerInput], cash: Dollars, config: &SizerConfig) -> Vec<Dollars> {
    let n = inputs.len() as f64;
    if n == 0.0 {
        return Vec::new();
    }
    let fair_share = (cash * config.target_deployment_fraction) / n;
    inputs.iter().map(|i| fair_share * rank_multiplier(i.rank)).collect()
}

/// Step 2: cap each allocation at the per-position fraction of cash.
pub fn step2_max_position_cap(alloc: &[Dollars], cash: Dollars, config: &SizerConfig) -> Vec<Dollars> {
    let cap = cash * config.max_position_fraction;
    alloc.iter().map(|a| a.min(cap)).collect()
}

/// Step 3: cap each allocation at 1% of ADV notional (slip guard), if enabled.
pub fn step3_adv_cap(alloc: &[Dollars], inputs: &[SizerInput], config: &SizerConfig) -> Vec<Dollars> {
    if !config.slip_guard_enabled {
        return alloc.to_vec();
    }
    alloc
        .iter()
        .zip(inputs)
        .map(|(a, i)| {
            let adv_notional_cap = i.adv as f64 * config.adv_cap_fraction * i.price;
            a.min(adv_notional_cap)
        })
        .collect()
}

/// Step 4: scale down uniformly if the cohort sum exceeds the target
/// deployment; leave as-is if under (rounding/redistribution fix the gap).
pub fn step4_normalize(alloc: &[Dollars], cash: Dollars, config: &SizerConfig) -> Vec<Dollars> {
    let target = cash * config.target_deployment_fraction;
    let sum: f64 = alloc.iter().sum();
    if sum > target && sum > 0.0 {
        let scale = target / sum;
        alloc.iter().map(|a| a * scale).collect()
    } else {
        alloc.to_vec()
    }
}

/// Step 5: floor to whole shares, then greedily try one extra share if it
/// stays within 5% of that position's own allocated target and under the
/// per-position cap. Zero-quantity symbols are dropped.
pub fn step5_integer_rounding(
    alloc: &[Dollars],
    inputs: &[SizerInput],
    cash: Dollars,
    config: &SizerConfig,
) -> Vec<SizedLine> {
    let cap = cash * config.max_position_fraction;
    let mut out = Vec::new();

    for (allocated, input) in alloc.iter().zip(inputs) {
        if input.price <= 0.0 {
            continue;
        }
        let base_qty = (allocated / input.price).floor() as i64;
        let plus_one_notional = (base_qty + 1) as f64 * input.price;
        let within_position_overage = plus_one_notional <= allocated * 1.05;
        let within_cap = plus_one_notional <= cap;

        let qty = if within_position_overage && within_cap { base_qty + 1 } else { base_qty };

        if qty == 0 {
            continue;
        }
        out.push(SizedLine { symbol: input.symbol.clone(), rank: input.rank, price: input.price, quantity: qty });
    }

    out
}

/// Step 6: redistribute leftover budget across ranks, respecting the
/// per-position cap and the total-budget slack.
pub fn step6_redistribute(mut lines: Vec<SizedLine>, cash: Dollars, config: &SizerConfig) -> Vec<SizedLine> {
    lines.sort_by_key(|l| l.rank);

    let target = cash * config.target_deployment_fraction;
    let cap = cash * config.max_position_fraction;
    let slack_budget = target * 1.05;

    loop {
        let deployed: f64 = lines.iter().map(|l| l.notional()).sum();
        let unused = target - deployed;

        let min_price = lines.iter().map(|l| l.price).fold(f64::INFINITY, f64::min);
        if !min_price.is_finite() || unused < min_price {
            break;
        }

        let mut added_any = false;
        for line in lines.iter_mut() {
            let next_notional = (line.quantity + 1) as f64 * line.price;
            let current_notional = line.notional();
            let would_total_deployed = deployed - current_notional + next_notional;

            if next_notional <= cap && would_total_deployed <= slack_budget && line.price <= unused {
                line.quantity += 1;
                added_any = true;
                break;
            }
        }

        if !added_any {
            break;
        }
    }

    lines
}

/// Runs the full six-step pipeline. Output order is rank order (stable).
pub fn size_batch(inputs: Vec<SizerInput>, cash: Dollars, config: &SizerConfig) -> Vec<SizedLine> {
    let alloc1 = step1_rank_multipliers(&inputs, cash, config);
    let alloc2 = step2_max_position_cap(&alloc1, cash, config);
    let alloc3 = step3_adv_cap(&alloc2, &inputs, config);
    let alloc4 = step4_normalize(&alloc3, cash, config);
    let lines = step5_integer_rounding(&alloc4, &inputs, cash, config);
    step6_redistribute(lines, cash, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(n: u32, price: f64, adv: i64) -> Vec<SizerInput> {
        (1..=n)
            .map(|rank| SizerInput { symbol: format!("S{rank}"), rank, price, adv })
            .collect()
    }

    #[test]
    fn happy_path_s1_two_signals() {
        // Scenario S1: account $1000, T=0.9, M=0.35, ranks 1 and 2.
        let inputs = vec![
            SizerInput { symbol: "Q".to_string(), rank: 1, price: 50.0, adv: 10_000_000 },
            SizerInput { symbol: "S".to_string(), rank: 2, price: 50.0, adv: 10_000_000 },
        ];
        let config = SizerConfig::default();
        let lines = size_batch(inputs, 1000.0, &config);

        for line in &lines {
            assert!(line.notional() <= 1000.0 * config.max_position_fraction + 1e-6);
        }
        let total: f64 = lines.iter().map(|l| l.notional()).sum();
        assert!(total <= 1000.0 * (config.target_deployment_fraction + 0.05));
    }

    #[test]
    fn adv_cap_limits_rank_one_s5() {
        // Scenario S5: ADV cap binds rank 1, freed capital redistributes.
        let config = SizerConfig::default();
        let cash = 500_000.0;
        let mut inputs = inputs(15, 100.0, 120_000); // adv cap = 120000*0.01*100 = 120000... adjust
        inputs[0].adv = 12_000; // ADV cap = 12000*0.01*100 = $12,000 for rank 1
        let lines = size_batch(inputs, cash, &config);

        let rank1 = lines.iter().find(|l| l.rank == 1).unwrap();
        assert!(rank1.notional() <= 12_000.0 * 1.05);
    }

    #[test]
    fn never_exceeds_per_position_cap() {
        let config = SizerConfig::default();
        let cash = 10_000.0;
        let inputs = inputs(5, 10.0, 1_000_000);
        let lines = size_batch(inputs, cash, &config);
        for line in &lines {
            assert!(line.notional() <= cash * config.max_position_fraction + 1e-6);
        }
    }

    #[test]
    fn output_order_matches_rank_order() {
        let config = SizerConfig::default();
        let inputs = inputs(10, 20.0, 1_000_000);
        let lines = size_batch(inputs, 100_000.0, &config);
        let ranks: Vec<u32> = lines.iter().map(|l| l.rank).collect();
        let mut sorted = ranks.clone();
        sorted.sort();
        assert_eq!(ranks, sorted);
    }

    #[test]
    fn deterministic_given_same_input() {
        let config = SizerConfig::default();
        let a = size_batch(inputs(8, 33.0, 500_000), 75_000.0, &config);
        let b = size_batch(inputs(8, 33.0, 500_000), 75_000.0, &config);
        let qa: Vec<i64> = a.iter().map(|l| l.quantity).collect();
        let qb: Vec<i64> = b.iter().map(|l| l.quantity).collect();
        assert_eq!(qa, qb);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn input_strategy() -> impl Strategy<Value = Vec<SizerInput>> {
        (1usize..20).prop_flat_map(|n| {
            prop::collection::vec((10.0f64..500.0, 10_000i64..5_000_000i64), n).prop_map(|prices_advs| {
                prices_advs
                    .into_iter()
                    .enumerate()
                    .map(|(i, (price, adv))| SizerInput { symbol: format!("S{i}"), rank: (i + 1) as u32, price, adv })
                    .collect()
            })
        })
    }

    proptest! {
        #[test]
        fn cap_invariant_holds(inputs in input_strategy(), cash in 1_000.0f64..2_000_000.0) {
            let config = SizerConfig::default();
            let lines = size_batch(inputs, cash, &config);
            for line in &lines {
                prop_assert!(line.notional() <= cash * config.max_position_fraction + 1e-6);
            }
        }

        #[test]
        fn budget_invariant_holds(inputs in input_strategy(), cash in 1_000.0f64..2_000_000.0) {
            let config = SizerConfig::default();
            let lines = size_batch(inputs, cash, &config);
            let total: f64 = lines.iter().map(|l| l.notional()).sum();
            prop_assert!(total <= cash * (config.target_deployment_fraction + 0.05) + 1e-6);
        }

        #[test]
        fn rank_order_is_stable(inputs in input_strategy(), cash in 1_000.0f64..2_000_000.0) {
            let config = SizerConfig::default();
            let lines = size_batch(inputs, cash, &config);
            let ranks: Vec<u32> = lines.iter().map(|l| l.rank).collect();
            let mut sorted = ranks.clone();
            sorted.sort();
            prop_assert_eq!(ranks, sorted);
        }
    }
}
