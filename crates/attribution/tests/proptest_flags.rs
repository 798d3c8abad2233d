use attribution::{parse_flags, FlagRule, HardDrawdown, LateCrash};
use chrono::NaiveDate;
use common::{EpisodeResult, Termination};
use harness::PairedEpisode;
use proptest::prelude::*;

fn paired(curve: Vec<f64>) -> PairedEpisode {
    let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    PairedEpisode {
        episode_id: 1,
        symbol: "PROP".into(),
        anchor_date: date,
        agent: EpisodeResult {
            episode_id: 1,
            symbol: "PROP".into(),
            anchor_date: date,
            policy: "agent".into(),
            final_equity: *curve.last().unwrap(),
            max_drawdown: common::max_drawdown(&curve),
            reward_sum: 0.0,
            n_steps: curve.len() - 1,
            termination: Termination::HorizonReached,
        },
        equity_curve: curve,
        baselines: Vec::new(),
    }
}

fn curve_from_returns(returns: &[f64]) -> Vec<f64> {
    let mut equity = vec![1.0];
    for r in returns {
        let last = *equity.last().unwrap();
        equity.push(last * (1.0 + r));
    }
    equity
}

proptest! {
    /// HARD_DRAWDOWN fires exactly when the lowest equity/peak ratio is at or
    /// below one minus the threshold.
    #[test]
    fn hard_drawdown_iff_trough_ratio(
        returns in prop::collection::vec(-0.2f64..0.2, 1..80),
        threshold in 0.01f64..0.9,
    ) {
        let curve = curve_from_returns(&returns);
        let mut peak = curve[0];
        let mut lowest = 1.0f64;
        for &v in &curve {
            if v > peak {
                peak = v;
            }
            lowest = lowest.min(v / peak);
        }
        let rule = HardDrawdown { threshold };
        prop_assert_eq!(rule.triggers(&paired(curve)), lowest <= 1.0 - threshold);
    }

    /// A curve that never falls raises neither drawdown nor crash flags.
    #[test]
    fn rising_curves_raise_no_flags(
        returns in prop::collection::vec(0.0f64..0.05, 1..80),
        threshold in 0.001f64..0.9,
        fraction in 0.01f64..1.0,
    ) {
        let episode = paired(curve_from_returns(&returns));
        let drawdown = HardDrawdown { threshold };
        let crash = LateCrash { fraction };
        prop_assert!(!drawdown.triggers(&episode));
        prop_assert!(!crash.triggers(&episode));
    }

    /// The flag parser never panics and only yields well-formed names.
    #[test]
    fn parse_flags_never_panics(raw in ".{0,64}") {
        let flags = parse_flags(&raw);
        for flag in &flags {
            prop_assert!(!flag.is_empty());
            prop_assert!(flag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
        }
    }

    /// Both grammars agree on the same flag names.
    #[test]
    fn grammars_agree(names in prop::collection::btree_set("[A-Z][A-Z_]{0,12}", 0..5)) {
        let piped = names.iter().cloned().collect::<Vec<_>>().join("|");
        let legacy = format!(
            "[{}]",
            names.iter().map(|n| format!("'{n}'")).collect::<Vec<_>>().join(", ")
        );
        prop_assert_eq!(parse_flags(&piped), names.clone());
        prop_assert_eq!(parse_flags(&legacy), names);
    }
}
