use chrono::{Days, NaiveDate};
use common::{Bar, SymbolSeries};
use features::{EarningsCalendar, FeatureBuilder};
use proptest::prelude::*;

fn series(prices: &[f64], volumes: &[f64]) -> SymbolSeries {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let bars = prices
        .iter()
        .zip(volumes)
        .enumerate()
        .map(|(i, (&p, &v))| Bar::flat(start + Days::new(i as u64), p, v))
        .collect();
    SymbolSeries::new("PROP", bars, vec![start + Days::new(45)])
}

proptest! {
    /// Rewriting every bar after the observed day must not change the observation.
    #[test]
    fn observation_never_reads_future_bars(
        prices in prop::collection::vec(1.0f64..500.0, 80),
        volumes in prop::collection::vec(0.0f64..1e6, 80),
        idx in 20usize..79,
        shock in 0.1f64..10.0,
    ) {
        let original = series(&prices, &volumes);
        let shocked_prices: Vec<f64> = prices
            .iter()
            .enumerate()
            .map(|(i, &p)| if i > idx { p * shock } else { p })
            .collect();
        let shocked_volumes: Vec<f64> = volumes
            .iter()
            .enumerate()
            .map(|(i, &v)| if i > idx { v * shock } else { v })
            .collect();
        let shocked = series(&shocked_prices, &shocked_volumes);

        let builder = FeatureBuilder::default();
        let a = builder.observe(&original, &EarningsCalendar::for_series(&original), idx, 0.25);
        let b = builder.observe(&shocked, &EarningsCalendar::for_series(&shocked), idx, 0.25);
        prop_assert!(a.is_some());
        prop_assert_eq!(a, b);
    }

    #[test]
    fn features_are_finite_for_positive_prices(
        prices in prop::collection::vec(0.01f64..10_000.0, 30..90),
    ) {
        let volumes = vec![1_000.0; prices.len()];
        let s = series(&prices, &volumes);
        let cal = EarningsCalendar::for_series(&s);
        let builder = FeatureBuilder::default();
        for idx in FeatureBuilder::MIN_HISTORY..prices.len() {
            let obs = builder.observe(&s, &cal, idx, 1.0).unwrap();
            prop_assert!(obs.to_array().iter().all(|v| v.is_finite()));
        }
    }
}
