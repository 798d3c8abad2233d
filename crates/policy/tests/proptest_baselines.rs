use chrono::{Days, NaiveDate};
use common::{Bar, SymbolSeries};
use features::{EarningsCalendar, FeatureBuilder};
use policy::{Baseline, Policy};
use proptest::prelude::*;

fn series(n: usize, events: &[usize]) -> SymbolSeries {
    let start = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
    let bars = (0..n)
        .map(|i| Bar::flat(start + Days::new(i as u64), 100.0 + (i % 7) as f64, 5_000.0))
        .collect();
    let earnings = events.iter().map(|&i| start + Days::new(i as u64)).collect();
    SymbolSeries::new("AVD", bars, earnings)
}

proptest! {
    /// Avoid-earnings is flat exactly on the days inside the closed window around an event.
    #[test]
    fn avoid_earnings_flat_iff_inside_window(
        events in prop::collection::vec(0usize..120, 0..4),
        idx in 20usize..119,
        window in 0usize..10,
    ) {
        let s = series(120, &events);
        let calendar = EarningsCalendar::for_series(&s);
        let obs = FeatureBuilder::default().observe(&s, &calendar, idx, 0.0).unwrap();

        let policy = Baseline::avoid_earnings(1.0, window);
        let action = policy.act(&obs);
        let inside = calendar.distance(idx).within(window, window);
        prop_assert_eq!(action == 0.0, inside);
        prop_assert!(action == 0.0 || action == 1.0);
    }

    /// Buy-and-hold and flat never look at the observation.
    #[test]
    fn constant_baselines_are_constant(
        events in prop::collection::vec(0usize..90, 0..3),
        idx in 20usize..89,
        fraction in 0.0f64..1.0,
    ) {
        let s = series(90, &events);
        let calendar = EarningsCalendar::for_series(&s);
        let obs = FeatureBuilder::default().observe(&s, &calendar, idx, 0.5).unwrap();
        prop_assert_eq!(Baseline::buy_and_hold(1.0).act(&obs), 1.0);
        prop_assert_eq!(Baseline::flat(fraction).act(&obs), fraction);
    }
}
