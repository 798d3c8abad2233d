use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use common::{Bar, Episode, Panel, SymbolSeries};
use features::FeatureConfig;
use harness::export::{read_summary_table, SUMMARY_TABLE_FILE};
use harness::{
    aggregate, build_matched_episode_set, build_stratified_episode_set, export_run, run_episode,
    run_policy, DateRange, EpisodeSet, Harness, RunContext, TIMEOUT_REASON,
};
use policy::{Baseline, ExternalAgent, PolicyRegistry};
use simulator::{ActionMode, EnvConfig};

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 1, 4).unwrap()
}

fn series(symbol: &str, n: usize, price: impl Fn(usize) -> f64, earnings: &[usize]) -> SymbolSeries {
    let bars = (0..n)
        .map(|i| Bar::flat(start() + Days::new(i as u64), price(i), 10_000.0 + (i % 5) as f64 * 100.0))
        .collect();
    let dates = earnings.iter().map(|&i| start() + Days::new(i as u64)).collect();
    SymbolSeries::new(symbol, bars, dates)
}

fn panel() -> Arc<Panel> {
    Arc::new(Panel::from_series([
        series("UP", 150, |i| 50.0 * 1.002f64.powi(i as i32), &[60, 120]),
        series("WAVE", 150, |i| 100.0 + 15.0 * (i as f64 * 0.21).sin(), &[45, 105]),
        series("DROP", 150, |i| 80.0 - 0.3 * i as f64 + 4.0 * (i as f64 * 0.5).cos(), &[70]),
    ]))
}

fn env_config() -> EnvConfig {
    EnvConfig {
        horizon: 20,
        warmup: 25,
        ..EnvConfig::default()
    }
}

fn context() -> RunContext {
    RunContext::new(panel(), env_config(), FeatureConfig::default())
}

fn universe() -> Vec<String> {
    vec!["UP".into(), "WAVE".into(), "DROP".into()]
}

fn registry() -> PolicyRegistry {
    let mut reg = PolicyRegistry::new();
    reg.register(Arc::new(Baseline::buy_and_hold(1.0))).unwrap();
    reg.register_agent(Arc::new(Baseline::flat(0.5))).unwrap();
    reg
}

fn episode_set(seed: u64) -> EpisodeSet {
    let ctx = context();
    build_stratified_episode_set(&ctx.panel, &ctx.env, 2, &universe(), DateRange::unbounded(), seed)
}

#[tokio::test]
async fn three_symbols_two_episodes_each_gives_three_summary_rows() {
    let run_once = || async {
        let set = episode_set(42);
        let reg = registry();
        let harness = Harness::new(context(), reg.clone());
        let run = harness.evaluate(&set).await.unwrap();
        let agg = aggregate(&run, &reg);
        let dir = tempfile::tempdir().unwrap();
        export_run(dir.path(), "test-run", &run, &agg).unwrap();
        read_summary_table(&dir.path().join(SUMMARY_TABLE_FILE)).unwrap()
    };

    let first = run_once().await;
    let second = run_once().await;

    assert_eq!(first.len(), 3);
    assert!(first.iter().all(|r| r.n_pairs == 2 && r.n_pairs_vs_buyhold == 2));
    assert!(first.iter().all(|r| r.mean_delta_eq_vs_avoid.is_none()));
    assert_eq!(first, second);

    // Half exposure trails full exposure on a steadily rising price.
    let up = first.iter().find(|r| r.symbol == "UP").unwrap();
    assert!(up.mean_delta_eq_vs_buyhold.unwrap() < 0.0);
    assert_eq!(up.mean_dd_improve_vs_buyhold, Some(0.0));
}

#[tokio::test]
async fn every_policy_sees_the_same_episodes() {
    let ctx = context();
    let set = build_matched_episode_set(&ctx.panel, &ctx.env, 9, &universe(), DateRange::unbounded(), 7);
    let mut reg = registry();
    reg.register(Arc::new(Baseline::avoid_earnings(1.0, 5))).unwrap();

    let run = Harness::new(ctx, reg).evaluate(&set).await.unwrap();
    let keys = |policy: &str| {
        let mut keys: Vec<_> = run
            .run(policy)
            .unwrap()
            .results()
            .map(|r| (r.symbol.clone(), r.anchor_date))
            .collect();
        keys.sort();
        keys
    };
    assert_eq!(keys("buy_hold").len(), 9);
    assert_eq!(keys("buy_hold"), keys("flat"));
    assert_eq!(keys("buy_hold"), keys("avoid_earnings"));
}

#[tokio::test]
async fn concurrent_run_matches_sequential_run() {
    let ctx = context();
    let set = episode_set(3);
    let reg = registry();
    let run = Harness::new(ctx.clone(), reg.clone()).evaluate(&set).await.unwrap();

    for policy in reg.policies() {
        let sequential = run_policy(&ctx, policy.as_ref(), &set).unwrap();
        assert_eq!(&sequential, run.run(policy.name()).unwrap());
        assert_eq!(sequential, run_policy(&ctx, policy.as_ref(), &set).unwrap());
    }
}

#[tokio::test]
async fn invalid_episode_is_skipped_not_fatal() {
    let ctx = context();
    let good = episode_set(1).episodes().to_vec();
    let mut episodes = vec![Episode {
        id: good.len(),
        symbol: "UP".into(),
        anchor_date: start() + Days::new(3),
        horizon: 20,
        seed: 0,
    }];
    episodes.extend(good);
    let set = EpisodeSet::new(1, episodes);

    let run = Harness::new(ctx, registry()).evaluate(&set).await.unwrap();
    for policy_run in &run.runs {
        assert_eq!(policy_run.completed().count(), 6);
        let skipped: Vec<_> = policy_run.skipped().collect();
        assert_eq!(skipped.len(), 1);
        assert!(skipped[0].reason.contains("history"), "{}", skipped[0].reason);
    }
    let agg = aggregate(&run, &registry());
    assert_eq!(agg.pairs.len(), 6);
    assert!(agg.policies.iter().all(|p| p.n_skipped == 1));
}

#[tokio::test]
async fn rejected_actions_skip_the_episode() {
    let ctx = RunContext::new(
        panel(),
        EnvConfig {
            action_mode: ActionMode::Reject,
            ..env_config()
        },
        FeatureConfig::default(),
    );
    let mut reg = PolicyRegistry::new();
    reg.register(Arc::new(Baseline::buy_and_hold(1.0))).unwrap();
    reg.register_agent(Arc::new(ExternalAgent::new("overlevered", |_| 2.5)))
        .unwrap();

    let set = episode_set(5);
    let run = Harness::new(ctx, reg.clone()).evaluate(&set).await.unwrap();
    assert_eq!(run.run("overlevered").unwrap().skipped().count(), set.len());
    assert_eq!(run.run("buy_hold").unwrap().completed().count(), set.len());
    assert!(aggregate(&run, &reg).symbols.is_empty());
}

#[tokio::test]
async fn timeout_skips_unfinished_episodes_and_stops_running_ones() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut reg = PolicyRegistry::new();
    reg.register(Arc::new(Baseline::buy_and_hold(1.0))).unwrap();
    reg.register_agent(Arc::new(ExternalAgent::new("slow", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        0.5
    })))
    .unwrap();

    let set = episode_set(11);
    let run = Harness::new(context(), reg)
        .with_timeout(Duration::from_millis(200))
        .evaluate(&set)
        .await
        .unwrap();

    assert!(run.timed_out);
    for policy_run in &run.runs {
        assert_eq!(policy_run.outcomes.len(), set.len());
    }
    // Twenty 50ms steps cannot finish inside a 200ms deadline.
    let slow = run.run("slow").unwrap();
    assert_eq!(slow.completed().count(), 0);
    assert!(slow.skipped().all(|s| s.reason == TIMEOUT_REASON));

    // Workers already on the blocking pool stop before their next step.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let settled = calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(calls.load(Ordering::SeqCst), settled);
}

#[tokio::test]
async fn bad_price_in_one_window_does_not_abort_the_batch() {
    let mut bad = series("BAD", 80, |_| 100.0, &[]).bars().to_vec();
    bad[35].adj_close = 0.0;
    let panel = Arc::new(Panel::from_series([
        SymbolSeries::new("BAD", bad, vec![]),
        series("GOOD", 80, |i| 100.0 + i as f64, &[]),
    ]));
    let ctx = RunContext::new(panel, env_config(), FeatureConfig::default());
    let episode = |id: usize, symbol: &str| Episode {
        id,
        symbol: symbol.into(),
        anchor_date: start() + Days::new(30),
        horizon: 20,
        seed: id as u64,
    };
    let set = EpisodeSet::new(0, vec![episode(0, "BAD"), episode(1, "GOOD")]);

    let err = run_episode(&mut ctx.environment(), &Baseline::flat(0.0), &set.episodes()[0]).unwrap_err();
    assert!(err.is_episode_skippable(), "{err}");

    let sequential = run_policy(&ctx, &Baseline::flat(0.0), &set).unwrap();
    assert_eq!(sequential.completed().count(), 1);
    let skipped: Vec<_> = sequential.skipped().collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].symbol, "BAD");

    let run = Harness::new(ctx, registry()).evaluate(&set).await.unwrap();
    for policy_run in &run.runs {
        assert_eq!(policy_run.results().map(|r| r.symbol.as_str()).collect::<Vec<_>>(), ["GOOD"]);
    }
}

#[tokio::test]
async fn empty_run_still_writes_every_artifact() {
    let set = EpisodeSet::new(0, Vec::new());
    let reg = registry();
    let run = Harness::new(context(), reg.clone()).evaluate(&set).await.unwrap();
    let agg = aggregate(&run, &reg);

    let dir = tempfile::tempdir().unwrap();
    export_run(dir.path(), "empty", &run, &agg).unwrap();

    assert!(read_summary_table(&dir.path().join(SUMMARY_TABLE_FILE)).unwrap().is_empty());
    let metrics: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("metrics.json")).unwrap()).unwrap();
    assert_eq!(metrics["n_episodes"], 0);
    assert_eq!(metrics["primary_metric"], "final_equity");
    assert_eq!(metrics["constraint"], "drawdown-aware");
    assert_eq!(metrics["agent"], "flat");
    assert!(dir.path().join("buy_hold_curves.json").exists());
    assert!(dir.path().join("policy_summary.csv").exists());
}
