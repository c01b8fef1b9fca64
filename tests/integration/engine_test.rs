//! Full cycles through the engine against a paper venue

use crate::support::{market, position, Harness};
use chrono::{Duration, Utc};
use poly_engine::exchange::OrderSide;
use poly_engine::market::Outcome;
use poly_engine::position::PositionStore;
use poly_engine::strategy::StrategyKind;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_sum_to_one_not_triggered_above_threshold() {
    let now = Utc::now();
    let h = Harness::start(vec![], now, |c| c.strategy.sum_to_one_enabled = true).await;
    h.markets
        .set(vec![market("m1", dec!(0.50), dec!(0.49), Duration::minutes(10), now)])
        .await;

    let report = h.engine.run_cycle(now).await;

    assert_eq!(report.markets, 1);
    assert_eq!(report.failed, 0);
    assert!(h.engine.positions().await.is_empty());
    assert!(h.paper.fills().await.is_empty());
}

#[tokio::test]
async fn test_sum_to_one_buys_both_legs() {
    let now = Utc::now();
    let h = Harness::start(vec![], now, |c| c.strategy.sum_to_one_enabled = true).await;
    let m = market("m1", dec!(0.40), dec!(0.45), Duration::minutes(10), now);
    h.markets.set(vec![m.clone()]).await;

    h.engine.run_cycle(now).await;

    let mut positions = h.engine.positions().await;
    positions.sort_by_key(|p| p.side.as_str());
    assert_eq!(positions.len(), 2);
    assert!(positions.iter().all(|p| p.strategy == StrategyKind::SumToOne));
    assert!(positions.iter().all(|p| p.size == dec!(5.89)));
    assert_eq!(positions[0].side, Outcome::Down);
    assert_eq!(positions[0].entry_price, dec!(0.45));
    assert_eq!(positions[1].entry_price, dec!(0.40));

    let fills = h.paper.fills().await;
    assert_eq!(fills.len(), 2);
    assert!(fills.iter().all(|f| f.side == OrderSide::Buy));
    assert!(h.prices.is_subscribed(&m.up_token_id).await);
    assert!(h.prices.is_subscribed(&m.down_token_id).await);
    assert_eq!(h.engine.stats().await.entries.get("sum_to_one"), Some(&2));

    // Persisted at the end of the cycle
    let store = PositionStore::new(h.dir.path().join("positions.json"), Duration::hours(24));
    assert_eq!(store.load(now).await.unwrap().kept.len(), 2);
}

#[tokio::test]
async fn test_market_closing_exit_ignores_pnl() {
    let now = Utc::now();
    let m = market("m1", dec!(0.60), dec!(0.40), Duration::seconds(90), now);
    let held = position(&m, Outcome::Up, dec!(0.50), dec!(10), now - Duration::minutes(5));
    let h = Harness::start(vec![held.clone()], now, |_| {}).await;
    h.markets.set(vec![m]).await;
    h.prices.set(&held.token_id, dec!(0.60)).await;

    h.engine.run_cycle(now).await;

    assert!(h.engine.positions().await.is_empty());
    let stats = h.engine.stats().await;
    assert_eq!(stats.exits.get("market_closing"), Some(&1));
    assert_eq!(stats.exits.get("take_profit"), None);

    let sells: Vec<_> = h
        .paper
        .fills()
        .await
        .into_iter()
        .filter(|f| f.side == OrderSide::Sell)
        .collect();
    assert_eq!(sells.len(), 1);
    assert_eq!(sells[0].size, dec!(10));
    assert!(!h.prices.is_subscribed(&held.token_id).await);
}

#[tokio::test]
async fn test_time_exit_beats_take_profit() {
    let now = Utc::now();
    let m = market("m1", dec!(0.55), dec!(0.45), Duration::minutes(10), now);
    let held = position(&m, Outcome::Up, dec!(0.50), dec!(10), now - Duration::minutes(14));
    let h = Harness::start(vec![held.clone()], now, |_| {}).await;
    h.markets.set(vec![m]).await;
    h.prices.set(&held.token_id, dec!(0.55)).await;

    h.engine.run_cycle(now).await;

    assert!(h.engine.positions().await.is_empty());
    assert_eq!(h.engine.stats().await.exits.get("time_exit"), Some(&1));
    let risk = h.engine.risk_snapshot().await;
    assert_eq!(risk.daily_pnl, dec!(0.50));
    assert_eq!(risk.wins_today, 1);
}

#[tokio::test]
async fn test_take_profit_when_nothing_earlier_fires() {
    let now = Utc::now();
    let m = market("m1", dec!(0.52), dec!(0.48), Duration::minutes(10), now);
    let held = position(&m, Outcome::Up, dec!(0.50), dec!(10), now - Duration::minutes(2));
    let h = Harness::start(vec![held.clone()], now, |_| {}).await;
    h.markets.set(vec![m]).await;
    h.prices.set(&held.token_id, dec!(0.52)).await;

    h.engine.run_cycle(now).await;

    assert_eq!(h.engine.stats().await.exits.get("take_profit"), Some(&1));
}

#[tokio::test]
async fn test_position_held_inside_thresholds() {
    let now = Utc::now();
    let m = market("m1", dec!(0.505), dec!(0.495), Duration::minutes(10), now);
    let held = position(&m, Outcome::Up, dec!(0.50), dec!(10), now - Duration::minutes(2));
    let h = Harness::start(vec![held.clone()], now, |_| {}).await;
    h.markets.set(vec![m]).await;
    h.prices.set(&held.token_id, dec!(0.505)).await;

    h.engine.run_cycle(now).await;

    let positions = h.engine.positions().await;
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].peak_price, dec!(0.505));
    assert!(h.engine.stats().await.exits.is_empty());
}

#[tokio::test]
async fn test_unpriced_position_off_market_is_orphaned() {
    let now = Utc::now();
    let m = market("gone", dec!(0.50), dec!(0.50), Duration::minutes(10), now);
    let held = position(&m, Outcome::Down, dec!(0.40), dec!(10), now - Duration::minutes(1));
    let h = Harness::start(vec![held], now, |_| {}).await;

    // No market listed and no price: the grace period starts
    h.engine.run_cycle(now).await;
    assert_eq!(h.engine.positions().await.len(), 1);

    h.engine.run_cycle(now + Duration::seconds(121)).await;
    assert!(h.engine.positions().await.is_empty());
    assert_eq!(h.engine.stats().await.exits.get("orphan_cleanup"), Some(&1));
    assert_eq!(h.engine.risk_snapshot().await.daily_pnl, dec!(-4.00));
    assert!(h.paper.fills().await.is_empty());
}

#[tokio::test]
async fn test_recovery_purges_fixture_records() {
    let now = Utc::now();
    let mut fixture = position(
        &market("fixture-mkt", dec!(0.5), dec!(0.5), Duration::minutes(10), now),
        Outcome::Up,
        dec!(0.50),
        dec!(5),
        now,
    );
    fixture.token_id = "test-token".to_string();
    let real = position(
        &market("m1", dec!(0.5), dec!(0.5), Duration::minutes(10), now),
        Outcome::Up,
        dec!(0.50),
        dec!(5),
        now,
    );
    let h = Harness::start(vec![fixture, real.clone()], now, |_| {}).await;

    let positions = h.engine.positions().await;
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].token_id, real.token_id);
    assert!(h.prices.is_subscribed(&real.token_id).await);

    let store = PositionStore::new(h.dir.path().join("positions.json"), Duration::hours(24));
    assert_eq!(store.load(now).await.unwrap().kept.len(), 1);
}

#[tokio::test]
async fn test_capacity_limits_entries() {
    let now = Utc::now();
    let h = Harness::start(vec![], now, |c| {
        c.strategy.sum_to_one_enabled = true;
        c.engine.max_positions_per_asset = 1;
    })
    .await;
    h.markets
        .set(vec![market("m1", dec!(0.40), dec!(0.45), Duration::minutes(10), now)])
        .await;

    h.engine.run_cycle(now).await;

    assert!(h.engine.positions().await.is_empty());
    assert!(h.paper.fills().await.is_empty());
    assert_eq!(h.engine.stats().await.blocked_entries, 1);
}

#[tokio::test]
async fn test_stuck_stop_loss_force_removed_after_grace() {
    let t0 = Utc::now();
    let m = market("m1", dec!(0.48), dec!(0.52), Duration::minutes(10), t0);
    let held = position(&m, Outcome::Up, dec!(0.50), dec!(10), t0 - Duration::minutes(1));
    let h = Harness::start(vec![held.clone()], t0, |_| {}).await;
    h.markets.set(vec![m]).await;
    h.venue.refuse_sells(true);

    // Stop-loss fires but the sell is refused
    h.prices.set(&held.token_id, dec!(0.48)).await;
    h.engine.run_cycle(t0).await;
    assert_eq!(h.engine.positions().await.len(), 1);
    assert_eq!(h.engine.stats().await.failed_orders, 1);

    // Price recovers for a cycle, ending that episode
    h.prices.set(&held.token_id, dec!(0.50)).await;
    h.engine.run_cycle(t0 + Duration::seconds(30)).await;

    // A new episode gets its own grace period
    h.prices.set(&held.token_id, dec!(0.48)).await;
    h.engine.run_cycle(t0 + Duration::seconds(100)).await;
    assert_eq!(h.engine.positions().await.len(), 1);
    assert_eq!(h.engine.stats().await.stuck_exits, 0);

    h.engine.run_cycle(t0 + Duration::seconds(161)).await;
    assert!(h.engine.positions().await.is_empty());
    let stats = h.engine.stats().await;
    assert_eq!(stats.stuck_exits, 1);
    assert_eq!(stats.failed_orders, 3);
    assert_eq!(stats.exits.get("stop_loss"), Some(&1));

    // Booked at the last price, not the full cost basis
    assert_eq!(h.engine.risk_snapshot().await.daily_pnl, dec!(-0.20));
    assert!(h.paper.fills().await.is_empty());
}
