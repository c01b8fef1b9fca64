//! Position table persistence

use crate::support::{market, position};
use chrono::{Duration, Utc};
use poly_engine::market::Outcome;
use poly_engine::position::{PositionStore, PurgeReason};
use rust_decimal_macros::dec;
use tokio_test::assert_ok;

#[tokio::test]
async fn test_restart_restores_open_positions() {
    let dir = tempfile::tempdir().unwrap();
    let now = Utc::now();
    let store = PositionStore::new(dir.path().join("state/positions.json"), Duration::hours(24));

    let m = market("m1", dec!(0.5), dec!(0.5), Duration::minutes(10), now);
    let mut up = position(&m, Outcome::Up, dec!(0.42), dec!(11.9), now - Duration::minutes(3));
    up.peak_price = dec!(0.47);
    let stale = position(
        &market("m0", dec!(0.5), dec!(0.5), Duration::minutes(10), now),
        Outcome::Down,
        dec!(0.30),
        dec!(5),
        now - Duration::hours(25),
    );
    assert_ok!(store.save(&[up.clone(), stale.clone()]).await);

    let loaded = assert_ok!(store.load(now).await);
    assert_eq!(loaded.kept, vec![up]);
    assert_eq!(loaded.purged.len(), 1);
    assert_eq!(loaded.purged[0].0.token_id, stale.token_id);
    assert_eq!(loaded.purged[0].1, PurgeReason::Stale);
}

#[tokio::test]
async fn test_empty_table_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = PositionStore::new(dir.path().join("positions.json"), Duration::hours(24));

    assert_ok!(store.save(&[]).await);
    let loaded = assert_ok!(store.load(Utc::now()).await);
    assert!(loaded.kept.is_empty());
    assert!(loaded.purged.is_empty());
}
