//! Circuit breakers across a losing streak

use chrono::{Duration, Utc};
use poly_engine::config::RiskConfig;
use poly_engine::risk::PortfolioRiskManager;
use rust_decimal_macros::dec;

#[test]
fn test_five_losses_trip_the_breaker_until_a_win() {
    let now = Utc::now();
    let config = RiskConfig {
        initial_capital: dec!(1000),
        consecutive_loss_limit: 5,
        ..Default::default()
    };
    let mut risk = PortfolioRiskManager::new(&config, now);

    for i in 0..5 {
        let token = format!("tok{i}");
        risk.record_open(&token, "m1", dec!(5));
        risk.record_trade_result(&token, "m1", dec!(-1), now);
    }

    let approval = risk.check_can_trade(dec!(5), "m2", now);
    assert!(!approval.allowed);
    assert!(approval.reason.unwrap().is_circuit_breaker());

    // Still halted a minute later
    let later = now + Duration::minutes(1);
    assert!(!risk.check_can_trade(dec!(5), "m2", later).allowed);

    risk.record_open("tok-win", "m1", dec!(5));
    risk.record_trade_result("tok-win", "m1", dec!(2), later);
    assert!(risk.check_can_trade(dec!(5), "m2", later).allowed);
    assert_eq!(risk.snapshot().consecutive_losses, 0);
}

#[test]
fn test_loss_streak_halt_expires() {
    let now = Utc::now();
    let config = RiskConfig {
        initial_capital: dec!(1000),
        consecutive_loss_limit: 5,
        loss_streak_halt_secs: 3600,
        ..Default::default()
    };
    let mut risk = PortfolioRiskManager::new(&config, now);
    for i in 0..5 {
        risk.record_trade_result(&format!("tok{i}"), "m1", dec!(-1), now);
    }
    assert!(!risk.check_can_trade(dec!(5), "m2", now).allowed);

    let after = now + Duration::seconds(3601);
    assert!(risk.check_can_trade(dec!(5), "m2", after).allowed);
}
