//! Venue minimums and the order protocol against the paper venue

use chrono::Utc;
use poly_engine::config::{ExecutionConfig, RiskConfig};
use poly_engine::exchange::{BalanceAsset, ExchangeApi, OrderSide, PaperExchange};
use poly_engine::execution::{adjust_buy_size, OrderExecutor, OrderIntent, OrderStatus};
use poly_engine::risk::PortfolioRiskManager;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::Mutex;

#[test]
fn test_adjusted_buys_always_meet_minimums() {
    let min_shares = dec!(5);
    let min_value = dec!(1);
    let cap = dec!(5);

    for cents in 1..100 {
        let price = Decimal::new(cents, 2);
        for size in [dec!(0.5), dec!(1), dec!(2.5), dec!(5), dec!(12.34)] {
            let Some(adjusted) = adjust_buy_size(price, size, min_shares, min_value, cap) else {
                continue;
            };
            assert!(adjusted >= min_shares, "{price} x {size} -> {adjusted}");
            assert!(adjusted * price >= min_value, "{price} x {size} -> {adjusted}");
            assert!(adjusted >= size);
            assert!(adjusted <= size * cap);
            assert_eq!(adjusted, adjusted.round_dp(2));
        }
    }
}

fn intent(side: OrderSide, price: Decimal, size: Decimal) -> OrderIntent {
    OrderIntent {
        token_id: "tok".to_string(),
        side,
        price,
        size,
        tick_size: dec!(0.01),
        neg_risk: false,
    }
}

#[tokio::test]
async fn test_buy_upsizes_then_sell_closes() {
    let paper = Arc::new(PaperExchange::new(dec!(100), dec!(0)));
    let executor = OrderExecutor::new(paper.clone(), ExecutionConfig::default());
    let risk = Mutex::new(PortfolioRiskManager::new(
        &RiskConfig {
            initial_capital: dec!(100),
            ..Default::default()
        },
        Utc::now(),
    ));

    // 2 shares at 0.30 is below both minimums
    let bought = executor
        .buy(&intent(OrderSide::Buy, dec!(0.30), dec!(2)), "m1", &risk, Utc::now())
        .await;
    assert_eq!(bought.status, OrderStatus::Filled);
    assert_eq!(bought.fill_size, Some(dec!(5)));

    let sold = executor
        .sell(&intent(OrderSide::Sell, dec!(0.31), dec!(5)), dec!(5))
        .await;
    assert_eq!(sold.status, OrderStatus::Filled);
    assert_eq!(
        paper
            .get_balance(&BalanceAsset::Conditional("tok".into()))
            .await
            .unwrap(),
        Decimal::ZERO
    );
}

#[tokio::test]
async fn test_sell_uses_venue_balance_when_smaller() {
    let paper = Arc::new(PaperExchange::new(dec!(100), dec!(0)));
    paper.credit_shares("tok", dec!(9.5)).await;
    let executor = OrderExecutor::new(paper.clone(), ExecutionConfig::default());

    let sold = executor
        .sell(&intent(OrderSide::Sell, dec!(0.50), dec!(10)), dec!(10))
        .await;

    assert_eq!(sold.status, OrderStatus::Filled);
    assert_eq!(sold.fill_size, Some(dec!(9.5)));
}
