//! Market trade compensation under storage failures.

mod common;

use std::sync::Arc;

use rust_decimal_macros::dec;
use tokio_test::{assert_err, assert_ok};

use simex::error::ErrorKind;
use simex::models::Side;

use common::{BASE_TS, FlakyWalletStore, empty_wallet, exchange_with, flat_candle};

#[tokio::test]
async fn test_failed_credit_restores_debited_fiat() {
    // save 1: deposit, save 2: debit, save 3: credit (fails), save 4: compensation
    let store = Arc::new(FlakyWalletStore::failing_saves([3]));
    let (exchange, _) = exchange_with(store.clone(), BASE_TS);
    assert_ok!(exchange.ingest_candles(&[flat_candle(BASE_TS, dec!(50000))]).await);
    let wallet = empty_wallet(&exchange, 10).await;
    assert_ok!(exchange.deposit(&wallet, dec!(100)).await);

    let err = assert_err!(exchange.market_trade(&wallet, Side::Buy, dec!(100)).await);
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert_eq!(store.save_count(), 4);

    let w = assert_ok!(exchange.ledger().wallet(&wallet).await);
    assert_eq!(w.balance_fiat, dec!(100));
    assert_eq!(w.balance_asset, dec!(0));
    assert!(w.trade_history.is_empty());
}

#[tokio::test]
async fn test_failed_sell_credit_restores_asset() {
    // save 1: asset credit, save 2: debit, save 3: fiat credit (fails)
    let store = Arc::new(FlakyWalletStore::failing_saves([3]));
    let (exchange, _) = exchange_with(store, BASE_TS);
    assert_ok!(exchange.ingest_candles(&[flat_candle(BASE_TS, dec!(50000))]).await);
    let wallet = empty_wallet(&exchange, 11).await;
    assert_ok!(exchange.ledger().credit_asset(&wallet, dec!(0.01)).await);

    assert_err!(exchange.market_trade(&wallet, Side::Sell, dec!(0.01)).await);
    let w = assert_ok!(exchange.ledger().wallet(&wallet).await);
    assert_eq!(w.balance_asset, dec!(0.01));
    assert_eq!(w.balance_fiat, dec!(0));
}

#[tokio::test]
async fn test_original_failure_is_reported_when_compensation_fails() {
    let store = Arc::new(FlakyWalletStore::failing_saves([3, 4]));
    let (exchange, _) = exchange_with(store, BASE_TS);
    assert_ok!(exchange.ingest_candles(&[flat_candle(BASE_TS, dec!(50000))]).await);
    let wallet = empty_wallet(&exchange, 12).await;
    assert_ok!(exchange.deposit(&wallet, dec!(100)).await);

    let err = assert_err!(exchange.market_trade(&wallet, Side::Buy, dec!(50)).await);
    assert!(err.to_string().contains("save 3"), "unexpected error: {err}");
}

#[tokio::test]
async fn test_failed_debit_changes_nothing() {
    let store = Arc::new(FlakyWalletStore::failing_saves([2]));
    let (exchange, _) = exchange_with(store.clone(), BASE_TS);
    assert_ok!(exchange.ingest_candles(&[flat_candle(BASE_TS, dec!(50000))]).await);
    let wallet = empty_wallet(&exchange, 13).await;
    assert_ok!(exchange.deposit(&wallet, dec!(100)).await);

    let err = assert_err!(exchange.market_trade(&wallet, Side::Buy, dec!(100)).await);
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert_eq!(store.save_count(), 2);
    let w = assert_ok!(exchange.ledger().wallet(&wallet).await);
    assert_eq!(w.balance_fiat, dec!(100));
}

#[tokio::test]
async fn test_matcher_isolates_failing_orders() {
    // saves 1-4: two deposits and two placements; save 5 is the first execution
    let store = Arc::new(FlakyWalletStore::failing_saves([5]));
    let (exchange, _) = exchange_with(store, BASE_TS);
    assert_ok!(exchange.ingest_candles(&[flat_candle(BASE_TS, dec!(100))]).await);
    let a = empty_wallet(&exchange, 14).await;
    let b = empty_wallet(&exchange, 15).await;
    assert_ok!(exchange.deposit(&a, dec!(10)).await);
    assert_ok!(exchange.deposit(&b, dec!(10)).await);
    assert_ok!(exchange.place_limit_order(&a, Side::Buy, dec!(10), dec!(200)).await);
    assert_ok!(exchange.place_limit_order(&b, Side::Buy, dec!(10), dec!(200)).await);

    let report = assert_ok!(exchange.match_orders().await);
    assert_eq!(report.examined, 2);
    assert_eq!(report.executions.len(), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].failure.kind, ErrorKind::Unavailable);

    // The failed order is still open and settles on the next pass.
    let retry = assert_ok!(exchange.match_orders().await);
    assert_eq!(retry.executions.len(), 1);
    assert!(retry.failures.is_empty());
}
