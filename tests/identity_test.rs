//! Recovery-phrase resolution through the exchange.

mod common;

use std::sync::Arc;

use rust_decimal_macros::dec;
use tokio_test::{assert_err, assert_ok};

use simex::error::ErrorKind;
use simex::identity::{SecretPhrase, fingerprint};
use simex::config::SecretKey;

use common::{BASE_TS, YieldingWalletStore, exchange_at, exchange_with};

#[tokio::test]
async fn test_shared_prefix_phrases_resolve_to_their_own_wallets() {
    let (exchange, _) = exchange_at(BASE_TS);
    let first = assert_ok!(SecretPhrase::from_entropy(&[9u8; 16]));
    let mut entropy = [9u8; 16];
    entropy[15] = 10;
    let second = assert_ok!(SecretPhrase::from_entropy(&entropy));

    let key = SecretKey::new("shared");
    assert_eq!(
        assert_ok!(fingerprint(&key, &first)),
        assert_ok!(fingerprint(&key, &second))
    );

    let a = assert_ok!(exchange.register_wallet(&first, dec!(10)).await);
    let b = assert_ok!(exchange.register_wallet(&second, dec!(20)).await);
    assert_ne!(a, b);

    assert_eq!(assert_ok!(exchange.unlock(first.expose()).await), a);
    assert_eq!(assert_ok!(exchange.unlock(second.expose()).await), b);
}

#[tokio::test]
async fn test_unlock_normalizes_input() {
    let (exchange, _) = exchange_at(BASE_TS);
    let phrase = assert_ok!(SecretPhrase::from_entropy(&[21u8; 16]));
    let id = assert_ok!(exchange.register_wallet(&phrase, dec!(0)).await);

    let shouted = format!("  {}  ", phrase.expose().to_uppercase().replace(' ', "   "));
    assert_eq!(assert_ok!(exchange.unlock(&shouted).await), id);
}

#[tokio::test]
async fn test_unlock_failures() {
    let (exchange, _) = exchange_at(BASE_TS);
    let registered = assert_ok!(SecretPhrase::from_entropy(&[30u8; 16]));
    assert_ok!(exchange.register_wallet(&registered, dec!(0)).await);

    let stranger = assert_ok!(SecretPhrase::from_entropy(&[31u8; 16]));
    let err = assert_err!(exchange.unlock(stranger.expose()).await);
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = assert_err!(exchange.unlock("too short to be a phrase").await);
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_concurrent_registrations_of_one_phrase_open_one_wallet() {
    let store = Arc::new(YieldingWalletStore::new());
    let (exchange, _) = exchange_with(store.clone(), BASE_TS);
    let phrase = assert_ok!(SecretPhrase::from_entropy(&[40u8; 16]));

    let (first, second) = tokio::join!(
        exchange.register_wallet(&phrase, dec!(0)),
        exchange.register_wallet(&phrase, dec!(0)),
    );
    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let err = outcomes
        .iter()
        .find_map(|r| r.as_ref().err())
        .expect("one registration should lose");
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(store.len().await, 1);

    let id = outcomes
        .iter()
        .find_map(|r| r.as_ref().ok().copied())
        .expect("one registration should win");
    assert_eq!(assert_ok!(exchange.unlock(phrase.expose()).await), id);
}
