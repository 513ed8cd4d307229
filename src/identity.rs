//! Recovery-phrase identity.
//!
//! A wallet is identified by a 12-word BIP-39 phrase. Only two derived
//! values are stored: a *fingerprint* (HMAC-SHA256 of the first four
//! words under a server key, indexed) and a *verifier* (Argon2id hash of
//! the whole phrase). Lookup narrows candidates by fingerprint and then
//! verifies each one in full, so a fingerprint match alone never
//! identifies a wallet.

use std::fmt;
use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::prelude::*;
use bip39::Mnemonic;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

use crate::config::SecretKey;
use crate::models::WalletId;
use crate::store::WalletStore;
use crate::{ExchangeError, Result};

/// Words in a recovery phrase.
pub const PHRASE_WORDS: usize = 12;

/// Leading words covered by the fingerprint.
const FINGERPRINT_WORDS: usize = 4;

/// Entropy behind a 12-word phrase (128 bits).
const ENTROPY_BYTES: usize = 16;

/// A normalized recovery phrase. Wiped from memory on drop and never
/// printed by `Debug`.
pub struct SecretPhrase(Zeroizing<String>);

impl SecretPhrase {
    /// Generates a fresh phrase from OS randomness.
    pub fn generate() -> Result<Self> {
        let mut entropy = Zeroizing::new([0u8; ENTROPY_BYTES]);
        rand::thread_rng().fill_bytes(&mut entropy[..]);
        Self::from_entropy(&entropy[..])
    }

    /// Derives the English BIP-39 phrase for `entropy`.
    pub fn from_entropy(entropy: &[u8]) -> Result<Self> {
        let mnemonic = Mnemonic::from_entropy(entropy)
            .map_err(|e| ExchangeError::invalid(format!("invalid phrase entropy: {e}")))?;
        Self::parse(&Zeroizing::new(mnemonic.to_string()))
    }

    /// Normalizes caller input: words are lowercased and single-spaced.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::InvalidInput`] unless the input has exactly
    /// [`PHRASE_WORDS`] words.
    pub fn parse(text: &str) -> Result<Self> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.len() != PHRASE_WORDS {
            return Err(ExchangeError::invalid(format!(
                "seed phrase must be exactly {PHRASE_WORDS} words, got {}",
                words.len()
            )));
        }
        Ok(Self(Zeroizing::new(words.join(" ").to_lowercase())))
    }

    /// The phrase itself. Hand it to the user once; never log it.
    pub fn expose(&self) -> &str {
        &self.0
    }

    fn prefix(&self) -> Zeroizing<String> {
        let words: Vec<&str> = self.0.split(' ').take(FINGERPRINT_WORDS).collect();
        Zeroizing::new(words.join(" "))
    }
}

impl fmt::Debug for SecretPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretPhrase(<redacted>)")
    }
}

/// Stored derivatives of a phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub fingerprint: String,
    pub verifier: String,
}

/// Keyed hash of the phrase's leading words, base64url without padding.
pub fn fingerprint(key: &SecretKey, phrase: &SecretPhrase) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key.expose())
        .map_err(|e| ExchangeError::Config(format!("invalid fingerprint key: {e}")))?;
    mac.update(phrase.prefix().as_bytes());
    Ok(BASE64_URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

/// Salted Argon2id hash of the full phrase in PHC string form.
pub fn hash_verifier(phrase: &SecretPhrase) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(phrase.expose().as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ExchangeError::Unavailable(format!("failed to hash seed phrase: {e}")))
}

/// Checks a phrase against a stored verifier. Malformed verifiers never match.
pub fn verify(phrase: &SecretPhrase, verifier: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(verifier) else {
        return false;
    };
    Argon2::default()
        .verify_password(phrase.expose().as_bytes(), &parsed)
        .is_ok()
}

/// Maps recovery phrases to wallet ids.
pub struct IdentityResolver {
    store: Arc<dyn WalletStore>,
    key: SecretKey,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn WalletStore>, key: SecretKey) -> Self {
        Self { store, key }
    }

    /// Derives the values stored on a new wallet for `phrase`.
    pub fn credentials(&self, phrase: &SecretPhrase) -> Result<Credentials> {
        Ok(Credentials {
            fingerprint: fingerprint(&self.key, phrase)?,
            verifier: hash_verifier(phrase)?,
        })
    }

    /// Resolves raw caller input to a wallet id.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::InvalidInput`] for a phrase that is not 12 words,
    /// [`ExchangeError::NotFound`] when no wallet verifies.
    pub async fn resolve(&self, candidate: &str) -> Result<WalletId> {
        let phrase = SecretPhrase::parse(candidate)?;
        self.resolve_phrase(&phrase).await
    }

    pub async fn resolve_phrase(&self, phrase: &SecretPhrase) -> Result<WalletId> {
        let fingerprint = fingerprint(&self.key, phrase)?;
        let bucket = self.store.find_by_fingerprint(&fingerprint).await?;
        debug!(candidates = bucket.len(), "Fingerprint bucket loaded");

        bucket
            .iter()
            .find(|wallet| verify(phrase, &wallet.secret_verifier))
            .map(|wallet| wallet.id)
            .ok_or_else(|| ExchangeError::not_found("wallet"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SecretKey {
        SecretKey::new("test-key")
    }

    #[test]
    fn generated_phrase_has_twelve_words() {
        let phrase = SecretPhrase::generate().unwrap();
        assert_eq!(phrase.expose().split(' ').count(), PHRASE_WORDS);
    }

    #[test]
    fn parse_rejects_wrong_word_count() {
        assert!(SecretPhrase::parse("one two three").is_err());
        let thirteen = ["abandon"; 13].join(" ");
        assert!(SecretPhrase::parse(&thirteen).is_err());
    }

    #[test]
    fn parse_normalizes_spacing_and_case() {
        let phrase = SecretPhrase::parse(&["Abandon "; 12].concat()).unwrap();
        assert_eq!(phrase.expose(), ["abandon"; 12].join(" "));
    }

    #[test]
    fn debug_is_redacted() {
        let phrase = SecretPhrase::generate().unwrap();
        assert_eq!(format!("{phrase:?}"), "SecretPhrase(<redacted>)");
    }

    #[test]
    fn fingerprint_depends_only_on_prefix_and_key() {
        let a = SecretPhrase::from_entropy(&[7u8; 16]).unwrap();
        let mut other = [7u8; 16];
        other[15] = 8;
        let b = SecretPhrase::from_entropy(&other).unwrap();
        assert_ne!(a.expose(), b.expose());

        assert_eq!(fingerprint(&key(), &a).unwrap(), fingerprint(&key(), &b).unwrap());
        assert_ne!(
            fingerprint(&key(), &a).unwrap(),
            fingerprint(&SecretKey::new("other-key"), &a).unwrap()
        );
    }

    #[test]
    fn verifier_matches_only_its_phrase() {
        let a = SecretPhrase::from_entropy(&[1u8; 16]).unwrap();
        let b = SecretPhrase::from_entropy(&[2u8; 16]).unwrap();
        let verifier = hash_verifier(&a).unwrap();

        assert!(verifier.starts_with("$argon2id$"));
        assert!(verify(&a, &verifier));
        assert!(!verify(&b, &verifier));
        assert!(!verify(&a, "not-a-phc-string"));
    }
}
