//! Blockchain-data collaborator interface.
//!
//! The engine consumes chain data through the [`DataProvider`] capability
//! trait and never talks to a transport directly. Endpoint fallback, retry
//! with backoff, and the fee-quote cache live here; the engine itself
//! performs no retries and surfaces the terminal error.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;

use chain_btc::fee::FeeQuote;
use chain_btc::rbf::PriorTransaction;
use chain_btc::transaction::PrevOut;
use chain_btc::utxo::Utxo;

/// Failures of the data-provider collaborator. Transient by nature; the
/// provider layer retries, the engine does not.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("malformed provider response: {0}")]
    Parse(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("all {attempts} provider attempts failed; last error: {last}")]
    Exhausted { attempts: u32, last: String },
}

/// Capability set the engine needs from a blockchain-data source. Not
/// transport-specific: implementations may be HTTP-backed, node-backed, or
/// in-memory fixtures.
pub trait DataProvider {
    /// UTXO set of an address. Entries carry their confirmation state; the
    /// engine additionally filters, so returning unconfirmed entries is
    /// acceptable.
    fn confirmed_utxos(&self, address: &str) -> Result<Vec<Utxo>, ProviderError>;

    /// Previous-output record for one outpoint, resolved to the tagged
    /// witness/legacy form once at lookup time.
    fn prev_out(&self, txid: &str, vout: u32) -> Result<PrevOut, ProviderError>;

    /// Current network fee-rate quote.
    fn fee_quote(&self) -> Result<FeeQuote, ProviderError>;

    /// Submit a raw transaction; returns the txid accepted by the network.
    fn broadcast(&self, tx_hex: &str) -> Result<String, ProviderError>;

    /// Look up a transaction with its input prevout addresses and values.
    fn transaction(&self, txid: &str) -> Result<PriorTransaction, ProviderError>;

    /// Whether the given unconfirmed transaction signals replace-by-fee.
    fn supports_rbf(&self, txid: &str) -> Result<bool, ProviderError>;
}

/// Ordered list of providers tried in sequence. The first success wins;
/// the last failure is returned when every endpoint misbehaves.
pub struct FallbackProvider<P> {
    providers: Vec<P>,
}

impl<P: DataProvider> FallbackProvider<P> {
    pub fn new(providers: Vec<P>) -> Self {
        Self { providers }
    }

    fn try_each<T>(
        &self,
        mut op: impl FnMut(&P) -> Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        let mut last = ProviderError::Network("no providers configured".into());
        for (index, provider) in self.providers.iter().enumerate() {
            match op(provider) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    tracing::debug!(endpoint = index, error = %err, "provider endpoint failed");
                    last = err;
                }
            }
        }
        Err(last)
    }
}

impl<P: DataProvider> DataProvider for FallbackProvider<P> {
    fn confirmed_utxos(&self, address: &str) -> Result<Vec<Utxo>, ProviderError> {
        self.try_each(|p| p.confirmed_utxos(address))
    }
    fn prev_out(&self, txid: &str, vout: u32) -> Result<PrevOut, ProviderError> {
        self.try_each(|p| p.prev_out(txid, vout))
    }
    fn fee_quote(&self) -> Result<FeeQuote, ProviderError> {
        self.try_each(|p| p.fee_quote())
    }
    fn broadcast(&self, tx_hex: &str) -> Result<String, ProviderError> {
        self.try_each(|p| p.broadcast(tx_hex))
    }
    fn transaction(&self, txid: &str) -> Result<PriorTransaction, ProviderError> {
        self.try_each(|p| p.transaction(txid))
    }
    fn supports_rbf(&self, txid: &str) -> Result<bool, ProviderError> {
        self.try_each(|p| p.supports_rbf(txid))
    }
}

/// Retry an idempotent provider call with exponential backoff. Fee and
/// balance reads are safe to retry; broadcasts are not idempotent and must
/// not go through this helper.
pub fn retry_with_backoff<T>(
    attempts: u32,
    initial_delay: Duration,
    mut op: impl FnMut() -> Result<T, ProviderError>,
) -> Result<T, ProviderError> {
    let mut delay = initial_delay;
    let mut last = ProviderError::Network("no attempts made".into());
    for attempt in 0..attempts {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::debug!(attempt, error = %err, "provider call failed, backing off");
                last = err;
            }
        }
        if attempt + 1 < attempts {
            std::thread::sleep(delay);
            delay *= 2;
        }
    }
    Err(ProviderError::Exhausted {
        attempts,
        last: last.to_string(),
    })
}

/// Poll for a broadcast transaction to appear, with increasing delay
/// between attempts. Returns whether the transaction was observed
/// confirmed; seeing it at all means the broadcast took.
pub fn await_confirmation<P: DataProvider>(
    provider: &P,
    txid: &str,
    attempts: u32,
    initial_delay: Duration,
) -> Result<bool, ProviderError> {
    retry_with_backoff(attempts, initial_delay, || provider.transaction(txid))
        .map(|tx| tx.confirmed)
}

/// Explicitly owned, time-stamped fee-quote cache with a caller-chosen
/// TTL. Replaces ambient timestamp checks: expiry is decided against the
/// instant the quote was stored.
pub struct FeeQuoteCache {
    ttl: Duration,
    slot: Mutex<Option<(Instant, FeeQuote)>>,
}

impl FeeQuoteCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached quote when fresh, otherwise fetch and store.
    pub fn get_or_fetch(
        &self,
        fetch: impl FnOnce() -> Result<FeeQuote, ProviderError>,
    ) -> Result<FeeQuote, ProviderError> {
        let mut slot = self.slot.lock().expect("fee cache poisoned");
        if let Some((stamped_at, quote)) = *slot {
            if stamped_at.elapsed() < self.ttl {
                return Ok(quote);
            }
        }
        let quote = fetch()?;
        *slot = Some((Instant::now(), quote));
        Ok(quote)
    }

    /// Drop the cached quote, forcing the next read to fetch.
    pub fn invalidate(&self) {
        *self.slot.lock().expect("fee cache poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn quote(economy: u64) -> FeeQuote {
        FeeQuote {
            fastest: 20,
            half_hour: 10,
            hour: 5,
            economy,
            minimum: 1,
        }
    }

    /// Provider that fails every call except `fee_quote`, which returns a
    /// configurable quote or an error.
    struct FlakyProvider {
        fail: bool,
        economy: u64,
        calls: Cell<u32>,
    }

    impl FlakyProvider {
        fn ok(economy: u64) -> Self {
            Self {
                fail: false,
                economy,
                calls: Cell::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                economy: 0,
                calls: Cell::new(0),
            }
        }
    }

    impl DataProvider for FlakyProvider {
        fn confirmed_utxos(&self, _address: &str) -> Result<Vec<Utxo>, ProviderError> {
            Err(ProviderError::Network("down".into()))
        }
        fn prev_out(&self, _txid: &str, _vout: u32) -> Result<PrevOut, ProviderError> {
            Err(ProviderError::Network("down".into()))
        }
        fn fee_quote(&self) -> Result<FeeQuote, ProviderError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                Err(ProviderError::Network("down".into()))
            } else {
                Ok(quote(self.economy))
            }
        }
        fn broadcast(&self, _tx_hex: &str) -> Result<String, ProviderError> {
            Err(ProviderError::Network("down".into()))
        }
        fn transaction(&self, txid: &str) -> Result<PriorTransaction, ProviderError> {
            Err(ProviderError::NotFound(txid.into()))
        }
        fn supports_rbf(&self, _txid: &str) -> Result<bool, ProviderError> {
            Ok(true)
        }
    }

    #[test]
    fn fallback_uses_first_healthy_endpoint() {
        let fallback =
            FallbackProvider::new(vec![FlakyProvider::failing(), FlakyProvider::ok(7)]);
        let q = fallback.fee_quote().unwrap();
        assert_eq!(q.economy, 7);
    }

    #[test]
    fn fallback_preserves_endpoint_order() {
        let fallback = FallbackProvider::new(vec![FlakyProvider::ok(3), FlakyProvider::ok(9)]);
        // The second endpoint must never be consulted.
        let q = fallback.fee_quote().unwrap();
        assert_eq!(q.economy, 3);
        assert_eq!(fallback.providers[1].calls.get(), 0);
    }

    #[test]
    fn fallback_surfaces_last_error_when_all_fail() {
        let fallback =
            FallbackProvider::new(vec![FlakyProvider::failing(), FlakyProvider::failing()]);
        assert!(fallback.fee_quote().is_err());
    }

    #[test]
    fn retry_gives_up_after_the_attempt_budget() {
        let mut calls = 0;
        let result: Result<(), _> = retry_with_backoff(3, Duration::ZERO, || {
            calls += 1;
            Err(ProviderError::Network("down".into()))
        });
        assert!(matches!(result, Err(ProviderError::Exhausted { attempts: 3, .. })));
        assert_eq!(calls, 3);
    }

    #[test]
    fn retry_stops_on_first_success() {
        let mut calls = 0;
        let result = retry_with_backoff(5, Duration::ZERO, || {
            calls += 1;
            if calls < 3 {
                Err(ProviderError::Network("down".into()))
            } else {
                Ok(42u32)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 3);
    }

    /// Provider whose `transaction` lookup succeeds with a fixed record.
    struct SettledProvider {
        confirmed: bool,
    }

    impl DataProvider for SettledProvider {
        fn confirmed_utxos(&self, _address: &str) -> Result<Vec<Utxo>, ProviderError> {
            Ok(vec![])
        }
        fn prev_out(&self, _txid: &str, _vout: u32) -> Result<PrevOut, ProviderError> {
            Err(ProviderError::NotFound("prevout".into()))
        }
        fn fee_quote(&self) -> Result<FeeQuote, ProviderError> {
            Ok(quote(2))
        }
        fn broadcast(&self, _tx_hex: &str) -> Result<String, ProviderError> {
            Ok("0".repeat(64))
        }
        fn transaction(&self, txid: &str) -> Result<PriorTransaction, ProviderError> {
            Ok(PriorTransaction {
                txid: txid.to_string(),
                confirmed: self.confirmed,
                inputs: vec![],
                outputs: vec![],
            })
        }
        fn supports_rbf(&self, _txid: &str) -> Result<bool, ProviderError> {
            Ok(true)
        }
    }

    #[test]
    fn await_confirmation_reports_confirmation_state() {
        let settled = SettledProvider { confirmed: true };
        assert!(await_confirmation(&settled, "ab", 2, Duration::ZERO).unwrap());

        let pending = SettledProvider { confirmed: false };
        assert!(!await_confirmation(&pending, "ab", 2, Duration::ZERO).unwrap());
    }

    #[test]
    fn await_confirmation_exhausts_on_missing_transaction() {
        let provider = FlakyProvider::failing();
        assert!(matches!(
            await_confirmation(&provider, "ab", 2, Duration::ZERO),
            Err(ProviderError::Exhausted { attempts: 2, .. })
        ));
    }

    #[test]
    fn fee_cache_serves_fresh_quotes_without_refetching() {
        let provider = FlakyProvider::ok(2);
        let cache = FeeQuoteCache::new(Duration::from_secs(300));

        cache.get_or_fetch(|| provider.fee_quote()).unwrap();
        cache.get_or_fetch(|| provider.fee_quote()).unwrap();
        assert_eq!(provider.calls.get(), 1);
    }

    #[test]
    fn fee_cache_refetches_after_expiry() {
        let provider = FlakyProvider::ok(2);
        let cache = FeeQuoteCache::new(Duration::ZERO);

        cache.get_or_fetch(|| provider.fee_quote()).unwrap();
        cache.get_or_fetch(|| provider.fee_quote()).unwrap();
        assert_eq!(provider.calls.get(), 2);
    }

    #[test]
    fn fee_cache_invalidate_forces_fetch() {
        let provider = FlakyProvider::ok(2);
        let cache = FeeQuoteCache::new(Duration::from_secs(300));

        cache.get_or_fetch(|| provider.fee_quote()).unwrap();
        cache.invalidate();
        cache.get_or_fetch(|| provider.fee_quote()).unwrap();
        assert_eq!(provider.calls.get(), 2);
    }

    #[test]
    fn fee_cache_propagates_fetch_errors_without_storing() {
        let failing = FlakyProvider::failing();
        let healthy = FlakyProvider::ok(4);
        let cache = FeeQuoteCache::new(Duration::from_secs(300));

        assert!(cache.get_or_fetch(|| failing.fee_quote()).is_err());
        // A failed fetch must not poison the slot.
        let q = cache.get_or_fetch(|| healthy.fee_quote()).unwrap();
        assert_eq!(q.economy, 4);
    }
}
