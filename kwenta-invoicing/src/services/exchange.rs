//! Currency conversion backed by a live rate source.
//!
//! Rates are cached process-wide with a TTL. Concurrent refreshes collapse
//! into a single in-flight fetch: the refresh mutex is the only path to
//! the network, and every waiter re-checks the cache after acquiring it.
//! When the source times out or fails, the last-known table (or the static
//! fallback) is served with an explicit staleness flag — conversion never
//! hard-fails just because the rate source is down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use kwenta_core::error::AppError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::services::calculator::round_money;
use crate::services::metrics::RATE_FETCHES_TOTAL;

pub const PHP: &str = "PHP";

/// Rate table as returned by the exchange-rate source.
#[derive(Debug, Clone, Deserialize)]
pub struct RateTable {
    pub base: String,
    pub rates: HashMap<String, Decimal>,
}

/// Seam over the network fetch so the cache and fallback logic can be
/// exercised without a live endpoint.
#[async_trait]
pub trait RateFetcher: Send + Sync {
    async fn fetch(&self, base: &str) -> Result<RateTable, AppError>;
}

/// HTTP implementation against an exchangerate-api style endpoint.
pub struct HttpRateFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRateFetcher {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl RateFetcher for HttpRateFetcher {
    async fn fetch(&self, base: &str) -> Result<RateTable, AppError> {
        let url = format!("{}/v4/latest/{}", self.base_url, base);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::external("exchange-rate", e.into()))?;

        if !response.status().is_success() {
            return Err(AppError::external(
                "exchange-rate",
                anyhow::anyhow!("rate source returned {}", response.status()),
            ));
        }

        response
            .json::<RateTable>()
            .await
            .map_err(|e| AppError::external("exchange-rate", e.into()))
    }
}

/// A single rate with the staleness of the table it came from.
#[derive(Debug, Clone, Copy)]
pub struct RateQuote {
    pub rate: Decimal,
    pub stale: bool,
}

/// A converted amount, rounded for storage.
#[derive(Debug, Clone, Copy)]
pub struct Conversion {
    pub amount: Decimal,
    pub rate: Decimal,
    pub stale: bool,
}

struct CachedTable {
    rates: HashMap<String, Decimal>,
    fetched_at: Instant,
}

pub struct ExchangeRateService {
    fetcher: Arc<dyn RateFetcher>,
    cache: RwLock<HashMap<String, CachedTable>>,
    refresh: Mutex<()>,
    ttl: Duration,
    fetch_timeout: Duration,
}

impl ExchangeRateService {
    pub fn new(fetcher: Arc<dyn RateFetcher>, ttl: Duration, fetch_timeout: Duration) -> Self {
        Self {
            fetcher,
            cache: RwLock::new(HashMap::new()),
            refresh: Mutex::new(()),
            ttl,
            fetch_timeout,
        }
    }

    /// Rate from `from` to `to`.
    pub async fn rate(&self, from: &str, to: &str) -> Result<RateQuote, AppError> {
        if from == to {
            return Ok(RateQuote {
                rate: Decimal::ONE,
                stale: false,
            });
        }

        let (rates, stale) = self.table(from).await?;
        match rates.get(to) {
            Some(rate) => Ok(RateQuote { rate: *rate, stale }),
            None => match fallback_rate(from, to) {
                Some(rate) => Ok(RateQuote { rate, stale: true }),
                None => Err(AppError::Validation(anyhow::anyhow!(
                    "unsupported currency pair {}->{}",
                    from,
                    to
                ))),
            },
        }
    }

    /// Convert an amount, rounding the result for storage.
    pub async fn convert(
        &self,
        amount: Decimal,
        from: &str,
        to: &str,
    ) -> Result<Conversion, AppError> {
        let quote = self.rate(from, to).await?;
        Ok(Conversion {
            amount: round_money(amount * quote.rate),
            rate: quote.rate,
            stale: quote.stale,
        })
    }

    pub async fn to_php(&self, amount: Decimal, currency: &str) -> Result<Conversion, AppError> {
        self.convert(amount, currency, PHP).await
    }

    async fn table(&self, base: &str) -> Result<(HashMap<String, Decimal>, bool), AppError> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(base) {
                if entry.fetched_at.elapsed() < self.ttl {
                    return Ok((entry.rates.clone(), false));
                }
            }
        }

        // Single-flight: whoever holds the mutex fetches; everyone else
        // waits here and finds a fresh table on the re-check.
        let _guard = self.refresh.lock().await;
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(base) {
                if entry.fetched_at.elapsed() < self.ttl {
                    return Ok((entry.rates.clone(), false));
                }
            }
        }

        match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(base)).await {
            Ok(Ok(table)) => {
                debug!(base = base, "Exchange rates refreshed");
                RATE_FETCHES_TOTAL.with_label_values(&["ok"]).inc();
                let rates = table.rates;
                self.cache.write().await.insert(
                    base.to_string(),
                    CachedTable {
                        rates: rates.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                Ok((rates, false))
            }
            Ok(Err(e)) => {
                warn!(base = base, error = %e, "Rate fetch failed, serving stale rates");
                RATE_FETCHES_TOTAL.with_label_values(&["error"]).inc();
                self.stale_or_fallback(base).await
            }
            Err(_) => {
                warn!(
                    base = base,
                    timeout_ms = self.fetch_timeout.as_millis() as u64,
                    "Rate fetch timed out, serving stale rates"
                );
                RATE_FETCHES_TOTAL.with_label_values(&["timeout"]).inc();
                self.stale_or_fallback(base).await
            }
        }
    }

    async fn stale_or_fallback(&self, base: &str) -> Result<(HashMap<String, Decimal>, bool), AppError> {
        let cache = self.cache.read().await;
        if let Some(entry) = cache.get(base) {
            return Ok((entry.rates.clone(), true));
        }
        match fallback_table(base) {
            Some(rates) => Ok((rates, true)),
            None => Err(AppError::external(
                "exchange-rate",
                anyhow::anyhow!("no live or fallback rates for base {}", base),
            )),
        }
    }
}

/// PHP value of one unit of each supported currency, used when the source
/// is unreachable and nothing is cached.
const STATIC_PHP_RATES: &[(&str, Decimal)] = &[
    ("PHP", dec!(1)),
    ("USD", dec!(56.50)),
    ("EUR", dec!(61.20)),
    ("GBP", dec!(71.80)),
    ("AUD", dec!(37.10)),
    ("CAD", dec!(41.30)),
    ("SGD", dec!(41.90)),
    ("HKD", dec!(7.25)),
    ("JPY", dec!(0.38)),
];

fn php_value(currency: &str) -> Option<Decimal> {
    STATIC_PHP_RATES
        .iter()
        .find(|(code, _)| *code == currency)
        .map(|(_, value)| *value)
}

fn fallback_rate(from: &str, to: &str) -> Option<Decimal> {
    Some(php_value(from)? / php_value(to)?)
}

fn fallback_table(base: &str) -> Option<HashMap<String, Decimal>> {
    php_value(base)?;
    Some(
        STATIC_PHP_RATES
            .iter()
            .filter_map(|(code, _)| Some(((*code).to_string(), fallback_rate(base, code)?)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service_over(url: String) -> ExchangeRateService {
        ExchangeRateService::new(
            Arc::new(HttpRateFetcher::new(url)),
            Duration::from_secs(900),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn converts_using_live_rates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/latest/USD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "base": "USD",
                "rates": { "PHP": 56.0, "EUR": 0.9 }
            })))
            .mount(&server)
            .await;

        let rates = service_over(server.uri());
        let conversion = rates.to_php(dec!(10), "USD").await.unwrap();
        assert_eq!(conversion.amount, dec!(560.00));
        assert_eq!(conversion.rate, dec!(56.0));
        assert!(!conversion.stale);
    }

    #[tokio::test]
    async fn second_lookup_hits_the_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/latest/USD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "base": "USD",
                "rates": { "PHP": 56.0 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let rates = service_over(server.uri());
        rates.to_php(dec!(1), "USD").await.unwrap();
        rates.to_php(dec!(2), "USD").await.unwrap();
        server.verify().await;
    }

    #[tokio::test]
    async fn source_failure_serves_static_fallback_marked_stale() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let rates = service_over(server.uri());
        let conversion = rates.to_php(dec!(100), "USD").await.unwrap();
        assert_eq!(conversion.amount, dec!(5650.00));
        assert!(conversion.stale);
    }

    #[tokio::test]
    async fn source_failure_prefers_last_known_rates_over_static() {
        let server = MockServer::start().await;
        let ok = Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "base": "USD",
                "rates": { "PHP": 57.5 }
            })))
            .expect(1)
            .mount_as_scoped(&server)
            .await;

        // TTL of zero: every lookup refetches, so the second one sees the
        // source down with a populated cache.
        let rates = ExchangeRateService::new(
            Arc::new(HttpRateFetcher::new(server.uri())),
            Duration::ZERO,
            Duration::from_secs(5),
        );
        let fresh = rates.to_php(dec!(1), "USD").await.unwrap();
        assert_eq!(fresh.rate, dec!(57.5));
        drop(ok);

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let stale = rates.to_php(dec!(1), "USD").await.unwrap();
        assert_eq!(stale.rate, dec!(57.5));
        assert!(stale.stale);
    }

    #[tokio::test]
    async fn same_currency_is_identity() {
        struct Panicking;
        #[async_trait]
        impl RateFetcher for Panicking {
            async fn fetch(&self, _base: &str) -> Result<RateTable, AppError> {
                panic!("identity conversion must not hit the network");
            }
        }

        let rates = ExchangeRateService::new(
            Arc::new(Panicking),
            Duration::from_secs(900),
            Duration::from_secs(5),
        );
        let conversion = rates.to_php(dec!(42), "PHP").await.unwrap();
        assert_eq!(conversion.amount, dec!(42.00));
        assert_eq!(conversion.rate, Decimal::ONE);
    }

    #[tokio::test]
    async fn concurrent_refreshes_collapse_into_one_fetch() {
        struct Counting(AtomicUsize);
        #[async_trait]
        impl RateFetcher for Counting {
            async fn fetch(&self, _base: &str) -> Result<RateTable, AppError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(RateTable {
                    base: "USD".to_string(),
                    rates: HashMap::from([("PHP".to_string(), dec!(56))]),
                })
            }
        }

        let fetcher = Arc::new(Counting(AtomicUsize::new(0)));
        let rates = Arc::new(ExchangeRateService::new(
            fetcher.clone(),
            Duration::from_secs(900),
            Duration::from_secs(5),
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let rates = rates.clone();
            handles.push(tokio::spawn(async move {
                rates.to_php(dec!(1), "USD").await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(fetcher.0.load(Ordering::SeqCst), 1);
    }
}
