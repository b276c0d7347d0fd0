// src/client.rs
//! # Crypto client
//! The consumer-facing handle: one explicit instance owning its registry,
//! cache and transport. Cheap to clone; clones share the cache.
//!
//! `fetch` is the generic entry (operation name + params); the typed helpers
//! cover the built-in operations the dashboard uses.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::CacheStore;
use crate::config::ClientConfig;
use crate::error::FetchError;
use crate::orchestrator::{FetchOptions, FetchOrchestrator, Fetched};
use crate::projection::{CoinDetail, CoinHistory, CoinList, DomainObject, Exchange, NewsItem};
use crate::registry::{names, EndpointRegistry};
use crate::request::Params;
use crate::transport::{ReqwestTransport, Transport};

/// Chart periods offered by the dashboard's period selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimePeriod {
    #[serde(rename = "3h")]
    ThreeHours,
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "3m")]
    Quarter,
    #[serde(rename = "1y")]
    Year,
    #[serde(rename = "3y")]
    ThreeYears,
    #[default]
    #[serde(rename = "5y")]
    FiveYears,
}

impl TimePeriod {
    pub const ALL: [TimePeriod; 8] = [
        TimePeriod::ThreeHours,
        TimePeriod::Day,
        TimePeriod::Week,
        TimePeriod::Month,
        TimePeriod::Quarter,
        TimePeriod::Year,
        TimePeriod::ThreeYears,
        TimePeriod::FiveYears,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimePeriod::ThreeHours => "3h",
            TimePeriod::Day => "24h",
            TimePeriod::Week => "7d",
            TimePeriod::Month => "30d",
            TimePeriod::Quarter => "3m",
            TimePeriod::Year => "1y",
            TimePeriod::ThreeYears => "3y",
            TimePeriod::FiveYears => "5y",
        }
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimePeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        TimePeriod::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown time period {s:?}"))
    }
}

#[derive(Clone)]
pub struct CryptoClient {
    registry: Arc<EndpointRegistry>,
    orchestrator: FetchOrchestrator,
}

impl CryptoClient {
    /// Built-in endpoints over HTTPS, configured from `cfg`.
    pub fn from_config(cfg: &ClientConfig) -> Result<Self, FetchError> {
        let registry = EndpointRegistry::builtin(cfg)?;
        let transport = ReqwestTransport::new(cfg.timeout())?;
        Ok(Self::new(registry, Arc::new(transport), cfg))
    }

    /// Any registry over any transport (tests use fakes here).
    pub fn new(registry: EndpointRegistry, transport: Arc<dyn Transport>, cfg: &ClientConfig) -> Self {
        let cache = CacheStore::with_max_entries(cfg.max_entries);
        let orchestrator =
            FetchOrchestrator::new(transport, cache, cfg.default_ttl(), cfg.timeout());
        Self {
            registry: Arc::new(registry),
            orchestrator,
        }
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn orchestrator(&self) -> &FetchOrchestrator {
        &self.orchestrator
    }

    pub fn cache(&self) -> &CacheStore {
        self.orchestrator.cache()
    }

    pub async fn fetch(
        &self,
        operation: &str,
        params: &Params,
        options: FetchOptions,
    ) -> Result<Fetched<DomainObject>, FetchError> {
        let descriptor = self.registry.lookup(operation)?;
        self.orchestrator.fetch(&descriptor, params, &options).await
    }

    pub async fn coins(
        &self,
        limit: Option<u32>,
        options: FetchOptions,
    ) -> Result<Fetched<CoinList>, FetchError> {
        let mut params = Params::new();
        if let Some(n) = limit {
            params.insert("limit".into(), n.to_string());
        }
        self.fetch(names::COINS, &params, options)
            .await?
            .try_map(|d| match d {
                DomainObject::CoinList(v) => Ok(v),
                other => Err(mismatch(names::COINS, "coin_list", &other)),
            })
    }

    pub async fn coin_details(
        &self,
        coin_id: &str,
        options: FetchOptions,
    ) -> Result<Fetched<CoinDetail>, FetchError> {
        let params = Params::from([("coinId".to_string(), coin_id.to_string())]);
        self.fetch(names::COIN_DETAILS, &params, options)
            .await?
            .try_map(|d| match d {
                DomainObject::CoinDetail(v) => Ok(v),
                other => Err(mismatch(names::COIN_DETAILS, "coin_detail", &other)),
            })
    }

    pub async fn coin_history(
        &self,
        coin_id: &str,
        period: TimePeriod,
        options: FetchOptions,
    ) -> Result<Fetched<CoinHistory>, FetchError> {
        let params = Params::from([
            ("coinId".to_string(), coin_id.to_string()),
            ("timePeriod".to_string(), period.to_string()),
        ]);
        self.fetch(names::COIN_HISTORY, &params, options)
            .await?
            .try_map(|d| match d {
                DomainObject::CoinHistory(v) => Ok(v),
                other => Err(mismatch(names::COIN_HISTORY, "coin_history", &other)),
            })
    }

    pub async fn exchanges(&self, options: FetchOptions) -> Result<Fetched<Vec<Exchange>>, FetchError> {
        self.fetch(names::EXCHANGES, &Params::new(), options)
            .await?
            .try_map(|d| match d {
                DomainObject::Exchanges(v) => Ok(v),
                other => Err(mismatch(names::EXCHANGES, "exchanges", &other)),
            })
    }

    /// Bing news search for a category (e.g. "Cryptocurrency" or a coin name).
    pub async fn crypto_news(
        &self,
        category: &str,
        count: u32,
        options: FetchOptions,
    ) -> Result<Fetched<Vec<NewsItem>>, FetchError> {
        let params = Params::from([
            ("q".to_string(), category.to_string()),
            ("count".to_string(), count.to_string()),
        ]);
        self.news(names::CRYPTO_NEWS, &params, options).await
    }

    /// newsapi.org full-text search, first page.
    pub async fn coin_news(
        &self,
        query: &str,
        options: FetchOptions,
    ) -> Result<Fetched<Vec<NewsItem>>, FetchError> {
        let params = Params::from([("q".to_string(), query.to_string())]);
        self.news(names::COIN_NEWS, &params, options).await
    }

    async fn news(
        &self,
        operation: &'static str,
        params: &Params,
        options: FetchOptions,
    ) -> Result<Fetched<Vec<NewsItem>>, FetchError> {
        self.fetch(operation, params, options)
            .await?
            .try_map(|d| match d {
                DomainObject::News(v) => Ok(v),
                other => Err(mismatch(operation, "news", &other)),
            })
    }
}

fn mismatch(endpoint: &str, expected: &str, got: &DomainObject) -> FetchError {
    FetchError::schema(endpoint, format!("expected {expected}, got {}", got.kind()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_period_round_trips_selector_values() {
        for raw in ["3h", "24h", "7d", "30d", "1y", "3m", "3y", "5y"] {
            let p: TimePeriod = raw.parse().unwrap();
            assert_eq!(p.to_string(), raw);
        }
        assert_eq!(TimePeriod::default(), TimePeriod::FiveYears);
        assert!("2w".parse::<TimePeriod>().is_err());
    }
}
