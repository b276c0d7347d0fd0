// tests/common/mod.rs
//
// Shared fixtures: a scripted in-memory transport and upstream payloads
// shaped like the real providers' responses.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use cryptoverse_client::config::ClientConfig;
use cryptoverse_client::registry::EndpointRegistry;
use cryptoverse_client::request::{Params, RequestSpec};
use cryptoverse_client::transport::Transport;
use cryptoverse_client::{CryptoClient, FetchError};

/// Answers from a script first, then repeats the fallback forever.
pub struct FakeTransport {
    calls: AtomicUsize,
    delay: Duration,
    script: Mutex<VecDeque<Result<Value, FetchError>>>,
    fallback: Result<Value, FetchError>,
    seen: Mutex<Vec<RequestSpec>>,
}

impl FakeTransport {
    pub fn ok(body: Value) -> Self {
        Self::answering(Ok(body))
    }

    pub fn failing(err: FetchError) -> Self {
        Self::answering(Err(err))
    }

    fn answering(fallback: Result<Value, FetchError>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            script: Mutex::new(VecDeque::new()),
            fallback,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue one answer ahead of the fallback.
    pub fn then(self, answer: Result<Value, FetchError>) -> Self {
        self.script.lock().unwrap().push_back(answer);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|r| r.url.clone()).collect()
    }

    pub fn last_request(&self) -> Option<RequestSpec> {
        self.seen.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: &RequestSpec) -> Result<Value, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Defaults with recognisable test hosts and keys.
pub fn test_config() -> ClientConfig {
    let mut cfg = ClientConfig::default();
    cfg.coinranking.base_url = "https://coins.test".into();
    cfg.coinranking.api_key = Some("rapid-key".into());
    cfg.bing_news.base_url = "https://bing.test".into();
    cfg.bing_news.api_key = Some("rapid-key".into());
    cfg.newsapi.base_url = "https://newsapi.test".into();
    cfg.newsapi.api_key = Some("news-key".into());
    cfg
}

pub fn client_with(transport: Arc<FakeTransport>) -> CryptoClient {
    client_with_config(transport, &test_config())
}

pub fn client_with_config(transport: Arc<FakeTransport>, cfg: &ClientConfig) -> CryptoClient {
    let registry = EndpointRegistry::builtin(cfg).expect("builtin registry");
    CryptoClient::new(registry, transport, cfg)
}

pub fn params(pairs: &[(&str, &str)]) -> Params {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn coins_payload() -> Value {
    json!({
        "status": "success",
        "data": {
            "stats": { "total": 3, "totalCoins": 3, "totalMarkets": 100, "totalExchanges": 10,
                       "totalMarketCap": "1200000000000", "total24hVolume": "45000000000" },
            "coins": [
                { "uuid": "Qwsogvtv82FCd", "symbol": "BTC", "name": "Bitcoin", "price": "64000.12",
                  "marketCap": "1260000000000", "change": "-1.2", "rank": 1 },
                { "uuid": "razxDUgYGNAdQ", "symbol": "ETH", "name": "Ethereum", "price": "3100.5",
                  "marketCap": "372000000000", "change": "0.8", "rank": 2 },
                { "uuid": "HIVsRcGKkPFtW", "symbol": "USDT", "name": "Tether", "price": "1.0",
                  "marketCap": "110000000000", "change": "0.01", "rank": 3 }
            ]
        }
    })
}

pub fn history_payload() -> Value {
    json!({
        "status": "success",
        "data": {
            "change": "2.5",
            "history": [
                { "price": "64000", "timestamp": 1700000000 },
                { "price": null, "timestamp": 1699990000 }
            ]
        }
    })
}

/// newsapi.org response with `total` articles, the first `described` having a description.
pub fn newsapi_payload(total: usize, described: usize) -> Value {
    let articles: Vec<Value> = (0..total)
        .map(|i| {
            json!({
                "title": format!("Headline {i}"),
                "url": format!("https://news.test/{i}"),
                "description": if i < described { Value::from(format!("Story {i}")) } else { Value::Null },
                "urlToImage": null,
                "publishedAt": "2024-05-01T10:00:00Z"
            })
        })
        .collect();
    json!({ "status": "ok", "totalResults": total, "articles": articles })
}

pub fn bing_payload(total: usize) -> Value {
    let value: Vec<Value> = (0..total)
        .map(|i| {
            json!({
                "name": format!("Bitcoin &amp; friends {i}"),
                "url": format!("https://bing.test/{i}"),
                "description": "Markets moved.",
                "image": { "thumbnail": { "contentUrl": format!("https://img.test/{i}.jpg") } },
                "datePublished": "2024-05-01T10:00:00.0000000Z"
            })
        })
        .collect();
    json!({ "_type": "News", "value": value })
}
