// src/registry.rs
//! Endpoint descriptor registry: logical operation name → request template.
//!
//! Filled once at startup, read-only afterwards. Every descriptor is checked
//! on registration; a broken table is a configuration bug and fails fast.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;

use crate::config::{ClientConfig, ProviderConfig, ProviderKind};
use crate::error::FetchError;

/// Names of the built-in operations.
pub mod names {
    pub const COINS: &str = "coins";
    pub const COIN_DETAILS: &str = "coinDetails";
    pub const COIN_HISTORY: &str = "coinHistory";
    pub const EXCHANGES: &str = "exchanges";
    pub const CRYPTO_NEWS: &str = "cryptoNews";
    pub const COIN_NEWS: &str = "coinNews";
}

/// USD, the reference currency the dashboard quotes prices in.
const USD_REFERENCE_UUID: &str = "yhjMzLPhuIDl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// Which response shape an endpoint returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Projection {
    CoinList,
    CoinDetail,
    CoinHistory,
    Exchanges,
    NewsApiArticles,
    BingNews,
    /// Unknown shape; handed through untouched.
    Raw,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub name: String,
    pub method: Method,
    pub base_url: String,
    pub path_template: String,
    pub required_params: BTreeSet<String>,
    /// `None` default means "omit when the caller does not pass it".
    pub optional_params: BTreeMap<String, Option<String>>,
    pub header_template: BTreeMap<String, String>,
    pub projection: Projection,
}

impl EndpointDescriptor {
    pub fn new(name: &str, method: Method, base_url: &str, path_template: &str) -> Self {
        Self {
            name: name.to_string(),
            method,
            base_url: base_url.trim_end_matches('/').to_string(),
            path_template: path_template.to_string(),
            required_params: BTreeSet::new(),
            optional_params: BTreeMap::new(),
            header_template: BTreeMap::new(),
            projection: Projection::Raw,
        }
    }

    pub fn get(name: &str, base_url: &str, path_template: &str) -> Self {
        Self::new(name, Method::Get, base_url, path_template)
    }

    pub fn required(mut self, param: &str) -> Self {
        self.required_params.insert(param.to_string());
        self
    }

    pub fn optional(mut self, param: &str, default: Option<&str>) -> Self {
        self.optional_params
            .insert(param.to_string(), default.map(str::to_string));
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.header_template
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    /// `{name}` placeholders in the path template, in order of appearance.
    pub fn placeholders(&self) -> Vec<String> {
        placeholder_re()
            .captures_iter(&self.path_template)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }

    pub fn declares(&self, param: &str) -> bool {
        self.required_params.contains(param) || self.optional_params.contains_key(param)
    }

    pub fn validate(&self) -> Result<(), FetchError> {
        let bad = |reason: String| FetchError::MalformedDescriptor {
            name: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(bad("empty name".into()));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(bad(format!("base_url {:?} is not http(s)", self.base_url)));
        }
        if !self.path_template.starts_with('/') {
            return Err(bad("path_template must start with '/'".into()));
        }
        // Braces that are not part of a well-formed placeholder.
        let stripped = placeholder_re().replace_all(&self.path_template, "");
        if stripped.contains('{') || stripped.contains('}') {
            return Err(bad(format!(
                "unbalanced braces in {:?}",
                self.path_template
            )));
        }
        for p in self.placeholders() {
            if !self.declares(&p) {
                return Err(bad(format!("placeholder {{{p}}} is not a declared param")));
            }
        }
        if let Some(p) = self
            .required_params
            .iter()
            .find(|p| self.optional_params.contains_key(*p))
        {
            return Err(bad(format!("param {p} is both required and optional")));
        }
        Ok(())
    }
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("placeholder regex"))
}

#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    endpoints: HashMap<String, Arc<EndpointDescriptor>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: EndpointDescriptor) -> Result<(), FetchError> {
        descriptor.validate()?;
        if self.endpoints.contains_key(&descriptor.name) {
            return Err(FetchError::MalformedDescriptor {
                name: descriptor.name,
                reason: "registered twice".into(),
            });
        }
        self.endpoints
            .insert(descriptor.name.clone(), Arc::new(descriptor));
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<EndpointDescriptor>, FetchError> {
        self.endpoints
            .get(name)
            .cloned()
            .ok_or_else(|| FetchError::UnknownEndpoint(name.to_string()))
    }

    /// Sorted operation names.
    pub fn names(&self) -> Vec<&str> {
        let mut v: Vec<&str> = self.endpoints.keys().map(String::as_str).collect();
        v.sort_unstable();
        v
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Market data (coinranking via RapidAPI) and two news providers.
    pub fn builtin(cfg: &ClientConfig) -> Result<Self, FetchError> {
        let mut reg = Self::new();

        let coins = &cfg.coinranking;
        reg.register(
            rapidapi(EndpointDescriptor::get(names::COINS, &coins.base_url, "/coins"), coins)
                .optional("limit", None)
                .optional("offset", None)
                .optional("orderBy", None)
                .optional("referenceCurrencyUuid", Some(USD_REFERENCE_UUID))
                .projection(Projection::CoinList),
        )?;
        reg.register(
            rapidapi(
                EndpointDescriptor::get(names::COIN_DETAILS, &coins.base_url, "/coin/{coinId}"),
                coins,
            )
            .required("coinId")
            .optional("referenceCurrencyUuid", Some(USD_REFERENCE_UUID))
            .projection(Projection::CoinDetail),
        )?;
        reg.register(
            rapidapi(
                EndpointDescriptor::get(
                    names::COIN_HISTORY,
                    &coins.base_url,
                    "/coin/{coinId}/history",
                ),
                coins,
            )
            .required("coinId")
            .required("timePeriod")
            .optional("referenceCurrencyUuid", Some(USD_REFERENCE_UUID))
            .projection(Projection::CoinHistory),
        )?;
        // Premium plan on the provider side; free keys get a 403.
        reg.register(
            rapidapi(
                EndpointDescriptor::get(names::EXCHANGES, &coins.base_url, "/exchanges"),
                coins,
            )
            .optional("limit", None)
            .optional("referenceCurrencyUuid", Some(USD_REFERENCE_UUID))
            .projection(Projection::Exchanges),
        )?;

        let bing = &cfg.bing_news;
        reg.register(
            rapidapi(
                EndpointDescriptor::get(names::CRYPTO_NEWS, &bing.base_url, "/news/search"),
                bing,
            )
            .header("X-BingApis-SDK", "true")
            .required("q")
            .optional("count", None)
            .optional("safeSearch", Some("Off"))
            .optional("textFormat", Some("Raw"))
            .optional("freshness", Some("Day"))
            .projection(Projection::BingNews),
        )?;

        let news = &cfg.newsapi;
        let mut everything =
            EndpointDescriptor::get(names::COIN_NEWS, &news.base_url, "/v2/everything")
                .required("q")
                .optional("language", Some("en"))
                .optional("pageSize", None)
                .optional("page", None)
                .optional("sortBy", None)
                .projection(Projection::NewsApiArticles);
        if let Some(key) = &news.api_key {
            everything = everything.header("X-Api-Key", key);
        }
        reg.register(everything)?;

        for kind in ProviderKind::ALL {
            if cfg.provider(kind).api_key.is_none() {
                tracing::warn!(provider = kind.name(), "no API key configured; calls will be unauthenticated");
            }
        }
        Ok(reg)
    }
}

fn rapidapi(d: EndpointDescriptor, provider: &ProviderConfig) -> EndpointDescriptor {
    let mut d = d;
    if let Some(host) = provider.host() {
        d = d.header("X-RapidAPI-Host", &host);
    }
    if let Some(key) = &provider.api_key {
        d = d.header("X-RapidAPI-Key", key);
    }
    d
}
