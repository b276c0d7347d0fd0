// src/config.rs
//! Client configuration: provider credentials, base URLs, timeouts, cache bounds.
//!
//! Sources, later ones win:
//! 1) built-in defaults (public base URLs, no keys)
//! 2) TOML file at `$CLIENT_CONFIG_PATH` or `config/client.toml` (optional)
//! 3) environment variables (`.env` is loaded by the binary via dotenvy)
//!
//! API keys never live in source. In the TOML file `api_key = "ENV"` means
//! "read it from the provider's env var".

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/client.toml";
pub const ENV_CONFIG_PATH: &str = "CLIENT_CONFIG_PATH";

pub const ENV_TIMEOUT_MS: &str = "FETCH_TIMEOUT_MS";
pub const ENV_DEFAULT_TTL_MS: &str = "CACHE_DEFAULT_TTL_MS";
pub const ENV_MAX_ENTRIES: &str = "CACHE_MAX_ENTRIES";

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_TTL_MS: u64 = 60_000;

/// Upstream providers the built-in registry knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Coinranking,
    BingNews,
    NewsApi,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Coinranking,
        ProviderKind::BingNews,
        ProviderKind::NewsApi,
    ];

    fn key_env(self) -> &'static str {
        match self {
            ProviderKind::Coinranking => "COINRANKING_API_KEY",
            ProviderKind::BingNews => "BING_NEWS_API_KEY",
            ProviderKind::NewsApi => "NEWSAPI_API_KEY",
        }
    }

    fn base_url_env(self) -> &'static str {
        match self {
            ProviderKind::Coinranking => "COINRANKING_BASE_URL",
            ProviderKind::BingNews => "BING_NEWS_BASE_URL",
            ProviderKind::NewsApi => "NEWSAPI_BASE_URL",
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::Coinranking => "https://coinranking1.p.rapidapi.com",
            ProviderKind::BingNews => "https://bing-news-search1.p.rapidapi.com",
            ProviderKind::NewsApi => "https://newsapi.org",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::Coinranking => "coinranking",
            ProviderKind::BingNews => "bing_news",
            ProviderKind::NewsApi => "newsapi",
        }
    }
}

/// Credentials + location of one provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

impl ProviderConfig {
    fn defaults(kind: ProviderKind) -> Self {
        Self {
            api_key: None,
            base_url: kind.default_base_url().to_string(),
        }
    }

    /// Host part of the base URL (RapidAPI wants it echoed in a header).
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

// Keys stay out of Debug output; only their length is shown.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("key_len", &self.api_key.as_ref().map_or(0, String::len))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub coinranking: ProviderConfig,
    pub bing_news: ProviderConfig,
    pub newsapi: ProviderConfig,
    /// Per-call timeout applied when the caller does not pass one.
    pub timeout_ms: u64,
    /// Cache freshness window applied when the caller does not pass one.
    pub default_ttl_ms: u64,
    /// LRU bound for the cache; `None` means unbounded.
    pub max_entries: Option<usize>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            coinranking: ProviderConfig::defaults(ProviderKind::Coinranking),
            bing_news: ProviderConfig::defaults(ProviderKind::BingNews),
            newsapi: ProviderConfig::defaults(ProviderKind::NewsApi),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            default_ttl_ms: DEFAULT_TTL_MS,
            max_entries: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    timeout_ms: Option<u64>,
    default_ttl_ms: Option<u64>,
    max_entries: Option<usize>,
    coinranking: Option<FileProvider>,
    bing_news: Option<FileProvider>,
    newsapi: Option<FileProvider>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileProvider {
    api_key: Option<String>,
    base_url: Option<String>,
}

impl ClientConfig {
    pub fn provider(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::Coinranking => &self.coinranking,
            ProviderKind::BingNews => &self.bing_news,
            ProviderKind::NewsApi => &self.newsapi,
        }
    }

    fn provider_mut(&mut self, kind: ProviderKind) -> &mut ProviderConfig {
        match kind {
            ProviderKind::Coinranking => &mut self.coinranking,
            ProviderKind::BingNews => &mut self.bing_news,
            ProviderKind::NewsApi => &mut self.newsapi,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    /// Load using the process environment:
    /// 1) $CLIENT_CONFIG_PATH (must exist when set)
    /// 2) config/client.toml (optional)
    /// then env overrides.
    pub fn load() -> Result<Self> {
        let env = |k: &str| std::env::var(k).ok();
        let path = match env(ENV_CONFIG_PATH) {
            Some(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    bail!("{ENV_CONFIG_PATH} points to non-existent path");
                }
                Some(pb)
            }
            None => {
                let pb = PathBuf::from(DEFAULT_CONFIG_PATH);
                pb.exists().then_some(pb)
            }
        };
        let file = match path {
            Some(p) => Some(read_file(&p)?),
            None => None,
        };
        Self::from_sources(file.as_deref(), env)
    }

    /// Environment only, no file.
    pub fn from_env() -> Result<Self> {
        Self::from_sources(None, |k| std::env::var(k).ok())
    }

    /// Merge defaults, an optional TOML document and an env lookup.
    pub fn from_sources<F>(toml_src: Option<&str>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = ClientConfig::default();
        let env = |k: &str| env(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(src) = toml_src {
            let file: FileConfig = toml::from_str(src).context("parsing client config TOML")?;
            cfg.apply_file(file, &env)?;
        }

        for kind in ProviderKind::ALL {
            let p = cfg.provider_mut(kind);
            if let Some(key) = env(kind.key_env()) {
                p.api_key = Some(key);
            }
            if let Some(base) = env(kind.base_url_env()) {
                p.base_url = base;
            }
        }
        if let Some(v) = env(ENV_TIMEOUT_MS) {
            cfg.timeout_ms = parse_num(ENV_TIMEOUT_MS, &v)?;
        }
        if let Some(v) = env(ENV_DEFAULT_TTL_MS) {
            cfg.default_ttl_ms = parse_num(ENV_DEFAULT_TTL_MS, &v)?;
        }
        if let Some(v) = env(ENV_MAX_ENTRIES) {
            let n: usize = parse_num(ENV_MAX_ENTRIES, &v)?;
            cfg.max_entries = (n > 0).then_some(n);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_file<F>(&mut self, file: FileConfig, env: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = file.timeout_ms {
            self.timeout_ms = v;
        }
        if let Some(v) = file.default_ttl_ms {
            self.default_ttl_ms = v;
        }
        if let Some(v) = file.max_entries {
            self.max_entries = (v > 0).then_some(v);
        }
        let sections = [
            (ProviderKind::Coinranking, file.coinranking),
            (ProviderKind::BingNews, file.bing_news),
            (ProviderKind::NewsApi, file.newsapi),
        ];
        for (kind, section) in sections {
            let Some(section) = section else { continue };
            let p = self.provider_mut(kind);
            if let Some(base) = section.base_url {
                p.base_url = base;
            }
            if let Some(key) = section.api_key {
                // Resolve api key if "ENV"
                p.api_key = if key.trim().eq_ignore_ascii_case("env") {
                    Some(env(kind.key_env()).ok_or_else(|| {
                        anyhow!("Missing {} env var for [{}]", kind.key_env(), kind.name())
                    })?)
                } else {
                    Some(key)
                };
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            bail!("timeout_ms must be > 0");
        }
        for kind in ProviderKind::ALL {
            let p = self.provider(kind);
            let u = url::Url::parse(&p.base_url)
                .with_context(|| format!("invalid base_url for {}", kind.name()))?;
            if !matches!(u.scheme(), "http" | "https") {
                bail!("base_url for {} must be http(s)", kind.name());
            }
        }
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("reading client config from {}", path.display()))
}

fn parse_num<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| anyhow!("{name} must be a non-negative integer, got {raw:?}"))
}
