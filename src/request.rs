// src/request.rs
//! Request builder: descriptor + parameter bag → fully specified request.
//!
//! Pure. Query keys are serialized in sorted order so the URL, and therefore
//! the fingerprint, does not depend on how the caller assembled its params.

use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::FetchError;
use crate::registry::{EndpointDescriptor, Method};

/// Caller-supplied parameters. Insertion order is irrelevant to the result.
pub type Params = IndexMap<String, String>;

/// Characters escaped when a value is substituted into one path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Bytes of the SHA-256 digest kept in the fingerprint.
const FINGERPRINT_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestSpec {
    pub endpoint: String,
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub fingerprint: String,
}

pub fn build(descriptor: &EndpointDescriptor, params: &Params) -> Result<RequestSpec, FetchError> {
    // Sorted: this map doubles as the query serialization order.
    let mut resolved: BTreeMap<&str, String> = BTreeMap::new();
    for name in &descriptor.required_params {
        let v = given(params, name).ok_or_else(|| FetchError::MissingRequiredParam(name.clone()))?;
        resolved.insert(name, v.to_string());
    }
    for (name, default) in &descriptor.optional_params {
        if let Some(v) = given(params, name).map(str::to_string).or_else(|| default.clone()) {
            resolved.insert(name, v);
        }
    }

    let ignored: Vec<&str> = params
        .keys()
        .map(String::as_str)
        .filter(|k| !descriptor.declares(k))
        .collect();
    if !ignored.is_empty() {
        tracing::debug!(endpoint = %descriptor.name, ?ignored, "ignoring undeclared params");
    }

    let mut path = descriptor.path_template.clone();
    let mut in_path: HashSet<String> = HashSet::new();
    for name in descriptor.placeholders() {
        // Validation guarantees the placeholder is declared; an optional one
        // without a value leaves nothing sensible to put in the path.
        let v = resolved
            .get(name.as_str())
            .ok_or_else(|| FetchError::MissingRequiredParam(name.clone()))?;
        let encoded = utf8_percent_encode(v, PATH_SEGMENT).to_string();
        path = path.replace(&format!("{{{name}}}"), &encoded);
        in_path.insert(name);
    }

    let mut query = url::form_urlencoded::Serializer::new(String::new());
    let mut has_query = false;
    for (k, v) in &resolved {
        if !in_path.contains(*k) {
            query.append_pair(k, v);
            has_query = true;
        }
    }

    let mut url = format!("{}{}", descriptor.base_url, path);
    if has_query {
        url.push('?');
        url.push_str(&query.finish());
    }

    let headers = descriptor.header_template.clone();
    let fingerprint = fingerprint(descriptor.method, &url, &headers);

    Ok(RequestSpec {
        endpoint: descriptor.name.clone(),
        method: descriptor.method,
        url,
        headers,
        fingerprint,
    })
}

/// Present and non-blank.
fn given<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Hex of the truncated SHA-256 over `METHOD\nurl\n` + sorted `name:value\n`
/// header lines (names lowercased).
pub fn fingerprint(method: Method, url: &str, headers: &BTreeMap<String, String>) -> String {
    let mut lines: Vec<(String, &str)> = headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.as_str()))
        .collect();
    lines.sort();

    let mut hasher = Sha256::new();
    hasher.update(method.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    for (k, v) in &lines {
        hasher.update(k.as_bytes());
        hasher.update(b":");
        hasher.update(v.as_bytes());
        hasher.update(b"\n");
    }
    let digest = hasher.finalize();

    let mut out = String::with_capacity(FINGERPRINT_BYTES * 2);
    for b in digest.iter().take(FINGERPRINT_BYTES) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> EndpointDescriptor {
        EndpointDescriptor::get("coinHistory", "https://api.test", "/coinHistory/{coinId}")
            .required("coinId")
            .required("timeperiod")
            .header("X-RapidAPI-Key", "k")
    }

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn coin_history_url_and_stable_fingerprint() {
        let p = params(&[("coinId", "bitcoin"), ("timeperiod", "7d")]);
        let a = build(&history(), &p).unwrap();
        let b = build(&history(), &p).unwrap();
        assert_eq!(a.url, "https://api.test/coinHistory/bitcoin?timeperiod=7d");
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.fingerprint.len(), 32);
        assert_eq!(a.endpoint, "coinHistory");
    }

    #[test]
    fn param_order_does_not_change_fingerprint() {
        let d = EndpointDescriptor::get("coins", "https://api.test", "/coins")
            .optional("limit", None)
            .optional("offset", None)
            .optional("orderBy", Some("marketCap"));
        let a = build(&d, &params(&[("offset", "10"), ("limit", "50")])).unwrap();
        let b = build(&d, &params(&[("limit", "50"), ("offset", "10")])).unwrap();
        assert_eq!(a.url, b.url);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.url, "https://api.test/coins?limit=50&offset=10&orderBy=marketCap");
    }

    #[test]
    fn missing_or_blank_required_param_fails() {
        let err = build(&history(), &params(&[("coinId", "bitcoin")])).unwrap_err();
        assert_eq!(err, FetchError::MissingRequiredParam("timeperiod".into()));

        let err = build(&history(), &params(&[("coinId", "  "), ("timeperiod", "7d")])).unwrap_err();
        assert_eq!(err, FetchError::MissingRequiredParam("coinId".into()));
    }

    #[test]
    fn defaults_fill_absent_optionals_and_undeclared_are_dropped() {
        let d = EndpointDescriptor::get("news", "https://api.test", "/news/search")
            .required("q")
            .optional("count", None)
            .optional("freshness", Some("Day"));
        let spec = build(&d, &params(&[("q", "bitcoin etf"), ("debug", "1")])).unwrap();
        assert_eq!(spec.url, "https://api.test/news/search?freshness=Day&q=bitcoin+etf");
    }

    #[test]
    fn path_values_are_percent_encoded() {
        let p = params(&[("coinId", "a/b c"), ("timeperiod", "7d")]);
        let spec = build(&history(), &p).unwrap();
        assert_eq!(spec.url, "https://api.test/coinHistory/a%2Fb%20c?timeperiod=7d");
    }

    #[test]
    fn headers_and_method_feed_the_fingerprint() {
        let p = params(&[("coinId", "bitcoin"), ("timeperiod", "7d")]);
        let a = build(&history(), &p).unwrap();
        let b = build(&history().header("X-RapidAPI-Key", "other"), &p).unwrap();
        assert_ne!(a.fingerprint, b.fingerprint);

        let mut post = history();
        post.method = Method::Post;
        let c = build(&post, &p).unwrap();
        assert_ne!(a.fingerprint, c.fingerprint);
    }
}
