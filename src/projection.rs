// src/projection.rs
//! Result projection: provider JSON → stable domain objects.
//!
//! Required upstream fields that are missing fail with `UnexpectedSchema`;
//! optional ones stay `None`. Nothing is filled in with made-up values.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FetchError;
use crate::registry::{EndpointDescriptor, Projection};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum DomainObject {
    CoinList(CoinList),
    CoinDetail(CoinDetail),
    CoinHistory(CoinHistory),
    Exchanges(Vec<Exchange>),
    News(Vec<NewsItem>),
    Raw(Value),
}

impl DomainObject {
    pub fn kind(&self) -> &'static str {
        match self {
            DomainObject::CoinList(_) => "coin_list",
            DomainObject::CoinDetail(_) => "coin_detail",
            DomainObject::CoinHistory(_) => "coin_history",
            DomainObject::Exchanges(_) => "exchanges",
            DomainObject::News(_) => "news",
            DomainObject::Raw(_) => "raw",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub published_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStats {
    #[serde(default, deserialize_with = "de_opt_number")]
    pub total: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_number")]
    pub total_coins: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_number")]
    pub total_markets: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_number")]
    pub total_exchanges: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_number")]
    pub total_market_cap: Option<f64>,
    #[serde(default, rename = "total24hVolume", deserialize_with = "de_opt_number")]
    pub total_24h_volume: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinSummary {
    pub uuid: String,
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default, deserialize_with = "de_opt_number")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_number")]
    pub market_cap: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_number")]
    pub change: Option<f64>,
    #[serde(default)]
    pub rank: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoinList {
    pub stats: Option<GlobalStats>,
    pub coins: Vec<CoinSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllTimeHigh {
    #[serde(default, deserialize_with = "de_opt_number")]
    pub price: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supply {
    #[serde(default)]
    pub confirmed: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_number")]
    pub total: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_number")]
    pub circulating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinLink {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinDetail {
    pub uuid: String,
    pub symbol: String,
    pub name: String,
    /// Provider-supplied HTML.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(default, deserialize_with = "de_opt_number")]
    pub price: Option<f64>,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default, rename = "24hVolume", deserialize_with = "de_opt_number")]
    pub volume_24h: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_number")]
    pub market_cap: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_number")]
    pub change: Option<f64>,
    #[serde(default)]
    pub all_time_high: Option<AllTimeHigh>,
    #[serde(default)]
    pub number_of_markets: Option<u64>,
    #[serde(default)]
    pub number_of_exchanges: Option<u64>,
    #[serde(default)]
    pub supply: Option<Supply>,
    #[serde(default)]
    pub links: Vec<CoinLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: i64,
    #[serde(default, deserialize_with = "de_opt_number")]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinHistory {
    #[serde(default, deserialize_with = "de_opt_number")]
    pub change: Option<f64>,
    #[serde(rename = "history")]
    pub points: Vec<PricePoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exchange {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub number_of_markets: Option<u64>,
    #[serde(default, rename = "24hVolume", deserialize_with = "de_opt_number")]
    pub volume_24h: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_number")]
    pub market_share: Option<f64>,
}

// ---- upstream envelopes ----

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct CoinsData {
    #[serde(default)]
    stats: Option<GlobalStats>,
    coins: Vec<CoinSummary>,
}

#[derive(Deserialize)]
struct CoinData {
    coin: CoinDetail,
}

#[derive(Deserialize)]
struct ExchangesData {
    exchanges: Vec<Exchange>,
}

#[derive(Deserialize)]
struct NewsApiResponse {
    articles: Vec<NewsApiArticle>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiArticle {
    title: String,
    url: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url_to_image: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
}

#[derive(Deserialize)]
struct BingResponse {
    value: Vec<BingArticle>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BingArticle {
    name: String,
    url: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    image: Option<BingImage>,
    #[serde(default)]
    date_published: Option<String>,
}

#[derive(Deserialize)]
struct BingImage {
    #[serde(default)]
    thumbnail: Option<BingThumbnail>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BingThumbnail {
    #[serde(default)]
    content_url: Option<String>,
}

/// Map a raw payload to the descriptor's domain shape.
pub fn project(descriptor: &EndpointDescriptor, raw: &Value) -> Result<DomainObject, FetchError> {
    let endpoint = descriptor.name.as_str();
    let out = match descriptor.projection {
        Projection::CoinList => {
            let env: Envelope<CoinsData> = parse(endpoint, raw)?;
            DomainObject::CoinList(CoinList {
                stats: env.data.stats,
                coins: env.data.coins,
            })
        }
        Projection::CoinDetail => {
            let env: Envelope<CoinData> = parse(endpoint, raw)?;
            DomainObject::CoinDetail(env.data.coin)
        }
        Projection::CoinHistory => {
            let env: Envelope<CoinHistory> = parse(endpoint, raw)?;
            DomainObject::CoinHistory(env.data)
        }
        Projection::Exchanges => {
            let env: Envelope<ExchangesData> = parse(endpoint, raw)?;
            DomainObject::Exchanges(env.data.exchanges)
        }
        Projection::NewsApiArticles => {
            let resp: NewsApiResponse = parse(endpoint, raw)?;
            DomainObject::News(
                resp.articles
                    .into_iter()
                    .map(|a| NewsItem {
                        title: clean_text(&a.title),
                        description: a.description.as_deref().and_then(non_blank),
                        url: a.url,
                        image_url: a.url_to_image,
                        published_at: a.published_at,
                    })
                    .collect(),
            )
        }
        Projection::BingNews => {
            let resp: BingResponse = parse(endpoint, raw)?;
            DomainObject::News(
                resp.value
                    .into_iter()
                    .map(|a| NewsItem {
                        title: clean_text(&a.name),
                        description: a.description.as_deref().and_then(non_blank),
                        url: a.url,
                        image_url: a
                            .image
                            .and_then(|i| i.thumbnail)
                            .and_then(|t| t.content_url),
                        published_at: a.date_published,
                    })
                    .collect(),
            )
        }
        Projection::Raw => DomainObject::Raw(raw.clone()),
    };
    Ok(out)
}

fn parse<T: serde::de::DeserializeOwned>(endpoint: &str, raw: &Value) -> Result<T, FetchError> {
    T::deserialize(raw).map_err(|e| FetchError::schema(endpoint, e))
}

/// Decode HTML entities, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_blank(s: &str) -> Option<String> {
    let t = clean_text(s);
    (!t.is_empty()).then_some(t)
}

/// Providers send decimals as strings (`"43012.55"`) or numbers, or null.
fn de_opt_number<'de, D>(d: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid number {s:?}"))),
        Some(other) => Err(de::Error::custom(format!("expected number, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn desc(name: &str, projection: Projection) -> EndpointDescriptor {
        EndpointDescriptor::get(name, "https://api.test", "/x").projection(projection)
    }

    #[test]
    fn sparse_news_keeps_every_item_without_inventing_fields() {
        let articles: Vec<Value> = (0..10)
            .map(|i| {
                let mut a = json!({
                    "source": { "id": null, "name": "Wire" },
                    "author": "someone",
                    "title": format!("Headline {i}"),
                    "url": format!("https://news.test/{i}"),
                    "urlToImage": null,
                    "publishedAt": "2024-03-01T10:00:00Z",
                    "content": "..."
                });
                if i < 3 {
                    a["description"] = json!(format!("Body {i}"));
                } else if i == 3 {
                    a["description"] = json!("   ");
                }
                a
            })
            .collect();
        let raw = json!({ "status": "ok", "totalResults": 10, "articles": articles });

        let out = project(&desc("coinNews", Projection::NewsApiArticles), &raw).unwrap();
        let DomainObject::News(items) = out else { panic!("expected news") };
        assert_eq!(items.len(), 10);
        assert_eq!(items.iter().filter(|n| n.description.is_some()).count(), 3);
        assert!(items.iter().all(|n| n.image_url.is_none()));
        assert_eq!(items[0].description.as_deref(), Some("Body 0"));
    }

    #[test]
    fn missing_required_field_is_unexpected_schema() {
        let raw = json!({ "articles": [ { "url": "https://news.test/1" } ] });
        let err = project(&desc("coinNews", Projection::NewsApiArticles), &raw).unwrap_err();
        match err {
            FetchError::UnexpectedSchema { endpoint, detail } => {
                assert_eq!(endpoint, "coinNews");
                assert!(detail.contains("title"), "detail: {detail}");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn bing_values_flatten_thumbnail_and_decode_entities() {
        let raw = json!({
            "_type": "News",
            "value": [
                {
                    "name": "Bitcoin &amp; friends   rally",
                    "url": "https://bing.test/a",
                    "description": "ETF&#39;s first week",
                    "datePublished": "2024-03-01T10:00:00.0000000Z",
                    "image": { "thumbnail": { "contentUrl": "https://img.test/a.jpg", "width": 700 } },
                    "provider": [ { "_type": "Organization", "name": "Wire" } ]
                },
                { "name": "No image", "url": "https://bing.test/b" }
            ]
        });
        let DomainObject::News(items) = project(&desc("cryptoNews", Projection::BingNews), &raw).unwrap()
        else {
            panic!("expected news")
        };
        assert_eq!(items[0].title, "Bitcoin & friends rally");
        assert_eq!(items[0].description.as_deref(), Some("ETF's first week"));
        assert_eq!(items[0].image_url.as_deref(), Some("https://img.test/a.jpg"));
        assert_eq!(items[1].image_url, None);
        assert_eq!(items[1].published_at, None);
    }

    #[test]
    fn coin_detail_parses_string_numbers() {
        let raw = json!({
            "status": "success",
            "data": { "coin": {
                "uuid": "Qwsogvtv82FCd",
                "symbol": "BTC",
                "name": "Bitcoin",
                "price": "43012.55",
                "rank": 1,
                "24hVolume": "21000000000",
                "marketCap": 845000000000u64,
                "allTimeHigh": { "price": "69000", "timestamp": 1636502400 },
                "numberOfMarkets": 9000,
                "numberOfExchanges": 150,
                "supply": { "confirmed": true, "total": "21000000", "circulating": "19600000" },
                "links": [ { "name": "bitcoin.org", "type": "website", "url": "https://bitcoin.org" } ]
            } }
        });
        let DomainObject::CoinDetail(c) = project(&desc("coinDetails", Projection::CoinDetail), &raw).unwrap()
        else {
            panic!("expected coin detail")
        };
        assert_eq!(c.price, Some(43012.55));
        assert_eq!(c.volume_24h, Some(21_000_000_000.0));
        assert_eq!(c.market_cap, Some(845_000_000_000.0));
        assert_eq!(c.supply.as_ref().and_then(|s| s.confirmed), Some(true));
        assert_eq!(c.all_time_high.as_ref().and_then(|a| a.price), Some(69000.0));
        assert_eq!(c.links[0].kind.as_deref(), Some("website"));
        assert_eq!(c.description, None);
    }

    #[test]
    fn garbage_number_is_schema_drift() {
        let raw = json!({ "data": { "change": "n/a", "history": [] } });
        let err = project(&desc("coinHistory", Projection::CoinHistory), &raw).unwrap_err();
        assert_eq!(err.kind(), "unexpected_schema");
    }

    #[test]
    fn history_allows_null_prices() {
        let raw = json!({ "data": { "change": "-1.5", "history": [
            { "price": "100.5", "timestamp": 1700000000 },
            { "price": null, "timestamp": 1699990000 }
        ] } });
        let DomainObject::CoinHistory(h) = project(&desc("coinHistory", Projection::CoinHistory), &raw).unwrap()
        else {
            panic!("expected history")
        };
        assert_eq!(h.change, Some(-1.5));
        assert_eq!(h.points.len(), 2);
        assert_eq!(h.points[1].price, None);
    }
}
