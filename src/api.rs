// src/api.rs
//! HTTP surface for the dashboard: every registered operation under
//! `/api/{operation}`, plus health and cache introspection.
//!
//! Reserved query keys (underscore prefix) steer the fetch and are never
//! forwarded upstream:
//! - `_refresh=1` skip the cache
//! - `_stale=1` fall back to the last good payload on failure
//! - `_limit=N` keep the first N news items / coins

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::json;
use shuttle_axum::axum::{
    extract::{Path, Query, State},
    http::{header::HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::cache::CacheEntrySummary;
use crate::client::CryptoClient;
use crate::error::FetchError;
use crate::orchestrator::{FetchOptions, Fetched, Origin};
use crate::projection::DomainObject;
use crate::request::Params;

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

#[derive(Clone)]
pub struct AppState {
    pub client: CryptoClient,
}

impl AppState {
    pub fn new(client: CryptoClient) -> Self {
        Self { client }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/{operation}", get(fetch_operation))
        .route("/debug/cache", get(debug_cache))
        .route("/debug/endpoints", get(debug_endpoints))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Alias kept so callers can write `api::router(state)`.
pub fn router(state: AppState) -> Router {
    create_router(state)
}

#[derive(Serialize)]
struct FetchResp<'a> {
    endpoint: &'a str,
    origin: Origin,
    stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stale_reason: Option<&'static str>,
    data: &'a DomainObject,
}

/// Error body: `{ "error": <kind>, "message": <display> }`.
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "bad_request",
            message: message.into(),
        }
    }
}

impl From<FetchError> for ApiError {
    fn from(e: FetchError) -> Self {
        Self {
            status: status_for(&e),
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.kind, "message": self.message }));
        (self.status, body).into_response()
    }
}

pub fn status_for(e: &FetchError) -> StatusCode {
    match e {
        FetchError::UnknownEndpoint(_) => StatusCode::NOT_FOUND,
        FetchError::MissingRequiredParam(_) => StatusCode::BAD_REQUEST,
        FetchError::MalformedDescriptor { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        FetchError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        FetchError::Network(_)
        | FetchError::HttpStatus { .. }
        | FetchError::MalformedBody(_)
        | FetchError::UnexpectedSchema { .. } => StatusCode::BAD_GATEWAY,
    }
}

async fn fetch_operation(
    State(state): State<AppState>,
    Path(operation): Path<String>,
    Query(mut query): Query<IndexMap<String, String>>,
) -> Result<Response, ApiError> {
    let mut options = FetchOptions::new();
    if flag(query.shift_remove("_refresh")) {
        options = options.force_refresh();
    }
    if flag(query.shift_remove("_stale")) {
        options = options.serve_stale_on_error();
    }
    let limit = match query.shift_remove("_limit") {
        Some(raw) => Some(
            raw.trim()
                .parse::<usize>()
                .map_err(|_| ApiError::bad_request(format!("_limit must be a number, got {raw:?}")))?,
        ),
        None => None,
    };

    let params: Params = query
        .into_iter()
        .filter(|(k, _)| !k.starts_with('_'))
        .collect();

    let fetched = state.client.fetch(&operation, &params, options).await?;
    let fetched = match limit {
        Some(n) => fetched.map(|d| truncate(d, n)),
        None => fetched,
    };
    Ok(render(&fetched))
}

fn render(fetched: &Fetched<DomainObject>) -> Response {
    let body = FetchResp {
        endpoint: &fetched.endpoint,
        origin: fetched.origin,
        stale: fetched.is_stale(),
        stale_reason: fetched.stale.as_ref().map(FetchError::kind),
        data: &fetched.data,
    };
    let cache = match fetched.origin {
        Origin::Cache => "HIT",
        Origin::Network | Origin::Joined => "MISS",
    };
    let mut resp = Json(body).into_response();
    resp.headers_mut()
        .insert(X_CACHE, HeaderValue::from_static(cache));
    resp
}

fn flag(v: Option<String>) -> bool {
    matches!(
        v.as_deref().map(str::trim),
        Some("1") | Some("true") | Some("yes")
    )
}

/// Top-N for list-shaped results; other shapes pass through.
fn truncate(data: DomainObject, n: usize) -> DomainObject {
    match data {
        DomainObject::News(mut items) => {
            items.truncate(n);
            DomainObject::News(items)
        }
        DomainObject::CoinList(mut list) => {
            list.coins.truncate(n);
            DomainObject::CoinList(list)
        }
        DomainObject::Exchanges(mut ex) => {
            ex.truncate(n);
            DomainObject::Exchanges(ex)
        }
        other => other,
    }
}

#[derive(Serialize)]
struct CacheDebug {
    entries: Vec<CacheEntrySummary>,
    len: usize,
    max_entries: Option<usize>,
    in_flight: usize,
}

async fn debug_cache(State(state): State<AppState>) -> Json<CacheDebug> {
    let cache = state.client.cache();
    let entries = cache.snapshot();
    Json(CacheDebug {
        len: entries.len(),
        entries,
        max_entries: cache.max_entries(),
        in_flight: state.client.orchestrator().in_flight(),
    })
}

async fn debug_endpoints(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(
        state
            .client
            .registry()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    )
}
