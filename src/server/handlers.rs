//! Request handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use indexmap::IndexMap;
use serde::Serialize;

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::cache::CacheStatus;
use crate::service::{Outcome, TemplateRequest};

/// Cookie carrying the session id.
pub const SESSION_COOKIE: &str = "TEMPLET_SESSION";

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Version information
    pub version: String,
    /// Uptime in seconds
    pub uptime_secs: u64,
    /// Active template engine
    pub engine: String,
    /// Number of cached templates
    pub templates: usize,
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cache = state.service.cache();
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: crate::version().to_string(),
        uptime_secs: state.uptime_secs(),
        engine: cache.engine().name().to_string(),
        templates: cache.len(),
    })
}

/// Cache statistics endpoint.
pub async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<CacheStatus> {
    Json(state.service.cache().status())
}

/// Fallback handler: render the template the path points at.
pub async fn render_template(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> ApiResult<Response> {
    if !matches!(method, Method::GET | Method::HEAD | Method::POST) {
        return Err(ApiError::MethodNotAllowed(method.to_string()));
    }

    let request = build_request(&method, &uri, &headers)?;
    let service = Arc::clone(&state.service);
    let outcome = tokio::task::spawn_blocking(move || service.handle(&request))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    match outcome {
        Outcome::Success {
            body, content_type, ..
        } => Ok((StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response()),
        Outcome::NotFound { .. } => Ok(StatusCode::NOT_FOUND.into_response()),
        Outcome::Forbidden { .. } => Ok(StatusCode::FORBIDDEN.into_response()),
        Outcome::InternalError { error } => Err(error.into()),
    }
}

fn build_request(method: &Method, uri: &Uri, headers: &HeaderMap) -> ApiResult<TemplateRequest> {
    // Decoded before resolution, so `%2e%2e` is still caught as `..`.
    let path = urlencoding::decode(uri.path())
        .map_err(|e| ApiError::BadRequest(format!("request path is not valid UTF-8: {e}")))?;
    let mut request = TemplateRequest::new(method.as_str(), path.into_owned());

    if let Ok(Query(query)) = Query::<IndexMap<String, String>>::try_from_uri(uri) {
        request.query = query;
    }
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }
    request.session_id = session_from_cookies(headers);
    Ok(request)
}

/// Extract the session id from the `Cookie` headers.
pub fn session_from_cookies(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}
