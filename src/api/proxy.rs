use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode, Uri, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::{ApiError, AppState};
use crate::clients::upstream::UpstreamRequest;

/// ANY /{upstream}/{*path}
/// Relays the request to the named upstream with its credential attached.
/// The caller's own `Authorization` header is not forwarded. The path is
/// taken from the request URI as sent, still percent-encoded.
pub async fn relay(
    State(state): State<Arc<AppState>>,
    Path((upstream, _)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let method = reqwest::Method::from_bytes(method.as_str().as_bytes())
        .map_err(|_| ApiError::validation("Unsupported method"))?;

    let path = raw_tail(uri.path(), &upstream)
        .ok_or_else(|| ApiError::validation("Invalid upstream path"))?
        .to_string();

    let request = UpstreamRequest {
        method,
        path,
        query: uri.query().map(str::to_string),
        content_type: headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    };

    let relayed = state.upstreams().forward(&upstream, request).await?;

    let status = StatusCode::from_u16(relayed.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = (status, Body::from(relayed.body)).into_response();
    if let Some(content_type) = relayed.content_type
        && let Ok(value) = content_type.parse()
    {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }

    Ok(response)
}

/// Everything after `/{upstream}/` in the undecoded request path.
fn raw_tail<'a>(path: &'a str, upstream: &str) -> Option<&'a str> {
    let marker = format!("/{upstream}/");
    path.find(&marker).map(|start| &path[start + marker.len()..])
}
