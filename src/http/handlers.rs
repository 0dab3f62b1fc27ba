//! Route handlers.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{HeaderMap, Method},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use std::time::Instant;

use crate::dispatch::{ProxyRequest, ProxyResponse};
use crate::error::ProxyError;
use crate::health::HealthReport;
use crate::http::request::{self, RequestIdExt, TargetQuery};
use crate::http::server::AppState;
use crate::observability::metrics;

/// `GET|POST /proxy?url=<target>&mode=html|screenshot|pdf`
pub async fn proxy(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    query: Result<Query<TargetQuery>, QueryRejection>,
    body: Bytes,
) -> Response {
    let start = Instant::now();
    let result = dispatch_proxy(&state, method, &headers, query, body).await;
    finish("proxy", &headers, result, start)
}

async fn dispatch_proxy(
    state: &AppState,
    method: Method,
    headers: &HeaderMap,
    query: Result<Query<TargetQuery>, QueryRejection>,
    body: Bytes,
) -> Result<ProxyResponse, ProxyError> {
    let query = TargetQuery::from_extracted(query)?;
    let target = query.target()?;
    let mode = query.mode()?;

    let request = ProxyRequest {
        target,
        method,
        body: (!body.is_empty()).then_some(body),
        content_type: request::content_type(headers),
        mode,
        proxy_origin: request::proxy_origin(headers, state.public_origin.as_deref()),
    };
    state.dispatcher.dispatch(request).await
}

/// `GET /resource?url=<target>`: direct fetch, never rendered.
pub async fn resource(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<TargetQuery>, QueryRejection>,
) -> Response {
    let start = Instant::now();
    let result = match TargetQuery::from_extracted(query).and_then(|query| query.target()) {
        Ok(target) => state.dispatcher.fetch_resource(target).await,
        Err(e) => Err(e),
    };
    finish("resource", &headers, result, start)
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport::collect(state.dispatcher.sessions(), state.started))
}

fn finish(
    route: &'static str,
    headers: &HeaderMap,
    result: Result<ProxyResponse, ProxyError>,
    start: Instant,
) -> Response {
    let request_id = headers.request_id();
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(response) => {
            tracing::info!(
                request_id = %request_id,
                route,
                class = %response.class,
                status = response.status.as_u16(),
                target_url = %response.target,
                stub = ?response.stub,
                elapsed_ms,
                "Request served"
            );
            metrics::record_request(route, response.class.as_str(), response.status.as_u16(), start);
            response.into_response()
        }
        Err(e) => {
            let status = e.status();
            if status.is_server_error() {
                tracing::warn!(request_id = %request_id, route, status = status.as_u16(), kind = e.kind(), error = %e, elapsed_ms, "Request failed");
            } else {
                tracing::debug!(request_id = %request_id, route, status = status.as_u16(), kind = e.kind(), error = %e, "Request rejected");
            }
            metrics::record_request(route, "none", status.as_u16(), start);
            e.into_response()
        }
    }
}
