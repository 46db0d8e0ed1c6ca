use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderName, Request, Response},
    middleware, Router,
};
use tower::ServiceBuilder;
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{MakeSpan, OnRequest, OnResponse, TraceLayer},
};
use tracing::Span;

use crate::{
    web::{midware, routes::routes, REQUEST_ID_HEADER},
    App, Result,
};

/// The core async function returning a future that will serve this application.
///
/// Accepts an `App` containing the `TcpListener` and the `AppState` and sets up a TraceLayer that provides console logging.
///
/// Current implementation might return an IO error from `axum::serve`
pub async fn serve(app: App) -> Result<()> {
    let App {
        app_state,
        listener,
    } = app;
    let x_request_id: HeaderName = HeaderName::from_static(REQUEST_ID_HEADER);

    let trace_layer = build_trace_layer(app_state.store.backend());

    let app = Router::new().merge(routes(app_state)).layer(
        ServiceBuilder::new()
            // Set UUID per request
            .layer(SetRequestIdLayer::new(
                x_request_id.clone(),
                MakeRequestUuid,
            ))
            .layer(trace_layer)
            // The response travels the stack bottom up, so the propagation layer below
            // has already copied the request id onto the response when the mapper runs.
            .layer(middleware::map_response(midware::response_mapper))
            // Propagate UUID to response, keep it last so it processes the response first!
            .layer(PropagateRequestIdLayer::new(x_request_id)),
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Sets up the `tower_http::TraceLayer`: one span per request carrying the request id,
/// the route and the store backend serving it.
/// Client errors are logged as warnings, only server errors as errors.
fn build_trace_layer(
    store_backend: &'static str,
) -> TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    impl MakeSpan<Body> + Clone,
    impl OnRequest<Body> + Clone,
    impl OnResponse<Body> + Clone,
> {
    TraceLayer::new_for_http()
        .make_span_with(move |req: &Request<Body>| {
            let req_id = req
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|id| id.to_str().ok())
                .unwrap_or_default();

            tracing::info_span!(
                "request",
                req_id,
                method = %req.method(),
                route = req.uri().path(),
                store = store_backend,
                status = tracing::field::Empty,
            )
        })
        .on_request(|_req: &Request<Body>, _s: &Span| tracing::debug!("received"))
        .on_response(|res: &Response<Body>, latency: Duration, span: &Span| {
            let status = res.status();
            span.record("status", status.as_u16());

            if status.is_server_error() {
                tracing::error!(?latency, "failed")
            } else if status.is_client_error() {
                tracing::warn!(?latency, "rejected")
            } else {
                tracing::info!(?latency, "done")
            }
        })
}
