//! HTTP surface: router, middleware chain and handlers.

pub mod admission;
pub mod handlers;
pub mod openapi;

use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, ORIGIN},
    },
    middleware,
    routing::get,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span, info_span};
use ulid::Ulid;

use self::admission::RateLimiter;
use self::handlers::auth::AuthState;

const REQUEST_ID: &str = "x-request-id";
const X_REQUESTED_WITH: HeaderName = HeaderName::from_static("x-requested-with");

/// Build the CORS policy, `*` allows any origin.
///
/// # Errors
/// Returns an error if an origin is not a valid header value.
pub fn cors_layer(allow_origin: &str) -> anyhow::Result<CorsLayer> {
    let origin = match allow_origin.trim() {
        "" | "*" => AllowOrigin::from(Any),
        list => {
            let origins = list
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(HeaderValue::from_str)
                .collect::<Result<Vec<_>, _>>()?;
            AllowOrigin::list(origins)
        }
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            ORIGIN,
            CONTENT_TYPE,
            ACCEPT,
            X_REQUESTED_WITH,
            AUTHORIZATION,
        ]))
}

/// Assemble the application router.
///
/// Every request, including unknown paths, is charged against the rate
/// limiter before CORS handling and before any handler runs.
pub fn router(auth_state: Arc<AuthState>, limiter: Arc<dyn RateLimiter>, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(handlers::root::root))
        .route("/login", get(handlers::auth::login))
        .route("/auth/callback", get(handlers::auth::callback))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID,
                )))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(make_span)
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(middleware::from_fn_with_state(limiter, admission::enforce))
                .layer(cors)
                .layer(Extension(auth_state)),
        )
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
