use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
};
use tracing::debug;

use crate::short_commit_hash;

pub const LIVENESS_BODY: &str = "blood-vessel/vitals";

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service is alive", body = String, content_type = "text/plain"),
        (status = 429, description = "Rate limited")
    ),
    tag = "vitals"
)]
// axum handler for liveness
pub async fn root() -> impl IntoResponse {
    debug!("vitals");

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&format!(
        "{}:{}:{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit_hash()
    )) {
        headers.insert("x-app", value);
    }

    (StatusCode::OK, headers, LIVENESS_BODY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn root_reports_liveness() -> anyhow::Result<()> {
        let response = root().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let app = response
            .headers()
            .get("X-App")
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        assert!(app.is_some_and(|app| app.starts_with(concat!(
            env!("CARGO_PKG_NAME"),
            ":",
            env!("CARGO_PKG_VERSION")
        ))));

        let body = to_bytes(response.into_body(), usize::MAX).await?;
        assert_eq!(&body[..], LIVENESS_BODY.as_bytes());
        Ok(())
    }
}
