#![allow(clippy::needless_for_each)]

use super::handlers::{auth, root};
use utoipa::OpenApi;

// Info (title, version, description, contact, license) comes from Cargo.toml.
#[derive(OpenApi)]
#[openapi(
    paths(root::root, auth::login, auth::callback),
    tags(
        (name = "vitals", description = "Liveness"),
        (name = "auth", description = "OAuth 2.0 login handshake")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
