use axum::{routing::get, Router};

use crate::billing;

pub async fn root() -> &'static str {
    "Storefront Billing API"
}

pub fn api_routes() -> Router {
    Router::new()
        .route("/", get(root))
        .merge(billing::api::routes())
}
