pub mod billing;
pub mod config;
pub mod error;
pub mod identity;
pub mod listings;
pub mod notifications;
pub mod routes;

mod extractor;

use axum::{Extension, Router};

use billing::BillingServices;

/// Route table with the billing services attached. Metrics are layered on
/// by the binary.
pub fn app(services: BillingServices) -> Router {
    routes::api_routes().layer(Extension(services))
}
