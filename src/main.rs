use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use axum_prometheus::PrometheusMetricLayer;
use backend::billing::{self, BillingConfig, BillingServices, BillingStore, PgBillingStore};
use backend::config;
use backend::listings::{ListingsDirectory, PgListingsDirectory};
use backend::notifications::{
    start_notification_worker, LogDelivery, NotificationDelivery, WebhookDelivery,
};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    // Fail fast if the JWT secret is missing
    let _ = config::JWT_SECRET.as_str();
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(config::DATABASE_URL.as_str())
        .await?;

    // Run migrations if available
    if let Err(error) = sqlx::migrate!().run(&pool).await {
        if *config::ALLOW_MIGRATION_FAILURE {
            tracing::warn!(
                ?error,
                "Database migrations failed but continuing due to ALLOW_MIGRATION_FAILURE"
            );
        } else {
            return Err(Box::new(error) as Box<dyn std::error::Error>);
        }
    }

    let billing_config = BillingConfig::from_env();
    let delivery: Box<dyn NotificationDelivery> = match (*config::NOTIFICATION_WEBHOOK_URL).clone() {
        Some(url) => {
            tracing::info!(%url, "delivering notifications to webhook");
            Box::new(WebhookDelivery::new(
                url,
                (*config::NOTIFICATION_WEBHOOK_SECRET).clone(),
            ))
        }
        None => Box::new(LogDelivery),
    };
    let notifier = start_notification_worker(delivery, 256);

    let store: Arc<dyn BillingStore> = Arc::new(PgBillingStore::new(pool.clone()));
    let listings: Arc<dyn ListingsDirectory> = Arc::new(PgListingsDirectory::new(pool.clone()));
    let services = BillingServices::new(store, listings, Arc::new(notifier), billing_config.clone());

    billing::spawn_subscription_sweep(
        services.ledger.clone(),
        billing_config.sweep_interval,
        billing_config.pending_ttl,
    );

    let (prometheus_layer, metrics_handle) = PrometheusMetricLayer::pair();
    let app = Router::new()
        .route(
            "/metrics",
            get(move || async move { metrics_handle.render() }),
        )
        .merge(backend::app(services))
        .layer(prometheus_layer);

    let addr: SocketAddr = format!("{}:{}", config::BIND_ADDRESS.as_str(), *config::BIND_PORT)
        .parse()
        .map_err(|error| Box::new(error) as Box<dyn std::error::Error>)?;
    tracing::info!(%addr, "Listening for incoming connections");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
