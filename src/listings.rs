use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;

use crate::billing::error::BillingResult;

/// key: listings-directory -> storefront listing counts consumed by quotas
#[async_trait]
pub trait ListingsDirectory: Send + Sync {
    async fn active_listing_count(&self, user_id: i32) -> BillingResult<i64>;
    async fn active_featured_count(&self, user_id: i32) -> BillingResult<i64>;
}

/// Reads the storefront's `car_listings` table.
#[derive(Clone)]
pub struct PgListingsDirectory {
    pool: PgPool,
}

impl PgListingsDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ListingsDirectory for PgListingsDirectory {
    async fn active_listing_count(&self, user_id: i32) -> BillingResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM car_listings WHERE seller_id = $1 AND status = 'ACTIVE'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn active_featured_count(&self, user_id: i32) -> BillingResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM car_listings WHERE seller_id = $1 AND status = 'ACTIVE' AND is_featured = TRUE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListingCounts {
    pub active: i64,
    pub featured: i64,
}

/// In-memory directory for tests and local runs without a listings table.
#[derive(Default)]
pub struct StaticListings {
    counts: DashMap<i32, ListingCounts>,
}

impl StaticListings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_counts(&self, user_id: i32, active: i64, featured: i64) {
        self.counts
            .insert(user_id, ListingCounts { active, featured });
    }

    fn counts_for(&self, user_id: i32) -> ListingCounts {
        self.counts
            .get(&user_id)
            .map(|entry| *entry.value())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ListingsDirectory for StaticListings {
    async fn active_listing_count(&self, user_id: i32) -> BillingResult<i64> {
        Ok(self.counts_for(user_id).active)
    }

    async fn active_featured_count(&self, user_id: i32) -> BillingResult<i64> {
        Ok(self.counts_for(user_id).featured)
    }
}
