use std::sync::Arc;

use tracing::debug;

use crate::listings::ListingsDirectory;

use super::error::BillingResult;

/// key: usage-counter -> live listing counts, never cached
#[derive(Clone)]
pub struct UsageCounter {
    listings: Arc<dyn ListingsDirectory>,
}

impl UsageCounter {
    pub fn new(listings: Arc<dyn ListingsDirectory>) -> Self {
        Self { listings }
    }

    pub async fn count_active_listings(&self, user_id: i32) -> BillingResult<i64> {
        let count = self.listings.active_listing_count(user_id).await?;
        debug!(user_id, count, "counted active listings");
        Ok(count)
    }

    pub async fn count_active_featured(&self, user_id: i32) -> BillingResult<i64> {
        let count = self.listings.active_featured_count(user_id).await?;
        debug!(user_id, count, "counted featured listings");
        Ok(count)
    }
}
