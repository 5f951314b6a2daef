use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::config;

use super::models::{Plan, PlanLimit};

/// key: billing-config -> knobs shared by the billing services
#[derive(Clone, Debug)]
pub struct BillingConfig {
    pub free_max_active_listings: PlanLimit,
    pub free_max_featured_listings: PlanLimit,
    /// Consecutive admin rejections that raise a fraud indicator.
    pub rejection_streak: usize,
    /// Age after which an unpaid PENDING subscription is withdrawn by the
    /// sweep. `None` keeps pending subscriptions forever.
    pub pending_ttl: Option<Duration>,
    pub sweep_interval: StdDuration,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            free_max_active_listings: PlanLimit::AtMost(3),
            free_max_featured_listings: PlanLimit::AtMost(0),
            rejection_streak: 3,
            pending_ttl: None,
            sweep_interval: StdDuration::from_secs(300),
        }
    }
}

impl BillingConfig {
    pub fn from_env() -> Self {
        Self {
            free_max_active_listings: *config::FREE_PLAN_MAX_LISTINGS,
            free_max_featured_listings: *config::FREE_PLAN_MAX_FEATURED,
            rejection_streak: *config::FRAUD_REJECTION_STREAK,
            pending_ttl: config::PENDING_SUBSCRIPTION_TTL_HOURS.map(Duration::hours),
            sweep_interval: StdDuration::from_secs(*config::SUBSCRIPTION_SWEEP_INTERVAL_SECS),
        }
    }

    pub fn free_plan(&self) -> Plan {
        Plan::free(
            self.free_max_active_listings,
            self.free_max_featured_listings,
        )
    }
}
