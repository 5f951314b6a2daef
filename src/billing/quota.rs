use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::error::{BillingError, BillingResult};
use super::ledger::SubscriptionLedger;
use super::models::{Plan, PlanLimit};
use super::usage::UsageCounter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuotaDenialReason {
    LimitListings,
    LimitFeatured,
}

impl QuotaDenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaDenialReason::LimitListings => "LIMIT_LISTINGS",
            QuotaDenialReason::LimitFeatured => "LIMIT_FEATURED",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            QuotaDenialReason::LimitListings => {
                "You have reached your active listing limit. Upgrade to list more cars."
            }
            QuotaDenialReason::LimitFeatured => {
                "You have reached your featured listing limit. Upgrade to feature more cars."
            }
        }
    }
}

/// Plan limit and live usage at the moment of a quota check.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuotaSnapshot {
    pub plan_id: Uuid,
    pub plan_name: String,
    pub limit: PlanLimit,
    pub used: i64,
    pub remaining: Option<i64>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum QuotaDecision {
    Allowed(QuotaSnapshot),
    Denied {
        reason: QuotaDenialReason,
        snapshot: QuotaSnapshot,
    },
}

impl QuotaDecision {
    fn evaluate(plan: &Plan, limit: PlanLimit, used: i64, reason: QuotaDenialReason) -> Self {
        let snapshot = QuotaSnapshot {
            plan_id: plan.id,
            plan_name: plan.name.clone(),
            limit,
            used,
            remaining: limit.remaining(used),
        };
        if limit.permits(used) {
            QuotaDecision::Allowed(snapshot)
        } else {
            QuotaDecision::Denied { reason, snapshot }
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed(_))
    }

    pub fn snapshot(&self) -> &QuotaSnapshot {
        match self {
            QuotaDecision::Allowed(snapshot) => snapshot,
            QuotaDecision::Denied { snapshot, .. } => snapshot,
        }
    }

    pub fn reason(&self) -> Option<QuotaDenialReason> {
        match self {
            QuotaDecision::Allowed(_) => None,
            QuotaDecision::Denied { reason, .. } => Some(*reason),
        }
    }

    pub fn into_result(self) -> BillingResult<QuotaSnapshot> {
        match self {
            QuotaDecision::Allowed(snapshot) => Ok(snapshot),
            QuotaDecision::Denied { reason, .. } => Err(BillingError::LimitExceeded(reason)),
        }
    }
}

/// key: quota-enforcer -> listing pre-checks against the effective plan
#[derive(Clone)]
pub struct QuotaEnforcer {
    ledger: SubscriptionLedger,
    usage: UsageCounter,
}

impl QuotaEnforcer {
    pub fn new(ledger: SubscriptionLedger, usage: UsageCounter) -> Self {
        Self { ledger, usage }
    }

    pub async fn can_create_listing(
        &self,
        user_id: i32,
        now: DateTime<Utc>,
    ) -> BillingResult<QuotaDecision> {
        let effective = self.ledger.effective_plan(user_id, now).await?;
        let used = self.usage.count_active_listings(user_id).await?;
        let decision = QuotaDecision::evaluate(
            &effective.plan,
            effective.plan.max_active_listings,
            used,
            QuotaDenialReason::LimitListings,
        );
        if let Some(reason) = decision.reason() {
            info!(user_id, plan = %effective.plan.code, used, reason = reason.as_str(), "listing creation denied");
        }
        Ok(decision)
    }

    pub async fn can_feature_listing(
        &self,
        user_id: i32,
        now: DateTime<Utc>,
    ) -> BillingResult<QuotaDecision> {
        let effective = self.ledger.effective_plan(user_id, now).await?;
        let used = self.usage.count_active_featured(user_id).await?;
        let decision = QuotaDecision::evaluate(
            &effective.plan,
            effective.plan.max_featured_listings,
            used,
            QuotaDenialReason::LimitFeatured,
        );
        if let Some(reason) = decision.reason() {
            info!(user_id, plan = %effective.plan.code, used, reason = reason.as_str(), "featuring denied");
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(listings: PlanLimit) -> Plan {
        let mut plan = Plan::free(listings, PlanLimit::AtMost(0));
        plan.name = "Test".into();
        plan
    }

    #[test]
    fn denies_at_the_limit() {
        let decision = QuotaDecision::evaluate(
            &plan(PlanLimit::AtMost(3)),
            PlanLimit::AtMost(3),
            3,
            QuotaDenialReason::LimitListings,
        );
        assert_eq!(decision.reason(), Some(QuotaDenialReason::LimitListings));
        assert_eq!(decision.snapshot().remaining, Some(0));
        assert!(matches!(
            decision.into_result(),
            Err(BillingError::LimitExceeded(QuotaDenialReason::LimitListings))
        ));
    }

    #[test]
    fn unlimited_always_allows() {
        let decision = QuotaDecision::evaluate(
            &plan(PlanLimit::Unlimited),
            PlanLimit::Unlimited,
            10_000,
            QuotaDenialReason::LimitListings,
        );
        assert!(decision.is_allowed());
        assert_eq!(decision.snapshot().remaining, None);
    }

    #[test]
    fn zero_limit_denies_the_first_unit() {
        let decision = QuotaDecision::evaluate(
            &plan(PlanLimit::AtMost(0)),
            PlanLimit::AtMost(0),
            0,
            QuotaDenialReason::LimitFeatured,
        );
        assert!(!decision.is_allowed());
        assert_eq!(decision.reason().map(|r| r.as_str()), Some("LIMIT_FEATURED"));
    }
}
