use std::time::UNIX_EPOCH;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// key: billing-cycle -> period arithmetic
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingCycle {
    Monthly,
    Quarterly,
    Yearly,
    OneTime,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "MONTHLY",
            BillingCycle::Quarterly => "QUARTERLY",
            BillingCycle::Yearly => "YEARLY",
            BillingCycle::OneTime => "ONE_TIME",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "MONTHLY" => Some(BillingCycle::Monthly),
            "QUARTERLY" => Some(BillingCycle::Quarterly),
            "YEARLY" => Some(BillingCycle::Yearly),
            "ONE_TIME" => Some(BillingCycle::OneTime),
            _ => None,
        }
    }

    /// End of a paid period that starts at `start`. One-time purchases buy a
    /// single 30 day window.
    pub fn period_end(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            BillingCycle::Monthly => start.checked_add_months(Months::new(1)),
            BillingCycle::Quarterly => start.checked_add_months(Months::new(3)),
            BillingCycle::Yearly => start.checked_add_months(Months::new(12)),
            BillingCycle::OneTime => start.checked_add_signed(Duration::days(30)),
        }
    }

    pub fn renews(&self) -> bool {
        !matches!(self, BillingCycle::OneTime)
    }
}

/// Plan ceiling for a countable resource. Persisted as an integer where
/// `-1` means unlimited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum PlanLimit {
    Unlimited,
    AtMost(u32),
}

impl PlanLimit {
    pub const UNLIMITED: i32 = -1;

    pub fn raw(&self) -> i32 {
        match self {
            PlanLimit::Unlimited => Self::UNLIMITED,
            PlanLimit::AtMost(max) => i32::try_from(*max).unwrap_or(i32::MAX),
        }
    }

    /// Whether one more unit fits on top of `used`.
    pub fn permits(&self, used: i64) -> bool {
        match self {
            PlanLimit::Unlimited => true,
            PlanLimit::AtMost(max) => used < i64::from(*max),
        }
    }

    pub fn remaining(&self, used: i64) -> Option<i64> {
        match self {
            PlanLimit::Unlimited => None,
            PlanLimit::AtMost(max) => Some((i64::from(*max) - used).max(0)),
        }
    }
}

impl TryFrom<i32> for PlanLimit {
    type Error = String;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        match raw {
            Self::UNLIMITED => Ok(PlanLimit::Unlimited),
            value if value >= 0 => Ok(PlanLimit::AtMost(value as u32)),
            value => Err(format!("plan limit must be -1 or non-negative, got {value}")),
        }
    }
}

impl From<PlanLimit> for i32 {
    fn from(limit: PlanLimit) -> Self {
        limit.raw()
    }
}

/// key: billing-plan-model -> immutable tier terms
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub price_cents: i64,
    pub billing_cycle: BillingCycle,
    pub max_active_listings: PlanLimit,
    pub max_featured_listings: PlanLimit,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub const FREE_CODE: &'static str = "free";

    /// The implicit tier every seller falls back to. It is never stored and
    /// always carries the nil id.
    pub fn free(max_active_listings: PlanLimit, max_featured_listings: PlanLimit) -> Self {
        Self {
            id: Uuid::nil(),
            code: Self::FREE_CODE.to_string(),
            name: "Free".to_string(),
            price_cents: 0,
            billing_cycle: BillingCycle::OneTime,
            max_active_listings,
            max_featured_listings,
            is_active: true,
            created_at: DateTime::<Utc>::from(UNIX_EPOCH),
        }
    }

    pub fn is_free(&self) -> bool {
        self.id.is_nil()
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Cancelled,
    Expired,
    Suspended,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "PENDING",
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::Cancelled => "CANCELLED",
            SubscriptionStatus::Expired => "EXPIRED",
            SubscriptionStatus::Suspended => "SUSPENDED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(SubscriptionStatus::Pending),
            "ACTIVE" => Some(SubscriptionStatus::Active),
            "CANCELLED" => Some(SubscriptionStatus::Cancelled),
            "EXPIRED" => Some(SubscriptionStatus::Expired),
            "SUSPENDED" => Some(SubscriptionStatus::Suspended),
            _ => None,
        }
    }

    /// PENDING and ACTIVE; a user holds at most one subscription in these.
    pub fn is_open(&self) -> bool {
        matches!(self, SubscriptionStatus::Pending | SubscriptionStatus::Active)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }
}

/// key: billing-subscription-model -> seller lifecycle row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: i32,
    pub plan_id: Uuid,
    pub status: SubscriptionStatus,
    pub billing_cycle: BillingCycle,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub auto_renew: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Terminal status an ACTIVE subscription reaches once its period has
    /// run out at `now`, or `None` if nothing changes.
    pub fn lapse_at(&self, now: DateTime<Utc>) -> Option<SubscriptionStatus> {
        if self.status != SubscriptionStatus::Active {
            return None;
        }
        match self.current_period_end {
            Some(end) if end > now => None,
            _ if self.cancelled_at.is_some() => Some(SubscriptionStatus::Cancelled),
            _ => Some(SubscriptionStatus::Expired),
        }
    }

    /// Whether plan limits apply at `now`, regardless of a stale stored status.
    pub fn is_entitled(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.lapse_at(now).is_none()
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentIntentStatus {
    AwaitingReference,
    Submitted,
    Verified,
    Rejected,
}

impl PaymentIntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentIntentStatus::AwaitingReference => "AWAITING_REFERENCE",
            PaymentIntentStatus::Submitted => "SUBMITTED",
            PaymentIntentStatus::Verified => "VERIFIED",
            PaymentIntentStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "AWAITING_REFERENCE" => Some(PaymentIntentStatus::AwaitingReference),
            "SUBMITTED" => Some(PaymentIntentStatus::Submitted),
            "VERIFIED" => Some(PaymentIntentStatus::Verified),
            "REJECTED" => Some(PaymentIntentStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentIntentStatus::Verified | PaymentIntentStatus::Rejected
        )
    }
}

/// key: billing-payment-intent -> manual QR payment awaiting review
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentIntent {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub user_id: i32,
    pub amount_cents: i64,
    pub reference_number: Option<String>,
    pub status: PaymentIntentStatus,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<i32>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

/// key: billing-payment-log -> append-only transition audit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentLog {
    pub id: Uuid,
    pub payment_intent_id: Uuid,
    /// `None` when the system made the transition.
    pub actor_id: Option<i32>,
    pub from_status: Option<PaymentIntentStatus>,
    pub to_status: PaymentIntentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PaymentLog {
    pub fn transition(
        intent: &PaymentIntent,
        actor_id: Option<i32>,
        from_status: Option<PaymentIntentStatus>,
        notes: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_intent_id: intent.id,
            actor_id,
            from_status,
            to_status: intent.status,
            notes,
            created_at,
        }
    }
}

/// Filter applied to admin payment log queries.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PaymentLogFilter {
    pub payment_intent_id: Option<Uuid>,
    pub actor_id: Option<i32>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl PaymentLogFilter {
    pub fn matches(&self, entry: &PaymentLog) -> bool {
        self.payment_intent_id
            .map_or(true, |id| entry.payment_intent_id == id)
            && self
                .actor_id
                .map_or(true, |actor| entry.actor_id == Some(actor))
            && self.since.map_or(true, |since| entry.created_at >= since)
            && self.until.map_or(true, |until| entry.created_at <= until)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudSeverity {
    Low,
    Medium,
    High,
}

impl FraudSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            FraudSeverity::Low => "LOW",
            FraudSeverity::Medium => "MEDIUM",
            FraudSeverity::High => "HIGH",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "LOW" => Some(FraudSeverity::Low),
            "MEDIUM" => Some(FraudSeverity::Medium),
            "HIGH" => Some(FraudSeverity::High),
            _ => None,
        }
    }
}

/// key: billing-fraud-indicator -> admin review flag
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FraudIndicator {
    pub id: Uuid,
    pub user_id: Option<i32>,
    pub car_id: Option<Uuid>,
    pub indicator_type: String,
    pub severity: FraudSeverity,
    pub description: String,
    pub resolved: bool,
    pub resolution_notes: Option<String>,
    pub resolved_by: Option<i32>,
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedupe_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFraudIndicator {
    #[serde(default)]
    pub user_id: Option<i32>,
    #[serde(default)]
    pub car_id: Option<Uuid>,
    pub indicator_type: String,
    pub severity: FraudSeverity,
    pub description: String,
    /// While an unresolved indicator with the same key exists, another
    /// one is not recorded.
    #[serde(default)]
    pub dedupe_key: Option<String>,
}

impl NewFraudIndicator {
    pub fn into_indicator(self, created_at: DateTime<Utc>) -> FraudIndicator {
        FraudIndicator {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            car_id: self.car_id,
            indicator_type: self.indicator_type,
            severity: self.severity,
            description: self.description,
            resolved: false,
            resolution_notes: None,
            resolved_by: None,
            resolved_at: None,
            dedupe_key: self.dedupe_key,
            created_at,
        }
    }
}

/// Subscription with its plan, as rendered by the storefront.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionView {
    pub subscription: Subscription,
    pub plan: Plan,
}

/// The plan whose limits govern a seller right now.
#[derive(Debug, Clone, Serialize)]
pub struct EffectivePlan {
    pub plan: Plan,
    pub subscription: Option<Subscription>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn period_end_follows_the_billing_cycle() {
        let start = Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap();
        assert_eq!(
            BillingCycle::Monthly.period_end(start),
            Some(Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap())
        );
        assert_eq!(
            BillingCycle::Quarterly.period_end(start),
            Some(Utc.with_ymd_and_hms(2024, 4, 30, 12, 0, 0).unwrap())
        );
        assert_eq!(
            BillingCycle::Yearly.period_end(start),
            Some(Utc.with_ymd_and_hms(2025, 1, 31, 12, 0, 0).unwrap())
        );
        assert_eq!(
            BillingCycle::OneTime.period_end(start),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn only_one_time_purchases_skip_renewal() {
        assert!(BillingCycle::Monthly.renews());
        assert!(BillingCycle::Quarterly.renews());
        assert!(BillingCycle::Yearly.renews());
        assert!(!BillingCycle::OneTime.renews());
    }
}
