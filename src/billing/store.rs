use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::BillingResult;
use super::models::{
    FraudIndicator, FraudSeverity, PaymentIntent, PaymentIntentStatus, PaymentLog,
    PaymentLogFilter, Plan, Subscription, SubscriptionStatus,
};

/// key: billing-store -> persistence seam
/// Hands out units of work. Nothing is visible to other callers until
/// `BillingTx::commit`; dropping a transaction discards it.
#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn begin(&self) -> BillingResult<Box<dyn BillingTx>>;
}

/// key: billing-store-tx -> unit of work over the billing tables
///
/// Every `compare_and_set_*` writes the full row only when the stored status
/// still equals `expected`, returning `None` otherwise. Lifecycle
/// transitions are linearised through these calls rather than through
/// caller-side reads.
#[async_trait]
pub trait BillingTx: Send {
    async fn insert_plan(&mut self, plan: &Plan) -> BillingResult<()>;
    async fn find_plan(&mut self, id: Uuid) -> BillingResult<Option<Plan>>;
    /// Active plans ordered by price, then name.
    async fn active_plans(&mut self) -> BillingResult<Vec<Plan>>;

    /// Fails with `Conflict` when the user already holds a PENDING or ACTIVE
    /// subscription.
    async fn insert_subscription(&mut self, subscription: &Subscription) -> BillingResult<()>;
    async fn find_subscription(&mut self, id: Uuid) -> BillingResult<Option<Subscription>>;
    async fn lock_subscription(&mut self, id: Uuid) -> BillingResult<Option<Subscription>>;
    async fn open_subscription_for_user(
        &mut self,
        user_id: i32,
    ) -> BillingResult<Option<Subscription>>;
    async fn latest_subscription_for_user(
        &mut self,
        user_id: i32,
    ) -> BillingResult<Option<Subscription>>;
    async fn compare_and_set_subscription(
        &mut self,
        next: &Subscription,
        expected: SubscriptionStatus,
    ) -> BillingResult<Option<Subscription>>;
    /// ACTIVE subscriptions whose period ended at or before `now`.
    async fn lapsed_subscriptions(&mut self, now: DateTime<Utc>)
        -> BillingResult<Vec<Subscription>>;
    async fn pending_subscriptions_created_before(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> BillingResult<Vec<Subscription>>;

    /// Fails with `Conflict` when the subscription already has an intent that
    /// is not REJECTED.
    async fn insert_intent(&mut self, intent: &PaymentIntent) -> BillingResult<()>;
    async fn find_intent(&mut self, id: Uuid) -> BillingResult<Option<PaymentIntent>>;
    async fn lock_intent(&mut self, id: Uuid) -> BillingResult<Option<PaymentIntent>>;
    async fn compare_and_set_intent(
        &mut self,
        next: &PaymentIntent,
        expected: PaymentIntentStatus,
    ) -> BillingResult<Option<PaymentIntent>>;
    /// Oldest first.
    async fn intents_for_subscription(
        &mut self,
        subscription_id: Uuid,
    ) -> BillingResult<Vec<PaymentIntent>>;
    /// Oldest submission first.
    async fn intents_with_status(
        &mut self,
        status: PaymentIntentStatus,
    ) -> BillingResult<Vec<PaymentIntent>>;
    async fn intents_with_reference(
        &mut self,
        reference_number: &str,
    ) -> BillingResult<Vec<PaymentIntent>>;
    /// Admin-reviewed intents of `user_id`, most recently reviewed first.
    async fn recent_reviews_for_user(
        &mut self,
        user_id: i32,
        limit: i64,
    ) -> BillingResult<Vec<PaymentIntent>>;

    async fn append_payment_log(&mut self, entry: &PaymentLog) -> BillingResult<()>;
    /// Newest first.
    async fn payment_logs(&mut self, filter: &PaymentLogFilter) -> BillingResult<Vec<PaymentLog>>;

    /// Returns `false` when an unresolved indicator with the same dedupe key
    /// already exists.
    async fn insert_indicator(&mut self, indicator: &FraudIndicator) -> BillingResult<bool>;
    async fn find_indicator(&mut self, id: Uuid) -> BillingResult<Option<FraudIndicator>>;
    /// Stores `next` only if the stored indicator is still unresolved.
    async fn resolve_indicator(
        &mut self,
        next: &FraudIndicator,
    ) -> BillingResult<Option<FraudIndicator>>;
    /// Newest first.
    async fn unresolved_indicators(
        &mut self,
        severity: Option<FraudSeverity>,
    ) -> BillingResult<Vec<FraudIndicator>>;

    async fn commit(self: Box<Self>) -> BillingResult<()>;
}
