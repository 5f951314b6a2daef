//! In-memory billing store used by tests and local development.
//!
//! A transaction holds the store-wide lock for its whole lifetime and works
//! on a copy of the tables, so commits are all-or-nothing and transactions
//! are fully serialised.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::error::{BillingError, BillingResult};
use super::models::{
    FraudIndicator, FraudSeverity, PaymentIntent, PaymentIntentStatus, PaymentLog,
    PaymentLogFilter, Plan, Subscription, SubscriptionStatus,
};
use super::store::{BillingStore, BillingTx};

#[derive(Clone, Default)]
struct Tables {
    plans: HashMap<Uuid, Plan>,
    subscriptions: HashMap<Uuid, Subscription>,
    intents: HashMap<Uuid, PaymentIntent>,
    payment_logs: Vec<PaymentLog>,
    indicators: HashMap<Uuid, FraudIndicator>,
}

#[derive(Clone, Default)]
pub struct InMemoryBillingStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plans(plans: impl IntoIterator<Item = Plan>) -> Self {
        let tables = Tables {
            plans: plans.into_iter().map(|plan| (plan.id, plan)).collect(),
            ..Tables::default()
        };
        Self {
            tables: Arc::new(Mutex::new(tables)),
        }
    }
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn begin(&self) -> BillingResult<Box<dyn BillingTx>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTx { guard, working }))
    }
}

struct InMemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

fn sorted_by<T, K: Ord>(mut rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    rows.sort_by_key(|row| key(row));
    rows
}

#[async_trait]
impl BillingTx for InMemoryTx {
    async fn insert_plan(&mut self, plan: &Plan) -> BillingResult<()> {
        if self
            .working
            .plans
            .values()
            .any(|existing| existing.id == plan.id || existing.code == plan.code)
        {
            return Err(BillingError::Conflict(format!(
                "plan {} already exists",
                plan.code
            )));
        }
        self.working.plans.insert(plan.id, plan.clone());
        Ok(())
    }

    async fn find_plan(&mut self, id: Uuid) -> BillingResult<Option<Plan>> {
        Ok(self.working.plans.get(&id).cloned())
    }

    async fn active_plans(&mut self) -> BillingResult<Vec<Plan>> {
        let mut plans: Vec<Plan> = self
            .working
            .plans
            .values()
            .filter(|plan| plan.is_active)
            .cloned()
            .collect();
        plans.sort_by(|a, b| {
            a.price_cents
                .cmp(&b.price_cents)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(plans)
    }

    async fn insert_subscription(&mut self, subscription: &Subscription) -> BillingResult<()> {
        if subscription.status.is_open() {
            if let Some(open) = self.working.subscriptions.values().find(|existing| {
                existing.user_id == subscription.user_id && existing.status.is_open()
            }) {
                return Err(BillingError::Conflict(format!(
                    "user {} already holds subscription {} in {}",
                    subscription.user_id,
                    open.id,
                    open.status.as_str()
                )));
            }
        }
        self.working
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn find_subscription(&mut self, id: Uuid) -> BillingResult<Option<Subscription>> {
        Ok(self.working.subscriptions.get(&id).cloned())
    }

    async fn lock_subscription(&mut self, id: Uuid) -> BillingResult<Option<Subscription>> {
        self.find_subscription(id).await
    }

    async fn open_subscription_for_user(
        &mut self,
        user_id: i32,
    ) -> BillingResult<Option<Subscription>> {
        Ok(self
            .working
            .subscriptions
            .values()
            .find(|subscription| subscription.user_id == user_id && subscription.status.is_open())
            .cloned())
    }

    async fn latest_subscription_for_user(
        &mut self,
        user_id: i32,
    ) -> BillingResult<Option<Subscription>> {
        Ok(self
            .working
            .subscriptions
            .values()
            .filter(|subscription| subscription.user_id == user_id)
            .max_by_key(|subscription| (subscription.created_at, subscription.updated_at))
            .cloned())
    }

    async fn compare_and_set_subscription(
        &mut self,
        next: &Subscription,
        expected: SubscriptionStatus,
    ) -> BillingResult<Option<Subscription>> {
        match self.working.subscriptions.get_mut(&next.id) {
            Some(stored) if stored.status == expected => {
                *stored = next.clone();
                Ok(Some(next.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn lapsed_subscriptions(
        &mut self,
        now: DateTime<Utc>,
    ) -> BillingResult<Vec<Subscription>> {
        let rows: Vec<Subscription> = self
            .working
            .subscriptions
            .values()
            .filter(|subscription| {
                subscription.status == SubscriptionStatus::Active
                    && subscription
                        .current_period_end
                        .map_or(true, |end| end <= now)
            })
            .cloned()
            .collect();
        Ok(sorted_by(rows, |subscription| {
            subscription.current_period_end
        }))
    }

    async fn pending_subscriptions_created_before(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> BillingResult<Vec<Subscription>> {
        let rows: Vec<Subscription> = self
            .working
            .subscriptions
            .values()
            .filter(|subscription| {
                subscription.status == SubscriptionStatus::Pending
                    && subscription.created_at < cutoff
            })
            .cloned()
            .collect();
        Ok(sorted_by(rows, |subscription| {
            subscription.created_at
        }))
    }

    async fn insert_intent(&mut self, intent: &PaymentIntent) -> BillingResult<()> {
        if intent.status != PaymentIntentStatus::Rejected {
            if let Some(live) = self.working.intents.values().find(|existing| {
                existing.subscription_id == intent.subscription_id
                    && existing.status != PaymentIntentStatus::Rejected
            }) {
                return Err(BillingError::Conflict(format!(
                    "subscription {} already has payment intent {} in {}",
                    intent.subscription_id,
                    live.id,
                    live.status.as_str()
                )));
            }
        }
        self.working.intents.insert(intent.id, intent.clone());
        Ok(())
    }

    async fn find_intent(&mut self, id: Uuid) -> BillingResult<Option<PaymentIntent>> {
        Ok(self.working.intents.get(&id).cloned())
    }

    async fn lock_intent(&mut self, id: Uuid) -> BillingResult<Option<PaymentIntent>> {
        self.find_intent(id).await
    }

    async fn compare_and_set_intent(
        &mut self,
        next: &PaymentIntent,
        expected: PaymentIntentStatus,
    ) -> BillingResult<Option<PaymentIntent>> {
        match self.working.intents.get_mut(&next.id) {
            Some(stored) if stored.status == expected => {
                *stored = next.clone();
                Ok(Some(next.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn intents_for_subscription(
        &mut self,
        subscription_id: Uuid,
    ) -> BillingResult<Vec<PaymentIntent>> {
        let rows: Vec<PaymentIntent> = self
            .working
            .intents
            .values()
            .filter(|intent| intent.subscription_id == subscription_id)
            .cloned()
            .collect();
        Ok(sorted_by(rows, |intent| intent.created_at))
    }

    async fn intents_with_status(
        &mut self,
        status: PaymentIntentStatus,
    ) -> BillingResult<Vec<PaymentIntent>> {
        let rows: Vec<PaymentIntent> = self
            .working
            .intents
            .values()
            .filter(|intent| intent.status == status)
            .cloned()
            .collect();
        Ok(sorted_by(rows, |intent| {
            (intent.submitted_at, intent.created_at)
        }))
    }

    async fn intents_with_reference(
        &mut self,
        reference_number: &str,
    ) -> BillingResult<Vec<PaymentIntent>> {
        Ok(self
            .working
            .intents
            .values()
            .filter(|intent| intent.reference_number.as_deref() == Some(reference_number))
            .cloned()
            .collect())
    }

    async fn recent_reviews_for_user(
        &mut self,
        user_id: i32,
        limit: i64,
    ) -> BillingResult<Vec<PaymentIntent>> {
        let mut rows: Vec<PaymentIntent> = self
            .working
            .intents
            .values()
            .filter(|intent| {
                intent.user_id == user_id
                    && intent.reviewed_by.is_some()
                    && intent.status.is_terminal()
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.reviewed_at
                .cmp(&a.reviewed_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        rows.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(rows)
    }

    async fn append_payment_log(&mut self, entry: &PaymentLog) -> BillingResult<()> {
        self.working.payment_logs.push(entry.clone());
        Ok(())
    }

    async fn payment_logs(&mut self, filter: &PaymentLogFilter) -> BillingResult<Vec<PaymentLog>> {
        let mut rows: Vec<PaymentLog> = self
            .working
            .payment_logs
            .iter()
            .rev()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            rows.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        }
        Ok(rows)
    }

    async fn insert_indicator(&mut self, indicator: &FraudIndicator) -> BillingResult<bool> {
        if let Some(key) = indicator.dedupe_key.as_deref() {
            let duplicate = self
                .working
                .indicators
                .values()
                .any(|existing| !existing.resolved && existing.dedupe_key.as_deref() == Some(key));
            if duplicate {
                return Ok(false);
            }
        }
        self.working
            .indicators
            .insert(indicator.id, indicator.clone());
        Ok(true)
    }

    async fn find_indicator(&mut self, id: Uuid) -> BillingResult<Option<FraudIndicator>> {
        Ok(self.working.indicators.get(&id).cloned())
    }

    async fn resolve_indicator(
        &mut self,
        next: &FraudIndicator,
    ) -> BillingResult<Option<FraudIndicator>> {
        match self.working.indicators.get_mut(&next.id) {
            Some(stored) if !stored.resolved => {
                *stored = next.clone();
                Ok(Some(next.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn unresolved_indicators(
        &mut self,
        severity: Option<FraudSeverity>,
    ) -> BillingResult<Vec<FraudIndicator>> {
        let mut rows: Vec<FraudIndicator> = self
            .working
            .indicators
            .values()
            .filter(|indicator| {
                !indicator.resolved && severity.map_or(true, |level| indicator.severity == level)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn commit(self: Box<Self>) -> BillingResult<()> {
        let InMemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
