//! Seller subscription lifecycle.
//!
//! PENDING -> ACTIVE -> {CANCELLED, EXPIRED}, PENDING/ACTIVE -> SUSPENDED
//! (admin) and PENDING -> CANCELLED (seller withdraws before paying). Every
//! transition is a compare-and-set on the status read under lock, so racing
//! writers see `InvalidState` rather than a double transition.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::identity::Caller;
use crate::notifications::{NotificationEvent, Notifier};

use super::catalog::PlanCatalog;
use super::error::{BillingError, BillingResult};
use super::models::{
    BillingCycle, EffectivePlan, PaymentIntentStatus, Subscription, SubscriptionStatus,
    SubscriptionView,
};
use super::payments::withdraw_intent_in;
use super::store::{BillingStore, BillingTx};

/// Outcome of one expiry sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired: usize,
    pub cancelled: usize,
    pub withdrawn: usize,
    pub failed: usize,
}

/// key: subscription-ledger -> per-seller state machine
#[derive(Clone)]
pub struct SubscriptionLedger {
    store: Arc<dyn BillingStore>,
    catalog: PlanCatalog,
    notifier: Arc<dyn Notifier>,
}

impl SubscriptionLedger {
    pub fn new(
        store: Arc<dyn BillingStore>,
        catalog: PlanCatalog,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            catalog,
            notifier,
        }
    }

    pub async fn start_subscription(
        &self,
        caller: &Caller,
        plan_id: Uuid,
        billing_cycle: BillingCycle,
        auto_renew: bool,
        now: DateTime<Utc>,
    ) -> BillingResult<Subscription> {
        caller.require_seller()?;
        let mut tx = self.store.begin().await?;

        let plan = match tx.find_plan(plan_id).await? {
            Some(plan) if plan.is_active => plan,
            Some(_) => {
                return Err(BillingError::validation(format!(
                    "plan {plan_id} is no longer offered"
                )))
            }
            None => return Err(BillingError::validation(format!("unknown plan {plan_id}"))),
        };
        if plan.billing_cycle != billing_cycle {
            return Err(BillingError::validation(format!(
                "plan {} is billed {}, not {}",
                plan.code,
                plan.billing_cycle.as_str(),
                billing_cycle.as_str()
            )));
        }

        let mut ended = None;
        if let Some(open) = tx.open_subscription_for_user(caller.user_id).await? {
            if open.lapse_at(now).is_none() {
                return Err(BillingError::Conflict(format!(
                    "user {} already holds subscription {} in {}",
                    caller.user_id,
                    open.id,
                    open.status.as_str()
                )));
            }
            // a lapsed ACTIVE row must not block a fresh subscription
            let (lapsed, changed) = lapse_in(&mut *tx, &open, now).await?;
            ended = changed.then_some(lapsed);
        }

        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id: caller.user_id,
            plan_id: plan.id,
            status: SubscriptionStatus::Pending,
            billing_cycle,
            current_period_start: None,
            current_period_end: None,
            auto_renew: auto_renew && billing_cycle.renews(),
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };
        tx.insert_subscription(&subscription).await?;
        tx.commit().await?;
        if let Some(ended) = &ended {
            self.notify_ended(ended);
        }

        info!(
            user_id = caller.user_id,
            subscription = %subscription.id,
            plan = %plan.code,
            "subscription started"
        );
        Ok(subscription)
    }

    /// Moves a PENDING subscription to ACTIVE. Calling it again on an ACTIVE
    /// subscription returns the stored row unchanged.
    pub async fn activate(
        &self,
        subscription_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> BillingResult<Subscription> {
        let mut tx = self.store.begin().await?;
        let subscription = activate_in(&mut *tx, subscription_id, period_start, period_end).await?;
        tx.commit().await?;
        Ok(subscription)
    }

    pub async fn request_cancellation(
        &self,
        caller: &Caller,
        subscription_id: Uuid,
        now: DateTime<Utc>,
    ) -> BillingResult<Subscription> {
        let mut tx = self.store.begin().await?;
        let current = lock_existing(&mut *tx, subscription_id).await?;
        caller.require_owner_or_admin(current.user_id)?;

        let updated = match current.status {
            SubscriptionStatus::Active => {
                if current.lapse_at(now).is_some() {
                    let (lapsed, changed) = lapse_in(&mut *tx, &current, now).await?;
                    tx.commit().await?;
                    if changed {
                        self.notify_ended(&lapsed);
                    }
                    return Err(BillingError::invalid_state(format!(
                        "subscription {subscription_id} is already {}",
                        lapsed.status.as_str()
                    )));
                }
                if current.cancelled_at.is_some() && !current.auto_renew {
                    return Ok(current);
                }
                let next = Subscription {
                    cancelled_at: current.cancelled_at.or(Some(now)),
                    auto_renew: false,
                    updated_at: now,
                    ..current.clone()
                };
                compare_and_set(&mut *tx, &next, SubscriptionStatus::Active).await?
            }
            SubscriptionStatus::Pending => {
                withdraw_pending_in(&mut *tx, &current, Some(caller.user_id), now).await?
            }
            other => {
                return Err(BillingError::invalid_state(format!(
                    "subscription {subscription_id} is already {}",
                    other.as_str()
                )))
            }
        };
        tx.commit().await?;

        info!(
            user_id = updated.user_id,
            subscription = %updated.id,
            status = updated.status.as_str(),
            actor = caller.user_id,
            "subscription cancellation requested"
        );
        Ok(updated)
    }

    /// Applies a lapsed period to an ACTIVE subscription. Anything else is
    /// returned as stored.
    pub async fn reconcile_expiry(
        &self,
        subscription_id: Uuid,
        now: DateTime<Utc>,
    ) -> BillingResult<Subscription> {
        let mut tx = self.store.begin().await?;
        let current = lock_existing(&mut *tx, subscription_id).await?;
        if current.lapse_at(now).is_none() {
            return Ok(current);
        }
        let (subscription, changed) = lapse_in(&mut *tx, &current, now).await?;
        tx.commit().await?;
        if changed {
            self.notify_ended(&subscription);
        }
        Ok(subscription)
    }

    pub async fn suspend(
        &self,
        caller: &Caller,
        subscription_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> BillingResult<Subscription> {
        caller.require_admin()?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(BillingError::validation("suspension reason is required"));
        }

        let mut tx = self.store.begin().await?;
        let current = lock_existing(&mut *tx, subscription_id).await?;
        if !current.status.is_open() {
            return Err(BillingError::invalid_state(format!(
                "subscription {subscription_id} is already {}",
                current.status.as_str()
            )));
        }
        if current.status == SubscriptionStatus::Pending {
            for intent in tx.intents_for_subscription(current.id).await? {
                if intent.status == PaymentIntentStatus::AwaitingReference {
                    withdraw_intent_in(
                        &mut *tx,
                        &intent,
                        Some(caller.user_id),
                        "subscription suspended",
                        now,
                    )
                    .await?;
                }
            }
        }
        let next = Subscription {
            status: SubscriptionStatus::Suspended,
            auto_renew: false,
            updated_at: now,
            ..current.clone()
        };
        let suspended = compare_and_set(&mut *tx, &next, current.status).await?;
        tx.commit().await?;

        warn!(
            user_id = suspended.user_id,
            subscription = %suspended.id,
            admin = caller.user_id,
            reason,
            "subscription suspended"
        );
        self.notify_ended(&suspended);
        Ok(suspended)
    }

    /// Most recent subscription of `user_id` with its plan, reconciled at `now`.
    pub async fn current_subscription(
        &self,
        user_id: i32,
        now: DateTime<Utc>,
    ) -> BillingResult<Option<SubscriptionView>> {
        let mut tx = self.store.begin().await?;
        let Some(latest) = tx.latest_subscription_for_user(user_id).await? else {
            return Ok(None);
        };
        let plan = self.catalog.plan_in(&mut *tx, latest.plan_id).await?;
        if latest.lapse_at(now).is_none() {
            return Ok(Some(SubscriptionView {
                subscription: latest,
                plan,
            }));
        }
        let (subscription, changed) = lapse_in(&mut *tx, &latest, now).await?;
        tx.commit().await?;
        if changed {
            self.notify_ended(&subscription);
        }
        Ok(Some(SubscriptionView { subscription, plan }))
    }

    /// The plan whose limits apply to `user_id` at `now`.
    pub async fn effective_plan(
        &self,
        user_id: i32,
        now: DateTime<Utc>,
    ) -> BillingResult<EffectivePlan> {
        let mut tx = self.store.begin().await?;
        let open = tx.open_subscription_for_user(user_id).await?;
        match open {
            Some(subscription) if subscription.is_entitled(now) => {
                let plan = self.catalog.plan_in(&mut *tx, subscription.plan_id).await?;
                Ok(EffectivePlan {
                    plan,
                    subscription: Some(subscription),
                })
            }
            Some(subscription) if subscription.lapse_at(now).is_some() => {
                let (ended, changed) = lapse_in(&mut *tx, &subscription, now).await?;
                tx.commit().await?;
                if changed {
                    self.notify_ended(&ended);
                }
                Ok(EffectivePlan {
                    plan: self.catalog.free_plan(),
                    subscription: None,
                })
            }
            _ => Ok(EffectivePlan {
                plan: self.catalog.free_plan(),
                subscription: None,
            }),
        }
    }

    /// Reconciles every lapsed ACTIVE subscription and, when `pending_ttl` is
    /// set, withdraws unpaid PENDING subscriptions older than it.
    pub async fn sweep(
        &self,
        now: DateTime<Utc>,
        pending_ttl: Option<Duration>,
    ) -> BillingResult<SweepReport> {
        let mut report = SweepReport::default();

        let lapsed = {
            let mut tx = self.store.begin().await?;
            tx.lapsed_subscriptions(now).await?
        };
        for candidate in lapsed {
            match self.reconcile_expiry(candidate.id, now).await {
                Ok(subscription) => match subscription.status {
                    SubscriptionStatus::Expired => report.expired += 1,
                    SubscriptionStatus::Cancelled => report.cancelled += 1,
                    _ => {}
                },
                Err(err) => {
                    report.failed += 1;
                    warn!(?err, subscription = %candidate.id, "failed to reconcile subscription expiry");
                }
            }
        }

        if let Some(ttl) = pending_ttl {
            let Some(cutoff) = now.checked_sub_signed(ttl) else {
                warn!(ttl_hours = ttl.num_hours(), "pending ttl out of range; skipping withdrawal");
                debug!(?report, "subscription sweep finished");
                return Ok(report);
            };
            let stale = {
                let mut tx = self.store.begin().await?;
                tx.pending_subscriptions_created_before(cutoff).await?
            };
            for candidate in stale {
                match self.withdraw_stale_pending(candidate.id, now).await {
                    Ok(true) => report.withdrawn += 1,
                    Ok(false) => {}
                    Err(err) => {
                        report.failed += 1;
                        warn!(?err, subscription = %candidate.id, "failed to withdraw stale subscription");
                    }
                }
            }
        }

        debug!(?report, "subscription sweep finished");
        Ok(report)
    }

    async fn withdraw_stale_pending(
        &self,
        subscription_id: Uuid,
        now: DateTime<Utc>,
    ) -> BillingResult<bool> {
        let mut tx = self.store.begin().await?;
        let current = lock_existing(&mut *tx, subscription_id).await?;
        if current.status != SubscriptionStatus::Pending {
            return Ok(false);
        }
        let withdrawn = match withdraw_pending_in(&mut *tx, &current, None, now).await {
            Ok(subscription) => subscription,
            // awaiting admin review; leave it alone
            Err(BillingError::InvalidState(_)) => return Ok(false),
            Err(err) => return Err(err),
        };
        tx.commit().await?;
        info!(
            user_id = withdrawn.user_id,
            subscription = %withdrawn.id,
            "withdrew unpaid subscription"
        );
        self.notify_ended(&withdrawn);
        Ok(true)
    }

    fn notify_ended(&self, subscription: &Subscription) {
        self.notifier.notify(NotificationEvent::SubscriptionEnded {
            user_id: subscription.user_id,
            subscription_id: subscription.id,
            status: subscription.status,
        });
    }
}

async fn lock_existing(tx: &mut dyn BillingTx, id: Uuid) -> BillingResult<Subscription> {
    tx.lock_subscription(id)
        .await?
        .ok_or_else(|| BillingError::not_found("subscription", id))
}

async fn compare_and_set(
    tx: &mut dyn BillingTx,
    next: &Subscription,
    expected: SubscriptionStatus,
) -> BillingResult<Subscription> {
    tx.compare_and_set_subscription(next, expected)
        .await?
        .ok_or_else(|| {
            BillingError::invalid_state(format!(
                "subscription {} is no longer {}",
                next.id,
                expected.as_str()
            ))
        })
}

/// Activation inside an open unit of work. The payment verifier runs this in
/// the same transaction as the intent transition.
pub(crate) async fn activate_in(
    tx: &mut dyn BillingTx,
    subscription_id: Uuid,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> BillingResult<Subscription> {
    let current = lock_existing(tx, subscription_id).await?;
    match current.status {
        SubscriptionStatus::Active => return Ok(current),
        SubscriptionStatus::Pending => {}
        other => {
            return Err(BillingError::invalid_state(format!(
                "subscription {subscription_id} cannot be activated from {}",
                other.as_str()
            )))
        }
    }
    if period_end <= period_start {
        return Err(BillingError::validation(
            "subscription period must end after it starts",
        ));
    }

    let next = Subscription {
        status: SubscriptionStatus::Active,
        current_period_start: Some(period_start),
        current_period_end: Some(period_end),
        updated_at: period_start,
        ..current
    };
    let activated = compare_and_set(tx, &next, SubscriptionStatus::Pending).await?;
    info!(
        user_id = activated.user_id,
        subscription = %activated.id,
        period_end = %period_end,
        "subscription activated"
    );
    Ok(activated)
}

/// Applies the lapse of `current` at `now`. A lost compare-and-set returns
/// the row as the winner left it, with `false`.
async fn lapse_in(
    tx: &mut dyn BillingTx,
    current: &Subscription,
    now: DateTime<Utc>,
) -> BillingResult<(Subscription, bool)> {
    let Some(status) = current.lapse_at(now) else {
        return Ok((current.clone(), false));
    };
    let next = Subscription {
        status,
        auto_renew: false,
        updated_at: now,
        ..current.clone()
    };
    match tx
        .compare_and_set_subscription(&next, SubscriptionStatus::Active)
        .await?
    {
        Some(ended) => {
            info!(
                user_id = ended.user_id,
                subscription = %ended.id,
                status = ended.status.as_str(),
                "subscription period lapsed"
            );
            Ok((ended, true))
        }
        None => {
            let stored = tx
                .find_subscription(current.id)
                .await?
                .ok_or_else(|| BillingError::not_found("subscription", current.id))?;
            Ok((stored, false))
        }
    }
}

/// PENDING -> CANCELLED, withdrawing an unpaid intent. Fails while an intent
/// is awaiting admin review.
async fn withdraw_pending_in(
    tx: &mut dyn BillingTx,
    current: &Subscription,
    actor_id: Option<i32>,
    now: DateTime<Utc>,
) -> BillingResult<Subscription> {
    let intents = tx.intents_for_subscription(current.id).await?;
    if let Some(submitted) = intents
        .iter()
        .find(|intent| intent.status == PaymentIntentStatus::Submitted)
    {
        return Err(BillingError::invalid_state(format!(
            "payment intent {} is awaiting review",
            submitted.id
        )));
    }
    for intent in intents
        .iter()
        .filter(|intent| intent.status == PaymentIntentStatus::AwaitingReference)
    {
        withdraw_intent_in(tx, intent, actor_id, "subscription withdrawn", now).await?;
    }
    let next = Subscription {
        status: SubscriptionStatus::Cancelled,
        cancelled_at: Some(now),
        auto_renew: false,
        updated_at: now,
        ..current.clone()
    };
    let cancelled = compare_and_set(tx, &next, SubscriptionStatus::Pending).await?;
    debug!(
        subscription = %cancelled.id,
        actor = ?actor_id,
        "pending subscription withdrawn"
    );
    Ok(cancelled)
}
