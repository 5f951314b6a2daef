//! Manual QR payments.
//!
//! AWAITING_REFERENCE -> SUBMITTED -> {VERIFIED, REJECTED}. Each transition
//! writes its payment log entry in the same unit of work, and verification
//! activates the subscription there too.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::identity::Caller;
use crate::notifications::{NotificationEvent, Notifier};

use super::catalog::PlanCatalog;
use super::error::{BillingError, BillingResult};
use super::fraud::{self, DUPLICATE_PAYMENT_REFERENCE, REPEATED_PAYMENT_REJECTION};
use super::ledger::activate_in;
use super::models::{
    FraudSeverity, NewFraudIndicator, PaymentIntent, PaymentIntentStatus, PaymentLog,
    PaymentLogFilter, Subscription, SubscriptionStatus,
};
use super::store::{BillingStore, BillingTx};

static REFERENCE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._/-]{0,63}$").expect("reference pattern compiles")
});

/// Trimmed reference number, or `Validation` when it is not a plausible
/// bank or wallet transfer reference.
pub fn normalize_reference(raw: &str) -> BillingResult<String> {
    let reference = raw.trim();
    if reference.is_empty() {
        return Err(BillingError::validation("reference number is required"));
    }
    if !REFERENCE_PATTERN.is_match(reference) {
        return Err(BillingError::validation(
            "reference number must be 1-64 letters, digits, '.', '_', '/' or '-'",
        ));
    }
    Ok(reference.to_string())
}

/// Verified intent together with the subscription it activated.
#[derive(Clone, Debug, Serialize)]
pub struct VerifiedPayment {
    pub intent: PaymentIntent,
    pub subscription: Subscription,
}

/// key: payment-verifier -> manual payment review workflow
#[derive(Clone)]
pub struct PaymentVerifier {
    store: Arc<dyn BillingStore>,
    catalog: PlanCatalog,
    notifier: Arc<dyn Notifier>,
    rejection_streak: usize,
}

impl PaymentVerifier {
    pub fn new(
        store: Arc<dyn BillingStore>,
        catalog: PlanCatalog,
        notifier: Arc<dyn Notifier>,
        rejection_streak: usize,
    ) -> Self {
        Self {
            store,
            catalog,
            notifier,
            rejection_streak: rejection_streak.max(1),
        }
    }

    pub async fn create_intent(
        &self,
        caller: &Caller,
        subscription_id: Uuid,
        now: DateTime<Utc>,
    ) -> BillingResult<PaymentIntent> {
        let mut tx = self.store.begin().await?;
        let subscription = tx
            .lock_subscription(subscription_id)
            .await?
            .ok_or_else(|| BillingError::not_found("subscription", subscription_id))?;
        caller.require_owner(subscription.user_id)?;
        if subscription.status != SubscriptionStatus::Pending {
            return Err(BillingError::invalid_state(format!(
                "subscription {subscription_id} is {}, payment is only taken while PENDING",
                subscription.status.as_str()
            )));
        }
        let plan = self.catalog.plan_in(&mut *tx, subscription.plan_id).await?;

        let intent = PaymentIntent {
            id: Uuid::new_v4(),
            subscription_id,
            user_id: subscription.user_id,
            amount_cents: plan.price_cents,
            reference_number: None,
            status: PaymentIntentStatus::AwaitingReference,
            created_at: now,
            submitted_at: None,
            reviewed_by: None,
            reviewed_at: None,
            rejection_reason: None,
        };
        tx.insert_intent(&intent).await?;
        tx.append_payment_log(&PaymentLog::transition(
            &intent,
            Some(caller.user_id),
            None,
            None,
            now,
        ))
        .await?;
        tx.commit().await?;

        info!(
            user_id = intent.user_id,
            intent = %intent.id,
            subscription = %subscription_id,
            amount_cents = intent.amount_cents,
            "payment intent created"
        );
        Ok(intent)
    }

    pub async fn submit_reference(
        &self,
        caller: &Caller,
        intent_id: Uuid,
        reference: &str,
        now: DateTime<Utc>,
    ) -> BillingResult<PaymentIntent> {
        let reference = normalize_reference(reference)?;
        let mut tx = self.store.begin().await?;
        let current = lock_intent(&mut *tx, intent_id).await?;
        caller.require_owner(current.user_id)?;
        expect_status(&current, PaymentIntentStatus::AwaitingReference)?;

        let reused_by: Vec<Uuid> = tx
            .intents_with_reference(&reference)
            .await?
            .into_iter()
            .filter(|other| {
                other.id != current.id && other.status != PaymentIntentStatus::Rejected
            })
            .map(|other| other.id)
            .collect();

        let next = PaymentIntent {
            status: PaymentIntentStatus::Submitted,
            reference_number: Some(reference.clone()),
            submitted_at: Some(now),
            ..current.clone()
        };
        let submitted =
            transition_in(&mut *tx, &next, current.status, Some(caller.user_id), None, now)
                .await?;

        if !reused_by.is_empty() {
            let others = reused_by
                .iter()
                .map(Uuid::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            fraud::record_in(
                &mut *tx,
                NewFraudIndicator {
                    user_id: Some(submitted.user_id),
                    car_id: None,
                    indicator_type: DUPLICATE_PAYMENT_REFERENCE.to_string(),
                    severity: FraudSeverity::High,
                    description: format!(
                        "reference {reference} on payment intent {} is already used by {others}",
                        submitted.id
                    ),
                    dedupe_key: Some(format!("{DUPLICATE_PAYMENT_REFERENCE}:{}", submitted.id)),
                },
                now,
            )
            .await?;
        }
        tx.commit().await?;

        info!(
            user_id = submitted.user_id,
            intent = %submitted.id,
            "payment reference submitted"
        );
        Ok(submitted)
    }

    pub async fn verify(
        &self,
        caller: &Caller,
        intent_id: Uuid,
        now: DateTime<Utc>,
    ) -> BillingResult<VerifiedPayment> {
        caller.require_admin()?;
        let mut tx = self.store.begin().await?;
        let current = lock_intent(&mut *tx, intent_id).await?;
        expect_status(&current, PaymentIntentStatus::Submitted)?;

        let subscription = tx
            .find_subscription(current.subscription_id)
            .await?
            .ok_or_else(|| BillingError::not_found("subscription", current.subscription_id))?;
        let period_end = subscription
            .billing_cycle
            .period_end(now)
            .ok_or_else(|| BillingError::validation("subscription period end is out of range"))?;

        let next = PaymentIntent {
            status: PaymentIntentStatus::Verified,
            reviewed_by: Some(caller.user_id),
            reviewed_at: Some(now),
            ..current.clone()
        };
        let intent =
            transition_in(&mut *tx, &next, current.status, Some(caller.user_id), None, now)
                .await?;
        let subscription = activate_in(&mut *tx, subscription.id, now, period_end).await?;
        tx.commit().await?;

        info!(
            user_id = intent.user_id,
            intent = %intent.id,
            subscription = %subscription.id,
            admin = caller.user_id,
            "payment verified"
        );
        self.notifier
            .notify(NotificationEvent::SubscriptionActivated {
                user_id: subscription.user_id,
                subscription_id: subscription.id,
                plan_id: subscription.plan_id,
                period_end,
            });
        Ok(VerifiedPayment {
            intent,
            subscription,
        })
    }

    pub async fn reject(
        &self,
        caller: &Caller,
        intent_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> BillingResult<PaymentIntent> {
        caller.require_admin()?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(BillingError::validation("rejection reason is required"));
        }

        let mut tx = self.store.begin().await?;
        let current = lock_intent(&mut *tx, intent_id).await?;
        expect_status(&current, PaymentIntentStatus::Submitted)?;

        let next = PaymentIntent {
            status: PaymentIntentStatus::Rejected,
            reviewed_by: Some(caller.user_id),
            reviewed_at: Some(now),
            rejection_reason: Some(reason.to_string()),
            ..current.clone()
        };
        let intent = transition_in(
            &mut *tx,
            &next,
            current.status,
            Some(caller.user_id),
            Some(reason.to_string()),
            now,
        )
        .await?;

        let streak = self.rejection_streak_in(&mut *tx, intent.user_id).await?;
        if streak >= self.rejection_streak {
            fraud::record_in(
                &mut *tx,
                NewFraudIndicator {
                    user_id: Some(intent.user_id),
                    car_id: None,
                    indicator_type: REPEATED_PAYMENT_REJECTION.to_string(),
                    severity: FraudSeverity::Medium,
                    description: format!(
                        "{streak} consecutive payment rejections, latest on intent {}",
                        intent.id
                    ),
                    dedupe_key: Some(format!("{REPEATED_PAYMENT_REJECTION}:{}", intent.user_id)),
                },
                now,
            )
            .await?;
        }
        tx.commit().await?;

        warn!(
            user_id = intent.user_id,
            intent = %intent.id,
            admin = caller.user_id,
            streak,
            "payment rejected"
        );
        self.notifier.notify(NotificationEvent::PaymentRejected {
            user_id: intent.user_id,
            payment_intent_id: intent.id,
            reason: reason.to_string(),
        });
        Ok(intent)
    }

    /// SUBMITTED intents, oldest submission first.
    pub async fn pending_reviews(&self, caller: &Caller) -> BillingResult<Vec<PaymentIntent>> {
        caller.require_admin()?;
        let mut tx = self.store.begin().await?;
        tx.intents_with_status(PaymentIntentStatus::Submitted).await
    }

    pub async fn intents_for_subscription(
        &self,
        caller: &Caller,
        subscription_id: Uuid,
    ) -> BillingResult<Vec<PaymentIntent>> {
        let mut tx = self.store.begin().await?;
        let subscription = tx
            .find_subscription(subscription_id)
            .await?
            .ok_or_else(|| BillingError::not_found("subscription", subscription_id))?;
        caller.require_owner_or_admin(subscription.user_id)?;
        tx.intents_for_subscription(subscription_id).await
    }

    pub async fn payment_logs(
        &self,
        caller: &Caller,
        filter: &PaymentLogFilter,
    ) -> BillingResult<Vec<PaymentLog>> {
        caller.require_admin()?;
        let mut tx = self.store.begin().await?;
        tx.payment_logs(filter).await
    }

    /// Consecutive admin rejections of `user_id`, newest first, capped at
    /// the configured streak.
    async fn rejection_streak_in(
        &self,
        tx: &mut dyn BillingTx,
        user_id: i32,
    ) -> BillingResult<usize> {
        let limit = i64::try_from(self.rejection_streak).unwrap_or(i64::MAX);
        let reviews = tx.recent_reviews_for_user(user_id, limit).await?;
        Ok(reviews
            .iter()
            .take_while(|intent| intent.status == PaymentIntentStatus::Rejected)
            .count())
    }
}

async fn lock_intent(tx: &mut dyn BillingTx, id: Uuid) -> BillingResult<PaymentIntent> {
    tx.lock_intent(id)
        .await?
        .ok_or_else(|| BillingError::not_found("payment intent", id))
}

fn expect_status(intent: &PaymentIntent, expected: PaymentIntentStatus) -> BillingResult<()> {
    if intent.status == expected {
        Ok(())
    } else {
        Err(BillingError::invalid_state(format!(
            "payment intent {} is {}, expected {}",
            intent.id,
            intent.status.as_str(),
            expected.as_str()
        )))
    }
}

/// Compare-and-set on the intent status plus its audit entry.
async fn transition_in(
    tx: &mut dyn BillingTx,
    next: &PaymentIntent,
    expected: PaymentIntentStatus,
    actor_id: Option<i32>,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> BillingResult<PaymentIntent> {
    let stored = tx
        .compare_and_set_intent(next, expected)
        .await?
        .ok_or_else(|| {
            BillingError::invalid_state(format!(
                "payment intent {} is no longer {}",
                next.id,
                expected.as_str()
            ))
        })?;
    tx.append_payment_log(&PaymentLog::transition(
        &stored,
        actor_id,
        Some(expected),
        notes,
        now,
    ))
    .await?;
    Ok(stored)
}

/// System rejection of an unpaid intent when its subscription goes away.
pub(crate) async fn withdraw_intent_in(
    tx: &mut dyn BillingTx,
    intent: &PaymentIntent,
    actor_id: Option<i32>,
    notes: &str,
    now: DateTime<Utc>,
) -> BillingResult<PaymentIntent> {
    let next = PaymentIntent {
        status: PaymentIntentStatus::Rejected,
        rejection_reason: Some(notes.to_string()),
        ..intent.clone()
    };
    transition_in(
        tx,
        &next,
        PaymentIntentStatus::AwaitingReference,
        actor_id,
        Some(notes.to_string()),
        now,
    )
    .await
}
