use std::sync::Arc;

use backend::billing::{
    BillingConfig, BillingCycle, BillingError, BillingServices, BillingStore, FraudSeverity,
    InMemoryBillingStore, PaymentIntent, PaymentIntentStatus, PaymentLogFilter, Plan, PlanLimit,
    QuotaDecision, QuotaDenialReason, SubscriptionStatus,
};
use backend::identity::Caller;
use backend::listings::StaticListings;
use backend::notifications::{self, NotificationEvent};
use chrono::{DateTime, Duration, Months, TimeZone, Utc};
use tokio::sync::mpsc::Receiver;
use uuid::Uuid;

// key: billing-flow-tests -> quota,payment review,expiry scenarios

struct Harness {
    services: BillingServices,
    store: Arc<dyn BillingStore>,
    listings: Arc<StaticListings>,
    events: Receiver<NotificationEvent>,
    basic: Plan,
    unlimited: Plan,
}

fn plan(code: &str, price_cents: i64, listings: PlanLimit, featured: PlanLimit) -> Plan {
    Plan {
        id: Uuid::new_v4(),
        code: code.to_string(),
        name: format!("{code} plan"),
        price_cents,
        billing_cycle: BillingCycle::Monthly,
        max_active_listings: listings,
        max_featured_listings: featured,
        is_active: true,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
}

fn harness() -> Harness {
    let basic = plan("basic", 1_900, PlanLimit::AtMost(10), PlanLimit::AtMost(2));
    let unlimited = plan("dealer", 9_900, PlanLimit::Unlimited, PlanLimit::Unlimited);
    let store: Arc<dyn BillingStore> = Arc::new(InMemoryBillingStore::with_plans([
        basic.clone(),
        unlimited.clone(),
    ]));
    let listings = Arc::new(StaticListings::new());
    let (notifier, events) = notifications::channel(64);
    let services = BillingServices::new(
        store.clone(),
        listings.clone(),
        Arc::new(notifier),
        BillingConfig::default(),
    );
    Harness {
        services,
        store,
        listings,
        events,
        basic,
        unlimited,
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap()
}

async fn submitted(h: &Harness, seller: &Caller, plan: &Plan, reference: &str) -> PaymentIntent {
    let subscription = h
        .services
        .ledger
        .start_subscription(seller, plan.id, plan.billing_cycle, false, now())
        .await
        .unwrap();
    let intent = h
        .services
        .payments
        .create_intent(seller, subscription.id, now())
        .await
        .unwrap();
    h.services
        .payments
        .submit_reference(seller, intent.id, reference, now())
        .await
        .unwrap()
}

#[tokio::test]
async fn free_seller_at_three_listings_is_denied() {
    let h = harness();
    h.listings.set_counts(11, 3, 0);

    let decision = h
        .services
        .quota
        .can_create_listing(11, now())
        .await
        .unwrap();
    match decision {
        QuotaDecision::Denied { reason, snapshot } => {
            assert_eq!(reason, QuotaDenialReason::LimitListings);
            assert_eq!(snapshot.plan_id, Uuid::nil());
            assert_eq!(snapshot.used, 3);
        }
        other => panic!("expected denial, got {other:?}"),
    }

    h.listings.set_counts(11, 2, 0);
    assert!(h
        .services
        .quota
        .can_create_listing(11, now())
        .await
        .unwrap()
        .is_allowed());
    assert_eq!(
        h.services
            .quota
            .can_feature_listing(11, now())
            .await
            .unwrap()
            .reason(),
        Some(QuotaDenialReason::LimitFeatured)
    );
}

#[tokio::test]
async fn verified_payment_raises_limits_immediately() {
    let mut h = harness();
    let seller = Caller::seller(21);
    let admin = Caller::admin(1);
    h.listings.set_counts(21, 5, 0);

    let intent = submitted(&h, &seller, &h.basic.clone(), "REF123").await;
    assert_eq!(intent.status, PaymentIntentStatus::Submitted);
    assert_eq!(intent.amount_cents, 1_900);
    assert!(!h
        .services
        .quota
        .can_create_listing(21, now())
        .await
        .unwrap()
        .is_allowed());

    let verified = h
        .services
        .payments
        .verify(&admin, intent.id, now())
        .await
        .unwrap();
    assert_eq!(verified.intent.status, PaymentIntentStatus::Verified);
    assert_eq!(verified.subscription.status, SubscriptionStatus::Active);
    assert_eq!(
        verified.subscription.current_period_end,
        now().checked_add_months(Months::new(1))
    );

    let decision = h
        .services
        .quota
        .can_create_listing(21, now())
        .await
        .unwrap();
    assert!(decision.is_allowed());
    assert_eq!(decision.snapshot().limit, PlanLimit::AtMost(10));
    assert_eq!(decision.snapshot().remaining, Some(5));

    assert!(matches!(
        h.events.try_recv(),
        Ok(NotificationEvent::SubscriptionActivated { user_id: 21, .. })
    ));
}

#[tokio::test]
async fn unlimited_plan_never_denies() {
    let h = harness();
    let seller = Caller::seller(22);
    let intent = submitted(&h, &seller, &h.unlimited.clone(), "DEALER-1").await;
    h.services
        .payments
        .verify(&Caller::admin(1), intent.id, now())
        .await
        .unwrap();
    h.listings.set_counts(22, 50_000, 10_000);

    assert!(h
        .services
        .quota
        .can_create_listing(22, now())
        .await
        .unwrap()
        .is_allowed());
    assert!(h
        .services
        .quota
        .can_feature_listing(22, now())
        .await
        .unwrap()
        .is_allowed());
}

#[tokio::test]
async fn three_rejections_raise_one_indicator() {
    let h = harness();
    let seller = Caller::seller(31);
    let admin = Caller::admin(1);

    let first = submitted(&h, &seller, &h.basic.clone(), "TRY-1").await;
    let subscription_id = first.subscription_id;
    h.services
        .payments
        .reject(&admin, first.id, "no transfer found", now())
        .await
        .unwrap();

    for (round, reference) in ["TRY-2", "TRY-3", "TRY-4"].iter().enumerate() {
        let at = now() + Duration::minutes(round as i64 + 1);
        let intent = h
            .services
            .payments
            .create_intent(&seller, subscription_id, at)
            .await
            .unwrap();
        h.services
            .payments
            .submit_reference(&seller, intent.id, reference, at)
            .await
            .unwrap();
        h.services
            .payments
            .reject(&admin, intent.id, "no transfer found", at)
            .await
            .unwrap();
    }

    let indicators = h
        .services
        .fraud
        .list_unresolved(&admin, Some(FraudSeverity::Medium))
        .await
        .unwrap();
    assert_eq!(indicators.len(), 1);
    assert_eq!(indicators[0].indicator_type, "repeated_payment_rejection");
    assert_eq!(indicators[0].user_id, Some(31));
}

#[tokio::test]
async fn rejections_below_the_streak_raise_nothing() {
    let h = harness();
    let seller = Caller::seller(32);
    let admin = Caller::admin(1);

    let first = submitted(&h, &seller, &h.basic.clone(), "A-1").await;
    h.services
        .payments
        .reject(&admin, first.id, "blurry", now())
        .await
        .unwrap();
    let second = h
        .services
        .payments
        .create_intent(&seller, first.subscription_id, now() + Duration::minutes(1))
        .await
        .unwrap();
    h.services
        .payments
        .submit_reference(&seller, second.id, "A-2", now() + Duration::minutes(1))
        .await
        .unwrap();
    h.services
        .payments
        .reject(&admin, second.id, "blurry", now() + Duration::minutes(1))
        .await
        .unwrap();
    let third = h
        .services
        .payments
        .create_intent(&seller, first.subscription_id, now() + Duration::minutes(2))
        .await
        .unwrap();
    h.services
        .payments
        .submit_reference(&seller, third.id, "A-3", now() + Duration::minutes(2))
        .await
        .unwrap();
    h.services
        .payments
        .verify(&admin, third.id, now() + Duration::minutes(2))
        .await
        .unwrap();

    assert!(h
        .services
        .fraud
        .list_unresolved(&admin, None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn lapsed_subscription_expires_and_falls_back_to_free() {
    let h = harness();
    let seller = Caller::seller(41);
    let admin = Caller::admin(1);
    let intent = submitted(&h, &seller, &h.basic.clone(), "REF-EXP").await;
    let verified = h
        .services
        .payments
        .verify(&admin, intent.id, now())
        .await
        .unwrap();
    let period_end = verified.subscription.current_period_end.unwrap();
    h.listings.set_counts(41, 4, 0);

    let after = period_end + Duration::seconds(1);
    let reconciled = h
        .services
        .ledger
        .reconcile_expiry(verified.subscription.id, after)
        .await
        .unwrap();
    assert_eq!(reconciled.status, SubscriptionStatus::Expired);

    let decision = h
        .services
        .quota
        .can_create_listing(41, after)
        .await
        .unwrap();
    assert_eq!(decision.reason(), Some(QuotaDenialReason::LimitListings));
    assert_eq!(decision.snapshot().plan_id, Uuid::nil());

    let repeat = h
        .services
        .ledger
        .reconcile_expiry(verified.subscription.id, after + Duration::days(1))
        .await
        .unwrap();
    assert_eq!(repeat, reconciled);
}

#[tokio::test]
async fn quota_check_reconciles_stale_active_subscription() {
    let h = harness();
    let seller = Caller::seller(42);
    let intent = submitted(&h, &seller, &h.basic.clone(), "REF-STALE").await;
    let verified = h
        .services
        .payments
        .verify(&Caller::admin(1), intent.id, now())
        .await
        .unwrap();
    let after = verified.subscription.current_period_end.unwrap() + Duration::hours(1);

    let effective = h.services.ledger.effective_plan(42, after).await.unwrap();
    assert!(effective.plan.is_free());

    let mut tx = h.store.begin().await.unwrap();
    let stored = tx
        .find_subscription(verified.subscription.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Expired);
}

#[tokio::test]
async fn concurrent_verifications_activate_once() {
    let h = harness();
    let seller = Caller::seller(51);
    let intent = submitted(&h, &seller, &h.basic.clone(), "RACE-1").await;

    let first_admin = Caller::admin(1);
    let second_admin = Caller::admin(2);
    let (first, second) = tokio::join!(
        h.services.payments.verify(&first_admin, intent.id, now()),
        h.services.payments.verify(&second_admin, intent.id, now()),
    );
    let outcomes = [first.is_ok(), second.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    let failure = if first.is_err() { first } else { second };
    assert!(matches!(failure, Err(BillingError::InvalidState(_))));

    let logs = h
        .services
        .payments
        .payment_logs(
            &Caller::admin(1),
            &PaymentLogFilter {
                payment_intent_id: Some(intent.id),
                ..PaymentLogFilter::default()
            },
        )
        .await
        .unwrap();
    let verified_entries = logs
        .iter()
        .filter(|entry| entry.to_status == PaymentIntentStatus::Verified)
        .count();
    assert_eq!(verified_entries, 1);
    assert_eq!(logs.len(), 3);
}

#[tokio::test]
async fn only_one_open_subscription_per_seller() {
    let h = harness();
    let seller = Caller::seller(61);
    h.services
        .ledger
        .start_subscription(&seller, h.basic.id, BillingCycle::Monthly, false, now())
        .await
        .unwrap();
    let second = h
        .services
        .ledger
        .start_subscription(&seller, h.unlimited.id, BillingCycle::Monthly, false, now())
        .await;
    assert!(matches!(second, Err(BillingError::Conflict(_))));
}
