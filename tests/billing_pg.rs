use std::sync::Arc;

use backend::billing::{
    run_subscription_sweep_tick, BillingConfig, BillingCycle, BillingError, BillingServices,
    BillingStore, FraudSeverity, PaymentIntentStatus, PaymentLogFilter, PgBillingStore, Plan,
    PlanLimit, SubscriptionStatus,
};
use backend::identity::Caller;
use backend::listings::{ListingsDirectory, PgListingsDirectory};
use backend::notifications;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

// key: billing-pg-tests -> constraints,transactions,sweep against postgres

async fn seed_plan(store: &PgBillingStore, code: &str) -> Plan {
    let plan = Plan {
        id: Uuid::new_v4(),
        code: code.to_string(),
        name: code.to_uppercase(),
        price_cents: 4_900,
        billing_cycle: BillingCycle::Monthly,
        max_active_listings: PlanLimit::AtMost(15),
        max_featured_listings: PlanLimit::Unlimited,
        is_active: true,
        created_at: Utc::now(),
    };
    let mut tx = store.begin().await.unwrap();
    tx.insert_plan(&plan).await.unwrap();
    tx.commit().await.unwrap();
    plan
}

fn services(pool: &PgPool) -> BillingServices {
    let store: Arc<dyn BillingStore> = Arc::new(PgBillingStore::new(pool.clone()));
    let listings: Arc<dyn ListingsDirectory> = Arc::new(PgListingsDirectory::new(pool.clone()));
    let (notifier, _events) = notifications::channel(16);
    BillingServices::new(store, listings, Arc::new(notifier), BillingConfig::default())
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn payment_review_commits_with_audit_trail(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let plan = seed_plan(&PgBillingStore::new(pool.clone()), "pg-basic").await;
    let services = services(&pool);
    let seller = Caller::seller(501);
    let admin = Caller::admin(1);
    let now = Utc::now();

    let subscription = services
        .ledger
        .start_subscription(&seller, plan.id, BillingCycle::Monthly, true, now)
        .await
        .unwrap();
    let intent = services
        .payments
        .create_intent(&seller, subscription.id, now)
        .await
        .unwrap();
    services
        .payments
        .submit_reference(&seller, intent.id, "PG-REF-1", now)
        .await
        .unwrap();
    let verified = services.payments.verify(&admin, intent.id, now).await.unwrap();
    assert_eq!(verified.subscription.status, SubscriptionStatus::Active);

    let again = services.payments.verify(&admin, intent.id, now).await;
    assert!(matches!(again, Err(BillingError::InvalidState(_))));

    let logs = services
        .payments
        .payment_logs(
            &admin,
            &PaymentLogFilter {
                payment_intent_id: Some(intent.id),
                ..PaymentLogFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[0].to_status, PaymentIntentStatus::Verified);

    let tampered = sqlx::query("DELETE FROM payment_logs WHERE payment_intent_id = $1")
        .bind(intent.id)
        .execute(&pool)
        .await;
    assert!(tampered.is_err());
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn open_subscription_index_raises_conflict(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let plan = seed_plan(&PgBillingStore::new(pool.clone()), "pg-conflict").await;
    let services = services(&pool);
    let seller = Caller::seller(502);

    services
        .ledger
        .start_subscription(&seller, plan.id, BillingCycle::Monthly, false, Utc::now())
        .await
        .unwrap();
    let second = services
        .ledger
        .start_subscription(&seller, plan.id, BillingCycle::Monthly, false, Utc::now())
        .await;
    assert!(matches!(second, Err(BillingError::Conflict(_))));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn plan_terms_are_immutable(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let plan = seed_plan(&PgBillingStore::new(pool.clone()), "pg-frozen").await;

    let repriced = sqlx::query("UPDATE plans SET price_cents = 1 WHERE id = $1")
        .bind(plan.id)
        .execute(&pool)
        .await;
    assert!(repriced.is_err());

    sqlx::query("UPDATE plans SET is_active = FALSE WHERE id = $1")
        .bind(plan.id)
        .execute(&pool)
        .await
        .unwrap();
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn sweep_expires_lapsed_subscriptions(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let plan = seed_plan(&PgBillingStore::new(pool.clone()), "pg-sweep").await;
    let services = services(&pool);
    let seller = Caller::seller(503);
    let started = Utc::now() - Duration::days(40);

    let subscription = services
        .ledger
        .start_subscription(&seller, plan.id, BillingCycle::Monthly, true, started)
        .await
        .unwrap();
    services
        .ledger
        .activate(
            subscription.id,
            started,
            BillingCycle::Monthly.period_end(started).unwrap(),
        )
        .await
        .unwrap();

    let report = run_subscription_sweep_tick(&services.ledger, Utc::now(), None)
        .await
        .unwrap();
    assert_eq!(report.expired, 1);

    let status: String = sqlx::query_scalar("SELECT status FROM subscriptions WHERE id = $1")
        .bind(subscription.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "EXPIRED");
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn open_indicator_dedupe_uses_partial_index(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let services = services(&pool);
    let admin = Caller::admin(1);
    let draft = || backend::billing::NewFraudIndicator {
        user_id: Some(504),
        car_id: None,
        indicator_type: "price_anomaly".into(),
        severity: FraudSeverity::Low,
        description: "listed far below market".into(),
        dedupe_key: Some("price_anomaly:504".into()),
    };

    let first = services
        .fraud
        .record_indicator(&admin, draft(), Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert!(services
        .fraud
        .record_indicator(&admin, draft(), Utc::now())
        .await
        .unwrap()
        .is_none());
    services
        .fraud
        .resolve(&admin, first.id, "checked with seller", Utc::now())
        .await
        .unwrap();
    assert!(services
        .fraud
        .record_indicator(&admin, draft(), Utc::now())
        .await
        .unwrap()
        .is_some());
}
