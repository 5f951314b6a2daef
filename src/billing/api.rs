use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::identity::Caller;

use super::quota::{QuotaDecision, QuotaDenialReason, QuotaSnapshot};
use super::{
    BillingCycle, BillingServices, EffectivePlan, FraudIndicator, FraudSeverity,
    NewFraudIndicator, PaymentIntent, PaymentLog, PaymentLogFilter, Plan, Subscription,
    SubscriptionView, VerifiedPayment,
};

/// key: billing-api -> seller and admin endpoints
pub fn routes() -> Router {
    Router::new()
        .route("/api/plans", get(list_plans))
        .route("/api/plans/:id", get(get_plan))
        .route("/api/subscriptions", post(start_subscription))
        .route("/api/subscriptions/me", get(my_subscription))
        .route("/api/subscriptions/:id/cancel", post(cancel_subscription))
        .route(
            "/api/subscriptions/:id/payment-intents",
            get(list_payment_intents).post(create_payment_intent),
        )
        .route(
            "/api/payment-intents/:id/reference",
            post(submit_payment_reference),
        )
        .route("/api/quota/listings", get(listing_quota))
        .route("/api/quota/featured", get(featured_quota))
        .route("/api/admin/payment-intents", get(pending_reviews))
        .route(
            "/api/admin/payment-intents/:id/verify",
            post(verify_payment),
        )
        .route(
            "/api/admin/payment-intents/:id/reject",
            post(reject_payment),
        )
        .route("/api/admin/payment-logs", get(payment_logs))
        .route(
            "/api/admin/subscriptions/:id/suspend",
            post(suspend_subscription),
        )
        .route(
            "/api/admin/fraud-indicators",
            get(list_fraud_indicators).post(record_fraud_indicator),
        )
        .route(
            "/api/admin/fraud-indicators/:id/resolve",
            post(resolve_fraud_indicator),
        )
}

pub async fn list_plans(
    Extension(services): Extension<BillingServices>,
) -> AppResult<Json<Vec<Plan>>> {
    Ok(Json(services.catalog.list_active_plans().await?))
}

pub async fn get_plan(
    Extension(services): Extension<BillingServices>,
    Path(plan_id): Path<Uuid>,
) -> AppResult<Json<Plan>> {
    Ok(Json(services.catalog.get_plan(plan_id).await?))
}

pub async fn my_subscription(
    Extension(services): Extension<BillingServices>,
    caller: Caller,
) -> AppResult<Json<MySubscriptionResponse>> {
    let now = Utc::now();
    let current = services
        .ledger
        .current_subscription(caller.user_id, now)
        .await?;
    let effective = services.ledger.effective_plan(caller.user_id, now).await?;
    Ok(Json(MySubscriptionResponse {
        current,
        effective,
    }))
}

pub async fn start_subscription(
    Extension(services): Extension<BillingServices>,
    caller: Caller,
    Json(payload): Json<StartSubscriptionRequest>,
) -> AppResult<(StatusCode, Json<StartedSubscription>)> {
    let now = Utc::now();
    let billing_cycle = match payload.billing_cycle {
        Some(cycle) => cycle,
        None => services.catalog.get_plan(payload.plan_id).await?.billing_cycle,
    };
    let subscription = services
        .ledger
        .start_subscription(
            &caller,
            payload.plan_id,
            billing_cycle,
            payload.auto_renew.unwrap_or(false),
            now,
        )
        .await?;
    let payment_intent = services
        .payments
        .create_intent(&caller, subscription.id, now)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(StartedSubscription {
            subscription,
            payment_intent,
        }),
    ))
}

pub async fn cancel_subscription(
    Extension(services): Extension<BillingServices>,
    caller: Caller,
    Path(subscription_id): Path<Uuid>,
) -> AppResult<Json<Subscription>> {
    let subscription = services
        .ledger
        .request_cancellation(&caller, subscription_id, Utc::now())
        .await?;
    Ok(Json(subscription))
}

pub async fn list_payment_intents(
    Extension(services): Extension<BillingServices>,
    caller: Caller,
    Path(subscription_id): Path<Uuid>,
) -> AppResult<Json<Vec<PaymentIntent>>> {
    let intents = services
        .payments
        .intents_for_subscription(&caller, subscription_id)
        .await?;
    Ok(Json(intents))
}

pub async fn create_payment_intent(
    Extension(services): Extension<BillingServices>,
    caller: Caller,
    Path(subscription_id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<PaymentIntent>)> {
    let intent = services
        .payments
        .create_intent(&caller, subscription_id, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(intent)))
}

pub async fn submit_payment_reference(
    Extension(services): Extension<BillingServices>,
    caller: Caller,
    Path(intent_id): Path<Uuid>,
    Json(payload): Json<SubmitReferenceRequest>,
) -> AppResult<Json<PaymentIntent>> {
    let intent = services
        .payments
        .submit_reference(&caller, intent_id, &payload.reference_number, Utc::now())
        .await?;
    Ok(Json(intent))
}

pub async fn listing_quota(
    Extension(services): Extension<BillingServices>,
    caller: Caller,
) -> AppResult<Json<QuotaCheckResponse>> {
    let decision = services
        .quota
        .can_create_listing(caller.user_id, Utc::now())
        .await?;
    Ok(Json(decision.into()))
}

pub async fn featured_quota(
    Extension(services): Extension<BillingServices>,
    caller: Caller,
) -> AppResult<Json<QuotaCheckResponse>> {
    let decision = services
        .quota
        .can_feature_listing(caller.user_id, Utc::now())
        .await?;
    Ok(Json(decision.into()))
}

pub async fn pending_reviews(
    Extension(services): Extension<BillingServices>,
    caller: Caller,
) -> AppResult<Json<Vec<PaymentIntent>>> {
    Ok(Json(services.payments.pending_reviews(&caller).await?))
}

pub async fn verify_payment(
    Extension(services): Extension<BillingServices>,
    caller: Caller,
    Path(intent_id): Path<Uuid>,
) -> AppResult<Json<VerifiedPayment>> {
    let verified = services
        .payments
        .verify(&caller, intent_id, Utc::now())
        .await?;
    Ok(Json(verified))
}

pub async fn reject_payment(
    Extension(services): Extension<BillingServices>,
    caller: Caller,
    Path(intent_id): Path<Uuid>,
    Json(payload): Json<ReasonRequest>,
) -> AppResult<Json<PaymentIntent>> {
    let intent = services
        .payments
        .reject(&caller, intent_id, &payload.reason, Utc::now())
        .await?;
    Ok(Json(intent))
}

pub async fn payment_logs(
    Extension(services): Extension<BillingServices>,
    caller: Caller,
    Query(filter): Query<PaymentLogFilter>,
) -> AppResult<Json<Vec<PaymentLog>>> {
    Ok(Json(services.payments.payment_logs(&caller, &filter).await?))
}

pub async fn suspend_subscription(
    Extension(services): Extension<BillingServices>,
    caller: Caller,
    Path(subscription_id): Path<Uuid>,
    Json(payload): Json<ReasonRequest>,
) -> AppResult<Json<Subscription>> {
    let subscription = services
        .ledger
        .suspend(&caller, subscription_id, &payload.reason, Utc::now())
        .await?;
    Ok(Json(subscription))
}

pub async fn list_fraud_indicators(
    Extension(services): Extension<BillingServices>,
    caller: Caller,
    Query(query): Query<FraudIndicatorQuery>,
) -> AppResult<Json<Vec<FraudIndicator>>> {
    let indicators = services
        .fraud
        .list_unresolved(&caller, query.severity)
        .await?;
    Ok(Json(indicators))
}

pub async fn record_fraud_indicator(
    Extension(services): Extension<BillingServices>,
    caller: Caller,
    Json(payload): Json<NewFraudIndicator>,
) -> AppResult<(StatusCode, Json<Option<FraudIndicator>>)> {
    let recorded = services
        .fraud
        .record_indicator(&caller, payload, Utc::now())
        .await?;
    let status = if recorded.is_some() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(recorded)))
}

pub async fn resolve_fraud_indicator(
    Extension(services): Extension<BillingServices>,
    caller: Caller,
    Path(indicator_id): Path<Uuid>,
    Json(payload): Json<ResolveIndicatorRequest>,
) -> AppResult<Json<FraudIndicator>> {
    let indicator = services
        .fraud
        .resolve(&caller, indicator_id, &payload.notes, Utc::now())
        .await?;
    Ok(Json(indicator))
}

#[derive(Debug, Serialize)]
pub struct MySubscriptionResponse {
    pub current: Option<SubscriptionView>,
    pub effective: EffectivePlan,
}

#[derive(Debug, Deserialize)]
pub struct StartSubscriptionRequest {
    pub plan_id: Uuid,
    #[serde(default)]
    pub billing_cycle: Option<BillingCycle>,
    #[serde(default)]
    pub auto_renew: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct StartedSubscription {
    pub subscription: Subscription,
    pub payment_intent: PaymentIntent,
}

#[derive(Debug, Deserialize)]
pub struct SubmitReferenceRequest {
    pub reference_number: String,
}

#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveIndicatorRequest {
    pub notes: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct FraudIndicatorQuery {
    #[serde(default)]
    pub severity: Option<FraudSeverity>,
}

#[derive(Debug, Serialize)]
pub struct QuotaCheckResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<QuotaDenialReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(flatten)]
    pub snapshot: QuotaSnapshot,
}

impl From<QuotaDecision> for QuotaCheckResponse {
    fn from(decision: QuotaDecision) -> Self {
        match decision {
            QuotaDecision::Allowed(snapshot) => QuotaCheckResponse {
                allowed: true,
                reason: None,
                message: None,
                snapshot,
            },
            QuotaDecision::Denied { reason, snapshot } => QuotaCheckResponse {
                allowed: false,
                reason: Some(reason),
                message: Some(reason.message()),
                snapshot,
            },
        }
    }
}
