use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::error::{BillingError, BillingResult};
use super::models::{
    BillingCycle, FraudIndicator, FraudSeverity, PaymentIntent, PaymentIntentStatus, PaymentLog,
    PaymentLogFilter, Plan, PlanLimit, Subscription, SubscriptionStatus,
};
use super::store::{BillingStore, BillingTx};

const PLAN_COLUMNS: &str = "id, code, name, price_cents, billing_cycle, max_active_listings, max_featured_listings, is_active, created_at";
const SUBSCRIPTION_COLUMNS: &str = "id, user_id, plan_id, status, billing_cycle, current_period_start, current_period_end, auto_renew, cancelled_at, created_at, updated_at";
const INTENT_COLUMNS: &str = "id, subscription_id, user_id, amount_cents, reference_number, status, created_at, submitted_at, reviewed_by, reviewed_at, rejection_reason";
const INDICATOR_COLUMNS: &str = "id, user_id, car_id, indicator_type, severity, description, resolved, resolution_notes, resolved_by, resolved_at, dedupe_key, created_at";

/// key: billing-store-postgres -> sqlx backed unit of work
#[derive(Clone)]
pub struct PgBillingStore {
    pool: PgPool,
}

impl PgBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BillingStore for PgBillingStore {
    async fn begin(&self) -> BillingResult<Box<dyn BillingTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgBillingTx { tx }))
    }
}

pub struct PgBillingTx {
    tx: Transaction<'static, Postgres>,
}

fn unique_violation(err: sqlx::Error, constraint: &str, message: impl FnOnce() -> String) -> BillingError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.constraint() == Some(constraint) {
            return BillingError::Conflict(message());
        }
    }
    BillingError::Database(err)
}

fn limit_clamp(limit: i64) -> i64 {
    limit.clamp(0, 1000)
}

#[async_trait]
impl BillingTx for PgBillingTx {
    async fn insert_plan(&mut self, plan: &Plan) -> BillingResult<()> {
        sqlx::query(
            "INSERT INTO plans (id, code, name, price_cents, billing_cycle, max_active_listings, max_featured_listings, is_active, created_at) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
        )
        .bind(plan.id)
        .bind(&plan.code)
        .bind(&plan.name)
        .bind(plan.price_cents)
        .bind(plan.billing_cycle.as_str())
        .bind(plan.max_active_listings.raw())
        .bind(plan.max_featured_listings.raw())
        .bind(plan.is_active)
        .bind(plan.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| {
            unique_violation(err, "plans_code_key", || {
                format!("plan {} already exists", plan.code)
            })
        })?;
        Ok(())
    }

    async fn find_plan(&mut self, id: Uuid) -> BillingResult<Option<Plan>> {
        let row = sqlx::query_as::<_, PlanRow>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Plan::try_from).transpose()
    }

    async fn active_plans(&mut self) -> BillingResult<Vec<Plan>> {
        let rows = sqlx::query_as::<_, PlanRow>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE is_active = TRUE ORDER BY price_cents ASC, name ASC"
        ))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(Plan::try_from).collect()
    }

    async fn insert_subscription(&mut self, subscription: &Subscription) -> BillingResult<()> {
        sqlx::query(
            "INSERT INTO subscriptions (id, user_id, plan_id, status, billing_cycle, current_period_start, current_period_end, auto_renew, cancelled_at, created_at, updated_at) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)",
        )
        .bind(subscription.id)
        .bind(subscription.user_id)
        .bind(subscription.plan_id)
        .bind(subscription.status.as_str())
        .bind(subscription.billing_cycle.as_str())
        .bind(subscription.current_period_start)
        .bind(subscription.current_period_end)
        .bind(subscription.auto_renew)
        .bind(subscription.cancelled_at)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| {
            unique_violation(err, "subscriptions_one_open_per_user", || {
                format!(
                    "user {} already holds a pending or active subscription",
                    subscription.user_id
                )
            })
        })?;
        Ok(())
    }

    async fn find_subscription(&mut self, id: Uuid) -> BillingResult<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Subscription::try_from).transpose()
    }

    async fn lock_subscription(&mut self, id: Uuid) -> BillingResult<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Subscription::try_from).transpose()
    }

    async fn open_subscription_for_user(
        &mut self,
        user_id: i32,
    ) -> BillingResult<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = $1 AND status IN ('PENDING', 'ACTIVE')"
        ))
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Subscription::try_from).transpose()
    }

    async fn latest_subscription_for_user(
        &mut self,
        user_id: i32,
    ) -> BillingResult<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = $1 ORDER BY created_at DESC, updated_at DESC LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Subscription::try_from).transpose()
    }

    async fn compare_and_set_subscription(
        &mut self,
        next: &Subscription,
        expected: SubscriptionStatus,
    ) -> BillingResult<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            UPDATE subscriptions
            SET status = $2,
                current_period_start = $3,
                current_period_end = $4,
                auto_renew = $5,
                cancelled_at = $6,
                updated_at = $7
            WHERE id = $1 AND status = $8
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(next.id)
        .bind(next.status.as_str())
        .bind(next.current_period_start)
        .bind(next.current_period_end)
        .bind(next.auto_renew)
        .bind(next.cancelled_at)
        .bind(next.updated_at)
        .bind(expected.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|err| {
            unique_violation(err, "subscriptions_one_open_per_user", || {
                format!(
                    "user {} already holds a pending or active subscription",
                    next.user_id
                )
            })
        })?;
        row.map(Subscription::try_from).transpose()
    }

    async fn lapsed_subscriptions(
        &mut self,
        now: DateTime<Utc>,
    ) -> BillingResult<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE status = 'ACTIVE' AND (current_period_end IS NULL OR current_period_end <= $1) ORDER BY current_period_end ASC"
        ))
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn pending_subscriptions_created_before(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> BillingResult<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE status = 'PENDING' AND created_at < $1 ORDER BY created_at ASC"
        ))
        .bind(cutoff)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn insert_intent(&mut self, intent: &PaymentIntent) -> BillingResult<()> {
        sqlx::query(
            "INSERT INTO payment_intents (id, subscription_id, user_id, amount_cents, reference_number, status, created_at, submitted_at, reviewed_by, reviewed_at, rejection_reason) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)",
        )
        .bind(intent.id)
        .bind(intent.subscription_id)
        .bind(intent.user_id)
        .bind(intent.amount_cents)
        .bind(&intent.reference_number)
        .bind(intent.status.as_str())
        .bind(intent.created_at)
        .bind(intent.submitted_at)
        .bind(intent.reviewed_by)
        .bind(intent.reviewed_at)
        .bind(&intent.rejection_reason)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| {
            unique_violation(err, "payment_intents_one_live_per_subscription", || {
                format!(
                    "subscription {} already has a live payment intent",
                    intent.subscription_id
                )
            })
        })?;
        Ok(())
    }

    async fn find_intent(&mut self, id: Uuid) -> BillingResult<Option<PaymentIntent>> {
        let row = sqlx::query_as::<_, PaymentIntentRow>(&format!(
            "SELECT {INTENT_COLUMNS} FROM payment_intents WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(PaymentIntent::try_from).transpose()
    }

    async fn lock_intent(&mut self, id: Uuid) -> BillingResult<Option<PaymentIntent>> {
        let row = sqlx::query_as::<_, PaymentIntentRow>(&format!(
            "SELECT {INTENT_COLUMNS} FROM payment_intents WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(PaymentIntent::try_from).transpose()
    }

    async fn compare_and_set_intent(
        &mut self,
        next: &PaymentIntent,
        expected: PaymentIntentStatus,
    ) -> BillingResult<Option<PaymentIntent>> {
        let row = sqlx::query_as::<_, PaymentIntentRow>(&format!(
            r#"
            UPDATE payment_intents
            SET status = $2,
                reference_number = $3,
                submitted_at = $4,
                reviewed_by = $5,
                reviewed_at = $6,
                rejection_reason = $7
            WHERE id = $1 AND status = $8
            RETURNING {INTENT_COLUMNS}
            "#
        ))
        .bind(next.id)
        .bind(next.status.as_str())
        .bind(&next.reference_number)
        .bind(next.submitted_at)
        .bind(next.reviewed_by)
        .bind(next.reviewed_at)
        .bind(&next.rejection_reason)
        .bind(expected.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(PaymentIntent::try_from).transpose()
    }

    async fn intents_for_subscription(
        &mut self,
        subscription_id: Uuid,
    ) -> BillingResult<Vec<PaymentIntent>> {
        let rows = sqlx::query_as::<_, PaymentIntentRow>(&format!(
            "SELECT {INTENT_COLUMNS} FROM payment_intents WHERE subscription_id = $1 ORDER BY created_at ASC"
        ))
        .bind(subscription_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(PaymentIntent::try_from).collect()
    }

    async fn intents_with_status(
        &mut self,
        status: PaymentIntentStatus,
    ) -> BillingResult<Vec<PaymentIntent>> {
        let rows = sqlx::query_as::<_, PaymentIntentRow>(&format!(
            "SELECT {INTENT_COLUMNS} FROM payment_intents WHERE status = $1 ORDER BY submitted_at ASC NULLS FIRST, created_at ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(PaymentIntent::try_from).collect()
    }

    async fn intents_with_reference(
        &mut self,
        reference_number: &str,
    ) -> BillingResult<Vec<PaymentIntent>> {
        let rows = sqlx::query_as::<_, PaymentIntentRow>(&format!(
            "SELECT {INTENT_COLUMNS} FROM payment_intents WHERE reference_number = $1"
        ))
        .bind(reference_number)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(PaymentIntent::try_from).collect()
    }

    async fn recent_reviews_for_user(
        &mut self,
        user_id: i32,
        limit: i64,
    ) -> BillingResult<Vec<PaymentIntent>> {
        let rows = sqlx::query_as::<_, PaymentIntentRow>(&format!(
            r#"
            SELECT {INTENT_COLUMNS} FROM payment_intents
            WHERE user_id = $1
              AND reviewed_by IS NOT NULL
              AND status IN ('VERIFIED', 'REJECTED')
            ORDER BY reviewed_at DESC, created_at DESC, id DESC
            LIMIT $2
            "#
        ))
        .bind(user_id)
        .bind(limit_clamp(limit))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(PaymentIntent::try_from).collect()
    }

    async fn append_payment_log(&mut self, entry: &PaymentLog) -> BillingResult<()> {
        sqlx::query(
            "INSERT INTO payment_logs (id, payment_intent_id, actor_id, from_status, to_status, notes, created_at) VALUES ($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(entry.id)
        .bind(entry.payment_intent_id)
        .bind(entry.actor_id)
        .bind(entry.from_status.map(|status| status.as_str()))
        .bind(entry.to_status.as_str())
        .bind(&entry.notes)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn payment_logs(&mut self, filter: &PaymentLogFilter) -> BillingResult<Vec<PaymentLog>> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT id, payment_intent_id, actor_id, from_status, to_status, notes, created_at FROM payment_logs WHERE TRUE",
        );

        if let Some(intent_id) = filter.payment_intent_id {
            builder.push(" AND payment_intent_id = ");
            builder.push_bind(intent_id);
        }

        if let Some(actor_id) = filter.actor_id {
            builder.push(" AND actor_id = ");
            builder.push_bind(actor_id);
        }

        if let Some(since) = filter.since {
            builder.push(" AND created_at >= ");
            builder.push_bind(since);
        }

        if let Some(until) = filter.until {
            builder.push(" AND created_at <= ");
            builder.push_bind(until);
        }

        builder.push(" ORDER BY created_at DESC");

        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit_clamp(limit));
        }

        let rows = builder
            .build_query_as::<PaymentLogRow>()
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(PaymentLog::try_from).collect()
    }

    async fn insert_indicator(&mut self, indicator: &FraudIndicator) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO fraud_indicators (id, user_id, car_id, indicator_type, severity, description, resolved, resolution_notes, resolved_by, resolved_at, dedupe_key, created_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
            ON CONFLICT (dedupe_key) WHERE resolved = FALSE AND dedupe_key IS NOT NULL
            DO NOTHING
            "#,
        )
        .bind(indicator.id)
        .bind(indicator.user_id)
        .bind(indicator.car_id)
        .bind(&indicator.indicator_type)
        .bind(indicator.severity.as_str())
        .bind(&indicator.description)
        .bind(indicator.resolved)
        .bind(&indicator.resolution_notes)
        .bind(indicator.resolved_by)
        .bind(indicator.resolved_at)
        .bind(&indicator.dedupe_key)
        .bind(indicator.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_indicator(&mut self, id: Uuid) -> BillingResult<Option<FraudIndicator>> {
        let row = sqlx::query_as::<_, FraudIndicatorRow>(&format!(
            "SELECT {INDICATOR_COLUMNS} FROM fraud_indicators WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(FraudIndicator::try_from).transpose()
    }

    async fn resolve_indicator(
        &mut self,
        next: &FraudIndicator,
    ) -> BillingResult<Option<FraudIndicator>> {
        let row = sqlx::query_as::<_, FraudIndicatorRow>(&format!(
            r#"
            UPDATE fraud_indicators
            SET resolved = $2,
                resolution_notes = $3,
                resolved_by = $4,
                resolved_at = $5
            WHERE id = $1 AND resolved = FALSE
            RETURNING {INDICATOR_COLUMNS}
            "#
        ))
        .bind(next.id)
        .bind(next.resolved)
        .bind(&next.resolution_notes)
        .bind(next.resolved_by)
        .bind(next.resolved_at)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(FraudIndicator::try_from).transpose()
    }

    async fn unresolved_indicators(
        &mut self,
        severity: Option<FraudSeverity>,
    ) -> BillingResult<Vec<FraudIndicator>> {
        let rows = sqlx::query_as::<_, FraudIndicatorRow>(&format!(
            "SELECT {INDICATOR_COLUMNS} FROM fraud_indicators WHERE resolved = FALSE AND ($1::TEXT IS NULL OR severity = $1) ORDER BY created_at DESC"
        ))
        .bind(severity.map(|level| level.as_str()))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(FraudIndicator::try_from).collect()
    }

    async fn commit(self: Box<Self>) -> BillingResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct PlanRow {
    id: Uuid,
    code: String,
    name: String,
    price_cents: i64,
    billing_cycle: String,
    max_active_listings: i32,
    max_featured_listings: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: i32,
    plan_id: Uuid,
    status: String,
    billing_cycle: String,
    current_period_start: Option<DateTime<Utc>>,
    current_period_end: Option<DateTime<Utc>>,
    auto_renew: bool,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct PaymentIntentRow {
    id: Uuid,
    subscription_id: Uuid,
    user_id: i32,
    amount_cents: i64,
    reference_number: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    reviewed_by: Option<i32>,
    reviewed_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
}

#[derive(Debug, FromRow)]
struct PaymentLogRow {
    id: Uuid,
    payment_intent_id: Uuid,
    actor_id: Option<i32>,
    from_status: Option<String>,
    to_status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct FraudIndicatorRow {
    id: Uuid,
    user_id: Option<i32>,
    car_id: Option<Uuid>,
    indicator_type: String,
    severity: String,
    description: String,
    resolved: bool,
    resolution_notes: Option<String>,
    resolved_by: Option<i32>,
    resolved_at: Option<DateTime<Utc>>,
    dedupe_key: Option<String>,
    created_at: DateTime<Utc>,
}

fn decode<T>(
    column: &'static str,
    value: String,
    parse: impl FnOnce(&str) -> Option<T>,
) -> BillingResult<T> {
    match parse(&value) {
        Some(parsed) => Ok(parsed),
        None => Err(BillingError::Corrupt { column, value }),
    }
}

fn decode_limit(column: &'static str, raw: i32) -> BillingResult<PlanLimit> {
    PlanLimit::try_from(raw).map_err(|_| BillingError::Corrupt {
        column,
        value: raw.to_string(),
    })
}

impl TryFrom<PlanRow> for Plan {
    type Error = BillingError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        Ok(Plan {
            id: row.id,
            code: row.code,
            name: row.name,
            price_cents: row.price_cents,
            billing_cycle: decode("billing_cycle", row.billing_cycle, BillingCycle::parse)?,
            max_active_listings: decode_limit("max_active_listings", row.max_active_listings)?,
            max_featured_listings: decode_limit(
                "max_featured_listings",
                row.max_featured_listings,
            )?,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = BillingError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: row.id,
            user_id: row.user_id,
            plan_id: row.plan_id,
            status: decode("status", row.status, SubscriptionStatus::parse)?,
            billing_cycle: decode("billing_cycle", row.billing_cycle, BillingCycle::parse)?,
            current_period_start: row.current_period_start,
            current_period_end: row.current_period_end,
            auto_renew: row.auto_renew,
            cancelled_at: row.cancelled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<PaymentIntentRow> for PaymentIntent {
    type Error = BillingError;

    fn try_from(row: PaymentIntentRow) -> Result<Self, Self::Error> {
        Ok(PaymentIntent {
            id: row.id,
            subscription_id: row.subscription_id,
            user_id: row.user_id,
            amount_cents: row.amount_cents,
            reference_number: row.reference_number,
            status: decode("status", row.status, PaymentIntentStatus::parse)?,
            created_at: row.created_at,
            submitted_at: row.submitted_at,
            reviewed_by: row.reviewed_by,
            reviewed_at: row.reviewed_at,
            rejection_reason: row.rejection_reason,
        })
    }
}

impl TryFrom<PaymentLogRow> for PaymentLog {
    type Error = BillingError;

    fn try_from(row: PaymentLogRow) -> Result<Self, Self::Error> {
        let from_status = match row.from_status {
            Some(value) => Some(decode("from_status", value, PaymentIntentStatus::parse)?),
            None => None,
        };
        Ok(PaymentLog {
            id: row.id,
            payment_intent_id: row.payment_intent_id,
            actor_id: row.actor_id,
            from_status,
            to_status: decode("to_status", row.to_status, PaymentIntentStatus::parse)?,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<FraudIndicatorRow> for FraudIndicator {
    type Error = BillingError;

    fn try_from(row: FraudIndicatorRow) -> Result<Self, Self::Error> {
        Ok(FraudIndicator {
            id: row.id,
            user_id: row.user_id,
            car_id: row.car_id,
            indicator_type: row.indicator_type,
            severity: decode("severity", row.severity, FraudSeverity::parse)?,
            description: row.description,
            resolved: row.resolved,
            resolution_notes: row.resolution_notes,
            resolved_by: row.resolved_by,
            resolved_at: row.resolved_at,
            dedupe_key: row.dedupe_key,
            created_at: row.created_at,
        })
    }
}
