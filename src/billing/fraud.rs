use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::identity::Caller;

use super::error::{BillingError, BillingResult};
use super::models::{FraudIndicator, FraudSeverity, NewFraudIndicator};
use super::store::{BillingStore, BillingTx};

pub const DUPLICATE_PAYMENT_REFERENCE: &str = "duplicate_payment_reference";
pub const REPEATED_PAYMENT_REJECTION: &str = "repeated_payment_rejection";

/// key: fraud-signals -> additive indicators for admin review
#[derive(Clone)]
pub struct FraudSignalTracker {
    store: Arc<dyn BillingStore>,
}

impl FraudSignalTracker {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    /// Returns `None` when an unresolved indicator with the same dedupe key
    /// already exists.
    pub async fn record_indicator(
        &self,
        caller: &Caller,
        draft: NewFraudIndicator,
        now: DateTime<Utc>,
    ) -> BillingResult<Option<FraudIndicator>> {
        caller.require_admin()?;
        if draft.indicator_type.trim().is_empty() {
            return Err(BillingError::validation("indicator_type is required"));
        }
        if draft.description.trim().is_empty() {
            return Err(BillingError::validation("description is required"));
        }
        let mut tx = self.store.begin().await?;
        let recorded = record_in(&mut *tx, draft, now).await?;
        tx.commit().await?;
        Ok(recorded)
    }

    pub async fn resolve(
        &self,
        caller: &Caller,
        indicator_id: Uuid,
        notes: &str,
        now: DateTime<Utc>,
    ) -> BillingResult<FraudIndicator> {
        caller.require_admin()?;
        let notes = notes.trim();
        if notes.is_empty() {
            return Err(BillingError::validation("resolution notes are required"));
        }

        let mut tx = self.store.begin().await?;
        let current = tx
            .find_indicator(indicator_id)
            .await?
            .ok_or_else(|| BillingError::not_found("fraud indicator", indicator_id))?;
        if current.resolved {
            return Err(BillingError::invalid_state(format!(
                "fraud indicator {indicator_id} is already resolved"
            )));
        }
        let next = FraudIndicator {
            resolved: true,
            resolution_notes: Some(notes.to_string()),
            resolved_by: Some(caller.user_id),
            resolved_at: Some(now),
            ..current
        };
        let resolved = tx.resolve_indicator(&next).await?.ok_or_else(|| {
            BillingError::invalid_state(format!(
                "fraud indicator {indicator_id} is already resolved"
            ))
        })?;
        tx.commit().await?;

        info!(
            indicator = %resolved.id,
            admin = caller.user_id,
            "fraud indicator resolved"
        );
        Ok(resolved)
    }

    pub async fn list_unresolved(
        &self,
        caller: &Caller,
        severity: Option<FraudSeverity>,
    ) -> BillingResult<Vec<FraudIndicator>> {
        caller.require_admin()?;
        let mut tx = self.store.begin().await?;
        tx.unresolved_indicators(severity).await
    }
}

/// Records an indicator inside an open unit of work. Used by the payment
/// heuristics so the flag commits with the transition that raised it.
pub(crate) async fn record_in(
    tx: &mut dyn BillingTx,
    draft: NewFraudIndicator,
    now: DateTime<Utc>,
) -> BillingResult<Option<FraudIndicator>> {
    let indicator = draft.into_indicator(now);
    if tx.insert_indicator(&indicator).await? {
        warn!(
            indicator = %indicator.id,
            user_id = ?indicator.user_id,
            kind = %indicator.indicator_type,
            severity = indicator.severity.as_str(),
            "fraud indicator raised"
        );
        Ok(Some(indicator))
    } else {
        debug!(
            kind = %indicator.indicator_type,
            dedupe_key = ?indicator.dedupe_key,
            "fraud indicator already open"
        );
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::memory::InMemoryBillingStore;

    fn draft(key: Option<&str>) -> NewFraudIndicator {
        NewFraudIndicator {
            user_id: Some(4),
            car_id: None,
            indicator_type: "suspicious_listing".into(),
            severity: FraudSeverity::Low,
            description: "price far below market".into(),
            dedupe_key: key.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn dedupe_key_holds_while_unresolved() {
        let tracker = FraudSignalTracker::new(Arc::new(InMemoryBillingStore::new()));
        let admin = Caller::admin(1);
        let now = Utc::now();

        let first = tracker
            .record_indicator(&admin, draft(Some("listing:9")), now)
            .await
            .unwrap()
            .unwrap();
        assert!(tracker
            .record_indicator(&admin, draft(Some("listing:9")), now)
            .await
            .unwrap()
            .is_none());

        tracker
            .resolve(&admin, first.id, "seller verified ownership", now)
            .await
            .unwrap();
        assert!(tracker
            .record_indicator(&admin, draft(Some("listing:9")), now)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn resolve_requires_notes_and_happens_once() {
        let tracker = FraudSignalTracker::new(Arc::new(InMemoryBillingStore::new()));
        let admin = Caller::admin(1);
        let now = Utc::now();
        let indicator = tracker
            .record_indicator(&admin, draft(None), now)
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(
            tracker.resolve(&admin, indicator.id, "  ", now).await,
            Err(BillingError::Validation(_))
        ));
        let resolved = tracker
            .resolve(&admin, indicator.id, "false positive", now)
            .await
            .unwrap();
        assert_eq!(resolved.resolved_by, Some(1));
        assert!(matches!(
            tracker.resolve(&admin, indicator.id, "again", now).await,
            Err(BillingError::InvalidState(_))
        ));
        assert!(tracker
            .list_unresolved(&admin, None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn sellers_cannot_see_or_record_indicators() {
        let tracker = FraudSignalTracker::new(Arc::new(InMemoryBillingStore::new()));
        let seller = Caller::seller(4);
        assert!(matches!(
            tracker.list_unresolved(&seller, None).await,
            Err(BillingError::Forbidden(_))
        ));
        assert!(matches!(
            tracker.record_indicator(&seller, draft(None), Utc::now()).await,
            Err(BillingError::Forbidden(_))
        ));
    }
}
