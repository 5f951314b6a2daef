use std::sync::Arc;

use uuid::Uuid;

use super::error::{BillingError, BillingResult};
use super::models::Plan;
use super::store::{BillingStore, BillingTx};

/// key: plan-catalog -> read-only tier lookup
#[derive(Clone)]
pub struct PlanCatalog {
    store: Arc<dyn BillingStore>,
    free_plan: Plan,
}

impl PlanCatalog {
    pub fn new(store: Arc<dyn BillingStore>, free_plan: Plan) -> Self {
        Self { store, free_plan }
    }

    pub fn free_plan(&self) -> Plan {
        self.free_plan.clone()
    }

    /// The nil id resolves to the free plan.
    pub async fn get_plan(&self, id: Uuid) -> BillingResult<Plan> {
        let mut tx = self.store.begin().await?;
        self.plan_in(&mut *tx, id).await
    }

    pub async fn list_active_plans(&self) -> BillingResult<Vec<Plan>> {
        let mut tx = self.store.begin().await?;
        tx.active_plans().await
    }

    pub(crate) async fn plan_in(&self, tx: &mut dyn BillingTx, id: Uuid) -> BillingResult<Plan> {
        if id.is_nil() {
            return Ok(self.free_plan());
        }
        tx.find_plan(id)
            .await?
            .ok_or_else(|| BillingError::not_found("plan", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::memory::InMemoryBillingStore;
    use crate::billing::models::{BillingCycle, PlanLimit};
    use chrono::Utc;

    fn plan(code: &str, price_cents: i64, is_active: bool) -> Plan {
        Plan {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: code.to_uppercase(),
            price_cents,
            billing_cycle: BillingCycle::Monthly,
            max_active_listings: PlanLimit::AtMost(10),
            max_featured_listings: PlanLimit::AtMost(2),
            is_active,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn nil_id_is_the_free_plan() {
        let catalog = PlanCatalog::new(
            Arc::new(InMemoryBillingStore::new()),
            Plan::free(PlanLimit::AtMost(3), PlanLimit::AtMost(0)),
        );
        let free = catalog.get_plan(Uuid::nil()).await.unwrap();
        assert!(free.is_free());
        assert_eq!(free.max_active_listings, PlanLimit::AtMost(3));
    }

    #[tokio::test]
    async fn lists_only_active_plans_by_price() {
        let pro = plan("pro", 4_900, true);
        let basic = plan("basic", 1_900, true);
        let retired = plan("legacy", 900, false);
        let store = InMemoryBillingStore::with_plans([pro.clone(), basic.clone(), retired.clone()]);
        let catalog = PlanCatalog::new(
            Arc::new(store),
            Plan::free(PlanLimit::AtMost(3), PlanLimit::AtMost(0)),
        );

        let codes: Vec<String> = catalog
            .list_active_plans()
            .await
            .unwrap()
            .into_iter()
            .map(|plan| plan.code)
            .collect();
        assert_eq!(codes, vec!["basic".to_string(), "pro".to_string()]);

        // retired plans still resolve for existing subscribers
        assert_eq!(catalog.get_plan(retired.id).await.unwrap(), retired);
        assert!(matches!(
            catalog.get_plan(Uuid::new_v4()).await,
            Err(BillingError::NotFound { kind: "plan", .. })
        ));
    }
}
