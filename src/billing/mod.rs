pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fraud;
pub mod ledger;
pub mod memory;
pub mod models;
pub mod payments;
pub mod pg_store;
pub mod quota;
pub mod scheduler;
pub mod store;
pub mod usage;

use std::sync::Arc;

use crate::listings::ListingsDirectory;
use crate::notifications::Notifier;

pub use catalog::PlanCatalog;
pub use config::BillingConfig;
pub use error::{BillingError, BillingResult};
pub use fraud::FraudSignalTracker;
pub use ledger::{SubscriptionLedger, SweepReport};
pub use memory::InMemoryBillingStore;
pub use models::{
    BillingCycle, EffectivePlan, FraudIndicator, FraudSeverity, NewFraudIndicator, PaymentIntent,
    PaymentIntentStatus, PaymentLog, PaymentLogFilter, Plan, PlanLimit, Subscription,
    SubscriptionStatus, SubscriptionView,
};
pub use payments::{PaymentVerifier, VerifiedPayment};
pub use pg_store::PgBillingStore;
pub use quota::{QuotaDecision, QuotaDenialReason, QuotaEnforcer, QuotaSnapshot};
pub use scheduler::{process_tick as run_subscription_sweep_tick, spawn as spawn_subscription_sweep};
pub use store::{BillingStore, BillingTx};
pub use usage::UsageCounter;

/// key: billing-services -> wired components shared by handlers and workers
#[derive(Clone)]
pub struct BillingServices {
    pub catalog: PlanCatalog,
    pub ledger: SubscriptionLedger,
    pub payments: PaymentVerifier,
    pub fraud: FraudSignalTracker,
    pub quota: QuotaEnforcer,
    pub config: BillingConfig,
}

impl BillingServices {
    pub fn new(
        store: Arc<dyn BillingStore>,
        listings: Arc<dyn ListingsDirectory>,
        notifier: Arc<dyn Notifier>,
        config: BillingConfig,
    ) -> Self {
        let catalog = PlanCatalog::new(store.clone(), config.free_plan());
        let ledger = SubscriptionLedger::new(store.clone(), catalog.clone(), notifier.clone());
        let payments = PaymentVerifier::new(
            store.clone(),
            catalog.clone(),
            notifier,
            config.rejection_streak,
        );
        let fraud = FraudSignalTracker::new(store);
        let quota = QuotaEnforcer::new(ledger.clone(), UsageCounter::new(listings));
        Self {
            catalog,
            ledger,
            payments,
            fraud,
            quota,
            config,
        }
    }
}
