use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tokio::time::{self, Duration as TokioDuration};
use tracing::{info, warn};

use super::ledger::{SubscriptionLedger, SweepReport};

/// key: subscription-sweep-scheduler -> periodic expiry reconciliation
pub fn spawn(ledger: SubscriptionLedger, interval: TokioDuration, pending_ttl: Option<Duration>) {
    if interval.is_zero() {
        info!("subscription sweep disabled");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        loop {
            ticker.tick().await;
            let now = Utc::now();
            if let Err(err) = process_tick(&ledger, now, pending_ttl).await {
                warn!(?err, "subscription sweep tick failed");
            }
        }
    });
}

/// key: subscription-sweep-scheduler -> tick handler
pub async fn process_tick(
    ledger: &SubscriptionLedger,
    now: DateTime<Utc>,
    pending_ttl: Option<Duration>,
) -> Result<SweepReport> {
    let report = ledger.sweep(now, pending_ttl).await?;
    if report != SweepReport::default() {
        info!(
            expired = report.expired,
            cancelled = report.cancelled,
            withdrawn = report.withdrawn,
            failed = report.failed,
            "subscription sweep applied transitions"
        );
    }
    Ok(report)
}
