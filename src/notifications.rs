use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::billing::models::SubscriptionStatus;

pub const SIGNATURE_HEADER: &str = "x-signature-256";

/// key: notifications -> seller-facing billing events
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    SubscriptionActivated {
        user_id: i32,
        subscription_id: Uuid,
        plan_id: Uuid,
        period_end: DateTime<Utc>,
    },
    PaymentRejected {
        user_id: i32,
        payment_intent_id: Uuid,
        reason: String,
    },
    SubscriptionEnded {
        user_id: i32,
        subscription_id: Uuid,
        status: SubscriptionStatus,
    },
}

impl NotificationEvent {
    pub fn user_id(&self) -> i32 {
        match self {
            NotificationEvent::SubscriptionActivated { user_id, .. }
            | NotificationEvent::PaymentRejected { user_id, .. }
            | NotificationEvent::SubscriptionEnded { user_id, .. } => *user_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NotificationEvent::SubscriptionActivated { .. } => "subscription_activated",
            NotificationEvent::PaymentRejected { .. } => "payment_rejected",
            NotificationEvent::SubscriptionEnded { .. } => "subscription_ended",
        }
    }
}

/// Fire-and-forget sink. Implementations must never block the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: NotificationEvent);
}

/// key: notifications-handle -> enqueue interface
#[derive(Clone)]
pub struct NotificationHandle {
    sender: Sender<NotificationEvent>,
}

impl Notifier for NotificationHandle {
    fn notify(&self, event: NotificationEvent) {
        let name = event.name();
        let user_id = event.user_id();
        match self.sender.try_send(event) {
            Ok(()) => debug!(event = name, user_id, "notification queued"),
            Err(TrySendError::Full(_)) => {
                warn!(event = name, user_id, "notification queue full; dropping event")
            }
            Err(TrySendError::Closed(_)) => {
                warn!(event = name, user_id, "notification worker stopped; dropping event")
            }
        }
    }
}

/// Bounded handle plus the receiving end, for callers that drain events
/// themselves.
pub fn channel(capacity: usize) -> (NotificationHandle, Receiver<NotificationEvent>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (NotificationHandle { sender }, receiver)
}

/// Where drained events end up.
#[async_trait]
pub trait NotificationDelivery: Send + Sync {
    async fn deliver(&self, event: &NotificationEvent) -> Result<()>;
}

/// Logs events without sending them anywhere.
pub struct LogDelivery;

#[async_trait]
impl NotificationDelivery for LogDelivery {
    async fn deliver(&self, event: &NotificationEvent) -> Result<()> {
        info!(event = event.name(), user_id = event.user_id(), "notification emitted");
        Ok(())
    }
}

/// key: notifications-webhook -> signed JSON POST per event
pub struct WebhookDelivery {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
}

impl WebhookDelivery {
    pub fn new(url: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            secret,
        }
    }
}

pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|err| anyhow!("invalid webhook secret: {err}"))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

#[async_trait]
impl NotificationDelivery for WebhookDelivery {
    async fn deliver(&self, event: &NotificationEvent) -> Result<()> {
        let body = serde_json::to_vec(event).context("failed to encode notification")?;
        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign_payload(secret, &body)?);
        }
        let response = request
            .body(body)
            .send()
            .await
            .context("notification webhook unreachable")?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("notification webhook responded with {status}"));
        }
        Ok(())
    }
}

/// key: notifications-worker -> drains the queue into a delivery target
pub fn start_notification_worker(
    delivery: Box<dyn NotificationDelivery>,
    capacity: usize,
) -> NotificationHandle {
    let (handle, mut receiver) = channel(capacity);
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            if let Err(err) = delivery.deliver(&event).await {
                error!(
                    ?err,
                    event = event.name(),
                    user_id = event.user_id(),
                    "failed to deliver notification"
                );
            }
        }
    });
    handle
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(user_id: i32) -> NotificationEvent {
        NotificationEvent::PaymentRejected {
            user_id,
            payment_intent_id: Uuid::new_v4(),
            reason: "amount mismatch".into(),
        }
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let (handle, mut receiver) = channel(1);
        handle.notify(rejected(1));
        handle.notify(rejected(2));
        assert_eq!(receiver.recv().await.map(|event| event.user_id()), Some(1));
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_queue_is_tolerated() {
        let (handle, receiver) = channel(4);
        drop(receiver);
        handle.notify(rejected(3));
    }

    #[test]
    fn events_serialise_with_tag() {
        let value = serde_json::to_value(rejected(9)).unwrap();
        assert_eq!(value["event"], "payment_rejected");
        assert_eq!(value["user_id"], 9);
    }

    #[test]
    fn signature_is_prefixed_hex() {
        let signature = sign_payload("secret", b"{}").unwrap();
        assert!(signature.starts_with("sha256="));
        assert_eq!(signature.len(), "sha256=".len() + 64);
    }
}
