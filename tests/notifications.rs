use std::time::Duration;

use backend::billing::SubscriptionStatus;
use backend::notifications::{
    sign_payload, start_notification_worker, NotificationDelivery, NotificationEvent, Notifier,
    WebhookDelivery, SIGNATURE_HEADER,
};
use chrono::{TimeZone, Utc};
use httpmock::prelude::*;
use uuid::Uuid;

fn activated() -> NotificationEvent {
    NotificationEvent::SubscriptionActivated {
        user_id: 12,
        subscription_id: Uuid::new_v4(),
        plan_id: Uuid::new_v4(),
        period_end: Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap(),
    }
}

#[tokio::test]
async fn webhook_delivery_is_signed() {
    let server = MockServer::start_async().await;
    let event = activated();
    let body = serde_json::to_vec(&event).unwrap();
    let signature = sign_payload("hook-secret", &body).unwrap();

    let hook = server.mock(|when, then| {
        when.method(POST)
            .path("/hooks/billing")
            .header(SIGNATURE_HEADER, signature.as_str())
            .json_body_partial(r#"{"event": "subscription_activated", "user_id": 12}"#);
        then.status(204);
    });

    let delivery = WebhookDelivery::new(server.url("/hooks/billing"), Some("hook-secret".into()));
    delivery.deliver(&event).await.unwrap();
    hook.assert_async().await;
}

#[tokio::test]
async fn webhook_failure_status_is_an_error() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/hooks/billing");
        then.status(500);
    });

    let delivery = WebhookDelivery::new(server.url("/hooks/billing"), None);
    assert!(delivery.deliver(&activated()).await.is_err());
}

#[tokio::test]
async fn worker_drains_queued_events() {
    let server = MockServer::start_async().await;
    let hook = server.mock(|when, then| {
        when.method(POST)
            .path("/hooks/billing")
            .json_body_partial(r#"{"event": "subscription_ended", "status": "EXPIRED"}"#);
        then.status(200);
    });

    let handle = start_notification_worker(
        Box::new(WebhookDelivery::new(server.url("/hooks/billing"), None)),
        8,
    );
    handle.notify(NotificationEvent::SubscriptionEnded {
        user_id: 5,
        subscription_id: Uuid::new_v4(),
        status: SubscriptionStatus::Expired,
    });

    let mut delivered = false;
    for _ in 0..50 {
        if hook.hits_async().await == 1 {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(delivered, "webhook was not called");
}
