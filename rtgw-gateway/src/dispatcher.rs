//! Dispatcher (C10): the sole consumer of the PubSub Bus. Fans a published
//! event out to every Connection whose subscription matches, re-running the
//! authorization check (C9) at delivery time rather than trusting the
//! check performed at subscribe time (spec §4.9's monotonicity law covers
//! role changes between subscribe and publish, but a role downgrade or a
//! payload whose filter fields don't match the original subscription must
//! still be caught here).

use std::sync::Arc;

use serde_json::Value;

use rtgw_security::policy::{Filters, Topic};

use crate::frames::ServerFrame;
use crate::gateway::Gateway;

/// Extract the filter fields a subscription can be keyed on (`userId`,
/// `teamId`) from an event's payload, mirroring the fields `policy::authorize`
/// inspects on a subscribe-time filter map (spec §4.6, §4.9).
fn derive_filters(payload: &Value) -> Filters {
    let mut filters = Filters::new();
    if let Some(user_id) = payload.get("userId").and_then(Value::as_str) {
        filters.insert("userId".to_string(), user_id.to_string());
    }
    if let Some(team_id) = payload.get("teamId").and_then(Value::as_str) {
        filters.insert("teamId".to_string(), team_id.to_string());
    }
    filters
}

/// Subscribes to every topic on the gateway's bus and fans each event out
/// to matching, still-authorized connections (spec §4.10).
pub async fn install(gateway: Arc<Gateway>) {
    for topic in [
        Topic::MetricUpdated,
        Topic::FlowStateUpdated,
        Topic::AlertCreated,
        Topic::DashboardUpdated,
        Topic::TeamUpdated,
        Topic::UserStatusUpdated,
    ] {
        let gateway = gateway.clone();
        gateway
            .bus()
            .subscribe(topic, move |event| {
                let gateway = gateway.clone();
                async move { dispatch(&gateway, topic, &event.payload, &event.timestamp).await }
            })
            .await;
    }
}

async fn dispatch(gateway: &Arc<Gateway>, topic: Topic, payload: &Value, timestamp: &str) {
    let filters = derive_filters(payload);
    let candidates = gateway.registry().candidates(topic, &filters);

    for connection_id in candidates {
        let Some(principal) = gateway.principal_of(connection_id) else {
            continue;
        };
        if !rtgw_security::authorize(&principal, topic, &filters) {
            continue;
        }
        gateway.deliver(
            connection_id,
            ServerFrame::SubscriptionData {
                topic: topic.to_string(),
                payload: payload.clone(),
                timestamp: timestamp.to_string(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtgw_security::{Principal, Role};
    use std::time::Duration;
    use tokio::sync::mpsc;

    use crate::connection::{BackpressurePolicy, ConnectionHandle, ConnectionId, ConnectionState};

    fn principal(user_id: &str, role: Role, teams: &[&str]) -> Principal {
        Principal {
            user_id: user_id.to_string(),
            display_name: user_id.to_string(),
            role,
            team_ids: teams.iter().map(|t| t.to_string()).collect(),
            active: true,
        }
    }

    #[tokio::test]
    async fn matching_subscriber_receives_subscription_data() {
        let gateway = Arc::new(Gateway::new(rtgw_events::GatewayBus::new(), Duration::from_secs(30)));
        install(gateway.clone()).await;

        let (tx, mut rx) = mpsc::channel(8);
        let id = ConnectionId::new();
        let handle = Arc::new(ConnectionHandle::new(
            id,
            principal("u1", Role::Developer, &[]),
            tx,
            BackpressurePolicy::DropNewest,
        ));
        handle.set_state(ConnectionState::Ready);
        gateway.test_insert(id, handle);
        gateway
            .registry()
            .subscribe(id, Topic::MetricUpdated, &{
                let mut f = Filters::new();
                f.insert("userId".to_string(), "u1".to_string());
                f
            });

        gateway
            .bus()
            .publish(
                Topic::MetricUpdated,
                serde_json::json!({"userId": "u1", "value": 42}),
                "t0",
            )
            .await;

        let msg = rx.try_recv().expect("subscription_data queued");
        match msg {
            crate::connection::OutboundMessage::Frame(ServerFrame::SubscriptionData { topic, .. }) => {
                assert_eq!(topic, "metric_updated");
            }
            other => panic!("expected subscription_data, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn role_downgrade_since_subscribe_is_caught_at_dispatch_time() {
        let gateway = Arc::new(Gateway::new(rtgw_events::GatewayBus::new(), Duration::from_secs(30)));
        install(gateway.clone()).await;

        let (tx, mut rx) = mpsc::channel(8);
        let id = ConnectionId::new();
        // Subscribed as a team lead, authorized for the team-scoped filter...
        let handle = Arc::new(ConnectionHandle::new(
            id,
            principal("lead-1", Role::Developer, &["team-a"]),
            tx,
            BackpressurePolicy::DropNewest,
        ));
        handle.set_state(ConnectionState::Ready);
        gateway.test_insert(id, handle);
        let team_filter = {
            let mut f = Filters::new();
            f.insert("teamId".to_string(), "team-a".to_string());
            f
        };
        gateway.registry().subscribe(id, Topic::MetricUpdated, &team_filter);

        // ...but a Developer never satisfies the team-filter rule, so dispatch
        // must deny it even though the registry entry still matches.
        gateway
            .bus()
            .publish(
                Topic::MetricUpdated,
                serde_json::json!({"teamId": "team-a", "value": 1}),
                "t0",
            )
            .await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unrelated_user_filter_does_not_receive_the_event() {
        let gateway = Arc::new(Gateway::new(rtgw_events::GatewayBus::new(), Duration::from_secs(30)));
        install(gateway.clone()).await;

        let (tx, mut rx) = mpsc::channel(8);
        let id = ConnectionId::new();
        let handle = Arc::new(ConnectionHandle::new(
            id,
            principal("u2", Role::Developer, &[]),
            tx,
            BackpressurePolicy::DropNewest,
        ));
        handle.set_state(ConnectionState::Ready);
        gateway.test_insert(id, handle);
        let mut f = Filters::new();
        f.insert("userId".to_string(), "u2".to_string());
        gateway.registry().subscribe(id, Topic::AlertCreated, &f);

        gateway
            .bus()
            .publish(Topic::AlertCreated, serde_json::json!({"userId": "u1"}), "t0")
            .await;

        assert!(rx.try_recv().is_err());
    }
}
