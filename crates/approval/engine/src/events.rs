//! Event fan-out: best-effort delivery of `NodePending` facts
//!
//! Emission is fire-and-forget. A missing or failed subscriber is logged
//! and otherwise ignored; the already-committed state transition never
//! rolls back because a notification could not be delivered.

use approval_types::NodePending;
use tokio::sync::mpsc;

/// Receives "node now pending" facts after each transition that leaves
/// an instance pending on a role-gated step.
pub trait EventSink: Send + Sync {
    fn node_pending(&self, event: NodePending);
}

/// Drops every event. For deployments without a notification pipeline.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn node_pending(&self, _event: NodePending) {}
}

/// Forwards events into an unbounded channel for an async subscriber
/// (notification service, outbox writer, test harness).
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<NodePending>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NodePending>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn node_pending(&self, event: NodePending) {
        if self.tx.send(event).is_err() {
            tracing::warn!("node pending event dropped, subscriber gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approval_types::{BusinessKey, InstanceId, RoleId, UserId};
    use chrono::Utc;

    fn sample_event() -> NodePending {
        NodePending {
            instance_id: InstanceId::new("inst-1"),
            workflow_code: "ORDER_DISCOUNT".to_string(),
            workflow_name: "Order discount approval".to_string(),
            current_step: 1,
            role_id: RoleId::new("regional-director"),
            business: BusinessKey::new("ORDER", "42"),
            submitted_by_user_id: UserId::new("alice"),
            submitted_by_name: "Alice".to_string(),
            submitted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn channel_sink_forwards_events() {
        let (sink, mut rx) = ChannelEventSink::new();
        sink.node_pending(sample_event());

        let received = rx.recv().await.unwrap();
        assert_eq!(received.instance_id, InstanceId::new("inst-1"));
        assert_eq!(received.current_step, 1);
    }

    #[tokio::test]
    async fn send_after_receiver_dropped_does_not_panic() {
        let (sink, rx) = ChannelEventSink::new();
        drop(rx);
        sink.node_pending(sample_event());
    }
}
