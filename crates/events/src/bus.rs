//! In-process fan-out of audit events to subscribers.
//!
//! Used to forward ledger events to downstream consumers (notification
//! transport, audit persistence) without coupling the ledger to them. Each
//! subscription receives a copy of every event published after it subscribed.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Mutex;
use std::time::Duration;

use merchledger_core::TenantId;

use crate::event::{AuditEvent, Event, InventoryChanged, LowStockAlert};
use crate::sink::{AuditError, AuditSink};

/// A receiving end of the bus. Intended for a single consuming thread.
#[derive(Debug)]
pub struct Subscription {
    receiver: Receiver<AuditEvent>,
}

impl Subscription {
    /// Block until the next event is available.
    pub fn recv(&self) -> Result<AuditEvent, mpsc::RecvError> {
        self.receiver.recv()
    }

    pub fn try_recv(&self) -> Result<AuditEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<AuditEvent, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

#[derive(Debug)]
struct Subscriber {
    tenant_id: Option<TenantId>,
    sender: Sender<AuditEvent>,
}

/// Broadcasting audit sink.
///
/// - No IO
/// - Dead subscribers are pruned on publish
/// - Optional per-subscriber tenant filter
#[derive(Debug, Default)]
pub struct AuditBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl AuditBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events of every tenant.
    pub fn subscribe(&self) -> Subscription {
        self.add_subscriber(None)
    }

    /// Subscribe to one tenant's events only.
    pub fn subscribe_tenant(&self, tenant_id: TenantId) -> Subscription {
        self.add_subscriber(Some(tenant_id))
    }

    pub fn publish(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut subs = self
            .subscribers
            .lock()
            .map_err(|_| AuditError::Unavailable("bus lock poisoned".to_string()))?;

        let tenant_id = event.tenant_id();
        subs.retain(|sub| match sub.tenant_id {
            Some(t) if t != tenant_id => true,
            _ => sub.sender.send(event.clone()).is_ok(),
        });
        Ok(())
    }

    fn add_subscriber(&self, tenant_id: Option<TenantId>) -> Subscription {
        let (sender, receiver) = mpsc::channel();
        // A poisoned lock yields a subscription that never receives.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(Subscriber { tenant_id, sender });
        }
        Subscription { receiver }
    }
}

impl AuditSink for AuditBus {
    fn log_inventory_change(&self, change: &InventoryChanged) -> Result<(), AuditError> {
        self.publish(AuditEvent::InventoryChanged(change.clone()))
    }

    fn log_alert_triggered(&self, alert: &LowStockAlert) -> Result<(), AuditError> {
        self.publish(AuditEvent::LowStockAlert(alert.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use merchledger_core::ProductId;
    use uuid::Uuid;

    fn alert(tenant_id: TenantId) -> LowStockAlert {
        LowStockAlert {
            event_id: Uuid::now_v7(),
            tenant_id,
            product_id: ProductId::new(),
            available: 1,
            threshold: 3,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn every_subscriber_gets_a_copy() {
        let bus = AuditBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.log_alert_triggered(&alert(TenantId::new())).unwrap();

        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_ok());
    }

    #[test]
    fn tenant_subscription_filters_other_tenants() {
        let bus = AuditBus::new();
        let mine = TenantId::new();
        let sub = bus.subscribe_tenant(mine);

        bus.log_alert_triggered(&alert(TenantId::new())).unwrap();
        bus.log_alert_triggered(&alert(mine)).unwrap();

        let received = sub.try_recv().unwrap();
        assert_eq!(received.tenant_id(), mine);
        assert!(sub.try_recv().is_err());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = AuditBus::new();
        drop(bus.subscribe());
        bus.log_alert_triggered(&alert(TenantId::new())).unwrap();
        assert!(bus.subscribers.lock().unwrap().is_empty());
    }
}
