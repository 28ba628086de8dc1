use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Domain events published after a plan transition commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanEvent {
    PlanConfirmed {
        plan_id: i32,
        allocation_count: usize,
        estimated_cost: Decimal,
        at: DateTime<Utc>,
    },
    ProductionStarted {
        plan_id: i32,
        at: DateTime<Utc>,
    },
    PlanCompleted {
        plan_id: i32,
        actual_produced_quantity: i32,
        actual_cost: Decimal,
        at: DateTime<Utc>,
    },
    PlanCancelled {
        plan_id: i32,
        reason: String,
        at: DateTime<Utc>,
    },
    LowStockDetected {
        inventory_id: i32,
        material_id: i32,
        warehouse_id: i32,
        available: i64,
        min_stock: Decimal,
    },
}

impl PlanEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PlanEvent::PlanConfirmed { .. } => "plan_confirmed",
            PlanEvent::ProductionStarted { .. } => "production_started",
            PlanEvent::PlanCompleted { .. } => "plan_completed",
            PlanEvent::PlanCancelled { .. } => "plan_cancelled",
            PlanEvent::LowStockDetected { .. } => "low_stock_detected",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<PlanEvent>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<PlanEvent>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: PlanEvent) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the receiver is gone.
    /// The state change has already committed by the time events go out.
    pub async fn send_or_log(&self, event: PlanEvent) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "Dropping plan event");
        }
    }
}

/// Creates a bounded event channel.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<PlanEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender::new(tx), rx)
}

/// Drains the channel until every sender is dropped, logging each event.
pub async fn process_events(mut rx: mpsc::Receiver<PlanEvent>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            PlanEvent::LowStockDetected {
                inventory_id,
                material_id,
                available,
                min_stock,
                ..
            } => {
                warn!(
                    inventory_id,
                    material_id,
                    available,
                    min_stock = %min_stock,
                    "Low stock detected"
                );
            }
            other => {
                let payload = serde_json::to_string(other).unwrap_or_default();
                info!(event = other.name(), payload = %payload, "Plan event");
            }
        }
    }

    info!("Event processing loop stopped");
}
