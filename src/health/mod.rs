use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

// ============================================================================
// Health Reporting
// ============================================================================
//
// Components report degraded/healthy conditions through the HealthReporter
// trait. StatusRegistry is the process-wide implementation: one entry per
// component id, last write wins, identical repeated writes are no-ops.
//
// ============================================================================

/// Health status of a component
#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    Healthy,
    Degraded { reason: String, message: String },
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, HealthStatus::Degraded { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            HealthStatus::Healthy => None,
            HealthStatus::Degraded { reason, .. } => Some(reason),
        }
    }
}

/// Health information for a component
#[derive(Debug, Clone)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    /// When `status` last changed
    pub last_transition: DateTime<Utc>,
    /// How many times `status` changed
    pub transitions: u64,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            last_transition: Utc::now(),
            transitions: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: HashMap<String, ComponentHealth>,
    pub check_time: DateTime<Utc>,
}

/// Sink for component health conditions
#[async_trait]
pub trait HealthReporter: Send + Sync {
    async fn set_degraded(&self, component: &str, reason: &str, message: &str);

    async fn set_healthy(&self, component: &str);
}

#[derive(Default)]
pub struct StatusRegistry {
    components: RwLock<HashMap<String, ComponentHealth>>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn component(&self, name: &str) -> Option<ComponentHealth> {
        self.components.read().await.get(name).cloned()
    }

    pub async fn snapshot(&self) -> SystemHealth {
        let components = self.components.read().await.clone();

        SystemHealth {
            overall_status: compute_overall_status(&components),
            components,
            check_time: Utc::now(),
        }
    }

    /// Returns true if the stored status changed
    async fn update(&self, component: &str, status: HealthStatus) -> bool {
        let mut components = self.components.write().await;

        match components.get_mut(component) {
            Some(existing) if existing.status == status => false,
            Some(existing) => {
                tracing::info!(
                    component = component,
                    from = ?existing.status,
                    to = ?status,
                    "Component health changed"
                );
                existing.status = status;
                existing.last_transition = Utc::now();
                existing.transitions += 1;
                true
            }
            None => {
                tracing::info!(
                    component = component,
                    status = ?status,
                    "Component health recorded"
                );
                components.insert(component.to_string(), ComponentHealth::new(component, status));
                true
            }
        }
    }
}

#[async_trait]
impl HealthReporter for StatusRegistry {
    async fn set_degraded(&self, component: &str, reason: &str, message: &str) {
        let status = HealthStatus::Degraded {
            reason: reason.to_string(),
            message: message.to_string(),
        };
        if self.update(component, status).await {
            tracing::warn!(
                component = component,
                reason = reason,
                message = message,
                "Component degraded"
            );
        }
    }

    async fn set_healthy(&self, component: &str) {
        self.update(component, HealthStatus::Healthy).await;
    }
}

fn compute_overall_status(components: &HashMap<String, ComponentHealth>) -> HealthStatus {
    let mut degraded: Vec<&ComponentHealth> = components
        .values()
        .filter(|health| health.status.is_degraded())
        .collect();

    if degraded.is_empty() {
        return HealthStatus::Healthy;
    }

    degraded.sort_by(|a, b| a.name.cmp(&b.name));
    let reason = degraded
        .iter()
        .filter_map(|health| health.status.reason())
        .collect::<Vec<_>>()
        .join(",");
    let message = degraded
        .iter()
        .map(|health| match &health.status {
            HealthStatus::Degraded { message, .. } => format!("{}: {}", health.name, message),
            HealthStatus::Healthy => health.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ");

    HealthStatus::Degraded { reason, message }
}
