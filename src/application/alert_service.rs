// Alert service - per-owner threshold rules evaluated against KPI output
use crate::application::dashboard_service::DashboardService;
use crate::domain::alert::{evaluate, AlertEvent, AlertRule, AlertState, AlertTransition, DashboardAlert};
use crate::domain::dashboard::NotificationKind;
use crate::domain::error::{AnalyticsError, AnalyticsResult};
use crate::domain::kpi::KpiData;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

#[derive(Clone)]
pub struct AlertService {
    alerts: Arc<RwLock<HashMap<String, Vec<DashboardAlert>>>>,
    dashboards: DashboardService,
    events: broadcast::Sender<AlertEvent>,
}

impl AlertService {
    pub fn new(dashboards: DashboardService) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            alerts: Arc::new(RwLock::new(HashMap::new())),
            dashboards,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.events.subscribe()
    }

    /// Create a rule in Normal state, or replace an existing rule's settings
    /// while keeping its evaluated state.
    pub async fn upsert_alert(&self, owner_id: &str, rule: AlertRule) -> AnalyticsResult<DashboardAlert> {
        if rule.id.trim().is_empty() || rule.metric.trim().is_empty() {
            return Err(AnalyticsError::InvalidFilter(
                "alert id and metric are required".to_string(),
            ));
        }
        if !rule.threshold.is_finite() || !rule.hysteresis.is_finite() {
            return Err(AnalyticsError::InvalidFilter(
                "alert threshold and hysteresis must be finite".to_string(),
            ));
        }

        let mut alerts = self.alerts.write().await;
        let owned = alerts.entry(owner_id.to_string()).or_default();
        match owned.iter_mut().find(|a| a.id == rule.id) {
            Some(existing) => {
                existing.update_rule(rule);
                Ok(existing.clone())
            }
            None => {
                let alert = DashboardAlert::new(owner_id, rule);
                owned.push(alert.clone());
                Ok(alert)
            }
        }
    }

    pub async fn list_alerts(&self, owner_id: &str) -> Vec<DashboardAlert> {
        self.alerts
            .read()
            .await
            .get(owner_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn remove_alert(&self, owner_id: &str, alert_id: &str) -> AnalyticsResult<()> {
        let mut alerts = self.alerts.write().await;
        let owned = alerts.get_mut(owner_id).ok_or_else(|| not_found(alert_id))?;
        let before = owned.len();
        owned.retain(|a| a.id != alert_id);
        if owned.len() == before {
            return Err(not_found(alert_id));
        }
        Ok(())
    }

    /// Mark an alert as read. Its state is left untouched.
    pub async fn acknowledge(&self, owner_id: &str, alert_id: &str) -> AnalyticsResult<DashboardAlert> {
        let mut alerts = self.alerts.write().await;
        let alert = alerts
            .get_mut(owner_id)
            .and_then(|owned| owned.iter_mut().find(|a| a.id == alert_id))
            .ok_or_else(|| not_found(alert_id))?;
        alert.is_read = true;
        Ok(alert.clone())
    }

    /// Evaluate one rule against a KPI value.
    pub async fn evaluate(&self, owner_id: &str, alert_id: &str, kpi: &KpiData) -> AnalyticsResult<AlertTransition> {
        let (transition, event) = {
            let mut alerts = self.alerts.write().await;
            let alert = alerts
                .get_mut(owner_id)
                .and_then(|owned| owned.iter_mut().find(|a| a.id == alert_id))
                .ok_or_else(|| not_found(alert_id))?;
            step(alert, kpi)
        };
        if let Some(event) = event {
            self.publish(owner_id, vec![event]).await;
        }
        Ok(transition)
    }

    /// Evaluate every rule of `owner_id` whose metric appears in `kpis`.
    /// Returns only the state-changing transitions.
    pub async fn evaluate_all(&self, owner_id: &str, kpis: &[KpiData]) -> Vec<AlertEvent> {
        let events: Vec<AlertEvent> = {
            let mut alerts = self.alerts.write().await;
            let Some(owned) = alerts.get_mut(owner_id) else {
                return Vec::new();
            };
            owned
                .iter_mut()
                .filter_map(|alert| {
                    let kpi = kpis.iter().find(|k| k.name == alert.metric)?;
                    step(alert, kpi).1
                })
                .collect()
        };

        self.publish(owner_id, events.clone()).await;
        events
    }

    async fn publish(&self, owner_id: &str, events: Vec<AlertEvent>) {
        if events.is_empty() {
            return;
        }
        let preferences = match self.dashboards.get_preferences(owner_id).await {
            Ok(preferences) => preferences,
            Err(e) => {
                tracing::warn!("Could not load preferences for {}: {}", owner_id, e);
                return;
            }
        };

        for event in events {
            let kind = match event.transition.to {
                AlertState::Triggered => NotificationKind::AlertTriggered,
                AlertState::Normal => NotificationKind::AlertCleared,
            };
            if preferences.wants(kind) {
                // No subscribers is fine
                let _ = self.events.send(event);
            }
        }
    }
}

fn step(alert: &mut DashboardAlert, kpi: &KpiData) -> (AlertTransition, Option<AlertEvent>) {
    let transition = evaluate(alert, kpi.value);
    alert.apply(&transition);

    if !transition.is_change() {
        return (transition, None);
    }

    tracing::info!(
        alert = %alert.id,
        metric = %alert.metric,
        value = kpi.value,
        "alert {:?} -> {:?}",
        transition.from,
        transition.to
    );
    let event = AlertEvent {
        owner_id: alert.owner_id.clone(),
        metric: alert.metric.clone(),
        title: alert.title.clone(),
        severity: alert.severity,
        transition: transition.clone(),
    };
    (transition, Some(event))
}

fn not_found(alert_id: &str) -> AnalyticsError {
    AnalyticsError::NotFound(format!("alert '{}'", alert_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::alert::{Comparator, Severity};
    use crate::domain::metric::MetricUnit;
    use crate::infrastructure::memory_dashboard_repository::InMemoryDashboardRepository;

    fn service() -> AlertService {
        AlertService::new(DashboardService::new(Arc::new(InMemoryDashboardRepository::new())))
    }

    fn rule(id: &str, metric: &str, threshold: f64) -> AlertRule {
        AlertRule {
            id: id.into(),
            metric: metric.into(),
            comparator: Comparator::Gt,
            threshold,
            hysteresis: 5.0,
            severity: Severity::High,
            title: None,
        }
    }

    fn kpi(name: &str, value: f64) -> KpiData {
        KpiData::new(name.into(), name.into(), MetricUnit::Percentage, Some(value), None)
    }

    #[tokio::test]
    async fn test_evaluate_all_emits_only_changes() {
        let service = service();
        service.upsert_alert("u1", rule("turnover", "turnover_rate", 100.0)).await.unwrap();
        service.upsert_alert("u1", rule("absent", "absenteeism_rate", 10.0)).await.unwrap();

        let mut values = Vec::new();
        for value in [90.0, 105.0, 97.0, 94.0] {
            let events = service
                .evaluate_all("u1", &[kpi("turnover_rate", value)])
                .await;
            values.extend(events.iter().map(|e| (e.transition.value, e.transition.to)));
        }

        assert_eq!(
            values,
            vec![(105.0, AlertState::Triggered), (94.0, AlertState::Normal)]
        );
        // the absenteeism rule had no KPI to look at
        let alerts = service.list_alerts("u1").await;
        assert_eq!(alerts[1].last_value(), None);
    }

    #[tokio::test]
    async fn test_events_respect_notification_opt_ins() {
        let service = service();
        let mut receiver = service.subscribe();
        service.upsert_alert("u1", rule("turnover", "turnover_rate", 100.0)).await.unwrap();

        service.evaluate_all("u1", &[kpi("turnover_rate", 150.0)]).await;
        service.evaluate_all("u1", &[kpi("turnover_rate", 10.0)]).await;

        // defaults opt into triggers only
        let event = receiver.try_recv().unwrap();
        assert_eq!(event.transition.to, AlertState::Triggered);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_acknowledge_keeps_state() {
        let service = service();
        service.upsert_alert("u1", rule("turnover", "turnover_rate", 100.0)).await.unwrap();

        let transition = service
            .evaluate("u1", "turnover", &kpi("turnover_rate", 120.0))
            .await
            .unwrap();
        assert!(transition.is_change());

        let alert = service.acknowledge("u1", "turnover").await.unwrap();
        assert!(alert.is_read);
        assert_eq!(alert.state(), AlertState::Triggered);
    }

    #[tokio::test]
    async fn test_upsert_keeps_state_and_validates() {
        let service = service();
        service.upsert_alert("u1", rule("turnover", "turnover_rate", 100.0)).await.unwrap();
        service.evaluate_all("u1", &[kpi("turnover_rate", 120.0)]).await;

        let updated = service
            .upsert_alert("u1", rule("turnover", "turnover_rate", 150.0))
            .await
            .unwrap();
        assert_eq!(updated.state(), AlertState::Triggered);
        assert_eq!(service.list_alerts("u1").await.len(), 1);

        assert!(service.upsert_alert("u1", rule("", "turnover_rate", 1.0)).await.is_err());
        assert!(service.upsert_alert("u1", rule("x", "turnover_rate", f64::NAN)).await.is_err());
    }

    #[tokio::test]
    async fn test_alerts_are_owner_scoped() {
        let service = service();
        service.upsert_alert("u1", rule("turnover", "turnover_rate", 100.0)).await.unwrap();

        assert!(service.list_alerts("u2").await.is_empty());
        assert!(service.evaluate_all("u2", &[kpi("turnover_rate", 500.0)]).await.is_empty());
        assert!(matches!(
            service.remove_alert("u2", "turnover").await,
            Err(AnalyticsError::NotFound(_))
        ));

        service.remove_alert("u1", "turnover").await.unwrap();
        assert!(service.list_alerts("u1").await.is_empty());
    }
}
