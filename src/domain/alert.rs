// Threshold alert rules and the evaluator state machine
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "==")]
    Eq,
}

impl Comparator {
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::Gt => value > threshold,
            Comparator::Gte => value >= threshold,
            Comparator::Lt => value < threshold,
            Comparator::Lte => value <= threshold,
            Comparator::Eq => (value - threshold).abs() <= f64::EPSILON * threshold.abs().max(1.0),
        }
    }

    /// How far `value` sits on the clear side of `threshold`.
    fn clearance(&self, value: f64, threshold: f64) -> f64 {
        match self {
            Comparator::Gt | Comparator::Gte => threshold - value,
            Comparator::Lt | Comparator::Lte => value - threshold,
            Comparator::Eq => (value - threshold).abs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Normal,
    Triggered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Client-supplied rule; carries no state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub metric: String,
    pub comparator: Comparator,
    pub threshold: f64,
    #[serde(default)]
    pub hysteresis: f64,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default)]
    pub title: Option<String>,
}

fn default_severity() -> Severity {
    Severity::Medium
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardAlert {
    pub id: String,
    pub owner_id: String,
    pub metric: String,
    pub title: String,
    pub comparator: Comparator,
    pub threshold: f64,
    pub hysteresis: f64,
    pub severity: Severity,
    pub is_read: bool,
    state: AlertState,
    last_value: Option<f64>,
    last_transition_at: Option<DateTime<Utc>>,
}

impl DashboardAlert {
    pub fn new(owner_id: &str, rule: AlertRule) -> Self {
        let title = rule
            .title
            .unwrap_or_else(|| format!("{} {} {}", rule.metric, symbol(rule.comparator), rule.threshold));
        Self {
            id: rule.id,
            owner_id: owner_id.to_string(),
            metric: rule.metric,
            title,
            comparator: rule.comparator,
            threshold: rule.threshold,
            hysteresis: rule.hysteresis.abs(),
            severity: rule.severity,
            is_read: true,
            state: AlertState::Normal,
            last_value: None,
            last_transition_at: None,
        }
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    pub fn last_value(&self) -> Option<f64> {
        self.last_value
    }

    /// Replace the rule while keeping the evaluated state.
    pub fn update_rule(&mut self, rule: AlertRule) {
        let replaced = DashboardAlert::new(&self.owner_id, rule);
        *self = DashboardAlert {
            state: self.state,
            last_value: self.last_value,
            last_transition_at: self.last_transition_at,
            is_read: self.is_read,
            ..replaced
        };
    }

    pub(crate) fn apply(&mut self, transition: &AlertTransition) {
        self.last_value = Some(transition.value);
        if transition.is_change() {
            self.state = transition.to;
            self.last_transition_at = Some(transition.at);
            // A fresh trigger needs attention again
            self.is_read = transition.to == AlertState::Normal;
        }
    }
}

fn symbol(comparator: Comparator) -> &'static str {
    match comparator {
        Comparator::Gt => ">",
        Comparator::Gte => ">=",
        Comparator::Lt => "<",
        Comparator::Lte => "<=",
        Comparator::Eq => "==",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertTransition {
    pub alert_id: String,
    pub from: AlertState,
    pub to: AlertState,
    pub value: f64,
    pub at: DateTime<Utc>,
}

impl AlertTransition {
    pub fn is_change(&self) -> bool {
        self.from != self.to
    }
}

/// Pure state-machine step for one rule and one observed value.
///
/// Normal -> Triggered as soon as the comparator holds. Triggered -> Normal
/// only once the comparator no longer holds and the value has moved at least
/// `hysteresis` past the threshold; anything in between keeps the alert
/// Triggered.
pub fn evaluate(alert: &DashboardAlert, value: f64) -> AlertTransition {
    let from = alert.state;
    let to = match from {
        AlertState::Normal if alert.comparator.holds(value, alert.threshold) => AlertState::Triggered,
        AlertState::Normal => AlertState::Normal,
        AlertState::Triggered => {
            let cleared = !alert.comparator.holds(value, alert.threshold)
                && alert.comparator.clearance(value, alert.threshold) >= alert.hysteresis;
            if cleared {
                AlertState::Normal
            } else {
                AlertState::Triggered
            }
        }
    };

    AlertTransition {
        alert_id: alert.id.clone(),
        from,
        to,
        value,
        at: Utc::now(),
    }
}

/// Published for every state-changing transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub owner_id: String,
    pub metric: String,
    pub title: String,
    pub severity: Severity,
    pub transition: AlertTransition,
}
