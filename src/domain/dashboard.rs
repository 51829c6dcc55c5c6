// Dashboard layout and per-user preferences
use super::error::{AnalyticsError, AnalyticsResult};
use super::filters::AnalyticsFilters;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WidgetTarget {
    Kpi { metric: String },
    Chart { chart_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetPosition {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Widget {
    pub id: String,
    pub target: WidgetTarget,
    pub position: WidgetPosition,
}

impl Widget {
    pub fn kpi(id: &str, metric: &str, x: u32, y: u32) -> Self {
        Self {
            id: id.to_string(),
            target: WidgetTarget::Kpi {
                metric: metric.to_string(),
            },
            position: WidgetPosition { x, y, width: 1, height: 1 },
        }
    }

    pub fn chart(id: &str, chart_id: &str, x: u32, y: u32) -> Self {
        Self {
            id: id.to_string(),
            target: WidgetTarget::Chart {
                chart_id: chart_id.to_string(),
            },
            position: WidgetPosition { x, y, width: 2, height: 2 },
        }
    }
}

/// Id of the built-in layout served before an owner saves anything.
pub const DEFAULT_DASHBOARD_ID: &str = "overview";

/// Longest default filter window a user may pick, about ten years.
pub const MAX_RANGE_DAYS: u32 = 3660;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_dashboard_id")]
    pub id: String,
    pub owner_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub widgets: Vec<Widget>,
    #[serde(default)]
    pub is_default: bool,
    /// Visible to other users, read only.
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_dashboard_id() -> String {
    DEFAULT_DASHBOARD_ID.to_string()
}

impl DashboardConfig {
    /// Layout served to owners who never saved one.
    pub fn default_for(owner_id: &str) -> Self {
        Self {
            id: default_dashboard_id(),
            owner_id: owner_id.to_string(),
            name: "Payroll overview".to_string(),
            description: None,
            widgets: vec![
                Widget::kpi("headcount", "headcount", 0, 0),
                Widget::kpi("payroll-cost", "payroll_cost", 1, 0),
                Widget::kpi("turnover", "turnover_rate", 2, 0),
                Widget::kpi("absenteeism", "absenteeism_rate", 3, 0),
                Widget::chart("payroll-trend", "payroll_trend", 0, 1),
                Widget::chart("departments", "department_distribution", 2, 1),
            ],
            is_default: true,
            is_public: false,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn validate(&self) -> AnalyticsResult<()> {
        if self.id.trim().is_empty() {
            return Err(AnalyticsError::InvalidFilter("dashboard id is required".to_string()));
        }
        let mut seen = HashSet::new();
        for widget in &self.widgets {
            if !seen.insert(widget.id.as_str()) {
                return Err(AnalyticsError::DuplicateWidget(widget.id.clone()));
            }
        }
        Ok(())
    }

    /// The dashboard an owner lands on: the favorite, else the one flagged
    /// default, else the newest. `saved` is ordered newest first.
    pub fn select_active<'a>(saved: &'a [DashboardConfig], favorite: Option<&str>) -> Option<&'a DashboardConfig> {
        favorite
            .and_then(|id| saved.iter().find(|c| c.id == id))
            .or_else(|| saved.iter().find(|c| c.is_default))
            .or_else(|| saved.first())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AlertTriggered,
    AlertCleared,
    ReportSucceeded,
    ReportFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub owner_id: String,
    /// Length of the default filter window, ending today.
    pub default_range_days: u32,
    #[serde(default)]
    pub default_department_id: Option<String>,
    #[serde(default)]
    pub default_cost_center_id: Option<String>,
    #[serde(default)]
    pub favorite_dashboard_id: Option<String>,
    #[serde(default)]
    pub notifications: BTreeSet<NotificationKind>,
    pub theme: Theme,
    pub language: String,
    pub timezone: String,
}

impl UserPreferences {
    pub fn default_for(owner_id: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            default_range_days: 30,
            default_department_id: None,
            default_cost_center_id: None,
            favorite_dashboard_id: None,
            notifications: BTreeSet::from([NotificationKind::AlertTriggered, NotificationKind::ReportFailed]),
            theme: Theme::Light,
            language: "pt-BR".to_string(),
            timezone: "America/Sao_Paulo".to_string(),
        }
    }

    pub fn default_filters(&self, company_id: &str, today: NaiveDate) -> AnalyticsFilters {
        let back = u64::from(self.default_range_days.clamp(1, MAX_RANGE_DAYS) - 1);
        AnalyticsFilters {
            from: today.checked_sub_days(Days::new(back)).unwrap_or(NaiveDate::MIN),
            to: today,
            company_id: Some(company_id.to_string()),
            department_id: self.default_department_id.clone(),
            cost_center_id: self.default_cost_center_id.clone(),
        }
    }

    pub fn validate(&self) -> AnalyticsResult<()> {
        if !(1..=MAX_RANGE_DAYS).contains(&self.default_range_days) {
            return Err(AnalyticsError::InvalidFilter(format!(
                "default_range_days must be between 1 and {}",
                MAX_RANGE_DAYS
            )));
        }
        Ok(())
    }

    pub fn wants(&self, kind: NotificationKind) -> bool {
        self.notifications.contains(&kind)
    }
}
