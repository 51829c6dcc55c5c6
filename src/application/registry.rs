// Closed registries of metric and chart producers
use crate::domain::chart::{Bucketing, ChartDefinition, ChartKind, MeasureBucket};
use crate::domain::metric::{Aggregation, Formula, MetricDefinition, MetricSpec, MetricUnit};
use crate::domain::record::Dataset;

/// Metric definitions in registration order; KPIs are reported in this order.
#[derive(Debug, Clone, Default)]
pub struct MetricRegistry {
    metrics: Vec<MetricDefinition>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let active_employees = || MetricSpec::up_to(Dataset::Employees).when("status", "active");
        let payroll = || MetricSpec::within(Dataset::PayrollCalculations);

        let mut registry = Self::new();
        registry.register(MetricDefinition::new(
            "headcount",
            "Active employees",
            MetricUnit::Count,
            Formula::aggregate(active_employees(), Aggregation::Count),
        ));
        registry.register(MetricDefinition::new(
            "payroll_cost",
            "Payroll cost",
            MetricUnit::Currency,
            Formula::aggregate(payroll(), Aggregation::sum("net_salary")),
        ));
        registry.register(MetricDefinition::new(
            "average_salary",
            "Average gross salary",
            MetricUnit::Currency,
            Formula::aggregate(payroll(), Aggregation::average("gross_salary")),
        ));
        registry.register(MetricDefinition::new(
            "completed_payrolls",
            "Processed payrolls",
            MetricUnit::Count,
            Formula::aggregate(payroll().when("status", "completed"), Aggregation::Count),
        ));
        registry.register(MetricDefinition::new(
            "pending_payrolls",
            "Pending payrolls",
            MetricUnit::Count,
            Formula::aggregate(payroll().when("status", "pending"), Aggregation::Count),
        ));
        registry.register(MetricDefinition::new(
            "turnover_rate",
            "Turnover rate",
            MetricUnit::Percentage,
            Formula::ratio(
                Formula::aggregate(MetricSpec::within(Dataset::Terminations), Aggregation::Count),
                Formula::aggregate(active_employees(), Aggregation::Count),
                100.0,
            ),
        ));
        registry.register(MetricDefinition::new(
            "absenteeism_rate",
            "Absenteeism rate",
            MetricUnit::Percentage,
            Formula::ratio(
                Formula::aggregate(MetricSpec::within(Dataset::Absences), Aggregation::sum("hours")),
                Formula::aggregate(
                    MetricSpec::within(Dataset::Timesheets),
                    Aggregation::sum("scheduled_hours"),
                ),
                100.0,
            ),
        ));
        registry
    }

    /// Adds a definition, replacing any previous one with the same name.
    pub fn register(&mut self, definition: MetricDefinition) {
        match self.metrics.iter_mut().find(|m| m.name == definition.name) {
            Some(existing) => *existing = definition,
            None => self.metrics.push(definition),
        }
    }

    pub fn get(&self, name: &str) -> Option<&MetricDefinition> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn metrics(&self) -> &[MetricDefinition] {
        &self.metrics
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChartRegistry {
    charts: Vec<ChartDefinition>,
}

impl ChartRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ChartDefinition {
            id: "payroll_trend".to_string(),
            title: "Payroll evolution".to_string(),
            kind: ChartKind::Line,
            unit: Some("BRL".to_string()),
            spec: MetricSpec::within(Dataset::PayrollCalculations),
            aggregation: Aggregation::sum("net_salary"),
            bucketing: Bucketing::Time { granularity: None },
        });
        registry.register(ChartDefinition {
            id: "department_distribution".to_string(),
            title: "Headcount by department".to_string(),
            kind: ChartKind::Pie,
            unit: None,
            spec: MetricSpec::up_to(Dataset::Employees).when("status", "active"),
            aggregation: Aggregation::Count,
            bucketing: Bucketing::Category {
                field: "department_id".to_string(),
                order: Vec::new(),
            },
        });
        registry.register(ChartDefinition {
            id: "cost_breakdown".to_string(),
            title: "Payroll cost breakdown".to_string(),
            kind: ChartKind::Bar,
            unit: Some("BRL".to_string()),
            spec: MetricSpec::within(Dataset::PayrollCalculations),
            aggregation: Aggregation::sum("net_salary"),
            bucketing: Bucketing::Measures {
                fields: vec![
                    measure("Earnings", "total_earnings"),
                    measure("Deductions", "total_deductions"),
                    measure("Gross salary", "gross_salary"),
                    measure("Net salary", "net_salary"),
                ],
            },
        });
        registry
    }

    pub fn register(&mut self, definition: ChartDefinition) {
        match self.charts.iter_mut().find(|c| c.id == definition.id) {
            Some(existing) => *existing = definition,
            None => self.charts.push(definition),
        }
    }

    pub fn get(&self, id: &str) -> Option<&ChartDefinition> {
        self.charts.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn charts(&self) -> &[ChartDefinition] {
        &self.charts
    }
}

fn measure(label: &str, field: &str) -> MeasureBucket {
    MeasureBucket {
        label: label.to_string(),
        field: field.to_string(),
    }
}
