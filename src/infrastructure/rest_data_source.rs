// PostgREST data source implementation
use crate::application::data_source::DataSource;
use crate::domain::error::{AnalyticsError, AnalyticsResult};
use crate::domain::filters::AnalyticsFilters;
use crate::domain::metric::{DateScope, MetricSpec};
use crate::domain::record::{DataRow, Dataset};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde_json::{Map, Value};

type JsonRow = Map<String, Value>;

#[derive(Debug, Clone)]
pub struct RestDataSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    schema: Option<String>,
}

impl RestDataSource {
    pub fn new(base_url: String, api_key: String, schema: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            schema,
        }
    }

    fn build_query_url(&self, filters: &AnalyticsFilters, spec: &MetricSpec) -> String {
        let date_column = spec.dataset.date_column();
        let mut params = vec![format!("company_id=eq.{}", urlencoding::encode(filters.company()))];

        if spec.date_scope == DateScope::Within {
            params.push(format!("{}=gte.{}", date_column, filters.from));
        }
        params.push(format!("{}=lte.{}", date_column, filters.to));

        if let Some(department) = &filters.department_id {
            params.push(format!("department_id=eq.{}", urlencoding::encode(department)));
        }
        if let Some(cost_center) = &filters.cost_center_id {
            params.push(format!("cost_center_id=eq.{}", urlencoding::encode(cost_center)));
        }
        for condition in &spec.conditions {
            params.push(format!(
                "{}=eq.{}",
                urlencoding::encode(&condition.field),
                urlencoding::encode(&condition.value)
            ));
        }

        format!("{}/{}?{}", self.base_url, spec.dataset.table(), params.join("&"))
    }

    async fn execute_query(&self, url: &str) -> AnalyticsResult<Vec<JsonRow>> {
        let mut request = self
            .client
            .get(url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "application/json");
        if let Some(schema) = &self.schema {
            request = request.header("Accept-Profile", schema);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AnalyticsError::DataSourceUnavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AnalyticsError::Unauthorized(format!("data source answered {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalyticsError::DataSourceUnavailable(format!(
                "query failed with status {}: {}",
                status, body
            )));
        }

        response
            .json::<Vec<JsonRow>>()
            .await
            .map_err(|e| AnalyticsError::DataSourceUnavailable(format!("invalid response: {}", e)))
    }
}

#[async_trait]
impl DataSource for RestDataSource {
    async fn query(&self, filters: &AnalyticsFilters, spec: &MetricSpec) -> AnalyticsResult<Vec<DataRow>> {
        if filters.company().trim().is_empty() {
            return Err(AnalyticsError::Unauthorized(
                "queries must be scoped to a company".to_string(),
            ));
        }

        let url = self.build_query_url(filters, spec);
        tracing::debug!("Executing data source query: {}", url);
        let raw = self.execute_query(&url).await?;
        let total = raw.len();

        let rows: Vec<DataRow> = raw
            .iter()
            .filter_map(|row| map_row(spec.dataset, row))
            .filter(|row| spec.matches(row, filters))
            .collect();

        if rows.len() < total {
            tracing::warn!(
                "Dropped {} of {} rows from {} outside the requested scope",
                total - rows.len(),
                total,
                spec.dataset.table()
            );
        }
        Ok(rows)
    }
}

/// Strings become dimensions and numbers become measures. Rows without a
/// company or a parseable reference date are skipped.
fn map_row(dataset: Dataset, row: &JsonRow) -> Option<DataRow> {
    let company_id = row.get("company_id")?.as_str()?;
    let occurred_on = row.get(dataset.date_column()).and_then(parse_date)?;

    let mut mapped = DataRow::new(dataset, company_id, occurred_on);
    for (field, value) in row {
        match (field.as_str(), value) {
            ("company_id", _) | (_, Value::Null) => {}
            ("department_id", Value::String(id)) => mapped.department_id = Some(id.clone()),
            ("cost_center_id", Value::String(id)) => mapped.cost_center_id = Some(id.clone()),
            (_, Value::String(text)) => {
                mapped.dimensions.insert(field.clone(), text.clone());
            }
            (_, Value::Bool(flag)) => {
                mapped.dimensions.insert(field.clone(), flag.to_string());
            }
            (_, Value::Number(number)) => {
                if let Some(value) = number.as_f64() {
                    mapped.measures.insert(field.clone(), value);
                }
            }
            _ => {}
        }
    }
    Some(mapped)
}

/// Accepts plain dates and timestamps.
fn parse_date(value: &Value) -> Option<NaiveDate> {
    let text = value.as_str()?;
    NaiveDate::parse_from_str(text.get(..10)?, "%Y-%m-%d").ok()
}
