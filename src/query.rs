//! Generic PostgREST access: filtered selects, writes, and named remote
//! procedures. Domain modules stay one delegated call thick on top of this.

use log::debug;
use reqwest::header::{AUTHORIZATION, CONTENT_RANGE};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::{ok_or_backend, SupabaseClient};
use crate::error::Result;

#[derive(Debug, Clone)]
struct Order {
    column: String,
    ascending: bool,
}

/// Builder for a single-table select. Filters are equality-only and
/// conjunctive; ordering is a single key.
#[derive(Debug, Clone)]
pub struct SelectQuery {
    table: String,
    columns: String,
    filters: Vec<(String, String)>,
    order: Option<Order>,
    limit: Option<u32>,
}

impl SelectQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: "*".into(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl ToString) -> Self {
        self.filters.push((column.into(), value.to_string()));
        self
    }

    pub fn order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// PostgREST query string: `select=`, `col=eq.val` per filter, `order=`,
    /// `limit=`.
    fn query_string(&self) -> String {
        let mut parts = vec![format!("select={}", urlencoding::encode(&self.columns))];
        for (column, value) in &self.filters {
            parts.push(format!("{column}=eq.{}", urlencoding::encode(value)));
        }
        if let Some(order) = &self.order {
            let dir = if order.ascending { "asc" } else { "desc" };
            parts.push(format!("order={}.{dir}", order.column));
        }
        if let Some(limit) = self.limit {
            parts.push(format!("limit={limit}"));
        }
        parts.join("&")
    }

    /// Runs the select. Zero matching rows is `Ok(vec![])`, never an error.
    pub async fn fetch<T: DeserializeOwned>(&self, client: &SupabaseClient) -> Result<Vec<T>> {
        let endpoint = format!("{}?{}", client.rest_url(&self.table), self.query_string());
        debug!("select {endpoint}");
        let token = client.bearer_token().await;
        let resp = client
            .http()
            .get(&endpoint)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await?;
        let resp = ok_or_backend(resp).await?;
        let body: Value = resp.json().await?;
        rows_from(body)
    }

    /// First matching row, if any.
    pub async fn fetch_optional<T: DeserializeOwned>(
        &self,
        client: &SupabaseClient,
    ) -> Result<Option<T>> {
        let mut rows = self.clone().limit(1).fetch::<T>(client).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }
}

/// PostgREST can answer `null` where no row shape applies; normalize to no
/// rows so callers always get a sequence.
fn rows_from<T: DeserializeOwned>(body: Value) -> Result<Vec<T>> {
    match body {
        Value::Null => Ok(Vec::new()),
        other => Ok(serde_json::from_value(other)?),
    }
}

/// Invokes a named Postgres function. The result shape is whatever the
/// function returns, handed back as raw JSON.
pub async fn rpc(client: &SupabaseClient, name: &str, params: Value) -> Result<Value> {
    let endpoint = client.rest_url(&format!("rpc/{name}"));
    debug!("rpc {name}");
    let token = client.bearer_token().await;
    let resp = client
        .http()
        .post(&endpoint)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .json(&params)
        .send()
        .await?;
    let resp = ok_or_backend(resp).await?;
    let text = resp.text().await?;
    if text.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

/// Inserts one row; the created representation is not requested back.
pub async fn insert(client: &SupabaseClient, table: &str, row: &Value) -> Result<()> {
    let token = client.bearer_token().await;
    let resp = client
        .http()
        .post(client.rest_url(table))
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .header("Prefer", "return=minimal")
        .json(row)
        .send()
        .await?;
    ok_or_backend(resp).await?;
    Ok(())
}

/// Patches every row matching a single equality filter.
pub async fn update_eq(
    client: &SupabaseClient,
    table: &str,
    column: &str,
    value: &str,
    patch: &Value,
) -> Result<()> {
    let endpoint = format!(
        "{}?{column}=eq.{}",
        client.rest_url(table),
        urlencoding::encode(value)
    );
    let token = client.bearer_token().await;
    let resp = client
        .http()
        .patch(&endpoint)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .header("Prefer", "return=minimal")
        .json(patch)
        .send()
        .await?;
    ok_or_backend(resp).await?;
    Ok(())
}

/// Exact row count for `column >= value`. Head request; no rows travel.
pub async fn count_gte(
    client: &SupabaseClient,
    table: &str,
    column: &str,
    value: &str,
) -> Result<u64> {
    let endpoint = format!(
        "{}?select=id&{column}=gte.{}",
        client.rest_url(table),
        urlencoding::encode(value)
    );
    let token = client.bearer_token().await;
    let resp = client
        .http()
        .head(&endpoint)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .header("Prefer", "count=exact")
        .send()
        .await?;
    let resp = ok_or_backend(resp).await?;
    let total = resp
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(content_range_total)
        .unwrap_or(0);
    Ok(total)
}

/// `Content-Range: 0-24/3573` or `*/0`; the total sits after the slash.
fn content_range_total(raw: &str) -> Option<u64> {
    raw.rsplit('/').next()?.parse().ok()
}
