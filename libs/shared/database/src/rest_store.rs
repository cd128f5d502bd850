use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header::{HeaderMap, HeaderValue}, Method};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;

use crate::store::{Filter, Query, Store};
use crate::supabase::SupabaseClient;

/// `Store` over the hosted PostgREST API.
pub struct RestStore {
    client: SupabaseClient,
}

impl RestStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: SupabaseClient::new(config),
        }
    }

    fn representation_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => urlencoding::encode(s).into_owned(),
        Value::Null => "null".to_string(),
        other => urlencoding::encode(&other.to_string()).into_owned(),
    }
}

fn render_filter(filter: &Filter) -> String {
    match filter {
        Filter::Eq(col, Value::Null) => format!("{}=is.null", col),
        Filter::Eq(col, v) => format!("{}=eq.{}", col, render_scalar(v)),
        Filter::Neq(col, Value::Null) => format!("{}=not.is.null", col),
        Filter::Neq(col, v) => format!("{}=neq.{}", col, render_scalar(v)),
        Filter::Gte(col, v) => format!("{}=gte.{}", col, render_scalar(v)),
        Filter::Lte(col, v) => format!("{}=lte.{}", col, render_scalar(v)),
        Filter::In(col, values) => {
            let items: Vec<String> = values
                .iter()
                .map(|v| match v {
                    Value::String(s) => format!("\"{}\"", urlencoding::encode(s)),
                    other => render_scalar(other),
                })
                .collect();
            format!("{}=in.({})", col, items.join(","))
        }
    }
}

/// PostgREST query string (without the leading `?`) for a `Query`.
pub fn to_query_string(query: &Query) -> String {
    let mut parts: Vec<String> = query.filters.iter().map(render_filter).collect();

    if !query.order.is_empty() {
        let order: Vec<String> = query
            .order
            .iter()
            .map(|o| format!("{}.{}", o.column, if o.ascending { "asc" } else { "desc" }))
            .collect();
        parts.push(format!("order={}", order.join(",")));
    }

    if let Some(limit) = query.limit {
        parts.push(format!("limit={}", limit));
    }

    parts.join("&")
}

fn table_path(table: &str, query: &Query) -> String {
    let qs = to_query_string(query);
    if qs.is_empty() {
        format!("/rest/v1/{}", table)
    } else {
        format!("/rest/v1/{}?{}", table, qs)
    }
}

#[async_trait]
impl Store for RestStore {
    async fn find(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        let path = table_path(table, query);
        debug!("Store find: {}", path);
        self.client.request(Method::GET, &path, None, None).await
    }

    async fn insert(&self, table: &str, mut row: Value) -> Result<Value> {
        let now = Utc::now().to_rfc3339();
        if let Some(obj) = row.as_object_mut() {
            obj.entry("id").or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
            obj.entry("created_at").or_insert_with(|| Value::String(now.clone()));
            obj.entry("updated_at").or_insert_with(|| Value::String(now));
        }

        let path = format!("/rest/v1/{}", table);
        let result: Vec<Value> = self.client.request_with_headers(
            Method::POST,
            &path,
            None,
            Some(row),
            Some(Self::representation_headers()),
        ).await?;

        result
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Insert into {} returned no representation", table))
    }

    async fn update_where(&self, table: &str, id: &str, guard: &Query, mut fields: Value) -> Result<Option<Value>> {
        if let Some(obj) = fields.as_object_mut() {
            obj.insert("updated_at".to_string(), Value::String(Utc::now().to_rfc3339()));
        }

        // The guard filters travel in the same PATCH, so the row only
        // changes when it still matches them.
        let scoped = Query {
            filters: std::iter::once(Filter::Eq("id".to_string(), Value::String(id.to_string())))
                .chain(guard.filters.iter().cloned())
                .collect(),
            order: Vec::new(),
            limit: None,
        };
        let path = table_path(table, &scoped);

        let result: Vec<Value> = self.client.request_with_headers(
            Method::PATCH,
            &path,
            None,
            Some(fields),
            Some(Self::representation_headers()),
        ).await?;

        Ok(result.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_postgrest_filters() {
        let query = Query::new()
            .eq("clinic_id", "c1")
            .neq("status", "cancelled")
            .in_list("status", ["in-queue", "in-consultation"])
            .order_by("token_number", true)
            .limit(5);

        assert_eq!(
            to_query_string(&query),
            "clinic_id=eq.c1&status=neq.cancelled&status=in.(\"in-queue\",\"in-consultation\")&order=token_number.asc&limit=5"
        );
    }

    #[test]
    fn encodes_values_and_nulls() {
        let query = Query::new().eq("name", "Alok Shukla").eq("deleted_at", Value::Null);
        assert_eq!(to_query_string(&query), "name=eq.Alok%20Shukla&deleted_at=is.null");
    }
}
