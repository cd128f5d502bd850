use std::collections::HashMap;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::{Query, Store};

/// In-process `Store` used for local runs and tests. Each table keeps
/// insertion order; every write holds the table lock, so `update_where` is
/// a true compare-and-swap.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Value> = tables
            .get(table)
            .map(|rows| rows.iter().filter(|r| query.matches(r)).cloned().collect())
            .unwrap_or_default();

        query.sort(&mut rows);
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, mut row: Value) -> Result<Value> {
        let obj = row
            .as_object_mut()
            .ok_or_else(|| anyhow!("Rows must be JSON objects"))?;

        let now = Utc::now().to_rfc3339();
        obj.entry("id").or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        obj.entry("created_at").or_insert_with(|| Value::String(now.clone()));
        obj.entry("updated_at").or_insert_with(|| Value::String(now));

        let mut tables = self.tables.write().await;
        tables.entry(table.to_string()).or_default().push(row.clone());
        Ok(row)
    }

    async fn update_where(&self, table: &str, id: &str, guard: &Query, fields: Value) -> Result<Option<Value>> {
        let fields = match fields {
            Value::Object(map) => map,
            _ => return Err(anyhow!("Update fields must be a JSON object")),
        };

        let mut tables = self.tables.write().await;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(None);
        };

        let target = rows
            .iter_mut()
            .find(|r| r.get("id").and_then(Value::as_str) == Some(id) && guard.matches(r));

        match target {
            Some(row) => {
                if let Some(obj) = row.as_object_mut() {
                    for (key, value) in fields {
                        obj.insert(key, value);
                    }
                    obj.insert("updated_at".to_string(), Value::String(Utc::now().to_rfc3339()));
                }
                Ok(Some(row.clone()))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_assigns_id_and_find_filters() {
        let store = MemoryStore::new();
        let row = store.insert("doctors", json!({"clinic_id": "c1", "name": "A"})).await.unwrap();
        store.insert("doctors", json!({"clinic_id": "c2", "name": "B"})).await.unwrap();

        assert!(row["id"].as_str().is_some());
        let found = store.find("doctors", &Query::new().eq("clinic_id", "c1")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["name"], "A");
    }

    #[tokio::test]
    async fn update_where_respects_guard() {
        let store = MemoryStore::new();
        let row = store.insert("appointments", json!({"status": "booked"})).await.unwrap();
        let id = row["id"].as_str().unwrap();

        let stale = store
            .update_where("appointments", id, &Query::new().eq("status", "in-queue"), json!({"status": "cancelled"}))
            .await
            .unwrap();
        assert!(stale.is_none());

        let updated = store
            .update_where("appointments", id, &Query::new().eq("status", "booked"), json!({"status": "in-queue"}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["status"], "in-queue");
    }

    #[tokio::test]
    async fn find_one_on_missing_table_is_none() {
        let store = MemoryStore::new();
        assert!(store.find_one("clinics", &Query::new()).await.unwrap().is_none());
        assert!(store.update("clinics", "nope", json!({"a": 1})).await.unwrap().is_none());
    }
}
