// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process resource store.
//!
//! Mirrors the behaviours of the real API that the SDK depends on:
//! declared unique keys reject colliding creates with
//! `UniqueConstraintViolation`, and a create that links to a missing parent
//! row is rejected with `Unauthorized`. Parent links are returned as
//! `{"__id": n}` objects. Every call is recorded for inspection.

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tracing::debug;

use super::{Body, RemoteStore, require_filter};
use crate::error::{Result, SdkError};
use crate::query::Query;

/// Store operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Create,
    Update,
    List,
    GetById,
    Delete,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub op: StoreOp,
    pub resource: String,
}

#[derive(Debug, Default)]
struct Table {
    next_id: u64,
    rows: BTreeMap<u64, Body>,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, Table>,
    unique_keys: HashMap<String, Vec<Vec<String>>>,
    // resource -> [(field, parent resource)]
    parent_links: HashMap<String, Vec<(String, String)>>,
    injected: VecDeque<(StoreOp, SdkError)>,
    calls: Vec<StoreCall>,
}

impl State {
    fn record(&mut self, op: StoreOp, resource: &str) -> Result<()> {
        self.calls.push(StoreCall {
            op,
            resource: resource.to_string(),
        });
        if let Some(pos) = self.injected.iter().position(|(o, _)| *o == op) {
            if let Some((_, err)) = self.injected.remove(pos) {
                debug!(?op, resource, "Injected failure");
                return Err(err);
            }
        }
        Ok(())
    }

    fn output(&self, resource: &str, row: &Body) -> Value {
        let mut row = row.clone();
        if let Some(links) = self.parent_links.get(resource) {
            for (field, _) in links {
                if let Some(id) = row.get(field).and_then(Value::as_u64) {
                    row.insert(field.clone(), json!({ "__id": id }));
                }
            }
        }
        Value::Object(row)
    }

    fn check_parents(&self, resource: &str, body: &Body) -> Result<()> {
        let Some(links) = self.parent_links.get(resource) else {
            return Ok(());
        };
        for (field, parent) in links {
            let Some(value) = body.get(field) else {
                continue;
            };
            let exists = value.as_u64().is_some_and(|id| {
                self.tables
                    .get(parent)
                    .is_some_and(|t| t.rows.contains_key(&id))
            });
            if !exists {
                return Err(SdkError::Unauthorized(format!(
                    "not allowed to write {} for {} {}",
                    resource, parent, value
                )));
            }
        }
        Ok(())
    }

    fn check_unique(&self, resource: &str, candidate: &Body, skip_id: Option<u64>) -> Result<()> {
        let (Some(keys), Some(table)) = (self.unique_keys.get(resource), self.tables.get(resource))
        else {
            return Ok(());
        };
        for fields in keys {
            let collides = table.rows.iter().any(|(id, row)| {
                Some(*id) != skip_id
                    && fields
                        .iter()
                        .all(|f| row.get(f).is_some() && row.get(f) == candidate.get(f))
            });
            if collides {
                return Err(SdkError::UniqueConstraintViolation(format!(
                    "\"{}\" must be unique on ({})",
                    resource,
                    fields.join(", ")
                )));
            }
        }
        Ok(())
    }
}

/// In-memory [`RemoteStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a unique key over `fields` for `resource`.
    pub fn with_unique_key(mut self, resource: &str, fields: &[&str]) -> Self {
        self.state
            .get_mut()
            .unique_keys
            .entry(resource.to_string())
            .or_default()
            .push(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Declare that `resource.field` must reference an existing `parent` row.
    pub fn with_parent_link(mut self, resource: &str, field: &str, parent: &str) -> Self {
        self.state
            .get_mut()
            .parent_links
            .entry(resource.to_string())
            .or_default()
            .push((field.to_string(), parent.to_string()));
        self
    }

    /// Seed a row without recording a call. An `id` in `row` is kept.
    pub fn with_row(mut self, resource: &str, row: Value) -> Self {
        let state = self.state.get_mut();
        let table = state.tables.entry(resource.to_string()).or_default();
        let mut body = match row {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let id = match body.get("id").and_then(Value::as_u64) {
            Some(id) => id,
            None => table.next_id + 1,
        };
        table.next_id = table.next_id.max(id);
        body.insert("id".to_string(), json!(id));
        table.rows.insert(id, body);
        self
    }

    /// Make the next call of kind `op` fail with `err`.
    pub async fn fail_next(&self, op: StoreOp, err: SdkError) {
        self.state.lock().await.injected.push_back((op, err));
    }

    /// All calls so far, in order.
    pub async fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().await.calls.clone()
    }

    /// Number of calls of kind `op`.
    pub async fn call_count(&self, op: StoreOp) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.op == op)
            .count()
    }

    /// Raw rows of `resource`, as they would be listed.
    pub async fn rows(&self, resource: &str) -> Vec<Value> {
        let state = self.state.lock().await;
        state
            .tables
            .get(resource)
            .map(|t| t.rows.values().map(|r| state.output(resource, r)).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn create(&self, resource: &str, body: &Body) -> Result<Value> {
        let mut state = self.state.lock().await;
        state.record(StoreOp::Create, resource)?;
        state.check_parents(resource, body)?;
        state.check_unique(resource, body, None)?;

        let table = state.tables.entry(resource.to_string()).or_default();
        table.next_id += 1;
        let id = table.next_id;
        let mut row = body.clone();
        row.insert("id".to_string(), json!(id));
        table.rows.insert(id, row.clone());
        Ok(state.output(resource, &row))
    }

    async fn update(&self, resource: &str, query: &Query, body: &Body) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(StoreOp::Update, resource)?;
        require_filter(query, "update")?;

        let targets: Vec<(u64, Body)> = match state.tables.get(resource) {
            Some(table) => table
                .rows
                .iter()
                .filter(|(_, row)| {
                    let value = Value::Object((*row).clone());
                    query.filter.iter().all(|f| f.matches(&value))
                })
                .map(|(id, row)| {
                    let mut next = row.clone();
                    next.extend(body.clone());
                    (*id, next)
                })
                .collect(),
            None => Vec::new(),
        };

        for (id, row) in &targets {
            state.check_unique(resource, row, Some(*id))?;
        }
        if let Some(table) = state.tables.get_mut(resource) {
            for (id, row) in targets {
                table.rows.insert(id, row);
            }
        }
        Ok(())
    }

    async fn list(&self, resource: &str, query: &Query) -> Result<Vec<Value>> {
        let mut state = self.state.lock().await;
        state.record(StoreOp::List, resource)?;
        let rows: Vec<Value> = state
            .tables
            .get(resource)
            .map(|t| t.rows.values().map(|r| state.output(resource, r)).collect())
            .unwrap_or_default();
        Ok(query.apply(rows))
    }

    async fn get_by_id(&self, resource: &str, id: u64, query: &Query) -> Result<Option<Value>> {
        let mut state = self.state.lock().await;
        state.record(StoreOp::GetById, resource)?;
        let row = state
            .tables
            .get(resource)
            .and_then(|t| t.rows.get(&id))
            .map(|r| state.output(resource, r));
        Ok(row.and_then(|r| query.apply([r]).into_iter().next()))
    }

    async fn delete(&self, resource: &str, query: &Query) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(StoreOp::Delete, resource)?;
        require_filter(query, "delete")?;
        if let Some(table) = state.tables.get_mut(resource) {
            table.rows.retain(|_, row| {
                let value = Value::Object(row.clone());
                !query.filter.iter().all(|f| f.matches(&value))
            });
        }
        Ok(())
    }
}
