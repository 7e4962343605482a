// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Remote resource store backends.
//!
//! This module provides different backends for resource operations:
//! - `pine`: the HTTP resource API (default)
//! - `memory`: an in-process store for tests and offline use

pub mod memory;
pub mod pine;

pub use memory::{MemoryStore, StoreCall, StoreOp};
pub use pine::PineStore;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{Result, SdkError};
use crate::query::Query;

/// JSON object body for create and update requests.
pub type Body = Map<String, Value>;

/// Backend trait for resource operations.
///
/// Implementations must report duplicate-key collisions as
/// [`SdkError::UniqueConstraintViolation`](crate::SdkError::UniqueConstraintViolation)
/// and rejected access as [`SdkError::Unauthorized`](crate::SdkError::Unauthorized);
/// the upsert protocol and dependent resources branch on both.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert a record and return it as stored.
    async fn create(&self, resource: &str, body: &Body) -> Result<Value>;

    /// Patch every record matching `query`'s filter. The filter is required.
    async fn update(&self, resource: &str, query: &Query, body: &Body) -> Result<()>;

    /// List records.
    async fn list(&self, resource: &str, query: &Query) -> Result<Vec<Value>>;

    /// Fetch one record by primary key.
    async fn get_by_id(&self, resource: &str, id: u64, query: &Query) -> Result<Option<Value>>;

    /// Delete every record matching `query`'s filter. The filter is required.
    async fn delete(&self, resource: &str, query: &Query) -> Result<()>;
}

/// Updates and deletes are never issued without a filter.
pub(crate) fn require_filter(query: &Query, op: &str) -> Result<()> {
    if query.has_filter() {
        Ok(())
    } else {
        Err(SdkError::invalid_parameter(
            "query.filter",
            format!("{} requires a filter", op),
        ))
    }
}
