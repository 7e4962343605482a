// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Create-or-update keyed by a natural key.
//!
//! The store only offers separate create and update primitives. [`upsert`]
//! attempts the create first; when the store reports a unique-key collision it
//! retries as an update filtered on the natural-key values, sending the
//! remaining fields as the patch. Two calls with the same body therefore leave
//! one record. The pair of requests is not atomic: concurrent writers on the
//! same key end up with whichever update lands last.

use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{Result, SdkError};
use crate::query::{Filter, Query};
use crate::store::{Body, RemoteStore};

/// What the upsert ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// The create went through; carries the stored record.
    Created(Value),
    /// A record with the same natural key existed and was patched.
    Updated,
}

/// Check the parameters without touching the store.
pub fn validate(body: &Body, natural_key: &[&str], options: &Query) -> Result<()> {
    if natural_key.is_empty() {
        return Err(SdkError::invalid_parameter(
            "natural_key",
            "at least one natural key field is required",
        ));
    }
    if options.has_filter() {
        return Err(SdkError::invalid_parameter(
            "options.filter",
            "the filter is derived from the natural key and cannot be supplied",
        ));
    }
    if body.is_empty() {
        return Err(SdkError::invalid_parameter("body", "a body is required"));
    }
    if let Some(missing) = natural_key.iter().find(|f| !body.contains_key(**f)) {
        return Err(SdkError::invalid_parameter(
            *missing,
            "natural key field is missing from the body",
        ));
    }
    Ok(())
}

/// Create `body` in `resource`, or update the record sharing its natural key.
///
/// `options` is applied to the fallback update and may not carry a filter.
#[instrument(skip(store, body, options))]
pub async fn upsert(
    store: &dyn RemoteStore,
    resource: &str,
    body: &Body,
    natural_key: &[&str],
    options: &Query,
) -> Result<UpsertOutcome> {
    validate(body, natural_key, options)?;

    match store.create(resource, body).await {
        Ok(record) => Ok(UpsertOutcome::Created(record)),
        Err(SdkError::UniqueConstraintViolation(reason)) => {
            debug!(%reason, "Create collided, falling back to update");

            let mut filter = Query::new();
            let mut patch = body.clone();
            for field in natural_key {
                if let Some(value) = patch.remove(*field) {
                    filter = filter.with_filter(Filter::Eq(field.to_string(), value));
                }
            }

            store
                .update(resource, &options.clone().merge(filter), &patch)
                .await?;
            Ok(UpsertOutcome::Updated)
        }
        Err(err) => Err(err),
    }
}
