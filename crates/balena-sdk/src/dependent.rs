// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Key/value records hanging off a parent entity.
//!
//! Tags, config variables, environment variables and build variables share
//! one CRUD surface, parameterised by a [`DependentResourceDescriptor`]. At
//! most one record exists per `(parent, key)`; writes go through
//! [`upsert`](crate::upsert::upsert) on that pair.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::{debug, instrument, warn};

use crate::error::{Result, SdkError};
use crate::query::{Filter, OrderBy, Query};
use crate::resolver::{EntityResolver, ParentRef, record_id};
use crate::store::{Body, RemoteStore};
use crate::upsert::upsert;

/// Static description of one kind of dependent resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentResourceDescriptor {
    /// Resource holding the records, e.g. `device_tag`.
    pub resource_name: &'static str,
    /// Field holding the key, e.g. `tag_key`.
    pub resource_key_field: &'static str,
    /// Link field naming the parent, e.g. `device`.
    pub parent_resource_name: &'static str,
}

impl DependentResourceDescriptor {
    pub const fn new(
        resource_name: &'static str,
        resource_key_field: &'static str,
        parent_resource_name: &'static str,
    ) -> Self {
        Self {
            resource_name,
            resource_key_field,
            parent_resource_name,
        }
    }

    pub const APPLICATION_TAG: Self = Self::new("application_tag", "tag_key", "application");
    pub const APPLICATION_CONFIG_VARIABLE: Self =
        Self::new("application_config_variable", "name", "application");
    pub const APPLICATION_ENVIRONMENT_VARIABLE: Self =
        Self::new("application_environment_variable", "name", "application");
    pub const BUILD_ENVIRONMENT_VARIABLE: Self =
        Self::new("build_environment_variable", "name", "application");
    pub const DEVICE_TAG: Self = Self::new("device_tag", "tag_key", "device");
    pub const DEVICE_CONFIG_VARIABLE: Self =
        Self::new("device_config_variable", "name", "device");
    pub const DEVICE_ENVIRONMENT_VARIABLE: Self =
        Self::new("device_environment_variable", "name", "device");
    pub const RELEASE_TAG: Self = Self::new("release_tag", "tag_key", "release");
}

/// A key/value record as returned by listings.
#[derive(Debug, Clone, PartialEq)]
pub struct DependentRecord {
    pub id: u64,
    /// Parent id, when the parent link was part of the response.
    pub parent_id: Option<u64>,
    pub key: String,
    pub value: String,
    /// Every other field, expansions included.
    pub extra: Map<String, Value>,
}

impl DependentRecord {
    /// Parse a raw record using the descriptor's field names.
    pub fn from_value(descriptor: &DependentResourceDescriptor, value: Value) -> Result<Self> {
        let id = record_id(&value, descriptor.resource_name)?;
        let Value::Object(mut map) = value else {
            return Err(SdkError::UnexpectedResponse(format!(
                "{} record is not an object",
                descriptor.resource_name
            )));
        };
        map.remove("id");

        let key = match map.remove(descriptor.resource_key_field) {
            Some(Value::String(key)) => key,
            other => {
                return Err(SdkError::UnexpectedResponse(format!(
                    "{} record has no string {}: {:?}",
                    descriptor.resource_name, descriptor.resource_key_field, other
                )));
            }
        };
        let value = match map.remove("value") {
            Some(Value::String(value)) => value,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let parent_id = map
            .get(descriptor.parent_resource_name)
            .and_then(link_id);

        Ok(Self {
            id,
            parent_id,
            key,
            value,
            extra: map,
        })
    }
}

/// Id out of a link in any of the shapes the API uses.
fn link_id(link: &Value) -> Option<u64> {
    match link {
        Value::Number(n) => n.as_u64(),
        Value::Object(map) => map
            .get("__id")
            .or_else(|| map.get("id"))
            .and_then(Value::as_u64),
        Value::Array(items) => match items.as_slice() {
            [single] => link_id(single),
            _ => None,
        },
        _ => None,
    }
}

/// CRUD over one kind of dependent resource.
#[derive(Clone)]
pub struct DependentResource {
    descriptor: DependentResourceDescriptor,
    store: Arc<dyn RemoteStore>,
    parent: Arc<EntityResolver>,
}

impl std::fmt::Debug for DependentResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependentResource")
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

impl DependentResource {
    /// `parent` resolves references for `descriptor.parent_resource_name`.
    pub fn new(
        descriptor: DependentResourceDescriptor,
        store: Arc<dyn RemoteStore>,
        parent: Arc<EntityResolver>,
    ) -> Self {
        Self {
            descriptor,
            store,
            parent,
        }
    }

    pub fn descriptor(&self) -> &DependentResourceDescriptor {
        &self.descriptor
    }

    fn parent_filter(&self, parent_id: u64) -> Filter {
        Filter::eq(self.descriptor.parent_resource_name, parent_id)
    }

    fn key_filter(&self, key: &str) -> Filter {
        Filter::eq(self.descriptor.resource_key_field, key)
    }

    async fn fetch(&self, base: Query, options: Query) -> Result<Vec<DependentRecord>> {
        let query = base
            .with_order_by(OrderBy::asc(self.descriptor.resource_key_field))
            .merge(options);
        self.store
            .list(self.descriptor.resource_name, &query)
            .await?
            .into_iter()
            .map(|row| DependentRecord::from_value(&self.descriptor, row))
            .collect()
    }

    /// Every record visible to the caller, ordered by key.
    #[instrument(skip_all, fields(resource = self.descriptor.resource_name))]
    pub async fn get_all(&self, options: Query) -> Result<Vec<DependentRecord>> {
        self.fetch(Query::new(), options).await
    }

    /// Records of one parent, ordered by key. Caller filters are ANDed with
    /// the parent scope.
    #[instrument(skip_all, fields(resource = self.descriptor.resource_name, parent = %parent))]
    pub async fn get_all_by_parent(
        &self,
        parent: &ParentRef,
        options: Query,
    ) -> Result<Vec<DependentRecord>> {
        let parent_id = self.parent.resolve(parent).await?;
        let base = Query::new().with_filter(self.parent_filter(parent_id));
        self.fetch(base, options).await
    }

    /// Value stored under `key`, or `None` when no record exists.
    #[instrument(skip_all, fields(resource = self.descriptor.resource_name, parent = %parent, key = %key))]
    pub async fn get(&self, parent: &ParentRef, key: &str) -> Result<Option<String>> {
        let parent_id = self.parent.resolve(parent).await?;
        let query = Query::new()
            .with_filter(self.parent_filter(parent_id))
            .with_filter(self.key_filter(key))
            .with_select(["value"]);
        let rows = self.store.list(self.descriptor.resource_name, &query).await?;

        match rows.as_slice() {
            [] => Ok(None),
            [row] => Ok(row.get("value").map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })),
            many => {
                warn!(count = many.len(), "Key matched several records");
                Err(SdkError::DuplicateRecord {
                    resource: self.descriptor.resource_name.to_string(),
                    key: key.to_string(),
                    count: many.len(),
                })
            }
        }
    }

    /// Create or overwrite the value under `key`.
    ///
    /// An id parent is used without a lookup. If the store then answers
    /// `Unauthorized`, the parent's existence is checked so that a missing
    /// parent surfaces as `NotFound` instead.
    #[instrument(skip_all, fields(resource = self.descriptor.resource_name, parent = %parent, key = %key))]
    pub async fn set(&self, parent: &ParentRef, key: &str, value: impl ToString) -> Result<()> {
        let value = value.to_string();
        let parent_id = match parent {
            ParentRef::Id(id) => *id,
            ParentRef::Key(_) => self.parent.resolve(parent).await?,
        };

        let mut body = Body::new();
        body.insert(
            self.descriptor.parent_resource_name.to_string(),
            json!(parent_id),
        );
        body.insert(self.descriptor.resource_key_field.to_string(), json!(key));
        body.insert("value".to_string(), json!(value));

        let natural_key = [
            self.descriptor.parent_resource_name,
            self.descriptor.resource_key_field,
        ];
        match upsert(
            self.store.as_ref(),
            self.descriptor.resource_name,
            &body,
            &natural_key,
            &Query::new(),
        )
        .await
        {
            Ok(outcome) => {
                debug!(?outcome, "Value stored");
                Ok(())
            }
            Err(err) if err.is_unauthorized() && parent.is_id() => {
                // The id was never looked up; a missing parent reads as 401.
                self.parent.ensure_exists(parent_id).await?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Delete the record under `key`. Deleting an absent key succeeds.
    #[instrument(skip_all, fields(resource = self.descriptor.resource_name, parent = %parent, key = %key))]
    pub async fn remove(&self, parent: &ParentRef, key: &str) -> Result<()> {
        let parent_id = self.parent.resolve(parent).await?;
        let query = Query::new()
            .with_filter(self.parent_filter(parent_id))
            .with_filter(self.key_filter(key));
        self.store.delete(self.descriptor.resource_name, &query).await
    }
}
