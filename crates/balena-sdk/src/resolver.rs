// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Turning user-supplied references into canonical ids.
//!
//! Public methods accept either a numeric id or a string (name, slug, uuid or
//! commit prefix). Ids pass through untouched with no request; strings are
//! looked up and must match exactly one row.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{Result, SdkError};
use crate::query::{Filter, Query};
use crate::store::RemoteStore;

/// A reference to a top-level entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParentRef {
    /// Canonical numeric id.
    Id(u64),
    /// Name, slug, uuid or commit (prefix).
    Key(String),
}

impl ParentRef {
    /// Whether this reference is already an id. Pure, no lookup.
    pub fn is_id(&self) -> bool {
        matches!(self, ParentRef::Id(_))
    }

    pub fn as_id(&self) -> Option<u64> {
        match self {
            ParentRef::Id(id) => Some(*id),
            ParentRef::Key(_) => None,
        }
    }
}

impl fmt::Display for ParentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParentRef::Id(id) => write!(f, "{}", id),
            ParentRef::Key(key) => f.write_str(key),
        }
    }
}

impl From<u64> for ParentRef {
    fn from(id: u64) -> Self {
        ParentRef::Id(id)
    }
}

// A string stays a key even when it is all digits: device uuids can be.
impl From<&str> for ParentRef {
    fn from(key: &str) -> Self {
        ParentRef::Key(key.to_string())
    }
}

impl From<String> for ParentRef {
    fn from(key: String) -> Self {
        ParentRef::Key(key)
    }
}

impl From<&String> for ParentRef {
    fn from(key: &String) -> Self {
        ParentRef::Key(key.clone())
    }
}

impl From<&ParentRef> for ParentRef {
    fn from(reference: &ParentRef) -> Self {
        reference.clone()
    }
}

/// How a string reference is matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Case-insensitive exact match on either field.
    NameOrSlug {
        name_field: &'static str,
        slug_field: &'static str,
    },
    /// Exact match when the key has one of the full lengths, prefix match otherwise.
    Prefix {
        field: &'static str,
        full_lengths: &'static [usize],
    },
}

impl Lookup {
    fn filter(&self, key: &str) -> Filter {
        match self {
            Lookup::NameOrSlug {
                name_field,
                slug_field,
            } => Filter::Or(vec![
                Filter::eq_ignore_case(*name_field, key),
                Filter::eq_ignore_case(*slug_field, key),
            ]),
            Lookup::Prefix {
                field,
                full_lengths,
            } => {
                if full_lengths.contains(&key.len()) {
                    Filter::eq(*field, key)
                } else {
                    Filter::starts_with(*field, key)
                }
            }
        }
    }
}

/// Resolves references for one resource.
#[derive(Clone)]
pub struct EntityResolver {
    store: Arc<dyn RemoteStore>,
    resource: String,
    lookup: Lookup,
}

impl fmt::Debug for EntityResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityResolver")
            .field("resource", &self.resource)
            .field("lookup", &self.lookup)
            .finish()
    }
}

impl EntityResolver {
    pub fn new(store: Arc<dyn RemoteStore>, resource: impl Into<String>, lookup: Lookup) -> Self {
        Self {
            store,
            resource: resource.into(),
            lookup,
        }
    }

    /// Applications, by name or slug.
    pub fn application(store: Arc<dyn RemoteStore>) -> Self {
        Self::new(
            store,
            "application",
            Lookup::NameOrSlug {
                name_field: "app_name",
                slug_field: "slug",
            },
        )
    }

    /// Devices, by uuid or uuid prefix.
    pub fn device(store: Arc<dyn RemoteStore>) -> Self {
        Self::new(
            store,
            "device",
            Lookup::Prefix {
                field: "uuid",
                full_lengths: &[32, 62],
            },
        )
    }

    /// Releases, by commit or commit prefix.
    pub fn release(store: Arc<dyn RemoteStore>) -> Self {
        Self::new(
            store,
            "release",
            Lookup::Prefix {
                field: "commit",
                full_lengths: &[32, 40],
            },
        )
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Resolve to an id. Ids are returned as-is without checking existence.
    #[instrument(skip_all, fields(resource = %self.resource, reference = %reference))]
    pub async fn resolve(&self, reference: &ParentRef) -> Result<u64> {
        let key = match reference {
            ParentRef::Id(id) => return Ok(*id),
            ParentRef::Key(key) => key.trim(),
        };
        if key.is_empty() {
            return Err(SdkError::not_found(&self.resource, reference));
        }

        // Two rows are enough to tell ambiguity apart from a unique match.
        let query = Query::new()
            .with_filter(self.lookup.filter(key))
            .with_select(["id"])
            .with_top(2);
        let rows = self.store.list(&self.resource, &query).await?;

        match rows.as_slice() {
            [] => Err(SdkError::not_found(&self.resource, reference)),
            [row] => {
                let id = record_id(row, &self.resource)?;
                debug!(id, "Resolved reference");
                Ok(id)
            }
            _ => Err(SdkError::AmbiguousReference {
                resource: self.resource.clone(),
                reference: reference.to_string(),
            }),
        }
    }

    /// Fail with `NotFound` unless a row with `id` exists.
    #[instrument(skip(self), fields(resource = %self.resource))]
    pub async fn ensure_exists(&self, id: u64) -> Result<()> {
        let query = Query::new().with_select(["id"]);
        match self.store.get_by_id(&self.resource, id, &query).await? {
            Some(_) => Ok(()),
            None => Err(SdkError::not_found(&self.resource, id)),
        }
    }
}

pub(crate) fn record_id(row: &Value, resource: &str) -> Result<u64> {
    row.get("id").and_then(Value::as_u64).ok_or_else(|| {
        SdkError::UnexpectedResponse(format!("{} record without a numeric id", resource))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreOp};
    use serde_json::json;

    #[test]
    fn test_parent_ref_conversions() {
        assert!(ParentRef::from(5u64).is_id());
        assert!(!ParentRef::from("12345").is_id());
        assert_eq!(ParentRef::from("abc").as_id(), None);
        assert_eq!(ParentRef::from(9u64).to_string(), "9");
    }

    #[test]
    fn test_prefix_lookup_uses_exact_match_for_full_uuids() {
        let lookup = Lookup::Prefix {
            field: "uuid",
            full_lengths: &[32, 62],
        };
        assert_eq!(lookup.filter("abc"), Filter::starts_with("uuid", "abc"));
        let full = "a".repeat(32);
        assert_eq!(lookup.filter(&full), Filter::eq("uuid", full.as_str()));
    }

    #[tokio::test]
    async fn test_numeric_reference_skips_lookup() {
        let store = Arc::new(MemoryStore::new());
        let resolver = EntityResolver::device(store.clone());
        assert_eq!(resolver.resolve(&ParentRef::Id(999)).await.unwrap(), 999);
        assert!(store.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_reference_fails_without_lookup() {
        let store = Arc::new(MemoryStore::new());
        let resolver = EntityResolver::application(store.clone());
        let err = resolver.resolve(&"  ".into()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_application_name_or_slug() {
        let store = Arc::new(
            MemoryStore::new()
                .with_row("application", json!({"id": 1, "app_name": "Fleet", "slug": "acme/fleet"}))
                .with_row("application", json!({"id": 2, "app_name": "Other", "slug": "acme/other"}))
                .with_row("application", json!({"id": 3, "app_name": "Dup", "slug": "acme/dup"}))
                .with_row("application", json!({"id": 4, "app_name": "dup", "slug": "beta/dup"})),
        );
        let resolver = EntityResolver::application(store);

        assert_eq!(resolver.resolve(&"fleet".into()).await.unwrap(), 1);
        assert_eq!(resolver.resolve(&"ACME/OTHER".into()).await.unwrap(), 2);

        match resolver.resolve(&"Dup".into()).await {
            Err(SdkError::AmbiguousReference { reference, .. }) => assert_eq!(reference, "Dup"),
            other => panic!("expected ambiguity, got {:?}", other),
        }
        match resolver.resolve(&"missing".into()).await {
            Err(SdkError::NotFound {
                resource,
                reference,
            }) => {
                assert_eq!(resource, "application");
                assert_eq!(reference, "missing");
            }
            other => panic!("expected not found, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_device_uuid_prefix() {
        let store = Arc::new(
            MemoryStore::new()
                .with_row("device", json!({"id": 10, "uuid": "abcd1234"}))
                .with_row("device", json!({"id": 11, "uuid": "abcd9999"})),
        );
        let resolver = EntityResolver::device(store.clone());

        assert_eq!(resolver.resolve(&"abcd1".into()).await.unwrap(), 10);
        assert!(matches!(
            resolver.resolve(&"abcd".into()).await,
            Err(SdkError::AmbiguousReference { .. })
        ));
        assert!(resolver.ensure_exists(11).await.is_ok());
        assert!(resolver.ensure_exists(12).await.unwrap_err().is_not_found());
        assert_eq!(store.call_count(StoreOp::GetById).await, 2);
    }
}
