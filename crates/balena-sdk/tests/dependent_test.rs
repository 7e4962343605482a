// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dependent resource tests over the in-memory store.

use std::sync::Arc;

use balena_sdk::{
    DependentResource, DependentResourceDescriptor, EntityResolver, Filter, MemoryStore,
    ParentRef, Query, SdkError, StoreOp,
};
use serde_json::json;

fn device_store() -> Arc<MemoryStore> {
    Arc::new(
        MemoryStore::new()
            .with_unique_key("device_tag", &["device", "tag_key"])
            .with_parent_link("device_tag", "device", "device")
            .with_row("device", json!({"id": 42, "uuid": "a1b2c3d4e5f60718"}))
            .with_row("device", json!({"id": 43, "uuid": "ffee00112233"})),
    )
}

fn device_tags(store: &Arc<MemoryStore>) -> DependentResource {
    let resolver = Arc::new(EntityResolver::device(store.clone()));
    DependentResource::new(
        DependentResourceDescriptor::DEVICE_TAG,
        store.clone(),
        resolver,
    )
}

#[tokio::test]
async fn test_set_twice_leaves_one_row() {
    let store = device_store();
    let tags = device_tags(&store);
    let device = ParentRef::Id(42);

    tags.set(&device, "ENV", "prod").await.unwrap();
    assert_eq!(store.call_count(StoreOp::Create).await, 1);
    assert_eq!(store.call_count(StoreOp::Update).await, 0);

    tags.set(&device, "ENV", "staging").await.unwrap();
    assert_eq!(store.call_count(StoreOp::Create).await, 2);
    assert_eq!(store.call_count(StoreOp::Update).await, 1);

    let rows = store.rows("device_tag").await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["device"], json!({"__id": 42}));
    assert_eq!(rows[0]["tag_key"], "ENV");
    assert_eq!(rows[0]["value"], "staging");

    assert_eq!(
        tags.get(&device, "ENV").await.unwrap().as_deref(),
        Some("staging")
    );
}

#[tokio::test]
async fn test_get_absent_key_is_none() {
    let store = device_store();
    let tags = device_tags(&store);
    assert_eq!(tags.get(&ParentRef::Id(42), "NOPE").await.unwrap(), None);
}

#[tokio::test]
async fn test_get_all_by_parent_keeps_parent_scope() {
    let store = Arc::new(
        MemoryStore::new()
            .with_row("device", json!({"id": 42, "uuid": "aaaa"}))
            .with_row("device", json!({"id": 43, "uuid": "bbbb"}))
            .with_row(
                "device_tag",
                json!({"device": 42, "tag_key": "B", "value": "1", "extra": 1}),
            )
            .with_row(
                "device_tag",
                json!({"device": 42, "tag_key": "A", "value": "2", "extra": 1}),
            )
            .with_row(
                "device_tag",
                json!({"device": 42, "tag_key": "C", "value": "3", "extra": 2}),
            )
            .with_row(
                "device_tag",
                json!({"device": 43, "tag_key": "A", "value": "4", "extra": 1}),
            ),
    );
    let tags = device_tags(&store);

    let records = tags
        .get_all_by_parent(
            &ParentRef::Id(42),
            Query::new().with_filter(Filter::eq("extra", 1)),
        )
        .await
        .unwrap();
    let keys: Vec<&str> = records.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["A", "B"]);
    assert!(records.iter().all(|r| r.parent_id == Some(42)));

    let all = tags.get_all(Query::new()).await.unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all[0].key, "A");
}

#[tokio::test]
async fn test_string_parent_is_resolved() {
    let store = device_store();
    let tags = device_tags(&store);

    tags.set(&"a1b2c3".into(), "ROLE", 7).await.unwrap();
    let rows = store.rows("device_tag").await;
    assert_eq!(rows[0]["device"], json!({"__id": 42}));
    assert_eq!(rows[0]["value"], "7");

    let err = tags.set(&"0000".into(), "ROLE", "x").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_missing_id_parent_surfaces_not_found() {
    let store = device_store();
    let tags = device_tags(&store);

    match tags.set(&ParentRef::Id(999), "ENV", "prod").await {
        Err(SdkError::NotFound {
            resource,
            reference,
        }) => {
            assert_eq!(resource, "device");
            assert_eq!(reference, "999");
        }
        other => panic!("expected not found, got {:?}", other),
    }
    assert_eq!(store.call_count(StoreOp::GetById).await, 1);
}

#[tokio::test]
async fn test_unauthorized_on_existing_parent_is_kept() {
    let store = device_store();
    let tags = device_tags(&store);

    store
        .fail_next(StoreOp::Create, SdkError::Unauthorized("read only".to_string()))
        .await;
    let err = tags.set(&ParentRef::Id(42), "ENV", "prod").await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(store.call_count(StoreOp::GetById).await, 1);
}

#[tokio::test]
async fn test_unauthorized_on_resolved_parent_skips_existence_check() {
    let store = device_store();
    let tags = device_tags(&store);

    store
        .fail_next(StoreOp::Create, SdkError::Unauthorized("read only".to_string()))
        .await;
    let err = tags.set(&"ffee".into(), "ENV", "prod").await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(store.call_count(StoreOp::GetById).await, 0);
}

#[tokio::test]
async fn test_remove_is_scoped_and_idempotent() {
    let store = device_store();
    let tags = device_tags(&store);

    tags.set(&ParentRef::Id(42), "ENV", "prod").await.unwrap();
    tags.set(&ParentRef::Id(43), "ENV", "prod").await.unwrap();

    tags.remove(&ParentRef::Id(42), "ENV").await.unwrap();
    tags.remove(&ParentRef::Id(42), "ENV").await.unwrap();

    let rows = store.rows("device_tag").await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["device"], json!({"__id": 43}));
}

#[tokio::test]
async fn test_duplicate_records_are_reported() {
    let store = Arc::new(
        MemoryStore::new()
            .with_row("device_tag", json!({"device": 42, "tag_key": "ENV", "value": "a"}))
            .with_row("device_tag", json!({"device": 42, "tag_key": "ENV", "value": "b"})),
    );
    let tags = device_tags(&store);

    match tags.get(&ParentRef::Id(42), "ENV").await {
        Err(SdkError::DuplicateRecord { count, key, .. }) => {
            assert_eq!(count, 2);
            assert_eq!(key, "ENV");
        }
        other => panic!("expected duplicate, got {:?}", other),
    }
}

#[tokio::test]
async fn test_descriptors_use_their_own_fields() {
    let store = Arc::new(
        MemoryStore::new()
            .with_unique_key("application_environment_variable", &["application", "name"])
            .with_row("application", json!({"id": 5, "app_name": "Fleet", "slug": "acme/fleet"})),
    );
    let resolver = Arc::new(EntityResolver::application(store.clone()));
    let env_vars = DependentResource::new(
        DependentResourceDescriptor::APPLICATION_ENVIRONMENT_VARIABLE,
        store.clone(),
        resolver,
    );

    env_vars
        .set(&"acme/fleet".into(), "LOG_LEVEL", "debug")
        .await
        .unwrap();
    let rows = store.rows("application_environment_variable").await;
    assert_eq!(rows[0]["application"], 5);
    assert_eq!(rows[0]["name"], "LOG_LEVEL");

    assert_eq!(
        env_vars
            .get(&ParentRef::Id(5), "LOG_LEVEL")
            .await
            .unwrap()
            .as_deref(),
        Some("debug")
    );
}
