// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-entity facades over the resolvers and dependent resources.

use std::sync::Arc;

use crate::dependent::{DependentResource, DependentResourceDescriptor};
use crate::error::Result;
use crate::resolver::{EntityResolver, ParentRef};
use crate::store::RemoteStore;

fn dependent(
    descriptor: DependentResourceDescriptor,
    store: &Arc<dyn RemoteStore>,
    resolver: &Arc<EntityResolver>,
) -> DependentResource {
    DependentResource::new(descriptor, Arc::clone(store), Arc::clone(resolver))
}

/// Applications and their tags and variables.
#[derive(Debug, Clone)]
pub struct ApplicationModel {
    resolver: Arc<EntityResolver>,
    tags: DependentResource,
    config_vars: DependentResource,
    env_vars: DependentResource,
    build_vars: DependentResource,
}

impl ApplicationModel {
    pub fn new(store: Arc<dyn RemoteStore>, resolver: Arc<EntityResolver>) -> Self {
        Self {
            tags: dependent(DependentResourceDescriptor::APPLICATION_TAG, &store, &resolver),
            config_vars: dependent(
                DependentResourceDescriptor::APPLICATION_CONFIG_VARIABLE,
                &store,
                &resolver,
            ),
            env_vars: dependent(
                DependentResourceDescriptor::APPLICATION_ENVIRONMENT_VARIABLE,
                &store,
                &resolver,
            ),
            build_vars: dependent(
                DependentResourceDescriptor::BUILD_ENVIRONMENT_VARIABLE,
                &store,
                &resolver,
            ),
            resolver,
        }
    }

    /// Id of an application given by id, name or slug.
    pub async fn get_id(&self, reference: impl Into<ParentRef>) -> Result<u64> {
        self.resolver.resolve(&reference.into()).await
    }

    pub fn tags(&self) -> &DependentResource {
        &self.tags
    }

    pub fn config_vars(&self) -> &DependentResource {
        &self.config_vars
    }

    pub fn env_vars(&self) -> &DependentResource {
        &self.env_vars
    }

    /// Variables applied at build time.
    pub fn build_vars(&self) -> &DependentResource {
        &self.build_vars
    }
}

/// Devices and their tags and variables.
#[derive(Debug, Clone)]
pub struct DeviceModel {
    resolver: Arc<EntityResolver>,
    tags: DependentResource,
    config_vars: DependentResource,
    env_vars: DependentResource,
}

impl DeviceModel {
    pub fn new(store: Arc<dyn RemoteStore>, resolver: Arc<EntityResolver>) -> Self {
        Self {
            tags: dependent(DependentResourceDescriptor::DEVICE_TAG, &store, &resolver),
            config_vars: dependent(
                DependentResourceDescriptor::DEVICE_CONFIG_VARIABLE,
                &store,
                &resolver,
            ),
            env_vars: dependent(
                DependentResourceDescriptor::DEVICE_ENVIRONMENT_VARIABLE,
                &store,
                &resolver,
            ),
            resolver,
        }
    }

    /// Id of a device given by id, uuid or uuid prefix.
    pub async fn get_id(&self, reference: impl Into<ParentRef>) -> Result<u64> {
        self.resolver.resolve(&reference.into()).await
    }

    pub fn tags(&self) -> &DependentResource {
        &self.tags
    }

    pub fn config_vars(&self) -> &DependentResource {
        &self.config_vars
    }

    pub fn env_vars(&self) -> &DependentResource {
        &self.env_vars
    }
}

/// Releases and their tags.
#[derive(Debug, Clone)]
pub struct ReleaseModel {
    resolver: Arc<EntityResolver>,
    tags: DependentResource,
}

impl ReleaseModel {
    pub fn new(store: Arc<dyn RemoteStore>, resolver: Arc<EntityResolver>) -> Self {
        Self {
            tags: dependent(DependentResourceDescriptor::RELEASE_TAG, &store, &resolver),
            resolver,
        }
    }

    /// Id of a release given by id, commit or commit prefix.
    pub async fn get_id(&self, reference: impl Into<ParentRef>) -> Result<u64> {
        self.resolver.resolve(&reference.into()).await
    }

    pub fn tags(&self) -> &DependentResource {
        &self.tags
    }
}
