// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! BalenaSdk, the composition root.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::auth::Auth;
use crate::config::SdkConfig;
use crate::error::Result;
use crate::memoize::MemoizeRegistry;
use crate::models::{ApplicationModel, DeviceModel, ReleaseModel};
use crate::os::{OsModel, VersionSource};
use crate::resolver::EntityResolver;
use crate::store::{PineStore, RemoteStore};

/// Entry point to the SDK.
///
/// Owns one [`Auth`], one [`MemoizeRegistry`] bound to its epoch, and the
/// models built over a shared store. Cloning is not supported; share it
/// behind an `Arc`.
#[derive(Debug)]
pub struct BalenaSdk {
    auth: Arc<Auth>,
    registry: Arc<MemoizeRegistry>,
    os: OsModel,
    application: ApplicationModel,
    device: DeviceModel,
    release: ReleaseModel,
}

impl BalenaSdk {
    /// Create an SDK talking to the configured API.
    pub fn new(config: SdkConfig) -> Result<Self> {
        config.validate()?;
        let auth = Arc::new(match &config.api_key {
            Some(key) => Auth::with_token(key.clone()),
            None => Auth::new(),
        });
        let pine = Arc::new(PineStore::new(config, Arc::clone(&auth))?);
        info!(api = %pine.config().resource_root(), "SDK initialized");
        Ok(Self::with_backends(pine.clone(), pine, auth))
    }

    /// Create an SDK from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(SdkConfig::from_env()?)
    }

    /// Wire the SDK over arbitrary backends.
    pub fn with_backends(
        store: Arc<dyn RemoteStore>,
        versions: Arc<dyn VersionSource>,
        auth: Arc<Auth>,
    ) -> Self {
        let registry = MemoizeRegistry::with_auth(auth.subscribe());

        let applications = Arc::new(EntityResolver::application(Arc::clone(&store)));
        let devices = Arc::new(EntityResolver::device(Arc::clone(&store)));
        let releases = Arc::new(EntityResolver::release(Arc::clone(&store)));

        Self {
            os: OsModel::new(versions, &registry),
            application: ApplicationModel::new(Arc::clone(&store), applications),
            device: DeviceModel::new(Arc::clone(&store), devices),
            release: ReleaseModel::new(store, releases),
            auth,
            registry,
        }
    }

    pub fn auth(&self) -> &Arc<Auth> {
        &self.auth
    }

    pub fn registry(&self) -> &Arc<MemoizeRegistry> {
        &self.registry
    }

    pub fn os(&self) -> &OsModel {
        &self.os
    }

    pub fn application(&self) -> &ApplicationModel {
        &self.application
    }

    pub fn device(&self) -> &DeviceModel {
        &self.device
    }

    pub fn release(&self) -> &ReleaseModel {
        &self.release
    }

    /// Install a session token or API key.
    #[instrument(skip_all)]
    pub async fn login(&self, token: impl Into<String>) {
        self.auth.set_token(token).await;
    }

    #[instrument(skip_all)]
    pub async fn logout(&self) {
        self.auth.logout().await;
    }

    /// Make every memoized value stale.
    pub fn clear_caches(&self) {
        self.registry.invalidate_all();
    }
}
