// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP backend for the resource API.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{Body, RemoteStore, require_filter};
use crate::auth::Auth;
use crate::config::SdkConfig;
use crate::error::{Result, SdkError};
use crate::os::{VersionListing, VersionSource};
use crate::query::Query;

#[derive(Debug, Deserialize)]
struct Envelope {
    d: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct DownloadSize {
    size: u64,
}

/// Resource API client over HTTP.
///
/// Listings are `GET {root}/{resource}` answering `{"d": [...]}`; writes are
/// `POST`, and `PATCH`/`DELETE` scoped by `$filter`. The bearer token is read
/// from [`Auth`] on every request.
#[derive(Debug, Clone)]
pub struct PineStore {
    http: reqwest::Client,
    config: SdkConfig,
    auth: Arc<Auth>,
}

impl PineStore {
    /// Build a client. Fails if the configuration does not validate.
    pub fn new(config: SdkConfig, auth: Arc<Auth>) -> Result<Self> {
        config.validate()?;
        let mut builder = reqwest::Client::builder().timeout(config.request_timeout);
        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        let http = builder
            .build()
            .map_err(|e| SdkError::Config(format!("failed to build http client: {}", e)))?;
        Ok(Self { http, config, auth })
    }

    /// Get the SDK configuration.
    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    fn resource_url(&self, resource: &str) -> String {
        format!("{}/{}", self.config.resource_root(), resource)
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = match self.auth.token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        check_status(response).await
    }

    fn transport_error(&self, err: reqwest::Error) -> SdkError {
        if err.is_timeout() {
            SdkError::Timeout(self.config.request_timeout.as_millis() as u64)
        } else {
            SdkError::from(err)
        }
    }

    fn request(&self, method: Method, url: String, query: &Query) -> RequestBuilder {
        self.http.request(method, url).query(&query.to_params())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T> {
        let response = self.send(self.http.get(url)).await?;
        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Map non-success statuses onto the error variants the SDK branches on.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(status_error(status, message))
}

fn status_error(status: StatusCode, message: String) -> SdkError {
    match status {
        StatusCode::UNAUTHORIZED => SdkError::Unauthorized(message),
        StatusCode::CONFLICT if message.to_lowercase().contains("unique") => {
            SdkError::UniqueConstraintViolation(message)
        }
        other => SdkError::Request {
            status: other.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl RemoteStore for PineStore {
    #[instrument(skip(self, body))]
    async fn create(&self, resource: &str, body: &Body) -> Result<Value> {
        debug!("POST");
        let request = self.http.post(self.resource_url(resource)).json(body);
        let response = self.send(request).await?;
        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[instrument(skip(self, query, body))]
    async fn update(&self, resource: &str, query: &Query, body: &Body) -> Result<()> {
        require_filter(query, "update")?;
        debug!("PATCH");
        let request = self
            .request(Method::PATCH, self.resource_url(resource), query)
            .json(body);
        self.send(request).await?;
        Ok(())
    }

    #[instrument(skip(self, query))]
    async fn list(&self, resource: &str, query: &Query) -> Result<Vec<Value>> {
        debug!("GET");
        let request = self.request(Method::GET, self.resource_url(resource), query);
        let response = self.send(request).await?;
        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
        let envelope: Envelope = serde_json::from_slice(&bytes)?;
        Ok(envelope.d)
    }

    #[instrument(skip(self, query))]
    async fn get_by_id(&self, resource: &str, id: u64, query: &Query) -> Result<Option<Value>> {
        debug!("GET by id");
        let url = format!("{}({})", self.resource_url(resource), id);
        let request = self.request(Method::GET, url, query);
        let response = match self.send(request).await {
            Ok(response) => response,
            Err(SdkError::Request { status: 404, .. }) => return Ok(None),
            Err(err) => return Err(err),
        };
        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
        let envelope: Envelope = serde_json::from_slice(&bytes)?;
        Ok(envelope.d.into_iter().next())
    }

    #[instrument(skip(self, query))]
    async fn delete(&self, resource: &str, query: &Query) -> Result<()> {
        require_filter(query, "delete")?;
        debug!("DELETE");
        let request = self.request(Method::DELETE, self.resource_url(resource), query);
        self.send(request).await?;
        Ok(())
    }
}

#[async_trait]
impl VersionSource for PineStore {
    #[instrument(skip(self))]
    async fn list_versions(&self, device_type: &str) -> Result<VersionListing> {
        let url = self.api_url(&format!(
            "device-types/v1/{}/images",
            urlencoding::encode(device_type)
        ));
        self.get_json(url).await
    }

    #[instrument(skip(self))]
    async fn download_size(&self, device_type: &str, version: &str) -> Result<u64> {
        let url = self.api_url(&format!(
            "device-types/v1/{}/images/{}/download-size",
            urlencoding::encode(device_type),
            urlencoding::encode(version)
        ));
        let size: DownloadSize = self.get_json(url).await?;
        Ok(size.size)
    }
}
