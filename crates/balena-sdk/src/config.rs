// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the SDK.

use std::time::Duration;

use url::Url;

use crate::error::{Result, SdkError};

const DEFAULT_API_URL: &str = "https://api.balena-cloud.com";
const DEFAULT_API_VERSION: &str = "v7";

/// Configuration for [`BalenaSdk`](crate::BalenaSdk).
#[derive(Debug, Clone)]
pub struct SdkConfig {
    /// Base URL of the API, without the version segment.
    pub api_url: String,
    /// Resource API version segment (e.g. `v7`).
    pub api_version: String,
    /// API key or session token used for the bearer header.
    pub api_key: Option<String>,
    /// Request timeout.
    pub request_timeout: Duration,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(30),
            user_agent: None,
        }
    }
}

impl SdkConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration from environment variables.
    ///
    /// Environment variables:
    /// - `BALENA_API_URL`: API base URL (default: "https://api.balena-cloud.com")
    /// - `BALENA_API_VERSION`: Resource API version (default: "v7")
    /// - `BALENA_API_KEY`: API key or session token (optional)
    /// - `BALENA_REQUEST_TIMEOUT_MS`: Request timeout in milliseconds (default: 30000)
    pub fn from_env() -> Result<Self> {
        let api_url =
            std::env::var("BALENA_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        let api_version =
            std::env::var("BALENA_API_VERSION").unwrap_or_else(|_| DEFAULT_API_VERSION.to_string());

        let api_key = std::env::var("BALENA_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        let request_timeout_ms: u64 = std::env::var("BALENA_REQUEST_TIMEOUT_MS")
            .unwrap_or_else(|_| "30000".to_string())
            .parse()
            .map_err(|e| SdkError::Config(format!("invalid BALENA_REQUEST_TIMEOUT_MS: {}", e)))?;

        let config = Self {
            api_url,
            api_version,
            api_key,
            request_timeout: Duration::from_millis(request_timeout_ms),
            user_agent: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the URL parses and the timeout is usable.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.api_url)?;
        if url.cannot_be_a_base() {
            return Err(SdkError::Config(format!(
                "api_url is not a base url: {}",
                self.api_url
            )));
        }
        if self.api_version.trim().is_empty() {
            return Err(SdkError::Config("api_version must not be empty".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(SdkError::Config(
                "request_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// `{api_url}/{api_version}` with no trailing slash.
    pub fn resource_root(&self) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            self.api_version.trim_matches('/')
        )
    }

    /// Set the API base URL.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Set the resource API version.
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Set the API key or session token.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the `User-Agent` header.
    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }
}
