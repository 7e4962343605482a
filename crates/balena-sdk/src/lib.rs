// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Balena SDK
//!
//! Client for the balena fleet-management API.
//!
//! The crate covers the parts of the API with decision logic in the client:
//! - Key/value sub-resources (tags, config and environment variables) with
//!   create-or-update semantics keyed by `(parent, key)`
//! - Resolving ids, names, slugs, uuids and commit prefixes to canonical ids
//! - Memoized lookups invalidated when the logged-in identity changes
//! - Picking an OS image version for a keyword, exact version or range
//!
//! # Example
//!
//! ```no_run
//! use balena_sdk::{BalenaSdk, ParentRef, SdkConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sdk = BalenaSdk::new(SdkConfig::new().with_api_key("my-api-key"))?;
//!
//! let device = ParentRef::from("7cf02a6");
//! sdk.device().tags().set(&device, "ENV", "production").await?;
//! let value = sdk.device().tags().get(&device, "ENV").await?;
//! println!("ENV = {:?}", value);
//!
//! let version = sdk
//!     .os()
//!     .get_max_satisfying_version("raspberrypi4-64", "^2.9")
//!     .await?;
//! println!("Newest 2.x: {:?}", version);
//! # Ok(())
//! # }
//! ```

pub mod auth;
mod client;
mod config;
pub mod dependent;
mod error;
pub mod memoize;
pub mod models;
pub mod os;
pub mod query;
pub mod resolver;
pub mod store;
pub mod upsert;

pub use auth::{Auth, AuthEpoch, TokenIdentity};
pub use client::BalenaSdk;
pub use config::SdkConfig;
pub use dependent::{DependentRecord, DependentResource, DependentResourceDescriptor};
pub use error::{Result, SdkError};
pub use memoize::{CacheEpoch, MemoizeRegistry, Memoized};
pub use models::{ApplicationModel, DeviceModel, ReleaseModel};
pub use os::{OsModel, OsVersions, VersionListing, VersionSource};
pub use query::{Direction, Expand, Filter, OrderBy, Query};
pub use resolver::{EntityResolver, Lookup, ParentRef};
pub use store::{Body, MemoryStore, PineStore, RemoteStore, StoreCall, StoreOp};
pub use upsert::{UpsertOutcome, upsert};
