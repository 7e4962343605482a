// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! OS image versions per device type and range resolution over them.
//!
//! Published versions may spell build revisions as `2.9.6.rev2.prod`, which
//! is not semver. Every version, published or requested, is rewritten to
//! `2.9.6+FIXED-rev2.prod` before parsing. Resolution always answers with the
//! string as it was published.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use semver::{Version, VersionReq};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::error::{Result, SdkError};
use crate::memoize::{MemoizeRegistry, Memoized};

static REVISION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.+]rev(\d+)").expect("revision pattern is valid"));
static BUILD_REVISION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"rev(\d+)").expect("build revision pattern is valid"));
static DEVELOPMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.+-]dev").expect("development pattern is valid"));

/// Published versions for one device type, as the listing endpoint returns them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VersionListing {
    pub versions: Vec<String>,
    #[serde(default)]
    pub latest: Option<String>,
}

/// Source of OS image metadata.
#[async_trait]
pub trait VersionSource: Send + Sync {
    async fn list_versions(&self, device_type: &str) -> Result<VersionListing>;

    /// Download size in bytes of one published version.
    async fn download_size(&self, device_type: &str, version: &str) -> Result<u64>;
}

/// Rewrite a `.revN`/`+revN` revision into `+FIXED-revN`.
pub fn normalize(version: &str) -> String {
    REVISION
        .replacen(version.trim(), 1, "+FIXED-rev${1}")
        .into_owned()
}

/// Whether a normalized version is a development build.
pub fn is_development_version(normalized: &str) -> bool {
    DEVELOPMENT.is_match(normalized)
}

fn build_revision(version: &Version) -> Option<u64> {
    BUILD_REVISION
        .captures(version.build.as_str())
        .and_then(|caps| caps.get(1))
        .and_then(|rev| rev.as_str().parse().ok())
}

/// Semver precedence, then build revision numerically, then the rest of the
/// build metadata.
pub fn compare_versions(a: &Version, b: &Version) -> Ordering {
    a.major
        .cmp(&b.major)
        .then(a.minor.cmp(&b.minor))
        .then(a.patch.cmp(&b.patch))
        .then_with(|| a.pre.cmp(&b.pre))
        .then_with(|| build_revision(a).cmp(&build_revision(b)))
        .then_with(|| a.build.as_str().cmp(b.build.as_str()))
}

const OPERATOR_CHARS: &str = "<>=~^";

fn is_operator(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| OPERATOR_CHARS.contains(c))
}

fn is_wildcard(segment: &str) -> bool {
    matches!(segment, "x" | "X" | "*")
}

/// One comparator in the dialect `semver::VersionReq` accepts.
fn comparator(token: &str) -> String {
    let token = token.trim_end_matches(',');
    let split = token
        .find(|c: char| !OPERATOR_CHARS.contains(c))
        .unwrap_or(token.len());
    let (op, version) = token.split_at(split);
    let version = version.trim_start_matches(['v', 'V']);
    let version = version.split('+').next().unwrap_or_default();

    let core = version.split('-').next().unwrap_or_default();
    let exact = op.is_empty()
        && version.starts_with(|c: char| c.is_ascii_digit())
        && !core.split('.').any(is_wildcard);
    if exact {
        format!("={}", version)
    } else {
        format!("{}{}", op, version)
    }
}

fn parse_alternative(alternative: &str) -> Option<VersionReq> {
    let tokens: Vec<&str> = alternative.split_whitespace().collect();
    if let [low, "-", high] = tokens.as_slice() {
        let low = comparator(low);
        let high = comparator(high);
        let bound = |c: &str| c.trim_start_matches('=').to_string();
        return VersionReq::parse(&format!(">={}, <={}", bound(&low), bound(&high))).ok();
    }

    let mut comparators = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in tokens {
        if is_operator(token) {
            pending_op = Some(token);
            continue;
        }
        let joined = match pending_op.take() {
            Some(op) => format!("{}{}", op, token),
            None => token.to_string(),
        };
        let joined = joined.trim_end_matches(',');
        if !joined.is_empty() {
            comparators.push(comparator(joined));
        }
    }
    if pending_op.is_some() {
        return None;
    }
    if comparators.is_empty() {
        return Some(VersionReq::STAR);
    }
    VersionReq::parse(&comparators.join(", ")).ok()
}

/// Parse a node-style range. `None` means the range is unparseable.
pub fn parse_range(range: &str) -> Option<Vec<VersionReq>> {
    let normalized = normalize(range);
    normalized.split("||").map(parse_alternative).collect()
}

#[derive(Debug, Clone, PartialEq)]
struct PublishedVersion {
    original: String,
    normalized: String,
    parsed: Version,
}

/// The versions of one device type with their derived pointers.
#[derive(Debug, Clone, PartialEq)]
pub struct OsVersions {
    /// Published strings, newest first.
    pub versions: Vec<String>,
    pub latest: Option<String>,
    /// Newest version that is neither a pre-release nor a development build.
    pub recommended: Option<String>,
    /// `recommended`, else `latest`.
    pub default: Option<String>,
    entries: Vec<PublishedVersion>,
}

impl OsVersions {
    pub fn from_listing(listing: VersionListing) -> Self {
        let mut entries: Vec<PublishedVersion> = listing
            .versions
            .into_iter()
            .filter_map(|original| {
                let normalized = normalize(&original);
                match Version::parse(&normalized) {
                    Ok(parsed) => Some(PublishedVersion {
                        original,
                        normalized,
                        parsed,
                    }),
                    Err(e) => {
                        warn!(version = %original, error = %e, "Skipping unparseable OS version");
                        None
                    }
                }
            })
            .collect();
        entries.sort_by(|a, b| compare_versions(&b.parsed, &a.parsed));

        let recommended = entries
            .iter()
            .find(|v| v.parsed.pre.is_empty() && !is_development_version(&v.normalized))
            .map(|v| v.original.clone());

        // The listing's own pointer wins over sorting.
        let latest = match listing.latest {
            Some(declared) => {
                let normalized = normalize(&declared);
                entries
                    .iter()
                    .find(|v| v.normalized == normalized)
                    .map(|v| v.original.clone())
                    .or(Some(declared))
            }
            None => entries.first().map(|v| v.original.clone()),
        };
        let default = recommended.clone().or_else(|| latest.clone());

        Self {
            versions: entries.iter().map(|v| v.original.clone()).collect(),
            latest,
            recommended,
            default,
            entries,
        }
    }

    /// Pick one published version for a keyword, exact version or range.
    pub fn resolve(&self, request: &str) -> Option<String> {
        match request {
            "latest" => return self.latest.clone(),
            "recommended" => return self.recommended.clone(),
            "default" => return self.default.clone(),
            _ => {}
        }

        let normalized = normalize(request);
        if let Some(exact) = self.entries.iter().find(|v| v.normalized == normalized) {
            return Some(exact.original.clone());
        }

        let Some(ranges) = parse_range(request) else {
            debug!(request, "Unparseable version range");
            return None;
        };
        // Entries are sorted newest first.
        self.entries
            .iter()
            .find(|v| ranges.iter().any(|range| range.matches(&v.parsed)))
            .map(|v| v.original.clone())
    }
}

/// OS version queries, memoized per device type.
pub struct OsModel {
    versions: Memoized<String, OsVersions>,
    download_sizes: Memoized<(String, String), u64>,
}

impl fmt::Debug for OsModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OsModel")
            .field("cached_device_types", &self.versions.len())
            .field("cached_download_sizes", &self.download_sizes.len())
            .finish()
    }
}

impl OsModel {
    pub fn new(source: Arc<dyn VersionSource>, registry: &Arc<MemoizeRegistry>) -> Self {
        let listing_source = Arc::clone(&source);
        let versions = registry.memoize(move |device_type: String| {
            let source = Arc::clone(&listing_source);
            async move {
                let listing = source.list_versions(&device_type).await?;
                Ok(OsVersions::from_listing(listing))
            }
        });
        let download_sizes = registry.memoize(move |(device_type, version): (String, String)| {
            let source = Arc::clone(&source);
            async move { source.download_size(&device_type, &version).await }
        });
        Self {
            versions,
            download_sizes,
        }
    }

    #[instrument(skip(self))]
    pub async fn get_supported_versions(&self, device_type: &str) -> Result<OsVersions> {
        self.versions.call(device_type.to_string()).await
    }

    /// `None` when nothing published satisfies `version_or_range`.
    #[instrument(skip(self))]
    pub async fn get_max_satisfying_version(
        &self,
        device_type: &str,
        version_or_range: &str,
    ) -> Result<Option<String>> {
        let versions = self.get_supported_versions(device_type).await?;
        let resolved = versions.resolve(version_or_range);
        debug!(?resolved, "Resolved OS version");
        Ok(resolved)
    }

    /// Size in bytes of the version `version` resolves to.
    #[instrument(skip(self))]
    pub async fn get_download_size(&self, device_type: &str, version: &str) -> Result<u64> {
        let resolved = self
            .get_max_satisfying_version(device_type, version)
            .await?
            .ok_or_else(|| SdkError::not_found("os version", version))?;
        self.download_sizes
            .call((device_type.to_string(), resolved))
            .await
    }

    /// Forget cached listings and sizes.
    pub fn clear_cache(&self) {
        self.versions.clear();
        self.download_sizes.clear();
    }
}
