//! Package references, manifests and resolution.
//!
//! A package is any git repository (or local directory) carrying a
//! `hereyarc.yaml` manifest next to its IaC module. Resolution turns the
//! reference a user typed into a canonical identity plus the manifest
//! metadata; the manifest is fetched fresh every time.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CoreError, CoreResult};

/// Manifest file names, in lookup order.
pub const MANIFEST_CANDIDATES: [&str; 2] = ["hereyarc.yaml", "hereyarc.yml"];

/// Default base URL for raw repository content.
pub const GITHUB_RAW_URL: &str = "https://raw.githubusercontent.com";

fn segment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("static regex is valid"))
}

/// Where a package's content lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PackageSource {
    /// `owner/repo` on GitHub.
    Remote { owner: String, repo: String },
    /// A directory on disk, relative to the project root unless absolute.
    Local { path: PathBuf },
}

/// A validated package reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageReference {
    raw: String,
    source: PackageSource,
}

fn is_local_path(reference: &str) -> bool {
    ["./", "../", "/", ".\\", "..\\"]
        .iter()
        .any(|prefix| reference.starts_with(prefix))
}

impl PackageReference {
    /// Parse and validate a reference string.
    pub fn parse(reference: &str) -> CoreResult<Self> {
        let raw = reference.trim();

        if is_local_path(raw) {
            return Ok(Self {
                raw: raw.to_string(),
                source: PackageSource::Local {
                    path: PathBuf::from(raw),
                },
            });
        }

        let segments: Vec<&str> = raw.split('/').collect();
        if segments.len() != 2 || segments.iter().any(|s| !segment_regex().is_match(s)) {
            return Err(CoreError::InvalidPackageFormat(format!(
                "'{}' must be in the form owner/repository or a local path",
                raw
            )));
        }

        Ok(Self {
            raw: raw.to_string(),
            source: PackageSource::Remote {
                owner: segments[0].to_string(),
                repo: segments[1].to_string(),
            },
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn source(&self) -> &PackageSource {
        &self.source
    }

    pub fn is_local(&self) -> bool {
        matches!(self.source, PackageSource::Local { .. })
    }

    /// Filesystem and state safe identifier: path separators become dashes.
    pub fn canonical_name(&self) -> String {
        match &self.source {
            PackageSource::Remote { owner, repo } => format!("{}-{}", owner, repo),
            PackageSource::Local { .. } => {
                let mut name = self.raw.as_str();
                while let Some(rest) = name
                    .strip_prefix("./")
                    .or_else(|| name.strip_prefix(".\\"))
                    .or_else(|| name.strip_prefix('/'))
                {
                    name = rest;
                }
                name.trim_end_matches(['/', '\\']).replace(['/', '\\'], "-")
            }
        }
    }
}

impl FromStr for PackageReference {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PackageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Companion package provisioned when the owning package is deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnDeploy {
    pub pkg: String,
    #[serde(default)]
    pub version: String,
}

/// Contents of a package manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMetadata {
    pub iac: String,
    pub infra: String,
    #[serde(default)]
    pub deploy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_deploy: Option<OnDeploy>,
}

impl PackageMetadata {
    /// Parse and validate manifest content for `package`.
    pub fn parse(package: &str, content: &str) -> CoreResult<Self> {
        let metadata: Self =
            serde_yaml::from_str(content).map_err(|e| CoreError::InvalidManifest {
                package: package.to_string(),
                message: e.to_string(),
            })?;
        metadata.validate(package)?;
        Ok(metadata)
    }

    /// Check cross-field invariants.
    pub fn validate(&self, package: &str) -> CoreResult<()> {
        let invalid = |message: &str| CoreError::InvalidManifest {
            package: package.to_string(),
            message: message.to_string(),
        };

        if self.iac.trim().is_empty() {
            return Err(invalid("'iac' must not be empty"));
        }
        if self.infra.trim().is_empty() {
            return Err(invalid("'infra' must not be empty"));
        }
        if self.dependencies.is_some() && !self.deploy {
            return Err(invalid("'dependencies' is only allowed on deploy packages"));
        }
        Ok(())
    }
}

/// A reference resolved to its identity and manifest.
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub reference: PackageReference,
    pub canonical_name: String,
    pub package_uri: String,
    pub metadata: PackageMetadata,
}

/// Reads single files from a package's content source.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Read `file_name` from the package root. `Ok(None)` when unavailable.
    async fn read_file(
        &self,
        reference: &PackageReference,
        file_name: &str,
    ) -> CoreResult<Option<String>>;
}

/// Remote packages via raw GitHub content, local packages via the filesystem.
pub struct DefaultContentSource {
    http: reqwest::Client,
    raw_base_url: String,
    base_dir: PathBuf,
}

impl DefaultContentSource {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            http: reqwest::Client::new(),
            raw_base_url: GITHUB_RAW_URL.to_string(),
            base_dir: base_dir.into(),
        }
    }

    pub fn with_raw_base_url(mut self, url: impl Into<String>) -> Self {
        self.raw_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    async fn read_remote(&self, owner: &str, repo: &str, file_name: &str) -> Option<String> {
        let url = format!("{}/{}/{}/HEAD/{}", self.raw_base_url, owner, repo, file_name);
        debug!("Fetching {}", url);

        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to fetch {}: {}", url, e);
                return None;
            }
        };
        if !response.status().is_success() {
            debug!("{} returned {}", url, response.status());
            return None;
        }
        response.text().await.ok()
    }
}

#[async_trait]
impl ContentSource for DefaultContentSource {
    async fn read_file(
        &self,
        reference: &PackageReference,
        file_name: &str,
    ) -> CoreResult<Option<String>> {
        match reference.source() {
            PackageSource::Remote { owner, repo } => {
                Ok(self.read_remote(owner, repo, file_name).await)
            }
            PackageSource::Local { path } => {
                let file = self.base_dir.join(path).join(file_name);
                match tokio::fs::read_to_string(&file).await {
                    Ok(content) => Ok(Some(content)),
                    Err(e) => {
                        debug!("Cannot read {:?}: {}", file, e);
                        Ok(None)
                    }
                }
            }
        }
    }
}

/// Lexically normalize a path (no filesystem access).
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Turns package reference strings into [`ResolvedPackage`]s.
pub struct PackageResolver {
    source: Arc<dyn ContentSource>,
    base_dir: PathBuf,
}

impl PackageResolver {
    /// `base_dir` anchors local package paths (normally the project root).
    pub fn new(source: Arc<dyn ContentSource>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            base_dir: base_dir.into(),
        }
    }

    /// Location the package source is fetched from.
    pub fn package_uri(&self, reference: &PackageReference) -> String {
        match reference.source() {
            PackageSource::Remote { owner, repo } => {
                format!("https://github.com/{}/{}", owner, repo)
            }
            PackageSource::Local { path } => normalize(&self.base_dir.join(path))
                .to_string_lossy()
                .into_owned(),
        }
    }

    /// Resolve a reference string to identity and metadata.
    pub async fn resolve(&self, reference: &str) -> CoreResult<ResolvedPackage> {
        let reference = PackageReference::parse(reference)?;
        let canonical_name = reference.canonical_name();

        let mut content = None;
        for candidate in MANIFEST_CANDIDATES {
            if let Some(found) = self.source.read_file(&reference, candidate).await? {
                debug!("Found {} for {}", candidate, reference);
                content = Some(found);
                break;
            }
        }
        let content =
            content.ok_or_else(|| CoreError::ManifestNotFound(reference.to_string()))?;

        let metadata = PackageMetadata::parse(reference.as_str(), &content)?;
        let package_uri = self.package_uri(&reference);
        info!(
            "Resolved {} (iac: {}, infra: {})",
            reference, metadata.iac, metadata.infra
        );

        Ok(ResolvedPackage {
            reference,
            canonical_name,
            package_uri,
            metadata,
        })
    }
}
