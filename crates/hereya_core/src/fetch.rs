//! Materializing package sources on disk.
//!
//! Every (project, workspace, package) triple gets its own checkout
//! directory whose name is derived from a hash of the triple. An existing
//! non-empty checkout is trusted as-is: versions are not compared and the
//! source is never re-fetched.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use hereya_runner::{CommandConfig, CommandRunner};
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};

/// Deterministic checkout directory for a package.
pub fn package_dir(
    root: &Path,
    project: Option<&str>,
    workspace: &str,
    canonical_name: &str,
) -> PathBuf {
    let key = format!("{}\0{}\0{}", project.unwrap_or_default(), workspace, canonical_name);
    let hash = blake3::hash(key.as_bytes()).to_hex();
    root.join("packages")
        .join(format!("{}-{}", canonical_name, &hash.as_str()[..16]))
}

/// Fetches package sources into a directory.
#[async_trait]
pub trait PackageFetcher: Send + Sync {
    async fn fetch(&self, package_uri: &str, dest: &Path) -> CoreResult<()>;
}

/// Clones remote packages with git and copies local packages from disk.
pub struct GitFetcher {
    runner: Arc<dyn CommandRunner>,
    git: String,
}

impl GitFetcher {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            git: "git".to_string(),
        }
    }

    pub fn with_binary(mut self, git: impl Into<String>) -> Self {
        self.git = git.into();
        self
    }

    fn copy_local(source: &Path, dest: &Path) -> CoreResult<()> {
        let options = fs_extra::dir::CopyOptions::new().content_only(true);
        fs_extra::dir::copy(source, dest, &options).map_err(|e| CoreError::Fetch {
            uri: source.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

#[async_trait]
impl PackageFetcher for GitFetcher {
    async fn fetch(&self, package_uri: &str, dest: &Path) -> CoreResult<()> {
        let local = Path::new(package_uri);
        let is_local_dir = tokio::fs::metadata(local)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        if is_local_dir {
            info!("Copying local package {} into {:?}", package_uri, dest);
            tokio::fs::create_dir_all(dest).await?;
            let (source, target) = (local.to_path_buf(), dest.to_path_buf());
            return tokio::task::spawn_blocking(move || Self::copy_local(&source, &target))
                .await
                .map_err(|e| CoreError::Fetch {
                    uri: package_uri.to_string(),
                    message: e.to_string(),
                })?;
        }

        info!("Cloning {} into {:?}", package_uri, dest);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let config = CommandConfig::new(&self.git)
            .args(["clone", "--depth", "1", package_uri])
            .arg(dest.to_string_lossy());
        self.runner
            .run(&config)
            .await
            .map_err(|e| CoreError::from_runner("git", e))
            .and_then(|result| {
                if result.success() {
                    Ok(())
                } else {
                    Err(CoreError::ExternalToolFailure {
                        tool: "git".to_string(),
                        exit_code: result.exit_code,
                        stderr: result.stderr.trim().to_string(),
                    })
                }
            })
    }
}

/// Fetch the package into `dest` unless `dest` already holds content.
///
/// Returns `true` when a fetch happened.
pub async fn ensure_checkout(
    fetcher: &dyn PackageFetcher,
    package_uri: &str,
    dest: &Path,
) -> CoreResult<bool> {
    if has_content(dest).await? {
        debug!("Reusing existing checkout at {:?}", dest);
        return Ok(false);
    }
    fetcher.fetch(package_uri, dest).await?;
    Ok(true)
}

async fn has_content(dir: &Path) -> CoreResult<bool> {
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Ok(false),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    }
    let mut entries = tokio::fs::read_dir(dir).await?;
    Ok(entries.next_entry().await?.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hereya_runner::MockRunner;
    use tempfile::tempdir;

    #[test]
    fn test_package_dir_is_deterministic_and_keyed() {
        let root = Path::new("/home/u/.hereya");
        let a = package_dir(root, Some("app"), "dev", "owner-repo");
        let b = package_dir(root, Some("app"), "dev", "owner-repo");
        let c = package_dir(root, Some("app"), "prod", "owner-repo");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with(root.join("packages")));
        assert!(a
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("owner-repo-"));
    }

    #[tokio::test]
    async fn test_local_package_is_copied() {
        let src = tempdir().unwrap();
        std::fs::write(src.path().join("main.tf"), "# tf").unwrap();
        std::fs::create_dir(src.path().join("modules")).unwrap();
        std::fs::write(src.path().join("modules").join("x.tf"), "# x").unwrap();
        let dest = tempdir().unwrap();
        let target = dest.path().join("checkout");

        let fetcher = GitFetcher::new(Arc::new(MockRunner::new()));
        let fetched = ensure_checkout(&fetcher, &src.path().to_string_lossy(), &target)
            .await
            .unwrap();

        assert!(fetched);
        assert!(target.join("main.tf").exists());
        assert!(target.join("modules").join("x.tf").exists());
    }

    #[tokio::test]
    async fn test_existing_checkout_is_reused() {
        let dest = tempdir().unwrap();
        std::fs::write(dest.path().join("main.tf"), "# existing").unwrap();
        let runner = MockRunner::new();
        let fetcher = GitFetcher::new(Arc::new(runner.clone()));

        let fetched = ensure_checkout(&fetcher, "https://github.com/owner/repo", dest.path())
            .await
            .unwrap();

        assert!(!fetched);
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_checkout_dir_is_fetched() {
        let dest = tempdir().unwrap();
        let runner = MockRunner::new();
        let fetcher = GitFetcher::new(Arc::new(runner.clone()));

        assert!(!has_content(dest.path()).await.unwrap());
        assert!(!has_content(&dest.path().join("missing")).await.unwrap());

        let fetched = ensure_checkout(&fetcher, "https://github.com/owner/repo", dest.path())
            .await
            .unwrap();
        assert!(fetched);
        assert_eq!(runner.calls_matching("git clone").len(), 1);
    }

    #[tokio::test]
    async fn test_remote_package_is_cloned() {
        let dest = tempdir().unwrap();
        let target = dest.path().join("owner-repo");
        let runner = MockRunner::new();
        let fetcher = GitFetcher::new(Arc::new(runner.clone()));

        ensure_checkout(&fetcher, "https://github.com/owner/repo", &target)
            .await
            .unwrap();

        let calls = runner.calls_matching("git clone --depth 1 https://github.com/owner/repo");
        assert_eq!(calls.len(), 1);
    }
}
