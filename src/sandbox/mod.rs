//! Disposable sandbox clones
//!
//! A sandbox is a local git clone of the user's repository in a temp
//! directory. The whole workflow runs inside it; on success changed files
//! are copied back, on failure the user's tree was never touched. Cleanup
//! is idempotent and also wired to SIGINT/SIGTERM so an interrupted
//! process does not leave clones behind.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

/// Session-data subtree that never copies back
const SESSION_DATA_PREFIX: &str = ".feature-factory/sessions";

/// Errors from sandbox lifecycle operations
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("{0} is not a git repository")]
    NotAGitRepo(PathBuf),

    #[error("Working tree has uncommitted changes:\n{}", paths.join("\n"))]
    DirtyWorkingTree { paths: Vec<String> },

    #[error("Failed to clone repository: {0}")]
    CloneFailed(String),

    #[error("Failed to copy results back: {0}")]
    CopyBackFailed(String),

    #[error("Git command failed: {0}")]
    GitError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Report from a copy-back
#[derive(Debug, Clone, Default)]
pub struct CopyBackReport {
    /// Paths copied into the source directory
    pub files_copied: Vec<String>,

    /// Paths skipped (session data)
    pub skipped: Vec<String>,
}

/// A live sandbox clone
#[derive(Debug, Clone)]
pub struct Sandbox {
    /// The user's repository
    pub source_directory: PathBuf,

    /// The disposable clone
    pub sandbox_directory: PathBuf,

    /// HEAD of the clone at creation time
    pub start_commit: String,
}

impl Sandbox {
    /// Clone `source` into a disposable sandbox directory
    ///
    /// Requires a git repository with a clean working tree; dirty paths are
    /// listed in the error. Dependencies are linked from the source when
    /// present (or installed when only a manifest exists) so builds and
    /// tests work inside the clone.
    pub async fn create(source: &Path, base_dir: Option<&Path>) -> Result<Self, SandboxError> {
        let source = source
            .canonicalize()
            .map_err(|_| SandboxError::NotAGitRepo(source.to_path_buf()))?;

        if !source.join(".git").exists() {
            return Err(SandboxError::NotAGitRepo(source));
        }

        // The orchestrator's own data directory does not count as dirt
        let status = git(&source, &["status", "--porcelain"]).await?;
        let dirty: Vec<String> = String::from_utf8_lossy(&status.stdout)
            .lines()
            .filter(|line| !line[3.min(line.len())..].starts_with(".feature-factory/"))
            .map(str::to_string)
            .collect();
        if !dirty.is_empty() {
            return Err(SandboxError::DirtyWorkingTree { paths: dirty });
        }

        let parent = match base_dir {
            Some(dir) => dir.to_path_buf(),
            None => std::env::temp_dir().join("feature-factory"),
        };
        tokio::fs::create_dir_all(&parent).await?;
        let sandbox_directory = parent.join(format!("sandbox-{}", uuid::Uuid::now_v7()));

        // --local hard-links immutable objects, so the clone is cheap
        let clone = Command::new("git")
            .args([
                "clone",
                "--local",
                source.to_string_lossy().as_ref(),
                sandbox_directory.to_string_lossy().as_ref(),
            ])
            .output()
            .await?;

        if !clone.status.success() {
            return Err(SandboxError::CloneFailed(
                String::from_utf8_lossy(&clone.stderr).to_string(),
            ));
        }

        let head = git(&sandbox_directory, &["rev-parse", "HEAD"]).await?;
        let start_commit = String::from_utf8_lossy(&head.stdout).trim().to_string();

        let sandbox = Self {
            source_directory: source,
            sandbox_directory,
            start_commit,
        };

        sandbox.link_dependencies().await;

        info!(
            "Created sandbox {} (start commit {})",
            sandbox.sandbox_directory.display(),
            &sandbox.start_commit[..12.min(sandbox.start_commit.len())]
        );
        Ok(sandbox)
    }

    /// Link or install the dependency directory
    async fn link_dependencies(&self) {
        let source_modules = self.source_directory.join("node_modules");
        let sandbox_modules = self.sandbox_directory.join("node_modules");

        if source_modules.is_dir() {
            #[cfg(unix)]
            if let Err(e) = tokio::fs::symlink(&source_modules, &sandbox_modules).await {
                warn!("Failed to symlink node_modules into sandbox: {}", e);
            }
        } else if self.source_directory.join("package.json").exists() {
            let install = Command::new("npm")
                .arg("install")
                .current_dir(&self.sandbox_directory)
                .output()
                .await;
            match install {
                Ok(output) if output.status.success() => {}
                Ok(output) => warn!(
                    "Dependency install failed in sandbox: {}",
                    String::from_utf8_lossy(&output.stderr)
                ),
                Err(e) => warn!("Dependency install failed in sandbox: {}", e),
            }
        }
    }

    /// Copy committed, uncommitted and untracked changes back to the source
    ///
    /// Session data under `.feature-factory/sessions/` is skipped and
    /// reported.
    pub async fn copy_results_back(&self) -> Result<CopyBackReport, SandboxError> {
        let mut paths: Vec<String> = Vec::new();

        // Committed since the sandbox was created
        let range = format!("{}..HEAD", self.start_commit);
        let committed = git(&self.sandbox_directory, &["diff", "--name-only", &range]).await?;
        paths.extend(String::from_utf8_lossy(&committed.stdout).lines().map(str::to_string));

        // Uncommitted modifications
        let uncommitted = git(&self.sandbox_directory, &["diff", "--name-only"]).await?;
        paths.extend(String::from_utf8_lossy(&uncommitted.stdout).lines().map(str::to_string));

        // Untracked files
        let untracked = git(&self.sandbox_directory, &["ls-files", "--others", "--exclude-standard"]).await?;
        paths.extend(String::from_utf8_lossy(&untracked.stdout).lines().map(str::to_string));

        paths.sort();
        paths.dedup();
        paths.retain(|p| !p.is_empty());

        let mut report = CopyBackReport::default();

        for rel in paths {
            if rel.starts_with(SESSION_DATA_PREFIX) {
                report.skipped.push(rel);
                continue;
            }

            let from = self.sandbox_directory.join(&rel);
            let to = self.source_directory.join(&rel);

            if !from.exists() {
                // Deleted in the sandbox; leave the source copy alone
                warn!("Skipping {} (missing in sandbox)", rel);
                continue;
            }

            if let Some(parent) = to.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| SandboxError::CopyBackFailed(format!("{}: {}", rel, e)))?;
            }
            tokio::fs::copy(&from, &to)
                .await
                .map_err(|e| SandboxError::CopyBackFailed(format!("{}: {}", rel, e)))?;
            report.files_copied.push(rel);
        }

        info!(
            "Copied {} files back from sandbox ({} skipped)",
            report.files_copied.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Remove the sandbox directory; idempotent on missing directories
    pub async fn cleanup(&self) -> Result<(), SandboxError> {
        cleanup_directory(&self.sandbox_directory).await
    }
}

/// Remove a sandbox directory; missing directories are not an error
pub async fn cleanup_directory(path: &Path) -> Result<(), SandboxError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {
            info!("Removed sandbox {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SandboxError::Io(e)),
    }
}

/// Remove the sandbox when the process receives SIGINT or SIGTERM
///
/// Spawned once when a sandbox is created; the task lives until the
/// process exits.
pub fn install_signal_cleanup(sandbox_directory: PathBuf) {
    tokio::spawn(async move {
        let mut sigint = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to install SIGINT handler: {}", e);
                return;
            }
        };
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }

        warn!("Interrupted; cleaning up sandbox {}", sandbox_directory.display());
        let _ = tokio::fs::remove_dir_all(&sandbox_directory).await;
        std::process::exit(130);
    });
}

async fn git(dir: &Path, args: &[&str]) -> Result<std::process::Output, SandboxError> {
    let output = Command::new("git").args(args).current_dir(dir).output().await?;
    if !output.status.success() && !output.stderr.is_empty() {
        // Callers inspect stdout; surface hard failures here
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if stderr.contains("fatal") {
            return Err(SandboxError::GitError(stderr));
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn init_repo(path: &Path) {
        for args in [
            vec!["init"],
            vec!["config", "user.email", "test@example.com"],
            vec!["config", "user.name", "Test"],
        ] {
            Command::new("git").args(&args).current_dir(path).output().await.unwrap();
        }
        std::fs::write(path.join("README.md"), "# Source\n").unwrap();
        for args in [vec!["add", "-A"], vec!["commit", "-m", "init"]] {
            Command::new("git").args(&args).current_dir(path).output().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_create_requires_git_repo() {
        let temp = tempdir().unwrap();

        let result = Sandbox::create(temp.path(), None).await;
        assert!(matches!(result.unwrap_err(), SandboxError::NotAGitRepo(_)));
    }

    #[tokio::test]
    async fn test_create_requires_clean_tree() {
        let temp = tempdir().unwrap();
        init_repo(temp.path()).await;
        std::fs::write(temp.path().join("dirty.txt"), "uncommitted").unwrap();

        let result = Sandbox::create(temp.path(), None).await;
        match result.unwrap_err() {
            SandboxError::DirtyWorkingTree { paths } => {
                assert!(paths.iter().any(|p| p.contains("dirty.txt")));
            }
            other => panic!("Expected DirtyWorkingTree, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_clones_and_records_start_commit() {
        let temp = tempdir().unwrap();
        init_repo(temp.path()).await;
        let base = tempdir().unwrap();

        let sandbox = Sandbox::create(temp.path(), Some(base.path())).await.unwrap();

        assert!(sandbox.sandbox_directory.join("README.md").exists());
        assert_eq!(sandbox.start_commit.len(), 40);

        sandbox.cleanup().await.unwrap();
        assert!(!sandbox.sandbox_directory.exists());
    }

    #[tokio::test]
    async fn test_copy_back_committed_uncommitted_untracked() {
        let temp = tempdir().unwrap();
        init_repo(temp.path()).await;
        let base = tempdir().unwrap();

        let sandbox = Sandbox::create(temp.path(), Some(base.path())).await.unwrap();
        let dir = &sandbox.sandbox_directory;

        // Committed change
        std::fs::write(dir.join("committed.txt"), "committed").unwrap();
        for args in [
            vec!["config", "user.email", "test@example.com"],
            vec!["config", "user.name", "Test"],
            vec!["add", "-A"],
            vec!["commit", "-m", "work"],
        ] {
            Command::new("git").args(&args).current_dir(dir).output().await.unwrap();
        }
        // Uncommitted modification
        std::fs::write(dir.join("README.md"), "# Modified\n").unwrap();
        // Untracked file
        std::fs::write(dir.join("untracked.txt"), "untracked").unwrap();
        // Session data must be skipped
        std::fs::create_dir_all(dir.join(".feature-factory/sessions")).unwrap();
        std::fs::write(dir.join(".feature-factory/sessions/s1.json"), "{}").unwrap();

        let report = sandbox.copy_results_back().await.unwrap();

        assert!(report.files_copied.contains(&"committed.txt".to_string()));
        assert!(report.files_copied.contains(&"README.md".to_string()));
        assert!(report.files_copied.contains(&"untracked.txt".to_string()));
        assert!(report.skipped.iter().any(|p| p.starts_with(".feature-factory/sessions")));

        assert_eq!(std::fs::read_to_string(temp.path().join("committed.txt")).unwrap(), "committed");
        assert_eq!(std::fs::read_to_string(temp.path().join("README.md")).unwrap(), "# Modified\n");
        assert!(!temp.path().join(".feature-factory/sessions/s1.json").exists());

        sandbox.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_idempotent() {
        let temp = tempdir().unwrap();
        init_repo(temp.path()).await;
        let base = tempdir().unwrap();

        let sandbox = Sandbox::create(temp.path(), Some(base.path())).await.unwrap();
        sandbox.cleanup().await.unwrap();
        // Second cleanup of a missing directory is fine
        sandbox.cleanup().await.unwrap();
    }
}
