//! Git tag checkpoints for phase-granularity rollback
//!
//! One lightweight tag is created per phase before its first attempt:
//! `ff-checkpoint/<sessionId>/pre-<phaseIndex>-<slug>`. Tags are never
//! applied automatically; rollback is a user-initiated action. All tags of
//! a session share a prefix so cleanup is a single prefix match.

use std::path::PathBuf;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Tag namespace prefix
pub const TAG_PREFIX: &str = "ff-checkpoint";

/// Errors from checkpoint operations
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Failed to create checkpoint: {0}")]
    CreateFailed(String),

    #[error("Failed to roll back to {tag}: {message}")]
    RollbackFailed { tag: String, message: String },

    #[error("Failed to clean up checkpoints: {0}")]
    CleanupFailed(String),

    #[error("Git command failed: {0}")]
    GitError(String),
}

/// A created checkpoint
#[derive(Debug, Clone)]
pub struct Checkpoint {
    /// Full tag name
    pub tag_name: String,

    /// Commit the tag points at
    pub commit_hash: String,
}

/// Manager for checkpoint tags on one repository
pub struct CheckpointManager {
    repo: PathBuf,
}

impl CheckpointManager {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    /// Canonical tag name for a phase
    pub fn tag_name(session_id: &str, phase_index: usize, phase_name: &str) -> String {
        format!("{}/{}/pre-{}-{}", TAG_PREFIX, session_id, phase_index, slugify(phase_name))
    }

    /// Create a checkpoint tag at HEAD
    pub async fn create_checkpoint(
        &self,
        session_id: &str,
        phase_index: usize,
        phase_name: &str,
    ) -> Result<Checkpoint, CheckpointError> {
        let tag_name = Self::tag_name(session_id, phase_index, phase_name);

        let output = self
            .git(&["tag", "--force", &tag_name, "HEAD"])
            .await
            .map_err(|e| CheckpointError::GitError(e.to_string()))?;

        if !output.status.success() {
            return Err(CheckpointError::CreateFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        let commit_hash = self.head_commit().await?;
        info!("Created checkpoint {} at {}", tag_name, &commit_hash[..12.min(commit_hash.len())]);

        Ok(Checkpoint { tag_name, commit_hash })
    }

    /// Roll the working tree back to a checkpoint
    ///
    /// Equivalent to `git reset --hard <tag>` + `git clean -fd`; gitignored
    /// files are preserved (clean runs without -x).
    pub async fn rollback_to_checkpoint(&self, tag_name: &str) -> Result<(), CheckpointError> {
        let reset = self
            .git(&["reset", "--hard", tag_name])
            .await
            .map_err(|e| CheckpointError::GitError(e.to_string()))?;

        if !reset.status.success() {
            return Err(CheckpointError::RollbackFailed {
                tag: tag_name.to_string(),
                message: String::from_utf8_lossy(&reset.stderr).to_string(),
            });
        }

        let clean = self
            .git(&["clean", "-fd"])
            .await
            .map_err(|e| CheckpointError::GitError(e.to_string()))?;

        if !clean.status.success() {
            return Err(CheckpointError::RollbackFailed {
                tag: tag_name.to_string(),
                message: String::from_utf8_lossy(&clean.stderr).to_string(),
            });
        }

        info!("Rolled back to checkpoint {}", tag_name);
        Ok(())
    }

    /// Delete every tag belonging to a session
    pub async fn cleanup_checkpoints(&self, session_id: &str) -> Result<usize, CheckpointError> {
        let prefix = format!("{}/{}/", TAG_PREFIX, session_id);

        let list = self
            .git(&["tag", "--list", &format!("{}*", prefix)])
            .await
            .map_err(|e| CheckpointError::GitError(e.to_string()))?;

        if !list.status.success() {
            return Err(CheckpointError::CleanupFailed(
                String::from_utf8_lossy(&list.stderr).to_string(),
            ));
        }

        let tags: Vec<String> = String::from_utf8_lossy(&list.stdout)
            .lines()
            .map(str::to_string)
            .filter(|t| !t.is_empty())
            .collect();

        for tag in &tags {
            let output = self
                .git(&["tag", "-d", tag])
                .await
                .map_err(|e| CheckpointError::GitError(e.to_string()))?;
            if !output.status.success() {
                debug!("Failed to delete tag {}: {}", tag, String::from_utf8_lossy(&output.stderr));
            }
        }

        info!("Deleted {} checkpoint tags for session {}", tags.len(), session_id);
        Ok(tags.len())
    }

    /// List checkpoint tags for a session
    pub async fn list_checkpoints(&self, session_id: &str) -> Result<Vec<String>, CheckpointError> {
        let prefix = format!("{}/{}/", TAG_PREFIX, session_id);
        let list = self
            .git(&["tag", "--list", &format!("{}*", prefix)])
            .await
            .map_err(|e| CheckpointError::GitError(e.to_string()))?;

        Ok(String::from_utf8_lossy(&list.stdout)
            .lines()
            .map(str::to_string)
            .filter(|t| !t.is_empty())
            .collect())
    }

    async fn head_commit(&self) -> Result<String, CheckpointError> {
        let output = self
            .git(&["rev-parse", "HEAD"])
            .await
            .map_err(|e| CheckpointError::GitError(e.to_string()))?;

        if !output.status.success() {
            return Err(CheckpointError::GitError(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn git(&self, args: &[&str]) -> std::io::Result<std::process::Output> {
        Command::new("git").args(args).current_dir(&self.repo).output().await
    }
}

/// Lowercase, collapse non-alphanumeric runs to single hyphens, trim
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_hyphen = false;

    for c in name.to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
            last_hyphen = false;
        } else if !last_hyphen && !slug.is_empty() {
            slug.push('-');
            last_hyphen = true;
        }
    }

    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    async fn init_repo(path: &Path) {
        for args in [
            vec!["init"],
            vec!["config", "user.email", "test@example.com"],
            vec!["config", "user.name", "Test"],
        ] {
            Command::new("git").args(&args).current_dir(path).output().await.unwrap();
        }
        std::fs::write(path.join("README.md"), "# Test\n").unwrap();
        for args in [vec!["add", "-A"], vec!["commit", "-m", "init"]] {
            Command::new("git").args(&args).current_dir(path).output().await.unwrap();
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Design Review"), "design-review");
        assert_eq!(slugify("Test Generation (TDD)"), "test-generation-tdd");
        assert_eq!(slugify("  weird -- Name!! "), "weird-name");
        assert_eq!(slugify("already-slugged"), "already-slugged");
    }

    proptest::proptest! {
        #[test]
        fn prop_slugify_is_clean_and_idempotent(name in "[ -~]{0,40}") {
            let slug = slugify(&name);
            proptest::prop_assert!(
                slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            );
            proptest::prop_assert!(!slug.starts_with('-'));
            proptest::prop_assert!(!slug.ends_with('-'));
            proptest::prop_assert_eq!(slugify(&slug), slug);
        }
    }

    #[test]
    fn test_tag_name_format() {
        let tag = CheckpointManager::tag_name("sess-1", 3, "Code Implementation");
        assert_eq!(tag, "ff-checkpoint/sess-1/pre-3-code-implementation");
    }

    #[tokio::test]
    async fn test_create_and_list_checkpoints() {
        let temp = tempdir().unwrap();
        init_repo(temp.path()).await;

        let manager = CheckpointManager::new(temp.path());
        let checkpoint = manager.create_checkpoint("sess-1", 0, "Architecture").await.unwrap();

        assert_eq!(checkpoint.tag_name, "ff-checkpoint/sess-1/pre-0-architecture");
        assert_eq!(checkpoint.commit_hash.len(), 40);

        let tags = manager.list_checkpoints("sess-1").await.unwrap();
        assert_eq!(tags, vec!["ff-checkpoint/sess-1/pre-0-architecture"]);
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let temp = tempdir().unwrap();
        init_repo(temp.path()).await;

        let manager = CheckpointManager::new(temp.path());
        let checkpoint = manager.create_checkpoint("sess-1", 0, "Phase").await.unwrap();

        // Mutate the tree: modify a tracked file and add an untracked one
        std::fs::write(temp.path().join("README.md"), "modified").unwrap();
        std::fs::write(temp.path().join("junk.txt"), "junk").unwrap();

        manager.rollback_to_checkpoint(&checkpoint.tag_name).await.unwrap();

        assert_eq!(std::fs::read_to_string(temp.path().join("README.md")).unwrap(), "# Test\n");
        assert!(!temp.path().join("junk.txt").exists());
    }

    #[tokio::test]
    async fn test_cleanup_removes_all_session_tags() {
        let temp = tempdir().unwrap();
        init_repo(temp.path()).await;

        let manager = CheckpointManager::new(temp.path());
        manager.create_checkpoint("sess-1", 0, "One").await.unwrap();
        manager.create_checkpoint("sess-1", 1, "Two").await.unwrap();
        manager.create_checkpoint("sess-2", 0, "Other").await.unwrap();

        let deleted = manager.cleanup_checkpoints("sess-1").await.unwrap();
        assert_eq!(deleted, 2);

        assert!(manager.list_checkpoints("sess-1").await.unwrap().is_empty());
        // Other sessions untouched
        assert_eq!(manager.list_checkpoints("sess-2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_checkpoint_reused_across_attempts() {
        let temp = tempdir().unwrap();
        init_repo(temp.path()).await;

        let manager = CheckpointManager::new(temp.path());
        let first = manager.create_checkpoint("sess-1", 0, "Phase").await.unwrap();
        // Re-creating the same checkpoint points at the same name
        let second = manager.create_checkpoint("sess-1", 0, "Phase").await.unwrap();

        assert_eq!(first.tag_name, second.tag_name);
        assert_eq!(manager.list_checkpoints("sess-1").await.unwrap().len(), 1);
    }
}
