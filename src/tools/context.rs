//! ToolContext - execution context for tools

use std::path::{Path, PathBuf};

use super::ToolError;

/// Execution context for tools - scoped to one agent phase
///
/// When a sandbox is active, `sandbox_boundary` is set to the sandbox clone
/// and every path argument must resolve inside it. Without a boundary,
/// relative paths still resolve against `working_directory` but no
/// containment is enforced.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Directory relative paths resolve against
    pub working_directory: PathBuf,

    /// Verbose tool logging
    pub verbose: bool,

    /// Containment boundary for all filesystem operations
    pub sandbox_boundary: Option<PathBuf>,
}

impl ToolContext {
    /// Create a context without containment
    pub fn new(working_directory: PathBuf) -> Self {
        Self {
            working_directory,
            verbose: false,
            sandbox_boundary: None,
        }
    }

    /// Create a context whose filesystem operations are confined to `boundary`
    pub fn sandboxed(working_directory: PathBuf, boundary: PathBuf) -> Self {
        Self {
            working_directory,
            verbose: false,
            sandbox_boundary: Some(boundary),
        }
    }

    /// Resolve a path argument relative to the working directory
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_directory.join(path)
        }
    }

    /// Validate a path argument against the sandbox boundary
    ///
    /// Canonicalizes to defeat `../` traversal and symlink escapes. For
    /// paths that do not exist yet, the nearest existing ancestor is
    /// canonicalized and the remainder re-appended before the check.
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, ToolError> {
        let resolved = self.resolve(path);

        let Some(boundary) = &self.sandbox_boundary else {
            return Ok(resolved);
        };

        let canonical = canonicalize_allowing_new(&resolved);
        let boundary_canonical = boundary.canonicalize().unwrap_or_else(|_| boundary.clone());

        if canonical == boundary_canonical || canonical.starts_with(&boundary_canonical) {
            Ok(canonical)
        } else {
            Err(ToolError::SandboxViolation {
                path: path.to_path_buf(),
                boundary: boundary.clone(),
            })
        }
    }
}

/// Canonicalize a path that may not exist yet
///
/// Walks up to the nearest existing ancestor, canonicalizes that, then
/// re-appends the non-existent remainder with `..`/`.` components stripped
/// lexically (a `..` in the remainder pops the tail, so traversal cannot
/// smuggle the result back outside the canonical prefix unchecked).
fn canonicalize_allowing_new(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    let mut existing = path.to_path_buf();
    let mut remainder: Vec<std::ffi::OsString> = Vec::new();

    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                remainder.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => break,
        }
    }

    let mut result = existing.canonicalize().unwrap_or(existing);
    for component in remainder.iter().rev() {
        match component.to_str() {
            Some("..") => {
                result.pop();
            }
            Some(".") => {}
            _ => result.push(component),
        }
    }
    result
}
