//! Workspace boundary containment.

use crate::error::SandboxError;
use crate::shell::{has_shell_expansion, tokenize, ShellToken};
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// The only absolute path outside a workspace a command may mention.
const ALLOWED_EXTERNAL_PATHS: &[&str] = &["/dev/null"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundaryCheck {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl BoundaryCheck {
    fn pass() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
        }
    }
}

/// Canonical form of a workspace root. The root must exist and be a directory.
pub fn canonical_root(root: impl AsRef<Path>) -> Result<PathBuf, SandboxError> {
    let root = root.as_ref();
    let canonical = fs::canonicalize(root)
        .map_err(|e| SandboxError::InvalidRoot(format!("{}: {}", root.display(), e)))?;
    if !canonical.is_dir() {
        return Err(SandboxError::InvalidRoot(format!(
            "{} is not a directory",
            canonical.display()
        )));
    }
    Ok(canonical)
}

/// Reject a free-text command that could reach outside `workspace_root`.
///
/// Any `..` anywhere in the command is rejected outright. Every absolute
/// path token (including `--flag=/path`, `-o/path` and `VAR=/path` forms)
/// must resolve inside the root after symlink resolution. `~` paths count as
/// outside. Variable expansion and command substitution are rejected since
/// their result cannot be checked.
pub fn check_command_boundary(command: &str, workspace_root: &Path) -> BoundaryCheck {
    if command.contains("..") {
        return BoundaryCheck::reject("Parent directory traversal ('..') is not allowed");
    }
    if has_shell_expansion(command) {
        return BoundaryCheck::reject(
            "Shell variables and command substitution are not allowed",
        );
    }

    let root = fs::canonicalize(workspace_root).unwrap_or_else(|_| normalize_lexically(workspace_root));

    for token in tokenize(command) {
        let ShellToken::Word(word) = token else {
            continue;
        };
        for candidate in path_like_parts(&word) {
            if candidate.starts_with('~') {
                return BoundaryCheck::reject(format!(
                    "Home-relative path is outside the workspace: {}",
                    candidate
                ));
            }
            if !candidate.starts_with('/') || ALLOWED_EXTERNAL_PATHS.contains(&candidate) {
                continue;
            }
            let resolved = resolve_existing_prefix(&normalize_lexically(Path::new(candidate)));
            if !resolved.starts_with(&root) {
                return BoundaryCheck::reject(format!(
                    "Absolute path outside the workspace: {}",
                    candidate
                ));
            }
        }
    }

    BoundaryCheck::pass()
}

/// Resolve a raw path (relative to `base`, or absolute) and make sure it
/// stays inside `root`. Returns the resolved path with symlinks in its
/// existing prefix followed.
pub fn resolve_within_workspace(root: &Path, base: &Path, raw: &str) -> Result<PathBuf, SandboxError> {
    let raw = raw.trim();
    if raw.split(['/', '\\']).any(|part| part == "..") {
        return Err(SandboxError::ParentTraversal(raw.to_string()));
    }
    if raw.starts_with('~') {
        return Err(SandboxError::OutsideWorkspace(raw.to_string()));
    }

    let root = fs::canonicalize(root).unwrap_or_else(|_| normalize_lexically(root));
    let joined = if Path::new(raw).is_absolute() {
        PathBuf::from(raw)
    } else {
        base.join(raw)
    };
    let resolved = resolve_existing_prefix(&normalize_lexically(&joined));

    if !resolved.starts_with(&root) {
        return Err(SandboxError::OutsideWorkspace(raw.to_string()));
    }
    Ok(resolved)
}

pub fn is_within_workspace(root: &Path, path: &Path) -> bool {
    let root = fs::canonicalize(root).unwrap_or_else(|_| normalize_lexically(root));
    resolve_existing_prefix(&normalize_lexically(path)).starts_with(root)
}

/// Collapse `.` and `..` components without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Canonicalize the deepest existing ancestor and re-append the rest, so a
/// symlink anywhere along an existing prefix is followed.
fn resolve_existing_prefix(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut rest: Vec<std::ffi::OsString> = Vec::new();

    loop {
        if let Ok(canonical) = fs::canonicalize(&existing) {
            let mut resolved = canonical;
            for part in rest.iter().rev() {
                resolved.push(part);
            }
            return resolved;
        }
        match (existing.file_name().map(|n| n.to_os_string()), existing.parent()) {
            (Some(name), Some(parent)) => {
                rest.push(name);
                existing = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
}

/// The whole word, any `key=value` right-hand side, and the path glued to a
/// short option (`-o/out`, `-I~/inc`).
fn path_like_parts(word: &str) -> Vec<&str> {
    let mut parts = vec![word];
    if let Some((_, value)) = word.split_once('=') {
        if !value.is_empty() {
            parts.push(value);
        }
    }
    if let Some(flags) = word.strip_prefix('-') {
        let attached = flags.trim_start_matches(|c: char| c == '-' || c.is_ascii_alphanumeric());
        if attached.starts_with('/') || attached.starts_with('~') {
            parts.push(attached);
        }
    }
    parts
}
