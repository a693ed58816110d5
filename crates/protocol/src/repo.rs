use std::path::Path;

/// Lightweight repository-root probe: a directory is a repo root when it
/// contains `.git` as either a directory or a file (worktrees use a file).
/// No subprocess involved; both the daemon's validation and the extension's
/// first-sight discovery rely on this staying cheap.
pub fn is_repository_root(path: &Path) -> bool {
    if !path.is_dir() {
        return false;
    }
    path.join(".git").exists()
}
