//! Daemon-side engine of the status distribution core.
//!
//! These services are explicitly constructed by the daemon's `main` and wired
//! together by reference; there are no singletons. The data path is:
//! [`watcher::RepositoryWatcher`] notices git metadata changing on disk and
//! emits a debounced repository-changed notification; the daemon feeds that
//! to [`worker::VersionWorker`], which runs `git status`, pipes the output
//! through [`porcelain`], and commits the result to
//! [`status_cache::StatusCache`]; the cache diffs against the previous
//! snapshot and publishes a change event that the daemon forwards to clients.

pub mod git;
pub mod porcelain;
pub mod status_cache;
pub mod watcher;
pub mod worker;

pub use git::{GitCli, GitCliError};
pub use status_cache::{StatusCache, StatusCacheError};
pub use watcher::RepositoryWatcher;
pub use worker::VersionWorker;
