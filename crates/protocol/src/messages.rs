use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Body of the single-repository methods (`register-repository`,
/// `unregister-repository`, `refresh-repository`, `repository-status`,
/// `clear-repository-cache`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryRequest {
    pub path: PathBuf,
}

/// Body of `file-statuses`: batch lookup of individual paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStatusesRequest {
    pub paths: Vec<PathBuf>,
}

/// Identity document served at `/api/health`. Clients check `service`
/// against [`crate::SERVICE_NAME`] before treating the endpoint as connected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthInfo {
    pub service: String,
    pub object_path: String,
    pub version: String,
}

impl HealthInfo {
    pub fn current() -> Self {
        Self {
            service: crate::SERVICE_NAME.to_string(),
            object_path: crate::OBJECT_PATH.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn is_this_service(&self) -> bool {
        self.service == crate::SERVICE_NAME
    }
}

/// Counters describing the watcher's view of the world.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherStats {
    pub watched_repositories: usize,
    pub watched_files: usize,
    pub watched_directories: usize,
    pub watch_events: u64,
    pub update_events: u64,
}

/// Response of `service-status`. The first three keys are the minimum
/// contract; the rest is diagnostic surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub cache_size: usize,
    pub registered_repositories: usize,
    pub service_ready: bool,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub watcher: WatcherStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_status_uses_contract_key_names() {
        let status = ServiceStatus {
            cache_size: 12,
            registered_repositories: 2,
            service_ready: true,
            cache_hits: 0,
            cache_misses: 0,
            watcher: WatcherStats::default(),
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"cacheSize\":12"));
        assert!(json.contains("\"registeredRepositories\":2"));
        assert!(json.contains("\"serviceReady\":true"));
    }

    #[test]
    fn health_info_identifies_the_service() {
        let info = HealthInfo::current();
        assert!(info.is_this_service());
        assert_eq!(info.object_path, "/org/deepin/filemanager/git");
    }
}
