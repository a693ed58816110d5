//! Window lifecycle hook.
//!
//! The host reports window open/close and navigation; this hook turns that
//! into session management: the first window brings up the bus client and
//! the controller, the last window's close hands the daemon a best-effort
//! `clear-all-resources` and tears the session down. Navigation registers
//! the visited directory, which is how repositories are discovered while
//! the user browses.

use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use client::BusClient;

use crate::{
    controller::VersionController, emblem::EmblemProvider, local_cache::LocalStatusCache,
};

struct Session {
    client: Arc<BusClient>,
    controller: Arc<VersionController>,
    emblems: Arc<EmblemProvider>,
}

pub struct WindowLifecycle {
    endpoint: String,
    open_windows: Mutex<u64>,
    session: Mutex<Option<Session>>,
}

impl Default for WindowLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowLifecycle {
    pub fn new() -> Self {
        Self::with_endpoint(protocol::default_endpoint())
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            open_windows: Mutex::new(0),
            session: Mutex::new(None),
        }
    }

    pub fn window_opened(&self) {
        let mut count = self.open_windows.lock().unwrap();
        *count += 1;
        if *count == 1 {
            self.first_window_opened();
        }
    }

    pub fn window_closed(&self) {
        let mut count = self.open_windows.lock().unwrap();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.last_window_closed();
        }
    }

    /// Bring up the session: bus client, local cache, controller, emblem
    /// provider. Idempotent.
    pub fn first_window_opened(&self) {
        let mut session = self.session.lock().unwrap();
        if session.is_some() {
            return;
        }
        match BusClient::with_endpoint(self.endpoint.clone()) {
            Ok(client) => {
                let client = Arc::new(client);
                let cache = Arc::new(LocalStatusCache::new());
                let controller = VersionController::new(Arc::clone(&client), Arc::clone(&cache));
                let emblems = Arc::new(EmblemProvider::new(cache, Arc::clone(&controller)));
                *session = Some(Session {
                    client,
                    controller,
                    emblems,
                });
                tracing::info!("version control session started");
            }
            Err(err) => {
                // No session means no badges; the file manager works on.
                tracing::error!(error = %err, "failed to start version control session");
            }
        }
    }

    /// Tear the session down, asking the daemon to release everything it
    /// holds for us. Failure to reach the daemon is logged and ignored.
    pub fn last_window_closed(&self) {
        let Some(session) = self.session.lock().unwrap().take() else {
            return;
        };
        if let Err(err) = session.client.clear_all_resources_blocking() {
            tracing::debug!(error = %err, "could not clear daemon resources");
        }
        tracing::info!("version control session ended");
    }

    /// A window navigated to `path`: offer it to the daemon as a potential
    /// repository so cross-repo discovery follows the user around.
    pub fn window_url_changed(&self, path: &Path) {
        if let Some(session) = self.session.lock().unwrap().as_ref() {
            session.controller.register_repository(path);
        }
    }

    /// Badge provider of the active session, if any.
    pub fn emblem_provider(&self) -> Option<Arc<EmblemProvider>> {
        self.session
            .lock()
            .unwrap()
            .as_ref()
            .map(|session| Arc::clone(&session.emblems))
    }
}
