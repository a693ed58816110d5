//! Session status daemon.
//!
//! Single long-lived process owning the authoritative [`services::StatusCache`],
//! the repository watcher and the scan worker, exposed to the file-manager
//! side over a loopback HTTP endpoint: JSON request/response for the methods,
//! an SSE stream for the pushed events. Binding the well-known port
//! exclusively is what makes this the one owner of the service name.

pub mod routes;
pub mod state;
pub mod ticks;

pub use state::AppState;
