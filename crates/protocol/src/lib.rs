//! Shared contract between the status daemon, the bus client and the
//! file-manager extension.
//!
//! Everything that crosses the process boundary lives here: the `FileState`
//! enum with its stable integer wire encoding, the request/response payloads
//! of the daemon interface, the pushed events, and the well-known endpoint
//! constants. Daemon-internal types stay in `services`; this crate must stay
//! dependency-light because it is linked into the extension host process.

pub mod events;
pub mod messages;
pub mod repo;
pub mod state;

pub use events::BusEvent;
pub use messages::{HealthInfo, ServiceStatus, WatcherStats};
pub use state::{FileState, StatusMap};

/// Well-known service name, carried in the health document so clients can
/// verify they are talking to the right daemon and not an unrelated server
/// squatting on the port.
pub const SERVICE_NAME: &str = "org.deepin.FileManager.Git";

/// Object path of the original bus interface, kept for identification.
pub const OBJECT_PATH: &str = "/org/deepin/filemanager/git";

/// The daemon binds this loopback port exclusively; holding the bind is what
/// makes it the single owner of the well-known name.
pub const DEFAULT_PORT: u16 = 7471;

/// Route prefix for all methods and the event stream.
pub const API_PREFIX: &str = "/api";

/// Default endpoint a client connects to when none is given.
pub fn default_endpoint() -> String {
    format!("http://127.0.0.1:{DEFAULT_PORT}")
}
