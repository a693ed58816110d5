//! File-manager-hosted side of the status distribution core.
//!
//! Lives inside the file manager's extension host process. The hot path is
//! [`emblem::EmblemProvider::emblem_for`], called once per icon per paint on
//! the UI thread: it answers from the 100 ms TTL [`local_cache`] and never
//! touches the bus synchronously. Everything that talks to the daemon goes
//! through [`controller::VersionController`], which runs on the bus client's
//! private runtime.

pub mod controller;
pub mod emblem;
pub mod local_cache;
pub mod window;

pub use controller::VersionController;
pub use emblem::{Emblem, EmblemPosition, EmblemProvider};
pub use local_cache::LocalStatusCache;
pub use window::WindowLifecycle;
