//! Per-session persistence: event log, metadata, directory resolution and the
//! project-wide registry.

mod lock;
mod registry;
mod resolver;
mod store;
mod types;

pub use lock::FileLock;
pub use registry::{RegistryEntry, RegistryFile, SessionRegistry};
pub use resolver::{sanitize_session_id, Allocation, SessionResolver};
pub use store::SessionStore;
pub use types::*;
