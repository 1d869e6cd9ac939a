//! Session store and bridge protocol.
//!
//! The controller and the enforcer share no memory and have no call path to
//! each other. They converge through one JSON document on disk:
//!
//! - [`FileSessionStore`]: the medium. Writers take a sidecar lock file and
//!   replace the document atomically; readers never lock.
//! - [`SessionBridge`]: the read/merge/write discipline. Each actor keeps a
//!   shadow copy, publishes only the section it owns, throttles I/O, and
//!   keeps working on its last-known-good copy when the store is unreachable.

pub mod bridge;
pub mod error;
pub mod store;

pub use bridge::{BridgeConfig, PublishOutcome, ReadOutcome, SessionBridge};
pub use error::{BridgeError, BridgeResult};
pub use store::{FileSessionStore, SessionStore, StoreConfig, StoreLock};
