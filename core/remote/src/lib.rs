//! Remote backend interface for Outpost.
//!
//! The remote system of record is an external collaborator; this crate
//! holds the trait it is consumed through, the reqwest-based HTTP adapter,
//! and an in-memory backend with the same match-criteria semantics for
//! tests.

pub mod backend;
pub mod http;
pub mod memory;

pub use backend::RemoteBackend;
pub use http::{HttpBackend, HttpBackendConfig};
pub use memory::MemoryBackend;
