//! Common utilities and types shared across Outpost modules.
//!
//! This module provides foundational types that are used throughout the
//! codebase, ensuring consistency and type safety.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    is_temp_id, temp_id, CacheKey, KeyScope, WriteAction, DELETED_MARKER, ID_FIELD,
    OFFLINE_MARKER,
};
