//! Session management module.
//!
//! This module provides the in-memory session store and the minting of
//! the opaque identifiers that correlate a client with its session.

pub(crate) mod id;
mod store;

pub use id::{generate_sid, is_well_formed, SID_LEN};
pub use store::{SessionInfo, SessionSnapshot, SessionStore, DEFAULT_IDLE_TIMEOUT};
