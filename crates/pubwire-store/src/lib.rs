//! Identifier-keyed bookkeeping for pubwire.
//!
//! [`IdentifierStore`] maps synthetic `u64` identifiers to owned items. The
//! broker keeps one for its connected clients, and every topic keeps one for
//! its subscribers.
//!
//! # How it fits in the stack
//!
//! ```text
//! Broker (above)       ← client store: id → subscriber record
//!     ↕
//! Topic layer          ← per-topic store: slot id → subscriber record
//!     ↕
//! Store (this crate)   ← ids, items, one read/write lock per instance
//! ```

mod store;

pub use store::IdentifierStore;
