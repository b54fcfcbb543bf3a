//! Record model layer.
//!
//! # Responsibility
//! - Declare entities (`ModelDef`) and hold their instances (`Record`).
//! - Track attribute changes against the last-synced snapshot.
//! - Keep related records reachable through association slots.
//!
//! # Invariants
//! - Records never talk to the backend themselves; see `service`.

pub mod definition;
pub mod filter;
pub mod naming;
pub mod record;
