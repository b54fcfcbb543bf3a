//! Backend synchronization.
//!
//! # Responsibility
//! - Define the injected HTTP transport contract.
//! - Shape CRUD requests for records and collections.
//!
//! # Invariants
//! - Sync code performs no retries or caching; one call, one request.

pub mod http;
pub mod request;
#[cfg(feature = "reqwest-client")]
pub mod reqwest_client;
