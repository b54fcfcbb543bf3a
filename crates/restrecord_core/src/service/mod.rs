//! Record lifecycle services.
//!
//! # Responsibility
//! - Turn record operations into backend requests and fold the responses
//!   back into records.
//! - Keep models free of transport details.

pub mod record_service;
