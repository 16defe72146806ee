//! Error handling
//!
//! Defines the storage error taxonomy and the handlers used at the binary edge.

pub mod handlers;
pub mod types;

pub use types::*;
