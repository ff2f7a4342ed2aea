//! Payment gateway adapter boundary.
//!
//! Wraps an external processor's "create intent / cancel intent" calls.
//! Confirmation arrives separately (webhook) and is fed to the engine's
//! reconcile operations.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::{CreateScript, IntentSnapshot, SimulatedGateway};
pub use r#trait::{CreatedIntent, GatewayError, IntentRequest, PaymentGateway};
