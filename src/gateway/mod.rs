//! Payment gateway adapter.
//!
//! Everything that touches the external payment processor lives here: intent
//! creation and retrieval, charge refunds, customer lookup, payment method
//! listing, and webhook signature verification. The rest of the service
//! treats the processor as an opaque collaborator and never sees card data.
//!
//! The adapter is an explicitly constructed value (see [`StripeGateway::new`])
//! injected through shared state. Amounts cross this boundary in major
//! currency units and are converted to integer cents here, nowhere else.

pub mod stripe;
pub mod webhook;

pub use stripe::StripeGateway;
