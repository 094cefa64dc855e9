//! Checkout and settlement core: builds payment transactions, renders the
//! gateway redirect, and reconciles gateway callbacks into enrollments.
//!
//! The HTTP layer calls into this crate; everything here is transport
//! agnostic and tested directly against an in-memory database.

pub mod error;
pub mod gateway;
pub mod intent;
pub mod reconcile;

#[cfg(test)]
pub mod testing;

pub use error::{CheckoutError, Result};
pub use gateway::{GatewayConfig, GatewayVerifier, HttpGatewayVerifier, RedirectForm};
pub use intent::{begin_cart_checkout, begin_course_checkout, CheckoutIntent, CheckoutLine};
pub use reconcile::{confirm_success, mark_failure, SettlementOutcome};
