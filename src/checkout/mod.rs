//! Ref-keyed checkout materialization and symlink publication.

pub mod cache;
pub mod publish;

pub use cache::{Checkout, CheckoutCache};
