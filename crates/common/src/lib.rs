//! Shared types for the commerce backend.
//!
//! - Typed identifiers for every entity
//! - [`Money`] amounts in integer cents
//! - Pagination helpers ([`PageRequest`], [`Page`])

pub mod money;
pub mod page;
pub mod types;

pub use money::Money;
pub use page::{Page, PageRequest};
pub use types::{
    LineItemId, OrderId, PaymentId, PaymentMethodId, ProductId, ReviewId, UserId,
};
